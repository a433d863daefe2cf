//! Line-buffered decoder for the `text/event-stream` subset the agent
//! backend speaks.
//!
//! Bytes go in as they arrive off the wire; [`RawFrame`]s come out once a
//! `data:` line is complete. Each `data:` line is a standalone frame, paired
//! with the most recent `event:` name seen since the previous frame.

/// Event name in effect when no `event:` line preceded a frame.
pub const DEFAULT_EVENT: &str = "message";

/// One `(event, data)` pair pulled off the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// `None` when no `event:` line preceded this frame.
    pub event: Option<String>,
    /// Trimmed text after `data:`. Never empty.
    pub data: String,
}

impl RawFrame {
    /// The effective event name, `"message"` when none was given.
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or(DEFAULT_EVENT)
    }
}

/// Stateful UTF-8 decoder that carries split multi-byte sequences across
/// chunk boundaries. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, chunk: &[u8], out: &mut String) {
        let owned;
        let mut bytes: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            self.pending.extend_from_slice(chunk);
            owned = std::mem::take(&mut self.pending);
            &owned
        };

        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    out.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = bytes.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            bytes = &rest[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Turns arbitrary byte chunks into [`RawFrame`]s.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8Carry,
    buffer: String,
    event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        // Text held from earlier chunks has no newline; scan only what is new.
        let scan_from = self.buffer.len();
        self.utf8.decode(chunk, &mut self.buffer);

        let Some(last_newline) = self.buffer[scan_from..]
            .rfind('\n')
            .map(|offset| scan_from + offset)
        else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        let mut frames = Vec::new();
        for line in complete.split('\n') {
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes of text waiting for a line terminator.
    pub fn buffered(&self) -> usize {
        self.buffer.len() + self.utf8.pending.len()
    }

    fn process_line(&mut self, line: &str) -> Option<RawFrame> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(name) = line.strip_prefix("event:") {
            self.event = Some(name.trim().to_string());
            return None;
        }

        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() {
            return None;
        }

        Some(RawFrame {
            event: self.event.take(),
            data: data.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut SseDecoder, chunks: &[&[u8]]) -> Vec<RawFrame> {
        chunks
            .iter()
            .flat_map(|chunk| decoder.feed(chunk))
            .collect()
    }

    #[test]
    fn pairs_event_name_with_next_data_line() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: title\ndata: {\"title\":\"x\"}\n\ndata: {\"token\":\"a\"}\n\n");
        assert_eq!(
            frames,
            vec![
                RawFrame {
                    event: Some("title".to_string()),
                    data: "{\"title\":\"x\"}".to_string(),
                },
                RawFrame {
                    event: None,
                    data: "{\"token\":\"a\"}".to_string(),
                },
            ]
        );
        assert_eq!(frames[1].event_name(), DEFAULT_EVENT);
    }

    #[test]
    fn holds_partial_line_until_newline() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"tok").is_empty());
        assert!(decoder.buffered() > 0);
        let frames = decoder.feed(b"en\":\"hi\"}\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"token\":\"hi\"}");
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn carries_split_multibyte_characters() {
        let text = "data: {\"token\":\"héllo 🚀\"}\n".as_bytes();
        let whole = SseDecoder::new().feed(text);

        for split in 1..text.len() {
            let mut decoder = SseDecoder::new();
            let frames = feed_all(&mut decoder, &[&text[..split], &text[split..]]);
            assert_eq!(frames, whole, "split at byte {split}");
        }
        assert!(whole[0].data.contains("héllo 🚀"));
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: a\xffb\n");
        assert_eq!(frames[0].data, "a\u{FFFD}b");
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: done\r\ndata: {\"conversation_id\":\"c1\"}\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("done"));
        assert_eq!(frames[0].data, "{\"conversation_id\":\"c1\"}");
    }

    #[test]
    fn ignores_comments_blank_data_and_unknown_fields() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": ping\nid: 7\nretry: 100\ndata:   \n\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn event_name_resets_after_each_data_line() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: sources\ndata: one\ndata: two\n");
        assert_eq!(frames[0].event.as_deref(), Some("sources"));
        assert_eq!(frames[1].event, None);
    }

    #[test]
    fn long_line_in_small_chunks() {
        let token = "é".repeat(4096);
        let line = format!("data: {{\"token\":\"{token}\"}}");
        let mut decoder = SseDecoder::new();

        for byte in line.as_bytes() {
            assert!(decoder.feed(std::slice::from_ref(byte)).is_empty());
        }
        assert_eq!(decoder.buffered(), line.len());

        let frames = decoder.feed(b"\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, &line["data: ".len()..]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn unterminated_tail_never_surfaces() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"token\":\"lost\"}").is_empty());
    }
}
