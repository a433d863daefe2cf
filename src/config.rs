use crate::error::{ClientError, Result};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_CHAT_PATH: &str = "/agent/chat";
pub const DEFAULT_RESUME_PATH: &str = "/agent/chat/resume";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub token: Option<String>,
    pub chat_path: String,
    pub resume_path: String,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            resume_path: DEFAULT_RESUME_PATH.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Pick the bearer token: an explicit value wins, then the stored token
/// file. No token at all is fine; requests just go out unauthenticated.
pub fn resolve_token(explicit: Option<String>) -> Result<Option<String>> {
    if let Some(token) = explicit.filter(|token| !token.trim().is_empty()) {
        return Ok(Some(token.trim().to_string()));
    }

    read_token_file(&token_path())
}

pub(crate) fn read_token_file(path: &std::path::Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(token) => {
            let token = token.trim();
            Ok((!token.is_empty()).then(|| token.to_string()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ClientError::Io(e)),
    }
}

pub fn token_path() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".agentstream").join("token");
    }

    PathBuf::from("agentstream.token")
}

pub(crate) fn normalize_base_url(value: &str) -> Result<String> {
    let trimmed = value.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ClientError::Config(format!(
            "base URL must start with http:// or https://, got {value:?}"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn join_path(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url, path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_token_wins() {
        assert_eq!(
            resolve_token(Some("  secret \n".to_string())).unwrap(),
            Some("secret".to_string())
        );
    }

    #[test]
    fn token_file_is_trimmed_and_optional() {
        let dir = std::env::temp_dir().join(format!("agentstream-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let path = dir.join("token");
        assert_eq!(read_token_file(&path).unwrap(), None);

        std::fs::write(&path, "stored-token\n").unwrap();
        assert_eq!(read_token_file(&path).unwrap(), Some("stored-token".to_string()));

        std::fs::write(&path, "   \n").unwrap();
        assert_eq!(read_token_file(&path).unwrap(), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(
            normalize_base_url("https://chat.example.com/api/").unwrap(),
            "https://chat.example.com/api"
        );
        assert!(matches!(
            normalize_base_url("chat.example.com"),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn paths_join_with_one_slash() {
        assert_eq!(
            join_path("http://h/api", DEFAULT_CHAT_PATH),
            "http://h/api/agent/chat"
        );
        assert_eq!(join_path("http://h", "agent/chat/resume"), "http://h/agent/chat/resume");
    }
}
