//! Client for the agent chat endpoints of a multi-tenant chat backend.
//!
//! The interesting part is [`StreamEventReader`]: it decodes a
//! `text/event-stream` response body into typed [`StreamEvent`]s, one pull
//! at a time, independent of how the bytes were chunked on the wire.
//! [`AgentClient`] opens the requests that produce those bodies.

pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod reader;
pub mod slot;
pub mod sse;

pub use classify::StreamKind;
pub use client::AgentClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use protocol::{ChatRequest, MessageSource, ResumeRequest, StreamEvent};
pub use reader::{EventStream, StreamEventReader};
pub use slot::{Lease, StreamSlot};
