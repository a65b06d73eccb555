//! Cross-context rendering protocol: the RENDER/RENDER_RESULT and
//! SEARCH/SEARCH_RESULT receiver, plus a caller-side client that correlates
//! replies by request id.

mod channel;
mod client;

use thiserror::Error;

pub use channel::{ChannelState, Envelope, METRIC_FALLBACK_REPLIES, ReplyPort, SandboxChannel};
pub use client::{ReplyMailbox, SandboxClient};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("message has no `action` field")]
    MissingAction,
    #[error("no handler for action `{action}`")]
    UnknownAction { action: String },
    #[error("origin `{origin}` is not allowed")]
    OriginRejected { origin: String },
    #[error("failed to encode message: {message}")]
    Encode { message: String },
    #[error("reply port closed")]
    ReplyClosed,
    #[error("sandbox channel closed")]
    ChannelClosed,
    #[error("no reply to request `{req_id}` within {timeout_ms}ms")]
    Timeout { req_id: String, timeout_ms: u64 },
    #[error("reply for unknown request `{req_id}`")]
    UnknownRequest { req_id: String },
    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    pub fn encode(err: impl std::fmt::Display) -> Self {
        Self::Encode {
            message: err.to_string(),
        }
    }
}
