//! Jarvix - terminal chat client for the Jarvix assistant
//!
//! Relays prompts to the backend over a WebSocket and renders the streamed
//! responses:
//! - Reconciles stream, log and status events per correlation id
//! - Light markdown formatting of model output
//! - Optional voice input and spoken summaries

pub mod config;
pub mod connection;
pub mod format;
pub mod markup;
pub mod protocol;
pub mod session;
pub mod transcript;
pub mod tui;
pub mod voice;

pub use config::JarvixConfig;
pub use connection::{Connection, ConnectionState, Outbox};
pub use protocol::{CorrelationId, InboundEvent, OutboundRequest};
pub use session::{ClientSession, VoiceUpdate};
pub use transcript::{Applied, Outcome, Transcript, Turn, TurnStatus};

/// Result type for Jarvix operations
pub type Result<T> = std::result::Result<T, JarvixError>;

/// Errors that can occur in Jarvix
#[derive(Debug, thiserror::Error)]
pub enum JarvixError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
