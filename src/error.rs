//! Error types for the monitor core.

use thiserror::Error;

/// Failures surfaced by the extraction and notification layers.
///
/// Classification never fails; a record that is not an RDP login is a
/// regular outcome, not an error.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The raw record carried no usable payload at all.
    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// HTTP transport error while talking to the notification endpoint.
    #[error("Notifier transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The notification endpoint answered but rejected the message.
    #[error("Notifier rejected message (HTTP {status}): {description}")]
    NotifierRejected { status: u16, description: String },

    /// Invalid notifier configuration (bad chat id, missing token).
    #[error("Invalid notifier configuration: {0}")]
    Config(String),
}

impl MonitorError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }
}
