use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure class carried on the wire inside an `error` event, so clients can
/// distinguish "the thing you named does not exist" from "the broker refused".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Rejected,
}

/// Outcome of a broker operation that did not succeed. Every operation is
/// scoped to the originating session; none of these are fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The named entity (session, room, message, target user) does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The operation was refused (validation failure, rate limit).
    #[error("{0}")]
    Rejected(String),
}

impl BrokerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BrokerError::NotFound(_) => ErrorCode::NotFound,
            BrokerError::Rejected(_) => ErrorCode::Rejected,
        }
    }
}
