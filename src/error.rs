use thiserror::Error;

/// Failure taxonomy of the security engine.
///
/// Nothing here is allowed to escape an event handler: entry points catch and
/// log. The variants exist so callers of the exposed operations (restore,
/// config updates, ...) can distinguish "no such record" from "Discord said
/// no" from "you typed an unknown option".
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("remote action failed: {0}")]
    RemoteAction(String),

    /// Audit trail yielded no matching entry within the lookback.
    /// Never guessed around; the handler gives up without punishing.
    #[error("no matching audit log entry")]
    AttributionMiss,

    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl GuardError {
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        GuardError::NotFound(msg.into())
    }

    pub fn remote<E: std::fmt::Display>(e: E) -> Self {
        GuardError::RemoteAction(e.to_string())
    }
}
