use std::path::PathBuf;
use thiserror::Error;

/// A degradable external failure. The pipeline logs it and moves on to the
/// next candidate instead of aborting the script.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    #[error("no API credential configured")]
    MissingCredential,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Unavailable {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Unavailable::Status(code) => *code == 408 || *code == 429 || *code >= 500,
            Unavailable::Transport(_) | Unavailable::Io(_) => true,
            Unavailable::MissingCredential | Unavailable::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for Unavailable {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Unavailable::Status(status.as_u16());
        }
        if err.is_decode() {
            return Unavailable::Malformed(err.to_string());
        }
        Unavailable::Transport(err.to_string())
    }
}

impl From<std::io::Error> for Unavailable {
    fn from(err: std::io::Error) -> Self {
        Unavailable::Io(err.to_string())
    }
}

/// Failures that end processing of a single script.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("narration audio not available: {0}")]
    MissingNarration(PathBuf),

    #[error("render failed for {id}: {reason}")]
    Render { id: String, reason: String },

    #[error("caption burn-in failed for {id}: {reason}")]
    Caption { id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(Unavailable::Status(503).is_transient());
        assert!(Unavailable::Status(429).is_transient());
        assert!(!Unavailable::Status(404).is_transient());
        assert!(!Unavailable::Status(401).is_transient());
    }

    #[test]
    fn credential_and_parse_failures_are_final() {
        assert!(!Unavailable::MissingCredential.is_transient());
        assert!(!Unavailable::Malformed("eof".into()).is_transient());
        assert!(Unavailable::Transport("timeout".into()).is_transient());
    }
}
