use std::fmt::Debug;
use thiserror::Error;
use tracing::error;

/// A document or value did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value at `{path}`: {reason}")]
pub struct ValidationError {
    /// Dotted field path, e.g. `kml.Document.Folder.Placemark[2].name`.
    pub path: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a required element or field that is absent.
    pub fn missing(path: impl Into<String>) -> Self {
        Self::new(path, "required")
    }
}

/// Error surfaced by a remote lookup.
///
/// Callers branch on the variant to pick a fallback: a `Transport` failure
/// is worth retrying later, a `Validation` failure is not.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("response failed validation: {0}")]
    Validation(#[from] ValidationError),
}

impl FetchError {
    pub fn transport(url: impl Into<String>, message: impl ToString) -> Self {
        FetchError::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, FetchError::Validation(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }
}

/// Error-tracking collaborator that receives schema mismatches from remote data.
pub trait ErrorReporter: Send + Sync + Debug {
    fn report_validation(&self, source: &str, error: &ValidationError);
}

/// Reporter that only writes a log record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report_validation(&self, source: &str, err: &ValidationError) {
        error!(source, path = %err.path, reason = %err.reason, "remote data failed validation");
    }
}
