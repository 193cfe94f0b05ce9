use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, TrendsError>;

#[derive(Error, Debug)]
pub enum TrendsError {
    // --- registry ---
    #[error("Topic already registered: {0}")]
    DuplicateTopic(String),

    #[error("Topic not found: {0}")]
    NotFound(String),

    #[error("Invalid topic name {name:?}: {reason}")]
    InvalidTopic { name: String, reason: String },

    // --- scraper ---
    #[error("Fetch failed for {url}: {reason}")]
    FetchError {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Topic not due for scraping: {0}")]
    NotDue(String),

    // --- storage ---
    #[error("Write failed for {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Read failed for {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // --- processor ---
    #[error("No raw records for partition {0}")]
    MissingInput(String),

    #[error("Processing failed for {target}: {reason}")]
    ProcessingError { target: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrendsError {
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchError {
            url: url.into(),
            status: None,
            reason: reason.into(),
        }
    }

    pub fn processing(target: impl ToString, reason: impl Into<String>) -> Self {
        Self::ProcessingError {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteError {
            path: path.into(),
            source,
        }
    }

    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly label, used in run summaries and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateTopic(_) => "duplicate_topic",
            Self::NotFound(_) => "not_found",
            Self::InvalidTopic { .. } => "invalid_topic",
            Self::FetchError { .. } => "fetch_error",
            Self::NotDue(_) => "not_due",
            Self::WriteError { .. } => "write_error",
            Self::ReadError { .. } => "read_error",
            Self::MissingInput(_) => "missing_input",
            Self::ProcessingError { .. } => "processing_error",
            Self::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_message_names_url() {
        let err = TrendsError::fetch("https://en.wikipedia.org/wiki/Rust", "HTTP 503");
        assert_eq!(
            err.to_string(),
            "Fetch failed for https://en.wikipedia.org/wiki/Rust: HTTP 503"
        );
        assert_eq!(err.kind(), "fetch_error");
    }

    #[test]
    fn write_error_keeps_io_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = TrendsError::write("/tmp/x.json", io);
        assert!(err.to_string().contains("/tmp/x.json"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
