use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Record-level message used when a failure carries no service-provided text.
pub const CLASSIFY_FAILED_MESSAGE: &str = "Failed to classify document";
pub const READ_FAILED_MESSAGE: &str = "Failed to read file";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("missing required setting `{0}`")]
    MissingSetting(&'static str),
    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
    #[error("invalid base url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("request failed with status code {status}{}", message_suffix(.message))]
    Status { status: u16, message: Option<String> },
    #[error("invalid content type `{content_type}`")]
    InvalidContentType {
        content_type: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|message| format!(": {message}"))
        .unwrap_or_default()
}

impl ClientError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(timeout)
        } else {
            ClientError::Transport(err)
        }
    }

    /// Message supplied by the service in a rejection body, if any.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            ClientError::Status {
                message: Some(message),
                ..
            } => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }

    /// Text stored on a failed upload record: the service's own message when
    /// it sent one, otherwise a generic message for the failure kind.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::ReadFile { .. } => READ_FAILED_MESSAGE.to_string(),
            _ => self
                .service_message()
                .unwrap_or(CLASSIFY_FAILED_MESSAGE)
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_prefers_service_message() {
        let err = ClientError::Status {
            status: 422,
            message: Some("unsupported document".into()),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status code 422: unsupported document"
        );
        assert_eq!(err.user_message(), "unsupported document");
    }

    #[test]
    fn failures_without_service_message_use_generic_text() {
        let err = ClientError::Status {
            status: 500,
            message: None,
        };
        assert_eq!(err.to_string(), "request failed with status code 500");
        assert_eq!(err.user_message(), CLASSIFY_FAILED_MESSAGE);
        assert_eq!(
            ClientError::Timeout(Duration::from_secs(30)).user_message(),
            CLASSIFY_FAILED_MESSAGE
        );
    }

    #[test]
    fn unreadable_files_get_read_failure_text() {
        let err = ClientError::ReadFile {
            path: PathBuf::from("/missing/policy.pdf"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.user_message(), READ_FAILED_MESSAGE);
    }
}
