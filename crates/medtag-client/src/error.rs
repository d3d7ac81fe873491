//! Client error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with an error envelope.
    #[error("{code} ({status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The session could not be refreshed and has been cleared. The user
    /// must log in again.
    #[error("session expired, please log in again")]
    SessionExpired,

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

impl ClientError {
    /// Server error code, when the server sent one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expired_message() {
        assert_eq!(
            ClientError::SessionExpired.to_string(),
            "session expired, please log in again"
        );
    }

    #[test]
    fn test_api_error_display_and_code() {
        let err = ClientError::Api {
            status: 410,
            code: "TAG_INACTIVE".to_string(),
            message: "Tag is not active".to_string(),
        };
        assert_eq!(err.to_string(), "TAG_INACTIVE (410): Tag is not active");
        assert_eq!(err.code(), Some("TAG_INACTIVE"));
        assert_eq!(ClientError::SessionExpired.code(), None);
    }
}
