//! JSON error envelope returned by every failing MedTag endpoint.
//!
//! ```json
//! { "error": { "code": "NOT_FOUND", "message": "Medical profile not found" } }
//! ```

use serde::{Deserialize, Serialize};

/// Top-level error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error details
    pub error: ErrorDetail,
}

/// Machine-readable code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error code (e.g. `INVALID_TOKEN`)
    pub code: String,
    /// Message safe to show to an end user
    pub message: String,
}

impl ErrorBody {
    /// Build an error body from a code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}
