//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use these types for
//! passwords, access and refresh tokens, TOTP secrets and key material.
//!
//! `SecretBox<T>` and `SecretString` print `[REDACTED]` under `Debug`, so a
//! derived `Debug` on a struct holding them is safe to log. Values are
//! zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct LoginRequest {
//!     email: String,
//!     password: SecretString,  // Safe: Debug shows "[REDACTED]"
//! }
//!
//! let req = LoginRequest {
//!     email: "anna@example.com".to_string(),
//!     password: SecretString::from("hunter2"),
//! };
//!
//! // This is safe - password is redacted
//! println!("{:?}", req);
//! // Output: LoginRequest { email: "anna@example.com", password: SecretBox<str>([REDACTED]) }
//!
//! // To access the actual value, you must explicitly call expose_secret()
//! let password: &str = req.password.expose_secret();
//! ```
//!
//! # Usage
//!
//! `SecretString` holds passwords and the client's access and refresh
//! tokens. `SecretBox<Vec<u8>>` holds the service's master key and tag key.
//!
//! # Serde Integration
//!
//! Secrets deserialize from JSON but never serialize back:
//!
//! ```rust
//! use serde::Deserialize;
//! use common::secret::SecretString;
//!
//! #[derive(Debug, Deserialize)]
//! struct StoredSession {
//!     access: SecretString,
//!     refresh: SecretString,
//! }
//!
//! let json = r#"{"access": "eyJ...", "refresh": "c2Vzc2lvbg"}"#;
//! let session: StoredSession = serde_json::from_str(json).unwrap();
//!
//! // Debug output is safe: both tokens are redacted
//! println!("{:?}", session);
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("correct horse battery");
        assert_eq!(secret.expose_secret(), "correct horse battery");
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Session {
            email: String,
            refresh: SecretString,
        }

        let session = Session {
            email: "nurse@clinic.example".to_string(),
            refresh: SecretString::from("long-lived-refresh-token"),
        };

        let debug_str = format!("{session:?}");

        assert!(debug_str.contains("nurse@clinic.example"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("long-lived-refresh-token"));
    }

    #[test]
    fn test_secret_box_bytes() {
        let key = SecretBox::new(Box::new(vec![7u8; 32]));
        assert_eq!(key.expose_secret().len(), 32);
        assert!(format!("{key:?}").contains("REDACTED"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct Login {
            email: String,
            password: SecretString,
        }

        let json = r#"{"email": "bob@example.com", "password": "my-secret-value"}"#;
        let login: Login = serde_json::from_str(json).expect("deserialize");

        assert_eq!(login.password.expose_secret(), "my-secret-value");

        let debug = format!("{login:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
