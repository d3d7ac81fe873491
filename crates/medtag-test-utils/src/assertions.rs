//! Custom test assertions for expressive tests.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use common::error::ErrorBody;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct JwtHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

fn decode_part<T: for<'de> Deserialize<'de>>(token: &str, index: usize, what: &str) -> T {
    let part = token
        .split('.')
        .nth(index)
        .unwrap_or_else(|| panic!("JWT has no {} segment", what));
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .unwrap_or_else(|e| panic!("Failed to base64 decode JWT {}: {}", what, e));
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("Failed to parse JWT {} JSON: {}", what, e))
}

/// Assertions on MedTag access tokens.
///
/// # Example
/// ```rust,ignore
/// pair.access
///     .assert_valid_jwt()
///     .assert_for_subject(&user_id.to_string())
///     .assert_role("PATIENT");
/// ```
pub trait AccessTokenAssertions {
    /// Three segments, EdDSA, with a `kid` header.
    fn assert_valid_jwt(&self) -> &Self;

    fn assert_for_subject(&self, subject: &str) -> &Self;

    fn assert_role(&self, role: &str) -> &Self;

    /// `exp - iat` equals `seconds`.
    fn assert_lifetime(&self, seconds: i64) -> &Self;
}

impl AccessTokenAssertions for String {
    fn assert_valid_jwt(&self) -> &Self {
        assert_eq!(
            self.split('.').count(),
            3,
            "JWT must have 3 parts (header.payload.signature)"
        );

        let header: JwtHeader = decode_part(self, 0, "header");
        assert_eq!(header.alg, "EdDSA", "Expected EdDSA algorithm");
        assert!(
            header.kid.as_deref().is_some_and(|kid| kid.starts_with("medtag-")),
            "Expected a medtag signing key id, got {:?}",
            header.kid
        );

        let _: JwtClaims = decode_part(self, 1, "payload");
        self
    }

    fn assert_for_subject(&self, subject: &str) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");
        assert_eq!(claims.sub, subject, "Token is for a different subject");
        self
    }

    fn assert_role(&self, role: &str) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");
        assert_eq!(claims.role, role, "Token carries a different role");
        self
    }

    fn assert_lifetime(&self, seconds: i64) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");
        assert_eq!(claims.exp - claims.iat, seconds, "Unexpected token lifetime");
        self
    }
}

/// Assert that `response` is an error envelope with `status` and `code`,
/// and return the body for further checks.
pub async fn assert_api_error(response: reqwest::Response, status: u16, code: &str) -> ErrorBody {
    assert_eq!(response.status().as_u16(), status, "Unexpected status code");
    let body: ErrorBody = response
        .json()
        .await
        .expect("Error response must carry the JSON error envelope");
    assert_eq!(body.error.code, code, "Unexpected error code: {}", body.error.message);
    body
}
