//! # MedTag Test Utilities
//!
//! Shared test utilities for the MedTag service and client.
//!
//! This crate provides:
//! - Server test harness (`TestServer` running the real router)
//! - Fixtures that create users, profiles and tags through the service layer
//! - Fixed test constants (keys, emails, tag UIDs)
//! - Custom assertions (`AccessTokenAssertions`, `assert_api_error`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use medtag_test_utils::*;
//!
//! #[sqlx::test(migrations = "../../migrations")]
//! async fn test_example(pool: PgPool) -> anyhow::Result<()> {
//!     let server = TestServer::spawn(pool).await?;
//!     let patient = server.create_patient(TEST_EMAIL_ANNA).await?;
//!
//!     patient.access.assert_valid_jwt().assert_for_subject(&patient.user.user_id.to_string());
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod server_harness;
pub mod test_ids;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;
pub use server_harness::*;
pub use test_ids::*;
