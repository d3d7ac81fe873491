//! Common types shared between the MedTag service and its clients.

#![warn(clippy::pedantic)]

/// Module for the JSON error envelope
pub mod error;

/// Module for wire enums (roles, severities, statuses)
pub mod types;

/// Module for request and response bodies of the REST API
pub mod api;

/// Module for secret types that prevent accidental logging
pub mod secret;
