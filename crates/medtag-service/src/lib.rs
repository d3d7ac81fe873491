//! MedTag service library
//!
//! REST backend for emergency medical profiles read from NFC tags and QR
//! codes.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - Access tokens, key encryption, passwords, tag checksums, TOTP
//! - `errors` - Error types
//! - `extract` - Body, path and query extractors with enveloped rejections
//! - `handlers` - HTTP request handlers
//! - `middleware` - Client metadata, authentication, audit, HTTP metrics
//! - `models` - Data models
//! - `observability` - Prometheus metrics and log-safe hashing
//! - `repositories` - Database access layer
//! - `routes` - Router and application state
//! - `services` - Business logic layer

pub mod config;
pub mod crypto;
pub mod errors;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
