pub mod audit_service;
pub mod key_management_service;
pub mod nfc_service;
pub mod profile_service;
pub mod token_service;
pub mod two_factor_service;
pub mod user_service;
