//! Fixed test constants for deterministic tests.

// 32 bytes of 0x01, base64
pub const TEST_MASTER_KEY_B64: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";

// 32 bytes of 0x02, base64
pub const TEST_TAG_KEY_B64: &str = "AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=";

/// Password of every fixture account.
pub const TEST_PASSWORD: &str = "correct horse battery";

// Accounts
pub const TEST_EMAIL_ANNA: &str = "anna@example.com";
pub const TEST_EMAIL_BORIS: &str = "boris@example.com";
pub const TEST_EMAIL_DOCTOR: &str = "dr.petrova@clinic.example";
pub const TEST_EMAIL_ADMIN: &str = "admin@medtag.example";

// Tag UIDs (7-byte NTAG serials)
pub const TEST_TAG_UID_1: &str = "04A224B1C25E80";
pub const TEST_TAG_UID_2: &str = "04B7E9D2A14C81";

/// Documentation address used as a scanning client.
pub const TEST_SCANNER_IP: &str = "203.0.113.9";
