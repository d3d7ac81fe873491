//! Time-based one-time passwords (RFC 6238) for two-factor login.
//!
//! HMAC-SHA1, 6 digits, 30 second step. Verification accepts the previous
//! and next step to absorb clock drift on the authenticator.

use crate::errors::ApiError;
use ring::hmac;

pub const TOTP_DIGITS: u32 = 6;
pub const TOTP_STEP_SECONDS: i64 = 30;
/// Steps accepted on either side of the current one.
pub const TOTP_WINDOW: i64 = 1;
/// 160-bit secret, the RFC 4226 recommended length.
pub const TOTP_SECRET_BYTES: usize = 20;

const ISSUER: &str = "MedTag";
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Base32 (RFC 4648) without padding, the form authenticator apps expect.
pub fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(alphabet_char((buffer >> bits) & 0x1f));
        }
        buffer &= (1 << bits) - 1;
    }

    if bits > 0 {
        out.push(alphabet_char((buffer << (5 - bits)) & 0x1f));
    }

    out
}

fn alphabet_char(index: u32) -> char {
    BASE32_ALPHABET
        .get(index as usize)
        .map_or('A', |&b| char::from(b))
}

/// Provisioning URI rendered as a QR code by the client.
pub fn otpauth_url(secret_base32: &str, account: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&digits={digits}&period={period}",
        issuer = ISSUER,
        account = percent_encode(account),
        secret = secret_base32,
        digits = TOTP_DIGITS,
        period = TOTP_STEP_SECONDS,
    )
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// The code for a given step counter (RFC 4226 HOTP).
pub fn code_at(secret: &[u8], counter: u64) -> Result<String, ApiError> {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret);
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let digest = tag.as_ref();

    let offset = digest
        .last()
        .map(|b| usize::from(b & 0x0f))
        .ok_or_else(|| ApiError::Crypto("Empty HMAC output".to_string()))?;
    let window: [u8; 4] = digest
        .get(offset..offset + 4)
        .and_then(|w| w.try_into().ok())
        .ok_or_else(|| ApiError::Crypto("Truncated HMAC output".to_string()))?;

    let binary = u32::from_be_bytes(window) & 0x7fff_ffff;
    let code = binary % 10u32.pow(TOTP_DIGITS);

    Ok(format!("{:0width$}", code, width = TOTP_DIGITS as usize))
}

/// Check `candidate` against the current step and its neighbours.
pub fn verify(secret: &[u8], candidate: &str, unix_time: i64) -> Result<bool, ApiError> {
    let candidate = candidate.trim();
    if candidate.len() != TOTP_DIGITS as usize || !candidate.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }

    let current = unix_time.div_euclid(TOTP_STEP_SECONDS);
    let mut matched = false;

    for step in (current - TOTP_WINDOW)..=(current + TOTP_WINDOW) {
        let Ok(counter) = u64::try_from(step) else {
            continue;
        };
        let expected = code_at(secret, counter)?;
        // Every step is compared so timing does not reveal which one matched.
        matched |= constant_time_eq(expected.as_bytes(), candidate.as_bytes());
    }

    Ok(matched)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
