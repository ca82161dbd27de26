//! Small helpers for input validation and one-time-code handling.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::{Rng, rngs::OsRng};
use regex::Regex;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Passwords must be at least 8 characters with a letter and a digit.
pub(super) fn valid_password(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Generate a uniformly random 6-digit one-time code.
///
/// The plaintext is emailed once; only its digest is ever stored.
pub(super) fn generate_otp() -> String {
    let code: u32 = OsRng.gen_range(100_000..=999_999);
    code.to_string()
}

/// Keyed digest of a one-time code: HMAC-SHA256 over the code's string
/// representation, hex-encoded.
///
/// # Errors
/// Fails only if the HMAC cannot be keyed, which does not happen for
/// non-empty secrets.
pub(super) fn otp_digest(code: &str, secret: &[u8]) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret).context("failed to key one-time-code digest")?;
    mac.update(code.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time equality over the fixed-length hex digests.
pub(super) fn digests_match(expected: &str, stored: &str) -> bool {
    if expected.len() != stored.len() {
        return false;
    }
    expected
        .bytes()
        .zip(stored.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Seconds remaining before a new code may be issued, or `None` when the
/// cooldown has elapsed.
pub(super) fn cooldown_remaining(
    issued_at: DateTime<Utc>,
    now: DateTime<Utc>,
    cooldown_seconds: i64,
) -> Option<i64> {
    let elapsed = (now - issued_at).num_seconds();
    if elapsed >= cooldown_seconds {
        None
    } else {
        Some(cooldown_seconds - elapsed)
    }
}

/// Postgres unique-constraint violation (SQLSTATE 23505).
pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}

/// Whether a code issued at `issued_at` is past its validity window.
pub(super) fn code_expired(
    issued_at: DateTime<Utc>,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> bool {
    now - issued_at > Duration::seconds(ttl_seconds)
}
