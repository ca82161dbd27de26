//! Password hashing and verification with bcrypt.

use anyhow::{Context, Result};

/// Hash a plaintext password with the configured cost factor.
///
/// # Errors
/// Returns an error if bcrypt rejects the input (for example a password
/// containing an interior NUL byte).
pub(super) fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("failed to hash password")
}

/// Verify a plaintext password against a stored bcrypt hash.
///
/// A malformed hash verifies as `false` rather than erroring; a stored
/// credential we cannot parse must never authenticate anyone.
pub(super) fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Hash on the blocking pool; bcrypt at cost 12 is far too slow for an
/// async worker thread.
pub(super) async fn hash_password_blocking(password: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .context("password hashing task failed")?
}

/// Verify on the blocking pool.
pub(super) async fn verify_password_blocking(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("password verification task failed")
}
