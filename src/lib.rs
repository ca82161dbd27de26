//! # Vetrina (Storefront Authentication Service)
//!
//! `vetrina` is the authentication authority for the storefront platform. It
//! owns identity, credential verification, and issued-session validity:
//! signup with one-time-code confirmation, signin, password reset via emailed
//! codes, and stateless bearer-session issuance/validation.
//!
//! ## Signup model (staged registrations)
//!
//! A signup does not create an account. It stages a `PendingRegistration`
//! (name, email, bcrypt password hash, HMAC digest of a 6-digit OTP) and
//! emails the plaintext code. Verifying the code within its 5-minute window
//! promotes the staging row to a confirmed, `verified` user in a single
//! transaction. Stale staging rows are swept on a fixed interval.
//!
//! ## Codes are never stored in plaintext
//!
//! Only the HMAC-SHA256 digest of a code is persisted, alongside its
//! issuance timestamp. If the store leaks, historical codes stay unusable.
//! Comparison recomputes the digest and checks equality in constant time.
//!
//! ## Sessions
//!
//! Sessions are stateless HS256 tokens with an 8-hour expiry, delivered both
//! in the response body and as an `HttpOnly` cookie. There is no revocation
//! list: signout clears the cookie, and the token stays cryptographically
//! valid until natural expiry. Session verification re-fetches the user so
//! role and verification changes made after issuance are reflected.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
