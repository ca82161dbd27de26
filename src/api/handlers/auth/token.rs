//! Stateless session tokens and their cookie transport.
//!
//! Sessions are HS256 tokens carrying identity claims as asserted at
//! issuance. Nothing is stored server-side: validity is signature plus
//! expiry, and signout merely clears the client cookie. Callers that need
//! current role/verification state re-fetch the user by the `sub` claim.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, InvalidHeaderValue},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{AuthConfig, AuthState};

const SESSION_COOKIE_NAME: &str = "Authorization";
const BEARER_PREFIX: &str = "Bearer ";

/// Claims embedded in every session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: user ID (UUID string).
    pub sub: String,
    pub name: String,
    pub email: String,
    pub verified: bool,
    pub role: String,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
}

impl SessionClaims {
    /// Parse the subject claim back into a user id.
    pub(super) fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Issue a signed session token for the given identity.
///
/// # Errors
/// Returns an error if JWT encoding fails.
pub(super) fn issue_session(
    state: &AuthState,
    user_id: Uuid,
    name: &str,
    email: &str,
    verified: bool,
    role: &str,
) -> anyhow::Result<String> {
    issue_session_at(state, user_id, name, email, verified, role, Utc::now().timestamp())
}

fn issue_session_at(
    state: &AuthState,
    user_id: Uuid,
    name: &str,
    email: &str,
    verified: bool,
    role: &str,
    issued_at: i64,
) -> anyhow::Result<String> {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        verified,
        role: role.to_string(),
        iat: issued_at,
        exp: issued_at + state.config().session_ttl_seconds(),
    };

    jsonwebtoken::encode(&Header::default(), &claims, state.session_encoding())
        .map_err(|e| anyhow::anyhow!("failed to encode session token: {e}"))
}

/// Validate a session token's signature and expiry.
///
/// Returns `None` for absent, malformed, forged, or expired tokens; the
/// caller maps all of those to `401`.
pub(super) fn validate_session(state: &AuthState, token: &str) -> Option<SessionClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is exact; the default 60s leeway would stretch the 8h window.
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    jsonwebtoken::decode::<SessionClaims>(token, state.session_decoding(), &validation)
        .map(|data| data.claims)
        .ok()
}

/// Resolve the session claims for a request, from the `Authorization`
/// header or the session cookie.
pub(super) fn authenticate(state: &AuthState, headers: &HeaderMap) -> Option<SessionClaims> {
    let token = extract_session_token(headers)?;
    validate_session(state, &token)
}

/// Build the `HttpOnly` session cookie carrying `Bearer <token>`.
pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let secure = config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={BEARER_PREFIX}{token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Expire the session cookie immediately.
pub(super) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Pull the raw token out of the `Authorization` header or the cookie.
pub(super) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        let (key, val) = (key.trim(), val.trim());
        if key == SESSION_COOKIE_NAME {
            // Cookie values carry the same "Bearer <token>" shape as the header.
            let token = val.strip_prefix(BEARER_PREFIX).unwrap_or(val).trim();
            if token.is_empty() {
                return None;
            }
            return Some(token.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix(BEARER_PREFIX)
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::super::state::test_state;
    use super::*;
    use anyhow::Result;

    fn issue_default(state: &AuthState, issued_at: i64) -> Result<String> {
        issue_session_at(
            state,
            Uuid::new_v4(),
            "A",
            "a@x.com",
            true,
            "user",
            issued_at,
        )
    }

    #[test]
    fn round_trip_preserves_claims() -> Result<()> {
        let state = test_state();
        let user_id = Uuid::new_v4();
        let token = issue_session(&state, user_id, "A", "a@x.com", true, "user")?;
        let claims = validate_session(&state, &token).expect("token should validate");
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.user_id(), Some(user_id));
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, "user");
        assert!(claims.verified);
        assert_eq!(claims.exp - claims.iat, 8 * 60 * 60);
        Ok(())
    }

    #[test]
    fn token_valid_before_expiry_invalid_after() -> Result<()> {
        let state = test_state();
        let now = Utc::now().timestamp();

        // Issued 7h59m ago: still valid.
        let token = issue_default(&state, now - (8 * 3600 - 60))?;
        assert!(validate_session(&state, &token).is_some());

        // Issued 8h01m ago: expired.
        let token = issue_default(&state, now - (8 * 3600 + 60))?;
        assert!(validate_session(&state, &token).is_none());
        Ok(())
    }

    #[test]
    fn tampered_token_rejected() -> Result<()> {
        let state = test_state();
        let token = issue_default(&state, Utc::now().timestamp())?;
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert!(validate_session(&state, &tampered).is_none());
        assert!(validate_session(&state, "garbage").is_none());
        Ok(())
    }

    #[test]
    fn cookie_carries_bearer_value() -> Result<()> {
        let state = test_state();
        let cookie = session_cookie(state.config(), "tok123").expect("cookie header");
        let value = cookie.to_str()?;
        assert!(value.starts_with("Authorization=Bearer tok123"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=28800"));
        assert!(value.contains("Secure"));
        Ok(())
    }

    #[test]
    fn clear_cookie_zeroes_max_age() -> Result<()> {
        let state = test_state();
        let cookie = clear_session_cookie(state.config()).expect("cookie header");
        assert!(cookie.to_str()?.contains("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn extract_prefers_header_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("Authorization=Bearer from-cookie"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn extract_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; flag; Authorization=Bearer from-cookie; lang=en"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("from-cookie".to_string())
        );
    }

    #[test]
    fn extract_none_when_absent_or_empty() {
        assert_eq!(extract_session_token(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_session_token(&headers), None);
    }
}
