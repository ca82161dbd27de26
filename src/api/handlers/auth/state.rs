//! Auth configuration and shared state.

use jsonwebtoken::{DecodingKey, EncodingKey};
use secrecy::{ExposeSecret, SecretString};

const DEFAULT_OTP_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_CODE_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 8 * 60 * 60;
const DEFAULT_BCRYPT_COST: u32 = 12;
const DEFAULT_PHOTO_URL: &str = "/default-avatar.png";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    otp_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
    code_ttl_seconds: i64,
    session_ttl_seconds: i64,
    bcrypt_cost: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    #[must_use]
    pub fn code_ttl_seconds(&self) -> i64 {
        self.code_ttl_seconds
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    #[must_use]
    pub fn default_photo_url(&self) -> &'static str {
        DEFAULT_PHOTO_URL
    }

    /// Only mark cookies secure when the storefront is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Shared auth state: configuration plus the two signing secrets.
///
/// The OTP secret keys the HMAC digest of one-time codes; the session
/// secret signs bearer tokens. They are independent so rotating one does
/// not invalidate the other's artifacts.
pub struct AuthState {
    config: AuthConfig,
    otp_secret: SecretString,
    session_encoding: EncodingKey,
    session_decoding: DecodingKey,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, otp_secret: SecretString, session_secret: &SecretString) -> Self {
        let secret_bytes = session_secret.expose_secret().as_bytes();
        Self {
            config,
            otp_secret,
            session_encoding: EncodingKey::from_secret(secret_bytes),
            session_decoding: DecodingKey::from_secret(secret_bytes),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn otp_secret(&self) -> &[u8] {
        self.otp_secret.expose_secret().as_bytes()
    }

    pub(crate) fn session_encoding(&self) -> &EncodingKey {
        &self.session_encoding
    }

    pub(crate) fn session_decoding(&self) -> &DecodingKey {
        &self.session_decoding
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("otp_secret", &"***")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> std::sync::Arc<AuthState> {
    let config = AuthConfig::new("https://shop.vetrina.dev".to_string()).with_bcrypt_cost(4);
    std::sync::Arc::new(AuthState::new(
        config,
        SecretString::from("test-otp-secret"),
        &SecretString::from("test-session-secret"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://shop.vetrina.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://shop.vetrina.dev");
        assert_eq!(config.otp_ttl_seconds(), super::DEFAULT_OTP_TTL_SECONDS);
        assert_eq!(
            config.resend_cooldown_seconds(),
            super::DEFAULT_RESEND_COOLDOWN_SECONDS
        );
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert_eq!(config.bcrypt_cost(), super::DEFAULT_BCRYPT_COST);
        assert!(config.session_cookie_secure());

        let config = config
            .with_otp_ttl_seconds(120)
            .with_resend_cooldown_seconds(30)
            .with_code_ttl_seconds(60)
            .with_session_ttl_seconds(3600)
            .with_bcrypt_cost(4);

        assert_eq!(config.otp_ttl_seconds(), 120);
        assert_eq!(config.resend_cooldown_seconds(), 30);
        assert_eq!(config.code_ttl_seconds(), 60);
        assert_eq!(config.session_ttl_seconds(), 3600);
        assert_eq!(config.bcrypt_cost(), 4);
    }

    #[test]
    fn http_frontend_means_insecure_cookie() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn auth_state_hides_secrets_in_debug() {
        let state = test_state();
        let rendered = format!("{state:?}");
        assert!(!rendered.contains("test-otp-secret"));
        assert!(!rendered.contains("test-session-secret"));
    }
}
