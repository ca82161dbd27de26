//! Request/response types for auth endpoints.
//!
//! Wire fields are camelCase to match the storefront client.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupResponse {
    pub success: bool,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendOtpRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateProfileRequest {
    pub name: String,
}

/// Body for endpoints keyed by email alone.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailRequest {
    pub email: String,
}

/// Body for verify-code; the target account comes from the session, not
/// the payload.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

/// Public view of a confirmed account. Never carries credential material.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub verified: bool,
    pub photo_url: String,
}

/// Session-issuing response: the token is set as a cookie and echoed in
/// the body for header-based clients.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: UserProfile,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: UserProfile,
}

/// Generic `{success, message}` envelope for plain outcomes and errors.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn signup_request_round_trips() -> Result<()> {
        let request: SignupRequest = serde_json::from_value(serde_json::json!({
            "name": "A",
            "email": "a@x.com",
            "password": "Aa123456",
        }))?;
        assert_eq!(request.name, "A");
        assert_eq!(request.email, "a@x.com");
        let value = serde_json::to_value(&request)?;
        assert_eq!(
            value.get("password").and_then(serde_json::Value::as_str),
            Some("Aa123456")
        );
        Ok(())
    }

    #[test]
    fn user_profile_uses_camel_case_photo_url() -> Result<()> {
        let profile = UserProfile {
            id: "00000000-0000-0000-0000-000000000000".to_string(),
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            role: "user".to_string(),
            verified: true,
            photo_url: "/default-avatar.png".to_string(),
        };
        let value = serde_json::to_value(&profile)?;
        let photo = value
            .get("photoUrl")
            .and_then(serde_json::Value::as_str)
            .context("missing photoUrl")?;
        assert_eq!(photo, "/default-avatar.png");
        assert!(value.get("photo_url").is_none());
        Ok(())
    }

    #[test]
    fn change_password_request_accepts_camel_case() -> Result<()> {
        let request: ChangePasswordRequest = serde_json::from_value(serde_json::json!({
            "oldPassword": "Aa123456",
            "newPassword": "Bb123456",
        }))?;
        assert_eq!(request.old_password, "Aa123456");
        assert_eq!(request.new_password, "Bb123456");
        Ok(())
    }

    #[test]
    fn reset_password_request_accepts_camel_case() -> Result<()> {
        let request: ResetPasswordRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "code": "123456",
            "newPassword": "Bb123456",
        }))?;
        assert_eq!(request.new_password, "Bb123456");
        Ok(())
    }

    #[test]
    fn api_message_constructors() -> Result<()> {
        let ok = serde_json::to_value(ApiMessage::ok("done"))?;
        assert_eq!(ok.get("success"), Some(&serde_json::Value::Bool(true)));
        let err = serde_json::to_value(ApiMessage::err("Invalid credentials"))?;
        assert_eq!(err.get("success"), Some(&serde_json::Value::Bool(false)));
        assert_eq!(
            err.get("message").and_then(serde_json::Value::as_str),
            Some("Invalid credentials")
        );
        Ok(())
    }
}
