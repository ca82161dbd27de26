use crate::api::handlers::{auth, health};
use utoipa::OpenApi;

/// OpenAPI document for the auth surface.
///
/// Add new endpoints to `paths(...)` so they show up in swagger-ui and the
/// generated `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::signup::signup,
        auth::signup::resend_otp,
        auth::signup::verify_otp,
        auth::session::signin,
        auth::session::signout,
        auth::session::change_password,
        auth::session::update_profile,
        auth::session::verify_session,
        auth::verification::send_verification_code,
        auth::verification::verify_code,
        auth::reset::forgot_password_code,
        auth::reset::forgot_password_validate,
    ),
    components(schemas(
        health::Health,
        auth::types::SignupRequest,
        auth::types::SignupResponse,
        auth::types::ResendOtpRequest,
        auth::types::VerifyOtpRequest,
        auth::types::SigninRequest,
        auth::types::ChangePasswordRequest,
        auth::types::UpdateProfileRequest,
        auth::types::EmailRequest,
        auth::types::VerifyCodeRequest,
        auth::types::ResetPasswordRequest,
        auth::types::UserProfile,
        auth::types::AuthResponse,
        auth::types::ProfileResponse,
        auth::types::ApiMessage,
    )),
    tags(
        (name = "auth", description = "Signup, signin, one-time codes, and sessions"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
