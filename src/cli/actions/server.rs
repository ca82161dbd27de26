use crate::api::{
    self,
    email::EmailWorkerConfig,
    handlers::auth::{AuthConfig, AuthState, SweepSettings},
};
use anyhow::Result;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub otp_secret: SecretString,
    pub session_secret: SecretString,
    pub frontend_base_url: String,
    pub mail_from: String,
    pub otp_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub code_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub bcrypt_cost: u32,
    pub pending_grace_minutes: i64,
    pub pending_sweep_interval_seconds: u64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the database pool or the listener cannot be set up.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_resend_cooldown_seconds(args.otp_resend_cooldown_seconds)
        .with_code_ttl_seconds(args.code_ttl_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_bcrypt_cost(args.bcrypt_cost);

    let auth_state = Arc::new(AuthState::new(
        auth_config,
        args.otp_secret,
        &args.session_secret,
    ));

    let email_config = EmailWorkerConfig::new()
        .with_mail_from(args.mail_from)
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    let sweep = SweepSettings {
        interval: Duration::from_secs(args.pending_sweep_interval_seconds),
        grace_minutes: args.pending_grace_minutes,
    };

    api::new(args.port, args.dsn, auth_state, email_config, sweep).await
}
