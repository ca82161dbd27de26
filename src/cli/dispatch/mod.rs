//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server with its full
//! configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Box::new(Args {
        port,
        dsn,
        otp_secret: SecretString::from(auth_opts.otp_secret),
        session_secret: SecretString::from(auth_opts.session_secret),
        frontend_base_url: auth_opts.frontend_base_url,
        mail_from: auth_opts.mail_from,
        otp_ttl_seconds: auth_opts.otp_ttl_seconds,
        otp_resend_cooldown_seconds: auth_opts.otp_resend_cooldown_seconds,
        code_ttl_seconds: auth_opts.code_ttl_seconds,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        bcrypt_cost: auth_opts.bcrypt_cost,
        pending_grace_minutes: auth_opts.pending_grace_minutes,
        pending_sweep_interval_seconds: auth_opts.pending_sweep_interval_seconds,
        email_outbox_poll_seconds: auth_opts.outbox.poll_seconds,
        email_outbox_batch_size: auth_opts.outbox.batch_size,
        email_outbox_max_attempts: auth_opts.outbox.max_attempts,
        email_outbox_backoff_base_seconds: auth_opts.outbox.backoff_base_seconds,
        email_outbox_backoff_max_seconds: auth_opts.outbox.backoff_max_seconds,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn otp_secret_required() {
        temp_env::with_vars(
            [
                ("VETRINA_OTP_SECRET", None::<&str>),
                ("VETRINA_SESSION_SECRET", Some("session-secret")),
                (
                    "VETRINA_DSN",
                    Some("postgres://user@localhost:5432/vetrina"),
                ),
            ],
            || {
                let command = crate::cli::commands::new();
                let result = command.try_get_matches_from(vec!["vetrina"]);
                // clap enforces required args before dispatch is reached.
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn server_action_carries_config() {
        temp_env::with_vars(
            [
                ("VETRINA_OTP_SECRET", Some("otp-secret")),
                ("VETRINA_SESSION_SECRET", Some("session-secret")),
                (
                    "VETRINA_DSN",
                    Some("postgres://user@localhost:5432/vetrina"),
                ),
                ("VETRINA_SESSION_TTL_SECONDS", Some("3600")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["vetrina"]);
                let action = handler(&matches).expect("dispatch should succeed");
                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.session_ttl_seconds, 3600);
                assert_eq!(args.otp_secret.expose_secret(), "otp-secret");
                assert_eq!(args.pending_grace_minutes, 15);
            },
        );
    }
}
