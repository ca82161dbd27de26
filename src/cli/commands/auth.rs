use anyhow::{Context, Result};
use clap::{Arg, Command};

pub const ARG_OTP_SECRET: &str = "otp-secret";
pub const ARG_SESSION_SECRET: &str = "session-secret";

pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    let command = with_code_args(command);
    let command = with_sweep_args(command);
    with_outbox_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_SECRET)
                .long(ARG_OTP_SECRET)
                .help("HMAC secret used to digest one-time codes")
                .env("VETRINA_OTP_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_SECRET)
                .long(ARG_SESSION_SECRET)
                .help("Signing secret for session tokens")
                .env("VETRINA_SESSION_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Storefront base URL, used for CORS and cookie security")
                .env("VETRINA_FRONTEND_BASE_URL")
                .default_value("https://shop.vetrina.dev"),
        )
        .arg(
            Arg::new("mail-from")
                .long("mail-from")
                .help("Sender identity for outbound email")
                .env("VETRINA_MAIL_FROM")
                .default_value("no-reply@vetrina.dev"),
        )
}

fn with_code_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("otp-ttl-seconds")
                .long("otp-ttl-seconds")
                .help("Signup OTP validity window in seconds")
                .env("VETRINA_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-resend-cooldown-seconds")
                .long("otp-resend-cooldown-seconds")
                .help("Minimum interval between OTP resend requests")
                .env("VETRINA_OTP_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("code-ttl-seconds")
                .long("code-ttl-seconds")
                .help("Verification and password-reset code validity in seconds")
                .env("VETRINA_CODE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session token lifetime in seconds")
                .env("VETRINA_SESSION_TTL_SECONDS")
                .default_value("28800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("bcrypt-cost")
                .long("bcrypt-cost")
                .help("bcrypt cost factor for password hashing")
                .env("VETRINA_BCRYPT_COST")
                .default_value("12")
                .value_parser(clap::value_parser!(u32)),
        )
}

fn with_sweep_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("pending-grace-minutes")
                .long("pending-grace-minutes")
                .help("Minutes a staged signup survives past creation before sweeping")
                .env("VETRINA_PENDING_GRACE_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("pending-sweep-interval-seconds")
                .long("pending-sweep-interval-seconds")
                .help("Interval between staged-signup sweeps")
                .env("VETRINA_PENDING_SWEEP_INTERVAL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("VETRINA_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("VETRINA_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("VETRINA_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("VETRINA_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("VETRINA_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Auth-related options parsed out of CLI matches.
#[derive(Debug)]
pub struct Options {
    pub otp_secret: String,
    pub session_secret: String,
    pub frontend_base_url: String,
    pub mail_from: String,
    pub otp_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub code_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub bcrypt_cost: u32,
    pub pending_grace_minutes: i64,
    pub pending_sweep_interval_seconds: u64,
    pub outbox: OutboxOptions,
}

#[derive(Debug)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    /// Extract options from validated matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is absent.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let otp_secret = matches
            .get_one::<String>(ARG_OTP_SECRET)
            .cloned()
            .with_context(|| format!("missing required argument: --{ARG_OTP_SECRET}"))?;
        let session_secret = matches
            .get_one::<String>(ARG_SESSION_SECRET)
            .cloned()
            .with_context(|| format!("missing required argument: --{ARG_SESSION_SECRET}"))?;

        Ok(Self {
            otp_secret,
            session_secret,
            frontend_base_url: string_arg(matches, "frontend-base-url"),
            mail_from: string_arg(matches, "mail-from"),
            otp_ttl_seconds: matches
                .get_one::<i64>("otp-ttl-seconds")
                .copied()
                .unwrap_or(300),
            otp_resend_cooldown_seconds: matches
                .get_one::<i64>("otp-resend-cooldown-seconds")
                .copied()
                .unwrap_or(60),
            code_ttl_seconds: matches
                .get_one::<i64>("code-ttl-seconds")
                .copied()
                .unwrap_or(300),
            session_ttl_seconds: matches
                .get_one::<i64>("session-ttl-seconds")
                .copied()
                .unwrap_or(28_800),
            bcrypt_cost: matches.get_one::<u32>("bcrypt-cost").copied().unwrap_or(12),
            pending_grace_minutes: matches
                .get_one::<i64>("pending-grace-minutes")
                .copied()
                .unwrap_or(15),
            pending_sweep_interval_seconds: matches
                .get_one::<u64>("pending-sweep-interval-seconds")
                .copied()
                .unwrap_or(900),
            outbox: OutboxOptions {
                poll_seconds: matches
                    .get_one::<u64>("email-outbox-poll-seconds")
                    .copied()
                    .unwrap_or(5),
                batch_size: matches
                    .get_one::<usize>("email-outbox-batch-size")
                    .copied()
                    .unwrap_or(10),
                max_attempts: matches
                    .get_one::<u32>("email-outbox-max-attempts")
                    .copied()
                    .unwrap_or(5),
                backoff_base_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-base-seconds")
                    .copied()
                    .unwrap_or(5),
                backoff_max_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-max-seconds")
                    .copied()
                    .unwrap_or(300),
            },
        })
    }
}

fn string_arg(matches: &clap::ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}
