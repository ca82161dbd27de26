//! Email outbox worker and delivery abstractions.
//!
//! Auth flows never send mail inline. They enqueue a row in `email_outbox`
//! inside the same transaction that persists the code digest, so a staged
//! code is always durable before any delivery attempt and a slow or failing
//! mail provider never delays the HTTP response or corrupts auth state.
//!
//! A background task polls the table, locks a batch via
//! `FOR UPDATE SKIP LOCKED`, renders each row into an [`EmailMessage`], and
//! hands it to an [`EmailSender`]. Failed rows are retried with exponential
//! backoff and jitter until a max attempt threshold, then marked `failed`.
//!
//! The default sender for local dev is [`LogEmailSender`], which logs and
//! returns `Ok(())`.

use anyhow::{Context, Result, anyhow};
use rand::Rng;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

/// Outbox templates understood by the renderer.
pub const TEMPLATE_SIGNUP_OTP: &str = "signup_otp";
pub const TEMPLATE_VERIFY_CODE: &str = "verify_code";
pub const TEMPLATE_RESET_CODE: &str = "reset_code";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub body_html: String,
}

/// Email delivery abstraction used by the outbox worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to mark it as failed.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the envelope instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            from_email = %message.from_email,
            to_email = %message.to_email,
            subject = %message.subject,
            "email outbox send stub"
        );
        debug!(body = %message.body_html, "email outbox body");
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct EmailWorkerConfig {
    mail_from: String,
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Default worker config: 5s poll interval, 10 messages per batch,
    /// 5 max attempts, and 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mail_from: "no-reply@vetrina.dev".to_string(),
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_mail_from(mut self, mail_from: String) -> Self {
        self.mail_from = mail_from;
        self
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Clamp zero or inconsistent settings to workable values.
    #[must_use]
    pub fn normalize(self) -> Self {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.poll_interval
        };
        let batch_size = if self.batch_size == 0 {
            1
        } else {
            self.batch_size
        };
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            mail_from: self.mail_from,
            poll_interval,
            batch_size,
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn mail_from(&self) -> &str {
        &self.mail_from
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Render an outbox row into a deliverable message.
///
/// The payload carries the plaintext code and optional display name; the
/// digest in the auth tables is the only copy the service retains.
fn render(
    mail_from: &str,
    to_email: &str,
    template: &str,
    payload: &Value,
) -> Result<EmailMessage> {
    let code = payload
        .get("code")
        .and_then(Value::as_str)
        .context("email payload is missing the code field")?;
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("there");

    let (subject, body_html) = match template {
        TEMPLATE_SIGNUP_OTP => (
            "Confirm your email address".to_string(),
            format!(
                "<p>Hi {name},</p><p>Your signup verification code is \
                 <strong>{code}</strong>. It expires in 5 minutes.</p>"
            ),
        ),
        TEMPLATE_VERIFY_CODE => (
            "Verify your account".to_string(),
            format!(
                "<p>Hi {name},</p><p>Your account verification code is \
                 <strong>{code}</strong>. It expires in 5 minutes.</p>"
            ),
        ),
        TEMPLATE_RESET_CODE => (
            "Reset your password".to_string(),
            format!(
                "<p>Hi {name},</p><p>Your password reset code is \
                 <strong>{code}</strong>. It expires in 5 minutes. If you did \
                 not request a reset, you can ignore this email.</p>"
            ),
        ),
        other => return Err(anyhow!("unknown email template: {other}")),
    };

    Ok(EmailMessage {
        from_email: mail_from.to_string(),
        to_email: to_email.to_string(),
        subject,
        body_html,
    })
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        let poll_interval = config.poll_interval();

        loop {
            let batch_result = process_outbox_batch(&pool, sender.as_ref(), &config).await;
            if let Err(err) = batch_result {
                error!("email outbox batch failed: {err}");
            }

            sleep(poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    // Grab a locked batch so multiple workers can run without double-sending.
    let query = r"
        SELECT id, to_email, template, payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(0))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    if rows.is_empty() {
        tx.commit()
            .await
            .context("failed to commit empty outbox batch")?;
        return Ok(0);
    }

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let attempts = u32::try_from(attempts).unwrap_or(0);
        let to_email: String = row.get("to_email");
        let template: String = row.get("template");
        let payload: Value = row.get("payload_json");

        let send_result = render(config.mail_from(), &to_email, &template, &payload)
            .and_then(|message| sender.send(&message));
        update_outbox_status(&mut tx, id, attempts, send_result, config).await?;
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn update_outbox_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
    send_result: Result<()>,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let next_attempt = attempts.saturating_add(1);
    let next_attempts_i32 = i32::try_from(next_attempt).unwrap_or(i32::MAX);
    match send_result {
        Ok(()) => {
            let query = r"
                UPDATE email_outbox
                SET status = 'sent',
                    attempts = $2,
                    last_error = NULL,
                    sent_at = NOW(),
                    next_attempt_at = NOW()
                WHERE id = $1
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(id)
                .bind(next_attempts_i32)
                .execute(&mut **tx)
                .instrument(span)
                .await
                .context("failed to update outbox status to sent")?;
        }
        Err(err) => {
            let max_attempts = config.max_attempts();
            if next_attempt >= max_attempts {
                let query = r"
                    UPDATE email_outbox
                    SET status = 'failed',
                        attempts = $2,
                        last_error = $3,
                        next_attempt_at = NOW()
                    WHERE id = $1
                ";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(id)
                    .bind(next_attempts_i32)
                    .bind(err.to_string())
                    .execute(&mut **tx)
                    .instrument(span)
                    .await
                    .context("failed to update outbox status to failed")?;
            } else {
                let delay =
                    backoff_delay(next_attempt, config.backoff_base(), config.backoff_max());
                let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
                let query = r"
                    UPDATE email_outbox
                    SET status = 'pending',
                        attempts = $2,
                        last_error = $3,
                        next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                    WHERE id = $1
                ";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(id)
                    .bind(next_attempts_i32)
                    .bind(err.to_string())
                    .bind(delay_ms)
                    .execute(&mut **tx)
                    .instrument(span)
                    .await
                    .context("failed to update outbox retry schedule")?;
            }
        }
    }

    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_signup_otp_includes_code_and_name() -> Result<()> {
        let payload = json!({"code": "123456", "name": "Ada"});
        let message = render(
            "no-reply@vetrina.dev",
            "ada@example.com",
            TEMPLATE_SIGNUP_OTP,
            &payload,
        )?;
        assert_eq!(message.to_email, "ada@example.com");
        assert_eq!(message.from_email, "no-reply@vetrina.dev");
        assert!(message.body_html.contains("123456"));
        assert!(message.body_html.contains("Ada"));
        Ok(())
    }

    #[test]
    fn render_defaults_missing_name() -> Result<()> {
        let payload = json!({"code": "654321"});
        let message = render(
            "no-reply@vetrina.dev",
            "b@example.com",
            TEMPLATE_RESET_CODE,
            &payload,
        )?;
        assert!(message.body_html.contains("there"));
        assert!(message.subject.contains("Reset"));
        Ok(())
    }

    #[test]
    fn render_rejects_unknown_template() {
        let payload = json!({"code": "111111"});
        let result = render("from@x.com", "to@x.com", "bogus", &payload);
        assert!(result.is_err());
    }

    #[test]
    fn render_rejects_missing_code() {
        let payload = json!({"name": "Ada"});
        let result = render("from@x.com", "to@x.com", TEMPLATE_SIGNUP_OTP, &payload);
        assert!(result.is_err());
    }

    #[test]
    fn normalize_clamps_zero_values() {
        let config = EmailWorkerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .with_backoff_base_seconds(0)
            .with_backoff_max_seconds(0)
            .normalize();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.backoff_base(), Duration::from_secs(1));
        assert!(config.backoff_max() >= config.backoff_base());
    }

    #[test]
    fn backoff_delay_is_capped() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        for attempt in 1..=40 {
            let delay = backoff_delay(attempt, base, max);
            assert!(delay <= max);
        }
    }

    #[test]
    fn log_sender_always_succeeds() {
        let message = EmailMessage {
            from_email: "from@x.com".to_string(),
            to_email: "to@x.com".to_string(),
            subject: "subject".to_string(),
            body_html: "<p>body</p>".to_string(),
        };
        assert!(LogEmailSender.send(&message).is_ok());
    }
}
