//! Database helpers for pending registrations, user records, and the
//! email outbox.
//!
//! Handlers never touch SQL directly; every state transition the auth
//! flows need lives here, and anything that must stay consistent with an
//! outgoing email happens inside one transaction with the outbox insert.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use crate::api::email::{TEMPLATE_RESET_CODE, TEMPLATE_SIGNUP_OTP, TEMPLATE_VERIFY_CODE};

use super::utils::{cooldown_remaining, is_unique_violation};

/// A confirmed account row.
#[derive(Debug, Clone)]
pub(super) struct UserRecord {
    pub(super) id: Uuid,
    pub(super) email: String,
    pub(super) name: String,
    pub(super) password_hash: String,
    pub(super) role: String,
    pub(super) verified: bool,
    pub(super) photo_url: Option<String>,
    pub(super) verification_code_digest: Option<String>,
    pub(super) verification_code_issued_at: Option<DateTime<Utc>>,
    pub(super) forgot_password_code_digest: Option<String>,
    pub(super) forgot_password_code_issued_at: Option<DateTime<Utc>>,
}

/// An unconfirmed signup awaiting OTP verification.
#[derive(Debug)]
pub(super) struct PendingRegistration {
    pub(super) email: String,
    pub(super) name: String,
    pub(super) password_hash: String,
    pub(super) otp_digest: String,
    pub(super) otp_expires_at: DateTime<Utc>,
}

/// Outcome when staging a new pending registration.
#[derive(Debug)]
pub(super) enum StageOutcome {
    Staged,
    Conflict,
}

/// Outcome when reissuing an OTP for an existing pending registration.
#[derive(Debug)]
pub(super) enum RefreshOutcome {
    Refreshed,
    Cooldown { retry_after_seconds: i64 },
    NotFound,
}

/// Outcome when fetching a pending registration for verification.
#[derive(Debug)]
pub(super) enum PendingLookup {
    Found(PendingRegistration),
    Expired,
    NotFound,
}

/// Outcome when promoting a pending registration to a user.
#[derive(Debug)]
pub(super) enum PromoteOutcome {
    Promoted(UserRecord),
    Conflict,
}

const USER_COLUMNS: &str = r"id, email, name, password_hash, role, verified, photo_url,
            verification_code_digest, verification_code_issued_at,
            forgot_password_code_digest, forgot_password_code_issued_at";

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        verified: row.get("verified"),
        photo_url: row.get("photo_url"),
        verification_code_digest: row.get("verification_code_digest"),
        verification_code_issued_at: row.get("verification_code_issued_at"),
        forgot_password_code_digest: row.get("forgot_password_code_digest"),
        forgot_password_code_issued_at: row.get("forgot_password_code_issued_at"),
    }
}

pub(super) async fn lookup_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn lookup_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;

    Ok(row.as_ref().map(user_from_row))
}

/// Stage a signup: park the hashed credentials and OTP digest until the
/// code is verified, and queue the OTP email in the same transaction.
///
/// A stale pending registration for the same email is replaced, never
/// merged; a live one makes this a `Conflict`.
pub(super) async fn stage_pending(
    pool: &PgPool,
    email: &str,
    name: &str,
    password_hash: &str,
    otp_digest: &str,
    otp_ttl_seconds: i64,
    code: &str,
) -> Result<StageOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = r"
        DELETE FROM pending_registrations
        WHERE email = $1 AND otp_expires_at <= NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear expired pending registration")?;

    let query = r"
        INSERT INTO pending_registrations
            (email, name, password_hash, otp_digest, otp_expires_at)
        VALUES ($1, $2, $3, $4, NOW() + ($5 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(otp_digest)
        .bind(otp_ttl_seconds)
        .execute(&mut *tx)
        .instrument(span)
        .await;

    if let Err(err) = result {
        // The email PK is authoritative: a concurrent signup that won the
        // race surfaces here as a live pending registration.
        if is_unique_violation(&err) {
            let _ = tx.rollback().await;
            return Ok(StageOutcome::Conflict);
        }
        return Err(err).context("failed to insert pending registration");
    }

    enqueue_email(&mut tx, email, TEMPLATE_SIGNUP_OTP, name, code).await?;
    tx.commit().await.context("commit signup transaction")?;

    Ok(StageOutcome::Staged)
}

/// Reissue the signup OTP: new digest, expiry extended from now, new
/// email queued. Rejected while the previous code's cooldown is running.
pub(super) async fn refresh_pending(
    pool: &PgPool,
    email: &str,
    otp_digest: &str,
    otp_ttl_seconds: i64,
    cooldown_seconds: i64,
    code: &str,
) -> Result<RefreshOutcome> {
    let mut tx = pool.begin().await.context("begin resend transaction")?;

    let query = r"
        SELECT name, otp_expires_at
        FROM pending_registrations
        WHERE email = $1
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup pending registration for resend")?;

    let Some(row) = row else {
        tx.commit().await.context("commit resend noop")?;
        return Ok(RefreshOutcome::NotFound);
    };

    // The row stores only the expiry; issuance is expiry minus the window.
    let otp_expires_at: DateTime<Utc> = row.get("otp_expires_at");
    let issued_at = otp_expires_at - Duration::seconds(otp_ttl_seconds);
    if let Some(retry_after_seconds) = cooldown_remaining(issued_at, Utc::now(), cooldown_seconds) {
        tx.commit().await.context("commit resend cooldown")?;
        return Ok(RefreshOutcome::Cooldown {
            retry_after_seconds,
        });
    }

    let query = r"
        UPDATE pending_registrations
        SET otp_digest = $2,
            otp_expires_at = NOW() + ($3 * INTERVAL '1 second')
        WHERE email = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(otp_digest)
        .bind(otp_ttl_seconds)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to refresh pending registration")?;

    let name: String = row.get("name");
    enqueue_email(&mut tx, email, TEMPLATE_SIGNUP_OTP, &name, code).await?;
    tx.commit().await.context("commit resend transaction")?;

    Ok(RefreshOutcome::Refreshed)
}

/// Fetch the pending registration for OTP verification, distinguishing a
/// missing record from one whose window has closed.
pub(super) async fn fetch_pending(pool: &PgPool, email: &str) -> Result<PendingLookup> {
    let query = r"
        SELECT email, name, password_hash, otp_digest, otp_expires_at
        FROM pending_registrations
        WHERE email = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch pending registration")?;

    let Some(row) = row else {
        return Ok(PendingLookup::NotFound);
    };

    let pending = PendingRegistration {
        email: row.get("email"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        otp_digest: row.get("otp_digest"),
        otp_expires_at: row.get("otp_expires_at"),
    };

    if pending.otp_expires_at <= Utc::now() {
        return Ok(PendingLookup::Expired);
    }

    Ok(PendingLookup::Found(pending))
}

/// Promote a verified pending registration into a confirmed user and
/// remove the staging row, atomically. The second verification attempt
/// for the same email finds no pending row and fails upstream.
pub(super) async fn promote_pending(
    pool: &PgPool,
    pending: &PendingRegistration,
    photo_url: &str,
) -> Result<PromoteOutcome> {
    let mut tx = pool.begin().await.context("begin promote transaction")?;

    let query = format!(
        r"
        INSERT INTO users (email, name, password_hash, verified, photo_url)
        VALUES ($1, $2, $3, TRUE, $4)
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(&pending.email)
        .bind(&pending.name)
        .bind(&pending.password_hash)
        .bind(photo_url)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user = match row {
        Ok(row) => user_from_row(&row),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(PromoteOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    let query = "DELETE FROM pending_registrations WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&pending.email)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete pending registration")?;

    tx.commit().await.context("commit promote transaction")?;

    Ok(PromoteOutcome::Promoted(user))
}

/// Store a fresh email-verification code digest on the user and queue the
/// code email, in one transaction.
pub(super) async fn set_verification_code(
    pool: &PgPool,
    user: &UserRecord,
    digest: &str,
    code: &str,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("begin verification-code transaction")?;

    let query = r"
        UPDATE users
        SET verification_code_digest = $2,
            verification_code_issued_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .bind(digest)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to store verification code")?;

    enqueue_email(&mut tx, &user.email, TEMPLATE_VERIFY_CODE, &user.name, code).await?;
    tx.commit()
        .await
        .context("commit verification-code transaction")?;

    Ok(())
}

/// Consume a matched verification code: flip `verified` and null the
/// digest pair in one statement so the code cannot be replayed.
pub(super) async fn mark_verified(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET verified = TRUE,
            verification_code_digest = NULL,
            verification_code_issued_at = NULL,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark user verified")?;
    Ok(())
}

/// Store a fresh password-reset code digest and queue the code email.
pub(super) async fn set_forgot_password_code(
    pool: &PgPool,
    user: &UserRecord,
    digest: &str,
    code: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin reset-code transaction")?;

    let query = r"
        UPDATE users
        SET forgot_password_code_digest = $2,
            forgot_password_code_issued_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .bind(digest)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to store reset code")?;

    enqueue_email(&mut tx, &user.email, TEMPLATE_RESET_CODE, &user.name, code).await?;
    tx.commit().await.context("commit reset-code transaction")?;

    Ok(())
}

/// Consume a matched reset code: rotate the password, clear the digest
/// pair, and mark the account verified in one statement. A successful
/// reset proves control of the email, so it doubles as confirmation.
pub(super) async fn reset_password(pool: &PgPool, user_id: Uuid, new_hash: &str) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            verified = TRUE,
            forgot_password_code_digest = NULL,
            forgot_password_code_issued_at = NULL,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to reset password")?;
    Ok(())
}

pub(super) async fn update_password(pool: &PgPool, user_id: Uuid, new_hash: &str) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password")?;
    Ok(())
}

/// Update the display name, returning the refreshed row.
pub(super) async fn update_profile_name(
    pool: &PgPool,
    user_id: Uuid,
    name: &str,
) -> Result<Option<UserRecord>> {
    let query = format!(
        r"
        UPDATE users
        SET name = $2,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(name)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update profile name")?;

    Ok(row.as_ref().map(user_from_row))
}

/// Delete pending registrations whose signup was abandoned: anything
/// older than the grace window, verified or not, is gone.
pub(super) async fn sweep_expired_pending(pool: &PgPool, grace_minutes: i64) -> Result<u64> {
    let query = r"
        DELETE FROM pending_registrations
        WHERE created_at < NOW() - ($1 * INTERVAL '1 minute')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(grace_minutes)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to sweep pending registrations")?;

    Ok(result.rows_affected())
}

async fn enqueue_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    template: &str,
    name: &str,
    code: &str,
) -> Result<()> {
    let payload_json = json!({
        "name": name,
        "code": code,
    });
    let payload_text =
        serde_json::to_string(&payload_json).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;
    Ok(())
}
