use crate::api::handlers::{
    auth::{self, AuthState, SweepSettings, sweeper},
    health, root,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, patch, post},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod email;
pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

/// Build the API router with all auth routes registered.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health))
        .route("/api/auth/signup", post(auth::signup::signup))
        .route("/api/auth/resend-otp", post(auth::signup::resend_otp))
        .route("/api/auth/verify-otp", post(auth::signup::verify_otp))
        .route("/api/auth/signin", post(auth::session::signin))
        .route("/api/auth/signout", post(auth::session::signout))
        .route(
            "/api/auth/sendVerificationCode",
            post(auth::verification::send_verification_code),
        )
        .route(
            "/api/auth/verify-code",
            patch(auth::verification::verify_code),
        )
        .route(
            "/api/auth/change-password",
            patch(auth::session::change_password),
        )
        .route(
            "/api/auth/forgot-password-code",
            patch(auth::reset::forgot_password_code),
        )
        .route(
            "/api/auth/forgot-password-code-validation",
            patch(auth::reset::forgot_password_validate),
        )
        .route(
            "/api/auth/update-profile",
            patch(auth::session::update_profile),
        )
        .route("/api/auth/verify", get(auth::session::verify_session))
}

/// Start the server
///
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    auth_state: Arc<AuthState>,
    email_config: email::EmailWorkerConfig,
    sweep: SweepSettings,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    // Background worker polls email_outbox (DB-backed queue) for pending rows,
    // delivers them via the configured sender, and retries failures with backoff.
    let outbox_handle =
        email::spawn_outbox_worker(pool.clone(), Arc::new(email::LogEmailSender), email_config);

    // Owned sweep task: removes staged signups past the grace period.
    let sweeper_handle = sweeper::spawn_pending_sweeper(pool.clone(), sweep);

    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = router()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state.clone()))
                .layer(Extension(pool.clone())),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    // The serve loop has exited; stop the owned background tasks.
    outbox_handle.abort();
    sweeper_handle.abort();

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::{frontend_origin, router};

    #[test]
    fn frontend_origin_strips_path() {
        let origin = frontend_origin("https://shop.vetrina.dev/some/path").expect("valid URL");
        assert_eq!(origin, "https://shop.vetrina.dev");
    }

    #[test]
    fn frontend_origin_keeps_port() {
        let origin = frontend_origin("http://localhost:3000").expect("valid URL");
        assert_eq!(origin, "http://localhost:3000");
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }

    #[test]
    fn router_builds() {
        // Route registration panics on duplicate or malformed paths.
        let _router = router();
    }
}
