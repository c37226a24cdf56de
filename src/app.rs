//! Shared application state and the HTTP router.
//!
//! # Route Groups
//!
//! - Public: `/health`, the auth entry points and the billing webhook
//! - Authenticated: everything else, behind [`session_middleware`]

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config,
    db::DbPool,
    handlers,
    middleware::auth::session_middleware,
    services::{
        billing_service::StripeClient, completion_client::CompletionClient,
        email_service::EmailService,
    },
};

/// State shared by every handler.
///
/// Cloning is cheap: the pool and HTTP clients are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub email: Arc<EmailService>,
    pub stripe: StripeClient,
    pub completion: CompletionClient,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> anyhow::Result<Self> {
        let email = EmailService::new(&config)?;
        let stripe = StripeClient::new(&config)?;
        let completion = CompletionClient::new(&config)?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            email: Arc::new(email),
            stripe,
            completion,
        })
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

/// Origin allowed to make credentialed cross-site requests: the web client.
fn allowed_origin(app_base_url: &str) -> anyhow::Result<HeaderValue> {
    let origin = url::Url::parse(app_base_url)?.origin().ascii_serialization();
    Ok(HeaderValue::from_str(&origin)?)
}

/// Build the application router.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin(&state.config.app_base_url)?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let authenticated_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::auth::me))
        // Billing
        .route("/api/v1/billing/checkout", post(handlers::billing::checkout))
        .route("/api/v1/billing/portal", post(handlers::billing::portal))
        .route(
            "/api/v1/billing/subscription",
            get(handlers::billing::subscription),
        )
        // Chat and conversations
        .route("/api/v1/chat", post(handlers::chat::send_message))
        .route(
            "/api/v1/conversations",
            get(handlers::conversations::list_conversations),
        )
        .route(
            "/api/v1/conversations/{id}",
            get(handlers::conversations::get_conversation)
                .delete(handlers::conversations::delete_conversation),
        )
        .route(
            "/api/v1/conversations/{id}/share",
            post(handlers::conversations::share_conversation),
        )
        // Jobs
        .route(
            "/api/v1/jobs",
            get(handlers::jobs::list_jobs).post(handlers::jobs::create_job),
        )
        .route(
            "/api/v1/jobs/{id}",
            get(handlers::jobs::get_job)
                .put(handlers::jobs::update_job)
                .delete(handlers::jobs::delete_job),
        )
        // Invoices
        .route(
            "/api/v1/invoices",
            get(handlers::invoices::list_invoices).post(handlers::invoices::create_invoice),
        )
        .route("/api/v1/invoices/{id}", get(handlers::invoices::get_invoice))
        .route(
            "/api/v1/invoices/{id}/status",
            put(handlers::invoices::update_invoice_status),
        )
        .route(
            "/api/v1/invoices/{id}/send",
            post(handlers::invoices::send_invoice),
        )
        // Company and dashboard
        .route(
            "/api/v1/company",
            get(handlers::company::get_company).put(handlers::company::update_company),
        )
        .route("/api/v1/dashboard", get(handlers::dashboard::get_dashboard))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/auth/signup", post(handlers::auth::signup))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .route("/api/v1/auth/magic-link", post(handlers::auth::request_magic_link))
        .route(
            "/api/v1/auth/magic-link/verify",
            post(handlers::auth::verify_magic_link),
        )
        .route("/api/v1/billing/webhook", post(handlers::billing::webhook))
        .merge(authenticated_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::test_config,
        services::{billing_service::sign_payload, session},
    };
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use sqlx::postgres::PgPoolOptions;

    /// State whose pool never connects; requests rejected before any query
    /// are the only ones these tests exercise.
    fn lazy_state(config: Config) -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        AppState::new(pool, config).unwrap()
    }

    fn email_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn server(config: Config) -> TestServer {
        TestServer::new(build_router(lazy_state(config)).unwrap()).unwrap()
    }

    fn config_with_email_dir(dir: &tempfile::TempDir) -> Config {
        let mut config = test_config();
        config.email_dir = dir.path().display().to_string();
        config
    }

    #[tokio::test]
    async fn protected_routes_require_a_session() {
        let dir = email_dir();
        let server = server(config_with_email_dir(&dir));

        for path in ["/api/v1/auth/me", "/api/v1/jobs", "/api/v1/dashboard", "/api/v1/conversations"] {
            let response = server.get(path).await;
            response.assert_status(StatusCode::UNAUTHORIZED);
        }

        let body: serde_json::Value = server.get("/api/v1/invoices").await.json();
        assert_eq!(body["error"]["code"], "unauthenticated");
    }

    #[tokio::test]
    async fn expired_session_cookie_is_rejected() {
        let dir = email_dir();
        let mut config = config_with_email_dir(&dir);
        config.session_ttl_hours = -1;
        let token = session::create_token(uuid::Uuid::new_v4(), "sam@example.com", &config).unwrap();
        let cookie = format!("{}={}", config.session_cookie_name, token);

        let server = server(config);
        let response = server
            .get("/api/v1/auth/me")
            .add_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap())
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["message"], "Session expired");
    }

    #[tokio::test]
    async fn forged_session_cookie_is_rejected() {
        let dir = email_dir();
        let config = config_with_email_dir(&dir);

        let mut other = config.clone();
        other.session_secret = "someone-else".to_string();
        let token = session::create_token(uuid::Uuid::new_v4(), "sam@example.com", &other).unwrap();
        let cookie = format!("{}={}", config.session_cookie_name, token);

        let server = server(config);
        server
            .post("/api/v1/chat")
            .add_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap())
            .json(&serde_json::json!({ "message": "hello" }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_is_rejected() {
        let dir = email_dir();
        let mut config = config_with_email_dir(&dir);
        config.stripe_webhook_secret = Some("whsec_test".to_string());
        let server = server(config);

        let payload = r#"{"id":"evt_1","type":"customer.subscription.updated","data":{"object":{}}}"#;
        let now = chrono::Utc::now().timestamp();
        let forged = sign_payload("whsec_wrong", now, payload);

        let response = server
            .post("/api/v1/billing/webhook")
            .add_header(
                "stripe-signature",
                HeaderValue::from_str(&forged).unwrap(),
            )
            .text(payload)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        server
            .post("/api/v1/billing/webhook")
            .text(payload)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_bodies_get_the_json_error_envelope() {
        let dir = email_dir();
        let server = server(config_with_email_dir(&dir));

        let response = server
            .post("/api/v1/auth/signup")
            .json(&serde_json::json!({}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "invalid_request");
        assert!(body["error"]["message"].as_str().unwrap().contains("email"));

        let response = server
            .post("/api/v1/auth/login")
            .text("not json")
            .content_type("application/json")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "invalid_request");

        // Missing content type is reported the same way.
        let response = server.post("/api/v1/auth/login").text("not json").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn logout_expires_the_cookie() {
        let dir = email_dir();
        let server = server(config_with_email_dir(&dir));

        let response = server.post("/api/v1/auth/logout").await;
        response.assert_status(StatusCode::NO_CONTENT);

        let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("buildmate_session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn cors_origin_is_the_client_origin() {
        assert_eq!(
            allowed_origin("https://app.buildmate.co.uk/dashboard").unwrap(),
            "https://app.buildmate.co.uk"
        );
        assert!(allowed_origin("not a url").is_err());
    }
}
