//! TechBazaar Storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use state::AppState;

/// Assemble the storefront router.
///
/// Sentry layers are added by the binary, outside this router.
pub fn app<S>(state: AppState, sessions: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    routes::routes()
        .layer(sessions)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use secrecy::SecretString;
    use tower::ServiceExt;
    use url::Url;

    use techbazaar_core::ShippingPolicy;

    use super::*;
    use crate::config::{SslCommerzConfig, StorefrontConfig};
    use crate::db::MemoryStore;
    use crate::middleware::create_session_layer;
    use crate::services::payment::CallbackUrls;
    use crate::services::{LogNotifier, SslCommerzClient};

    fn router() -> Router {
        let base_url = Url::parse("http://localhost:3000").unwrap();
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/techbazaar"),
            host: [127, 0, 0, 1].into(),
            port: 3000,
            base_url: base_url.clone(),
            session_secret: SecretString::from("router-test-session-secret-0b1c2d3e4f"),
            sslcommerz: SslCommerzConfig {
                store_id: "techbazaar-test".to_string(),
                store_password: SecretString::from("store-password"),
                api_url: Url::parse("http://127.0.0.1:9/gwprocess/v4/api.php").unwrap(),
                timeout_secs: 1,
            },
            shipping: ShippingPolicy::default(),
            sentry_dsn: None,
            sentry_environment: "test".to_string(),
        };
        let gateway = SslCommerzClient::new(
            &config.sslcommerz,
            CallbackUrls::from_base(&base_url).unwrap(),
        )
        .unwrap();
        let sessions = create_session_layer(tower_sessions::MemoryStore::default(), &config);
        let state = AppState::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(gateway),
            Arc::new(LogNotifier),
        );
        app(state, sessions)
    }

    async fn get(path: &str) -> axum::response::Response {
        router()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        assert_eq!(get("/health").await.status(), StatusCode::OK);
        assert_eq!(get("/health/ready").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_checkout_needs_a_session() {
        assert_eq!(get("/checkout").await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(get("/account/orders").await.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_cart_for_new_visitor() {
        let resp = get("/cart/count").await;
        assert_eq!(resp.status(), StatusCode::OK);
        // Reading the cart never issues a guest token
        assert!(resp.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_unknown_callback_redirects_home() {
        let resp = router()
            .oneshot(
                Request::post("/orders/payment/success")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("tran_id=2026101601&val_id=VAL-1"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn test_callbacks_redirect_whatever_the_content_type() {
        let resp = router()
            .oneshot(
                Request::post("/orders/payment/success")
                    .body(Body::from("tran_id=2026101601&val_id=VAL-1"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");

        let resp = router()
            .oneshot(
                Request::post("/orders/payment/fail")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"tran_id":"2026101601"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/checkout?notice=payment_failed");
    }
}
