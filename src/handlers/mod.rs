mod admin;
mod health;
mod metrics;
mod throttle;

pub use admin::{reset_handler, stats_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use throttle::{admit_handler, status_handler};

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

use crate::config::ADMIN_SCOPE;
use crate::middleware::{ScopeGuard, rate_limit, require_admin};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let admin_guard = ScopeGuard {
        state: state.clone(),
        scope: ADMIN_SCOPE,
    };

    // throttle first so token guessing is limited too
    let admin = Router::new()
        .route("/rate-limit/stats", get(stats_handler))
        .route("/rate-limit/{scope}/{client}", delete(reset_handler))
        .route_layer(from_fn_with_state(state.clone(), require_admin))
        .route_layer(from_fn_with_state(admin_guard, rate_limit));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/throttle/{scope}", post(admit_handler).get(status_handler))
        .nest("/api/admin", admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, default_policies};
    use crate::rate_limit::RateLimitPolicy;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state_with(admin_token: Option<&str>) -> AppState {
        let mut policies = default_policies();
        policies.insert(
            ADMIN_SCOPE.to_string(),
            RateLimitPolicy::new(3, Duration::from_secs(60)).unwrap(),
        );
        AppState::new(Config {
            port: 0,
            policies,
            sweep_interval: Duration::from_secs(60),
            retention: Duration::from_secs(3600),
            admin_token: admin_token.map(str::to_string),
        })
    }

    fn request(method: Method, uri: &str, client: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap()
    }

    fn admin_request(method: Method, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-real-ip", "192.0.2.1")
            .header("x-admin-token", token)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn header_str<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
        response.headers()[name].to_str().unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let app = router(state_with(None));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn login_is_throttled_after_five_attempts() {
        let app = router(state_with(None));

        for expected in (0..5).rev() {
            let response = app
                .clone()
                .oneshot(request(Method::POST, "/api/throttle/login", "203.0.113.50, 70.41.3.18"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(header_str(&response, "x-ratelimit-limit"), "5");
            assert_eq!(
                header_str(&response, "x-ratelimit-remaining"),
                expected.to_string()
            );
            let body = json_body(response).await;
            assert_eq!(body["client"], "203.0.113.50");
            assert_eq!(body["remaining"], expected);
        }

        let response = app
            .oneshot(request(Method::POST, "/api/throttle/login", "203.0.113.50"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry: u64 = header_str(&response, header::RETRY_AFTER.as_str())
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry));
        assert_eq!(header_str(&response, "x-ratelimit-remaining"), "0");
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn clients_and_scopes_are_counted_separately() {
        let app = router(state_with(None));

        for _ in 0..5 {
            app.clone()
                .oneshot(request(Method::POST, "/api/throttle/login", "198.51.100.7"))
                .await
                .unwrap();
        }

        let other_client = app
            .clone()
            .oneshot(request(Method::POST, "/api/throttle/login", "198.51.100.8"))
            .await
            .unwrap();
        assert_eq!(other_client.status(), StatusCode::OK);

        let other_scope = app
            .oneshot(request(Method::POST, "/api/throttle/signup", "198.51.100.7"))
            .await
            .unwrap();
        assert_eq!(other_scope.status(), StatusCode::OK);
        assert_eq!(json_body(other_scope).await["remaining"], 2);
    }

    #[tokio::test]
    async fn status_does_not_consume_attempts() {
        let app = router(state_with(None));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request(Method::GET, "/api/throttle/password-reset", "10.1.1.1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["remaining"], 3);
            assert!(body.get("retry_after").is_none());
        }

        app.clone()
            .oneshot(request(Method::POST, "/api/throttle/password-reset", "10.1.1.1"))
            .await
            .unwrap();

        let response = app
            .oneshot(request(Method::GET, "/api/throttle/password-reset", "10.1.1.1"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["remaining"], 2);
    }

    #[tokio::test]
    async fn unknown_scope_is_not_found() {
        let app = router(state_with(None));
        let response = app
            .oneshot(request(Method::POST, "/api/throttle/upload", "10.1.1.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn admin_is_forbidden_without_configured_token() {
        let app = router(state_with(None));
        let response = app
            .oneshot(admin_request(Method::GET, "/api/admin/rate-limit/stats", "anything"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_rejects_wrong_token() {
        let app = router(state_with(Some("s3cret")));
        let response = app
            .oneshot(admin_request(Method::GET, "/api/admin/rate-limit/stats", "guess"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_reset_lets_client_back_in() {
        let state = state_with(Some("s3cret"));
        let app = router(state.clone());

        for _ in 0..6 {
            app.clone()
                .oneshot(request(Method::POST, "/api/throttle/login", "10.9.9.9"))
                .await
                .unwrap();
        }

        let stats = app
            .clone()
            .oneshot(admin_request(Method::GET, "/api/admin/rate-limit/stats", "s3cret"))
            .await
            .unwrap();
        assert_eq!(stats.status(), StatusCode::OK);
        let stats = json_body(stats).await;
        // five logins plus the admin request itself
        assert_eq!(stats["admitted_total"], 6);
        assert_eq!(stats["rejected_total"], 1);

        let reset = app
            .clone()
            .oneshot(admin_request(
                Method::DELETE,
                "/api/admin/rate-limit/login/10.9.9.9",
                "s3cret",
            ))
            .await
            .unwrap();
        assert_eq!(reset.status(), StatusCode::NO_CONTENT);

        // resetting again is harmless
        let again = app
            .clone()
            .oneshot(admin_request(
                Method::DELETE,
                "/api/admin/rate-limit/login/10.9.9.9",
                "s3cret",
            ))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request(Method::POST, "/api/throttle/login", "10.9.9.9"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["remaining"], 4);
    }

    #[tokio::test]
    async fn admin_routes_are_throttled() {
        let app = router(state_with(Some("s3cret")));

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(admin_request(Method::GET, "/api/admin/rate-limit/stats", "wrong"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }

        // the right token does not bypass the admin window
        let response = app
            .oneshot(admin_request(Method::GET, "/api/admin/rate-limit/stats", "s3cret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn metrics_exposes_limiter_counters() {
        let app = router(state_with(None));
        app.clone()
            .oneshot(request(Method::POST, "/api/throttle/login", "10.2.2.2"))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("formguard_admitted_total"));
        assert!(text.contains("formguard_tracked_keys"));
    }
}
