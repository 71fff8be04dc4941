// API module - HTML views and form actions

pub mod cards;
pub mod health;
pub mod merchants;
pub mod middleware;
pub mod provisioning;
pub mod tokens;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use middleware::session::{create_session_layer, AppState};

/// Full application router with session and tracing layers
pub fn router(state: AppState) -> Router {
    let session_layer = create_session_layer(state.config.secure_cookies);

    Router::new()
        .route("/health", get(health::health_check))
        .merge(cards::router())
        .merge(merchants::router())
        .merge(provisioning::router())
        .merge(tokens::router())
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use crate::services::{test_support::ScriptedSource, ProvisioningSequencer};
    use std::sync::{atomic::Ordering, Arc};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            // Nothing listens on the discard port, so routing lands on the mock
            backend_url: "http://127.0.0.1:9".to_string(),
            probe_timeout_ms: 200,
            provisioning_duration_ms: 80,
            status_poll_interval_ms: 10,
            mock_latency: false,
            ..Config::default()
        }
    }

    /// Carries the session cookie between requests like a browser would
    struct Browser {
        app: Router,
        cookie: Option<String>,
    }

    impl Browser {
        fn new() -> Self {
            Self::with_state(AppState::new(test_config()))
        }

        fn with_state(state: AppState) -> Self {
            Self {
                app: router(state),
                cookie: None,
            }
        }

        async fn send(&mut self, method: Method, uri: &str) -> Response {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(cookie) = &self.cookie {
                request = request.header(header::COOKIE, cookie);
            }

            let response = self
                .app
                .clone()
                .oneshot(request.body(Body::empty()).unwrap())
                .await
                .unwrap();

            if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
                let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
                self.cookie = Some(pair.to_string());
            }
            response
        }

        async fn get(&mut self, uri: &str) -> Response {
            self.send(Method::GET, uri).await
        }

        async fn post(&mut self, uri: &str) -> Response {
            self.send(Method::POST, uri).await
        }

        async fn page(&mut self, uri: &str) -> String {
            let response = self.get(uri).await;
            assert_eq!(response.status(), StatusCode::OK, "GET {}", uri);
            body_text(response).await
        }

        /// Follows the loading view until it hands off
        async fn wait_for_handoff(&mut self) -> String {
            for _ in 0..50 {
                let response = self.get("/loading-transition").await;
                if response.status() == StatusCode::SEE_OTHER {
                    return location(&response);
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("provisioning never finished");
        }
    }

    fn location(response: &Response) -> String {
        response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_root_redirects_to_card() {
        let mut browser = Browser::new();
        let response = browser.get("/").await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/cc-details");
    }

    #[tokio::test]
    async fn test_card_view_masks_number_until_revealed() {
        let mut browser = Browser::new();

        let masked = browser.page("/cc-details").await;
        assert!(masked.contains("************9012"));
        assert!(!masked.contains("4532 1234 5678 9012"));
        assert!(masked.contains("Airtel Payment on PayZapp"));

        let revealed = browser.page("/cc-details?reveal=1").await;
        assert!(revealed.contains("4532 1234 5678 9012"));
    }

    #[tokio::test]
    async fn test_push_without_selection_goes_back() {
        let mut browser = Browser::new();
        browser.page("/merchant-apps").await;

        let response = browser.post("/merchant-apps/push").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/merchant-apps");
    }

    #[tokio::test]
    async fn test_select_all_twice_clears() {
        let mut browser = Browser::new();
        browser.page("/merchant-apps").await;

        browser.post("/merchant-apps/select-all").await;
        assert!(browser.page("/merchant-apps").await.contains("7 selected"));

        browser.post("/merchant-apps/select-all").await;
        assert!(browser.page("/merchant-apps").await.contains("0 selected"));
    }

    #[tokio::test]
    async fn test_toggle_outside_catalog_is_rejected() {
        let mut browser = Browser::new();
        browser.page("/merchant-apps").await;

        let response = browser.post("/merchant-apps/toggle/42").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(browser.page("/merchant-apps").await.contains("0 selected"));

        let response = browser.post("/merchant-apps/push").await;
        assert_eq!(location(&response), "/merchant-apps");
    }

    #[tokio::test]
    async fn test_push_while_running_keeps_one_run_and_the_new_selection() {
        let config = test_config();
        let source = Arc::new(ScriptedSource::new());
        let mut state = AppState::new(config.clone());
        state.sequencer = ProvisioningSequencer::new(source.clone(), config.sequencer());
        let mut browser = Browser::with_state(state);

        browser.page("/merchant-apps").await;
        browser.post("/merchant-apps/toggle/2").await;
        let response = browser.post("/merchant-apps/push").await;
        assert_eq!(location(&response), "/loading-transition");

        // Picking again mid-run and pushing a second time lands back on loading
        browser.post("/merchant-apps/toggle/4").await;
        let response = browser.post("/merchant-apps/push").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/loading-transition");

        assert_eq!(browser.wait_for_handoff().await, "/success-state");
        assert_eq!(source.create_calls.load(Ordering::SeqCst), 1);

        let success = browser.page("/success-state").await;
        assert!(success.contains("Uber"));

        // The refused push did not eat the second pick
        assert!(browser.page("/merchant-apps").await.contains("1 selected"));
    }

    #[tokio::test]
    async fn test_full_push_flow_marks_new_tokens() {
        let mut browser = Browser::new();
        browser.page("/merchant-apps").await;
        browser.post("/merchant-apps/toggle/1").await;
        browser.post("/merchant-apps/toggle/3").await;
        assert!(browser.page("/merchant-apps").await.contains("2 selected"));

        let response = browser.post("/merchant-apps/push").await;
        assert_eq!(location(&response), "/loading-transition");
        assert_eq!(browser.wait_for_handoff().await, "/success-state");

        let success = browser.page("/success-state").await;
        assert!(success.contains("Myntra") && success.contains("Zepto"));

        let manage = browser.page("/manage-tokens").await;
        assert!(manage.contains("3/7 active"));
        assert_eq!(manage.matches("class=\"badge-new\"").count(), 2);

        // The selection was consumed by the push
        assert!(browser.page("/merchant-apps").await.contains("0 selected"));
    }

    #[tokio::test]
    async fn test_disable_requires_confirmation() {
        let mut browser = Browser::new();
        let manage = browser.page("/manage-tokens").await;
        assert!(manage.contains("3/7 active"));

        browser.post("/manage-tokens/1/toggle").await;
        let pending = browser.page("/manage-tokens").await;
        assert!(pending.contains("Disable token for Myntra?"));
        assert!(pending.contains("3/7 active"));

        browser.post("/manage-tokens/cancel").await;
        assert!(!browser
            .page("/manage-tokens")
            .await
            .contains("Disable token for Myntra?"));

        browser.post("/manage-tokens/1/toggle").await;
        let response = browser.post("/manage-tokens/confirm").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(browser.page("/manage-tokens").await.contains("2/7 active"));

        browser.post("/manage-tokens/2/toggle").await;
        assert!(browser.page("/manage-tokens").await.contains("3/7 active"));
    }

    #[tokio::test]
    async fn test_leaving_loading_view_cancels_run() {
        let mut browser = Browser::new();
        browser.page("/merchant-apps").await;
        browser.post("/merchant-apps/toggle/6").await;
        browser.post("/merchant-apps/push").await;

        browser.page("/cc-details").await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        // No run and no outcomes: back to selection
        let response = browser.get("/loading-transition").await;
        assert_eq!(location(&response), "/merchant-apps");

        let manage = browser.page("/manage-tokens").await;
        assert!(!manage.contains("class=\"badge-new\""));
    }

    #[tokio::test]
    async fn test_health_reports_mock_route() {
        let mut browser = Browser::new();
        let response = browser.get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let health: health::HealthResponse =
            serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(health.backend.route, "mock");
        assert_eq!(health.status, "degraded");
    }
}
