//! # api-adapters
//!
//! The web routing and orchestration layer for the messaging core.

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod handlers;
pub mod metrics;
#[cfg(feature = "web-axum")]
pub mod middleware;

#[cfg(feature = "web-axum")]
pub use axum_app::*;

#[cfg(feature = "web-axum")]
mod axum_app {
    use std::sync::Arc;

    use axum::routing::{get, patch, post};
    use axum::Router;
    use domains::TokenVerifier;
    use services::Services;
    use tower::ServiceBuilder;
    use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
    use tower_http::trace::TraceLayer;

    use crate::metrics::Metrics;
    use crate::{handlers, middleware};

    /// State shared across all request handlers.
    #[derive(Clone)]
    pub struct AppState {
        pub services: Services,
        pub verifier: Arc<dyn TokenVerifier>,
        pub metrics: Arc<Metrics>,
    }

    impl AppState {
        pub fn new(services: Services, verifier: Arc<dyn TokenVerifier>) -> Self {
            Self {
                services,
                verifier,
                metrics: Arc::new(Metrics::new()),
            }
        }
    }

    /// Builds the full router with its middleware stack.
    pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
        let api = Router::new()
            .route("/messages", post(handlers::send_message))
            .route("/messages/contacts", get(handlers::list_contacts))
            .route("/messages/unread-count", get(handlers::unread_count))
            .route("/messages/{id}", get(handlers::get_conversation))
            .route("/messages/{id}/read", patch(handlers::mark_message_read))
            .route("/presence/me", get(handlers::presence_me))
            .route("/presence/update", post(handlers::presence_update))
            .route("/presence/availability", post(handlers::presence_availability))
            .route("/presence/heartbeat", post(handlers::presence_heartbeat))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::authenticate,
            ));

        Router::new()
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics))
            .merge(api)
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::track_requests,
            ))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(middleware::cors_policy(allowed_origins)),
            )
            .with_state(state)
    }
}
