//! Middleware for session resolution, request metrics and CORS.

use std::time::Duration;

use axum::extract::{FromRequestParts, MatchedPath, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use domains::{AppError, AuthContext};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::ApiError;
use crate::AppState;

/// Resolves a bearer token into an `AuthContext` request extension.
///
/// Requests without credentials pass through untouched; handlers that need
/// an identity reject them through the `Session` extractor.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(header) = req.headers().get(AUTHORIZATION) {
        let token = header
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        let ctx = match token {
            Some(token) if !token.is_empty() => state.verifier.verify(token),
            _ => Err(AppError::Unauthorized("malformed authorization header".into())),
        };
        match ctx {
            Ok(ctx) => {
                req.extensions_mut().insert(ctx);
            }
            Err(err) => return ApiError(err).into_response(),
        }
    }
    next.run(req).await
}

/// Counts requests per matched route. Installed with `route_layer` so the
/// matched path is known.
pub async fn track_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().as_str().to_owned();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(req).await;
    state
        .metrics
        .record_request(&method, &route, response.status().as_u16());
    response
}

/// The caller's identity, taken from the request extension set by `authenticate`.
#[derive(Debug, Clone, Copy)]
pub struct Session(pub AuthContext);

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .map(Session)
            .ok_or_else(|| ApiError(AppError::MissingContext("authentication required".into())))
    }
}

/// CORS for browser clients. An empty origin list allows any origin.
pub fn cors_policy(allowed_origins: &[String]) -> CorsLayer {
    let origins = if allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
