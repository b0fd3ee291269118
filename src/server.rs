//! HTTP serving boundary.
//!
//! A single catch-all route maps request paths onto logical paths:
//!
//! | Request | Response |
//! |---|---|
//! | non-image, or `original=1` | upstream object streamed verbatim |
//! | image | derivative from the cache, materialized on a miss |
//! | fetch / transform failure, invalid path | `404`, detail only in the log |
//!
//! Successful and `304 Not Modified` responses carry
//! `Cache-Control: public, max-age=<n>, immutable`.

use crate::cache::{Cache, validate_logical_path};
use crate::classify;
use crate::params::RawParams;
use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::convert::Infallible;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

#[derive(Clone)]
struct AppState {
    cache: Cache,
    cache_control: HeaderValue,
}

fn cache_control(max_age_secs: u64) -> HeaderValue {
    HeaderValue::from_str(&format!("public, max-age={max_age_secs}, immutable"))
        .unwrap_or_else(|_| HeaderValue::from_static("public, max-age=864000, immutable"))
}

/// Build the router serving originals and derivatives.
pub fn router(cache: Cache, max_age_secs: u64) -> Router {
    let state = AppState {
        cache,
        cache_control: cache_control(max_age_secs),
    };
    Router::new()
        .route("/*path", get(serve_image))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve_image(
    State(state): State<AppState>,
    Path(request_path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> Response {
    let raw = RawParams::from(&query);
    let logical = classify::logical_path(&request_path);

    if let Err(e) = validate_logical_path(logical) {
        warn!(path = %request_path, error = %e, "rejected request path");
        return StatusCode::NOT_FOUND.into_response();
    }

    if raw.is_original() || !classify::is_image_ext(logical) {
        return passthrough(&state, logical).await;
    }

    match state.cache.ensure(logical, &raw).await {
        Ok(cached) => {
            debug!(path = logical, cached = %cached.display(), "serving derivative");
            serve_cached(&state, &cached, request).await
        }
        Err(e) => {
            warn!(path = logical, error = %e, kind = ?e.kind(), "derivative unavailable");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Stream the upstream object. Dropping the response body (client gone)
/// drops the upstream stream with it.
async fn passthrough(state: &AppState, logical: &str) -> Response {
    let object = match state.cache.fetcher().stream(logical).await {
        Ok(object) => object,
        Err(e) => {
            error!(path = logical, error = %e, "original unavailable");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let mut response = Response::new(Body::from_stream(object.body));
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, state.cache_control.clone());
    if let Some(content_type) = object
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(CONTENT_TYPE, content_type);
    }
    if let Some(len) = object.content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    response
}

async fn serve_cached(state: &AppState, cached: &std::path::Path, request: Request) -> Response {
    let result: Result<_, Infallible> = ServeFile::new(cached).oneshot(request).await;
    let mut response = match result {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        response
            .headers_mut()
            .insert(CACHE_CONTROL, state.cache_control.clone());
    }
    response
}
