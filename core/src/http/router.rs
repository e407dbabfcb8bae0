//! The REST router: `/health`, `/status`, `/maps/key`, and the Places proxy
//! routes. Built the way `server_sql.rs` builds its `axum::Router` — a
//! custom `AppError` + `IntoResponse` impl for the status-code taxonomy,
//! `tower_http` layers for body-size limiting and request tracing.

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::HttpError;
use crate::places::{NearbySearchRequest, PlacesClient, TextSearchRequest, UpstreamOutcome};

const SERVER_BANNER: &str = "CherryRecorder/1.0";

/// Shared state reachable from every handler. `places` is `None` when no API
/// key was configured — every Places route then short-circuits with 400
/// rather than constructing a client that can never succeed.
#[derive(Clone)]
pub struct AppState {
    pub places: Option<Arc<PlacesClient>>,
    pub places_api_key: Option<String>,
}

pub fn build_router(state: AppState, max_body_bytes: usize, read_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/maps/key", get(maps_key))
        .route("/places/nearby", post(places_nearby))
        .route("/places/search", post(places_search))
        .route("/places/details/{id}", get(places_details))
        .route("/places/details/", get(places_details_missing_id))
        .route("/places/photo/{photo_ref}", get(places_photo))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(middleware::from_fn(common_headers))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(read_timeout)),
        )
        .with_state(state)
}

async fn handle_timeout_error(_err: tower::BoxError) -> impl IntoResponse {
    (StatusCode::REQUEST_TIMEOUT, "request timed out")
}

/// Applies the CORS + `Server` headers every response carries, and answers
/// `OPTIONS` preflight requests directly without reaching a route handler.
async fn common_headers(req: axum::extract::Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        apply_common_headers(resp.headers_mut());
        return resp;
    }
    let mut resp = next.run(req).await;
    apply_common_headers(resp.headers_mut());
    resp
}

fn apply_common_headers(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, Accept"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_BANNER));
}

async fn health() -> &'static str {
    "OK"
}

async fn status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn maps_key(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .places_api_key
        .clone()
        .ok_or(AppError(HttpError::BadRequest("places API key is not configured".into())))
}

async fn places_nearby(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    let client = require_places_client(&state)?;
    let req: NearbySearchRequest = parse_json_body(&body)?;
    let outcome = client.nearby_search(req).await.map_err(|e| AppError(HttpError::from(e)))?;
    Ok(outcome_to_response(outcome))
}

async fn places_search(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    let client = require_places_client(&state)?;
    let req: TextSearchRequest = parse_json_body(&body)?;
    let outcome = client.text_search(req).await.map_err(|e| AppError(HttpError::from(e)))?;
    Ok(outcome_to_response(outcome))
}

async fn places_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let client = require_places_client(&state)?;
    let outcome = client.place_details(&id).await.map_err(|e| AppError(HttpError::from(e)))?;
    Ok(outcome_to_response(outcome))
}

async fn places_details_missing_id() -> AppError {
    AppError(HttpError::BadRequest("place id must not be empty".into()))
}

async fn places_photo(
    State(state): State<AppState>,
    Path(photo_ref): Path<String>,
) -> Result<Response, AppError> {
    let client = require_places_client(&state)?;
    match client.place_photo(&photo_ref).await.map_err(|e| AppError(HttpError::from(e)))? {
        UpstreamOutcome::Success(photo) => {
            let mut resp = Response::new(axum::body::Body::from(photo.bytes));
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(&photo.content_type).unwrap_or(HeaderValue::from_static("application/octet-stream")),
            );
            Ok(resp)
        }
        UpstreamOutcome::Forward { status, body } => Ok(forward_response(status, body)),
    }
}

async fn not_found(uri: axum::http::Uri) -> impl IntoResponse {
    (StatusCode::NOT_FOUND, format!("no such resource: {uri}"))
}

fn require_places_client(state: &AppState) -> Result<&PlacesClient, AppError> {
    state
        .places
        .as_deref()
        .ok_or_else(|| AppError(HttpError::BadRequest("places API key is not configured".into())))
}

fn parse_json_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError(HttpError::BadRequest(e.to_string())))
}

fn outcome_to_response<T: serde::Serialize>(outcome: UpstreamOutcome<T>) -> Response {
    match outcome {
        UpstreamOutcome::Success(value) => Json(value).into_response(),
        UpstreamOutcome::Forward { status, body } => forward_response(status, body),
    }
}

/// Forwards an upstream non-2xx/unparseable response transparently: same
/// status, same body, as text (the body may not be valid JSON).
fn forward_response(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, body).into_response()
}

/// Newtype so `HttpError` (defined alongside the other library error enums,
/// with no `axum` dependency of its own) can implement `IntoResponse` here.
pub struct AppError(pub HttpError);

impl From<HttpError> for AppError {
    fn from(e: HttpError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            HttpError::NotFound => (StatusCode::NOT_FOUND, "no such route".to_string()),
            HttpError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string()),
            HttpError::Places(e) => {
                tracing::warn!(error = %e, "places upstream call failed");
                (StatusCode::BAD_GATEWAY, "upstream request failed".to_string())
            }
        };
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn empty_state() -> AppState {
        AppState {
            places: None,
            places_api_key: None,
        }
    }

    async fn send(router: Router, req: Request<Body>) -> Response {
        router.oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok_body() {
        let router = build_router(empty_state(), 1 << 20, Duration::from_secs(30));
        let resp = send(router, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn status_returns_json() {
        let router = build_router(empty_state(), 1 << 20, Duration::from_secs(30));
        let resp = send(router, Request::get("/status").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn maps_key_without_config_is_bad_request() {
        let router = build_router(empty_state(), 1 << 20, Duration::from_secs(30));
        let resp = send(router, Request::get("/maps/key").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn places_routes_without_api_key_are_bad_request() {
        let router = build_router(empty_state(), 1 << 20, Duration::from_secs(30));
        let resp = send(
            router,
            Request::post("/places/nearby")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"latitude":0.0,"longitude":0.0}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn place_details_with_empty_id_is_bad_request_not_404() {
        let router = build_router(empty_state(), 1 << 20, Duration::from_secs(30));
        let resp = send(router, Request::get("/places/details/").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let router = build_router(empty_state(), 1 << 20, Duration::from_secs(30));
        let resp = send(router, Request::get("/nope").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn options_preflight_is_204_with_cors_headers() {
        let router = build_router(empty_state(), 1 << 20, Duration::from_secs(30));
        let resp = send(router, Request::options("/places/nearby").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        assert_eq!(resp.headers().get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "86400");
    }

    #[tokio::test]
    async fn every_response_carries_the_server_banner() {
        let router = build_router(empty_state(), 1 << 20, Duration::from_secs(30));
        let resp = send(router, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.headers().get(header::SERVER).unwrap(), SERVER_BANNER);
    }
}
