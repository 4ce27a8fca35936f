//! HTTP middleware: request-id, request logging, security
//! headers, CORS, body-size limit - applied in that order ahead of the
//! router. Trimmed to drop rate limiting and multi-tenancy - this broker
//! has no shared-session layer to protect, just per-request secret
//! headers.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

/// Request id, stashed in request extensions for downstream middleware and
/// handlers to read.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Adds a unique id to each request, reusing an incoming `x-request-id` if
/// the caller already supplied one.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "x-request-id",
        request_id
            .parse()
            .unwrap_or_else(|_| "unknown".parse().unwrap()),
    );
    response
}

/// One tracing span per request, logged at `warn!` for server errors and
/// `info!` otherwise.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let span =
        tracing::info_span!("request", request_id = %request_id, method = %method, uri = %uri);
    let response = {
        let _guard = span.enter();
        next.run(request).await
    };

    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        warn!(
            request_id = %request_id, method = %method, uri = %uri,
            status = status.as_u16(), duration_ms = duration.as_millis() as u64,
            "request completed with error"
        );
    } else {
        info!(
            request_id = %request_id, method = %method, uri = %uri,
            status = status.as_u16(), duration_ms = duration.as_millis() as u64,
            "request completed"
        );
    }

    response
}

/// Permissive CORS for a webhook-ingest API with no browser session to
/// protect - publishers authenticate per request by secret header, not by
/// origin.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            "x-slurpee-secret-id".parse().unwrap(),
            "x-slurpee-secret".parse().unwrap(),
            "x-slurpee-admin-secret".parse().unwrap(),
            "x-request-id".parse().unwrap(),
        ])
        .expose_headers(["x-request-id".parse().unwrap()])
        .max_age(Duration::from_secs(3600))
}

/// Baseline hardening headers on every response.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("x-content-type-options", "nosniff".parse().unwrap());
    headers.insert("x-frame-options", "DENY".parse().unwrap());
    headers.insert(
        "referrer-policy",
        "strict-origin-when-cross-origin".parse().unwrap(),
    );
    headers.insert("x-dns-prefetch-control", "off".parse().unwrap());

    response
}

const MAX_BODY_SIZE: u64 = 1024 * 1024;

/// Rejects request bodies above the ingest cap before they're buffered -
/// events are small JSON objects, not file uploads.
pub async fn body_limit(request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    if let Some(content_length) = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
    {
        if content_length > MAX_BODY_SIZE {
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn request_id_is_generated_when_absent() {
        let app = Router::new()
            .route("/", get(ok_handler))
            .layer(axum::middleware::from_fn(request_id));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn request_id_is_reused_when_present() {
        let app = Router::new()
            .route("/", get(ok_handler))
            .layer(axum::middleware::from_fn(request_id));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", "fixed-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get("x-request-id").unwrap(), "fixed-id");
    }

    #[tokio::test]
    async fn security_headers_are_present_on_every_response() {
        let app = Router::new()
            .route("/", get(ok_handler))
            .layer(axum::middleware::from_fn(security_headers));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_the_handler_runs() {
        let app = Router::new()
            .route("/", post(ok_handler))
            .layer(axum::middleware::from_fn(body_limit));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header(header::CONTENT_LENGTH, (2 * 1024 * 1024).to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn body_within_limit_passes_through() {
        let app = Router::new()
            .route("/", post(ok_handler))
            .layer(axum::middleware::from_fn(body_limit));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header(header::CONTENT_LENGTH, "2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }
}
