//! Response replay for retried mutating requests.
//!
//! A client retrying a `POST /orders` after a network blip sends the same
//! `Idempotency-Key`; within the replay window the stored response is
//! returned verbatim and the pipeline does not run again. The payment layer
//! keys its own idempotency off the order id, so this middleware is the outer
//! of two defenses against double submission.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::BodyExt as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const IDEMPOTENCY_HEADER: &str = "idempotency-key";
const REPLAY_TTL: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub content_type: Option<HeaderValue>,
    stored_at: Instant,
}

/// Keyed store of recently produced responses.
#[derive(Clone, Default)]
pub struct IdempotencyStore {
    entries: Arc<DashMap<String, StoredResponse>>,
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Option<StoredResponse> {
        self.entries
            .get(key)
            .filter(|stored| stored.stored_at.elapsed() < REPLAY_TTL)
            .map(|stored| stored.clone())
    }

    fn insert(&self, key: &str, stored: StoredResponse) {
        self.entries.insert(key.to_string(), stored);
    }

    fn evict_expired(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, stored| now.duration_since(stored.stored_at) < REPLAY_TTL);
    }
}

/// Replays stored responses for mutating requests that repeat an
/// `Idempotency-Key` within the replay window.
pub async fn idempotency_middleware(request: Request, next: Next) -> Response {
    let is_mutating = matches!(
        request.method().as_str(),
        "POST" | "PUT" | "PATCH" | "DELETE"
    );
    if !is_mutating {
        return next.run(request).await;
    }

    let Some(key) = request
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    else {
        return next.run(request).await;
    };

    let Some(store) = request.extensions().get::<IdempotencyStore>().cloned() else {
        return next.run(request).await;
    };

    store.evict_expired();

    if let Some(stored) = store.get(&key) {
        debug!(idempotency_key = %key, "Replaying stored response for repeated idempotency key");
        let mut response = Response::new(axum::body::Body::from(stored.body.clone()));
        *response.status_mut() = stored.status;
        if let Some(content_type) = stored.content_type {
            response
                .headers_mut()
                .insert(HeaderName::from_static("content-type"), content_type);
        }
        return response;
    }

    let response = next.run(request).await;
    let (parts, body) = response.into_parts();

    // Buffer the body so it can be both stored and returned. If buffering
    // fails the client still gets a response, just an unreplayable one.
    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            store.insert(
                &key,
                StoredResponse {
                    status: parts.status,
                    body: bytes.clone(),
                    content_type: parts.headers.get("content-type").cloned(),
                    stored_at: Instant::now(),
                },
            );
            Response::from_parts(parts, axum::body::Body::from(bytes))
        }
        Err(_) => Response::from_parts(parts, axum::body::Body::empty()),
    }
}
