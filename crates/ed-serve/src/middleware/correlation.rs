use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use ulid::Ulid;

pub const HEADER_NAME: &str = "x-correlation-id";

/// Upper bound on caller-supplied ids. They are journaled with every event
/// the request emits.
const MAX_LEN: usize = 128;

/// Id tying an HTTP call to the journal events and log lines it produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(format!("corr_{}", Ulid::new()))
    }

    /// Accepts a caller id of `[A-Za-z0-9._:-]`, at most 128 bytes once trimmed.
    pub fn from_header(value: &HeaderValue) -> Option<Self> {
        let value = value.to_str().ok()?.trim();
        let well_formed = !value.is_empty()
            && value.len() <= MAX_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'));
        well_formed.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Tags every request with a correlation id and runs it inside a span
/// carrying that id. A malformed caller id is replaced, not rejected.
pub async fn correlation_middleware(mut request: Request<Body>, next: Next) -> Response {
    let header = HeaderName::from_static(HEADER_NAME);
    let supplied = request.headers().get(&header);
    let id = match supplied.map(CorrelationId::from_header) {
        Some(Some(id)) => id,
        Some(None) => {
            tracing::debug!("malformed correlation id replaced");
            CorrelationId::generate()
        }
        None => CorrelationId::generate(),
    };

    let span = tracing::info_span!(
        "request",
        correlation_id = %id.as_str(),
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(id.clone());
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(header, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{Extension, Router};
    use tower::ServiceExt;

    fn router() -> Router {
        Router::new()
            .route(
                "/",
                get(|Extension(id): Extension<CorrelationId>| async move { id.0 }),
            )
            .layer(axum::middleware::from_fn(correlation_middleware))
    }

    async fn call(header: Option<&str>) -> (String, String) {
        let mut request = Request::get("/");
        if let Some(value) = header {
            request = request.header(HEADER_NAME, value);
        }
        let response = router()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let echoed = response.headers()[HEADER_NAME].to_str().unwrap().to_string();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (echoed, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn caller_id_is_trimmed_and_echoed() {
        let (echoed, seen) = call(Some("  dispatch-desk:42  ")).await;
        assert_eq!(echoed, "dispatch-desk:42");
        assert_eq!(seen, "dispatch-desk:42");
    }

    #[tokio::test]
    async fn missing_or_malformed_ids_are_generated() {
        let (echoed, seen) = call(None).await;
        assert!(echoed.starts_with("corr_"));
        assert_eq!(echoed, seen);

        let oversized = "a".repeat(MAX_LEN + 1);
        for bad in ["   ", "has spaces inside", "semi;colon", oversized.as_str()] {
            let (echoed, seen) = call(Some(bad)).await;
            assert!(echoed.starts_with("corr_"), "{bad:?} was kept");
            assert_eq!(echoed, seen);
        }
    }

    #[test]
    fn from_header_bounds_length() {
        let at_limit = HeaderValue::from_str(&"x".repeat(MAX_LEN)).unwrap();
        assert!(CorrelationId::from_header(&at_limit).is_some());
        let generated = CorrelationId::generate();
        let value = HeaderValue::from_str(generated.as_str()).unwrap();
        assert_eq!(CorrelationId::from_header(&value), Some(generated));
    }
}
