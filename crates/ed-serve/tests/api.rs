use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use ed_core::DispatchConfig;
use ed_serve::{AppState, app};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    router: Router,
}

impl TestApp {
    fn new(config: DispatchConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.db");
        let (state, _fired) = AppState::new(path.to_string_lossy().to_string(), config).unwrap();
        Self {
            _dir: dir,
            router: app(state),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    async fn worker(&self, id: &str, lat: f64, lng: f64) {
        let body = json!({
            "location": {"lat": lat, "lng": lng},
            "is_available": true,
            "services": ["plumbing"],
            "rating": 4.5
        });
        let (status, _, _) = self
            .send(json_request("PUT", &format!("/api/workers/{id}/availability"), &body))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn create(&self, user: &str) -> (StatusCode, HeaderMap, Value) {
        let mut request = json_request("POST", "/api/emergencies", &emergency());
        request
            .headers_mut()
            .insert("x-user-id", user.parse().unwrap());
        self.send(request).await
    }
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn operator_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-operator", "true")
        .body(Body::empty())
        .unwrap()
}

fn emergency() -> Value {
    json!({
        "contact_phone": "+91 98765 43210",
        "location": {"lat": 26.8467, "lng": 80.9462},
        "address": "Hazratganj, Lucknow",
        "service_id": "plumbing",
        "urgency_level": "high"
    })
}

#[tokio::test]
async fn create_dispatches_to_registered_workers() {
    let app = TestApp::new(DispatchConfig::default());
    app.worker("near", 26.85, 80.95).await;
    app.worker("far", 26.90, 81.00).await;

    let (status, headers, receipt) = app.create("user-1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(headers.contains_key("x-correlation-id"));
    assert_eq!(receipt["status"], "dispatched");
    assert_eq!(receipt["candidates_notified"], 1);

    let id = receipt["request_id"].as_str().unwrap();
    let (status, _, detail) = app
        .send(Request::get(format!("/api/emergencies/{id}")).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["request"]["status"], "dispatched");
    assert_eq!(detail["request"]["requester"]["user_id"], "user-1");
    assert_eq!(detail["attempts"][0]["worker_id"], "near");
    assert_eq!(detail["dispatch_log"][0]["event"], "notified");
}

#[tokio::test]
async fn second_accept_is_a_conflict() {
    let app = TestApp::new(DispatchConfig::default());
    app.worker("w1", 26.85, 80.95).await;
    app.worker("w2", 26.851, 80.951).await;
    let (_, _, receipt) = app.create("user-1").await;
    let id = receipt["request_id"].as_str().unwrap();
    let uri = format!("/api/emergencies/{id}/respond");

    let (status, _, first) = app
        .send(json_request("POST", &uri, &json!({"worker_id": "w1", "decision": "accept"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "accepted");

    let (status, _, second) = app
        .send(json_request("POST", &uri, &json!({"worker_id": "w2", "decision": "accept"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(second["code"], "already_assigned");
    assert!(second["correlation_id"].as_str().is_some());

    let (status, _, stranger) = app
        .send(json_request("POST", &uri, &json!({"worker_id": "w9", "decision": "accept"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(stranger["code"], "unknown_candidate");
}

#[tokio::test]
async fn repeat_submission_is_rate_limited_with_retry_after() {
    let app = TestApp::new(DispatchConfig::default());
    let (status, _, receipt) = app.create("user-1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["status"], "escalated");

    let (status, headers, body) = app.create("user-1").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "rate_limited");
    let retry: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!(retry <= 60);

    let (status, _, _) = app.create("user-2").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, _) = app
        .send(Request::get("/api/rate-limit/user-1/attempts").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, attempts) = app
        .send(
            Request::get("/api/rate-limit/user-1/attempts")
                .header("x-operator", "true")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let admitted: Vec<_> = attempts
        .as_array()
        .unwrap()
        .iter()
        .map(|mark| mark["admitted"].as_bool().unwrap())
        .collect();
    assert_eq!(admitted, vec![true, false]);
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let app = TestApp::new(DispatchConfig::default());
    let mut body = emergency();
    body["location"]["lat"] = json!(123.0);
    let (status, _, error) = app.send(json_request("POST", "/api/emergencies", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "invalid_coordinates");

    let mut body = emergency();
    body["urgency_level"] = json!("whenever");
    let (status, _, error) = app.send(json_request("POST", "/api/emergencies", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "invalid_urgency");

    let (status, _, error) = app
        .send(Request::get("/api/emergencies/not-an-id").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "invalid_input");
}

#[tokio::test]
async fn operator_actions_require_the_operator_role() {
    let app = TestApp::new(DispatchConfig::default());
    app.worker("w1", 26.85, 80.95).await;
    let (_, _, receipt) = app.create("user-1").await;
    let id = receipt["request_id"].as_str().unwrap().to_string();

    let (status, _, error) = app
        .send(
            Request::post(format!("/api/emergencies/{id}/escalate"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["code"], "forbidden");

    let (status, _, escalated) = app
        .send(operator_request(&format!("/api/emergencies/{id}/escalate")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(escalated["status"], "escalated");
    assert_eq!(escalated["escalation_reason"], "operator");

    let mut resolve = json_request(
        "POST",
        &format!("/api/emergencies/{id}/resolve"),
        &json!({"note": "plumber on site"}),
    );
    resolve
        .headers_mut()
        .insert("x-operator", "true".parse().unwrap());
    let (status, _, resolved) = app.send(resolve).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "resolved");
    assert!(resolved["resolved_at"].is_string());

    let (status, _, error) = app
        .send(operator_request(&format!("/api/emergencies/{id}/cancel")))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "invalid_state");

    let missing = ed_core::types::RequestId::generate();
    let (status, _, _) = app
        .send(operator_request(&format!("/api/emergencies/{missing}/resolve")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn manual_dispatch_and_listing() {
    let config = DispatchConfig {
        auto_dispatch: false,
        ..DispatchConfig::default()
    };
    let app = TestApp::new(config);
    app.worker("w1", 26.85, 80.95).await;
    let (status, _, receipt) = app.create("user-1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["status"], "queued");
    let id = receipt["request_id"].as_str().unwrap().to_string();

    let (status, _, queued) = app
        .send(Request::get("/api/emergencies?status=queued").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queued.as_array().unwrap().len(), 1);

    let (status, _, dispatched) = app
        .send(operator_request(&format!("/api/emergencies/{id}/dispatch")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dispatched["status"], "dispatched");
    assert_eq!(dispatched["candidates_notified"], 1);

    let (_, _, queued) = app
        .send(Request::get("/api/emergencies?status=queued").body(Body::empty()).unwrap())
        .await;
    assert!(queued.as_array().unwrap().is_empty());

    let (status, _, events) = app
        .send(Request::get("/api/events").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<_> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["body"]["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "EmergencyCreated",
            "DispatchStatusChanged",
            "CandidateNotified",
            "DispatchStatusChanged"
        ]
    );
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new(DispatchConfig::default());
    let (status, _, spec) = app
        .send(Request::get("/api/openapi.json").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(spec["paths"]["/api/emergencies"].is_object());
}
