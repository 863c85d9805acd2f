use super::*;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use tower::ServiceExt;

use crate::state::test_helpers::test_app_state;

async fn send(request: Request<Body>) -> Response {
    app(test_app_state()).oneshot(request).await.unwrap()
}

async fn error_message(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    json["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn healthz_ok() {
    let response = send(Request::get("/healthz").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn inference_requires_api_key() {
    let request = Request::post("/api/inference")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"prompt":"hi","model":"gpt-4"}"#))
        .unwrap();
    let response = send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_message(response).await, "Invalid API key");
}

#[tokio::test]
async fn malformed_api_key_rejected_without_lookup() {
    let request = Request::get(format!("/api/inference/{}", uuid::Uuid::nil()))
        .header("x-api-key", "not-a-key")
        .body(Body::empty())
        .unwrap();
    let response = send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dashboard_requires_bearer_token() {
    for path in ["/api/rate-limit", "/api/history", "/api/keys", "/api/chat/conversations"] {
        let response = send(Request::get(path).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(error_message(response).await, "Unauthorized");
    }
}

#[tokio::test]
async fn unknown_route_is_404() {
    let response = send(Request::get("/api/nope").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn error_json_sets_status() {
    let response = error_json(StatusCode::BAD_REQUEST, "bad");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
