use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_utils::test_utils::{JwtTestUtils, MockCalendarResponses, TestConfig, TestUser};
use slot_calendar_cell::router::{slot_calendar_routes, slot_calendar_routes_with_service};
use slot_calendar_cell::{InMemoryCalendarGateway, SlotSchedulingService};

fn create_test_app(config: &TestConfig) -> Router {
    let service = Arc::new(SlotSchedulingService::with_gateway(
        Arc::new(InMemoryCalendarGateway::new()),
        Duration::from_secs(60),
    ));
    slot_calendar_routes_with_service(config.to_arc(), service)
}

fn january_slot_body() -> Value {
    json!({
        "weekdays": ["Mon", "Wed"],
        "windows": [
            { "from_hour": 9, "from_minute": 0, "to_hour": 11, "to_minute": 0 },
            { "from_hour": 14, "from_minute": null, "to_hour": 16, "to_minute": 0 }
        ],
        "booking_mode": "timeslot",
        "slot_duration_minutes": 30,
        "capacity": null,
        "effective_range": { "start": "2025-01-01", "end": "2025-01-31" }
    })
}

fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let config = TestConfig::default();
    let app = create_test_app(&config);

    let request = Request::builder()
        .method("GET")
        .uri("/facility-1/days/2025-01-06")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let user = TestUser::default();
    let expired = JwtTestUtils::create_expired_token(&user, &config.jwt_secret);
    let response = app.clone().oneshot(get_request("/facility-1/days/2025-01-06", &expired)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = JwtTestUtils::create_invalid_signature_token(&user);
    let response = app.oneshot(get_request("/facility-1/days/2025-01-06", &forged)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_then_view_day_and_calendar() {
    let config = TestConfig::default();
    let app = create_test_app(&config);
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.jwt_secret, Some(1));

    let response = app
        .clone()
        .oneshot(json_request("POST", "/facility-1/slots", &token, january_slot_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert!(created["slot_id"].is_string());
    assert_eq!(created["version"], 1);

    let response = app
        .clone()
        .oneshot(get_request("/facility-1/days/2025-01-06", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let day = body_json(response).await;
    assert_eq!(day["view"]["mode"], "timeslot");
    assert_eq!(day["view"]["slots"].as_array().unwrap().len(), 4);
    assert_eq!(day["free_places"], 4);

    let response = app
        .clone()
        .oneshot(get_request("/facility-1/calendar?from=2025-01-06&to=2025-01-07", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let calendar = body_json(response).await;
    assert_eq!(calendar["dates"]["2025-01-06"], "AVAILABLE");
    assert_eq!(calendar["dates"]["2025-01-07"], "NOT_CONFIGURED");

    let response = app
        .oneshot(get_request("/facility-1/days/2025-01-07", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_conflict_and_stale_write_statuses() {
    let config = TestConfig::default();
    let app = create_test_app(&config);
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.jwt_secret, Some(1));

    let response = app
        .clone()
        .oneshot(json_request("POST", "/facility-1/slots", &token, january_slot_body()))
        .await
        .unwrap();
    let slot_id = body_json(response).await["slot_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/facility-1/slots/conflict-check",
            &token,
            json!({ "from_date": "2025-01-15", "to_date": "2025-02-15" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["available"], false);
    assert_eq!(outcome["severity"], "blocking");

    let mut overlapping = january_slot_body();
    overlapping["effective_range"] = json!({ "start": "2025-01-15", "end": "2025-02-15" });
    let response = app
        .clone()
        .oneshot(json_request("POST", "/facility-1/slots", &token, overlapping))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let mut replacement = january_slot_body();
    replacement["version"] = json!(1);
    let uri = format!("/facility-1/slots/{}", slot_id);
    let response = app
        .clone()
        .oneshot(json_request("PUT", &uri, &token, replacement.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["version"], 2);

    let response = app
        .clone()
        .oneshot(json_request("PUT", &uri, &token, replacement))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

    let response = app
        .oneshot(json_request("PUT", &uri, &token, january_slot_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_adjustment_routes() {
    let config = TestConfig::default();
    let app = create_test_app(&config);
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.jwt_secret, Some(1));

    let response = app
        .clone()
        .oneshot(json_request("POST", "/facility-1/slots", &token, january_slot_body()))
        .await
        .unwrap();
    let slot_id = body_json(response).await["slot_id"].as_str().unwrap().to_string();
    let uri = format!("/facility-1/slots/{}/adjustments/2025-01-06", slot_id);

    let response = app
        .clone()
        .oneshot(json_request("PUT", &uri, &token, json!({ "closed": true })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["closed"], true);

    let response = app
        .clone()
        .oneshot(get_request("/facility-1/calendar?from=2025-01-06&to=2025-01-06", &token))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["dates"]["2025-01-06"], "FULL");

    let delete = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(json_request("PUT", &uri, &token, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_doctor_cannot_manage_another_doctors_schedule() {
    let config = TestConfig::default();
    let app = create_test_app(&config);
    let doctor = TestUser::doctor("vet@aptcarepet.test");
    let token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, Some(1));

    let mut body = january_slot_body();
    body["doctor_id"] = json!("someone-else");
    let response = app
        .clone()
        .oneshot(json_request("POST", "/facility-1/slots", &token, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut own = january_slot_body();
    own["doctor_id"] = json!(doctor.id);
    let response = app
        .oneshot(json_request("POST", "/facility-1/slots", &token, own))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_doctor_without_doctor_id_is_scoped_to_self() {
    let config = TestConfig::default();
    let app = create_test_app(&config);
    let doctor = TestUser::doctor("vet@aptcarepet.test");
    let doctor_token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, Some(1));
    let admin_token = JwtTestUtils::create_test_token(
        &TestUser::admin("admin@aptcarepet.test"),
        &config.jwt_secret,
        Some(1),
    );

    let response = app
        .clone()
        .oneshot(json_request("POST", "/facility-1/slots", &doctor_token, january_slot_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["doctor_id"], json!(doctor.id));

    let mut colleague = january_slot_body();
    colleague["doctor_id"] = json!("colleague");
    let response = app
        .clone()
        .oneshot(json_request("POST", "/facility-1/slots", &admin_token, colleague))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let colleague_slot = body_json(response).await["slot_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(get_request(&format!("/facility-1/slots/{}", colleague_slot), &doctor_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_remote_calendar_through_configured_service() {
    let server = MockServer::start().await;
    let config = TestConfig::with_calendar_service(&server.uri());
    let app = slot_calendar_routes(config.to_arc());
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.jwt_secret, Some(1));

    Mock::given(method("GET"))
        .and(path("/calendar/slot-days"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockCalendarResponses::slot_days_response("06/01/2025", "", "08/01/2025"),
        ))
        .mount(&server)
        .await;

    let response = app
        .clone()
        .oneshot(get_request("/facility-1/calendar/remote?from=2025-01-06&to=2025-01-08", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let calendar = body_json(response).await;
    assert_eq!(calendar["dates"]["2025-01-06"], "AVAILABLE");
    assert_eq!(calendar["dates"]["2025-01-07"], "NOT_CONFIGURED");
    assert_eq!(calendar["dates"]["2025-01-08"], "FULL");

    Mock::given(method("GET"))
        .and(path("/calendar/slots/slot-7"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let response = app
        .oneshot(get_request("/facility-1/slots/slot-7", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
