use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use queue_cell::router::queue_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockClinicRows, TestConfig, TestUser};

fn create_test_app(config: AppConfig) -> Router {
    queue_routes(Arc::new(config))
}

fn test_setup(mock_server: &MockServer) -> (AppConfig, String) {
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::front_desk(1);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    (config, token)
}

fn request_with_body(method_name: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method_name)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn mock_patient_lookup(mock_server: &MockServer, patient_id: i64) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::patient_row(patient_id, "Test Patient", "0851234567")
        ])))
        .mount(mock_server)
        .await;
}

async fn mock_no_waiting_entry(mock_server: &MockServer, patient_id: i64) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .and(query_param("status", "eq.waiting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

async fn mock_next_queue_number(mock_server: &MockServer, number: i32) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/next_queue_number"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(number)))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn admits_existing_patient_with_allocated_number() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    mock_patient_lookup(&mock_server, 5).await;
    mock_no_waiting_entry(&mock_server, 5).await;
    mock_next_queue_number(&mock_server, 12).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/queue_entries"))
        .and(body_partial_json(json!({
            "patient_id": 5,
            "queue_number": 12,
            "priority": 1,
            "status": "waiting",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "waiting", "2026-08-29T08:00:00Z")
        ])))
        .mount(&mock_server)
        .await;

    let response = app
        .oneshot(request_with_body(
            "POST",
            "/",
            &token,
            json!({ "patient_id": 5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["queue_number"], 12);
    assert_eq!(body["status"], "waiting");
}

#[tokio::test]
async fn admits_walk_in_after_registration() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("phone", "eq.0861111111"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockClinicRows::patient_row(42, "New Walkin", "0861111111")
        ])))
        .mount(&mock_server)
        .await;

    mock_no_waiting_entry(&mock_server, 42).await;
    mock_next_queue_number(&mock_server, 13).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/queue_entries"))
        .and(body_partial_json(json!({ "patient_id": 42, "priority": 5 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockClinicRows::queue_entry_row(2, 42, 13, 5, "waiting", "2026-08-29T08:05:00Z")
        ])))
        .mount(&mock_server)
        .await;

    let response = app
        .oneshot(request_with_body(
            "POST",
            "/",
            &token,
            json!({
                "new_patient": { "name": "New Walkin", "phone": "0861111111" },
                "priority": 5,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["patient_id"], 42);
    assert_eq!(body["priority"], 5);
}

#[tokio::test]
async fn rejects_duplicate_waiting_patient() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    mock_patient_lookup(&mock_server, 5).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("patient_id", "eq.5"))
        .and(query_param("status", "eq.waiting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "waiting", "2026-08-29T08:00:00Z")
        ])))
        .mount(&mock_server)
        .await;

    let response = app
        .oneshot(request_with_body(
            "POST",
            "/",
            &token,
            json!({ "patient_id": 5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(
        body["error"].as_str().unwrap(),
        "Patient is already in the waiting queue"
    );
}

#[tokio::test]
async fn insert_uniqueness_violation_is_rejected_as_duplicate() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    mock_patient_lookup(&mock_server, 5).await;
    mock_no_waiting_entry(&mock_server, 5).await;
    mock_next_queue_number(&mock_server, 12).await;

    // The waiting check saw nothing, but a concurrent admit won the race
    // and the partial unique index rejected the insert
    Mock::given(method("POST"))
        .and(path("/rest/v1/queue_entries"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"idx_queue_entries_one_waiting_per_patient\""
        })))
        .mount(&mock_server)
        .await;

    let response = app
        .oneshot(request_with_body(
            "POST",
            "/",
            &token,
            json!({ "patient_id": 5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(
        body["error"].as_str().unwrap(),
        "Patient is already in the waiting queue"
    );
}

#[tokio::test]
async fn rejects_out_of_range_priority() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    let response = app
        .oneshot(request_with_body(
            "POST",
            "/",
            &token,
            json!({ "patient_id": 5, "priority": 11 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("between 1 and 10"));
}

#[tokio::test]
async fn lists_queue_in_calling_order() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("status", "eq.waiting"))
        .and(query_param("order", "priority.desc,created_at.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::queue_entry_row(3, 7, 14, 9, "waiting", "2026-08-29T08:10:00Z"),
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "waiting", "2026-08-29T08:00:00Z"),
            MockClinicRows::queue_entry_row(2, 6, 13, 1, "waiting", "2026-08-29T08:05:00Z"),
        ])))
        .mount(&mock_server)
        .await;

    let response = app.oneshot(get("/?status=waiting", &token)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["priority"], 9);
}

#[tokio::test]
async fn calls_waiting_patient_in_to_doctor() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "waiting", "2026-08-29T08:00:00Z")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("id", "eq.1"))
        .and(body_partial_json(json!({ "status": "with_doctor" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "with_doctor", "2026-08-29T08:00:00Z")
        ])))
        .mount(&mock_server)
        .await;

    let response = app
        .oneshot(request_with_body(
            "PATCH",
            "/1/status",
            &token,
            json!({ "status": "with_doctor" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "with_doctor");
}

#[tokio::test]
async fn terminal_entry_cannot_change_status() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "skipped", "2026-08-29T08:00:00Z")
        ])))
        .mount(&mock_server)
        .await;

    let response = app
        .oneshot(request_with_body(
            "PATCH",
            "/1/status",
            &token,
            json!({ "status": "waiting" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(
        body["error"].as_str().unwrap(),
        "Cannot update status of completed or skipped entry"
    );
}

#[tokio::test]
async fn with_doctor_entry_cannot_be_skipped() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "with_doctor", "2026-08-29T08:00:00Z")
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("PATCH")
        .uri("/1/skip")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn skip_stamps_timestamp_into_notes() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "waiting", "2026-08-29T08:00:00Z")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("id", "eq.1"))
        .and(body_partial_json(json!({ "status": "skipped" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "skipped", "2026-08-29T08:00:00Z")
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("PATCH")
        .uri("/1/skip")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "skipped");
}

#[tokio::test]
async fn stats_counts_by_status_and_day() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("status", "eq.waiting"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "0-0/3")
                .set_body_json(json!([])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("status", "eq.with_doctor"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "0-0/1")
                .set_body_json(json!([])),
        )
        .mount(&mock_server)
        .await;

    // Day-window count has no status filter
    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "0-0/5")
                .set_body_json(json!([])),
        )
        .mount(&mock_server)
        .await;

    let response = app.oneshot(get("/stats", &token)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["waiting"], 3);
    assert_eq!(body["with_doctor"], 1);
    assert_eq!(body["total_today"], 5);
}

#[tokio::test]
async fn deletes_entry_regardless_of_status() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "completed", "2026-08-29T08:00:00Z")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::queue_entry_row(1, 5, 12, 1, "completed", "2026-08-29T08:00:00Z")
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("DELETE")
        .uri("/1")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["deleted"], true);
}

#[tokio::test]
async fn get_unknown_entry_is_not_found() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config);

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_entries"))
        .and(query_param("id", "eq.404"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let response = app.oneshot(get("/404", &token)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_staff_role_cannot_mutate_queue() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(config.clone());

    let user = TestUser::new(99, "someone@clinic.example", "patient");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let response = app
        .oneshot(request_with_body(
            "POST",
            "/",
            &token,
            json!({ "patient_id": 5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(config.clone());

    let user = TestUser::front_desk(1);
    let token = JwtTestUtils::create_expired_token(&user, &config.supabase_jwt_secret);

    let response = app.oneshot(get("/stats", &token)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
