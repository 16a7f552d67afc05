use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::relief::domain::{DecisionAction, RequestStatus};

fn post(uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

fn put(uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::put(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request builds")
}

fn leave_payload() -> serde_json::Value {
    json!({
        "requesterId": 1,
        "approverId": 3,
        "subject": "Medical leave",
        "reason": "Scheduled surgery",
        "fromDate": "2025-06-02",
        "toDate": "2025-06-04",
    })
}

#[tokio::test]
async fn create_leave_returns_created_with_advisory_flag() {
    let harness = harness();
    let response = harness
        .router()
        .oneshot(post("/api/v1/requests/leave", leave_payload()))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "PENDING");
    assert_eq!(payload["notificationDelivered"], true);
    assert!(payload["id"].is_u64());
}

#[tokio::test]
async fn invalid_leave_payload_maps_to_validation_error() {
    let harness = harness();
    let mut payload = leave_payload();
    payload["fromDate"] = json!("2025-06-09");
    payload["toDate"] = json!("2025-06-02");

    let response = harness
        .router()
        .oneshot(post("/api/v1/requests/leave", payload))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "validation");
    assert!(payload["message"].is_string());
}

#[tokio::test]
async fn decide_route_enforces_the_recorded_approver() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");

    let uri = format!("/api/v1/requests/leave/{}/action/4", receipt.request.id.0);
    let response = harness
        .router()
        .oneshot(put(&uri, json!({ "status": "APPROVED" })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "forbidden");
}

#[tokio::test]
async fn conflicting_redecision_maps_to_conflict() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");
    harness
        .lifecycle
        .decide_leave(
            receipt.request.id,
            FREE_COLLEAGUE,
            DecisionAction::Approve,
            None,
        )
        .expect("approval succeeds");

    let uri = format!("/api/v1/requests/leave/{}/action/3", receipt.request.id.0);
    let response = harness
        .router()
        .oneshot(put(
            &uri,
            json!({ "status": "REJECTED", "comments": "changed my mind" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "already_decided");
}

#[tokio::test]
async fn leave_lists_filter_by_participant() {
    let harness = harness();
    harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");

    let response = harness
        .router()
        .oneshot(get("/api/v1/requests/leave?approverId=3&pending=true"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(1));

    let response = harness
        .router()
        .oneshot(get("/api/v1/requests/leave"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn availability_endpoint_returns_the_ordered_candidates() {
    let harness = harness();
    let response = harness
        .router()
        .oneshot(get(
            "/api/v1/availability?day=MONDAY&periodNumber=2&excludeFacultyId=1&batchId=11",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let names: Vec<&str> = payload
        .as_array()
        .expect("array payload")
        .iter()
        .map(|candidate| candidate["name"].as_str().expect("name"))
        .collect();
    assert_eq!(names, vec!["Arun Sharma", "Divya Nair", "Kiran Rao"]);
}

#[tokio::test]
async fn availability_endpoint_accepts_the_short_period_parameter() {
    let harness = harness();
    let response = harness
        .router()
        .oneshot(get(
            "/api/v1/availability?day=MONDAY&period=2&excludeFacultyId=1",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert!(payload.as_array().is_some_and(|rows| !rows.is_empty()));
}

#[tokio::test]
async fn email_action_endpoint_is_replay_safe() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_substitute(substitute_intake(FREE_COLLEAGUE))
        .expect("creation succeeds");
    let token = harness
        .tokens
        .mint_for_substitute(receipt.request.id, Some(DecisionAction::Approve))
        .expect("mint succeeds");

    let uri = format!("/api/v1/email-actions/substitute/{}", token.value);
    let first = harness
        .router()
        .oneshot(get(&uri))
        .await
        .expect("route executes");
    assert_eq!(first.status(), StatusCode::OK);
    let first = read_json_body(first).await;
    assert_eq!(first["status"], "APPROVED");

    let second = harness
        .router()
        .oneshot(get(&uri))
        .await
        .expect("route executes");
    assert_eq!(second.status(), StatusCode::OK);
    let second = read_json_body(second).await;
    assert_eq!(first, second);

    let request = harness
        .lifecycle
        .substitute(receipt.request.id)
        .expect("readable");
    assert_eq!(request.status, RequestStatus::Approved);
}

#[tokio::test]
async fn unknown_token_maps_to_not_found() {
    let harness = harness();
    let response = harness
        .router()
        .oneshot(get("/api/v1/email-actions/leave/its-not-real"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "token_not_found");
}

#[tokio::test]
async fn faculty_directory_and_timetable_are_exposed() {
    let harness = harness();
    let response = harness
        .router()
        .oneshot(get("/api/v1/faculty"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(4));

    let response = harness
        .router()
        .oneshot(get("/api/v1/faculty/1/timetable"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload[0]["periodNumber"], 2);
    assert_eq!(payload[0]["day"], "MONDAY");
}
