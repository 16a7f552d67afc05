use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::availability::{AvailabilityQuery, AvailabilityResolver};
use super::domain::{
    DecisionAction, FacultyId, LeaveRequestId, RequestKind, RequestStatus, SubstituteRequestId,
};
use super::repository::{FacultyDirectory, TimetableIndex};
use super::service::{NewLeaveRequest, NewSubstituteRequest, RequestLifecycleManager, WorkflowError};
use super::tokens::ActionTokenGateway;

/// Shared handler state: the three workflow components plus the read-only
/// collaborators surfaced through directory/timetable endpoints.
pub struct ReliefState {
    pub lifecycle: Arc<RequestLifecycleManager>,
    pub availability: Arc<AvailabilityResolver>,
    pub tokens: Arc<ActionTokenGateway>,
    pub directory: Arc<dyn FacultyDirectory>,
    pub timetable: Arc<dyn TimetableIndex>,
}

/// Router builder exposing the workflow endpoints under `/api/v1`.
pub fn relief_router(state: Arc<ReliefState>) -> Router {
    Router::new()
        .route("/api/v1/requests/leave", post(create_leave).get(list_leaves))
        .route("/api/v1/requests/leave/:id", get(get_leave))
        .route(
            "/api/v1/requests/leave/:id/action/:approver_id",
            put(decide_leave),
        )
        .route(
            "/api/v1/requests/substitute",
            post(create_substitute).get(list_substitutes),
        )
        .route("/api/v1/requests/substitute/:id", get(get_substitute))
        .route(
            "/api/v1/requests/substitute/:id/action/:substitute_id",
            put(decide_substitute),
        )
        .route("/api/v1/availability", get(availability))
        .route("/api/v1/email-actions/:kind/:token", get(redeem_token))
        .route("/api/v1/faculty", get(list_faculty))
        .route("/api/v1/faculty/:id/timetable", get(faculty_timetable))
        .with_state(state)
}

/// Terminal decision payload shared by both action endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecideBody {
    status: RequestStatus,
    #[serde(default)]
    comments: Option<String>,
}

impl DecideBody {
    fn action(&self) -> Result<DecisionAction, WorkflowError> {
        match self.status {
            RequestStatus::Approved => Ok(DecisionAction::Approve),
            RequestStatus::Rejected => Ok(DecisionAction::Reject),
            RequestStatus::Pending => Err(WorkflowError::Validation(
                "status must be APPROVED or REJECTED".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(default)]
    requester_id: Option<FacultyId>,
    #[serde(default)]
    approver_id: Option<FacultyId>,
    #[serde(default)]
    substitute_id: Option<FacultyId>,
    #[serde(default)]
    pending: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct EmailActionQuery {
    #[serde(default)]
    action: Option<DecisionAction>,
    #[serde(default)]
    comment: Option<String>,
}

async fn create_leave(
    State(state): State<Arc<ReliefState>>,
    Json(intake): Json<NewLeaveRequest>,
) -> Response {
    match state.lifecycle.create_leave(intake) {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn list_leaves(
    State(state): State<Arc<ReliefState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let result = match (query.requester_id, query.approver_id) {
        (Some(requester), None) => state.lifecycle.leave_history(requester),
        (None, Some(approver)) => state
            .lifecycle
            .leaves_for_approver(approver, query.pending.unwrap_or(false)),
        _ => Err(WorkflowError::Validation(
            "supply exactly one of requesterId or approverId".to_string(),
        )),
    };
    match result {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn get_leave(State(state): State<Arc<ReliefState>>, Path(id): Path<u64>) -> Response {
    match state.lifecycle.leave(LeaveRequestId(id)) {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn decide_leave(
    State(state): State<Arc<ReliefState>>,
    Path((id, approver_id)): Path<(u64, u64)>,
    Json(body): Json<DecideBody>,
) -> Response {
    let action = match body.action() {
        Ok(action) => action,
        Err(error) => return error_response(error),
    };
    match state.lifecycle.decide_leave(
        LeaveRequestId(id),
        FacultyId(approver_id),
        action,
        body.comments,
    ) {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn create_substitute(
    State(state): State<Arc<ReliefState>>,
    Json(intake): Json<NewSubstituteRequest>,
) -> Response {
    match state.lifecycle.create_substitute(intake) {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn list_substitutes(
    State(state): State<Arc<ReliefState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let result = match (query.requester_id, query.substitute_id) {
        (Some(requester), None) => state.lifecycle.substitute_history(requester),
        (None, Some(substitute)) => state
            .lifecycle
            .substitutes_for_substitute(substitute, query.pending.unwrap_or(false)),
        _ => Err(WorkflowError::Validation(
            "supply exactly one of requesterId or substituteId".to_string(),
        )),
    };
    match result {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn get_substitute(State(state): State<Arc<ReliefState>>, Path(id): Path<u64>) -> Response {
    match state.lifecycle.substitute(SubstituteRequestId(id)) {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn decide_substitute(
    State(state): State<Arc<ReliefState>>,
    Path((id, substitute_id)): Path<(u64, u64)>,
    Json(body): Json<DecideBody>,
) -> Response {
    let action = match body.action() {
        Ok(action) => action,
        Err(error) => return error_response(error),
    };
    match state.lifecycle.decide_substitute(
        SubstituteRequestId(id),
        FacultyId(substitute_id),
        action,
        body.comments,
    ) {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn availability(
    State(state): State<Arc<ReliefState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Response {
    match state.availability.find_candidates(&query) {
        Ok(candidates) => (StatusCode::OK, Json(candidates)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Redeems an email action token. Safe to call repeatedly with the same
/// token: replays return the stored original outcome.
async fn redeem_token(
    State(state): State<Arc<ReliefState>>,
    Path((kind, token)): Path<(RequestKind, String)>,
    Query(query): Query<EmailActionQuery>,
) -> Response {
    match state
        .tokens
        .redeem(&state.lifecycle, kind, &token, query.action, query.comment)
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn list_faculty(State(state): State<Arc<ReliefState>>) -> Response {
    match state.directory.all() {
        Ok(mut records) => {
            records.sort_by(|a, b| a.name.cmp(&b.name));
            (StatusCode::OK, Json(records)).into_response()
        }
        Err(error) => error_response(WorkflowError::Store(error)),
    }
}

async fn faculty_timetable(
    State(state): State<Arc<ReliefState>>,
    Path(id): Path<u64>,
) -> Response {
    match state.timetable.entries_for_faculty(FacultyId(id)) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(error) => error_response(WorkflowError::Store(error)),
    }
}

fn status_for(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Conflict(_) | WorkflowError::AlreadyDecided { .. } => StatusCode::CONFLICT,
        WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
        WorkflowError::NotFound(_) | WorkflowError::TokenNotFound => StatusCode::NOT_FOUND,
        WorkflowError::TokenExpired => StatusCode::GONE,
        WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: WorkflowError) -> Response {
    let payload = json!({
        "kind": error.kind(),
        "message": error.to_string(),
    });
    (status_for(&error), Json(payload)).into_response()
}
