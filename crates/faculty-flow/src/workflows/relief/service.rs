use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    Clock, Day, DecisionAction, FacultyId, FacultyRecord, LeaveRequest, LeaveRequestId,
    RequestStatus, SubstituteRequest, SubstituteRequestId, TimetableEntryId,
};
use super::notify::Notifier;
use super::repository::{
    Decision, FacultyDirectory, LeaveRequestStore, RepositoryError, SubstituteRequestStore,
    TimetableIndex, TransitionOutcome,
};

/// Closed error taxonomy for the workflow engine. Machine-checkable kinds
/// with a separate human-readable message, surfaced verbatim to callers.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("request is already {current}")]
    AlreadyDecided { current: RequestStatus },
    #[error("this action link has expired")]
    TokenExpired,
    #[error("unknown or invalid action token")]
    TokenNotFound,
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl WorkflowError {
    pub const fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "validation",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::Forbidden(_) => "forbidden",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::AlreadyDecided { .. } => "already_decided",
            WorkflowError::TokenExpired => "token_expired",
            WorkflowError::TokenNotFound => "token_not_found",
            WorkflowError::Store(_) => "unavailable",
        }
    }
}

/// Intake payload for a new leave request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLeaveRequest {
    pub requester_id: FacultyId,
    pub approver_id: FacultyId,
    pub subject: String,
    pub reason: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

/// Intake payload for a new substitute request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubstituteRequest {
    pub requester_id: FacultyId,
    pub substitute_id: FacultyId,
    pub timetable_entry_id: TimetableEntryId,
    pub request_date: NaiveDate,
    pub day: Day,
    pub reason: String,
}

/// A committed workflow result plus the advisory notification flag. The
/// business transition is authoritative; a failed email never rolls it back.
/// Retries of an already-applied decision send no email, so the flag is
/// absent on them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt<T> {
    #[serde(flatten)]
    pub request: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_delivered: Option<bool>,
}

static LEAVE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static SUBSTITUTE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_leave_id() -> LeaveRequestId {
    LeaveRequestId(LEAVE_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn next_substitute_id() -> SubstituteRequestId {
    SubstituteRequestId(SUBSTITUTE_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Owns the PENDING → APPROVED/REJECTED state machine for both request
/// kinds. No other component writes their status fields; the one
/// correctness-critical step is the store's transition-if-PENDING primitive.
pub struct RequestLifecycleManager {
    leaves: Arc<dyn LeaveRequestStore>,
    substitutes: Arc<dyn SubstituteRequestStore>,
    directory: Arc<dyn FacultyDirectory>,
    timetable: Arc<dyn TimetableIndex>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
}

impl RequestLifecycleManager {
    pub fn new(
        leaves: Arc<dyn LeaveRequestStore>,
        substitutes: Arc<dyn SubstituteRequestStore>,
        directory: Arc<dyn FacultyDirectory>,
        timetable: Arc<dyn TimetableIndex>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            leaves,
            substitutes,
            directory,
            timetable,
            notifier,
            clock,
        }
    }

    /// Create a leave request in PENDING and notify the approver.
    pub fn create_leave(
        &self,
        intake: NewLeaveRequest,
    ) -> Result<Receipt<LeaveRequest>, WorkflowError> {
        if intake.requester_id == intake.approver_id {
            return Err(WorkflowError::Validation(
                "requester cannot approve their own leave".to_string(),
            ));
        }
        if intake.subject.trim().is_empty() || intake.reason.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "subject and reason are required".to_string(),
            ));
        }
        if intake.from_date > intake.to_date {
            return Err(WorkflowError::Validation(
                "fromDate must not be after toDate".to_string(),
            ));
        }
        let now = self.clock.now();
        if intake.from_date < now.date_naive() {
            return Err(WorkflowError::Validation(
                "leave cannot start in the past".to_string(),
            ));
        }

        let requester = self.faculty(intake.requester_id)?;
        let approver = self.faculty(intake.approver_id)?;

        let request = self.leaves.insert(LeaveRequest {
            id: next_leave_id(),
            requester_id: intake.requester_id,
            approver_id: intake.approver_id,
            subject: intake.subject,
            reason: intake.reason,
            from_date: intake.from_date,
            to_date: intake.to_date,
            status: RequestStatus::Pending,
            comments: None,
            requested_at: now,
            decided_at: None,
        })?;

        let delivered = self.notifier.leave_requested(&request, &requester, &approver);
        Ok(Receipt {
            request,
            notification_delivered: Some(delivered),
        })
    }

    /// Create a substitute request in PENDING and notify the candidate.
    pub fn create_substitute(
        &self,
        intake: NewSubstituteRequest,
    ) -> Result<Receipt<SubstituteRequest>, WorkflowError> {
        if intake.requester_id == intake.substitute_id {
            return Err(WorkflowError::Validation(
                "a faculty member cannot substitute for themselves".to_string(),
            ));
        }
        if intake.reason.trim().is_empty() {
            return Err(WorkflowError::Validation("reason is required".to_string()));
        }

        let requester = self.faculty(intake.requester_id)?;
        let substitute = self.faculty(intake.substitute_id)?;

        let entry = self
            .timetable
            .entry(intake.timetable_entry_id)?
            .ok_or_else(|| {
                WorkflowError::NotFound(format!(
                    "timetable entry {} does not exist",
                    intake.timetable_entry_id.0
                ))
            })?;
        if entry.faculty_id != intake.requester_id {
            return Err(WorkflowError::Validation(
                "timetable entry does not belong to the requester".to_string(),
            ));
        }
        if entry.day != intake.day {
            return Err(WorkflowError::Validation(format!(
                "slot is scheduled on {}, not {}",
                entry.day, intake.day
            )));
        }
        if Day::of_date(intake.request_date) != intake.day {
            return Err(WorkflowError::Validation(format!(
                "{} does not fall on a {}",
                intake.request_date, intake.day
            )));
        }
        let now = self.clock.now();
        if intake.request_date < now.date_naive() {
            return Err(WorkflowError::Validation(
                "cover cannot be requested for a past date".to_string(),
            ));
        }

        if self
            .substitutes
            .approved_covering(intake.timetable_entry_id, intake.request_date)?
        {
            return Err(WorkflowError::Conflict(
                "an approved substitute already covers this class on that date".to_string(),
            ));
        }

        let request = self.substitutes.insert(SubstituteRequest {
            id: next_substitute_id(),
            requester_id: intake.requester_id,
            substitute_id: intake.substitute_id,
            timetable_entry_id: intake.timetable_entry_id,
            request_date: intake.request_date,
            day: intake.day,
            reason: intake.reason,
            status: RequestStatus::Pending,
            response_message: None,
            created_at: now,
            decided_at: None,
        })?;

        let delivered = self
            .notifier
            .substitute_requested(&request, &requester, &substitute);
        Ok(Receipt {
            request,
            notification_delivered: Some(delivered),
        })
    }

    /// Decide a leave request. Only the recorded approver may act; exactly
    /// one of any racing calls performs the transition, and a retry of an
    /// already-applied decision by the same actor is answered with the
    /// terminal record rather than an error.
    pub fn decide_leave(
        &self,
        id: LeaveRequestId,
        acting: FacultyId,
        action: DecisionAction,
        comments: Option<String>,
    ) -> Result<Receipt<LeaveRequest>, WorkflowError> {
        let request = self.leave(id)?;
        if request.approver_id != acting {
            return Err(WorkflowError::Forbidden(format!(
                "faculty {acting} is not the approver for leave request {id}"
            )));
        }

        let target = action.terminal_status();
        let outcome = self.leaves.decide_if_pending(
            id,
            Decision {
                status: target,
                note: comments,
                decided_at: self.clock.now(),
            },
        )?;

        match outcome {
            TransitionOutcome::Applied(request) => {
                let requester = self.faculty(request.requester_id)?;
                let delivered = self.notifier.leave_decided(&request, &requester);
                Ok(Receipt {
                    request,
                    notification_delivered: Some(delivered),
                })
            }
            TransitionOutcome::AlreadyDecided(request) if request.status == target => {
                // Benign retry of the decision that already won; no email.
                Ok(Receipt {
                    request,
                    notification_delivered: None,
                })
            }
            TransitionOutcome::AlreadyDecided(request) => Err(WorkflowError::AlreadyDecided {
                current: request.status,
            }),
        }
    }

    /// Decide a substitute request. Approval re-checks slot coverage inside
    /// the store's atomic step, so two PENDING requests for one slot can
    /// never both end up APPROVED.
    pub fn decide_substitute(
        &self,
        id: SubstituteRequestId,
        acting: FacultyId,
        action: DecisionAction,
        response_message: Option<String>,
    ) -> Result<Receipt<SubstituteRequest>, WorkflowError> {
        let request = self.substitute(id)?;
        if request.substitute_id != acting {
            return Err(WorkflowError::Forbidden(format!(
                "faculty {acting} is not the substitute for request {id}"
            )));
        }

        let target = action.terminal_status();
        let outcome = self
            .substitutes
            .decide_if_pending(
                id,
                Decision {
                    status: target,
                    note: response_message,
                    decided_at: self.clock.now(),
                },
            )
            .map_err(|error| match error {
                RepositoryError::CoverageConflict => WorkflowError::Conflict(
                    "another substitute was already approved for this class on that date"
                        .to_string(),
                ),
                other => WorkflowError::Store(other),
            })?;

        match outcome {
            TransitionOutcome::Applied(request) => {
                let requester = self.faculty(request.requester_id)?;
                let delivered = self.notifier.substitute_decided(&request, &requester);
                Ok(Receipt {
                    request,
                    notification_delivered: Some(delivered),
                })
            }
            TransitionOutcome::AlreadyDecided(request) if request.status == target => Ok(Receipt {
                request,
                notification_delivered: None,
            }),
            TransitionOutcome::AlreadyDecided(request) => Err(WorkflowError::AlreadyDecided {
                current: request.status,
            }),
        }
    }

    pub fn leave(&self, id: LeaveRequestId) -> Result<LeaveRequest, WorkflowError> {
        self.leaves
            .fetch(id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("leave request {id} does not exist")))
    }

    pub fn substitute(&self, id: SubstituteRequestId) -> Result<SubstituteRequest, WorkflowError> {
        self.substitutes.fetch(id)?.ok_or_else(|| {
            WorkflowError::NotFound(format!("substitute request {id} does not exist"))
        })
    }

    /// History view for the requester, most recent first.
    pub fn leave_history(&self, requester: FacultyId) -> Result<Vec<LeaveRequest>, WorkflowError> {
        let mut requests = self.leaves.list_by_requester(requester)?;
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(requests)
    }

    pub fn leaves_for_approver(
        &self,
        approver: FacultyId,
        pending_only: bool,
    ) -> Result<Vec<LeaveRequest>, WorkflowError> {
        let mut requests = self.leaves.list_by_approver(approver, pending_only)?;
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(requests)
    }

    /// History view for the requester, most recent first.
    pub fn substitute_history(
        &self,
        requester: FacultyId,
    ) -> Result<Vec<SubstituteRequest>, WorkflowError> {
        let mut requests = self.substitutes.list_by_requester(requester)?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    pub fn substitutes_for_substitute(
        &self,
        substitute: FacultyId,
        pending_only: bool,
    ) -> Result<Vec<SubstituteRequest>, WorkflowError> {
        let mut requests = self.substitutes.list_by_substitute(substitute, pending_only)?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    fn faculty(&self, id: FacultyId) -> Result<FacultyRecord, WorkflowError> {
        self.directory
            .fetch(id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("faculty {id} is not registered")))
    }
}
