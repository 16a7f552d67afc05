use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Day, FacultyId, FacultyRecord, LeaveRequest, LeaveRequestId, RequestKind, RequestStatus,
    SubstituteRequest, SubstituteRequestId, TimetableEntry, TimetableEntryId,
};

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Duplicate,
    #[error("record not found")]
    NotFound,
    #[error("approving would double-cover the slot")]
    CoverageConflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Terminal decision applied through the conditional-update primitive.
#[derive(Debug, Clone)]
pub struct Decision {
    pub status: RequestStatus,
    pub note: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Result of an atomic transition-if-PENDING. `Applied` means this call
/// performed the state change; `AlreadyDecided` carries the record the
/// earlier winner left behind.
#[derive(Debug, Clone)]
pub enum TransitionOutcome<T> {
    Applied(T),
    AlreadyDecided(T),
}

impl<T> TransitionOutcome<T> {
    pub fn record(&self) -> &T {
        match self {
            TransitionOutcome::Applied(record) | TransitionOutcome::AlreadyDecided(record) => {
                record
            }
        }
    }

    pub fn into_record(self) -> T {
        match self {
            TransitionOutcome::Applied(record) | TransitionOutcome::AlreadyDecided(record) => {
                record
            }
        }
    }
}

/// Storage for leave requests. The status field is written exclusively
/// through `decide_if_pending`.
pub trait LeaveRequestStore: Send + Sync {
    fn insert(&self, request: LeaveRequest) -> Result<LeaveRequest, RepositoryError>;
    fn fetch(&self, id: LeaveRequestId) -> Result<Option<LeaveRequest>, RepositoryError>;
    fn list_by_requester(&self, requester: FacultyId)
        -> Result<Vec<LeaveRequest>, RepositoryError>;
    fn list_by_approver(
        &self,
        approver: FacultyId,
        pending_only: bool,
    ) -> Result<Vec<LeaveRequest>, RepositoryError>;
    /// Atomic conditional update: applies `decision` iff the request is still
    /// PENDING. Never a read-then-write across two lock acquisitions.
    fn decide_if_pending(
        &self,
        id: LeaveRequestId,
        decision: Decision,
    ) -> Result<TransitionOutcome<LeaveRequest>, RepositoryError>;
}

/// Storage for substitute requests, with the slot-coverage guard folded into
/// the same atomic step as the status transition.
pub trait SubstituteRequestStore: Send + Sync {
    fn insert(&self, request: SubstituteRequest) -> Result<SubstituteRequest, RepositoryError>;
    fn fetch(&self, id: SubstituteRequestId)
        -> Result<Option<SubstituteRequest>, RepositoryError>;
    fn list_by_requester(
        &self,
        requester: FacultyId,
    ) -> Result<Vec<SubstituteRequest>, RepositoryError>;
    fn list_by_substitute(
        &self,
        substitute: FacultyId,
        pending_only: bool,
    ) -> Result<Vec<SubstituteRequest>, RepositoryError>;
    /// True iff an APPROVED request already covers (entry, date).
    fn approved_covering(
        &self,
        entry: TimetableEntryId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError>;
    /// Atomic transition-if-PENDING. An approval fails with
    /// `CoverageConflict` when another APPROVED request covers the same
    /// (entry, date); the check and the write happen under one lock.
    fn decide_if_pending(
        &self,
        id: SubstituteRequestId,
        decision: Decision,
    ) -> Result<TransitionOutcome<SubstituteRequest>, RepositoryError>;
}

/// Read-only directory of faculty, supplied by admin registration.
pub trait FacultyDirectory: Send + Sync {
    fn fetch(&self, id: FacultyId) -> Result<Option<FacultyRecord>, RepositoryError>;
    fn all(&self) -> Result<Vec<FacultyRecord>, RepositoryError>;
}

/// Read-only view over the base schedule, supplied by the Timetable Oracle.
pub trait TimetableIndex: Send + Sync {
    fn entry(&self, id: TimetableEntryId) -> Result<Option<TimetableEntry>, RepositoryError>;
    fn entries_for_faculty(
        &self,
        faculty: FacultyId,
    ) -> Result<Vec<TimetableEntry>, RepositoryError>;
    fn is_occupied(
        &self,
        faculty: FacultyId,
        day: Day,
        period_number: u8,
    ) -> Result<bool, RepositoryError>;
}

/// Outcome handed back to every redeemer of a consumed action token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemOutcome {
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub message: String,
}

/// Single-use credential backing the email-action links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionToken {
    pub value: String,
    pub kind: RequestKind,
    pub leave_request_id: Option<LeaveRequestId>,
    pub substitute_request_id: Option<SubstituteRequestId>,
    pub fixed_action: Option<super::domain::DecisionAction>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub outcome: Option<RedeemOutcome>,
}

/// Result of the consume-once check-and-set.
#[derive(Debug, Clone)]
pub enum TokenConsumption {
    /// This caller is the first redeemer; the token is now consumed.
    Fresh(ActionToken),
    /// Token was consumed earlier; the stored outcome, when recorded,
    /// is replayed verbatim.
    Replayed(Option<RedeemOutcome>),
    /// Token was never consumed and its expiry has passed.
    Expired,
}

/// Storage for action tokens. Consumption is a single atomic check-and-set;
/// first redeemer wins, everyone else replays.
pub trait ActionTokenStore: Send + Sync {
    fn insert(&self, token: ActionToken) -> Result<(), RepositoryError>;
    fn fetch(&self, value: &str) -> Result<Option<ActionToken>, RepositoryError>;
    fn consume(
        &self,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenConsumption, RepositoryError>;
    /// Stores the winner's outcome so replays observe it.
    fn record_outcome(&self, value: &str, outcome: RedeemOutcome) -> Result<(), RepositoryError>;
}

/// Dispatch error for the out-of-band notification channel.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Plain email payload handed to the delivery adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Best-effort outbound channel. Failures are tolerated by every caller;
/// the committed workflow transition is authoritative, email is a courtesy.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, message: EmailMessage) -> Result<(), NotificationError>;
}
