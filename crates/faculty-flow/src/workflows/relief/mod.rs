//! Leave & substitute request workflow engine.
//!
//! The components mirror the subsystem boundaries of the portal: the
//! [`availability::AvailabilityResolver`] projects conflict-free substitute
//! candidates out of the Timetable Oracle's schedule, the
//! [`service::RequestLifecycleManager`] owns both request state machines,
//! and the [`tokens::ActionTokenGateway`] lets approvers act through
//! single-use email links without an authenticated session.

pub mod availability;
pub mod domain;
pub mod memory;
pub mod notify;
pub mod repository;
pub mod router;
pub mod service;
pub mod tokens;

#[cfg(test)]
mod tests;

pub use availability::{AvailabilityQuery, AvailabilityResolver, SubstituteCandidate};
pub use domain::{
    BatchAssignment, BatchId, Clock, CourseId, Day, DecisionAction, FacultyId, FacultyRecord,
    LeaveRequest, LeaveRequestId, RequestKind, RequestStatus, SubstituteRequest,
    SubstituteRequestId, SystemClock, TimetableEntry, TimetableEntryId,
};
pub use notify::{ActionLink, Notifier};
pub use repository::{
    ActionToken, ActionTokenStore, EmailMessage, FacultyDirectory, LeaveRequestStore,
    NotificationDispatcher, NotificationError, RedeemOutcome, RepositoryError,
    SubstituteRequestStore, TimetableIndex,
};
pub use router::{relief_router, ReliefState};
pub use service::{
    NewLeaveRequest, NewSubstituteRequest, Receipt, RequestLifecycleManager, WorkflowError,
};
pub use tokens::ActionTokenGateway;
