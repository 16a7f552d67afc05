use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde_json::Value;

use crate::workflows::relief::availability::AvailabilityResolver;
use crate::workflows::relief::domain::{
    BatchAssignment, BatchId, Clock, CourseId, Day, FacultyId, FacultyRecord, SubstituteRequestId,
    TimetableEntry, TimetableEntryId,
};
use crate::workflows::relief::memory::{
    InMemoryFacultyDirectory, InMemoryLeaveStore, InMemorySubstituteStore, InMemoryTimetable,
    InMemoryTokenStore,
};
use crate::workflows::relief::notify::Notifier;
use crate::workflows::relief::repository::{
    EmailMessage, NotificationDispatcher, NotificationError,
};
use crate::workflows::relief::router::{relief_router, ReliefState};
use crate::workflows::relief::service::{
    NewLeaveRequest, NewSubstituteRequest, RequestLifecycleManager,
};
use crate::workflows::relief::tokens::ActionTokenGateway;

pub(super) const REQUESTER: FacultyId = FacultyId(1);
pub(super) const BUSY_COLLEAGUE: FacultyId = FacultyId(2);
pub(super) const FREE_COLLEAGUE: FacultyId = FacultyId(3);
pub(super) const OUTSIDER: FacultyId = FacultyId(4);
pub(super) const BATCH: BatchId = BatchId(11);
pub(super) const REQUESTER_SLOT: TimetableEntryId = TimetableEntryId(101);

/// Sunday before the fixture's teaching week.
pub(super) fn start_of_week() -> DateTime<Utc> {
    date(2025, 6, 1)
        .and_time(NaiveTime::from_hms_opt(8, 0, 0).expect("valid time"))
        .and_utc()
}

/// The Monday the requester wants covered.
pub(super) fn monday() -> NaiveDate {
    date(2025, 6, 2)
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

/// Capturing dispatcher that can be flipped into a failing transport.
#[derive(Default)]
pub(super) struct MemoryDispatcher {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl MemoryDispatcher {
    pub(super) fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("dispatcher mutex poisoned").clone()
    }

    pub(super) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl NotificationDispatcher for MemoryDispatcher {
    fn dispatch(&self, message: EmailMessage) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("smtp relay down".to_string()));
        }
        self.sent
            .lock()
            .expect("dispatcher mutex poisoned")
            .push(message);
        Ok(())
    }
}

pub(super) struct Harness {
    pub(super) lifecycle: Arc<RequestLifecycleManager>,
    pub(super) availability: Arc<AvailabilityResolver>,
    pub(super) tokens: Arc<ActionTokenGateway>,
    pub(super) dispatcher: Arc<MemoryDispatcher>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) substitutes: Arc<InMemorySubstituteStore>,
}

impl Harness {
    pub(super) fn router(&self) -> axum::Router {
        let directory = seeded_directory();
        // Routing tests only exercise read endpoints through these copies;
        // workflow state flows through the shared stores above.
        relief_router(Arc::new(ReliefState {
            lifecycle: self.lifecycle.clone(),
            availability: self.availability.clone(),
            tokens: self.tokens.clone(),
            directory,
            timetable: seeded_timetable(),
        }))
    }
}

fn faculty(id: FacultyId, name: &str, assignments: Vec<BatchAssignment>) -> FacultyRecord {
    FacultyRecord {
        id,
        name: name.to_string(),
        email: format!("{}@campus.edu", name.to_ascii_lowercase().replace(' ', ".")),
        department: "Computer Science".to_string(),
        designation: "Assistant Professor".to_string(),
        assignments,
    }
}

fn assignment(batch: BatchId) -> BatchAssignment {
    BatchAssignment {
        batch_id: batch,
        course_id: CourseId(21),
    }
}

pub(super) fn seeded_directory() -> Arc<InMemoryFacultyDirectory> {
    let directory = Arc::new(InMemoryFacultyDirectory::default());
    directory.register(faculty(REQUESTER, "Meera Pillai", vec![assignment(BATCH)]));
    directory.register(faculty(
        BUSY_COLLEAGUE,
        "Arun Sharma",
        vec![assignment(BATCH)],
    ));
    directory.register(faculty(
        FREE_COLLEAGUE,
        "Divya Nair",
        vec![assignment(BATCH)],
    ));
    directory.register(faculty(OUTSIDER, "Kiran Rao", Vec::new()));
    directory
}

fn entry(
    id: u64,
    faculty: FacultyId,
    day: Day,
    period_number: u8,
    batch: BatchId,
) -> TimetableEntry {
    TimetableEntry {
        id: TimetableEntryId(id),
        faculty_id: faculty,
        day,
        period_number,
        batch_id: batch,
        course_id: CourseId(21),
        start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
        end_time: NaiveTime::from_hms_opt(10, 0, 0).expect("valid time"),
    }
}

pub(super) fn seeded_timetable() -> Arc<InMemoryTimetable> {
    let timetable = Arc::new(InMemoryTimetable::default());
    // Requester's own Monday class, the one that needs covering.
    timetable
        .add_entry(entry(101, REQUESTER, Day::Monday, 2, BATCH))
        .expect("unique entry");
    // Arun teaches another batch in the same slot.
    timetable
        .add_entry(entry(102, BUSY_COLLEAGUE, Day::Monday, 2, BatchId(12)))
        .expect("unique entry");
    timetable
        .add_entry(entry(103, FREE_COLLEAGUE, Day::Tuesday, 2, BATCH))
        .expect("unique entry");
    timetable
}

pub(super) fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(start_of_week()));
    let dispatcher = Arc::new(MemoryDispatcher::default());
    let directory = seeded_directory();
    let timetable = seeded_timetable();
    let substitutes = Arc::new(InMemorySubstituteStore::default());

    let tokens = Arc::new(ActionTokenGateway::new(
        Arc::new(InMemoryTokenStore::default()),
        clock.clone(),
        Duration::hours(72),
    ));
    let notifier = Notifier::new(dispatcher.clone(), tokens.clone(), "http://portal.test");
    let lifecycle = Arc::new(RequestLifecycleManager::new(
        Arc::new(InMemoryLeaveStore::default()),
        substitutes.clone(),
        directory.clone(),
        timetable.clone(),
        notifier,
        clock.clone(),
    ));
    let availability = Arc::new(AvailabilityResolver::new(directory, timetable));

    Harness {
        lifecycle,
        availability,
        tokens,
        dispatcher,
        clock,
        substitutes,
    }
}

pub(super) fn leave_intake() -> NewLeaveRequest {
    NewLeaveRequest {
        requester_id: REQUESTER,
        approver_id: FREE_COLLEAGUE,
        subject: "Medical leave".to_string(),
        reason: "Scheduled surgery".to_string(),
        from_date: date(2025, 6, 2),
        to_date: date(2025, 6, 4),
    }
}

pub(super) fn substitute_intake(substitute: FacultyId) -> NewSubstituteRequest {
    NewSubstituteRequest {
        requester_id: REQUESTER,
        substitute_id: substitute,
        timetable_entry_id: REQUESTER_SLOT,
        request_date: monday(),
        day: Day::Monday,
        reason: "Out for a conference".to_string(),
    }
}

pub(super) fn approve_substitute(harness: &Harness, id: SubstituteRequestId, by: FacultyId) {
    harness
        .lifecycle
        .decide_substitute(
            id,
            by,
            crate::workflows::relief::domain::DecisionAction::Approve,
            None,
        )
        .expect("substitute approval succeeds");
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
