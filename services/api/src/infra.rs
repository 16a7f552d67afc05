use chrono::NaiveTime;
use faculty_flow::config::WorkflowConfig;
use faculty_flow::workflows::relief::memory::{
    InMemoryFacultyDirectory, InMemoryLeaveStore, InMemorySubstituteStore, InMemoryTimetable,
    InMemoryTokenStore,
};
use faculty_flow::workflows::relief::{
    ActionTokenGateway, AvailabilityResolver, BatchAssignment, BatchId, CourseId, Day,
    EmailMessage, FacultyId, FacultyRecord, NotificationDispatcher, NotificationError, Notifier,
    ReliefState, RepositoryError, RequestLifecycleManager, SystemClock, TimetableEntry,
    TimetableEntryId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Outbound email channel for local deployments: the message lands in the
/// service log instead of an SMTP relay. The action links are still real,
/// so an operator can copy them out of the log and exercise the flow.
#[derive(Default, Clone)]
pub(crate) struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn dispatch(&self, message: EmailMessage) -> Result<(), NotificationError> {
        info!(
            recipient = %message.recipient,
            subject = %message.subject,
            body = %message.body,
            "outbound email"
        );
        Ok(())
    }
}

/// Wire the workflow engine around the given directory and timetable seed.
pub(crate) fn build_engine(
    directory: Arc<InMemoryFacultyDirectory>,
    timetable: Arc<InMemoryTimetable>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    workflow: &WorkflowConfig,
) -> Arc<ReliefState> {
    let clock = Arc::new(SystemClock);
    let leaves = Arc::new(InMemoryLeaveStore::default());
    let substitutes = Arc::new(InMemorySubstituteStore::default());
    let tokens = Arc::new(ActionTokenGateway::new(
        Arc::new(InMemoryTokenStore::default()),
        clock.clone(),
        chrono::Duration::hours(workflow.action_token_ttl_hours),
    ));
    let notifier = Notifier::new(dispatcher, tokens.clone(), workflow.public_base_url.clone());
    let lifecycle = Arc::new(RequestLifecycleManager::new(
        leaves,
        substitutes,
        directory.clone(),
        timetable.clone(),
        notifier,
        clock,
    ));
    let availability = Arc::new(AvailabilityResolver::new(
        directory.clone(),
        timetable.clone(),
    ));

    Arc::new(ReliefState {
        lifecycle,
        availability,
        tokens,
        directory,
        timetable,
    })
}

/// Built-in seed used when no roster CSV is supplied: one small department
/// with overlapping Monday slots so availability queries have something to
/// disagree about.
pub(crate) fn seed_default_fixture(
    directory: &InMemoryFacultyDirectory,
    timetable: &InMemoryTimetable,
) -> Result<(), RepositoryError> {
    let faculty = [
        ("Meera Pillai", "meera.pillai@campus.edu", "Professor", 11, 501),
        ("Arun Sharma", "arun.sharma@campus.edu", "Associate Professor", 12, 502),
        ("Divya Nair", "divya.nair@campus.edu", "Assistant Professor", 11, 503),
        ("Kiran Rao", "kiran.rao@campus.edu", "Assistant Professor", 13, 504),
    ];
    for (index, (name, email, designation, batch, course)) in faculty.into_iter().enumerate() {
        directory.register(FacultyRecord {
            id: FacultyId(index as u64 + 1),
            name: name.to_string(),
            email: email.to_string(),
            department: "Computer Science".to_string(),
            designation: designation.to_string(),
            assignments: vec![BatchAssignment {
                batch_id: BatchId(batch),
                course_id: CourseId(course),
            }],
        });
    }

    let entries = [
        (101, 1, Day::Monday, 2, 11, 501),
        (102, 2, Day::Monday, 2, 12, 502),
        (103, 3, Day::Tuesday, 2, 11, 503),
        (104, 1, Day::Wednesday, 4, 11, 501),
        (105, 4, Day::Friday, 1, 13, 504),
    ];
    for (id, faculty_id, day, period, batch, course) in entries {
        let (start_time, end_time) = period_window(period);
        timetable.add_entry(TimetableEntry {
            id: TimetableEntryId(id),
            faculty_id: FacultyId(faculty_id),
            day,
            period_number: period,
            batch_id: BatchId(batch),
            course_id: CourseId(course),
            start_time,
            end_time,
        })?;
    }

    Ok(())
}

/// 55-minute periods on the hour, first period at 09:00.
pub(crate) fn period_window(period: u8) -> (NaiveTime, NaiveTime) {
    let start_secs = (8 + u32::from(period)) * 3600;
    let start = NaiveTime::from_num_seconds_from_midnight_opt(start_secs, 0)
        .unwrap_or(NaiveTime::MIN);
    let end = NaiveTime::from_num_seconds_from_midnight_opt(start_secs + 55 * 60, 0)
        .unwrap_or(NaiveTime::MIN);
    (start, end)
}
