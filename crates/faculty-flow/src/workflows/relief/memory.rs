//! In-memory reference stores backing the service binary and the test
//! suites. Each store serializes its state behind a single mutex so the
//! conditional-update primitives are genuinely atomic: the status check and
//! the write happen under one lock acquisition.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    Day, FacultyId, FacultyRecord, LeaveRequest, LeaveRequestId, RequestStatus, SubstituteRequest,
    SubstituteRequestId, TimetableEntry, TimetableEntryId,
};
use super::repository::{
    ActionToken, ActionTokenStore, Decision, FacultyDirectory, LeaveRequestStore, RedeemOutcome,
    RepositoryError, SubstituteRequestStore, TimetableIndex, TokenConsumption, TransitionOutcome,
};

#[derive(Default)]
pub struct InMemoryLeaveStore {
    rows: Mutex<BTreeMap<LeaveRequestId, LeaveRequest>>,
}

impl LeaveRequestStore for InMemoryLeaveStore {
    fn insert(&self, request: LeaveRequest) -> Result<LeaveRequest, RepositoryError> {
        let mut rows = self.rows.lock().expect("leave store mutex poisoned");
        if rows.contains_key(&request.id) {
            return Err(RepositoryError::Duplicate);
        }
        rows.insert(request.id, request.clone());
        Ok(request)
    }

    fn fetch(&self, id: LeaveRequestId) -> Result<Option<LeaveRequest>, RepositoryError> {
        let rows = self.rows.lock().expect("leave store mutex poisoned");
        Ok(rows.get(&id).cloned())
    }

    fn list_by_requester(
        &self,
        requester: FacultyId,
    ) -> Result<Vec<LeaveRequest>, RepositoryError> {
        let rows = self.rows.lock().expect("leave store mutex poisoned");
        Ok(rows
            .values()
            .filter(|request| request.requester_id == requester)
            .cloned()
            .collect())
    }

    fn list_by_approver(
        &self,
        approver: FacultyId,
        pending_only: bool,
    ) -> Result<Vec<LeaveRequest>, RepositoryError> {
        let rows = self.rows.lock().expect("leave store mutex poisoned");
        Ok(rows
            .values()
            .filter(|request| request.approver_id == approver)
            .filter(|request| !pending_only || request.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    fn decide_if_pending(
        &self,
        id: LeaveRequestId,
        decision: Decision,
    ) -> Result<TransitionOutcome<LeaveRequest>, RepositoryError> {
        let mut rows = self.rows.lock().expect("leave store mutex poisoned");
        let request = rows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if request.status != RequestStatus::Pending {
            return Ok(TransitionOutcome::AlreadyDecided(request.clone()));
        }
        request.status = decision.status;
        request.comments = decision.note;
        request.decided_at = Some(decision.decided_at);
        Ok(TransitionOutcome::Applied(request.clone()))
    }
}

#[derive(Default)]
pub struct InMemorySubstituteStore {
    rows: Mutex<BTreeMap<SubstituteRequestId, SubstituteRequest>>,
}

impl InMemorySubstituteStore {
    fn covered(
        rows: &BTreeMap<SubstituteRequestId, SubstituteRequest>,
        entry: TimetableEntryId,
        date: NaiveDate,
        excluding: Option<SubstituteRequestId>,
    ) -> bool {
        rows.values().any(|request| {
            Some(request.id) != excluding
                && request.timetable_entry_id == entry
                && request.request_date == date
                && request.status == RequestStatus::Approved
        })
    }
}

impl SubstituteRequestStore for InMemorySubstituteStore {
    fn insert(&self, request: SubstituteRequest) -> Result<SubstituteRequest, RepositoryError> {
        let mut rows = self.rows.lock().expect("substitute store mutex poisoned");
        if rows.contains_key(&request.id) {
            return Err(RepositoryError::Duplicate);
        }
        rows.insert(request.id, request.clone());
        Ok(request)
    }

    fn fetch(
        &self,
        id: SubstituteRequestId,
    ) -> Result<Option<SubstituteRequest>, RepositoryError> {
        let rows = self.rows.lock().expect("substitute store mutex poisoned");
        Ok(rows.get(&id).cloned())
    }

    fn list_by_requester(
        &self,
        requester: FacultyId,
    ) -> Result<Vec<SubstituteRequest>, RepositoryError> {
        let rows = self.rows.lock().expect("substitute store mutex poisoned");
        Ok(rows
            .values()
            .filter(|request| request.requester_id == requester)
            .cloned()
            .collect())
    }

    fn list_by_substitute(
        &self,
        substitute: FacultyId,
        pending_only: bool,
    ) -> Result<Vec<SubstituteRequest>, RepositoryError> {
        let rows = self.rows.lock().expect("substitute store mutex poisoned");
        Ok(rows
            .values()
            .filter(|request| request.substitute_id == substitute)
            .filter(|request| !pending_only || request.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    fn approved_covering(
        &self,
        entry: TimetableEntryId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError> {
        let rows = self.rows.lock().expect("substitute store mutex poisoned");
        Ok(Self::covered(&rows, entry, date, None))
    }

    fn decide_if_pending(
        &self,
        id: SubstituteRequestId,
        decision: Decision,
    ) -> Result<TransitionOutcome<SubstituteRequest>, RepositoryError> {
        let mut rows = self.rows.lock().expect("substitute store mutex poisoned");
        let current = rows.get(&id).ok_or(RepositoryError::NotFound)?;
        if current.status != RequestStatus::Pending {
            return Ok(TransitionOutcome::AlreadyDecided(current.clone()));
        }
        // Coverage guard and transition share this lock acquisition.
        if decision.status == RequestStatus::Approved
            && Self::covered(
                &rows,
                current.timetable_entry_id,
                current.request_date,
                Some(id),
            )
        {
            return Err(RepositoryError::CoverageConflict);
        }
        let request = rows
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        request.status = decision.status;
        request.response_message = decision.note;
        request.decided_at = Some(decision.decided_at);
        Ok(TransitionOutcome::Applied(request.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    rows: Mutex<BTreeMap<String, ActionToken>>,
}

impl ActionTokenStore for InMemoryTokenStore {
    fn insert(&self, token: ActionToken) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().expect("token store mutex poisoned");
        if rows.contains_key(&token.value) {
            return Err(RepositoryError::Duplicate);
        }
        rows.insert(token.value.clone(), token);
        Ok(())
    }

    fn fetch(&self, value: &str) -> Result<Option<ActionToken>, RepositoryError> {
        let rows = self.rows.lock().expect("token store mutex poisoned");
        Ok(rows.get(value).cloned())
    }

    fn consume(
        &self,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenConsumption, RepositoryError> {
        let mut rows = self.rows.lock().expect("token store mutex poisoned");
        let token = rows.get_mut(value).ok_or(RepositoryError::NotFound)?;
        if token.consumed_at.is_some() {
            return Ok(TokenConsumption::Replayed(token.outcome.clone()));
        }
        if now > token.expires_at {
            return Ok(TokenConsumption::Expired);
        }
        token.consumed_at = Some(now);
        Ok(TokenConsumption::Fresh(token.clone()))
    }

    fn record_outcome(&self, value: &str, outcome: RedeemOutcome) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().expect("token store mutex poisoned");
        let token = rows.get_mut(value).ok_or(RepositoryError::NotFound)?;
        token.outcome = Some(outcome);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryFacultyDirectory {
    rows: Mutex<BTreeMap<FacultyId, FacultyRecord>>,
}

impl InMemoryFacultyDirectory {
    pub fn register(&self, record: FacultyRecord) {
        let mut rows = self.rows.lock().expect("directory mutex poisoned");
        rows.insert(record.id, record);
    }
}

impl FacultyDirectory for InMemoryFacultyDirectory {
    fn fetch(&self, id: FacultyId) -> Result<Option<FacultyRecord>, RepositoryError> {
        let rows = self.rows.lock().expect("directory mutex poisoned");
        Ok(rows.get(&id).cloned())
    }

    fn all(&self) -> Result<Vec<FacultyRecord>, RepositoryError> {
        let rows = self.rows.lock().expect("directory mutex poisoned");
        Ok(rows.values().cloned().collect())
    }
}

/// Timetable Oracle stand-in holding the immutable base schedule.
#[derive(Default)]
pub struct InMemoryTimetable {
    rows: Mutex<BTreeMap<TimetableEntryId, TimetableEntry>>,
}

impl InMemoryTimetable {
    /// Seeds one entry, upholding the (faculty, day, period) uniqueness
    /// invariant of the base schedule.
    pub fn add_entry(&self, entry: TimetableEntry) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().expect("timetable mutex poisoned");
        let clashes = rows.values().any(|existing| {
            existing.id == entry.id
                || (existing.faculty_id == entry.faculty_id
                    && existing.day == entry.day
                    && existing.period_number == entry.period_number)
        });
        if clashes {
            return Err(RepositoryError::Duplicate);
        }
        rows.insert(entry.id, entry);
        Ok(())
    }
}

impl TimetableIndex for InMemoryTimetable {
    fn entry(&self, id: TimetableEntryId) -> Result<Option<TimetableEntry>, RepositoryError> {
        let rows = self.rows.lock().expect("timetable mutex poisoned");
        Ok(rows.get(&id).cloned())
    }

    fn entries_for_faculty(
        &self,
        faculty: FacultyId,
    ) -> Result<Vec<TimetableEntry>, RepositoryError> {
        let rows = self.rows.lock().expect("timetable mutex poisoned");
        let mut entries: Vec<TimetableEntry> = rows
            .values()
            .filter(|entry| entry.faculty_id == faculty)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| (entry.day, entry.period_number));
        Ok(entries)
    }

    fn is_occupied(
        &self,
        faculty: FacultyId,
        day: Day,
        period_number: u8,
    ) -> Result<bool, RepositoryError> {
        let rows = self.rows.lock().expect("timetable mutex poisoned");
        Ok(rows.values().any(|entry| {
            entry.faculty_id == faculty && entry.day == day && entry.period_number == period_number
        }))
    }
}
