use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{BatchId, Day, FacultyId, MAX_PERIOD};
use super::repository::{FacultyDirectory, TimetableIndex};
use super::service::WorkflowError;

/// Slot and filter parameters for a substitute candidate search. The
/// excluded faculty member is always the requester.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub day: Day,
    #[serde(alias = "period")]
    pub period_number: u8,
    pub exclude_faculty_id: FacultyId,
    #[serde(default)]
    pub batch_id: Option<BatchId>,
    #[serde(default)]
    pub filter_by_availability: bool,
    #[serde(default)]
    pub filter_by_batch: bool,
}

/// One candidate row, flagged with slot availability and batch capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstituteCandidate {
    pub faculty_id: FacultyId,
    pub name: String,
    pub department: String,
    pub available: bool,
    pub handles_batch: bool,
}

/// Pure projection over the faculty directory and the Timetable Index; no
/// side effects, deterministic ordering by faculty name then id.
pub struct AvailabilityResolver {
    directory: Arc<dyn FacultyDirectory>,
    timetable: Arc<dyn TimetableIndex>,
}

impl AvailabilityResolver {
    pub fn new(directory: Arc<dyn FacultyDirectory>, timetable: Arc<dyn TimetableIndex>) -> Self {
        Self {
            directory,
            timetable,
        }
    }

    /// Compute the candidate set for a class slot. Candidates failing an
    /// enabled filter are dropped from the result, not merely flagged.
    pub fn find_candidates(
        &self,
        query: &AvailabilityQuery,
    ) -> Result<Vec<SubstituteCandidate>, WorkflowError> {
        if query.period_number == 0 || query.period_number > MAX_PERIOD {
            return Err(WorkflowError::Validation(format!(
                "period {} is outside the timetable grid (1..={MAX_PERIOD})",
                query.period_number
            )));
        }

        let mut candidates = Vec::new();
        for faculty in self.directory.all()? {
            if faculty.id == query.exclude_faculty_id {
                continue;
            }

            let occupied =
                self.timetable
                    .is_occupied(faculty.id, query.day, query.period_number)?;
            let available = !occupied;
            let handles_batch = query
                .batch_id
                .map(|batch| faculty.handles_batch(batch))
                .unwrap_or(false);

            if query.filter_by_availability && !available {
                continue;
            }
            // A missing batch id makes the batch filter a no-op.
            if query.filter_by_batch && query.batch_id.is_some() && !handles_batch {
                continue;
            }

            candidates.push(SubstituteCandidate {
                faculty_id: faculty.id,
                name: faculty.name,
                department: faculty.department,
                available,
                handles_batch,
            });
        }

        candidates.sort_by(|a, b| a.name.cmp(&b.name).then(a.faculty_id.cmp(&b.faculty_id)));
        Ok(candidates)
    }
}
