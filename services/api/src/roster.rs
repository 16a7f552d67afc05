//! CSV seeding for the faculty directory and timetable.
//!
//! Roster rows carry the directory fields plus a `batch:course` assignment
//! list; timetable rows mirror the slot model one entry per line. Both
//! loaders are strict: a malformed row aborts the seed rather than starting
//! the service on a partial schedule.

use chrono::NaiveTime;
use faculty_flow::workflows::relief::memory::{InMemoryFacultyDirectory, InMemoryTimetable};
use faculty_flow::workflows::relief::{
    BatchAssignment, BatchId, CourseId, Day, FacultyId, FacultyRecord, RepositoryError,
    TimetableEntry, TimetableEntryId,
};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug)]
pub(crate) enum RosterError {
    Io(std::io::Error),
    Csv(csv::Error),
    Row(String),
    Store(RepositoryError),
}

impl std::fmt::Display for RosterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterError::Io(err) => write!(f, "failed to read seed file: {}", err),
            RosterError::Csv(err) => write!(f, "invalid seed CSV data: {}", err),
            RosterError::Row(detail) => write!(f, "invalid seed row: {}", detail),
            RosterError::Store(err) => write!(f, "could not apply seed data: {}", err),
        }
    }
}

impl std::error::Error for RosterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterError::Io(err) => Some(err),
            RosterError::Csv(err) => Some(err),
            RosterError::Row(_) => None,
            RosterError::Store(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RosterError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<RepositoryError> for RosterError {
    fn from(err: RepositoryError) -> Self {
        Self::Store(err)
    }
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    id: u64,
    name: String,
    email: String,
    department: String,
    designation: String,
    /// Semicolon-separated `batch:course` pairs, e.g. `11:501;12:502`.
    #[serde(default)]
    assignments: String,
}

#[derive(Debug, Deserialize)]
struct TimetableRow {
    id: u64,
    faculty_id: u64,
    day: String,
    period_number: u8,
    batch_id: u64,
    course_id: u64,
    /// `HH:MM` wall-clock times.
    start_time: String,
    end_time: String,
}

pub(crate) fn load_faculty(
    path: impl AsRef<Path>,
    directory: &InMemoryFacultyDirectory,
) -> Result<usize, RosterError> {
    let file = std::fs::File::open(path)?;
    load_faculty_from_reader(file, directory)
}

pub(crate) fn load_faculty_from_reader(
    reader: impl Read,
    directory: &InMemoryFacultyDirectory,
) -> Result<usize, RosterError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut count = 0;
    for row in csv_reader.deserialize::<RosterRow>() {
        let row = row?;
        directory.register(FacultyRecord {
            id: FacultyId(row.id),
            name: row.name,
            email: row.email,
            department: row.department,
            designation: row.designation,
            assignments: parse_assignments(&row.assignments)?,
        });
        count += 1;
    }
    Ok(count)
}

pub(crate) fn load_timetable(
    path: impl AsRef<Path>,
    timetable: &InMemoryTimetable,
) -> Result<usize, RosterError> {
    let file = std::fs::File::open(path)?;
    load_timetable_from_reader(file, timetable)
}

pub(crate) fn load_timetable_from_reader(
    reader: impl Read,
    timetable: &InMemoryTimetable,
) -> Result<usize, RosterError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut count = 0;
    for row in csv_reader.deserialize::<TimetableRow>() {
        let row = row?;
        timetable.add_entry(TimetableEntry {
            id: TimetableEntryId(row.id),
            faculty_id: FacultyId(row.faculty_id),
            day: parse_day(&row.day)?,
            period_number: row.period_number,
            batch_id: BatchId(row.batch_id),
            course_id: CourseId(row.course_id),
            start_time: parse_time(&row.start_time)?,
            end_time: parse_time(&row.end_time)?,
        })?;
        count += 1;
    }
    Ok(count)
}

fn parse_assignments(raw: &str) -> Result<Vec<BatchAssignment>, RosterError> {
    let mut assignments = Vec::new();
    for pair in raw.split(';').filter(|pair| !pair.trim().is_empty()) {
        let (batch, course) = pair.trim().split_once(':').ok_or_else(|| {
            RosterError::Row(format!("assignment '{pair}' is not a batch:course pair"))
        })?;
        let batch_id = batch
            .trim()
            .parse::<u64>()
            .map_err(|err| RosterError::Row(format!("bad batch id '{batch}': {err}")))?;
        let course_id = course
            .trim()
            .parse::<u64>()
            .map_err(|err| RosterError::Row(format!("bad course id '{course}': {err}")))?;
        assignments.push(BatchAssignment {
            batch_id: BatchId(batch_id),
            course_id: CourseId(course_id),
        });
    }
    Ok(assignments)
}

fn parse_day(raw: &str) -> Result<Day, RosterError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "MONDAY" => Ok(Day::Monday),
        "TUESDAY" => Ok(Day::Tuesday),
        "WEDNESDAY" => Ok(Day::Wednesday),
        "THURSDAY" => Ok(Day::Thursday),
        "FRIDAY" => Ok(Day::Friday),
        "SATURDAY" => Ok(Day::Saturday),
        "SUNDAY" => Ok(Day::Sunday),
        other => Err(RosterError::Row(format!("unknown day '{other}'"))),
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, RosterError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|err| RosterError::Row(format!("bad time '{raw}': {err}")))
}
