use crate::infra::{build_engine, seed_default_fixture};
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use clap::Args;
use faculty_flow::config::WorkflowConfig;
use faculty_flow::error::AppError;
use faculty_flow::workflows::relief::memory::{InMemoryFacultyDirectory, InMemoryTimetable};
use faculty_flow::workflows::relief::{
    AvailabilityQuery, BatchId, Day, DecisionAction, EmailMessage, FacultyId, NewLeaveRequest,
    NewSubstituteRequest, NotificationDispatcher, NotificationError, RequestKind,
    TimetableEntryId,
};
use std::sync::{Arc, Mutex};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the substitute arrangement portion of the demo.
    #[arg(long)]
    pub(crate) skip_substitution: bool,
}

/// Captures outbound email instead of sending it, so the demo can show
/// the action links a real approver would receive.
#[derive(Default, Clone)]
struct Outbox {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
}

impl NotificationDispatcher for Outbox {
    fn dispatch(&self, message: EmailMessage) -> Result<(), NotificationError> {
        let mut guard = self.messages.lock().expect("outbox mutex poisoned");
        guard.push(message);
        Ok(())
    }
}

impl Outbox {
    fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().expect("outbox mutex poisoned").clone()
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let directory = Arc::new(InMemoryFacultyDirectory::default());
    let timetable = Arc::new(InMemoryTimetable::default());
    seed_default_fixture(&directory, &timetable)
        .map_err(|err| AppError::Seed(err.to_string()))?;

    let outbox = Arc::new(Outbox::default());
    let workflow = WorkflowConfig {
        public_base_url: "http://localhost:8080".to_string(),
        action_token_ttl_hours: 72,
    };
    let state = build_engine(directory, timetable, outbox.clone(), &workflow);

    let requester = FacultyId(1);
    let approver = FacultyId(3);
    let monday = next_monday(Local::now().date_naive());

    println!("Leave workflow demo");
    let receipt = match state.lifecycle.create_leave(NewLeaveRequest {
        requester_id: requester,
        approver_id: approver,
        subject: "Conference leave".to_string(),
        reason: "Presenting at the regional faculty workshop".to_string(),
        from_date: monday,
        to_date: monday + Duration::days(2),
    }) {
        Ok(receipt) => receipt,
        Err(err) => {
            println!("  Leave request rejected: {}", err);
            return Ok(());
        }
    };
    println!(
        "- Filed leave request {} ({} -> {}), status {}",
        receipt.request.id,
        receipt.request.from_date,
        receipt.request.to_date,
        receipt.request.status.label()
    );
    println!(
        "- Approver notified by email: {}",
        match receipt.notification_delivered {
            Some(true) => "yes",
            Some(false) => "no",
            None => "not attempted",
        }
    );

    let decided = match state.lifecycle.decide_leave(
        receipt.request.id,
        approver,
        DecisionAction::Approve,
        Some("Approved, enjoy the workshop".to_string()),
    ) {
        Ok(decided) => decided,
        Err(err) => {
            println!("  Decision failed: {}", err);
            return Ok(());
        }
    };
    println!(
        "- Approver decision recorded: status {}",
        decided.request.status.label()
    );
    match serde_json::to_string_pretty(&decided.request) {
        Ok(json) => println!("  Final request record:\n{}", json),
        Err(err) => println!("  Final request record unavailable: {}", err),
    }

    if args.skip_substitution {
        return Ok(());
    }

    println!("\nSubstitute arrangement demo");
    let query = AvailabilityQuery {
        day: Day::Monday,
        period_number: 2,
        exclude_faculty_id: requester,
        batch_id: Some(BatchId(11)),
        filter_by_availability: true,
        filter_by_batch: false,
    };
    let candidates = match state.availability.find_candidates(&query) {
        Ok(candidates) => candidates,
        Err(err) => {
            println!("  Availability lookup failed: {}", err);
            return Ok(());
        }
    };
    println!("- Free colleagues for Monday period 2:");
    for candidate in &candidates {
        println!(
            "  - {} ({}), handles batch: {}",
            candidate.name,
            candidate.department,
            if candidate.handles_batch { "yes" } else { "no" }
        );
    }

    let substitute = candidates
        .iter()
        .find(|candidate| candidate.handles_batch)
        .or_else(|| candidates.first())
        .map(|candidate| candidate.faculty_id);
    let Some(substitute) = substitute else {
        println!("  No substitute candidates available");
        return Ok(());
    };

    let receipt = match state.lifecycle.create_substitute(NewSubstituteRequest {
        requester_id: requester,
        substitute_id: substitute,
        timetable_entry_id: TimetableEntryId(101),
        request_date: monday,
        day: Day::Monday,
        reason: "Covering the Monday lecture during conference leave".to_string(),
    }) {
        Ok(receipt) => receipt,
        Err(err) => {
            println!("  Substitute request rejected: {}", err);
            return Ok(());
        }
    };
    println!(
        "- Filed substitute request {} for {} ({}), status {}",
        receipt.request.id,
        receipt.request.request_date,
        receipt.request.day.label(),
        receipt.request.status.label()
    );

    let Some(token) = approve_token(&outbox.messages()) else {
        println!("  No approval link found in the outbox");
        return Ok(());
    };
    println!("- Redeeming the emailed approval link (token {})", token);
    let outcome = match state.tokens.redeem(
        &state.lifecycle,
        RequestKind::Substitute,
        &token,
        None,
        Some("Happy to cover the slot".to_string()),
    ) {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("  Redemption failed: {}", err);
            return Ok(());
        }
    };
    println!("  Outcome: {} ({})", outcome.status.label(), outcome.message);

    // A second click on the same link repeats the stored outcome.
    match state.tokens.redeem(
        &state.lifecycle,
        RequestKind::Substitute,
        &token,
        None,
        None,
    ) {
        Ok(replay) => println!(
            "  Replayed link: {} ({})",
            replay.status.label(),
            replay.message
        ),
        Err(err) => println!("  Replay failed: {}", err),
    }

    println!("\nEmails captured during the demo: {}", outbox.messages().len());
    Ok(())
}

/// First Monday strictly after `today`, so demo requests are never backdated.
fn next_monday(today: NaiveDate) -> NaiveDate {
    let mut date = today + Duration::days(1);
    while date.weekday() != Weekday::Mon {
        date += Duration::days(1);
    }
    date
}

/// Pull the approve token out of the most recent substitute action email.
fn approve_token(messages: &[EmailMessage]) -> Option<String> {
    for message in messages.iter().rev() {
        for line in message.body.lines() {
            if let Some(rest) = line.split("/api/v1/email-actions/substitute/").nth(1) {
                if rest.contains("action=approve") {
                    let token = rest.split('?').next().unwrap_or_default();
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }
    None
}
