use std::sync::Arc;
use std::thread;

use chrono::Duration;

use super::common::*;
use crate::workflows::relief::domain::{DecisionAction, RequestKind, RequestStatus};
use crate::workflows::relief::service::WorkflowError;

#[test]
fn redeeming_a_fixed_action_token_applies_the_decision() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");
    let token = harness
        .tokens
        .mint_for_leave(receipt.request.id, Some(DecisionAction::Approve))
        .expect("mint succeeds");

    let outcome = harness
        .tokens
        .redeem(
            &harness.lifecycle,
            RequestKind::Leave,
            &token.value,
            None,
            Some("approved by email".to_string()),
        )
        .expect("redemption succeeds");

    assert_eq!(outcome.status, RequestStatus::Approved);
    let request = harness.lifecycle.leave(receipt.request.id).expect("readable");
    assert_eq!(request.status, RequestStatus::Approved);
    assert_eq!(request.comments.as_deref(), Some("approved by email"));
}

#[test]
fn replaying_a_token_yields_the_identical_outcome_and_one_transition() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");
    let token = harness
        .tokens
        .mint_for_leave(receipt.request.id, Some(DecisionAction::Approve))
        .expect("mint succeeds");

    let first = harness
        .tokens
        .redeem(&harness.lifecycle, RequestKind::Leave, &token.value, None, None)
        .expect("first redemption succeeds");
    let decided_at = harness
        .lifecycle
        .leave(receipt.request.id)
        .expect("readable")
        .decided_at;

    // Double-click / mail-client prefetch replay.
    let second = harness
        .tokens
        .redeem(&harness.lifecycle, RequestKind::Leave, &token.value, None, None)
        .expect("replay succeeds");

    assert_eq!(first, second);
    let request = harness.lifecycle.leave(receipt.request.id).expect("readable");
    assert_eq!(request.decided_at, decided_at, "state changed exactly once");
}

#[test]
fn consumed_token_replay_ignores_expiry() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_substitute(substitute_intake(FREE_COLLEAGUE))
        .expect("creation succeeds");
    let token = harness
        .tokens
        .mint_for_substitute(receipt.request.id, Some(DecisionAction::Approve))
        .expect("mint succeeds");

    let first = harness
        .tokens
        .redeem(
            &harness.lifecycle,
            RequestKind::Substitute,
            &token.value,
            None,
            None,
        )
        .expect("first redemption succeeds");
    assert_eq!(first.status, RequestStatus::Approved);

    harness.clock.advance(Duration::hours(100));

    let replay = harness
        .tokens
        .redeem(
            &harness.lifecycle,
            RequestKind::Substitute,
            &token.value,
            None,
            None,
        )
        .expect("replay past expiry still answers");
    assert_eq!(replay, first);
}

#[test]
fn fresh_token_past_expiry_is_rejected() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");
    let token = harness
        .tokens
        .mint_for_leave(receipt.request.id, Some(DecisionAction::Approve))
        .expect("mint succeeds");

    harness.clock.advance(Duration::hours(100));

    let error = harness
        .tokens
        .redeem(&harness.lifecycle, RequestKind::Leave, &token.value, None, None)
        .expect_err("expired link rejected");
    assert!(matches!(error, WorkflowError::TokenExpired));

    let request = harness.lifecycle.leave(receipt.request.id).expect("readable");
    assert_eq!(request.status, RequestStatus::Pending);
}

#[test]
fn unknown_and_mismatched_tokens_are_not_found() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");
    let token = harness
        .tokens
        .mint_for_leave(receipt.request.id, Some(DecisionAction::Approve))
        .expect("mint succeeds");

    let error = harness
        .tokens
        .redeem(
            &harness.lifecycle,
            RequestKind::Leave,
            "not-a-token",
            None,
            None,
        )
        .expect_err("unknown value rejected");
    assert!(matches!(error, WorkflowError::TokenNotFound));

    // A leave token presented on the substitute path is treated as unknown.
    let error = harness
        .tokens
        .redeem(
            &harness.lifecycle,
            RequestKind::Substitute,
            &token.value,
            None,
            None,
        )
        .expect_err("kind mismatch rejected");
    assert!(matches!(error, WorkflowError::TokenNotFound));
}

#[test]
fn bare_token_needs_a_caller_action_but_is_not_burned_without_one() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");
    let token = harness
        .tokens
        .mint_for_leave(receipt.request.id, None)
        .expect("mint succeeds");

    let error = harness
        .tokens
        .redeem(&harness.lifecycle, RequestKind::Leave, &token.value, None, None)
        .expect_err("no action supplied");
    assert!(matches!(error, WorkflowError::Validation(_)));

    let outcome = harness
        .tokens
        .redeem(
            &harness.lifecycle,
            RequestKind::Leave,
            &token.value,
            Some(DecisionAction::Reject),
            None,
        )
        .expect("token still fresh after the invalid attempt");
    assert_eq!(outcome.status, RequestStatus::Rejected);
}

#[test]
fn mint_fixed_action_overrides_the_callers() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");
    let token = harness
        .tokens
        .mint_for_leave(receipt.request.id, Some(DecisionAction::Approve))
        .expect("mint succeeds");

    let outcome = harness
        .tokens
        .redeem(
            &harness.lifecycle,
            RequestKind::Leave,
            &token.value,
            Some(DecisionAction::Reject),
            None,
        )
        .expect("redemption succeeds");
    assert_eq!(outcome.status, RequestStatus::Approved);
}

#[test]
fn token_redeemed_after_a_web_decision_reports_the_existing_outcome() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");
    let token = harness
        .tokens
        .mint_for_leave(receipt.request.id, Some(DecisionAction::Approve))
        .expect("mint succeeds");

    // The approver rejects through the authenticated endpoint first.
    harness
        .lifecycle
        .decide_leave(receipt.request.id, FREE_COLLEAGUE, DecisionAction::Reject, None)
        .expect("web rejection succeeds");

    let outcome = harness
        .tokens
        .redeem(&harness.lifecycle, RequestKind::Leave, &token.value, None, None)
        .expect("token replay of a settled request is not an error");
    assert_eq!(outcome.status, RequestStatus::Rejected);

    let replay = harness
        .tokens
        .redeem(&harness.lifecycle, RequestKind::Leave, &token.value, None, None)
        .expect("subsequent replays agree");
    assert_eq!(replay, outcome);
}

#[test]
fn concurrent_redeems_of_one_token_agree_and_transition_once() {
    let harness = harness();
    let receipt = harness
        .lifecycle
        .create_leave(leave_intake())
        .expect("creation succeeds");
    let token = harness
        .tokens
        .mint_for_leave(receipt.request.id, Some(DecisionAction::Approve))
        .expect("mint succeeds");

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let tokens = Arc::clone(&harness.tokens);
            let lifecycle = Arc::clone(&harness.lifecycle);
            let value = token.value.clone();
            thread::spawn(move || {
                tokens.redeem(&lifecycle, RequestKind::Leave, &value, None, None)
            })
        })
        .collect();
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .map(|result| result.expect("both redeemers receive an outcome"))
        .collect();

    assert_eq!(outcomes[0], outcomes[1]);
    let request = harness.lifecycle.leave(receipt.request.id).expect("readable");
    assert_eq!(request.status, RequestStatus::Approved);
}

#[test]
fn token_approval_losing_a_coverage_race_surfaces_the_conflict_and_keeps_the_link() {
    let harness = harness();
    let first = harness
        .lifecycle
        .create_substitute(substitute_intake(FREE_COLLEAGUE))
        .expect("first request succeeds");
    let second = harness
        .lifecycle
        .create_substitute(substitute_intake(OUTSIDER))
        .expect("second request succeeds");
    let token = harness
        .tokens
        .mint_for_substitute(second.request.id, Some(DecisionAction::Approve))
        .expect("mint succeeds");

    approve_substitute(&harness, first.request.id, FREE_COLLEAGUE);

    let error = harness
        .tokens
        .redeem(
            &harness.lifecycle,
            RequestKind::Substitute,
            &token.value,
            None,
            None,
        )
        .expect_err("slot already covered");
    assert!(matches!(error, WorkflowError::Conflict(_)));
    let request = harness
        .lifecycle
        .substitute(second.request.id)
        .expect("readable");
    assert_eq!(request.status, RequestStatus::Pending);

    // The failed approval did not burn the link: once the request settles
    // through the web path, the token reports that outcome.
    harness
        .lifecycle
        .decide_substitute(second.request.id, OUTSIDER, DecisionAction::Reject, None)
        .expect("web rejection succeeds");
    let outcome = harness
        .tokens
        .redeem(
            &harness.lifecycle,
            RequestKind::Substitute,
            &token.value,
            None,
            None,
        )
        .expect("settled request is reported, not an error");
    assert_eq!(outcome.status, RequestStatus::Rejected);
}
