use std::sync::{Arc, Mutex};

use chrono::Duration;
use uuid::Uuid;

use super::domain::{
    Clock, DecisionAction, LeaveRequestId, RequestKind, RequestStatus, SubstituteRequestId,
};
use super::repository::{
    ActionToken, ActionTokenStore, RedeemOutcome, RepositoryError, TokenConsumption,
};
use super::service::{RequestLifecycleManager, WorkflowError};

/// Mints and redeems the single-use action tokens behind email links.
///
/// Redemption substitutes the approver recorded on the request as the acting
/// identity, which is why minted links must only ever reach that approver's
/// channel. Replaying a consumed link is harmless: every redeemer after the
/// first receives the stored original outcome.
pub struct ActionTokenGateway {
    store: Arc<dyn ActionTokenStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    // Serializes consume/delegate/record so a replay racing the winning
    // redeemer still observes the recorded outcome.
    redemption_gate: Mutex<()>,
}

impl ActionTokenGateway {
    pub fn new(store: Arc<dyn ActionTokenStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            redemption_gate: Mutex::new(()),
        }
    }

    pub fn mint_for_leave(
        &self,
        request: LeaveRequestId,
        fixed_action: Option<DecisionAction>,
    ) -> Result<ActionToken, RepositoryError> {
        self.mint(RequestKind::Leave, Some(request), None, fixed_action)
    }

    pub fn mint_for_substitute(
        &self,
        request: SubstituteRequestId,
        fixed_action: Option<DecisionAction>,
    ) -> Result<ActionToken, RepositoryError> {
        self.mint(RequestKind::Substitute, None, Some(request), fixed_action)
    }

    fn mint(
        &self,
        kind: RequestKind,
        leave: Option<LeaveRequestId>,
        substitute: Option<SubstituteRequestId>,
        fixed_action: Option<DecisionAction>,
    ) -> Result<ActionToken, RepositoryError> {
        let now = self.clock.now();
        let token = ActionToken {
            value: Uuid::new_v4().to_string(),
            kind,
            leave_request_id: leave,
            substitute_request_id: substitute,
            fixed_action,
            issued_at: now,
            expires_at: now + self.ttl,
            consumed_at: None,
            outcome: None,
        };
        self.store.insert(token.clone())?;
        Ok(token)
    }

    /// Redeem a token: first redeemer wins and drives the delegated
    /// decision; everyone else gets the stored outcome back, even past the
    /// token's expiry. A fresh token past expiry fails `TokenExpired`.
    pub fn redeem(
        &self,
        lifecycle: &RequestLifecycleManager,
        kind: RequestKind,
        value: &str,
        caller_action: Option<DecisionAction>,
        comment: Option<String>,
    ) -> Result<RedeemOutcome, WorkflowError> {
        let _gate = self
            .redemption_gate
            .lock()
            .expect("redemption gate poisoned");

        let token = self
            .store
            .fetch(value)?
            .filter(|token| token.kind == kind)
            .ok_or(WorkflowError::TokenNotFound)?;

        // A consumed token answers every further attempt with the stored
        // outcome, regardless of expiry or the action supplied this time.
        if token.consumed_at.is_some() {
            return match token.outcome.clone() {
                Some(outcome) => Ok(outcome),
                None => self.observed_outcome(lifecycle, &token),
            };
        }

        // Resolve the action before consuming so a link without one does not
        // burn the token. A mint-fixed action always wins over the caller's.
        let action = token
            .fixed_action
            .or(caller_action)
            .ok_or_else(|| WorkflowError::Validation("no action supplied for token".to_string()))?;

        let now = self.clock.now();
        if now > token.expires_at {
            return Err(WorkflowError::TokenExpired);
        }

        // Delegate before consuming: a failed delegation (a coverage
        // conflict, say) surfaces as the error it is and leaves the link
        // fresh for another attempt.
        let outcome = self.delegate(lifecycle, &token, action, comment)?;
        match self.store.consume(value, now)? {
            TokenConsumption::Fresh(_) => {
                self.store.record_outcome(value, outcome.clone())?;
                Ok(outcome)
            }
            // Unreachable while the gate is held, but a stored outcome is
            // still the authoritative answer if it happens.
            TokenConsumption::Replayed(Some(stored)) => Ok(stored),
            TokenConsumption::Replayed(None) | TokenConsumption::Expired => Ok(outcome),
        }
    }

    fn delegate(
        &self,
        lifecycle: &RequestLifecycleManager,
        token: &ActionToken,
        action: DecisionAction,
        comment: Option<String>,
    ) -> Result<RedeemOutcome, WorkflowError> {
        match token.kind {
            RequestKind::Leave => {
                let id = token
                    .leave_request_id
                    .ok_or(WorkflowError::TokenNotFound)?;
                let approver = lifecycle.leave(id)?.approver_id;
                match lifecycle.decide_leave(id, approver, action, comment) {
                    Ok(receipt) => Ok(outcome(
                        RequestKind::Leave,
                        receipt.request.status,
                        format!("Leave request #{id} is {}", receipt.request.status),
                    )),
                    Err(error) => self.normalize_failure(RequestKind::Leave, error),
                }
            }
            RequestKind::Substitute => {
                let id = token
                    .substitute_request_id
                    .ok_or(WorkflowError::TokenNotFound)?;
                let substitute = lifecycle.substitute(id)?.substitute_id;
                match lifecycle.decide_substitute(id, substitute, action, comment) {
                    Ok(receipt) => Ok(outcome(
                        RequestKind::Substitute,
                        receipt.request.status,
                        format!("Substitute request #{id} is {}", receipt.request.status),
                    )),
                    Err(error) => self.normalize_failure(RequestKind::Substitute, error),
                }
            }
        }
    }

    /// A request already terminal by some other path is not an error for the
    /// redeemer: the token's final word becomes the state the request
    /// reached. Everything else, a coverage conflict included, propagates.
    fn normalize_failure(
        &self,
        kind: RequestKind,
        error: WorkflowError,
    ) -> Result<RedeemOutcome, WorkflowError> {
        match error {
            WorkflowError::AlreadyDecided { current } => Ok(outcome(
                kind,
                current,
                format!("Request was already {current}"),
            )),
            other => Err(other),
        }
    }

    fn observed_outcome(
        &self,
        lifecycle: &RequestLifecycleManager,
        token: &ActionToken,
    ) -> Result<RedeemOutcome, WorkflowError> {
        let (status, id) = match token.kind {
            RequestKind::Leave => {
                let id = token
                    .leave_request_id
                    .ok_or(WorkflowError::TokenNotFound)?;
                (lifecycle.leave(id)?.status, id.0)
            }
            RequestKind::Substitute => {
                let id = token
                    .substitute_request_id
                    .ok_or(WorkflowError::TokenNotFound)?;
                (lifecycle.substitute(id)?.status, id.0)
            }
        };
        Ok(outcome(token.kind, status, format!("Request #{id} is {status}")))
    }
}

fn outcome(kind: RequestKind, status: RequestStatus, message: String) -> RedeemOutcome {
    RedeemOutcome {
        kind,
        status,
        message,
    }
}
