use std::sync::Arc;

use tracing::warn;

use super::domain::{DecisionAction, FacultyRecord, LeaveRequest, RequestKind, SubstituteRequest};
use super::repository::{EmailMessage, NotificationDispatcher};
use super::tokens::ActionTokenGateway;

/// Query-string payload embedded in an email-action link. The redemption
/// endpoint, not the link, is the source of truth for which request is
/// affected; the link only carries intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLink {
    pub kind: RequestKind,
    pub token: String,
    pub action: Option<DecisionAction>,
    pub comment: Option<String>,
}

impl ActionLink {
    pub fn href(&self, base_url: &str) -> String {
        let mut href = format!(
            "{}/api/v1/email-actions/{}/{}",
            base_url.trim_end_matches('/'),
            self.kind.path_segment(),
            self.token
        );
        let mut separator = '?';
        if let Some(action) = self.action {
            let verb = match action {
                DecisionAction::Approve => "approve",
                DecisionAction::Reject => "reject",
            };
            href.push(separator);
            href.push_str("action=");
            href.push_str(verb);
            separator = '&';
        }
        if let Some(comment) = &self.comment {
            href.push(separator);
            href.push_str("comment=");
            href.push_str(comment);
        }
        href
    }
}

/// Composes workflow events into emails and hands them to the dispatcher.
/// Delivery is fire-and-forget: failures are logged and reported back only
/// as an advisory flag, never as a failure of the triggering operation.
pub struct Notifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
    tokens: Arc<ActionTokenGateway>,
    base_url: String,
}

impl Notifier {
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        tokens: Arc<ActionTokenGateway>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            tokens,
            base_url: base_url.into(),
        }
    }

    /// Notify the approver of a new leave request, minting the single-use
    /// approve/reject links for the email channel.
    pub(crate) fn leave_requested(
        &self,
        request: &LeaveRequest,
        requester: &FacultyRecord,
        approver: &FacultyRecord,
    ) -> bool {
        let body = match self.leave_action_links(request) {
            Some((approve, reject)) => format!(
                "{} has requested leave from {} to {}.\n\
                 Subject: {}\nReason: {}\n\n\
                 Approve: {}\nReject: {}",
                requester.name,
                request.from_date,
                request.to_date,
                request.subject,
                request.reason,
                approve.href(&self.base_url),
                reject.href(&self.base_url),
            ),
            None => return false,
        };

        self.send(EmailMessage {
            recipient: approver.email.clone(),
            subject: format!("Leave request from {}", requester.name),
            body,
        })
    }

    /// Notify the candidate substitute of a new cover request.
    pub(crate) fn substitute_requested(
        &self,
        request: &SubstituteRequest,
        requester: &FacultyRecord,
        substitute: &FacultyRecord,
    ) -> bool {
        let body = match self.substitute_action_links(request) {
            Some((accept, decline)) => format!(
                "{} has asked you to cover period {} on {} ({}).\nReason: {}\n\n\
                 Accept: {}\nDecline: {}",
                requester.name,
                request.timetable_entry_id.0,
                request.request_date,
                request.day,
                request.reason,
                accept.href(&self.base_url),
                decline.href(&self.base_url),
            ),
            None => return false,
        };

        self.send(EmailMessage {
            recipient: substitute.email.clone(),
            subject: format!("Substitution request from {}", requester.name),
            body,
        })
    }

    /// Notify the requester of the decision taken on their leave request.
    pub(crate) fn leave_decided(&self, request: &LeaveRequest, requester: &FacultyRecord) -> bool {
        let comments = request.comments.as_deref().unwrap_or("-");
        self.send(EmailMessage {
            recipient: requester.email.clone(),
            subject: format!("Your leave request was {}", request.status),
            body: format!(
                "Leave from {} to {} is {}.\nComments: {}",
                request.from_date, request.to_date, request.status, comments
            ),
        })
    }

    /// Notify the requester of the decision taken on their cover request.
    pub(crate) fn substitute_decided(
        &self,
        request: &SubstituteRequest,
        requester: &FacultyRecord,
    ) -> bool {
        let message = request.response_message.as_deref().unwrap_or("-");
        self.send(EmailMessage {
            recipient: requester.email.clone(),
            subject: format!("Your substitution request was {}", request.status),
            body: format!(
                "Cover for {} ({}) is {}.\nMessage: {}",
                request.request_date, request.day, request.status, message
            ),
        })
    }

    fn leave_action_links(&self, request: &LeaveRequest) -> Option<(ActionLink, ActionLink)> {
        let approve = self
            .tokens
            .mint_for_leave(request.id, Some(DecisionAction::Approve));
        let reject = self
            .tokens
            .mint_for_leave(request.id, Some(DecisionAction::Reject));
        match (approve, reject) {
            (Ok(approve), Ok(reject)) => Some((
                link(RequestKind::Leave, approve.value, DecisionAction::Approve),
                link(RequestKind::Leave, reject.value, DecisionAction::Reject),
            )),
            (approve, reject) => {
                for error in [approve.err(), reject.err()].into_iter().flatten() {
                    warn!(request = %request.id, %error, "failed to mint leave action token");
                }
                None
            }
        }
    }

    fn substitute_action_links(
        &self,
        request: &SubstituteRequest,
    ) -> Option<(ActionLink, ActionLink)> {
        let accept = self
            .tokens
            .mint_for_substitute(request.id, Some(DecisionAction::Approve));
        let decline = self
            .tokens
            .mint_for_substitute(request.id, Some(DecisionAction::Reject));
        match (accept, decline) {
            (Ok(accept), Ok(decline)) => Some((
                link(
                    RequestKind::Substitute,
                    accept.value,
                    DecisionAction::Approve,
                ),
                link(
                    RequestKind::Substitute,
                    decline.value,
                    DecisionAction::Reject,
                ),
            )),
            (accept, decline) => {
                for error in [accept.err(), decline.err()].into_iter().flatten() {
                    warn!(request = %request.id, %error, "failed to mint substitute action token");
                }
                None
            }
        }
    }

    fn send(&self, message: EmailMessage) -> bool {
        match self.dispatcher.dispatch(message) {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "notification delivery failed; workflow transition stands");
                false
            }
        }
    }
}

fn link(kind: RequestKind, token: String, action: DecisionAction) -> ActionLink {
    ActionLink {
        kind,
        token,
        action: Some(action),
        comment: None,
    }
}
