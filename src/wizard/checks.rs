//! Bookkeeping for asynchronous uniqueness and overlap probes.
//!
//! Every probe is issued as a [`CheckTicket`] carrying a sequence number and
//! the fingerprint of the input it was issued for. A result is applied only
//! when the ticket is still the latest one for its field and the fingerprint
//! still matches the current input; anything else is a stale response.
//!
//! A ticket also owns the sending half of a `watch` channel. Dropping the
//! ticket, once its probe finished or its caller gave up, wakes everyone
//! waiting on that probe through [`AsyncCheckTracker::in_flight`].

use std::collections::BTreeMap;

use tokio::sync::watch;

use super::step::StepId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pending,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncCheckResult {
    pub status: CheckStatus,
    pub message: Option<String>,
}

impl AsyncCheckResult {
    pub fn pending() -> Self {
        Self {
            status: CheckStatus::Pending,
            message: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == CheckStatus::Valid
    }
}

/// What a probe reported for the input it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Valid,
    Invalid(String),
}

impl From<CheckOutcome> for AsyncCheckResult {
    fn from(outcome: CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::Valid => AsyncCheckResult {
                status: CheckStatus::Valid,
                message: None,
            },
            CheckOutcome::Invalid(message) => AsyncCheckResult {
                status: CheckStatus::Invalid,
                message: Some(message),
            },
        }
    }
}

/// A probe a flow wants run for the current input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    /// Field the result is reported against.
    pub field: String,
    /// Step whose advancement the probe gates.
    pub step: StepId,
    /// Fingerprint of the inputs the probe depends on.
    pub tag: String,
}

impl CheckRequest {
    pub fn new(field: &str, step: StepId, tag: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            step,
            tag: tag.into(),
        }
    }
}

#[derive(Debug)]
pub struct CheckTicket {
    pub request: CheckRequest,
    pub seq: u64,
    _running: watch::Sender<()>,
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    tag: String,
    result: AsyncCheckResult,
    running: watch::Receiver<()>,
}

#[derive(Debug, Default)]
pub struct AsyncCheckTracker {
    next_seq: u64,
    entries: BTreeMap<String, Entry>,
}

impl AsyncCheckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a probe, superseding any earlier one for the same field.
    pub fn issue(&mut self, request: &CheckRequest) -> CheckTicket {
        self.next_seq += 1;
        let (running_tx, running) = watch::channel(());
        self.entries.insert(
            request.field.clone(),
            Entry {
                seq: self.next_seq,
                tag: request.tag.clone(),
                result: AsyncCheckResult::pending(),
                running,
            },
        );
        CheckTicket {
            request: request.clone(),
            seq: self.next_seq,
            _running: running_tx,
        }
    }

    /// Handle on a probe still running for the request's current input.
    ///
    /// `changed()` on the returned receiver completes once that probe's
    /// ticket is dropped.
    pub fn in_flight(&self, request: &CheckRequest) -> Option<watch::Receiver<()>> {
        self.entries
            .get(&request.field)
            .filter(|entry| entry.tag == request.tag)
            .filter(|entry| entry.result.status == CheckStatus::Pending)
            .filter(|entry| entry.running.has_changed().is_ok())
            .map(|entry| entry.running.clone())
    }

    pub fn is_current(&self, ticket: &CheckTicket) -> bool {
        self.entries
            .get(&ticket.request.field)
            .map(|entry| entry.seq == ticket.seq)
            .unwrap_or(false)
    }

    /// Applies a probe result. Returns `false` when the ticket was superseded or
    /// the input changed since it was issued.
    pub fn resolve(
        &mut self,
        ticket: &CheckTicket,
        current_tag: Option<&str>,
        outcome: CheckOutcome,
    ) -> bool {
        if current_tag != Some(ticket.request.tag.as_str()) {
            return false;
        }
        match self.entries.get_mut(&ticket.request.field) {
            Some(entry) if entry.seq == ticket.seq => {
                entry.result = outcome.into();
                true
            }
            _ => false,
        }
    }

    /// Latest result for a request, provided it was issued for the same input.
    pub fn result_for(&self, request: &CheckRequest) -> Option<&AsyncCheckResult> {
        self.entries
            .get(&request.field)
            .filter(|entry| entry.tag == request.tag)
            .map(|entry| &entry.result)
    }

    /// Resolved (non-pending) result for the request's current input.
    pub fn settled(&self, request: &CheckRequest) -> Option<&AsyncCheckResult> {
        self.result_for(request)
            .filter(|result| result.status != CheckStatus::Pending)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_ticket_supersedes_older() {
        let mut tracker = AsyncCheckTracker::new();
        let first = tracker.issue(&CheckRequest::new("code", 1, "A"));
        let second = tracker.issue(&CheckRequest::new("code", 1, "B"));
        assert!(!tracker.is_current(&first));
        assert!(tracker.is_current(&second));

        assert!(!tracker.resolve(&first, Some("B"), CheckOutcome::Invalid("taken".into())));
        assert!(tracker.resolve(&second, Some("B"), CheckOutcome::Valid));
        let result = tracker
            .settled(&CheckRequest::new("code", 1, "B"))
            .unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn result_for_changed_input_is_discarded() {
        let mut tracker = AsyncCheckTracker::new();
        let ticket = tracker.issue(&CheckRequest::new("code", 1, "A"));
        assert!(!tracker.resolve(&ticket, Some("AB"), CheckOutcome::Valid));
        assert_eq!(
            tracker.result_for(&CheckRequest::new("code", 1, "A")),
            Some(&AsyncCheckResult::pending())
        );
    }

    #[tokio::test]
    async fn running_probe_can_be_awaited_until_its_ticket_drops() {
        let mut tracker = AsyncCheckTracker::new();
        let request = CheckRequest::new("name", 1, "finance");
        let ticket = tracker.issue(&request);
        assert!(tracker
            .in_flight(&CheckRequest::new("name", 1, "legal"))
            .is_none());
        let mut running = tracker.in_flight(&request).unwrap();

        assert!(tracker.resolve(&ticket, Some("finance"), CheckOutcome::Valid));
        drop(ticket);
        assert!(running.changed().await.is_err());
        assert!(tracker.in_flight(&request).is_none());
        assert!(tracker.settled(&request).unwrap().is_valid());
    }

    #[test]
    fn abandoned_ticket_is_no_longer_in_flight() {
        let mut tracker = AsyncCheckTracker::new();
        let request = CheckRequest::new("code", 2, "PAPER");
        drop(tracker.issue(&request));
        assert!(tracker.in_flight(&request).is_none());
        assert_eq!(tracker.result_for(&request), Some(&AsyncCheckResult::pending()));
    }

    #[test]
    fn settled_ignores_results_for_other_inputs() {
        let mut tracker = AsyncCheckTracker::new();
        let ticket = tracker.issue(&CheckRequest::new("email", 2, "a@x.io"));
        tracker.resolve(&ticket, Some("a@x.io"), CheckOutcome::Valid);
        assert!(tracker
            .settled(&CheckRequest::new("email", 2, "b@x.io"))
            .is_none());
    }
}
