use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::{ApiError, WizardError};

use super::checks::{AsyncCheckResult, AsyncCheckTracker, CheckOutcome, CheckRequest, CheckStatus, CheckTicket};
use super::flow::{FieldDependency, SummaryLine, WizardFlow};
use super::notify::{Notice, NoticeLevel, Notifier, TracingNotifier};
use super::state::{FieldValue, FormState, OptionItem, OptionLists};
use super::step::{StepDefinition, StepId, StepProgress};
use super::validation::ValidationResult;

/// Result of a forward navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced(StepId),
    Rejected(ValidationResult),
    /// The active step changed while the current one was being verified.
    Interrupted,
}

/// Result of a submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome<R> {
    Completed(R),
    Rejected(ValidationResult),
    /// Another submission is still pending; nothing was sent.
    AlreadyInFlight,
}

/// Result of the wizard's primary button (Next, or Submit on the last step).
#[derive(Debug, Clone, PartialEq)]
pub enum Action<R> {
    Step(StepOutcome),
    Submit(SubmitOutcome<R>),
}

enum Sending<R> {
    Rejected(ValidationResult),
    Done(Result<R, ApiError>),
    Closed,
}

struct Session {
    state: FormState,
    current: StepId,
    errors: ValidationResult,
    checks: AsyncCheckTracker,
    options: OptionLists,
    submitting: bool,
    open: bool,
    /// Bumped on every open/close; async work tagged with an older epoch is dropped.
    epoch: u64,
}

impl Session {
    fn closed() -> Self {
        Self {
            state: FormState::new(),
            current: 1,
            errors: ValidationResult::new(),
            checks: AsyncCheckTracker::new(),
            options: OptionLists::new(),
            submitting: false,
            open: false,
            epoch: 0,
        }
    }

    fn discard(&mut self) {
        self.epoch += 1;
        self.open = false;
        self.submitting = false;
        self.current = 1;
        self.state = FormState::new();
        self.errors = ValidationResult::new();
        self.checks.clear();
        self.options.clear();
    }
}

/// A running wizard: step registry, form state, navigation and submission.
///
/// The handle is cheap to clone; clones share the same session, which is how
/// overlapping UI events (a second click, a late probe response) reach the
/// same state.
pub struct Wizard<F: WizardFlow> {
    flow: Arc<F>,
    session: Arc<Mutex<Session>>,
    notifier: Arc<dyn Notifier>,
    debounce: Duration,
}

impl<F: WizardFlow> Clone for Wizard<F> {
    fn clone(&self) -> Self {
        Self {
            flow: Arc::clone(&self.flow),
            session: Arc::clone(&self.session),
            notifier: Arc::clone(&self.notifier),
            debounce: self.debounce,
        }
    }
}

impl<F: WizardFlow> Wizard<F> {
    pub fn new(flow: F) -> Self {
        Self {
            flow: Arc::new(flow),
            session: Arc::new(Mutex::new(Session::closed())),
            notifier: Arc::new(TracingNotifier),
            debounce: Config::default().debounce(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.debounce = config.debounce();
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.notifier.notify(Notice::new(level, message));
    }

    /// Opens (or re-opens) the dialog: defaults restored, step 1 active.
    pub async fn open(&self) {
        let first = self.flow.steps().first();
        let (epoch, snapshot) = {
            let mut session = self.session();
            session.discard();
            session.open = true;
            session.state.reset(self.flow.defaults());
            session.options = self.flow.static_options();
            (session.epoch, session.state.clone())
        };
        debug!(wizard = self.flow.name(), epoch, "wizard opened");
        self.enter_step(epoch, first, snapshot).await;
    }

    /// Closes the dialog; in-flight work resolving afterwards is ignored.
    pub fn close(&self) {
        let mut session = self.session();
        if session.open {
            session.discard();
            debug!(wizard = self.flow.name(), "wizard closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.session().open
    }

    pub fn is_submitting(&self) -> bool {
        self.session().submitting
    }

    pub fn current_step(&self) -> StepId {
        self.session().current
    }

    pub fn step_count(&self) -> usize {
        self.flow.steps().len()
    }

    pub fn is_terminal(&self) -> bool {
        self.flow.steps().is_terminal(self.current_step())
    }

    pub fn current_definition(&self) -> Option<StepDefinition> {
        self.flow.steps().get(self.current_step()).cloned()
    }

    pub fn progress(&self) -> Vec<StepProgress> {
        self.flow.steps().progress(self.current_step())
    }

    pub fn value(&self, field: &str) -> FieldValue {
        self.session().state.get(field).clone()
    }

    pub fn state(&self) -> FormState {
        self.session().state.clone()
    }

    pub fn options(&self, list: &str) -> Vec<OptionItem> {
        self.session()
            .options
            .get(list)
            .cloned()
            .unwrap_or_default()
    }

    pub fn summary(&self) -> Vec<SummaryLine> {
        let session = self.session();
        self.flow.summary(&session.state, &session.options)
    }

    /// Field errors from the last rejected navigation plus invalid probe results
    /// for the current input.
    pub fn errors(&self) -> ValidationResult {
        let session = self.session();
        let mut errors = session.errors.clone();
        for request in self.flow.async_checks(&session.state) {
            if let Some(result) = session.checks.settled(&request) {
                if let (CheckStatus::Invalid, Some(message)) = (result.status, &result.message) {
                    errors.add(&request.field, message.clone());
                }
            }
        }
        errors
    }

    /// Probe status for a field, only if it was issued for the current input.
    pub fn check_status(&self, field: &str) -> Option<AsyncCheckResult> {
        let session = self.session();
        self.current_request(&session.state, field)
            .and_then(|request| session.checks.result_for(&request).cloned())
    }

    /// Replaces a field value and applies the flow's declared dependencies.
    pub fn set(&self, field: &str, value: impl Into<FieldValue>) -> Result<(), WizardError> {
        let mut guard = self.session();
        let session = &mut *guard;
        if !session.open {
            return Err(WizardError::Closed);
        }
        session.state.set(field, value.into());
        session.errors.remove(field);

        for dependency in self.flow.dependencies() {
            if dependency.source() != field {
                continue;
            }
            match *dependency {
                FieldDependency::Reset { targets, .. } => {
                    for target in targets {
                        session.state.clear(target);
                        session.errors.remove(target);
                    }
                }
                FieldDependency::Derive { target, .. } => {
                    if session.state.is_overridden(target) {
                        continue;
                    }
                    if let Some(derived) =
                        self.flow.derive(target, &session.state, &session.options)
                    {
                        session.state.set_derived(target, derived);
                        session.errors.remove(target);
                    }
                }
            }
        }
        Ok(())
    }

    /// Debounced probe for one field. Returns `None` when the probe was
    /// superseded or its result arrived for input that has since changed.
    pub async fn check_field(&self, field: &str) -> Result<Option<AsyncCheckResult>, WizardError> {
        let (ticket, epoch) = {
            let mut session = self.session();
            if !session.open {
                return Err(WizardError::Closed);
            }
            let Some(request) = self.current_request(&session.state, field) else {
                return Ok(None);
            };
            (session.checks.issue(&request), session.epoch)
        };

        tokio::time::sleep(self.debounce).await;

        let snapshot = {
            let session = self.session();
            let still_current = session.epoch == epoch
                && session.checks.is_current(&ticket)
                && self
                    .current_request(&session.state, field)
                    .map(|request| request.tag == ticket.request.tag)
                    .unwrap_or(false);
            if !still_current {
                debug!(field, seq = ticket.seq, "probe superseded before it was sent");
                return Ok(None);
            }
            session.state.clone()
        };

        let outcome = self.probe(&ticket.request, &snapshot).await;
        Ok(self.apply_probe(epoch, &ticket, outcome))
    }

    /// Validates the active step and moves forward on success.
    pub async fn next(&self) -> Result<StepOutcome, WizardError> {
        let (step, epoch) = {
            let mut session = self.session();
            if !session.open {
                return Err(WizardError::Closed);
            }
            let step = session.current;
            if self.flow.steps().is_terminal(step) {
                return Err(WizardError::TerminalStep);
            }
            let local = self.validate_local(step, &session.state);
            if !local.is_valid() {
                session.errors = local.clone();
                drop(session);
                self.reject_notice(step, &local);
                return Ok(StepOutcome::Rejected(local));
            }
            (step, session.epoch)
        };

        self.settle_checks(step, epoch).await;

        let (next_step, snapshot) = {
            let mut session = self.session();
            if session.epoch != epoch || !session.open {
                return Err(WizardError::Closed);
            }
            if session.current != step {
                return Ok(StepOutcome::Interrupted);
            }
            let verdict = self.gate(step, &session);
            if !verdict.is_valid() {
                session.errors = verdict.clone();
                drop(session);
                self.reject_notice(step, &verdict);
                return Ok(StepOutcome::Rejected(verdict));
            }
            session.current = step + 1;
            session.errors = ValidationResult::new();
            (session.current, session.state.clone())
        };

        debug!(wizard = self.flow.name(), from = step, to = next_step, "step advanced");
        self.enter_step(epoch, next_step, snapshot).await;
        let session = self.session();
        if session.epoch != epoch || !session.open {
            debug!(wizard = self.flow.name(), step = next_step, "wizard closed while entering step");
            return Err(WizardError::Closed);
        }
        Ok(StepOutcome::Advanced(next_step))
    }

    /// Moves one step back without validating; a no-op on the first step.
    pub fn back(&self) -> Result<StepId, WizardError> {
        let mut session = self.session();
        if !session.open {
            return Err(WizardError::Closed);
        }
        if session.current > self.flow.steps().first() {
            session.current -= 1;
        }
        session.errors = ValidationResult::new();
        debug!(wizard = self.flow.name(), step = session.current, "stepped back");
        Ok(session.current)
    }

    /// Next on ordinary steps, submit on the last one.
    pub async fn primary_action(&self) -> Result<Action<F::Response>, WizardError> {
        let terminal = {
            let session = self.session();
            if !session.open {
                return Err(WizardError::Closed);
            }
            self.flow.steps().is_terminal(session.current)
        };
        if terminal {
            Ok(Action::Submit(self.submit().await?))
        } else {
            Ok(Action::Step(self.next().await?))
        }
    }

    /// Sends the collected state to the backend. At most one submission is in
    /// flight per wizard; on failure the form is left untouched for a retry.
    pub async fn submit(&self) -> Result<SubmitOutcome<F::Response>, WizardError> {
        let (step, epoch) = {
            let mut session = self.session();
            if !session.open {
                return Err(WizardError::Closed);
            }
            if !self.flow.steps().is_terminal(session.current) {
                return Err(WizardError::NotTerminal);
            }
            if session.submitting {
                debug!(wizard = self.flow.name(), "submission already in flight; ignoring");
                return Ok(SubmitOutcome::AlreadyInFlight);
            }
            session.submitting = true;
            (session.current, session.epoch)
        };

        let outcome = self.validate_and_send(step, epoch).await;

        let mut session = self.session();
        let live = session.epoch == epoch;
        if live {
            session.submitting = false;
        }
        match outcome {
            Sending::Closed => Err(WizardError::Closed),
            Sending::Rejected(result) => {
                if live {
                    session.errors = result.clone();
                }
                drop(session);
                self.reject_notice(step, &result);
                Ok(SubmitOutcome::Rejected(result))
            }
            Sending::Done(Ok(response)) => {
                if live {
                    session.discard();
                }
                drop(session);
                info!(wizard = self.flow.name(), "submission completed");
                self.notify(NoticeLevel::Success, self.flow.success_message());
                Ok(SubmitOutcome::Completed(response))
            }
            Sending::Done(Err(err)) => {
                drop(session);
                error!(wizard = self.flow.name(), error = %err, "submission failed");
                self.notify(
                    NoticeLevel::Error,
                    format!("{} could not be saved: {}", self.flow.name(), err),
                );
                Err(WizardError::Submission(err))
            }
        }
    }

    async fn validate_and_send(&self, step: StepId, epoch: u64) -> Sending<F::Response> {
        let local = {
            let session = self.session();
            if session.epoch != epoch {
                return Sending::Closed;
            }
            self.validate_local(step, &session.state)
        };
        if !local.is_valid() {
            return Sending::Rejected(local);
        }

        self.settle_checks(step, epoch).await;

        let request = {
            let session = self.session();
            if session.epoch != epoch {
                return Sending::Closed;
            }
            let verdict = self.gate(step, &session);
            if !verdict.is_valid() {
                return Sending::Rejected(verdict);
            }
            match self.flow.project(&session.state) {
                Ok(request) => request,
                Err(err) => return Sending::Rejected(err.into()),
            }
        };

        let submission_id = Uuid::new_v4();
        info!(wizard = self.flow.name(), %submission_id, "submitting");
        debug!(%submission_id, ?request, "submission payload");
        Sending::Done(self.flow.submit(request).await)
    }

    fn validate_local(&self, step: StepId, state: &FormState) -> ValidationResult {
        let mut result = self.flow.steps().validate(step, state);
        result.merge(self.flow.validate_step(step, state));
        result
    }

    /// Local validation plus every probe of the step, resolved for the current input.
    fn gate(&self, step: StepId, session: &Session) -> ValidationResult {
        let mut result = self.validate_local(step, &session.state);
        for request in self.step_requests(step, &session.state) {
            match session.checks.settled(&request) {
                Some(check) if check.is_valid() => {}
                Some(check) => result.add(
                    &request.field,
                    check
                        .message
                        .clone()
                        .unwrap_or_else(|| "This value is not available".into()),
                ),
                None => result.add(&request.field, "Still verifying this value, try again"),
            }
        }
        result
    }

    /// Resolves every probe of the step for the current input. A probe already
    /// running for the same input is awaited rather than sent again.
    async fn settle_checks(&self, step: StepId, epoch: u64) {
        loop {
            let (tickets, running, snapshot) = {
                let mut guard = self.session();
                let session = &mut *guard;
                if session.epoch != epoch {
                    return;
                }
                let mut tickets: Vec<CheckTicket> = Vec::new();
                let mut running = Vec::new();
                for request in self.step_requests(step, &session.state) {
                    if session.checks.settled(&request).is_some() {
                        continue;
                    }
                    match session.checks.in_flight(&request) {
                        Some(receiver) => running.push(receiver),
                        None => tickets.push(session.checks.issue(&request)),
                    }
                }
                (tickets, running, session.state.clone())
            };
            for ticket in tickets {
                let outcome = self.probe(&ticket.request, &snapshot).await;
                self.apply_probe(epoch, &ticket, outcome);
            }
            if running.is_empty() {
                return;
            }
            for mut receiver in running {
                // Completes with an error once the probe's ticket is dropped.
                let _ = receiver.changed().await;
            }
        }
    }

    async fn probe(&self, request: &CheckRequest, state: &FormState) -> CheckOutcome {
        match self.flow.run_check(request, state).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(field = %request.field, error = %err, "availability probe failed");
                CheckOutcome::Invalid(format!("Could not verify this value: {}", err))
            }
        }
    }

    fn apply_probe(
        &self,
        epoch: u64,
        ticket: &CheckTicket,
        outcome: CheckOutcome,
    ) -> Option<AsyncCheckResult> {
        let mut session = self.session();
        if session.epoch != epoch {
            debug!(field = %ticket.request.field, "discarding probe result for a closed wizard");
            return None;
        }
        let current_tag = self
            .current_request(&session.state, &ticket.request.field)
            .map(|request| request.tag);
        if session
            .checks
            .resolve(ticket, current_tag.as_deref(), outcome)
        {
            session.checks.result_for(&ticket.request).cloned()
        } else {
            debug!(
                field = %ticket.request.field,
                seq = ticket.seq,
                "discarding stale probe result"
            );
            None
        }
    }

    async fn enter_step(&self, epoch: u64, step: StepId, snapshot: FormState) {
        match self.flow.load_options(step, &snapshot).await {
            Ok(lists) if lists.is_empty() => {}
            Ok(lists) => {
                let mut session = self.session();
                if session.epoch == epoch && session.open {
                    session.options.extend(lists);
                } else {
                    debug!(step, "discarding option lists fetched for a closed wizard");
                }
            }
            Err(err) => {
                if self.session().epoch != epoch {
                    return;
                }
                warn!(wizard = self.flow.name(), step, error = %err, "option fetch failed");
                self.notify(
                    NoticeLevel::Error,
                    format!("Could not load options: {}", err),
                );
            }
        }
    }

    fn step_requests(&self, step: StepId, state: &FormState) -> Vec<CheckRequest> {
        self.flow
            .async_checks(state)
            .into_iter()
            .filter(|request| request.step == step)
            .collect()
    }

    fn current_request(&self, state: &FormState, field: &str) -> Option<CheckRequest> {
        self.flow
            .async_checks(state)
            .into_iter()
            .find(|request| request.field == field)
    }

    fn reject_notice(&self, step: StepId, result: &ValidationResult) {
        warn!(
            wizard = self.flow.name(),
            step,
            errors = result.len(),
            "step validation failed"
        );
        self.notify(NoticeLevel::Warning, result.summary());
    }
}
