use std::fmt;

use async_trait::async_trait;

use crate::errors::ApiError;

use super::checks::{CheckOutcome, CheckRequest};
use super::state::{FieldValue, FormState, OptionLists};
use super::step::{FieldKind, StepId, StepRegistry};
use super::validation::{ValidationError, ValidationResult};

/// Declared relationship between two fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDependency {
    /// Changing `source` clears every target (and its override flag).
    Reset {
        source: &'static str,
        targets: &'static [&'static str],
    },
    /// Changing `source` recomputes `target` through [`WizardFlow::derive`]
    /// unless the user has overridden `target`.
    Derive {
        source: &'static str,
        target: &'static str,
    },
}

impl FieldDependency {
    pub fn source(&self) -> &'static str {
        match self {
            FieldDependency::Reset { source, .. } | FieldDependency::Derive { source, .. } => {
                source
            }
        }
    }
}

/// Label/value pair shown on review steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLine {
    pub label: String,
    pub value: String,
}

impl SummaryLine {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Feature-specific half of a wizard.
///
/// Implementations describe their steps, supply defaults (when editing an
/// existing entity), validate cross-field rules, run async probes, and turn
/// the collected state into the backend request once the wizard completes.
#[async_trait]
pub trait WizardFlow: Send + Sync + 'static {
    type Request: fmt::Debug + Clone + Send + Sync + 'static;
    type Response: Send + 'static;

    /// Short name used in logs and notifications.
    fn name(&self) -> &'static str;

    fn steps(&self) -> &StepRegistry;

    /// Values the form starts with on every open.
    fn defaults(&self) -> FormState {
        FormState::new()
    }

    /// Option lists that never change while the wizard is open.
    fn static_options(&self) -> OptionLists {
        OptionLists::new()
    }

    fn dependencies(&self) -> &[FieldDependency] {
        &[]
    }

    /// Computes a derived field; `None` leaves the current value untouched.
    fn derive(&self, _target: &str, _state: &FormState, _options: &OptionLists) -> Option<FieldValue> {
        None
    }

    /// Cross-field and cardinality rules for a step, on top of descriptor checks.
    fn validate_step(&self, _step: StepId, _state: &FormState) -> ValidationResult {
        ValidationResult::new()
    }

    /// Async probes applicable to the current state, across all steps.
    fn async_checks(&self, _state: &FormState) -> Vec<CheckRequest> {
        Vec::new()
    }

    async fn run_check(
        &self,
        _request: &CheckRequest,
        _state: &FormState,
    ) -> Result<CheckOutcome, ApiError> {
        Ok(CheckOutcome::Valid)
    }

    /// Fetches option lists needed by a step when it becomes active.
    async fn load_options(&self, _step: StepId, _state: &FormState) -> Result<OptionLists, ApiError> {
        Ok(OptionLists::new())
    }

    /// Review lines; defaults to every non-blank field in step order.
    fn summary(&self, state: &FormState, options: &OptionLists) -> Vec<SummaryLine> {
        field_summary(self.steps(), state, options)
    }

    /// Reshapes the collected state into the backend request.
    fn project(&self, state: &FormState) -> Result<Self::Request, ValidationError>;

    async fn submit(&self, request: Self::Request) -> Result<Self::Response, ApiError>;

    fn success_message(&self) -> String {
        format!("{} saved successfully", self.name())
    }
}

/// Renders every non-blank field of the registry in step order. Lookups show
/// the option label and secrets are masked.
pub fn field_summary(
    steps: &StepRegistry,
    state: &FormState,
    options: &OptionLists,
) -> Vec<SummaryLine> {
    let mut lines = Vec::new();
    for step in steps.iter() {
        for field in &step.fields {
            let value = state.get(field.key);
            if value.is_blank() {
                continue;
            }
            let rendered = match (&field.kind, value) {
                (FieldKind::Lookup(list), FieldValue::Choice(id)) => options
                    .get(*list)
                    .and_then(|items| items.iter().find(|item| item.id == *id))
                    .map(|item| item.label.clone())
                    .unwrap_or_else(|| value.to_string()),
                (FieldKind::Secret, _) => "********".to_string(),
                _ => value.to_string(),
            };
            lines.push(SummaryLine::new(field.label, rendered));
        }
    }
    lines
}
