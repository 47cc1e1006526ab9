//! Generic multi-step wizard engine.
//!
//! A feature supplies a [`WizardFlow`] (steps, validators, async probes,
//! request projection, submission call); [`Wizard`] drives it: form state,
//! validation-gated navigation, tagged async checks, and a single-flight
//! submission slot.

pub mod checks;
pub mod engine;
pub mod flow;
pub mod notify;
pub mod state;
pub mod step;
pub mod validation;

pub use checks::{AsyncCheckResult, CheckOutcome, CheckRequest, CheckStatus};
pub use engine::{Action, StepOutcome, SubmitOutcome, Wizard};
pub use flow::{field_summary, FieldDependency, SummaryLine, WizardFlow};
pub use notify::{Notice, NoticeLevel, Notifier, RecordingNotifier, TracingNotifier};
pub use state::{FieldValue, FormState, OptionItem, OptionLists};
pub use step::{FieldDescriptor, FieldKind, StepDefinition, StepId, StepProgress, StepRegistry};
pub use validation::{ValidationError, ValidationResult, Validator};
