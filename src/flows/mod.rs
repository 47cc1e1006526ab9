//! Feature wizards built on the generic engine.
//!
//! Each flow owns its step registry, validators, async probes and the
//! projection from form state to the backend request. Flows are created in
//! either create mode or edit mode (pre-populated from an existing entity).

pub mod approval_group;
pub mod circuit;
pub mod general_account;
pub mod ligne;
pub mod registration;
pub mod sub_type;

use std::fmt::Display;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::EntityId;
use crate::wizard::{CheckOutcome, FormState, OptionItem, ValidationError};

pub use approval_group::ApprovalGroupFlow;
pub use circuit::CircuitFlow;
pub use general_account::GeneralAccountFlow;
pub use ligne::LigneFlow;
pub use registration::RegistrationFlow;
pub use sub_type::SubTypeFlow;

/// Request produced by a flow's projection: a create, or an update of `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission<T> {
    pub target: Option<EntityId>,
    pub body: T,
}

impl<T> Submission<T> {
    pub fn create(body: T) -> Self {
        Self { target: None, body }
    }

    pub fn update(id: EntityId, body: T) -> Self {
        Self {
            target: Some(id),
            body,
        }
    }

    pub fn is_update(&self) -> bool {
        self.target.is_some()
    }
}

/// Alphanumeric code, 1 to 20 characters.
pub(crate) fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9]{1,20}$").expect("valid code regex"))
}

/// Codes that also allow `-` and `_` separators (circuits, line codes).
pub(crate) fn dashed_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,20}$").expect("valid code regex"))
}

/// Series prefixes: at least two characters, `-` and `_` allowed.
pub(crate) fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{2,10}$").expect("valid prefix regex"))
}

pub(crate) fn labels<T: Display>(items: impl IntoIterator<Item = T>) -> Vec<String> {
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Maps an availability answer to a probe outcome.
pub(crate) fn availability(available: bool, taken: impl FnOnce() -> String) -> CheckOutcome {
    if available {
        CheckOutcome::Valid
    } else {
        CheckOutcome::Invalid(taken())
    }
}

/// Required text for the projection; blank values are reported against the field.
pub(crate) fn required_text(state: &FormState, field: &str, label: &str) -> Result<String, ValidationError> {
    let value = state.text(field);
    if value.is_empty() {
        Err(ValidationError::for_field(field, format!("{} is required", label)))
    } else {
        Ok(value.to_string())
    }
}

pub(crate) fn optional_text(state: &FormState, field: &str) -> Option<String> {
    let value = state.text(field);
    (!value.is_empty()).then(|| value.to_string())
}

pub(crate) fn required_choice(state: &FormState, field: &str, label: &str) -> Result<EntityId, ValidationError> {
    state
        .get(field)
        .as_choice()
        .ok_or_else(|| ValidationError::for_field(field, format!("{} is required", label)))
}

pub(crate) fn flag(state: &FormState, field: &str) -> bool {
    state.get(field).as_flag().unwrap_or(false)
}

pub(crate) fn ids(items: &[OptionItem]) -> Vec<EntityId> {
    items.iter().map(|item| item.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_patterns_enforce_length_and_charset() {
        assert!(code_pattern().is_match("401000"));
        assert!(!code_pattern().is_match("AB-1"));
        assert!(!code_pattern().is_match(&"A".repeat(21)));
        assert!(dashed_code_pattern().is_match("CIR_FAC-01"));
        assert!(prefix_pattern().is_match("FA"));
        assert!(!prefix_pattern().is_match("F"));
        assert!(!prefix_pattern().is_match("FA C"));
    }

    #[test]
    fn required_text_reports_the_field() {
        let state = FormState::new().with("name", "  ");
        let err = required_text(&state, "name", "Name").unwrap_err();
        assert_eq!(err.field.as_deref(), Some("name"));
        assert_eq!(err.message, "Name is required");
    }
}
