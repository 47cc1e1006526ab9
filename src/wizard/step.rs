//! Step registry and field descriptors.

use super::state::FormState;
use super::validation::{ValidationResult, Validator};

/// 1-based position of a step within its registry.
pub type StepId = usize;

/// Supported data kinds for form fields.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    /// Text that must not be echoed (passwords).
    Secret,
    Integer,
    Decimal,
    Date,
    Boolean,
    /// Static list of labels; the value is stored as text.
    Choice(Vec<String>),
    /// Single pick from a fetched option list; the value is the option id.
    Lookup(&'static str),
    /// Ordered multi-pick from a fetched option list.
    MultiSelect(&'static str),
}

/// Declarative description of a single form field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub help: Option<&'static str>,
    pub validator: Validator,
}

impl FieldDescriptor {
    pub fn new(
        key: &'static str,
        label: &'static str,
        kind: FieldKind,
        validator: Validator,
    ) -> Self {
        Self {
            key,
            label,
            kind,
            required: true,
            help: None,
            validator,
        }
    }

    pub fn with_optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }

    /// Presence and format check for this field against the current state.
    pub fn check(&self, state: &FormState) -> Option<String> {
        let value = state.get(self.key);
        if value.is_blank() {
            return self
                .required
                .then(|| format!("{} is required", self.label));
        }
        self.validator.validate(value).err().map(|err| err.message)
    }
}

/// One screen of a wizard.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub id: StepId,
    pub title: &'static str,
    pub description: &'static str,
    pub fields: Vec<FieldDescriptor>,
}

impl StepDefinition {
    pub fn new(title: &'static str, description: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            id: 0,
            title,
            description,
            fields,
        }
    }

    pub fn is_complete(&self, current: StepId) -> bool {
        current > self.id
    }

    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.key == key)
    }
}

/// Render-ready progress marker for a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProgress {
    pub id: StepId,
    pub title: &'static str,
    pub complete: bool,
    pub active: bool,
}

/// Ordered, immutable list of steps for one wizard.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<StepDefinition>,
}

impl StepRegistry {
    pub fn new(steps: Vec<StepDefinition>) -> Self {
        debug_assert!(!steps.is_empty(), "a wizard needs at least one step");
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(index, mut step)| {
                step.id = index + 1;
                step
            })
            .collect();
        Self { steps }
    }

    pub fn get(&self, id: StepId) -> Option<&StepDefinition> {
        id.checked_sub(1).and_then(|index| self.steps.get(index))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first(&self) -> StepId {
        1
    }

    pub fn terminal(&self) -> StepId {
        self.steps.len().max(1)
    }

    pub fn is_terminal(&self, id: StepId) -> bool {
        id >= self.terminal()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter()
    }

    pub fn progress(&self, current: StepId) -> Vec<StepProgress> {
        self.steps
            .iter()
            .map(|step| StepProgress {
                id: step.id,
                title: step.title,
                complete: step.is_complete(current),
                active: step.id == current,
            })
            .collect()
    }

    /// Finds the descriptor of a field anywhere in the registry.
    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.steps.iter().find_map(|step| step.field(key))
    }

    /// Descriptor-level validation of every field on a step.
    pub fn validate(&self, id: StepId, state: &FormState) -> ValidationResult {
        let mut result = ValidationResult::new();
        if let Some(step) = self.get(id) {
            for field in &step.fields {
                if let Some(message) = field.check(state) {
                    result.add(field.key, message);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::state::FieldValue;

    fn registry() -> StepRegistry {
        StepRegistry::new(vec![
            StepDefinition::new(
                "Details",
                "Name the thing",
                vec![FieldDescriptor::new(
                    "name",
                    "Name",
                    FieldKind::Text,
                    Validator::Length { min: 1, max: 10 },
                )],
            ),
            StepDefinition::new("Review", "Check and save", Vec::new()),
        ])
    }

    #[test]
    fn steps_are_numbered_from_one() {
        let registry = registry();
        assert_eq!(registry.get(1).map(|s| s.title), Some("Details"));
        assert_eq!(registry.get(2).map(|s| s.title), Some("Review"));
        assert!(registry.get(0).is_none());
        assert!(registry.is_terminal(2));
        assert!(!registry.is_terminal(1));
    }

    #[test]
    fn progress_marks_completed_steps() {
        let progress = registry().progress(2);
        assert!(progress[0].complete);
        assert!(!progress[1].complete);
        assert!(progress[1].active);
    }

    #[test]
    fn required_field_reports_label() {
        let registry = registry();
        let result = registry.validate(1, &FormState::new());
        assert_eq!(result.error("name"), Some("Name is required"));

        let mut state = FormState::new();
        state.set("name", FieldValue::text("Finance"));
        assert!(registry.validate(1, &state).is_valid());
    }
}
