use std::sync::Arc;

use async_trait::async_trait;

use crate::api::{CircuitApi, DocumentTypeApi};
use crate::domain::{to_options, Circuit, CircuitRequest, EntityId};
use crate::errors::ApiError;
use crate::utils::normalize_code;
use crate::wizard::{
    CheckOutcome, CheckRequest, FieldDependency, FieldDescriptor, FieldKind, FieldValue, FormState,
    OptionLists, StepDefinition, StepId, StepRegistry, ValidationError, Validator, WizardFlow,
};

use super::{availability, dashed_code_pattern, flag, optional_text, required_text, Submission};

pub const STEP_BASICS: StepId = 1;
pub const STEP_SETTINGS: StepId = 2;
pub const STEP_REVIEW: StepId = 3;

pub const DOCUMENT_TYPES: &str = "document_types";

const DEPENDENCIES: &[FieldDependency] = &[FieldDependency::Reset {
    source: "has_ordered_flow",
    targets: &["allow_backward_step", "allow_skip_step"],
}];

#[derive(Clone, Debug)]
enum CircuitMode {
    Create,
    Edit { id: EntityId },
}

/// Creates or edits a circuit (the workflow a document type travels through).
pub struct CircuitFlow {
    api: Arc<dyn CircuitApi>,
    steps: StepRegistry,
    defaults: FormState,
    mode: CircuitMode,
}

impl CircuitFlow {
    pub fn new_create(api: Arc<dyn CircuitApi>) -> Self {
        Self::build(api, None)
    }

    pub fn new_edit(api: Arc<dyn CircuitApi>, circuit: &Circuit) -> Self {
        Self::build(api, Some(circuit))
    }

    fn build(api: Arc<dyn CircuitApi>, initial: Option<&Circuit>) -> Self {
        let steps = StepRegistry::new(vec![
            StepDefinition::new(
                "Basics",
                "Identify the circuit",
                vec![
                    FieldDescriptor::new(
                        "code",
                        "Code",
                        FieldKind::Text,
                        Validator::Pattern {
                            regex: dashed_code_pattern(),
                            message: "Code must be 1-20 letters, digits, '-' or '_'",
                        },
                    ),
                    FieldDescriptor::new(
                        "title",
                        "Title",
                        FieldKind::Text,
                        Validator::Length { min: 1, max: 100 },
                    ),
                    FieldDescriptor::new(
                        "descriptif",
                        "Description",
                        FieldKind::Text,
                        Validator::Length { min: 0, max: 500 },
                    )
                    .with_optional(),
                ],
            ),
            StepDefinition::new(
                "Settings",
                "Document type and flow options",
                vec![
                    FieldDescriptor::new(
                        "document_type_id",
                        "Document type",
                        FieldKind::Lookup(DOCUMENT_TYPES),
                        Validator::None,
                    )
                    .with_optional(),
                    FieldDescriptor::new("is_active", "Active", FieldKind::Boolean, Validator::None),
                    FieldDescriptor::new(
                        "has_ordered_flow",
                        "Ordered flow",
                        FieldKind::Boolean,
                        Validator::None,
                    )
                    .with_help("Steps must be processed in sequence"),
                    FieldDescriptor::new(
                        "allow_backward_step",
                        "Allow going back a step",
                        FieldKind::Boolean,
                        Validator::None,
                    )
                    .with_optional(),
                    FieldDescriptor::new(
                        "allow_skip_step",
                        "Allow skipping steps",
                        FieldKind::Boolean,
                        Validator::None,
                    )
                    .with_optional(),
                ],
            ),
            StepDefinition::new("Review", "Check the circuit before saving", Vec::new()),
        ]);

        let (defaults, mode) = match initial {
            Some(circuit) => {
                let mut defaults = FormState::new()
                    .with("code", circuit.code.as_str())
                    .with("title", circuit.title.as_str())
                    .with("descriptif", circuit.descriptif.as_str())
                    .with("is_active", circuit.is_active)
                    .with("has_ordered_flow", circuit.has_ordered_flow)
                    .with("allow_backward_step", circuit.allow_backward_step)
                    .with("allow_skip_step", circuit.allow_skip_step);
                if let Some(id) = circuit.document_type_id {
                    defaults = defaults.with("document_type_id", FieldValue::Choice(id));
                }
                (defaults, CircuitMode::Edit { id: circuit.id })
            }
            None => (
                FormState::new()
                    .with("is_active", true)
                    .with("has_ordered_flow", false),
                CircuitMode::Create,
            ),
        };

        Self {
            api,
            steps,
            defaults,
            mode,
        }
    }

    fn editing_id(&self) -> Option<EntityId> {
        match self.mode {
            CircuitMode::Create => None,
            CircuitMode::Edit { id } => Some(id),
        }
    }
}

#[async_trait]
impl WizardFlow for CircuitFlow {
    type Request = Submission<CircuitRequest>;
    type Response = Circuit;

    fn name(&self) -> &'static str {
        "Circuit"
    }

    fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    fn defaults(&self) -> FormState {
        self.defaults.clone()
    }

    fn dependencies(&self) -> &[FieldDependency] {
        DEPENDENCIES
    }

    fn async_checks(&self, state: &FormState) -> Vec<CheckRequest> {
        let code = state.text("code");
        if !dashed_code_pattern().is_match(code) {
            return Vec::new();
        }
        vec![CheckRequest::new("code", STEP_BASICS, normalize_code(code))]
    }

    async fn run_check(
        &self,
        _request: &CheckRequest,
        state: &FormState,
    ) -> Result<CheckOutcome, ApiError> {
        let code = state.text("code");
        let available = self.api.circuit_code_available(code, self.editing_id()).await?;
        Ok(availability(available, || {
            format!("Circuit code '{}' is already used", code)
        }))
    }

    async fn load_options(&self, step: StepId, _state: &FormState) -> Result<OptionLists, ApiError> {
        let mut lists = OptionLists::new();
        if step == STEP_SETTINGS {
            let types = self.api.list_document_types().await?;
            lists.insert(DOCUMENT_TYPES.to_string(), to_options(&types));
        }
        Ok(lists)
    }

    fn project(&self, state: &FormState) -> Result<Self::Request, ValidationError> {
        let ordered = flag(state, "has_ordered_flow");
        let body = CircuitRequest {
            code: required_text(state, "code", "Code")?,
            title: required_text(state, "title", "Title")?,
            descriptif: optional_text(state, "descriptif").unwrap_or_default(),
            document_type_id: state.get("document_type_id").as_choice(),
            is_active: flag(state, "is_active"),
            has_ordered_flow: ordered,
            allow_backward_step: ordered.then(|| flag(state, "allow_backward_step")),
            allow_skip_step: ordered.then(|| flag(state, "allow_skip_step")),
        };
        Ok(match self.mode {
            CircuitMode::Create => Submission::create(body),
            CircuitMode::Edit { id } => Submission::update(id, body),
        })
    }

    async fn submit(&self, request: Self::Request) -> Result<Self::Response, ApiError> {
        match request.target {
            Some(id) => self.api.update_circuit(id, request.body).await,
            None => self.api.create_circuit(request.body).await,
        }
    }

    fn success_message(&self) -> String {
        match self.mode {
            CircuitMode::Create => "Circuit created".into(),
            CircuitMode::Edit { .. } => "Circuit updated".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryBackend;

    fn circuit(ordered: bool) -> Circuit {
        Circuit {
            id: 20,
            code: "CIR-FAC".into(),
            title: "Invoice validation".into(),
            descriptif: "Standard".into(),
            document_type_id: Some(1),
            is_active: true,
            has_ordered_flow: ordered,
            allow_backward_step: ordered,
            allow_skip_step: false,
        }
    }

    #[test]
    fn unordered_circuits_omit_step_flags() {
        let flow = CircuitFlow::new_create(Arc::new(MemoryBackend::seeded()));
        let state = flow
            .defaults()
            .with("code", "CIR-BC")
            .with("title", "PO circuit")
            .with("allow_backward_step", true);
        let request = flow.project(&state).unwrap();
        assert!(!request.is_update());
        assert_eq!(request.body.allow_backward_step, None);
        assert_eq!(request.body.allow_skip_step, None);

        let json = serde_json::to_value(&request.body).unwrap();
        assert!(json.get("allowBackwardStep").is_none());
    }

    #[test]
    fn edit_round_trip_matches_original() {
        for ordered in [true, false] {
            let original = circuit(ordered);
            let flow = CircuitFlow::new_edit(Arc::new(MemoryBackend::seeded()), &original);
            let request = flow.project(&flow.defaults()).unwrap();
            assert_eq!(request.target, Some(20));
            assert_eq!(request.body, CircuitRequest::from_circuit(&original));
        }
    }

    #[test]
    fn malformed_code_is_not_probed() {
        let flow = CircuitFlow::new_create(Arc::new(MemoryBackend::seeded()));
        assert!(flow
            .async_checks(&FormState::new().with("code", "bad code"))
            .is_empty());
        assert_eq!(
            flow.async_checks(&FormState::new().with("code", "cir-x"))[0].tag,
            "CIR-X"
        );
    }
}
