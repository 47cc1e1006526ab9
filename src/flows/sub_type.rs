use std::sync::Arc;

use async_trait::async_trait;

use crate::api::{DocumentTypeApi, SubTypeApi};
use crate::domain::{to_options, EntityId, SubType, SubTypeRequest};
use crate::errors::ApiError;
use crate::utils::normalize_code;
use crate::wizard::{
    CheckOutcome, CheckRequest, FieldDescriptor, FieldKind, FieldValue, FormState, OptionLists,
    StepDefinition, StepId, StepRegistry, ValidationError, ValidationResult, Validator, WizardFlow,
};

use super::{availability, flag, optional_text, prefix_pattern, required_choice, required_text, Submission};

pub const STEP_PERIOD: StepId = 1;
pub const STEP_DETAILS: StepId = 2;
pub const STEP_REVIEW: StepId = 3;

pub const DOCUMENT_TYPES: &str = "document_types";

#[derive(Clone, Debug)]
enum SubTypeMode {
    Create,
    Edit { id: EntityId },
}

/// Creates or edits a dated numbering series (sub-type) of a document type.
///
/// The validity period is probed against the type's existing series and must
/// not overlap any of them.
pub struct SubTypeFlow {
    api: Arc<dyn SubTypeApi>,
    steps: StepRegistry,
    defaults: FormState,
    mode: SubTypeMode,
}

impl SubTypeFlow {
    pub fn new_create(api: Arc<dyn SubTypeApi>) -> Self {
        Self::build(api, None)
    }

    pub fn new_edit(api: Arc<dyn SubTypeApi>, sub_type: &SubType) -> Self {
        Self::build(api, Some(sub_type))
    }

    fn build(api: Arc<dyn SubTypeApi>, initial: Option<&SubType>) -> Self {
        let steps = StepRegistry::new(vec![
            StepDefinition::new(
                "Period",
                "Document type and validity dates",
                vec![
                    FieldDescriptor::new(
                        "document_type_id",
                        "Document type",
                        FieldKind::Lookup(DOCUMENT_TYPES),
                        Validator::None,
                    ),
                    FieldDescriptor::new("start_date", "Start date", FieldKind::Date, Validator::None),
                    FieldDescriptor::new("end_date", "End date", FieldKind::Date, Validator::None),
                ],
            ),
            StepDefinition::new(
                "Details",
                "Prefix and naming",
                vec![
                    FieldDescriptor::new(
                        "prefix",
                        "Prefix",
                        FieldKind::Text,
                        Validator::Pattern {
                            regex: prefix_pattern(),
                            message: "Prefix must be 2-10 letters, digits, '-' or '_'",
                        },
                    )
                    .with_help("Prepended to document numbers of this series"),
                    FieldDescriptor::new(
                        "name",
                        "Name",
                        FieldKind::Text,
                        Validator::Length { min: 1, max: 100 },
                    ),
                    FieldDescriptor::new(
                        "description",
                        "Description",
                        FieldKind::Text,
                        Validator::Length { min: 0, max: 500 },
                    )
                    .with_optional(),
                    FieldDescriptor::new("is_active", "Active", FieldKind::Boolean, Validator::None),
                ],
            ),
            StepDefinition::new("Review", "Check the series before saving", Vec::new()),
        ]);

        let (defaults, mode) = match initial {
            Some(sub_type) => (
                FormState::new()
                    .with("document_type_id", FieldValue::Choice(sub_type.document_type_id))
                    .with("start_date", sub_type.start_date)
                    .with("end_date", sub_type.end_date)
                    .with("prefix", sub_type.prefix.as_str())
                    .with("name", sub_type.name.as_str())
                    .with("description", sub_type.description.as_str())
                    .with("is_active", sub_type.is_active),
                SubTypeMode::Edit { id: sub_type.id },
            ),
            None => (FormState::new().with("is_active", true), SubTypeMode::Create),
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
            SubTypeMode::Create => None,
            SubTypeMode::Edit { id } => Some(id),
        }
    }

    async fn overlap_outcome(&self, state: &FormState) -> Result<CheckOutcome, ApiError> {
        let (Some(document_type), Some(start), Some(end)) = (
            state.get("document_type_id").as_choice(),
            state.get("start_date").as_date(),
            state.get("end_date").as_date(),
        ) else {
            return Ok(CheckOutcome::Valid);
        };
        let check = self
            .api
            .check_overlap(document_type, start, end, self.editing_id())
            .await?;
        if !check.overlapping {
            return Ok(CheckOutcome::Valid);
        }
        Ok(CheckOutcome::Invalid(match check.overlapping_with {
            Some(existing) => format!(
                "Period overlaps with existing series '{}' ({})",
                existing.name,
                existing.period_label()
            ),
            None => "Period overlaps with an existing series".into(),
        }))
    }

    async fn prefix_outcome(&self, state: &FormState) -> Result<CheckOutcome, ApiError> {
        let Some(document_type) = state.get("document_type_id").as_choice() else {
            return Ok(CheckOutcome::Valid);
        };
        let prefix = state.text("prefix");
        let available = self
            .api
            .sub_type_prefix_available(document_type, prefix, self.editing_id())
            .await?;
        Ok(availability(available, || {
            format!("Prefix '{}' is already used for this document type", prefix)
        }))
    }
}

#[async_trait]
impl WizardFlow for SubTypeFlow {
    type Request = Submission<SubTypeRequest>;
    type Response = SubType;

    fn name(&self) -> &'static str {
        "Sub-type"
    }

    fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    fn defaults(&self) -> FormState {
        self.defaults.clone()
    }

    fn validate_step(&self, step: StepId, state: &FormState) -> ValidationResult {
        let mut result = ValidationResult::new();
        if step == STEP_PERIOD || step == STEP_REVIEW {
            result.check_date_order(
                state,
                "start_date",
                "end_date",
                "End date must not be before the start date",
            );
        }
        result
    }

    fn async_checks(&self, state: &FormState) -> Vec<CheckRequest> {
        let mut checks = Vec::new();
        let Some(document_type) = state.get("document_type_id").as_choice() else {
            return checks;
        };
        if let (Some(start), Some(end)) = (
            state.get("start_date").as_date(),
            state.get("end_date").as_date(),
        ) {
            if start <= end {
                checks.push(CheckRequest::new(
                    "end_date",
                    STEP_PERIOD,
                    format!("{}:{}:{}", document_type, start, end),
                ));
            }
        }
        let prefix = state.text("prefix");
        if prefix_pattern().is_match(prefix) {
            checks.push(CheckRequest::new(
                "prefix",
                STEP_DETAILS,
                format!("{}:{}", document_type, normalize_code(prefix)),
            ));
        }
        checks
    }

    async fn run_check(
        &self,
        request: &CheckRequest,
        state: &FormState,
    ) -> Result<CheckOutcome, ApiError> {
        match request.field.as_str() {
            "end_date" => self.overlap_outcome(state).await,
            "prefix" => self.prefix_outcome(state).await,
            _ => Ok(CheckOutcome::Valid),
        }
    }

    async fn load_options(&self, step: StepId, _state: &FormState) -> Result<OptionLists, ApiError> {
        let mut lists = OptionLists::new();
        if step == STEP_PERIOD {
            let types = self.api.list_document_types().await?;
            lists.insert(DOCUMENT_TYPES.to_string(), to_options(&types));
        }
        Ok(lists)
    }

    fn project(&self, state: &FormState) -> Result<Self::Request, ValidationError> {
        let start_date = state
            .get("start_date")
            .as_date()
            .ok_or_else(|| ValidationError::for_field("start_date", "Start date is required"))?;
        let end_date = state
            .get("end_date")
            .as_date()
            .ok_or_else(|| ValidationError::for_field("end_date", "End date is required"))?;
        let body = SubTypeRequest {
            document_type_id: required_choice(state, "document_type_id", "Document type")?,
            prefix: required_text(state, "prefix", "Prefix")?,
            name: required_text(state, "name", "Name")?,
            description: optional_text(state, "description").unwrap_or_default(),
            start_date,
            end_date,
            is_active: flag(state, "is_active"),
        };
        Ok(match self.mode {
            SubTypeMode::Create => Submission::create(body),
            SubTypeMode::Edit { id } => Submission::update(id, body),
        })
    }

    async fn submit(&self, request: Self::Request) -> Result<Self::Response, ApiError> {
        match request.target {
            Some(id) => self.api.update_sub_type(id, request.body).await,
            None => self.api.create_sub_type(request.body).await,
        }
    }

    fn success_message(&self) -> String {
        match self.mode {
            SubTypeMode::Create => "Sub-type created".into(),
            SubTypeMode::Edit { .. } => "Sub-type updated".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryBackend;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn flow() -> SubTypeFlow {
        SubTypeFlow::new_create(Arc::new(MemoryBackend::seeded()))
    }

    #[test]
    fn end_before_start_is_rejected_locally_and_not_probed() {
        let flow = flow();
        let state = FormState::new()
            .with("document_type_id", FieldValue::Choice(1))
            .with("start_date", date(2024, 6, 1))
            .with("end_date", date(2024, 1, 1));
        let result = flow.validate_step(STEP_PERIOD, &state);
        assert_eq!(
            result.error("end_date"),
            Some("End date must not be before the start date")
        );
        assert!(flow.async_checks(&state).is_empty());
    }

    #[test]
    fn overlap_tag_tracks_every_period_input() {
        let flow = flow();
        let base = FormState::new()
            .with("document_type_id", FieldValue::Choice(1))
            .with("start_date", date(2024, 1, 1))
            .with("end_date", date(2024, 6, 1));
        let moved = base.clone().with("start_date", date(2024, 2, 1));
        let other_type = base.clone().with("document_type_id", FieldValue::Choice(2));

        let tag = |state: &FormState| flow.async_checks(state)[0].tag.clone();
        assert_ne!(tag(&base), tag(&moved));
        assert_ne!(tag(&base), tag(&other_type));
    }

    #[tokio::test]
    async fn overlap_message_names_the_existing_series() {
        let flow = flow();
        let state = FormState::new()
            .with("document_type_id", FieldValue::Choice(1))
            .with("start_date", date(2024, 11, 1))
            .with("end_date", date(2025, 3, 31));
        let request = &flow.async_checks(&state)[0];
        let outcome = flow.run_check(request, &state).await.unwrap();
        assert_eq!(
            outcome,
            CheckOutcome::Invalid(
                "Period overlaps with existing series 'Invoices 2024' (2024-01-01 to 2024-12-31)"
                    .into()
            )
        );
    }
}
