use std::sync::Arc;

use async_trait::async_trait;

use crate::api::ApprovalApi;
use crate::domain::{
    to_option, to_options, ApprovalGroup, ApprovalGroupRequest, EntityId, RuleType, MIN_APPROVERS,
};
use crate::errors::ApiError;
use crate::wizard::{
    CheckOutcome, CheckRequest, FieldDescriptor, FieldKind, FieldValue, FormState, OptionLists,
    StepDefinition, StepId, StepRegistry, ValidationError, ValidationResult, Validator,
    WizardFlow,
};

use super::{availability, ids, labels, optional_text, required_text, Submission};

pub const STEP_DETAILS: StepId = 1;
pub const STEP_RULE: StepId = 2;
pub const STEP_USERS: StepId = 3;
pub const STEP_REVIEW: StepId = 4;

/// Option list holding the users that can still be added to the group.
pub const ELIGIBLE_USERS: &str = "eligible_users";

#[derive(Clone, Debug)]
enum ApprovalGroupMode {
    Create,
    Edit { id: EntityId },
}

/// Creates or edits an approval group: details, approval rule, members, review.
pub struct ApprovalGroupFlow {
    api: Arc<dyn ApprovalApi>,
    steps: StepRegistry,
    defaults: FormState,
    mode: ApprovalGroupMode,
}

impl ApprovalGroupFlow {
    pub fn new_create(api: Arc<dyn ApprovalApi>) -> Self {
        Self::build(api, None)
    }

    pub fn new_edit(api: Arc<dyn ApprovalApi>, group: &ApprovalGroup) -> Self {
        Self::build(api, Some(group))
    }

    fn build(api: Arc<dyn ApprovalApi>, initial: Option<&ApprovalGroup>) -> Self {
        let rule_validator = Validator::custom(|value| match value.as_text() {
            Some(label) if RuleType::from_label(label).is_some() => Ok(()),
            _ => Err("Choose a valid approval rule".into()),
        });

        let steps = StepRegistry::new(vec![
            StepDefinition::new(
                "Details",
                "Name and describe the group",
                vec![
                    FieldDescriptor::new(
                        "name",
                        "Group name",
                        FieldKind::Text,
                        Validator::Length { min: 1, max: 100 },
                    ),
                    FieldDescriptor::new(
                        "description",
                        "Description",
                        FieldKind::Text,
                        Validator::Length { min: 1, max: 500 },
                    ),
                    FieldDescriptor::new(
                        "comment",
                        "Comment",
                        FieldKind::Text,
                        Validator::Length { min: 0, max: 500 },
                    )
                    .with_optional(),
                ],
            ),
            StepDefinition::new(
                "Rule",
                "How members approve",
                vec![FieldDescriptor::new(
                    "rule_type",
                    "Approval rule",
                    FieldKind::Choice(labels(RuleType::ALL)),
                    rule_validator,
                )
                .with_help("Sequential requires every member to approve in the order selected")],
            ),
            StepDefinition::new(
                "Users",
                "Pick the approvers",
                // Cardinality is reported by the flow with a dedicated message.
                vec![FieldDescriptor::new(
                    "users",
                    "Approvers",
                    FieldKind::MultiSelect(ELIGIBLE_USERS),
                    Validator::None,
                )
                .with_optional()],
            ),
            StepDefinition::new("Review", "Check the group before saving", Vec::new()),
        ]);

        let (defaults, mode) = match initial {
            Some(group) => {
                let members: Vec<_> = group.users.iter().map(to_option).collect();
                let mut defaults = FormState::new()
                    .with("name", group.name.as_str())
                    .with("description", group.description.as_str())
                    .with("rule_type", group.rule_type.label())
                    .with("users", members);
                if let Some(comment) = &group.comment {
                    defaults = defaults.with("comment", comment.as_str());
                }
                (defaults, ApprovalGroupMode::Edit { id: group.id })
            }
            None => (
                FormState::new().with("rule_type", RuleType::Any.label()),
                ApprovalGroupMode::Create,
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
            ApprovalGroupMode::Create => None,
            ApprovalGroupMode::Edit { id } => Some(id),
        }
    }
}

#[async_trait]
impl WizardFlow for ApprovalGroupFlow {
    type Request = Submission<ApprovalGroupRequest>;
    type Response = ApprovalGroup;

    fn name(&self) -> &'static str {
        "Approval group"
    }

    fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    fn defaults(&self) -> FormState {
        self.defaults.clone()
    }

    fn validate_step(&self, step: StepId, state: &FormState) -> ValidationResult {
        let mut result = ValidationResult::new();
        match step {
            STEP_USERS => result.check_min_selected(
                state,
                "users",
                MIN_APPROVERS,
                &format!("Select at least {} users", MIN_APPROVERS),
            ),
            STEP_REVIEW => result.check_min_selected(
                state,
                "users",
                MIN_APPROVERS,
                &format!(
                    "Cannot create an approval group with less than {} users",
                    MIN_APPROVERS
                ),
            ),
            _ => {}
        }
        result
    }

    fn async_checks(&self, state: &FormState) -> Vec<CheckRequest> {
        let name = state.text("name");
        if name.is_empty() {
            return Vec::new();
        }
        vec![CheckRequest::new("name", STEP_DETAILS, name.to_lowercase())]
    }

    async fn run_check(
        &self,
        _request: &CheckRequest,
        state: &FormState,
    ) -> Result<CheckOutcome, ApiError> {
        let name = state.text("name");
        let available = self.api.group_name_available(name, self.editing_id()).await?;
        Ok(availability(available, || {
            format!("An approval group named '{}' already exists", name)
        }))
    }

    async fn load_options(&self, step: StepId, _state: &FormState) -> Result<OptionLists, ApiError> {
        let mut lists = OptionLists::new();
        if step == STEP_USERS {
            let users = self.api.list_eligible_approvers(self.editing_id()).await?;
            lists.insert(ELIGIBLE_USERS.to_string(), to_options(&users));
        }
        Ok(lists)
    }

    fn project(&self, state: &FormState) -> Result<Self::Request, ValidationError> {
        let rule_label = required_text(state, "rule_type", "Approval rule")?;
        let rule_type = RuleType::from_label(&rule_label)
            .ok_or_else(|| ValidationError::for_field("rule_type", "Choose a valid approval rule"))?;
        let users = match state.get("users") {
            FieldValue::Selection(items) => ids(items),
            _ => Vec::new(),
        };
        let body = ApprovalGroupRequest {
            name: required_text(state, "name", "Group name")?,
            description: required_text(state, "description", "Description")?,
            comment: optional_text(state, "comment"),
            rule_type,
            user_ids: users,
        };
        Ok(match self.mode {
            ApprovalGroupMode::Create => Submission::create(body),
            ApprovalGroupMode::Edit { id } => Submission::update(id, body),
        })
    }

    async fn submit(&self, request: Self::Request) -> Result<Self::Response, ApiError> {
        match request.target {
            Some(id) => self.api.update_group(id, request.body).await,
            None => self.api.create_group(request.body).await,
        }
    }

    fn success_message(&self) -> String {
        match self.mode {
            ApprovalGroupMode::Create => "Approval group created".into(),
            ApprovalGroupMode::Edit { .. } => "Approval group updated".into(),
        }
    }
}
