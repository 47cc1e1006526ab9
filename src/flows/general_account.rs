use std::sync::Arc;

use async_trait::async_trait;

use crate::api::AccountApi;
use crate::domain::{AccountType, EntityId, GeneralAccount, GeneralAccountRequest};
use crate::errors::ApiError;
use crate::utils::normalize_code;
use crate::wizard::{
    CheckOutcome, CheckRequest, FieldDescriptor, FieldKind, FormState, StepDefinition, StepId,
    StepRegistry, ValidationError, Validator, WizardFlow,
};

use super::{availability, code_pattern, flag, labels, required_text, Submission};

pub const STEP_IDENTITY: StepId = 1;
pub const STEP_CLASSIFICATION: StepId = 2;
pub const STEP_REVIEW: StepId = 3;

#[derive(Clone, Debug)]
enum AccountMode {
    Create,
    Edit { id: EntityId },
}

pub struct GeneralAccountFlow {
    api: Arc<dyn AccountApi>,
    steps: StepRegistry,
    defaults: FormState,
    mode: AccountMode,
}

impl GeneralAccountFlow {
    pub fn new_create(api: Arc<dyn AccountApi>) -> Self {
        Self::build(api, None)
    }

    pub fn new_edit(api: Arc<dyn AccountApi>, account: &GeneralAccount) -> Self {
        Self::build(api, Some(account))
    }

    fn build(api: Arc<dyn AccountApi>, initial: Option<&GeneralAccount>) -> Self {
        let type_validator = Validator::custom(|value| match value.as_text() {
            Some(label) if AccountType::from_label(label).is_some() => Ok(()),
            _ => Err("Choose a valid account type".into()),
        });

        let steps = StepRegistry::new(vec![
            StepDefinition::new(
                "Identity",
                "Account code and label",
                vec![
                    FieldDescriptor::new(
                        "code",
                        "Account code",
                        FieldKind::Text,
                        Validator::Pattern {
                            regex: code_pattern(),
                            message: "Code must be 1-20 letters or digits",
                        },
                    ),
                    FieldDescriptor::new(
                        "description",
                        "Description",
                        FieldKind::Text,
                        Validator::Length { min: 1, max: 200 },
                    ),
                ],
            ),
            StepDefinition::new(
                "Classification",
                "Type and matching options",
                vec![
                    FieldDescriptor::new(
                        "account_type",
                        "Account type",
                        FieldKind::Choice(labels(AccountType::ALL)),
                        type_validator,
                    ),
                    FieldDescriptor::new(
                        "lettrable",
                        "Allow entry matching",
                        FieldKind::Boolean,
                        Validator::None,
                    ),
                    FieldDescriptor::new("is_active", "Active", FieldKind::Boolean, Validator::None),
                ],
            ),
            StepDefinition::new("Review", "Check the account before saving", Vec::new()),
        ]);

        let (defaults, mode) = match initial {
            Some(account) => (
                FormState::new()
                    .with("code", account.code.as_str())
                    .with("description", account.description.as_str())
                    .with("account_type", account.account_type.label())
                    .with("lettrable", account.lettrable)
                    .with("is_active", account.is_active),
                AccountMode::Edit { id: account.id },
            ),
            None => (
                FormState::new()
                    .with("account_type", AccountType::Expense.label())
                    .with("lettrable", false)
                    .with("is_active", true),
                AccountMode::Create,
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
            AccountMode::Create => None,
            AccountMode::Edit { id } => Some(id),
        }
    }
}

#[async_trait]
impl WizardFlow for GeneralAccountFlow {
    type Request = Submission<GeneralAccountRequest>;
    type Response = GeneralAccount;

    fn name(&self) -> &'static str {
        "General account"
    }

    fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    fn defaults(&self) -> FormState {
        self.defaults.clone()
    }

    fn async_checks(&self, state: &FormState) -> Vec<CheckRequest> {
        let code = state.text("code");
        if !code_pattern().is_match(code) {
            return Vec::new();
        }
        vec![CheckRequest::new("code", STEP_IDENTITY, normalize_code(code))]
    }

    async fn run_check(
        &self,
        _request: &CheckRequest,
        state: &FormState,
    ) -> Result<CheckOutcome, ApiError> {
        let code = state.text("code");
        let available = self.api.account_code_available(code, self.editing_id()).await?;
        Ok(availability(available, || {
            format!("Account code '{}' is already used", code)
        }))
    }

    fn project(&self, state: &FormState) -> Result<Self::Request, ValidationError> {
        let type_label = required_text(state, "account_type", "Account type")?;
        let account_type = AccountType::from_label(&type_label).ok_or_else(|| {
            ValidationError::for_field("account_type", "Choose a valid account type")
        })?;
        let body = GeneralAccountRequest {
            code: required_text(state, "code", "Account code")?,
            description: required_text(state, "description", "Description")?,
            account_type,
            lettrable: flag(state, "lettrable"),
            is_active: flag(state, "is_active"),
        };
        Ok(match self.mode {
            AccountMode::Create => Submission::create(body),
            AccountMode::Edit { id } => Submission::update(id, body),
        })
    }

    async fn submit(&self, request: Self::Request) -> Result<Self::Response, ApiError> {
        match request.target {
            Some(id) => self.api.update_account(id, request.body).await,
            None => self.api.create_account(request.body).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryBackend;

    #[test]
    fn edit_round_trip_matches_original() {
        let account = GeneralAccount {
            id: 50,
            code: "401000".into(),
            description: "Suppliers".into(),
            account_type: AccountType::Liability,
            lettrable: true,
            is_active: true,
        };
        let flow = GeneralAccountFlow::new_edit(Arc::new(MemoryBackend::seeded()), &account);
        let request = flow.project(&flow.defaults()).unwrap();
        assert_eq!(request.target, Some(50));
        assert_eq!(request.body, GeneralAccountRequest::from_account(&account));
    }

    #[test]
    fn code_format_is_checked_before_probing() {
        let flow = GeneralAccountFlow::new_create(Arc::new(MemoryBackend::seeded()));
        let state = flow.defaults().with("code", "401-000");
        let errors = flow.steps().validate(STEP_IDENTITY, &state);
        assert_eq!(errors.error("code"), Some("Code must be 1-20 letters or digits"));
        assert!(flow.async_checks(&state).is_empty());
    }
}
