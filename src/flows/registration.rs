use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::api::RegistrationApi;
use crate::domain::{RegisteredUser, RegistrationRequest, UserType};
use crate::errors::ApiError;
use crate::wizard::{
    CheckOutcome, CheckRequest, FieldDependency, FieldDescriptor, FieldKind, FieldValue,
    FormState, StepDefinition, StepId, StepRegistry, ValidationError, ValidationResult, Validator,
    WizardFlow,
};

use super::{availability, labels, optional_text, required_text};

pub const STEP_IDENTITY: StepId = 1;
pub const STEP_CREDENTIALS: StepId = 2;
pub const STEP_PROFILE: StepId = 3;
pub const STEP_REVIEW: StepId = 4;

const MIN_PASSWORD_LEN: usize = 8;

const DEPENDENCIES: &[FieldDependency] = &[FieldDependency::Reset {
    source: "user_type",
    targets: &["company_name"],
}];

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]{3,30}$").expect("valid username regex"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9 ()-]{6,20}$").expect("valid phone regex"))
}

/// Length plus upper, lower and digit classes.
pub fn password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err("Password needs an uppercase letter, a lowercase letter and a digit".into())
    }
}

fn user_type(state: &FormState) -> Option<UserType> {
    UserType::from_label(state.text("user_type"))
}

/// Passwords are compared untrimmed.
fn raw_text<'a>(state: &'a FormState, field: &str) -> &'a str {
    state.get(field).as_text().unwrap_or("")
}

/// Multi-step sign-up: identity, credentials, optional profile, review.
pub struct RegistrationFlow {
    api: Arc<dyn RegistrationApi>,
    steps: StepRegistry,
}

impl RegistrationFlow {
    pub fn new(api: Arc<dyn RegistrationApi>) -> Self {
        let type_validator = Validator::custom(|value| match value.as_text() {
            Some(label) if UserType::from_label(label).is_some() => Ok(()),
            _ => Err("Choose an account type".into()),
        });
        let password_validator = Validator::custom(|value| match value {
            FieldValue::Text(password) => password_strength(password),
            _ => Err("Enter a password".into()),
        });

        let steps = StepRegistry::new(vec![
            StepDefinition::new(
                "Identity",
                "Who is registering",
                vec![
                    FieldDescriptor::new(
                        "user_type",
                        "Account type",
                        FieldKind::Choice(labels(UserType::ALL)),
                        type_validator,
                    ),
                    FieldDescriptor::new(
                        "first_name",
                        "First name",
                        FieldKind::Text,
                        Validator::Length { min: 1, max: 50 },
                    ),
                    FieldDescriptor::new(
                        "last_name",
                        "Last name",
                        FieldKind::Text,
                        Validator::Length { min: 1, max: 50 },
                    ),
                    FieldDescriptor::new(
                        "company_name",
                        "Company name",
                        FieldKind::Text,
                        Validator::Length { min: 2, max: 100 },
                    )
                    .with_optional()
                    .with_help("Required for company accounts"),
                ],
            ),
            StepDefinition::new(
                "Credentials",
                "Sign-in details",
                vec![
                    FieldDescriptor::new(
                        "username",
                        "Username",
                        FieldKind::Text,
                        Validator::Pattern {
                            regex: username_pattern(),
                            message: "Username must be 3-30 letters, digits, '.', '-' or '_'",
                        },
                    ),
                    FieldDescriptor::new("email", "Email", FieldKind::Text, Validator::Email),
                    FieldDescriptor::new("password", "Password", FieldKind::Secret, password_validator),
                    FieldDescriptor::new(
                        "confirm_password",
                        "Confirm password",
                        FieldKind::Secret,
                        Validator::None,
                    ),
                ],
            ),
            StepDefinition::new(
                "Profile",
                "Optional contact details",
                vec![
                    FieldDescriptor::new(
                        "phone",
                        "Phone",
                        FieldKind::Text,
                        Validator::Pattern {
                            regex: phone_pattern(),
                            message: "Enter a valid phone number",
                        },
                    )
                    .with_optional(),
                    FieldDescriptor::new(
                        "country",
                        "Country",
                        FieldKind::Text,
                        Validator::Length { min: 2, max: 60 },
                    )
                    .with_optional(),
                    FieldDescriptor::new(
                        "address",
                        "Address",
                        FieldKind::Text,
                        Validator::Length { min: 0, max: 200 },
                    )
                    .with_optional(),
                ],
            ),
            StepDefinition::new("Review", "Check your details before signing up", Vec::new()),
        ]);

        Self { api, steps }
    }
}

#[async_trait]
impl WizardFlow for RegistrationFlow {
    type Request = RegistrationRequest;
    type Response = RegisteredUser;

    fn name(&self) -> &'static str {
        "Registration"
    }

    fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    fn defaults(&self) -> FormState {
        FormState::new().with("user_type", UserType::Simple.label())
    }

    fn dependencies(&self) -> &[FieldDependency] {
        DEPENDENCIES
    }

    fn validate_step(&self, step: StepId, state: &FormState) -> ValidationResult {
        let mut result = ValidationResult::new();
        let company = user_type(state) == Some(UserType::Company);
        if (step == STEP_IDENTITY || step == STEP_REVIEW)
            && company
            && state.get("company_name").is_blank()
        {
            result.add("company_name", "Company name is required for company accounts");
        }
        if step == STEP_CREDENTIALS || step == STEP_REVIEW {
            let confirm = raw_text(state, "confirm_password");
            if !confirm.is_empty() && confirm != raw_text(state, "password") {
                result.add("confirm_password", "Passwords do not match");
            }
        }
        result
    }

    fn async_checks(&self, state: &FormState) -> Vec<CheckRequest> {
        let mut checks = Vec::new();
        let username = state.text("username");
        if username_pattern().is_match(username) {
            checks.push(CheckRequest::new(
                "username",
                STEP_CREDENTIALS,
                username.to_lowercase(),
            ));
        }
        let email = state.get("email");
        if !email.is_blank() && Validator::Email.validate(email).is_ok() {
            checks.push(CheckRequest::new(
                "email",
                STEP_CREDENTIALS,
                state.text("email").to_lowercase(),
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
            "username" => {
                let username = state.text("username");
                let available = self.api.username_available(username).await?;
                Ok(availability(available, || {
                    format!("Username '{}' is already taken", username)
                }))
            }
            "email" => {
                let email = state.text("email");
                let available = self.api.email_available(email).await?;
                Ok(availability(available, || {
                    format!("An account already exists for {}", email)
                }))
            }
            _ => Ok(CheckOutcome::Valid),
        }
    }

    fn project(&self, state: &FormState) -> Result<Self::Request, ValidationError> {
        let user_type = user_type(state)
            .ok_or_else(|| ValidationError::for_field("user_type", "Choose an account type"))?;
        let company_name = match user_type {
            UserType::Company => Some(required_text(state, "company_name", "Company name")?),
            UserType::Simple => None,
        };
        let password = raw_text(state, "password");
        if password.is_empty() {
            return Err(ValidationError::for_field("password", "Password is required"));
        }
        Ok(RegistrationRequest {
            user_type,
            first_name: required_text(state, "first_name", "First name")?,
            last_name: required_text(state, "last_name", "Last name")?,
            company_name,
            username: required_text(state, "username", "Username")?,
            email: required_text(state, "email", "Email")?,
            password: password.to_string(),
            phone: optional_text(state, "phone"),
            country: optional_text(state, "country"),
            address: optional_text(state, "address"),
        })
    }

    async fn submit(&self, request: Self::Request) -> Result<Self::Response, ApiError> {
        self.api.register(request).await
    }

    fn success_message(&self) -> String {
        "Account created, you can now sign in".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryBackend;

    fn flow() -> RegistrationFlow {
        RegistrationFlow::new(Arc::new(MemoryBackend::seeded()))
    }

    #[test]
    fn password_rules() {
        assert!(password_strength("Secr3tPass").is_ok());
        assert!(password_strength("short1A").is_err());
        assert!(password_strength("alllowercase1").is_err());
    }

    #[test]
    fn company_name_only_required_for_companies() {
        let flow = flow();
        let simple = flow.defaults();
        assert!(flow.validate_step(STEP_IDENTITY, &simple).is_valid());

        let company = simple.with("user_type", UserType::Company.label());
        assert_eq!(
            flow.validate_step(STEP_IDENTITY, &company).error("company_name"),
            Some("Company name is required for company accounts")
        );
    }

    #[test]
    fn confirmation_must_match() {
        let flow = flow();
        let state = FormState::new()
            .with("password", "Secr3tPass")
            .with("confirm_password", "Secr3tPas");
        assert_eq!(
            flow.validate_step(STEP_CREDENTIALS, &state).error("confirm_password"),
            Some("Passwords do not match")
        );
    }

    #[test]
    fn simple_accounts_omit_company_in_payload() {
        let flow = flow();
        let state = flow
            .defaults()
            .with("first_name", "Jane")
            .with("last_name", "Doe")
            .with("company_name", "Leftover Ltd")
            .with("username", "jdoe")
            .with("email", "jane@example.com")
            .with("password", "Secr3tPass");
        let request = flow.project(&state).unwrap();
        assert_eq!(request.company_name, None);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("companyName").is_none());
        assert_eq!(json["userType"], "Simple");
    }
}
