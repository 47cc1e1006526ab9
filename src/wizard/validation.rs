use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use super::state::{FieldValue, FormState};

/// Field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn for_field(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Outcome of validating one step: messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    field_errors: BTreeMap<String, String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.field_errors.is_empty()
    }

    /// Records an error; the first message reported for a field wins.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.field_errors
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn remove(&mut self, field: &str) {
        self.field_errors.remove(field);
    }

    pub fn error(&self, field: &str) -> Option<&str> {
        self.field_errors.get(field).map(String::as_str)
    }

    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        &self.field_errors
    }

    pub fn len(&self) -> usize {
        self.field_errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationResult) {
        for (field, message) in other.field_errors {
            self.field_errors.entry(field).or_insert(message);
        }
    }

    /// One-line text for the aggregate notification.
    pub fn summary(&self) -> String {
        match self.field_errors.len() {
            0 => String::new(),
            1 => self
                .field_errors
                .values()
                .next()
                .cloned()
                .unwrap_or_default(),
            count => {
                let messages: Vec<&str> = self.field_errors.values().map(String::as_str).collect();
                format!("Please fix {} fields: {}", count, messages.join("; "))
            }
        }
    }

    /// End date must not precede the start date; blanks are left to required checks.
    pub fn check_date_order(&mut self, state: &FormState, start: &str, end: &str, message: &str) {
        if let (Some(start_date), Some(end_date)) =
            (state.get(start).as_date(), state.get(end).as_date())
        {
            if end_date < start_date {
                self.add(end, message);
            }
        }
    }

    pub fn check_min_selected(&mut self, state: &FormState, field: &str, min: usize, message: &str) {
        if state.get(field).as_selection().len() < min {
            self.add(field, message);
        }
    }
}

impl From<ValidationError> for ValidationResult {
    fn from(err: ValidationError) -> Self {
        let mut result = ValidationResult::new();
        result.add(err.field.as_deref().unwrap_or("form"), err.message);
        result
    }
}

type ValidatorCallback = dyn Fn(&FieldValue) -> Result<(), String> + Send + Sync;
type SharedValidatorCallback = Arc<ValidatorCallback>;

/// Built-in validation helpers applied to non-blank values.
#[derive(Clone)]
pub enum Validator {
    None,
    Length { min: usize, max: usize },
    Pattern {
        regex: &'static Regex,
        message: &'static str,
    },
    Email,
    Range { min: f64, max: f64 },
    Custom(SharedValidatorCallback),
}

impl Validator {
    pub fn custom(
        func: impl Fn(&FieldValue) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Validator::Custom(Arc::new(func))
    }

    pub fn validate(&self, value: &FieldValue) -> Result<(), ValidationError> {
        if value.is_blank() {
            return Ok(());
        }
        match self {
            Validator::None => Ok(()),
            Validator::Length { min, max } => {
                let len = value.to_string().chars().count();
                if len < *min {
                    Err(ValidationError::new(format!(
                        "Must be at least {} characters",
                        min
                    )))
                } else if len > *max {
                    Err(ValidationError::new(format!(
                        "Cannot exceed {} characters (got {})",
                        max, len
                    )))
                } else {
                    Ok(())
                }
            }
            Validator::Pattern { regex, message } => {
                if regex.is_match(&value.to_string()) {
                    Ok(())
                } else {
                    Err(ValidationError::new(*message))
                }
            }
            Validator::Email => {
                if email_regex().is_match(&value.to_string()) {
                    Ok(())
                } else {
                    Err(ValidationError::new("Enter a valid email address"))
                }
            }
            Validator::Range { min, max } => match value.as_decimal() {
                Some(number) if number < *min || number > *max => Err(ValidationError::new(
                    format!("Value must be between {} and {}", min, max),
                )),
                Some(_) => Ok(()),
                None => Err(ValidationError::new("Enter a numeric value")),
            },
            Validator::Custom(func) => func(value).map_err(ValidationError::new),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::None => write!(f, "None"),
            Validator::Length { min, max } => write!(f, "Length({}..={})", min, max),
            Validator::Pattern { regex, .. } => write!(f, "Pattern({})", regex.as_str()),
            Validator::Email => write!(f, "Email"),
            Validator::Range { min, max } => write!(f, "Range({}..={})", min, max),
            Validator::Custom(_) => write!(f, "Custom"),
        }
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
    })
}
