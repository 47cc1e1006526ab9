//! Terminal front end for a [`Wizard`]: one prompt per field, a summary
//! confirmation on the last step, and validation errors fed back inline.

use chrono::NaiveDate;
use dialoguer::{theme::ColorfulTheme, Input, MultiSelect, Password, Select};

use crate::errors::WizardError;
use crate::wizard::{
    CheckStatus, FieldDescriptor, FieldKind, FieldValue, OptionItem, StepDefinition,
    StepOutcome, SubmitOutcome, SummaryLine, ValidationResult, Wizard, WizardFlow,
};

use super::output;
use super::CliError;

const BACK_KEYWORD: &str = ":back";
const CANCEL_KEYWORD: &str = ":cancel";

/// Everything a front end needs to render one field prompt.
pub struct PromptContext<'a> {
    pub step: &'a StepDefinition,
    pub field: &'a FieldDescriptor,
    pub current: &'a FieldValue,
    /// Entries of the field's option list (lookup and multi-select fields).
    pub options: &'a [OptionItem],
    pub error: Option<&'a str>,
    pub total_steps: usize,
}

impl PromptContext<'_> {
    pub fn step_title(&self) -> String {
        format!("Step {} / {}: {}", self.step.id, self.total_steps, self.step.title)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptResponse {
    Value(FieldValue),
    /// Leave the field as it is.
    Keep,
    Back,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResponse {
    Confirm,
    Back,
    Cancel,
}

pub trait Interaction {
    fn prompt_field(&mut self, context: &PromptContext<'_>) -> Result<PromptResponse, CliError>;
    fn confirm(&mut self, summary: &[SummaryLine]) -> Result<ConfirmationResponse, CliError>;
}

/// Converts typed input into a field value; blank input clears the field.
pub fn parse_input(kind: &FieldKind, raw: &str) -> Result<FieldValue, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(FieldValue::Empty);
    }
    match kind {
        FieldKind::Text => Ok(FieldValue::text(trimmed)),
        FieldKind::Secret => Ok(FieldValue::text(raw)),
        FieldKind::Integer => trimmed
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| "Enter a whole number".to_string()),
        FieldKind::Decimal => trimmed
            .replace(',', ".")
            .parse::<f64>()
            .map(FieldValue::Decimal)
            .map_err(|_| "Enter a number".to_string()),
        FieldKind::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(FieldValue::Date)
            .map_err(|_| "Enter a date as YYYY-MM-DD".to_string()),
        FieldKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" | "1" => Ok(FieldValue::Flag(true)),
            "n" | "no" | "false" | "0" => Ok(FieldValue::Flag(false)),
            _ => Err("Answer yes or no".to_string()),
        },
        FieldKind::Choice(labels) => labels
            .iter()
            .find(|label| label.eq_ignore_ascii_case(trimmed))
            .map(|label| FieldValue::text(label.as_str()))
            .ok_or_else(|| format!("Choose one of: {}", labels.join(", "))),
        FieldKind::Lookup(_) | FieldKind::MultiSelect(_) => {
            Err("Pick an entry from the list".to_string())
        }
    }
}

/// Merges a multi-select result into the existing selection.
///
/// `picked` holds indices into `current ++ remaining`; entries already
/// selected keep their position and new picks are appended in list order.
pub fn merge_selection(
    current: &[OptionItem],
    remaining: &[OptionItem],
    picked: &[usize],
) -> Vec<OptionItem> {
    let mut merged: Vec<OptionItem> = current
        .iter()
        .enumerate()
        .filter(|(index, _)| picked.contains(index))
        .map(|(_, item)| item.clone())
        .collect();
    merged.extend(
        remaining
            .iter()
            .enumerate()
            .filter(|(index, _)| picked.contains(&(index + current.len())))
            .map(|(_, item)| item.clone()),
    );
    merged
}

fn option_list(kind: &FieldKind) -> Option<&'static str> {
    match kind {
        FieldKind::Lookup(list) | FieldKind::MultiSelect(list) => Some(list),
        _ => None,
    }
}

/// Prompts backed by `dialoguer`.
pub struct DialoguerInteraction {
    theme: ColorfulTheme,
}

impl Default for DialoguerInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl DialoguerInteraction {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }

    fn prompt_label(context: &PromptContext<'_>) -> String {
        if context.field.required {
            context.field.label.to_string()
        } else {
            format!("{} (optional)", context.field.label)
        }
    }

    fn typed(&self, context: &PromptContext<'_>) -> Result<PromptResponse, CliError> {
        let kind = context.field.kind.clone();
        let mut input = Input::<String>::with_theme(&self.theme)
            .with_prompt(Self::prompt_label(context))
            .allow_empty(true)
            .validate_with(move |raw: &String| -> Result<(), String> {
                let keyword = raw.trim();
                if keyword == BACK_KEYWORD || keyword == CANCEL_KEYWORD {
                    return Ok(());
                }
                parse_input(&kind, raw).map(|_| ())
            });
        if !context.current.is_blank() {
            input = input.with_initial_text(context.current.to_string());
        }
        let raw = input.interact_text()?;
        Ok(match raw.trim() {
            BACK_KEYWORD => PromptResponse::Back,
            CANCEL_KEYWORD => PromptResponse::Cancel,
            _ => PromptResponse::Value(
                parse_input(&context.field.kind, &raw).map_err(CliError::Message)?,
            ),
        })
    }

    fn secret(&self, context: &PromptContext<'_>) -> Result<PromptResponse, CliError> {
        let raw = Password::with_theme(&self.theme)
            .with_prompt(Self::prompt_label(context))
            .allow_empty_password(true)
            .interact()?;
        if raw.is_empty() && !context.current.is_blank() {
            return Ok(PromptResponse::Keep);
        }
        Ok(match raw.trim() {
            BACK_KEYWORD => PromptResponse::Back,
            CANCEL_KEYWORD => PromptResponse::Cancel,
            _ => PromptResponse::Value(parse_input(&FieldKind::Secret, &raw).map_err(CliError::Message)?),
        })
    }

    /// Select with trailing Back/Cancel entries; Esc also goes back.
    fn pick(
        &self,
        context: &PromptContext<'_>,
        labels: &[String],
        default: usize,
    ) -> Result<Option<usize>, CliError> {
        let mut items: Vec<String> = labels.to_vec();
        items.push("< Back".into());
        items.push("Cancel".into());
        let picked = Select::with_theme(&self.theme)
            .with_prompt(Self::prompt_label(context))
            .items(&items)
            .default(default.min(items.len() - 1))
            .interact_opt()?;
        Ok(picked)
    }

    fn picked_response(
        picked: Option<usize>,
        len: usize,
        value: impl FnOnce(usize) -> FieldValue,
    ) -> PromptResponse {
        match picked {
            None => PromptResponse::Back,
            Some(index) if index < len => PromptResponse::Value(value(index)),
            Some(index) if index == len => PromptResponse::Back,
            Some(_) => PromptResponse::Cancel,
        }
    }

    fn boolean(&self, context: &PromptContext<'_>) -> Result<PromptResponse, CliError> {
        let labels = vec!["Yes".to_string(), "No".to_string()];
        let default = match context.current.as_flag() {
            Some(false) => 1,
            _ => 0,
        };
        let picked = self.pick(context, &labels, default)?;
        Ok(Self::picked_response(picked, 2, |index| {
            FieldValue::Flag(index == 0)
        }))
    }

    fn choice(&self, context: &PromptContext<'_>, labels: &[String]) -> Result<PromptResponse, CliError> {
        let default = context
            .current
            .as_text()
            .and_then(|current| labels.iter().position(|label| label == current))
            .unwrap_or(0);
        let picked = self.pick(context, labels, default)?;
        Ok(Self::picked_response(picked, labels.len(), |index| {
            FieldValue::text(labels[index].as_str())
        }))
    }

    fn lookup(&self, context: &PromptContext<'_>) -> Result<PromptResponse, CliError> {
        if context.options.is_empty() {
            output::warning(format!("No entries available for {}", context.field.label));
            return Ok(PromptResponse::Keep);
        }
        let labels: Vec<String> = context.options.iter().map(|item| item.label.clone()).collect();
        let default = context
            .current
            .as_choice()
            .and_then(|id| context.options.iter().position(|item| item.id == id))
            .unwrap_or(0);
        let picked = self.pick(context, &labels, default)?;
        Ok(Self::picked_response(picked, labels.len(), |index| {
            FieldValue::Choice(context.options[index].id)
        }))
    }

    fn multi(&self, context: &PromptContext<'_>) -> Result<PromptResponse, CliError> {
        let current = context.current.as_selection();
        let remaining: Vec<OptionItem> = context
            .options
            .iter()
            .filter(|option| current.iter().all(|selected| selected.id != option.id))
            .cloned()
            .collect();
        if current.is_empty() && remaining.is_empty() {
            output::warning(format!("No entries available for {}", context.field.label));
            return Ok(PromptResponse::Keep);
        }
        let items: Vec<String> = current
            .iter()
            .chain(remaining.iter())
            .map(|item| item.label.clone())
            .collect();
        let checked: Vec<bool> = (0..items.len()).map(|index| index < current.len()).collect();
        let picked = MultiSelect::with_theme(&self.theme)
            .with_prompt(format!("{} (space to toggle, Esc to go back)", Self::prompt_label(context)))
            .items(&items)
            .defaults(&checked)
            .interact_opt()?;
        Ok(match picked {
            None => PromptResponse::Back,
            Some(indices) => PromptResponse::Value(FieldValue::Selection(merge_selection(
                current, &remaining, &indices,
            ))),
        })
    }
}

impl Interaction for DialoguerInteraction {
    fn prompt_field(&mut self, context: &PromptContext<'_>) -> Result<PromptResponse, CliError> {
        if let Some(error) = context.error {
            output::warning(error);
        }
        if let Some(help) = context.field.help {
            output::info(help);
        }
        match &context.field.kind {
            FieldKind::Secret => self.secret(context),
            FieldKind::Boolean => self.boolean(context),
            FieldKind::Choice(labels) => self.choice(context, labels),
            FieldKind::Lookup(_) => self.lookup(context),
            FieldKind::MultiSelect(_) => self.multi(context),
            FieldKind::Text | FieldKind::Integer | FieldKind::Decimal | FieldKind::Date => {
                self.typed(context)
            }
        }
    }

    fn confirm(&mut self, summary: &[SummaryLine]) -> Result<ConfirmationResponse, CliError> {
        for line in output::summary_lines(summary) {
            println!("  {}", line);
        }
        let items = ["Submit", "< Back", "Cancel"];
        let picked = Select::with_theme(&self.theme)
            .with_prompt("Save these details?")
            .items(&items)
            .default(0)
            .interact_opt()?;
        Ok(match picked {
            Some(0) => ConfirmationResponse::Confirm,
            Some(2) => ConfirmationResponse::Cancel,
            _ => ConfirmationResponse::Back,
        })
    }
}

enum StepInput {
    Done,
    Back,
    Cancel,
}

/// Drives a wizard to completion. Returns `None` when the user cancels.
pub async fn run_wizard<F, I>(
    wizard: &Wizard<F>,
    interaction: &mut I,
) -> Result<Option<F::Response>, CliError>
where
    F: WizardFlow,
    I: Interaction + ?Sized,
{
    wizard.open().await;
    output::section(wizard.flow().name());

    loop {
        let step = wizard
            .current_definition()
            .ok_or_else(|| CliError::Message("wizard has no active step".into()))?;
        output::info(output::progress_line(&wizard.progress()));

        if wizard.is_terminal() {
            match interaction.confirm(&wizard.summary())? {
                ConfirmationResponse::Confirm => match wizard.submit().await {
                    Ok(SubmitOutcome::Completed(response)) => return Ok(Some(response)),
                    Ok(SubmitOutcome::Rejected(errors)) => rewind_to_error(wizard, &errors)?,
                    Ok(SubmitOutcome::AlreadyInFlight) => {}
                    // The form is kept as entered; confirming again retries.
                    Err(WizardError::Submission(_)) => {}
                    Err(err) => return Err(err.into()),
                },
                ConfirmationResponse::Back => {
                    wizard.back()?;
                }
                ConfirmationResponse::Cancel => {
                    wizard.close();
                    return Ok(None);
                }
            }
            continue;
        }

        match prompt_step(wizard, interaction, &step).await? {
            StepInput::Done => match wizard.next().await? {
                StepOutcome::Advanced(_) | StepOutcome::Interrupted => {}
                StepOutcome::Rejected(errors) => {
                    for message in errors.field_errors().values() {
                        output::warning(message);
                    }
                }
            },
            StepInput::Back => {
                wizard.back()?;
            }
            StepInput::Cancel => {
                wizard.close();
                return Ok(None);
            }
        }
    }
}

/// Steps back to the first step that owns a rejected field.
fn rewind_to_error<F: WizardFlow>(
    wizard: &Wizard<F>,
    errors: &ValidationResult,
) -> Result<(), CliError> {
    let target = errors
        .field_errors()
        .keys()
        .filter_map(|key| {
            wizard
                .flow()
                .steps()
                .iter()
                .find(|step| step.field(key).is_some())
                .map(|step| step.id)
        })
        .min();
    let Some(target) = target else {
        return Ok(());
    };
    while wizard.current_step() > target {
        wizard.back()?;
    }
    // back() clears the stored errors, so they are shown here instead.
    for (field, message) in errors.field_errors() {
        output::warning(format!("{}: {}", field, message));
    }
    Ok(())
}

async fn prompt_step<F, I>(
    wizard: &Wizard<F>,
    interaction: &mut I,
    step: &StepDefinition,
) -> Result<StepInput, CliError>
where
    F: WizardFlow,
    I: Interaction + ?Sized,
{
    output::section(format!(
        "Step {} / {}: {}",
        step.id,
        wizard.step_count(),
        step.title
    ));
    if !step.description.is_empty() {
        output::info(step.description);
    }

    // After a rejection only the offending fields are asked again.
    let errors = wizard.errors();
    let retry: Vec<usize> = step
        .fields
        .iter()
        .enumerate()
        .filter(|(_, field)| errors.error(field.key).is_some())
        .map(|(index, _)| index)
        .collect();
    let order: Vec<usize> = if retry.is_empty() {
        (0..step.fields.len()).collect()
    } else {
        retry
    };

    let mut position = 0;
    let mut pending: Option<String> = None;
    while position < order.len() {
        let field = &step.fields[order[position]];
        let current = wizard.value(field.key);
        let options = option_list(&field.kind)
            .map(|list| wizard.options(list))
            .unwrap_or_default();
        let error = pending
            .take()
            .or_else(|| errors.error(field.key).map(str::to_string));
        let context = PromptContext {
            step,
            field,
            current: &current,
            options: &options,
            error: error.as_deref(),
            total_steps: wizard.step_count(),
        };

        match interaction.prompt_field(&context)? {
            PromptResponse::Value(value) => {
                wizard.set(field.key, value)?;
                if let Some(message) = field.check(&wizard.state()) {
                    pending = Some(message);
                    continue;
                }
                if let Some(result) = wizard.check_field(field.key).await? {
                    if result.status == CheckStatus::Invalid {
                        pending = result.message;
                        continue;
                    }
                }
                position += 1;
            }
            PromptResponse::Keep => position += 1,
            PromptResponse::Back => {
                if position == 0 {
                    return Ok(StepInput::Back);
                }
                position -= 1;
            }
            PromptResponse::Cancel => return Ok(StepInput::Cancel),
        }
    }
    Ok(StepInput::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::api::MemoryBackend;
    use crate::flows::{GeneralAccountFlow, RegistrationFlow};

    #[derive(Default)]
    struct MockInteraction {
        responses: VecDeque<PromptResponse>,
        confirmations: VecDeque<ConfirmationResponse>,
        prompted: Vec<&'static str>,
        errors_seen: Vec<String>,
    }

    impl MockInteraction {
        fn new(responses: Vec<PromptResponse>, confirmations: Vec<ConfirmationResponse>) -> Self {
            Self {
                responses: responses.into(),
                confirmations: confirmations.into(),
                ..Self::default()
            }
        }
    }

    impl Interaction for MockInteraction {
        fn prompt_field(&mut self, context: &PromptContext<'_>) -> Result<PromptResponse, CliError> {
            self.prompted.push(context.field.key);
            if let Some(error) = context.error {
                self.errors_seen.push(error.to_string());
            }
            self.responses
                .pop_front()
                .ok_or_else(|| CliError::Message(format!("no response for {}", context.field.key)))
        }

        fn confirm(&mut self, _summary: &[SummaryLine]) -> Result<ConfirmationResponse, CliError> {
            self.confirmations
                .pop_front()
                .ok_or_else(|| CliError::Message("no confirmation queued".into()))
        }
    }

    fn text(value: &str) -> PromptResponse {
        PromptResponse::Value(FieldValue::text(value))
    }

    fn account_wizard(backend: Arc<MemoryBackend>) -> Wizard<GeneralAccountFlow> {
        Wizard::new(GeneralAccountFlow::new_create(backend)).with_debounce(Duration::ZERO)
    }

    #[test]
    fn parse_input_handles_each_kind() {
        assert_eq!(parse_input(&FieldKind::Text, "  "), Ok(FieldValue::Empty));
        assert_eq!(parse_input(&FieldKind::Decimal, "12,5"), Ok(FieldValue::Decimal(12.5)));
        assert_eq!(parse_input(&FieldKind::Boolean, "Yes"), Ok(FieldValue::Flag(true)));
        assert_eq!(
            parse_input(&FieldKind::Date, "2024-02-30"),
            Err("Enter a date as YYYY-MM-DD".to_string())
        );
        let kind = FieldKind::Choice(vec!["Any".into(), "All".into()]);
        assert_eq!(parse_input(&kind, "all"), Ok(FieldValue::text("All")));
    }

    #[test]
    fn merge_selection_keeps_existing_order_and_appends() {
        let current = vec![OptionItem::new(5, "Emma"), OptionItem::new(2, "Bruno")];
        let remaining = vec![OptionItem::new(1, "Alice"), OptionItem::new(3, "Chloe")];
        let merged = merge_selection(&current, &remaining, &[0, 1, 3]);
        let ids: Vec<i64> = merged.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![5, 2, 3]);
    }

    #[tokio::test]
    async fn completes_account_wizard() {
        let backend = Arc::new(MemoryBackend::seeded());
        let wizard = account_wizard(Arc::clone(&backend));
        let mut interaction = MockInteraction::new(
            vec![
                text("512000"),
                text("Bank"),
                PromptResponse::Value(FieldValue::text("Asset")),
                PromptResponse::Keep,
                PromptResponse::Keep,
            ],
            vec![ConfirmationResponse::Confirm],
        );

        let account = run_wizard(&wizard, &mut interaction)
            .await
            .unwrap()
            .expect("wizard completes");
        assert_eq!(account.code, "512000");
        assert_eq!(backend.create_calls(), 1);
        assert!(!wizard.is_open());
    }

    #[tokio::test]
    async fn taken_code_is_asked_again() {
        let backend = Arc::new(MemoryBackend::seeded());
        let wizard = account_wizard(Arc::clone(&backend));
        let mut interaction = MockInteraction::new(
            vec![
                text("401000"),
                text("512000"),
                text("Bank"),
                PromptResponse::Keep,
                PromptResponse::Keep,
                PromptResponse::Keep,
            ],
            vec![ConfirmationResponse::Confirm],
        );

        run_wizard(&wizard, &mut interaction).await.unwrap();
        assert_eq!(&interaction.prompted[..2], &["code", "code"]);
        assert_eq!(
            interaction.errors_seen,
            vec!["Account code '401000' is already used".to_string()]
        );
    }

    #[tokio::test]
    async fn back_from_review_then_cancel_discards_state() {
        let backend = Arc::new(MemoryBackend::seeded());
        let wizard = account_wizard(Arc::clone(&backend));
        let mut interaction = MockInteraction::new(
            vec![
                text("512000"),
                text("Bank"),
                PromptResponse::Keep,
                PromptResponse::Keep,
                PromptResponse::Keep,
                PromptResponse::Cancel,
            ],
            vec![ConfirmationResponse::Back],
        );

        let result = run_wizard(&wizard, &mut interaction).await.unwrap();
        assert!(result.is_none());
        assert!(!wizard.is_open());
        assert_eq!(backend.create_calls(), 0);
        assert_eq!(interaction.prompted.last(), Some(&"account_type"));
    }

    #[tokio::test]
    async fn rejected_step_only_prompts_failing_fields() {
        let backend = Arc::new(MemoryBackend::seeded());
        let wizard = Wizard::new(RegistrationFlow::new(backend)).with_debounce(Duration::ZERO);
        let mut interaction = MockInteraction::new(
            vec![
                PromptResponse::Value(FieldValue::text("Company")),
                text("Jane"),
                text("Doe"),
                PromptResponse::Keep,
                text("Doe Consulting"),
                PromptResponse::Cancel,
            ],
            Vec::new(),
        );

        run_wizard(&wizard, &mut interaction).await.unwrap();
        assert_eq!(
            interaction.prompted,
            vec!["user_type", "first_name", "last_name", "company_name", "company_name", "username"]
        );
        assert!(interaction
            .errors_seen
            .contains(&"Company name is required for company accounts".to_string()));
    }
}
