use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::api::LineApi;
use crate::domain::{
    Discount, Displayable, Element, ElementType, EntityId, Identifiable, Ligne, LigneRequest,
    LineTotals, Location,
};
use crate::errors::ApiError;
use crate::utils::normalize_code;
use crate::wizard::{
    field_summary, CheckOutcome, CheckRequest, FieldDependency, FieldDescriptor, FieldKind,
    FieldValue, FormState, OptionItem, OptionLists, StepDefinition, StepId, StepRegistry,
    SummaryLine, ValidationError, ValidationResult, Validator, WizardFlow,
};

use super::{dashed_code_pattern, flag, labels, required_choice, required_text, Submission};

pub const STEP_TYPE: StepId = 1;
pub const STEP_ELEMENT: StepId = 2;
pub const STEP_PRICING: StepId = 3;
pub const STEP_REVIEW: StepId = 4;

pub const ELEMENTS: &str = "elements";
pub const LOCATIONS: &str = "locations";

const DEPENDENCIES: &[FieldDependency] = &[
    FieldDependency::Reset {
        source: "element_type",
        targets: &["element_id", "location_id", "code", "description"],
    },
    FieldDependency::Derive {
        source: "element_id",
        target: "code",
    },
    FieldDependency::Derive {
        source: "element_id",
        target: "description",
    },
];

/// First free code for `base`: the base itself, then `BASE-2`, `BASE-3`, ...
/// Comparison ignores case and surrounding whitespace.
pub fn suggest_code(base: &str, existing: &[String]) -> String {
    let base = base.trim();
    let taken = |candidate: &str| {
        existing
            .iter()
            .any(|code| code.trim().eq_ignore_ascii_case(candidate))
    };
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn element_option(element: &Element) -> OptionItem {
    OptionItem::new(element.id(), element.display_label())
        .with_code(element.code.as_str())
        .with_description(element.description.as_str())
}

fn location_option(location: &Location) -> OptionItem {
    OptionItem::new(location.id(), location.display_label()).with_code(location.code.as_str())
}

fn element_type(state: &FormState) -> Option<ElementType> {
    ElementType::from_label(state.text("element_type"))
}

fn decimal(state: &FormState, field: &str) -> Option<f64> {
    state.get(field).as_decimal()
}

fn positive_quantity() -> Validator {
    Validator::custom(|value| match value.as_decimal() {
        Some(quantity) if quantity > 0.0 => Ok(()),
        Some(_) => Err("Quantity must be greater than zero".into()),
        None => Err("Enter a numeric value".into()),
    })
}

#[derive(Clone, Debug)]
enum LigneMode {
    Create,
    Edit { id: EntityId, original_code: String },
}

/// Adds or edits one line of a document.
///
/// Choosing an element type resets the element, location, code and
/// description; choosing an element suggests a code and description until the
/// user edits them.
pub struct LigneFlow {
    api: Arc<dyn LineApi>,
    document_id: EntityId,
    steps: StepRegistry,
    defaults: FormState,
    mode: LigneMode,
    /// Codes of the document's other lines, refreshed when the element step opens.
    taken_codes: Mutex<Vec<String>>,
}

impl LigneFlow {
    pub fn new_create(api: Arc<dyn LineApi>, document_id: EntityId) -> Self {
        Self::build(api, document_id, None)
    }

    pub fn new_edit(api: Arc<dyn LineApi>, ligne: &Ligne) -> Self {
        Self::build(api, ligne.document_id, Some(ligne))
    }

    fn build(api: Arc<dyn LineApi>, document_id: EntityId, initial: Option<&Ligne>) -> Self {
        let type_validator = Validator::custom(|value| match value.as_text() {
            Some(label) if ElementType::from_label(label).is_some() => Ok(()),
            _ => Err("Choose a valid element type".into()),
        });

        let steps = StepRegistry::new(vec![
            StepDefinition::new(
                "Element type",
                "What the line refers to",
                vec![FieldDescriptor::new(
                    "element_type",
                    "Element type",
                    FieldKind::Choice(labels(ElementType::ALL)),
                    type_validator,
                )],
            ),
            StepDefinition::new(
                "Element",
                "Pick the element and name the line",
                vec![
                    FieldDescriptor::new(
                        "element_id",
                        "Element",
                        FieldKind::Lookup(ELEMENTS),
                        Validator::None,
                    ),
                    FieldDescriptor::new(
                        "location_id",
                        "Location",
                        FieldKind::Lookup(LOCATIONS),
                        Validator::None,
                    )
                    .with_optional()
                    .with_help("Required for stock items"),
                    FieldDescriptor::new(
                        "code",
                        "Line code",
                        FieldKind::Text,
                        Validator::Pattern {
                            regex: dashed_code_pattern(),
                            message: "Code must be 1-20 letters, digits, '-' or '_'",
                        },
                    ),
                    FieldDescriptor::new(
                        "description",
                        "Description",
                        FieldKind::Text,
                        Validator::Length { min: 1, max: 250 },
                    ),
                ],
            ),
            StepDefinition::new(
                "Pricing",
                "Quantities, discount and VAT",
                vec![
                    FieldDescriptor::new("quantity", "Quantity", FieldKind::Decimal, positive_quantity()),
                    FieldDescriptor::new(
                        "unit_price",
                        "Unit price",
                        FieldKind::Decimal,
                        Validator::Range {
                            min: 0.0,
                            max: 1_000_000_000.0,
                        },
                    ),
                    FieldDescriptor::new(
                        "percentage_discount",
                        "Discount as percentage",
                        FieldKind::Boolean,
                        Validator::None,
                    ),
                    FieldDescriptor::new(
                        "discount_percentage",
                        "Discount (%)",
                        FieldKind::Decimal,
                        Validator::Range {
                            min: 0.0,
                            max: 100.0,
                        },
                    )
                    .with_optional(),
                    FieldDescriptor::new(
                        "discount_amount",
                        "Discount amount",
                        FieldKind::Decimal,
                        Validator::Range {
                            min: 0.0,
                            max: 1_000_000_000.0,
                        },
                    )
                    .with_optional(),
                    FieldDescriptor::new(
                        "vat_percentage",
                        "VAT (%)",
                        FieldKind::Decimal,
                        Validator::Range {
                            min: 0.0,
                            max: 100.0,
                        },
                    ),
                ],
            ),
            StepDefinition::new("Review", "Check the line before saving", Vec::new()),
        ]);

        let (defaults, mode) = match initial {
            Some(ligne) => {
                let mut defaults = FormState::new()
                    .with("element_type", ligne.element_type.label())
                    .with("element_id", FieldValue::Choice(ligne.element_id))
                    .with("code", ligne.code.as_str())
                    .with("description", ligne.description.as_str())
                    .with("quantity", ligne.quantity)
                    .with("unit_price", ligne.unit_price)
                    .with("percentage_discount", ligne.discount_amount.is_none())
                    .with("vat_percentage", ligne.vat_percentage);
                if let Some(location) = ligne.location_id {
                    defaults = defaults.with("location_id", FieldValue::Choice(location));
                }
                if let Some(rate) = ligne.discount_percentage {
                    defaults = defaults.with("discount_percentage", rate);
                }
                if let Some(amount) = ligne.discount_amount {
                    defaults = defaults.with("discount_amount", amount);
                }
                (
                    defaults,
                    LigneMode::Edit {
                        id: ligne.id,
                        original_code: ligne.code.clone(),
                    },
                )
            }
            None => (
                FormState::new()
                    .with("element_type", ElementType::Item.label())
                    .with("quantity", 1.0)
                    .with("percentage_discount", true)
                    .with("vat_percentage", 20.0),
                LigneMode::Create,
            ),
        };

        Self {
            api,
            document_id,
            steps,
            defaults,
            mode,
            taken_codes: Mutex::new(Vec::new()),
        }
    }

    pub fn document_id(&self) -> EntityId {
        self.document_id
    }

    fn is_own_code(&self, code: &str) -> bool {
        match &self.mode {
            LigneMode::Edit { original_code, .. } => original_code.trim().eq_ignore_ascii_case(code.trim()),
            LigneMode::Create => false,
        }
    }

    fn remember_codes(&self, codes: Vec<String>) {
        *self.taken_codes.lock().unwrap_or_else(PoisonError::into_inner) = codes;
    }

    fn taken_codes(&self) -> Vec<String> {
        self.taken_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Codes of the document's other lines.
    async fn other_codes(&self) -> Result<Vec<String>, ApiError> {
        let codes = self.api.list_line_codes(self.document_id).await?;
        Ok(codes
            .into_iter()
            .filter(|code| !self.is_own_code(code))
            .collect())
    }

    fn discount(&self, state: &FormState) -> Discount {
        if flag(state, "percentage_discount") {
            Discount::from_parts(decimal(state, "discount_percentage"), None)
        } else {
            Discount::from_parts(None, decimal(state, "discount_amount"))
        }
    }
}

#[async_trait]
impl WizardFlow for LigneFlow {
    type Request = Submission<LigneRequest>;
    type Response = Ligne;

    fn name(&self) -> &'static str {
        "Document line"
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

    fn derive(&self, target: &str, state: &FormState, options: &OptionLists) -> Option<FieldValue> {
        let element_id = state.get("element_id").as_choice()?;
        let element = options
            .get(ELEMENTS)?
            .iter()
            .find(|item| item.id == element_id)?;
        match target {
            "code" => {
                let base = element.code.as_deref().unwrap_or(&element.label);
                Some(FieldValue::text(suggest_code(base, &self.taken_codes())))
            }
            "description" => {
                let description = element
                    .description
                    .as_deref()
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or(&element.label);
                Some(FieldValue::text(description))
            }
            _ => None,
        }
    }

    fn validate_step(&self, step: StepId, state: &FormState) -> ValidationResult {
        let mut result = ValidationResult::new();
        match step {
            STEP_ELEMENT => {
                let needs_location = element_type(state)
                    .map(|kind| kind.requires_location())
                    .unwrap_or(false);
                if needs_location && state.get("location_id").is_blank() {
                    result.add("location_id", "Location is required for items");
                }
            }
            STEP_PRICING => {
                if flag(state, "percentage_discount") {
                    return result;
                }
                if let (Some(quantity), Some(price), Some(amount)) = (
                    decimal(state, "quantity"),
                    decimal(state, "unit_price"),
                    decimal(state, "discount_amount"),
                ) {
                    if amount > quantity * price {
                        result.add("discount_amount", "Discount cannot exceed the line amount");
                    }
                }
            }
            _ => {}
        }
        result
    }

    fn async_checks(&self, state: &FormState) -> Vec<CheckRequest> {
        let code = state.text("code");
        if !dashed_code_pattern().is_match(code) {
            return Vec::new();
        }
        vec![CheckRequest::new("code", STEP_ELEMENT, normalize_code(code))]
    }

    async fn run_check(
        &self,
        _request: &CheckRequest,
        state: &FormState,
    ) -> Result<CheckOutcome, ApiError> {
        let code = state.text("code");
        let taken = self
            .other_codes()
            .await?
            .iter()
            .any(|existing| existing.trim().eq_ignore_ascii_case(code));
        Ok(if taken {
            CheckOutcome::Invalid(format!("Line code '{}' already exists on this document", code))
        } else {
            CheckOutcome::Valid
        })
    }

    async fn load_options(&self, step: StepId, state: &FormState) -> Result<OptionLists, ApiError> {
        let mut lists = OptionLists::new();
        if step != STEP_ELEMENT {
            return Ok(lists);
        }
        let Some(kind) = element_type(state) else {
            return Ok(lists);
        };
        let elements = self.api.list_elements(kind).await?;
        lists.insert(
            ELEMENTS.to_string(),
            elements.iter().map(element_option).collect(),
        );
        // Always replaced, so a type without locations drops the earlier list.
        let locations: Vec<OptionItem> = if kind.requires_location() {
            self.api
                .list_locations()
                .await?
                .iter()
                .map(location_option)
                .collect()
        } else {
            Vec::new()
        };
        lists.insert(LOCATIONS.to_string(), locations);
        self.remember_codes(self.other_codes().await?);
        Ok(lists)
    }

    fn summary(&self, state: &FormState, options: &OptionLists) -> Vec<SummaryLine> {
        let mut lines = field_summary(&self.steps, state, options);
        if let (Some(quantity), Some(price)) = (decimal(state, "quantity"), decimal(state, "unit_price")) {
            let totals = LineTotals::compute(
                quantity,
                price,
                self.discount(state),
                decimal(state, "vat_percentage").unwrap_or(0.0),
            );
            lines.push(SummaryLine::new("Net amount", format!("{:.2}", totals.net)));
            lines.push(SummaryLine::new("VAT", format!("{:.2}", totals.vat)));
            lines.push(SummaryLine::new("Total", format!("{:.2}", totals.total)));
        }
        lines
    }

    fn project(&self, state: &FormState) -> Result<Self::Request, ValidationError> {
        let kind = element_type(state)
            .ok_or_else(|| ValidationError::for_field("element_type", "Choose a valid element type"))?;
        let location_id = if kind.requires_location() {
            Some(required_choice(state, "location_id", "Location")?)
        } else {
            None
        };
        let (discount_percentage, discount_amount) = match self.discount(state) {
            Discount::None => (None, None),
            Discount::Percentage(rate) => (Some(rate), None),
            Discount::Amount(value) => (None, Some(value)),
        };
        let body = LigneRequest {
            document_id: self.document_id,
            code: required_text(state, "code", "Line code")?,
            description: required_text(state, "description", "Description")?,
            element_type: kind,
            element_id: required_choice(state, "element_id", "Element")?,
            location_id,
            quantity: decimal(state, "quantity")
                .ok_or_else(|| ValidationError::for_field("quantity", "Quantity is required"))?,
            unit_price: decimal(state, "unit_price")
                .ok_or_else(|| ValidationError::for_field("unit_price", "Unit price is required"))?,
            discount_percentage,
            discount_amount,
            vat_percentage: decimal(state, "vat_percentage").unwrap_or(0.0),
        };
        Ok(match self.mode {
            LigneMode::Create => Submission::create(body),
            LigneMode::Edit { id, .. } => Submission::update(id, body),
        })
    }

    async fn submit(&self, request: Self::Request) -> Result<Self::Response, ApiError> {
        match request.target {
            Some(id) => self.api.update_line(id, request.body).await,
            None => self.api.create_line(request.body).await,
        }
    }

    fn success_message(&self) -> String {
        match self.mode {
            LigneMode::Create => "Line added".into(),
            LigneMode::Edit { .. } => "Line updated".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryBackend;

    #[test]
    fn suggestion_skips_taken_codes_case_insensitively() {
        let existing = vec!["paper".to_string(), "PAPER-2".to_string(), "TONER".to_string()];
        assert_eq!(suggest_code("PAPER", &existing), "PAPER-3");
        assert_eq!(suggest_code("LAPTOP", &existing), "LAPTOP");
        assert_eq!(suggest_code(" TONER ", &existing), "TONER-2");
    }

    #[test]
    fn derive_uses_element_and_existing_codes() {
        let flow = LigneFlow::new_create(Arc::new(MemoryBackend::seeded()), 9);
        let mut options = OptionLists::new();
        options.insert(
            ELEMENTS.into(),
            vec![OptionItem::new(30, "PAPER - A4 paper ream")
                .with_code("PAPER")
                .with_description("A4 paper ream")],
        );
        flow.remember_codes(vec!["PAPER".to_string()]);
        let state = FormState::new().with("element_id", FieldValue::Choice(30));

        assert_eq!(
            flow.derive("code", &state, &options),
            Some(FieldValue::text("PAPER-2"))
        );
        assert_eq!(
            flow.derive("description", &state, &options),
            Some(FieldValue::text("A4 paper ream"))
        );
        assert_eq!(flow.derive("quantity", &state, &options), None);
    }

    #[test]
    fn discount_toggle_selects_the_projected_field() {
        let flow = LigneFlow::new_create(Arc::new(MemoryBackend::seeded()), 9);
        let base = flow
            .defaults()
            .with("element_type", ElementType::GeneralAccount.label())
            .with("element_id", FieldValue::Choice(32))
            .with("code", "606100")
            .with("description", "Office supplies")
            .with("unit_price", 50.0)
            .with("discount_percentage", 10.0)
            .with("discount_amount", 5.0);

        let by_rate = flow.project(&base).unwrap().body;
        assert_eq!(by_rate.discount_percentage, Some(10.0));
        assert_eq!(by_rate.discount_amount, None);
        assert_eq!(by_rate.location_id, None);

        let by_amount = flow
            .project(&base.clone().with("percentage_discount", false))
            .unwrap()
            .body;
        assert_eq!(by_amount.discount_percentage, None);
        assert_eq!(by_amount.discount_amount, Some(5.0));
    }

    #[test]
    fn items_need_a_location() {
        let flow = LigneFlow::new_create(Arc::new(MemoryBackend::seeded()), 9);
        let state = flow.defaults().with("element_id", FieldValue::Choice(30));
        let result = flow.validate_step(STEP_ELEMENT, &state);
        assert_eq!(result.error("location_id"), Some("Location is required for items"));
    }

    #[test]
    fn edit_round_trip_keeps_amount_discount() {
        let ligne = Ligne {
            id: 77,
            document_id: 9,
            code: "TONER".into(),
            description: "Printer toner".into(),
            element_type: ElementType::Item,
            element_id: 31,
            location_id: Some(40),
            quantity: 3.0,
            unit_price: 12.5,
            discount_percentage: None,
            discount_amount: Some(2.0),
            vat_percentage: 20.0,
        };
        let flow = LigneFlow::new_edit(Arc::new(MemoryBackend::seeded()), &ligne);
        let request = flow.project(&flow.defaults()).unwrap();
        assert_eq!(request.target, Some(77));
        assert_eq!(request.body, LigneRequest::from_ligne(&ligne));
    }
}
