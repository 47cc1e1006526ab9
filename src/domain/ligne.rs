use std::fmt;

use serde::{Deserialize, Serialize};

use super::common::*;

/// Category of the referenced element a document line is built from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ElementType {
    Item,
    GeneralAccount,
    FixedAsset,
}

impl ElementType {
    pub const ALL: [ElementType; 3] = [
        ElementType::Item,
        ElementType::GeneralAccount,
        ElementType::FixedAsset,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ElementType::Item => "Item",
            ElementType::GeneralAccount => "General account",
            ElementType::FixedAsset => "Fixed asset",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(label.trim()))
    }

    /// Only stock items are stored at a location.
    pub fn requires_location(&self) -> bool {
        matches!(self, ElementType::Item)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A candidate element (item, account, asset) a line can reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: EntityId,
    pub code: String,
    #[serde(default)]
    pub description: String,
}

impl Identifiable for Element {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Displayable for Element {
    fn display_label(&self) -> String {
        if self.description.is_empty() {
            self.code.clone()
        } else {
            format!("{} - {}", self.code, self.description)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: EntityId,
    pub code: String,
    pub name: String,
}

impl Identifiable for Location {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Displayable for Location {
    fn display_label(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }
}

/// One line of a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ligne {
    pub id: EntityId,
    pub document_id: EntityId,
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub element_type: ElementType,
    pub element_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<EntityId>,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<f64>,
    #[serde(default)]
    pub vat_percentage: f64,
}

impl Identifiable for Ligne {
    fn id(&self) -> EntityId {
        self.id
    }
}

/// Body of the create/update line calls. Exactly one of the two discount
/// fields is sent, depending on the discount mode chosen in the wizard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LigneRequest {
    pub document_id: EntityId,
    pub code: String,
    pub description: String,
    pub element_type: ElementType,
    pub element_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<EntityId>,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<f64>,
    pub vat_percentage: f64,
}

impl LigneRequest {
    pub fn from_ligne(ligne: &Ligne) -> Self {
        Self {
            document_id: ligne.document_id,
            code: ligne.code.clone(),
            description: ligne.description.clone(),
            element_type: ligne.element_type,
            element_id: ligne.element_id,
            location_id: ligne.location_id,
            quantity: ligne.quantity,
            unit_price: ligne.unit_price,
            discount_percentage: ligne.discount_percentage,
            discount_amount: ligne.discount_amount,
            vat_percentage: ligne.vat_percentage,
        }
    }

    pub fn totals(&self) -> LineTotals {
        LineTotals::compute(
            self.quantity,
            self.unit_price,
            Discount::from_parts(self.discount_percentage, self.discount_amount),
            self.vat_percentage,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Discount {
    None,
    Percentage(f64),
    Amount(f64),
}

impl Discount {
    pub fn from_parts(percentage: Option<f64>, amount: Option<f64>) -> Self {
        match (percentage, amount) {
            (Some(rate), _) => Discount::Percentage(rate),
            (None, Some(value)) => Discount::Amount(value),
            (None, None) => Discount::None,
        }
    }
}

/// Amounts shown on the review step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineTotals {
    pub gross: f64,
    pub discount: f64,
    pub net: f64,
    pub vat: f64,
    pub total: f64,
}

impl LineTotals {
    pub fn compute(quantity: f64, unit_price: f64, discount: Discount, vat_percentage: f64) -> Self {
        let gross = round_cents(quantity * unit_price);
        let discount = match discount {
            Discount::None => 0.0,
            Discount::Percentage(rate) => round_cents(gross * rate / 100.0),
            Discount::Amount(value) => round_cents(value.min(gross)),
        };
        let net = round_cents(gross - discount);
        let vat = round_cents(net * vat_percentage / 100.0);
        Self {
            gross,
            discount,
            net,
            vat,
            total: round_cents(net + vat),
        }
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_discount_applies_before_vat() {
        let totals = LineTotals::compute(4.0, 25.0, Discount::Percentage(10.0), 20.0);
        assert_eq!(totals.gross, 100.0);
        assert_eq!(totals.discount, 10.0);
        assert_eq!(totals.net, 90.0);
        assert_eq!(totals.vat, 18.0);
        assert_eq!(totals.total, 108.0);
    }

    #[test]
    fn fixed_discount_is_capped_at_gross() {
        let totals = LineTotals::compute(1.0, 30.0, Discount::Amount(50.0), 0.0);
        assert_eq!(totals.discount, 30.0);
        assert_eq!(totals.total, 0.0);
    }

    #[test]
    fn request_omits_unused_discount_field() {
        let request = LigneRequest {
            document_id: 9,
            code: "ITM-01".into(),
            description: "Paper".into(),
            element_type: ElementType::Item,
            element_id: 3,
            location_id: Some(1),
            quantity: 2.0,
            unit_price: 5.0,
            discount_percentage: None,
            discount_amount: Some(1.0),
            vat_percentage: 20.0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("discountPercentage").is_none());
        assert_eq!(json["discountAmount"], 1.0);
        assert_eq!(json["elementType"], "Item");
    }
}
