//! Form state store shared by every step of a wizard.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One selectable entry of an option list fetched from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionItem {
    pub id: i64,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OptionItem {
    pub fn new(id: i64, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            code: None,
            description: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Option lists keyed by name (e.g. `eligible_users`).
pub type OptionLists = BTreeMap<String, Vec<OptionItem>>;

/// Value held by a single form field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Empty,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Flag(bool),
    Date(NaiveDate),
    /// Identifier of an entry picked from a fetched option list.
    Choice(i64),
    /// Multiple entries, kept in the order they were selected.
    Selection(Vec<OptionItem>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(value) => value.trim().is_empty(),
            FieldValue::Selection(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            FieldValue::Decimal(value) => Some(*value),
            FieldValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<i64> {
        match self {
            FieldValue::Choice(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_selection(&self) -> &[OptionItem] {
        match self {
            FieldValue::Selection(items) => items.as_slice(),
            _ => &[],
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Empty => Ok(()),
            FieldValue::Text(value) => write!(f, "{}", value.trim()),
            FieldValue::Integer(value) => write!(f, "{}", value),
            FieldValue::Decimal(value) => write!(f, "{}", value),
            FieldValue::Flag(value) => write!(f, "{}", if *value { "Yes" } else { "No" }),
            FieldValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            FieldValue::Choice(id) => write!(f, "#{}", id),
            FieldValue::Selection(items) => {
                let labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
                write!(f, "{}", labels.join(", "))
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<Vec<OptionItem>> for FieldValue {
    fn from(items: Vec<OptionItem>) -> Self {
        FieldValue::Selection(items)
    }
}

static EMPTY: FieldValue = FieldValue::Empty;

/// Accumulated values of an open wizard.
///
/// Fields written through [`FormState::set`] count as user overrides; derived
/// fields written through [`FormState::set_derived`] stay eligible for
/// recomputation until the user edits them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    values: BTreeMap<String, FieldValue>,
    overridden: BTreeSet<String>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used when preparing defaults; does not mark the field as overridden.
    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> &FieldValue {
        self.values.get(key).unwrap_or(&EMPTY)
    }

    /// Trimmed text of a field, empty when unset or not textual.
    pub fn text(&self, key: &str) -> &str {
        self.get(key).as_text().map(str::trim).unwrap_or("")
    }

    pub fn set(&mut self, key: &str, value: FieldValue) {
        self.values.insert(key.to_string(), value);
        self.overridden.insert(key.to_string());
    }

    pub fn set_derived(&mut self, key: &str, value: FieldValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn clear(&mut self, key: &str) {
        self.values.remove(key);
        self.overridden.remove(key);
    }

    pub fn is_overridden(&self, key: &str) -> bool {
        self.overridden.contains(key)
    }

    pub fn reset(&mut self, defaults: FormState) {
        self.values = defaults.values;
        self.overridden.clear();
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_read_as_empty() {
        let state = FormState::new();
        assert!(state.get("name").is_blank());
        assert_eq!(state.text("name"), "");
    }

    #[test]
    fn set_marks_override_but_derived_does_not() {
        let mut state = FormState::new();
        state.set_derived("code", FieldValue::text("ITM-01"));
        assert!(!state.is_overridden("code"));
        state.set("code", FieldValue::text("CUSTOM"));
        assert!(state.is_overridden("code"));
        state.clear("code");
        assert!(!state.is_overridden("code"));
        assert!(state.get("code").is_blank());
    }

    #[test]
    fn reset_restores_defaults_and_clears_overrides() {
        let defaults = FormState::new().with("name", "Initial");
        let mut state = defaults.clone();
        state.set("name", FieldValue::text("Changed"));
        state.reset(defaults);
        assert_eq!(state.text("name"), "Initial");
        assert!(!state.is_overridden("name"));
    }

    #[test]
    fn selection_display_keeps_selection_order() {
        let value = FieldValue::Selection(vec![
            OptionItem::new(7, "Zoe"),
            OptionItem::new(2, "Adam"),
        ]);
        assert_eq!(value.to_string(), "Zoe, Adam");
    }
}
