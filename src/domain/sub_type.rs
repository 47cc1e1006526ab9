use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::common::*;

/// A dated numbering series of a document type (e.g. invoices of 2024).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubType {
    pub id: EntityId,
    pub document_type_id: EntityId,
    pub prefix: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub is_active: bool,
}

impl SubType {
    /// Inclusive overlap test against another period.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && start <= self.end_date
    }

    pub fn period_label(&self) -> String {
        format!(
            "{} to {}",
            self.start_date.format("%Y-%m-%d"),
            self.end_date.format("%Y-%m-%d")
        )
    }
}

impl Identifiable for SubType {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl NamedEntity for SubType {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Answer of the period-overlap probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverlapCheck {
    pub overlapping: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlapping_with: Option<SubType>,
}

impl OverlapCheck {
    pub fn clear() -> Self {
        Self {
            overlapping: false,
            overlapping_with: None,
        }
    }

    pub fn conflict(with: SubType) -> Self {
        Self {
            overlapping: true,
            overlapping_with: Some(with),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubTypeRequest {
    pub document_type_id: EntityId,
    pub prefix: String,
    pub name: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
}

impl SubTypeRequest {
    pub fn from_sub_type(sub_type: &SubType) -> Self {
        Self {
            document_type_id: sub_type.document_type_id,
            prefix: sub_type.prefix.clone(),
            name: sub_type.name.clone(),
            description: sub_type.description.clone(),
            start_date: sub_type.start_date,
            end_date: sub_type.end_date,
            is_active: sub_type.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn overlap_is_inclusive_on_boundaries() {
        let series = SubType {
            id: 1,
            document_type_id: 1,
            prefix: "FAC".into(),
            name: "Invoices H2".into(),
            description: String::new(),
            start_date: date(2024, 3, 1),
            end_date: date(2024, 9, 1),
            is_active: true,
        };
        assert!(series.overlaps(date(2024, 1, 1), date(2024, 6, 1)));
        assert!(series.overlaps(date(2024, 9, 1), date(2024, 12, 31)));
        assert!(!series.overlaps(date(2024, 9, 2), date(2024, 12, 31)));
        assert!(!series.overlaps(date(2023, 1, 1), date(2024, 2, 29)));
    }
}
