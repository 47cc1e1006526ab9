use serde::{Deserialize, Serialize};

use super::common::*;

/// Kind of document (invoice, purchase order, ...) that circuits and series attach to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentType {
    pub id: EntityId,
    pub type_key: String,
    pub type_name: String,
}

impl DocumentType {
    pub fn new(id: EntityId, type_key: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_key: type_key.into(),
            type_name: type_name.into(),
        }
    }
}

impl Identifiable for DocumentType {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl NamedEntity for DocumentType {
    fn name(&self) -> &str {
        &self.type_name
    }
}

impl Displayable for DocumentType {
    fn display_label(&self) -> String {
        format!("{} - {}", self.type_key, self.type_name)
    }
}
