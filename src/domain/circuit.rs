use serde::{Deserialize, Serialize};

use super::common::*;

/// A workflow definition documents travel through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Circuit {
    pub id: EntityId,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub descriptif: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type_id: Option<EntityId>,
    pub is_active: bool,
    pub has_ordered_flow: bool,
    #[serde(default)]
    pub allow_backward_step: bool,
    #[serde(default)]
    pub allow_skip_step: bool,
}

impl Identifiable for Circuit {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl NamedEntity for Circuit {
    fn name(&self) -> &str {
        &self.title
    }
}

/// Body of the create/update circuit calls.
///
/// The backward/skip flags only exist for ordered circuits and are omitted
/// from the payload otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CircuitRequest {
    pub code: String,
    pub title: String,
    pub descriptif: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type_id: Option<EntityId>,
    pub is_active: bool,
    pub has_ordered_flow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_backward_step: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_skip_step: Option<bool>,
}

impl CircuitRequest {
    pub fn from_circuit(circuit: &Circuit) -> Self {
        let ordered = circuit.has_ordered_flow;
        Self {
            code: circuit.code.clone(),
            title: circuit.title.clone(),
            descriptif: circuit.descriptif.clone(),
            document_type_id: circuit.document_type_id,
            is_active: circuit.is_active,
            has_ordered_flow: ordered,
            allow_backward_step: ordered.then_some(circuit.allow_backward_step),
            allow_skip_step: ordered.then_some(circuit.allow_skip_step),
        }
    }
}
