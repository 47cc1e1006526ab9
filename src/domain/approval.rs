use std::fmt;

use serde::{Deserialize, Serialize};

use super::common::*;

/// Smallest number of approvers an approval group may contain.
pub const MIN_APPROVERS: usize = 2;

/// A platform user that can be picked as an approver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: EntityId,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl User {
    pub fn new(id: EntityId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            first_name: String::new(),
            last_name: String::new(),
            email: None,
            role: None,
        }
    }

    pub fn with_names(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

impl Identifiable for User {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Displayable for User {
    fn display_label(&self) -> String {
        self.full_name()
    }
}

/// How the members of a group must approve a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RuleType {
    /// Any single member may approve.
    Any,
    /// Every member must approve, in any order.
    All,
    /// Every member must approve, in selection order.
    Sequential,
}

impl RuleType {
    pub const ALL: [RuleType; 3] = [RuleType::Any, RuleType::All, RuleType::Sequential];

    pub fn label(&self) -> &'static str {
        match self {
            RuleType::Any => "Any",
            RuleType::All => "All",
            RuleType::Sequential => "Sequential",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|rule| rule.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalGroup {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub rule_type: RuleType,
    #[serde(default)]
    pub users: Vec<User>,
}

impl Identifiable for ApprovalGroup {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl NamedEntity for ApprovalGroup {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Body of the create/update approval group calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalGroupRequest {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub rule_type: RuleType,
    /// Member ids in selection order.
    pub user_ids: Vec<EntityId>,
}

impl ApprovalGroupRequest {
    pub fn from_group(group: &ApprovalGroup) -> Self {
        Self {
            name: group.name.clone(),
            description: group.description.clone(),
            comment: group.comment.clone(),
            rule_type: group.rule_type,
            user_ids: group.users.iter().map(|user| user.id).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_camel_case_rule_and_ids() {
        let request = ApprovalGroupRequest {
            name: "Finance Approvals".into(),
            description: "Invoices above threshold".into(),
            comment: None,
            rule_type: RuleType::Sequential,
            user_ids: vec![4, 2],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["ruleType"], "Sequential");
        assert_eq!(json["userIds"], serde_json::json!([4, 2]));
        assert!(json.get("comment").is_none());
    }

    #[test]
    fn full_name_falls_back_to_username() {
        assert_eq!(User::new(1, "jdoe").full_name(), "jdoe");
        assert_eq!(
            User::new(1, "jdoe").with_names("Jane", "Doe").full_name(),
            "Jane Doe"
        );
    }

    #[test]
    fn rule_type_parses_labels_case_insensitively() {
        assert_eq!(RuleType::from_label("sequential"), Some(RuleType::Sequential));
        assert_eq!(RuleType::from_label("nope"), None);
    }
}
