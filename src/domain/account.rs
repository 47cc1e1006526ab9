use std::fmt;

use serde::{Deserialize, Serialize};

use super::common::*;

/// Represents a general-ledger account used as reference data on documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneralAccount {
    pub id: EntityId,
    pub code: String,
    pub description: String,
    pub account_type: AccountType,
    #[serde(default)]
    pub lettrable: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Identifiable for GeneralAccount {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Displayable for GeneralAccount {
    fn display_label(&self) -> String {
        format!("{} - {}", self.code, self.description)
    }
}

/// Enumerates the supported account classifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Revenue,
        AccountType::Expense,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AccountType::Asset => "Asset",
            AccountType::Liability => "Liability",
            AccountType::Equity => "Equity",
            AccountType::Revenue => "Revenue",
            AccountType::Expense => "Expense",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneralAccountRequest {
    pub code: String,
    pub description: String,
    pub account_type: AccountType,
    pub lettrable: bool,
    pub is_active: bool,
}

impl GeneralAccountRequest {
    pub fn from_account(account: &GeneralAccount) -> Self {
        Self {
            code: account.code.clone(),
            description: account.description.clone(),
            account_type: account.account_type,
            lettrable: account.lettrable,
            is_active: account.is_active,
        }
    }
}
