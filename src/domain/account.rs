use serde::{Deserialize, Serialize};

use crate::domain::Role;

/// Bank or payment destination attached to a transaction as the settlement
/// target. Fields are private: an account never changes once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: String,
    account_name: String,
    account_number: String,
    bank_name: String,
    holder: Role,
}

impl Account {
    pub fn new(account_name: &str, account_number: &str, bank_name: &str, holder: Role) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            account_name: account_name.to_string(),
            account_number: account_number.to_string(),
            bank_name: bank_name.to_string(),
            holder,
        }
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }

    pub fn bank_name(&self) -> &str {
        &self.bank_name
    }

    pub fn holder(&self) -> Role {
        self.holder
    }

    /// Number and bank are the parts settlement rails need.
    pub fn is_complete(&self) -> bool {
        !self.account_number.trim().is_empty() && !self.bank_name.trim().is_empty()
    }
}
