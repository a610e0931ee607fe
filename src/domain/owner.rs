use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Error, Money, Wallets, currency_code};

/// Opaque owner id issued by the identity provider.
pub type OwnerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum OwnerKind {
    User,
    Agent { approved: bool },
}

/// A user or agent together with its wallets.
///
/// The ledger primitives on `Owner` mirror those on [`Wallets`] but report
/// failures attributed to this owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub display_name: String,
    pub kind: OwnerKind,
    pub device_token: Option<String>,
    pub wallets: Wallets,
    /// Store revision used for conditional writes.
    #[serde(default)]
    pub version: u64,
}

impl Owner {
    pub fn user(id: &str, display_name: &str) -> Self {
        Self::with_kind(id, display_name, OwnerKind::User)
    }

    pub fn agent(id: &str, display_name: &str, approved: bool) -> Self {
        Self::with_kind(id, display_name, OwnerKind::Agent { approved })
    }

    fn with_kind(id: &str, display_name: &str, kind: OwnerKind) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            kind,
            device_token: None,
            wallets: Wallets::new(),
            version: 0,
        }
    }

    pub fn with_device_token(mut self, token: &str) -> Self {
        self.device_token = Some(token.to_string());
        self
    }

    /// Opens (if needed) and credits a wallet. Meant for seeding fixtures and
    /// onboarding, not for settlement.
    pub fn with_balance(mut self, currency: &str, available: Money) -> Self {
        let now = Utc::now();
        let currency = currency_code(currency);
        self.wallets.provision(&currency, now);
        if available.is_positive() {
            if let Err(e) = self.wallets.adjust_available(&currency, available, now) {
                tracing::warn!(owner = %self.id, error = %e, "seed balance ignored");
            }
        }
        self
    }

    pub fn role(&self) -> Role {
        match self.kind {
            OwnerKind::User => Role::User,
            OwnerKind::Agent { .. } => Role::Agent,
        }
    }

    /// Users are always eligible; agents only once approved.
    pub fn is_eligible_counterparty(&self) -> bool {
        match self.kind {
            OwnerKind::User => true,
            OwnerKind::Agent { approved } => approved,
        }
    }

    pub fn sufficient_funds(&self, amount: Money, currency: &str) -> bool {
        self.wallets.sufficient_funds(amount, currency)
    }

    pub fn has_wallet(&self, currency: &str) -> bool {
        self.wallets.has_wallet(currency)
    }

    pub fn provision_wallet(&mut self, currency: &str, now: DateTime<Utc>) -> bool {
        self.wallets.provision(currency, now)
    }

    pub fn adjust_available(
        &mut self,
        currency: &str,
        delta: Money,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.wallets
            .adjust_available(currency, delta, now)
            .map_err(|e| e.attributed_to(&self.id))
    }

    pub fn reserve(
        &mut self,
        currency: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.wallets
            .reserve(currency, amount, now)
            .map_err(|e| e.attributed_to(&self.id))
    }

    pub fn release(
        &mut self,
        currency: &str,
        amount: Money,
        to_available: bool,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.wallets
            .release(currency, amount, to_available, now)
            .map_err(|e| e.attributed_to(&self.id))
    }

    pub fn record_volume(
        &mut self,
        currency: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.wallets
            .record_volume(currency, amount, now)
            .map_err(|e| e.attributed_to(&self.id))
    }

    pub fn set_wallet_active(
        &mut self,
        currency: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.wallets
            .set_active(currency, active, now)
            .map_err(|e| e.attributed_to(&self.id))
    }

    /// Fails with `WalletInactive` for a deactivated wallet, otherwise with
    /// `InsufficientFunds` carrying the current balance.
    pub fn ensure_funds(&self, amount: Money, currency: &str) -> Result<(), Error> {
        if self.wallets.get(currency).is_some_and(|w| !w.is_active) {
            return Err(Error::WalletInactive {
                owner: self.id.clone(),
                currency: currency.to_string(),
            });
        }
        if self.sufficient_funds(amount, currency) {
            return Ok(());
        }
        Err(Error::InsufficientFunds {
            owner: self.id.clone(),
            currency: currency.to_string(),
            available: self.wallets.available(currency),
            requested: amount,
        })
    }
}
