//! Per-currency balances and the primitive mutations every settlement is
//! built from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{LedgerError, Money};

/// ISO-like currency code, e.g. `USD`, `NGN`.
pub type Currency = String;

/// Canonical form of a currency code: trimmed and upper case. Wallets are
/// keyed by this form.
pub fn currency_code(raw: &str) -> Currency {
    raw.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub currency: Currency,
    pub available_balance: Money, // usable immediately
    pub pending_balance: Money,   // reserved against an in-flight transaction
    pub total_volume: Money,      // lifetime settled turnover, never decreases
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            currency: currency.to_string(),
            available_balance: Money::ZERO,
            pending_balance: Money::ZERO,
            total_volume: Money::ZERO,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.is_active {
            Ok(())
        } else {
            Err(LedgerError::WalletInactive(self.currency.clone()))
        }
    }
}

/// An owner's wallets keyed by currency; at most one wallet per currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wallets(BTreeMap<Currency, Wallet>);

impl Wallets {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, currency: &str) -> Option<&Wallet> {
        self.0.get(currency)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wallet> + '_ {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_wallet(&self, currency: &str) -> bool {
        self.0.contains_key(currency)
    }

    /// A missing wallet counts as insufficient, never as an error.
    pub fn sufficient_funds(&self, amount: Money, currency: &str) -> bool {
        self.get(currency)
            .is_some_and(|w| w.available_balance >= amount)
    }

    pub fn available(&self, currency: &str) -> Money {
        self.get(currency)
            .map(|w| w.available_balance)
            .unwrap_or(Money::ZERO)
    }

    /// Opens an empty wallet for `currency` unless one exists.
    /// Returns whether a wallet was created.
    pub fn provision(&mut self, currency: &str, now: DateTime<Utc>) -> bool {
        if self.has_wallet(currency) {
            return false;
        }
        self.0
            .insert(currency.to_string(), Wallet::new(currency, now));
        true
    }

    /// Adds `delta` to the available balance. A debit that would leave the
    /// balance negative is refused.
    pub fn adjust_available(
        &mut self,
        currency: &str,
        delta: Money,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let wallet = self.wallet_mut(currency)?;
        wallet.ensure_active()?;

        let next = wallet
            .available_balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::Overflow(currency.to_string()))?;
        if next < Money::ZERO {
            return Err(LedgerError::InsufficientFunds {
                currency: currency.to_string(),
                available: wallet.available_balance,
                requested: -delta,
            });
        }

        wallet.available_balance = next;
        wallet.updated_at = now;
        Ok(())
    }

    /// Moves `amount` from available to pending.
    pub fn reserve(
        &mut self,
        currency: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        ensure_positive(amount)?;
        let wallet = self.wallet_mut(currency)?;
        wallet.ensure_active()?;

        if wallet.available_balance < amount {
            return Err(LedgerError::InsufficientFunds {
                currency: currency.to_string(),
                available: wallet.available_balance,
                requested: amount,
            });
        }

        let available = checked(wallet.available_balance.checked_sub(amount), currency)?;
        let pending = checked(wallet.pending_balance.checked_add(amount), currency)?;
        wallet.available_balance = available;
        wallet.pending_balance = pending;
        wallet.updated_at = now;
        Ok(())
    }

    /// Removes `amount` from pending, either back to available (cancellation)
    /// or out of the wallet entirely (the value was settled elsewhere).
    pub fn release(
        &mut self,
        currency: &str,
        amount: Money,
        to_available: bool,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        ensure_positive(amount)?;
        let wallet = self.wallet_mut(currency)?;

        if wallet.pending_balance < amount {
            return Err(LedgerError::PendingShortfall {
                currency: currency.to_string(),
                pending: wallet.pending_balance,
                requested: amount,
            });
        }

        let pending = checked(wallet.pending_balance.checked_sub(amount), currency)?;
        if to_available {
            wallet.available_balance =
                checked(wallet.available_balance.checked_add(amount), currency)?;
        }
        wallet.pending_balance = pending;
        wallet.updated_at = now;
        Ok(())
    }

    pub fn record_volume(
        &mut self,
        currency: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        ensure_positive(amount)?;
        let wallet = self.wallet_mut(currency)?;
        wallet.total_volume = checked(wallet.total_volume.checked_add(amount), currency)?;
        wallet.updated_at = now;
        Ok(())
    }

    pub fn set_active(
        &mut self,
        currency: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let wallet = self.wallet_mut(currency)?;
        wallet.is_active = active;
        wallet.updated_at = now;
        Ok(())
    }

    fn wallet_mut(&mut self, currency: &str) -> Result<&mut Wallet, LedgerError> {
        self.0
            .get_mut(currency)
            .ok_or_else(|| LedgerError::WalletNotFound(currency.to_string()))
    }
}

impl FromIterator<Wallet> for Wallets {
    fn from_iter<I: IntoIterator<Item = Wallet>>(iter: I) -> Self {
        Self(iter.into_iter().map(|w| (w.currency.clone(), w)).collect())
    }
}

fn checked(result: Option<Money>, currency: &str) -> Result<Money, LedgerError> {
    result.ok_or_else(|| LedgerError::Overflow(currency.to_string()))
}

fn ensure_positive(amount: Money) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::NonPositiveAmount(amount))
    }
}
