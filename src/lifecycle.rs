//! Intent validation and the status state machine.

use chrono::{DateTime, Utc};

use crate::domain::{
    Account, Currency, Error, ExchangeRail, KindName, Money, OwnerId, PurseDirection,
    Transaction, TransactionKind, TransactionStatus, currency_code,
};

#[derive(Debug, Clone, Default)]
pub struct TransferIntent {
    pub base_amount: Money,
    pub base_currency: Currency,
    pub amount_sent: Money,
    pub conv_currency: Currency,
    pub payment_channel: String,
    pub recipient_account: Option<Account>,
}

#[derive(Debug, Clone, Default)]
pub struct WithdrawalIntent {
    pub base_amount: Money,
    pub base_currency: Currency,
    pub destination: Option<Account>,
}

#[derive(Debug, Clone, Default)]
pub struct DepositIntent {
    pub base_amount: Money,
    pub base_currency: Currency,
    pub payment_channel: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeIntent {
    pub base_amount: Money,
    pub base_currency: Currency,
    pub exchange_amount: Money,
    pub exchange_currency: Currency,
    pub is_crypto_exchange: bool,
    pub payment_channel: String,
    pub agent_account: Option<Account>,
    pub blockchain_channel: String,
    pub wallet_address: String,
}

#[derive(Debug, Clone, Default)]
pub struct PurseIntent {
    pub recipient: OwnerId,
    pub amount: Money,
    pub currency: Currency,
    pub direction: Option<PurseDirection>,
}

/// What a caller asks for when creating a transaction. Zero amounts and
/// empty strings count as missing.
#[derive(Debug, Clone)]
pub enum Intent {
    Transfer(TransferIntent),
    Withdrawal(WithdrawalIntent),
    Deposit(DepositIntent),
    Exchange(ExchangeIntent),
    Purse(PurseIntent),
}

fn present(value: &str) -> bool {
    !value.trim().is_empty()
}

fn require(ok: bool, message: &str) -> Result<(), Error> {
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(message.to_string()))
    }
}

impl Intent {
    fn normalized(mut self) -> Self {
        match &mut self {
            Intent::Transfer(t) => {
                t.base_currency = currency_code(&t.base_currency);
                t.conv_currency = currency_code(&t.conv_currency);
            }
            Intent::Withdrawal(w) => w.base_currency = currency_code(&w.base_currency),
            Intent::Deposit(d) => d.base_currency = currency_code(&d.base_currency),
            Intent::Exchange(x) => {
                x.base_currency = currency_code(&x.base_currency);
                x.exchange_currency = currency_code(&x.exchange_currency);
            }
            Intent::Purse(p) => p.currency = currency_code(&p.currency),
        }
        self
    }

    pub fn kind_name(&self) -> KindName {
        match self {
            Intent::Transfer(_) => KindName::Transfer,
            Intent::Withdrawal(_) => KindName::Withdrawal,
            Intent::Deposit(_) => KindName::Deposit,
            Intent::Exchange(_) => KindName::Exchange,
            Intent::Purse(_) => KindName::Purse,
        }
    }

    /// Checks the kind specific required fields and builds the stored kind.
    /// Currency codes are stored in canonical form.
    pub fn validate(self, owner: &str) -> Result<TransactionKind, Error> {
        match self.normalized() {
            Intent::Transfer(t) => {
                require(
                    present(&t.base_currency) && present(&t.conv_currency),
                    "base and conversion currency are required",
                )?;
                require(
                    t.base_amount.is_positive() && t.amount_sent.is_positive(),
                    "base and converted amount are required",
                )?;
                require(present(&t.payment_channel), "payment channel is required")?;
                Ok(TransactionKind::Transfer {
                    base_amount: t.base_amount,
                    base_currency: t.base_currency,
                    amount_sent: t.amount_sent,
                    conv_currency: t.conv_currency,
                    payment_channel: t.payment_channel,
                    recipient_account: t.recipient_account,
                })
            }
            Intent::Withdrawal(w) => {
                require(present(&w.base_currency), "withdrawal currency is required")?;
                require(w.base_amount.is_positive(), "withdrawal amount is required")?;
                let destination = w
                    .destination
                    .filter(Account::is_complete)
                    .ok_or_else(|| Error::Validation("destination account is required".into()))?;
                Ok(TransactionKind::Withdrawal {
                    base_amount: w.base_amount,
                    base_currency: w.base_currency,
                    destination,
                })
            }
            Intent::Deposit(d) => {
                require(present(&d.base_currency), "deposit currency is required")?;
                require(d.base_amount.is_positive(), "deposit amount is required")?;
                require(present(&d.payment_channel), "payment channel is required")?;
                Ok(TransactionKind::Deposit {
                    base_amount: d.base_amount,
                    base_currency: d.base_currency,
                    payment_channel: d.payment_channel,
                })
            }
            Intent::Exchange(x) => {
                require(
                    x.base_amount.is_positive() && present(&x.base_currency),
                    "base amount and currency are required",
                )?;
                require(
                    x.exchange_amount.is_positive() && present(&x.exchange_currency),
                    "exchange amount and currency are required",
                )?;
                require(
                    x.base_currency != x.exchange_currency,
                    "exchange must be between two currencies",
                )?;
                let rail = if x.is_crypto_exchange {
                    require(
                        present(&x.blockchain_channel) && present(&x.wallet_address),
                        "blockchain channel and wallet address are required",
                    )?;
                    ExchangeRail::Crypto {
                        blockchain_channel: x.blockchain_channel,
                        wallet_address: x.wallet_address,
                    }
                } else {
                    match x.agent_account {
                        Some(agent_account) if present(&x.payment_channel) => {
                            ExchangeRail::Counterparty {
                                payment_channel: x.payment_channel,
                                agent_account,
                            }
                        }
                        _ => {
                            return Err(Error::Validation(
                                "agent account and payment channel are required".into(),
                            ));
                        }
                    }
                };
                Ok(TransactionKind::Exchange {
                    base_amount: x.base_amount,
                    base_currency: x.base_currency,
                    exchange_amount: x.exchange_amount,
                    exchange_currency: x.exchange_currency,
                    rail,
                })
            }
            Intent::Purse(p) => {
                require(present(&p.recipient), "sender and receiver are required")?;
                require(p.recipient != owner, "sender and receiver must differ")?;
                require(
                    p.amount.is_positive() && present(&p.currency),
                    "transaction amount and currency are required",
                )?;
                let direction = p.direction.ok_or_else(|| {
                    Error::Validation("transaction type must be specified".into())
                })?;
                Ok(TransactionKind::Purse {
                    recipient: p.recipient,
                    amount: p.amount,
                    currency: p.currency,
                    direction,
                })
            }
        }
    }
}

pub fn ensure_kind(tx: &Transaction, expected: KindName) -> Result<(), Error> {
    let actual = tx.kind_name();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::KindMismatch {
            id: tx.id,
            expected,
            actual,
        })
    }
}

/// Guards `respond_to_transaction`.
///
/// ```text
/// created  -> completed | cancelled | disputed
/// matched  -> completed | cancelled | disputed
/// disputed -> completed | cancelled
/// ```
///
/// `matched` is only entered through the matcher. Repeating the current
/// status is accepted and only refreshes `updated_at`.
pub fn check_transition(tx: &Transaction, to: TransactionStatus) -> Result<(), Error> {
    use TransactionStatus::*;

    if tx.status.is_terminal() {
        return Err(Error::ImmutableRecord(tx.id));
    }

    let allowed = match (tx.status, to) {
        (from, to) if from == to => true,
        (Created | Matched | Disputed, Completed) => true,
        (Created | Matched, Cancelled | Disputed) => true,
        (Disputed, Cancelled) => true,
        _ => false,
    };
    if !allowed {
        return Err(Error::InvalidTransition {
            id: tx.id,
            from: tx.status,
            to,
        });
    }

    if to == Completed && tx.kind.is_matchable() && tx.counterparty.is_none() {
        return Err(Error::Validation(format!(
            "transaction {} needs a counterparty before it can complete",
            tx.id
        )));
    }
    Ok(())
}

/// Guards the matcher: only unmatched, matchable transactions.
pub fn check_matchable(tx: &Transaction) -> Result<(), Error> {
    if tx.status.is_terminal() {
        return Err(Error::ImmutableRecord(tx.id));
    }
    if tx.status != TransactionStatus::Created {
        return Err(Error::InvalidTransition {
            id: tx.id,
            from: tx.status,
            to: TransactionStatus::Matched,
        });
    }
    if !tx.kind.is_matchable() {
        return Err(Error::Validation(format!(
            "{} transactions are not matched to a counterparty",
            tx.kind_name()
        )));
    }
    Ok(())
}

/// Caller editable fields. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub user_receipt: Option<String>,
    pub agent_receipt: Option<String>,
    pub reason_for_cancelling: Option<String>,
    pub reason_for_dispute: Option<String>,
    pub payment_channel: Option<String>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self.user_receipt.is_none()
            && self.agent_receipt.is_none()
            && self.reason_for_cancelling.is_none()
            && self.reason_for_dispute.is_none()
            && self.payment_channel.is_none()
    }
}

/// Merges `patch` into `tx`. A completed transaction is rejected before
/// any field is touched.
pub fn apply_patch(
    tx: &mut Transaction,
    patch: TransactionPatch,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    if tx.status.is_terminal() {
        return Err(Error::ImmutableRecord(tx.id));
    }

    if let Some(channel) = patch.payment_channel {
        let (kind, id) = (tx.kind_name(), tx.id);
        match &mut tx.kind {
            TransactionKind::Transfer {
                payment_channel, ..
            }
            | TransactionKind::Deposit {
                payment_channel, ..
            }
            | TransactionKind::Exchange {
                rail: ExchangeRail::Counterparty {
                    payment_channel, ..
                },
                ..
            } => *payment_channel = channel,
            _ => {
                return Err(Error::Validation(format!(
                    "{kind} transaction {id} has no payment channel"
                )));
            }
        }
    }

    let remarks = &mut tx.remarks;
    if patch.user_receipt.is_some() {
        remarks.user_receipt = patch.user_receipt;
    }
    if patch.agent_receipt.is_some() {
        remarks.agent_receipt = patch.agent_receipt;
    }
    if patch.reason_for_cancelling.is_some() {
        remarks.reason_for_cancelling = patch.reason_for_cancelling;
    }
    if patch.reason_for_dispute.is_some() {
        remarks.reason_for_dispute = patch.reason_for_dispute;
    }
    tx.updated_at = Some(now);
    Ok(())
}
