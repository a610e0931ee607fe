use core::{fmt, str::FromStr};
use std::sync::{LazyLock, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Account, Currency, Money, OwnerId};

// Process-wide so ids from every engine and repository in the process sort
// in creation order. It carries no business state.
static GENERATOR: LazyLock<Mutex<ulid::Generator>> =
    LazyLock::new(|| Mutex::new(ulid::Generator::new()));

/// Time-sortable, collision-resistant transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(ulid::Ulid);

impl TransactionId {
    /// Ids from one process increase strictly, even within a millisecond.
    pub fn new() -> Self {
        let next = GENERATOR
            .lock()
            .ok()
            .and_then(|mut generator| generator.generate().ok());
        Self(next.unwrap_or_else(ulid::Ulid::new))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Exchanges call this state `initiated`.
    #[serde(alias = "initiated")]
    Created,
    Matched,
    Completed,
    Cancelled,
    Disputed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Created => "created",
            TransactionStatus::Matched => "matched",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Disputed => "disputed",
        }
    }

    /// No field of a transaction in a terminal state may change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "initiated" => Ok(TransactionStatus::Created),
            "matched" => Ok(TransactionStatus::Matched),
            "completed" | "complete" => Ok(TransactionStatus::Completed),
            "cancelled" | "cancel" => Ok(TransactionStatus::Cancelled),
            "disputed" | "dispute" => Ok(TransactionStatus::Disputed),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// Discriminant of [`TransactionKind`], used where callers name a kind
/// without carrying its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindName {
    Transfer,
    Withdrawal,
    Deposit,
    Exchange,
    Purse,
}

impl KindName {
    pub fn as_str(&self) -> &'static str {
        match self {
            KindName::Transfer => "transfer",
            KindName::Withdrawal => "withdrawal",
            KindName::Deposit => "deposit",
            KindName::Exchange => "exchange",
            KindName::Purse => "one-purse-transfer",
        }
    }
}

impl fmt::Display for KindName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurseDirection {
    /// Settles immediately from the initiator to the recipient.
    Pay,
    /// Asks the recipient to pay the initiator; settles on completion.
    Request,
}

/// How an exchange is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rail", rename_all = "snake_case")]
pub enum ExchangeRail {
    /// Fulfilled by a matched agent or peer user.
    Counterparty {
        payment_channel: String,
        agent_account: Account,
    },
    /// Paid out on a blockchain to an external address.
    Crypto {
        blockchain_channel: String,
        wallet_address: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionKind {
    /// User sends funds out to an external recipient through an agent.
    Transfer {
        base_amount: Money,
        base_currency: Currency,
        amount_sent: Money,
        conv_currency: Currency,
        payment_channel: String,
        recipient_account: Option<Account>,
    },
    /// User moves funds to a bank account.
    Withdrawal {
        base_amount: Money,
        base_currency: Currency,
        destination: Account,
    },
    /// External funds credited to the user through an agent.
    Deposit {
        base_amount: Money,
        base_currency: Currency,
        payment_channel: String,
    },
    Exchange {
        base_amount: Money,
        base_currency: Currency,
        exchange_amount: Money,
        exchange_currency: Currency,
        rail: ExchangeRail,
    },
    /// User to user pay or request.
    Purse {
        recipient: OwnerId,
        amount: Money,
        currency: Currency,
        direction: PurseDirection,
    },
}

/// A currency and amount moving as one side of a settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub currency: Currency,
    pub amount: Money,
}

impl Leg {
    pub fn new(currency: &str, amount: Money) -> Self {
        Self {
            currency: currency.to_string(),
            amount,
        }
    }
}

impl TransactionKind {
    pub fn name(&self) -> KindName {
        match self {
            TransactionKind::Transfer { .. } => KindName::Transfer,
            TransactionKind::Withdrawal { .. } => KindName::Withdrawal,
            TransactionKind::Deposit { .. } => KindName::Deposit,
            TransactionKind::Exchange { .. } => KindName::Exchange,
            TransactionKind::Purse { .. } => KindName::Purse,
        }
    }

    /// The amount and currency the transaction is denominated in.
    pub fn base(&self) -> Leg {
        match self {
            TransactionKind::Transfer {
                base_amount,
                base_currency,
                ..
            }
            | TransactionKind::Withdrawal {
                base_amount,
                base_currency,
                ..
            }
            | TransactionKind::Deposit {
                base_amount,
                base_currency,
                ..
            }
            | TransactionKind::Exchange {
                base_amount,
                base_currency,
                ..
            } => Leg::new(base_currency, *base_amount),
            TransactionKind::Purse {
                amount, currency, ..
            } => Leg::new(currency, *amount),
        }
    }

    /// What the initiator must hold when submitting the transaction.
    pub fn debit_leg(&self) -> Option<Leg> {
        match self {
            TransactionKind::Deposit { .. } => None,
            TransactionKind::Purse {
                direction: PurseDirection::Request,
                ..
            } => None,
            _ => Some(self.base()),
        }
    }

    /// What a matched counterparty must fund. `None` for kinds that are never
    /// matched.
    pub fn counterparty_leg(&self) -> Option<Leg> {
        match self {
            TransactionKind::Transfer { .. } | TransactionKind::Deposit { .. } => Some(self.base()),
            TransactionKind::Exchange {
                exchange_amount,
                exchange_currency,
                rail: ExchangeRail::Counterparty { .. },
                ..
            } => Some(Leg::new(exchange_currency, *exchange_amount)),
            _ => None,
        }
    }

    pub fn is_matchable(&self) -> bool {
        self.counterparty_leg().is_some()
    }

    /// The other user named at creation, for purse transactions.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            TransactionKind::Purse { recipient, .. } => Some(recipient),
            _ => None,
        }
    }
}

/// Free-text notes both sides attach while a transaction is open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remarks {
    pub user_receipt: Option<String>,
    pub agent_receipt: Option<String>,
    pub reason_for_cancelling: Option<String>,
    pub reason_for_dispute: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub owner: OwnerId,
    pub status: TransactionStatus,
    pub counterparty: Option<OwnerId>,
    pub kind: TransactionKind,
    #[serde(default)]
    pub remarks: Remarks,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Store revision used for conditional writes.
    #[serde(default)]
    pub version: u64,
}

impl Transaction {
    pub fn new(owner: &str, kind: TransactionKind, now: DateTime<Utc>) -> Self {
        Self {
            id: TransactionId::new(),
            owner: owner.to_string(),
            status: TransactionStatus::Created,
            counterparty: None,
            kind,
            remarks: Remarks::default(),
            created_at: now,
            updated_at: None,
            version: 0,
        }
    }

    pub fn kind_name(&self) -> KindName {
        self.kind.name()
    }

    /// Status as shown to callers; exchanges say `initiated` for `created`.
    pub fn status_label(&self) -> &'static str {
        match (self.kind_name(), self.status) {
            (KindName::Exchange, TransactionStatus::Created) => "initiated",
            (_, status) => status.as_str(),
        }
    }

    /// Whether `owner` initiated, receives, or fulfils this transaction.
    pub fn involves(&self, owner: &str) -> bool {
        self.owner == owner
            || self.counterparty.as_deref() == Some(owner)
            || self.kind.recipient() == Some(owner)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.kind.base();
        write!(
            f,
            "{},id={},owner={},amount={} {},status={}",
            self.kind_name(),
            self.id,
            self.owner,
            base.amount,
            base.currency,
            self.status_label()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    fn exchange(rail: ExchangeRail) -> TransactionKind {
        TransactionKind::Exchange {
            base_amount: Money::from(100),
            base_currency: "USD".into(),
            exchange_amount: Money::from(150_000),
            exchange_currency: "NGN".into(),
            rail,
        }
    }

    #[test]
    fn ids_increase() {
        let ids: Vec<_> = (0..100).map(|_| TransactionId::new()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids[7].to_string().parse::<TransactionId>(), Ok(ids[7]));
    }

    #[test]
    fn status_parses_aliases() {
        assert_eq!(
            "initiated".parse::<TransactionStatus>(),
            Ok(TransactionStatus::Created)
        );
        assert_eq!(
            "Complete".parse::<TransactionStatus>(),
            Ok(TransactionStatus::Completed)
        );
        assert!("settled".parse::<TransactionStatus>().is_err());
        let status: TransactionStatus = serde_json::from_str("\"initiated\"").unwrap();
        assert_eq!(status, TransactionStatus::Created);
    }

    #[test]
    fn only_completed_is_terminal() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(!TransactionStatus::Cancelled.is_terminal());
        assert!(!TransactionStatus::Disputed.is_terminal());
    }

    #[test]
    fn exchange_counterparty_funds_the_exchange_leg() {
        let kind = exchange(ExchangeRail::Counterparty {
            payment_channel: "bank".into(),
            agent_account: Account::new("Bola", "0001", "GTB", Role::Agent),
        });
        assert_eq!(kind.debit_leg(), Some(Leg::new("USD", Money::from(100))));
        assert_eq!(
            kind.counterparty_leg(),
            Some(Leg::new("NGN", Money::from(150_000)))
        );
    }

    #[test]
    fn crypto_exchange_is_not_matchable() {
        let kind = exchange(ExchangeRail::Crypto {
            blockchain_channel: "tron".into(),
            wallet_address: "T9yD14Nj9j7xAB4dbGeiX9h8unkKHxuWwb".into(),
        });
        assert!(!kind.is_matchable());
        assert!(kind.debit_leg().is_some());
    }

    #[test]
    fn requests_debit_nobody_up_front() {
        let kind = TransactionKind::Purse {
            recipient: "bob".into(),
            amount: Money::from(20),
            currency: "NGN".into(),
            direction: PurseDirection::Request,
        };
        assert_eq!(kind.debit_leg(), None);
        assert!(!kind.is_matchable());
        assert_eq!(kind.recipient(), Some("bob"));
    }

    #[test]
    fn exchange_created_reads_initiated() {
        let tx = Transaction::new(
            "alice",
            exchange(ExchangeRail::Crypto {
                blockchain_channel: "btc".into(),
                wallet_address: "bc1q".into(),
            }),
            Utc::now(),
        );
        assert_eq!(tx.status_label(), "initiated");
        assert!(tx.to_string().contains("status=initiated"));
    }
}
