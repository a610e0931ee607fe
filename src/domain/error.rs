use crate::domain::{Currency, Money, OwnerId, TransactionId, TransactionStatus};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error("Ingestion failed with: {0}")]
    Ingestion(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient funds for {owner}: {currency} available {available}, requested {requested}")]
    InsufficientFunds {
        owner: OwnerId,
        currency: Currency,
        available: Money,
        requested: Money,
    },

    #[error("{owner} holds no {currency} wallet")]
    WalletNotFound { owner: OwnerId, currency: Currency },

    #[error("{owner}'s {currency} wallet is inactive")]
    WalletInactive { owner: OwnerId, currency: Currency },

    #[error("{owner}'s {currency} pending balance {pending} cannot release {requested}")]
    PendingShortfall {
        owner: OwnerId,
        currency: Currency,
        pending: Money,
        requested: Money,
    },

    #[error("{owner}'s {currency} balance would leave the representable range")]
    BalanceOverflow { owner: OwnerId, currency: Currency },

    #[error("no eligible counterparty holds {amount} {currency}")]
    NoEligibleCounterparty { currency: Currency, amount: Money },

    #[error("transaction {0} is completed and can no longer change")]
    ImmutableRecord(TransactionId),

    #[error("transaction {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("transaction {id} is a {actual}, not a {expected}")]
    KindMismatch {
        id: TransactionId,
        expected: crate::domain::KindName,
        actual: crate::domain::KindName,
    },

    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("owner {0} not found")]
    OwnerNotFound(OwnerId),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("atomic scope `{operation}` aborted: {source}")]
    AtomicScopeAbort {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Notification(#[from] NotifyError),
}

impl Error {
    /// Business conditions that may clear once state changes elsewhere.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::WalletNotFound { .. } | Error::NoEligibleCounterparty { .. } => true,
            Error::AtomicScopeAbort { source, .. } => source.is_conflict(),
            _ => false,
        }
    }
}

/// Failures reported by a [`Repository`](crate::domain::Repository).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} record {id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("{collection} record {id} was modified concurrently")]
    Conflict { collection: &'static str, id: String },

    #[error("{collection} record {id} already exists")]
    Duplicate { collection: &'static str, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::NotFound { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification for {recipient} could not be delivered: {reason}")]
    Delivery { recipient: OwnerId, reason: String },
}

/// Wallet primitive failures, before they are attributed to an owner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("no {0} wallet")]
    WalletNotFound(Currency),

    #[error("{0} wallet is inactive")]
    WalletInactive(Currency),

    #[error("{currency} available {available}, requested {requested}")]
    InsufficientFunds {
        currency: Currency,
        available: Money,
        requested: Money,
    },

    #[error("{currency} pending {pending}, requested {requested}")]
    PendingShortfall {
        currency: Currency,
        pending: Money,
        requested: Money,
    },

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Money),

    #[error("{0} balance out of range")]
    Overflow(Currency),
}

impl LedgerError {
    pub fn attributed_to(self, owner: &str) -> Error {
        let owner = owner.to_string();
        match self {
            LedgerError::WalletNotFound(currency) => Error::WalletNotFound { owner, currency },
            LedgerError::WalletInactive(currency) => Error::WalletInactive { owner, currency },
            LedgerError::InsufficientFunds {
                currency,
                available,
                requested,
            } => Error::InsufficientFunds {
                owner,
                currency,
                available,
                requested,
            },
            LedgerError::PendingShortfall {
                currency,
                pending,
                requested,
            } => Error::PendingShortfall {
                owner,
                currency,
                pending,
                requested,
            },
            LedgerError::Overflow(currency) => Error::BalanceOverflow { owner, currency },
            LedgerError::NonPositiveAmount(amount) => {
                Error::Validation(format!("amount for {owner} must be positive, got {amount}"))
            }
        }
    }
}
