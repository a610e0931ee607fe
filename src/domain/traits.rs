use async_trait::async_trait;
use futures::Stream;

use crate::domain::{
    Error, Notification, NotifyError, Owner, Role, StoreError, Transaction, TransactionId,
};

/// Source of replayable commands, e.g. rows of a CSV file.
pub trait CommandStream {
    type Command;
    type Stream: Stream<Item = Result<Self::Command, Error>> + Send + Unpin + 'static;

    fn stream(&mut self) -> Self::Stream;
}

/// Sink for failures that are reported but not propagated.
pub trait DeadLetterQueue: Send + Sync {
    fn report(&self, error: &Error);
}

/// One document write inside a [`Changeset`].
#[derive(Debug, Clone)]
pub enum Write {
    /// Fails with `Duplicate` if the id is taken.
    InsertOwner(Owner),
    /// Conditional replace: fails with `Conflict` unless the stored version
    /// equals `owner.version`.
    Owner(Owner),
    InsertTransaction(Transaction),
    Transaction(Transaction),
}

/// Writes applied all-or-nothing by [`Repository::commit`].
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub writes: Vec<Write>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(write: Write) -> Self {
        Self {
            writes: vec![write],
        }
    }

    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Document store holding owners (with their wallets) and transactions.
///
/// Reads return owned snapshots carrying the stored `version`. `commit`
/// validates every write before applying any of them and bumps the version
/// of each replaced record, so two scopes that read the same record cannot
/// both commit.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn owner(&self, id: &str) -> Result<Owner, StoreError>;

    /// Owners of `role`, in registration order.
    async fn owners(&self, role: Role) -> Result<Vec<Owner>, StoreError>;

    async fn transaction(&self, id: TransactionId) -> Result<Transaction, StoreError>;

    /// Transactions `owner` initiated, receives, or fulfils, oldest first.
    async fn transactions_of(&self, owner: &str) -> Result<Vec<Transaction>, StoreError>;

    async fn commit(&self, changes: Changeset) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}
