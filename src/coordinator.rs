//! All-or-nothing business operations.
//!
//! An [`AtomicScope`] stages every record it touches in memory. Nothing is
//! visible to other readers until [`Coordinator::conclude`] commits the staged
//! writes as one [`Changeset`]; notifications queued in the scope are sent only
//! after that commit succeeded.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::{
    Changeset, DeadLetterQueue, Error, Notification, Notifier, Owner, OwnerId, Repository,
    StoreError, Transaction, TransactionId, Write,
};

pub(crate) fn owner_lookup(id: &str, error: StoreError) -> Error {
    match error {
        StoreError::NotFound { .. } => Error::OwnerNotFound(id.to_string()),
        other => Error::Persistence(other),
    }
}

pub(crate) fn transaction_lookup(id: TransactionId, error: StoreError) -> Error {
    match error {
        StoreError::NotFound { .. } => Error::TransactionNotFound(id),
        other => Error::Persistence(other),
    }
}

pub struct AtomicScope<'a, R: Repository> {
    operation: &'static str,
    repository: &'a R,
    owners: HashMap<OwnerId, Owner>,
    transactions: HashMap<TransactionId, Transaction>,
    // Touched records, in first-touch order.
    dirty_owners: Vec<OwnerId>,
    dirty_transactions: Vec<TransactionId>,
    inserts: Vec<Transaction>,
    outbox: Vec<Notification>,
}

impl<'a, R: Repository> AtomicScope<'a, R> {
    fn new(operation: &'static str, repository: &'a R) -> Self {
        Self {
            operation,
            repository,
            owners: HashMap::new(),
            transactions: HashMap::new(),
            dirty_owners: Vec::new(),
            dirty_transactions: Vec::new(),
            inserts: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn repository(&self) -> &'a R {
        self.repository
    }

    async fn load_owner(&mut self, id: &str) -> Result<(), Error> {
        if !self.owners.contains_key(id) {
            let owner = self
                .repository
                .owner(id)
                .await
                .map_err(|e| owner_lookup(id, e))?;
            self.owners.insert(id.to_string(), owner);
        }
        Ok(())
    }

    /// The owner as staged in this scope, loading it on first use.
    pub async fn owner(&mut self, id: &str) -> Result<&Owner, Error> {
        self.load_owner(id).await?;
        self.owners
            .get(id)
            .ok_or_else(|| Error::OwnerNotFound(id.to_string()))
    }

    /// Like [`owner`](Self::owner), and marks the owner for writing.
    pub async fn owner_mut(&mut self, id: &str) -> Result<&mut Owner, Error> {
        self.load_owner(id).await?;
        if !self.dirty_owners.iter().any(|d| d == id) {
            self.dirty_owners.push(id.to_string());
        }
        self.owners
            .get_mut(id)
            .ok_or_else(|| Error::OwnerNotFound(id.to_string()))
    }

    /// Adopts a snapshot read outside the scope, e.g. a matching candidate.
    /// Its version is checked on commit like any other staged record.
    pub fn stage_owner(&mut self, owner: Owner) -> &mut Owner {
        let id = owner.id.clone();
        if !self.dirty_owners.contains(&id) {
            self.dirty_owners.push(id.clone());
        }
        self.owners.entry(id).insert_entry(owner).into_mut()
    }

    async fn load_transaction(&mut self, id: TransactionId) -> Result<(), Error> {
        if !self.transactions.contains_key(&id) {
            let tx = self
                .repository
                .transaction(id)
                .await
                .map_err(|e| transaction_lookup(id, e))?;
            self.transactions.insert(id, tx);
        }
        Ok(())
    }

    pub async fn transaction(&mut self, id: TransactionId) -> Result<&Transaction, Error> {
        self.load_transaction(id).await?;
        self.transactions
            .get(&id)
            .ok_or(Error::TransactionNotFound(id))
    }

    pub async fn transaction_mut(&mut self, id: TransactionId) -> Result<&mut Transaction, Error> {
        self.load_transaction(id).await?;
        if !self.dirty_transactions.contains(&id) {
            self.dirty_transactions.push(id);
        }
        self.transactions
            .get_mut(&id)
            .ok_or(Error::TransactionNotFound(id))
    }

    pub fn insert_transaction(&mut self, tx: Transaction) {
        self.inserts.push(tx);
    }

    /// Queues a notification for after a successful commit.
    pub fn notify(&mut self, notification: Notification) {
        self.outbox.push(notification);
    }

    fn into_changeset(mut self) -> (Changeset, Vec<Notification>) {
        let mut changes = Changeset::new();
        for tx in self.inserts {
            changes.push(Write::InsertTransaction(tx));
        }
        for id in &self.dirty_owners {
            if let Some(owner) = self.owners.remove(id) {
                changes.push(Write::Owner(owner));
            }
        }
        for id in &self.dirty_transactions {
            if let Some(tx) = self.transactions.remove(id) {
                changes.push(Write::Transaction(tx));
            }
        }
        (changes, self.outbox)
    }

    /// Commits every staged write at once and hands back the queued
    /// notifications.
    pub async fn commit(self) -> Result<Vec<Notification>, Error> {
        let operation = self.operation;
        let repository = self.repository;
        let (changes, outbox) = self.into_changeset();

        if changes.is_empty() {
            debug!(operation, "atomic scope had nothing to write");
            return Ok(outbox);
        }

        let writes = changes.writes.len();
        repository
            .commit(changes)
            .await
            .map_err(|source| Error::AtomicScopeAbort { operation, source })?;

        debug!(operation, writes, "atomic scope committed");
        Ok(outbox)
    }

    /// Drops every staged write and queued notification.
    pub fn abort(self, reason: &Error) {
        debug!(
            operation = self.operation,
            staged_owners = self.dirty_owners.len(),
            staged_transactions = self.dirty_transactions.len() + self.inserts.len(),
            reason = %reason,
            "atomic scope aborted"
        );
    }
}

/// Owns the collaborators and runs business operations as atomic scopes.
pub struct Coordinator<R, N, D>
where
    R: Repository,
    N: Notifier,
    D: DeadLetterQueue,
{
    repository: R,
    notifier: N,
    dlq: D,
}

impl<R, N, D> Coordinator<R, N, D>
where
    R: Repository,
    N: Notifier,
    D: DeadLetterQueue,
{
    pub fn new(repository: R, notifier: N, dlq: D) -> Self {
        Self {
            repository,
            notifier,
            dlq,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn dlq(&self) -> &D {
        &self.dlq
    }

    /// Opens a flat scope. Scopes do not nest.
    pub fn begin(&self, operation: &'static str) -> AtomicScope<'_, R> {
        debug!(operation, "atomic scope opened");
        AtomicScope::new(operation, &self.repository)
    }

    /// Commits `scope` if `outcome` succeeded and aborts it otherwise.
    ///
    /// Notifications go out only after the commit. A failed delivery is
    /// logged and reported to the dead-letter queue; it never undoes the
    /// committed writes.
    pub async fn conclude<T>(
        &self,
        scope: AtomicScope<'_, R>,
        outcome: Result<T, Error>,
    ) -> Result<T, Error> {
        match outcome {
            Ok(value) => {
                let outbox = scope.commit().await?;
                self.dispatch(outbox).await;
                Ok(value)
            }
            Err(e) => {
                scope.abort(&e);
                Err(e)
            }
        }
    }

    pub async fn dispatch(&self, outbox: Vec<Notification>) {
        for notification in outbox {
            if let Err(e) = self.notifier.send(&notification).await {
                warn!(
                    recipient = %notification.recipient,
                    title = %notification.title,
                    error = %e,
                    "notification dropped"
                );
                self.dlq.report(&Error::Notification(e));
            }
        }
    }
}
