use chrono::Utc;
use tracing::{debug, info, warn};

use crate::coordinator::{Coordinator, owner_lookup, transaction_lookup};
use crate::domain::{
    Changeset, Currency, DeadLetterQueue, Error, KindName, Money, Notifier, Owner,
    PurseDirection, Repository, Role, Transaction, TransactionId, TransactionKind,
    TransactionStatus, Wallet, Write, currency_code,
};
use crate::lifecycle::{self, Intent, TransactionPatch};
use crate::matcher::Matcher;
use crate::settings::Settings;
use crate::settlement;

/// Narrows [`Engine::transactions_of`].
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub kind: Option<KindName>,
    pub currency: Option<Currency>,
}

impl HistoryFilter {
    fn accepts(&self, tx: &Transaction) -> bool {
        self.kind.is_none_or(|k| tx.kind_name() == k)
            && self
                .currency
                .as_deref()
                .is_none_or(|c| transaction_touches(tx, &currency_code(c)))
    }
}

fn transaction_touches(tx: &Transaction, currency: &str) -> bool {
    match &tx.kind {
        TransactionKind::Transfer {
            base_currency,
            conv_currency,
            ..
        } => base_currency == currency || conv_currency == currency,
        TransactionKind::Exchange {
            base_currency,
            exchange_currency,
            ..
        } => base_currency == currency || exchange_currency == currency,
        other => other.base().currency == currency,
    }
}

/// Settlement engine. Every operation reads fresh state from the repository;
/// nothing is cached between calls.
pub struct Engine<R, N, D>
where
    R: Repository,
    N: Notifier,
    D: DeadLetterQueue,
{
    coordinator: Coordinator<R, N, D>,
    matcher: Matcher,
    max_attempts: u32,
}

impl<R, N, D> Engine<R, N, D>
where
    R: Repository,
    N: Notifier,
    D: DeadLetterQueue,
{
    pub fn new(repository: R, notifier: N, dlq: D, settings: &Settings) -> Self {
        Self {
            coordinator: Coordinator::new(repository, notifier, dlq),
            matcher: settings.matching.matcher(),
            max_attempts: settings.matching.max_attempts.max(1),
        }
    }

    pub fn repository(&self) -> &R {
        self.coordinator.repository()
    }

    pub fn notifier(&self) -> &N {
        self.coordinator.notifier()
    }

    pub fn dlq(&self) -> &D {
        self.coordinator.dlq()
    }

    /// Small helper to log operation results
    fn log_result<T>(operation: &str, subject: &str, result: &Result<T, Error>) {
        match result {
            Ok(_) => info!(subject, "{operation} applied"),
            Err(e) if e.is_retryable() => info!(subject, reason = %e, "{operation} deferred"),
            Err(e) => warn!(subject, reason = %e, "{operation} rejected"),
        }
    }

    async fn owner(&self, id: &str) -> Result<Owner, Error> {
        self.repository()
            .owner(id)
            .await
            .map_err(|e| owner_lookup(id, e))
    }

    pub async fn register_owner(&self, owner: Owner) -> Result<(), Error> {
        let id = owner.id.clone();
        let result = self
            .repository()
            .commit(Changeset::single(Write::InsertOwner(owner)))
            .await
            .map_err(Error::from);
        Self::log_result("register_owner", &id, &result);
        result
    }

    /// Opens an empty, active wallet. An existing wallet is not replaced.
    pub async fn create_wallet(&self, owner: &str, currency: &str) -> Result<Wallet, Error> {
        let result = self.open_wallet(owner, currency).await;
        Self::log_result("create_wallet", owner, &result);
        result
    }

    async fn open_wallet(&self, owner: &str, currency: &str) -> Result<Wallet, Error> {
        let currency = currency_code(currency);
        if currency.is_empty() {
            return Err(Error::Validation("wallet currency is required".into()));
        }
        let mut stored = self.owner(owner).await?;
        if !stored.provision_wallet(&currency, Utc::now()) {
            return Err(Error::Validation(format!(
                "{owner} already holds a {currency} wallet"
            )));
        }
        self.repository()
            .commit(Changeset::single(Write::Owner(stored)))
            .await?;
        self.owner(owner)
            .await?
            .wallets
            .get(&currency)
            .cloned()
            .ok_or(Error::WalletNotFound {
                owner: owner.to_string(),
                currency,
            })
    }

    pub async fn set_wallet_active(
        &self,
        owner: &str,
        currency: &str,
        active: bool,
    ) -> Result<(), Error> {
        let result = self.toggle_wallet(owner, currency, active).await;
        let operation = if active {
            "activate_wallet"
        } else {
            "deactivate_wallet"
        };
        Self::log_result(operation, owner, &result);
        result
    }

    async fn toggle_wallet(&self, owner: &str, currency: &str, active: bool) -> Result<(), Error> {
        let mut stored = self.owner(owner).await?;
        stored.set_wallet_active(&currency_code(currency), active, Utc::now())?;
        self.repository()
            .commit(Changeset::single(Write::Owner(stored)))
            .await?;
        Ok(())
    }

    /// A missing wallet reads as insufficient.
    pub async fn sufficient_funds(
        &self,
        owner: &str,
        amount: Money,
        currency: &str,
    ) -> Result<bool, Error> {
        Ok(self
            .owner(owner)
            .await?
            .sufficient_funds(amount, &currency_code(currency)))
    }

    /// Validates `intent`, checks the initiator can cover its debit and stores
    /// the transaction as `created`. A pay settles immediately.
    pub async fn create_transaction(
        &self,
        owner: &str,
        intent: Intent,
    ) -> Result<Transaction, Error> {
        let name = intent.kind_name();
        let result = self.create(owner, intent).await;
        match &result {
            Ok(tx) => {
                let base = tx.kind.base();
                info!(
                    owner,
                    transaction = %tx.id,
                    amount = %base.amount,
                    currency = %base.currency,
                    "{name} created"
                );
            }
            Err(e) => warn!(owner, reason = %e, "{name} rejected"),
        }
        result
    }

    async fn create(&self, owner: &str, intent: Intent) -> Result<Transaction, Error> {
        let kind = intent.validate(owner)?;
        let initiator = self.owner(owner).await?;
        if initiator.role() != Role::User {
            return Err(Error::Validation(format!(
                "{owner} is an agent and cannot initiate a {}",
                kind.name()
            )));
        }
        if let Some(recipient) = kind.recipient() {
            if self.owner(recipient).await?.role() != Role::User {
                return Err(Error::Validation(format!(
                    "{recipient} is not a user and cannot receive a {}",
                    kind.name()
                )));
            }
        }
        if let Some(leg) = kind.debit_leg() {
            initiator.ensure_funds(leg.amount, &leg.currency)?;
        }

        let now = Utc::now();
        let tx = Transaction::new(owner, kind, now);
        let id = tx.id;

        match &tx.kind {
            TransactionKind::Purse { direction, .. } => {
                let operation = match direction {
                    PurseDirection::Pay => "pay",
                    PurseDirection::Request => "request",
                };
                let mut scope = self.coordinator.begin(operation);
                let outcome = settlement::open_purse(&mut scope, tx, now).await;
                self.coordinator.conclude(scope, outcome).await?;
            }
            _ => {
                self.repository()
                    .commit(Changeset::single(Write::InsertTransaction(tx)))
                    .await?;
            }
        }

        self.transaction(id).await
    }

    /// Merges caller editable fields. Completed transactions are refused
    /// untouched.
    pub async fn update_transaction(
        &self,
        id: TransactionId,
        kind: KindName,
        patch: TransactionPatch,
    ) -> Result<Transaction, Error> {
        let result = self.patch(id, kind, patch).await;
        Self::log_result("update_transaction", &id.to_string(), &result);
        result
    }

    async fn patch(
        &self,
        id: TransactionId,
        kind: KindName,
        patch: TransactionPatch,
    ) -> Result<Transaction, Error> {
        if patch.is_empty() {
            return Err(Error::Validation(format!("nothing to update on {id}")));
        }
        let mut tx = self.transaction(id).await?;
        lifecycle::ensure_kind(&tx, kind)?;
        lifecycle::apply_patch(&mut tx, patch, Utc::now())?;
        self.repository()
            .commit(Changeset::single(Write::Transaction(tx)))
            .await?;
        self.transaction(id).await
    }

    /// Sets the status of `id`, settling on completion and releasing any
    /// reservation on cancellation.
    pub async fn respond_to_transaction(
        &self,
        id: TransactionId,
        kind: KindName,
        status: TransactionStatus,
    ) -> Result<Transaction, Error> {
        let mut scope = self.coordinator.begin("respond");
        let outcome = settlement::respond(&mut scope, id, kind, status, Utc::now()).await;
        let result = self.coordinator.conclude(scope, outcome).await;
        match &result {
            Ok(tx) => info!(transaction = %id, status = %tx.status_label(), "{kind} updated"),
            Err(e) => warn!(transaction = %id, to = %status, reason = %e, "{kind} not updated"),
        }
        result
    }

    /// Binds an eligible counterparty to an unmatched transaction and
    /// reserves its side. Re-queries when a concurrent match wins the race
    /// for the chosen counterparty.
    pub async fn match_counterparty(
        &self,
        id: TransactionId,
        kind: KindName,
    ) -> Result<Transaction, Error> {
        let mut attempt = 1;
        let result = loop {
            let mut scope = self.coordinator.begin("match");
            let outcome = self.matcher.bind(&mut scope, id, kind, Utc::now()).await;
            match self.coordinator.conclude(scope, outcome).await {
                Err(Error::AtomicScopeAbort { ref source, .. })
                    if source.is_conflict() && attempt < self.max_attempts =>
                {
                    debug!(transaction = %id, attempt, "match lost a race, retrying");
                    attempt += 1;
                }
                result => break result,
            }
        };

        match &result {
            Ok(tx) => info!(
                transaction = %id,
                counterparty = tx.counterparty.as_deref().unwrap_or_default(),
                attempt,
                "{kind} matched"
            ),
            Err(e) => info!(transaction = %id, reason = %e, attempt, "{kind} unmatched"),
        }
        result
    }

    pub async fn transaction(&self, id: TransactionId) -> Result<Transaction, Error> {
        self.repository()
            .transaction(id)
            .await
            .map_err(|e| transaction_lookup(id, e))
    }

    /// Transactions `owner` initiated, receives, or fulfils, oldest first.
    pub async fn transactions_of(
        &self,
        owner: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<Transaction>, Error> {
        self.owner(owner).await?;
        let mut history = self.repository().transactions_of(owner).await?;
        history.retain(|tx| filter.accepts(tx));
        history.sort_by_key(|tx| tx.id);
        Ok(history)
    }
}
