//! Shared test fixtures.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    Account, Changeset, DeadLetterQueue, Error, Money, Notification, Notifier, NotifyError, Owner,
    PurseDirection, Repository, Role, StoreError, Transaction, TransactionId, TransactionKind,
};
use crate::repository::MemoryRepository;

pub fn transfer(owner: &str, amount: i64, currency: &str) -> Transaction {
    Transaction::new(
        owner,
        TransactionKind::Transfer {
            base_amount: Money::from(amount),
            base_currency: currency.into(),
            amount_sent: Money::from(amount * 1500),
            conv_currency: "NGN".into(),
            payment_channel: "bank".into(),
            recipient_account: None,
        },
        Utc::now(),
    )
}

pub fn withdrawal(owner: &str, amount: i64, currency: &str) -> Transaction {
    Transaction::new(
        owner,
        TransactionKind::Withdrawal {
            base_amount: Money::from(amount),
            base_currency: currency.into(),
            destination: Account::new(owner, "0123456789", "First Bank", Role::User),
        },
        Utc::now(),
    )
}

pub fn deposit(owner: &str, amount: i64, currency: &str) -> Transaction {
    Transaction::new(
        owner,
        TransactionKind::Deposit {
            base_amount: Money::from(amount),
            base_currency: currency.into(),
            payment_channel: "cash".into(),
        },
        Utc::now(),
    )
}

fn purse(
    from: &str,
    to: &str,
    amount: i64,
    currency: &str,
    direction: PurseDirection,
) -> Transaction {
    Transaction::new(
        from,
        TransactionKind::Purse {
            recipient: to.into(),
            amount: Money::from(amount),
            currency: currency.into(),
            direction,
        },
        Utc::now(),
    )
}

pub fn pay(from: &str, to: &str, amount: i64, currency: &str) -> Transaction {
    purse(from, to, amount, currency, PurseDirection::Pay)
}

pub fn request(from: &str, to: &str, amount: i64, currency: &str) -> Transaction {
    purse(from, to, amount, currency, PurseDirection::Request)
}

/// Keeps the text of every reported error.
#[derive(Debug, Default)]
pub struct CollectingDlq {
    reported: Mutex<Vec<String>>,
}

impl CollectingDlq {
    pub fn reported(&self) -> Vec<String> {
        self.reported.lock().unwrap().clone()
    }
}

impl DeadLetterQueue for CollectingDlq {
    fn report(&self, error: &Error) {
        self.reported.lock().unwrap().push(error.to_string());
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery {
            recipient: notification.recipient.clone(),
            reason: "push gateway down".into(),
        })
    }
}

/// Loses the next `n` commits to a simulated concurrent writer.
pub struct FlakyRepository {
    inner: MemoryRepository,
    failures: AtomicUsize,
}

impl FlakyRepository {
    pub fn new(inner: MemoryRepository, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn owner(&self, id: &str) -> Result<Owner, StoreError> {
        self.inner.owner(id).await
    }

    async fn owners(&self, role: Role) -> Result<Vec<Owner>, StoreError> {
        self.inner.owners(role).await
    }

    async fn transaction(&self, id: TransactionId) -> Result<Transaction, StoreError> {
        self.inner.transaction(id).await
    }

    async fn transactions_of(&self, owner: &str) -> Result<Vec<Transaction>, StoreError> {
        self.inner.transactions_of(owner).await
    }

    async fn commit(&self, changes: Changeset) -> Result<(), StoreError> {
        let lost = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Err(StoreError::Conflict {
                collection: "owners",
                id: "concurrent-writer".into(),
            });
        }
        self.inner.commit(changes).await
    }
}
