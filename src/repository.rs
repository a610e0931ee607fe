use std::collections::{BTreeMap, HashMap};
use std::io;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::{
    Changeset, Error, Owner, OwnerId, Repository, Role, StoreError, Transaction, TransactionId,
    Write,
};

const OWNERS: &str = "owners";
const TRANSACTIONS: &str = "transactions";

#[derive(Debug, Default)]
struct Documents {
    owners: HashMap<OwnerId, Owner>,
    registration: Vec<OwnerId>,
    // ULIDs sort by creation time.
    transactions: BTreeMap<TransactionId, Transaction>,
}

impl Documents {
    fn check(&self, write: &Write) -> Result<(), StoreError> {
        match write {
            Write::InsertOwner(owner) if self.owners.contains_key(&owner.id) => {
                Err(StoreError::Duplicate {
                    collection: OWNERS,
                    id: owner.id.clone(),
                })
            }
            Write::InsertTransaction(tx) if self.transactions.contains_key(&tx.id) => {
                Err(StoreError::Duplicate {
                    collection: TRANSACTIONS,
                    id: tx.id.to_string(),
                })
            }
            Write::Owner(owner) => {
                let stored = self.owners.get(&owner.id).ok_or_else(|| StoreError::NotFound {
                    collection: OWNERS,
                    id: owner.id.clone(),
                })?;
                if stored.version != owner.version {
                    return Err(StoreError::Conflict {
                        collection: OWNERS,
                        id: owner.id.clone(),
                    });
                }
                Ok(())
            }
            Write::Transaction(tx) => {
                let stored = self
                    .transactions
                    .get(&tx.id)
                    .ok_or_else(|| StoreError::NotFound {
                        collection: TRANSACTIONS,
                        id: tx.id.to_string(),
                    })?;
                if stored.version != tx.version {
                    return Err(StoreError::Conflict {
                        collection: TRANSACTIONS,
                        id: tx.id.to_string(),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn apply(&mut self, write: Write) {
        match write {
            Write::InsertOwner(owner) => {
                self.registration.push(owner.id.clone());
                self.owners.insert(owner.id.clone(), owner);
            }
            Write::Owner(mut owner) => {
                owner.version += 1;
                self.owners.insert(owner.id.clone(), owner);
            }
            Write::InsertTransaction(tx) => {
                self.transactions.insert(tx.id, tx);
            }
            Write::Transaction(mut tx) => {
                tx.version += 1;
                self.transactions.insert(tx.id, tx);
            }
        }
    }
}

/// In-process document store. Every commit holds the write lock for its
/// whole changeset, so a commit is observed entirely or not at all.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    documents: RwLock<Documents>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `owner`, or merges its wallets into an already registered
    /// owner. Used to load opening balances.
    pub async fn seed(&self, owner: Owner) {
        let mut documents = self.documents.write().await;
        match documents.owners.get_mut(&owner.id) {
            Some(existing) => {
                let mut merged = existing.wallets.iter().cloned().collect::<Vec<_>>();
                merged.retain(|w| !owner.wallets.has_wallet(&w.currency));
                merged.extend(owner.wallets.iter().cloned());
                existing.wallets = merged.into_iter().collect();
                existing.version += 1;
            }
            None => {
                documents.registration.push(owner.id.clone());
                documents.owners.insert(owner.id.clone(), owner);
            }
        }
    }

    /// All owners in registration order.
    pub async fn snapshot(&self) -> Vec<Owner> {
        let documents = self.documents.read().await;
        documents
            .registration
            .iter()
            .filter_map(|id| documents.owners.get(id))
            .cloned()
            .collect()
    }

    pub async fn transaction_count(&self) -> usize {
        self.documents.read().await.transactions.len()
    }

    /// Writes one CSV row per wallet.
    pub async fn flush<W: io::Write>(&self, out: W) -> Result<(), Error> {
        write_report(&self.snapshot().await, out)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn owner(&self, id: &str) -> Result<Owner, StoreError> {
        self.documents
            .read()
            .await
            .owners
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection: OWNERS,
                id: id.to_string(),
            })
    }

    async fn owners(&self, role: Role) -> Result<Vec<Owner>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .registration
            .iter()
            .filter_map(|id| documents.owners.get(id))
            .filter(|owner| owner.role() == role)
            .cloned()
            .collect())
    }

    async fn transaction(&self, id: TransactionId) -> Result<Transaction, StoreError> {
        self.documents
            .read()
            .await
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection: TRANSACTIONS,
                id: id.to_string(),
            })
    }

    async fn transactions_of(&self, owner: &str) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .documents
            .read()
            .await
            .transactions
            .values()
            .filter(|tx| tx.involves(owner))
            .cloned()
            .collect())
    }

    async fn commit(&self, changes: Changeset) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        for write in &changes.writes {
            documents.check(write)?;
        }
        for write in changes.writes {
            documents.apply(write);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    owner: &'a str,
    role: &'a str,
    currency: &'a str,
    available: String,
    pending: String,
    total_volume: String,
    active: bool,
}

pub fn write_report<W: io::Write>(owners: &[Owner], out: W) -> Result<(), Error> {
    let mut writer = csv::Writer::from_writer(out);
    for owner in owners {
        for wallet in owner.wallets.iter() {
            writer
                .serialize(ReportRow {
                    owner: &owner.id,
                    role: owner.role().as_str(),
                    currency: &wallet.currency,
                    available: wallet.available_balance.to_string(),
                    pending: wallet.pending_balance.to_string(),
                    total_volume: wallet.total_volume.to_string(),
                    active: wallet.is_active,
                })
                .map_err(|e| Error::IO(e.into()))?;
        }
    }
    writer.flush()?;
    Ok(())
}
