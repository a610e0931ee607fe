pub mod account;
pub mod error;
pub mod money;
pub mod notification;
pub mod owner;
pub mod traits;
pub mod transaction;
pub mod wallet;

pub use account::Account;
pub use error::{Error, LedgerError, NotifyError, StoreError};
pub use money::Money;
pub use notification::{Notification, NotificationEvent};
pub use owner::{Owner, OwnerId, OwnerKind, Role};
pub use traits::{Changeset, CommandStream, DeadLetterQueue, Notifier, Repository, Write};
pub use transaction::{
    ExchangeRail, KindName, Leg, PurseDirection, Remarks, Transaction, TransactionId,
    TransactionKind, TransactionStatus,
};
pub use wallet::{Currency, Wallet, Wallets, currency_code};
