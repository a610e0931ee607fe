//! Balance effects of each transaction kind. Every function here runs inside
//! an [`AtomicScope`]; returning an error aborts the whole scope.

use chrono::{DateTime, Utc};

use crate::coordinator::AtomicScope;
use crate::domain::{
    Error, ExchangeRail, KindName, Leg, Notification, NotificationEvent, Owner, PurseDirection,
    Repository, Transaction, TransactionId, TransactionKind, TransactionStatus,
};
use crate::lifecycle;

/// Takes `leg` out of `owner`'s available balance.
async fn debit<R: Repository>(
    scope: &mut AtomicScope<'_, R>,
    owner: &str,
    leg: &Leg,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let owner = scope.owner_mut(owner).await?;
    owner.adjust_available(&leg.currency, -leg.amount, now)?;
    owner.record_volume(&leg.currency, leg.amount, now)
}

/// Adds `leg` to `owner`'s available balance, opening the wallet first if
/// the owner never held the currency.
async fn credit<R: Repository>(
    scope: &mut AtomicScope<'_, R>,
    owner: &str,
    leg: &Leg,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let owner = scope.owner_mut(owner).await?;
    if owner.provision_wallet(&leg.currency, now) {
        tracing::debug!(owner = %owner.id, currency = %leg.currency, "wallet provisioned");
    }
    owner.adjust_available(&leg.currency, leg.amount, now)?;
    owner.record_volume(&leg.currency, leg.amount, now)
}

/// Removes a counterparty's reservation, back to available or out of the
/// wallet.
async fn release<R: Repository>(
    scope: &mut AtomicScope<'_, R>,
    owner: &str,
    leg: &Leg,
    to_available: bool,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    scope
        .owner_mut(owner)
        .await?
        .release(&leg.currency, leg.amount, to_available, now)
}

async fn snapshot<R: Repository>(
    scope: &mut AtomicScope<'_, R>,
    owner: &str,
) -> Result<Owner, Error> {
    Ok(scope.owner(owner).await?.clone())
}

/// Moves `leg` from `payer` to `payee` and tells the payee.
async fn pay_between<R: Repository>(
    scope: &mut AtomicScope<'_, R>,
    tx: &Transaction,
    payer: &str,
    payee: &str,
    leg: &Leg,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    debit(scope, payer, leg, now).await?;
    credit(scope, payee, leg, now).await?;

    let payer = snapshot(scope, payer).await?;
    let payee = snapshot(scope, payee).await?;
    scope.notify(Notification::new(
        &payee,
        NotificationEvent::PaymentReceived,
        format!(
            "{} just sent {} {} to you",
            payer.display_name, leg.currency, leg.amount
        ),
        tx,
    ));
    Ok(())
}

/// Stores a new purse transaction with its immediate effects: a pay moves the
/// money now, a request only notifies the requested party.
pub async fn open_purse<R: Repository>(
    scope: &mut AtomicScope<'_, R>,
    tx: Transaction,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let TransactionKind::Purse {
        recipient,
        amount,
        currency,
        direction,
    } = &tx.kind
    else {
        return Err(Error::KindMismatch {
            id: tx.id,
            expected: KindName::Purse,
            actual: tx.kind_name(),
        });
    };
    let leg = Leg::new(currency, *amount);

    match direction {
        PurseDirection::Pay => {
            pay_between(scope, &tx, &tx.owner, recipient, &leg, now).await?;
        }
        PurseDirection::Request => {
            let requester = snapshot(scope, &tx.owner).await?;
            let payer = snapshot(scope, recipient).await?;
            scope.notify(Notification::new(
                &payer,
                NotificationEvent::PaymentRequested,
                format!(
                    "{} requested for {} {} from you",
                    requester.display_name, leg.currency, leg.amount
                ),
                &tx,
            ));
        }
    }

    scope.insert_transaction(tx);
    Ok(())
}

/// Applies the final balance movements of `tx` on completion.
async fn finalize<R: Repository>(
    scope: &mut AtomicScope<'_, R>,
    tx: &Transaction,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let base = tx.kind.base();
    let counterparty = tx.counterparty.as_deref();

    match (&tx.kind, counterparty) {
        (TransactionKind::Withdrawal { destination, .. }, _) => {
            debit(scope, &tx.owner, &base, now).await?;
            tracing::debug!(
                transaction = %tx.id,
                account_name = destination.account_name(),
                account_number = destination.account_number(),
                bank = destination.bank_name(),
                "withdrawal paid out"
            );
            Ok(())
        }

        (
            TransactionKind::Exchange {
                rail: ExchangeRail::Crypto { .. },
                ..
            },
            _,
        ) => debit(scope, &tx.owner, &base, now).await,

        (TransactionKind::Transfer { .. }, Some(agent)) => {
            debit(scope, &tx.owner, &base, now).await?;
            release(scope, agent, &base, true, now).await?;
            credit(scope, agent, &base, now).await
        }

        (TransactionKind::Deposit { .. }, Some(agent)) => {
            release(scope, agent, &base, false, now).await?;
            scope
                .owner_mut(agent)
                .await?
                .record_volume(&base.currency, base.amount, now)?;
            credit(scope, &tx.owner, &base, now).await
        }

        (
            TransactionKind::Exchange {
                exchange_amount,
                exchange_currency,
                rail: ExchangeRail::Counterparty { .. },
                ..
            },
            Some(peer),
        ) => {
            let exchanged = Leg::new(exchange_currency, *exchange_amount);
            debit(scope, &tx.owner, &base, now).await?;
            credit(scope, peer, &base, now).await?;
            release(scope, peer, &exchanged, false, now).await?;
            scope
                .owner_mut(peer)
                .await?
                .record_volume(&exchanged.currency, exchanged.amount, now)?;
            credit(scope, &tx.owner, &exchanged, now).await
        }

        (
            TransactionKind::Purse {
                recipient,
                direction: PurseDirection::Request,
                ..
            },
            _,
        ) => pay_between(scope, tx, recipient, &tx.owner, &base, now).await,

        (
            TransactionKind::Purse {
                direction: PurseDirection::Pay,
                ..
            },
            _,
        ) => Ok(()),

        (_, None) => Err(Error::Validation(format!(
            "transaction {} has no counterparty",
            tx.id
        ))),
    }
}

/// Hands a cancelled transaction's reservation back to its counterparty.
async fn unwind<R: Repository>(
    scope: &mut AtomicScope<'_, R>,
    tx: &Transaction,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let leg = tx.kind.counterparty_leg();
    if let (Some(counterparty), Some(leg)) = (tx.counterparty.as_deref(), leg) {
        release(scope, counterparty, &leg, true, now).await?;
    }
    Ok(())
}

/// Moves `id` to `status`, settling or unwinding balances as the new status
/// requires, and notifies everyone involved.
pub async fn respond<R: Repository>(
    scope: &mut AtomicScope<'_, R>,
    id: TransactionId,
    kind: KindName,
    status: TransactionStatus,
    now: DateTime<Utc>,
) -> Result<Transaction, Error> {
    let tx = scope.transaction(id).await?.clone();
    lifecycle::ensure_kind(&tx, kind)?;
    lifecycle::check_transition(&tx, status)?;

    if tx.status != status {
        match status {
            TransactionStatus::Completed => finalize(scope, &tx, now).await?,
            TransactionStatus::Cancelled => unwind(scope, &tx, now).await?,
            _ => {}
        }
    }

    let stored = scope.transaction_mut(id).await?;
    stored.status = status;
    stored.updated_at = Some(now);
    let updated = stored.clone();

    if tx.status != status {
        let mut recipients = vec![updated.owner.clone()];
        recipients.extend(updated.counterparty.clone());
        for recipient in recipients {
            let owner = snapshot(scope, &recipient).await?;
            scope.notify(Notification::new(
                &owner,
                NotificationEvent::StatusChanged,
                format!(
                    "{} transaction {} is now {}",
                    updated.kind_name(),
                    updated.id,
                    updated.status_label()
                ),
                &updated,
            ));
        }
    }

    Ok(updated)
}
