use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinator::AtomicScope;
use crate::domain::{
    Currency, Error, ExchangeRail, KindName, Leg, Money, Notification, NotificationEvent, Owner,
    Repository, Role, Transaction, TransactionId, TransactionKind, TransactionStatus,
    currency_code,
};
use crate::lifecycle;

/// How to choose among several eligible counterparties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// First eligible owner in registration order.
    FirstFound,
    /// Eligible owner with the smallest pending balance in the settlement
    /// currency; ties go to the lowest owner id.
    #[default]
    LeastPending,
}

#[derive(Debug, Clone)]
pub struct Matcher {
    policy: MatchPolicy,
    peer_exchange_currencies: Vec<Currency>,
}

impl Matcher {
    pub fn new(policy: MatchPolicy, peer_exchange_currencies: Vec<Currency>) -> Self {
        Self {
            policy,
            peer_exchange_currencies: peer_exchange_currencies
                .iter()
                .map(|c| currency_code(c))
                .collect(),
        }
    }

    /// Exchanges whose base currency is in `peer_exchange_currencies` are
    /// fulfilled by other users; everything else by agents.
    pub fn pool_for(&self, tx: &Transaction) -> Role {
        match &tx.kind {
            TransactionKind::Exchange {
                base_currency,
                rail: ExchangeRail::Counterparty { .. },
                ..
            } if self.peer_exchange_currencies.contains(base_currency) => Role::User,
            _ => Role::Agent,
        }
    }

    fn eligible(candidate: &Owner, tx: &Transaction, leg: &Leg) -> bool {
        candidate.id != tx.owner
            && candidate.is_eligible_counterparty()
            && candidate
                .wallets
                .get(&leg.currency)
                .is_some_and(|w| w.is_active && w.available_balance >= leg.amount)
    }

    /// Picks the counterparty for `leg` out of `candidates`.
    pub fn select(&self, candidates: Vec<Owner>, tx: &Transaction, leg: &Leg) -> Option<Owner> {
        let mut eligible = candidates
            .into_iter()
            .filter(|c| Self::eligible(c, tx, leg));

        match self.policy {
            MatchPolicy::FirstFound => eligible.next(),
            MatchPolicy::LeastPending => eligible.min_by(|a, b| {
                let pending = |o: &Owner| {
                    o.wallets
                        .get(&leg.currency)
                        .map(|w| w.pending_balance)
                        .unwrap_or(Money::ZERO)
                };
                match pending(a).cmp(&pending(b)) {
                    Ordering::Equal => a.id.cmp(&b.id),
                    other => other,
                }
            }),
        }
    }

    /// Binds a counterparty to `id` and reserves its side of the settlement.
    ///
    /// The candidate is read outside the scope and staged with the version it
    /// was read at. If another scope reserves against the same owner first,
    /// this scope's commit fails with a conflict and the caller re-queries.
    pub async fn bind<R: Repository>(
        &self,
        scope: &mut AtomicScope<'_, R>,
        id: TransactionId,
        kind: KindName,
        now: DateTime<Utc>,
    ) -> Result<Transaction, Error> {
        let tx = scope.transaction(id).await?.clone();
        lifecycle::ensure_kind(&tx, kind)?;
        lifecycle::check_matchable(&tx)?;
        let leg = tx.kind.counterparty_leg().ok_or_else(|| {
            Error::Validation(format!("{} has no counterparty leg", tx.kind_name()))
        })?;

        let pool = self.pool_for(&tx);
        let candidates = scope.repository().owners(pool).await?;
        let chosen = self
            .select(candidates, &tx, &leg)
            .ok_or_else(|| Error::NoEligibleCounterparty {
                currency: leg.currency.clone(),
                amount: leg.amount,
            })?;

        let counterparty = scope.stage_owner(chosen);
        counterparty.reserve(&leg.currency, leg.amount, now)?;
        let counterparty = counterparty.clone();

        let stored = scope.transaction_mut(id).await?;
        stored.status = TransactionStatus::Matched;
        stored.counterparty = Some(counterparty.id.clone());
        stored.updated_at = Some(now);
        let matched = stored.clone();

        let initiator = scope.owner(&matched.owner).await?.display_name.clone();
        scope.notify(Notification::new(
            &counterparty,
            NotificationEvent::TransactionMatched,
            format!(
                "you have been matched to {initiator} for a {} {} transaction",
                leg.currency, leg.amount
            ),
            &matched,
        ));

        tracing::debug!(
            transaction = %matched.id,
            counterparty = %counterparty.id,
            pool = %pool,
            currency = %leg.currency,
            amount = %leg.amount,
            "counterparty reserved"
        );
        Ok(matched)
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(MatchPolicy::default(), vec!["USD".to_string()])
    }
}
