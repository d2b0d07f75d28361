//! Service layer API for the exchange workflow
use crate::boundary::CategoryCatalog;
use crate::config::{EngineConfig, MarketConfig};
use crate::error::{MarketError, MarketResult};
use crate::offer::{Offer, OfferStatus};
use crate::offer_store::OfferStore;
use crate::projections::{self, ExchangeSummary};
use crate::store::{Store, StoreTx, retry_on_stale};
use crate::trade::{OfferEffect, Side, Trade, TradeAction, Transition};
use crate::types::{OfferId, TimeStamp, TradeId, UserId};
use sled::transaction::{ConflictableTransactionResult, abort};
use std::sync::Arc;
use tracing::{debug, info};

pub struct TradeEngine {
    store: Store,
    max_conflict_retries: u32,
}

impl TradeEngine {
    pub fn new(store: Store, config: &EngineConfig) -> Self {
        Self {
            store,
            max_conflict_retries: config.max_conflict_retries,
        }
    }

    /// Propose swapping `proposer_offer` (owned by `caller`) for `target_offer`.
    pub fn propose_exchange(
        &self,
        caller: &UserId,
        proposer_offer: &OfferId,
        target_offer: &OfferId,
        message: Option<String>,
    ) -> MarketResult<Trade> {
        retry_on_stale(self.max_conflict_retries, "propose_exchange", || {
            let proposer = self.store.offer(proposer_offer)?;
            let target = self.store.offer(target_offer)?;

            let trade = Trade::propose(
                TradeId::generate()?,
                caller,
                &proposer,
                &target,
                message.clone(),
                TimeStamp::new(),
            )?;

            // both offers must still be the ones validated above
            let trade = self.store.transaction(|tx| {
                for offer in [&proposer, &target] {
                    let mut current = tx.offer_at(&offer.id, offer.version)?;
                    current.open_trades.push(trade.id().clone());
                    tx.put_offer(current)?;
                }
                tx.put_trade(trade.clone())
            })?;
            info!(
                trade = %trade.id(),
                proposer = %caller,
                offer_a = %proposer.id,
                offer_b = %target.id,
                "Exchange proposed"
            );

            Ok(trade)
        })
    }

    pub fn accept_proposal(&self, caller: &UserId, trade_id: &TradeId) -> MarketResult<Trade> {
        self.transition(caller, trade_id, TradeAction::Accept)
    }

    pub fn reject_proposal(&self, caller: &UserId, trade_id: &TradeId) -> MarketResult<Trade> {
        self.transition(caller, trade_id, TradeAction::Reject)
    }

    /// Record the caller's confirmation. The second confirmation completes the
    /// trade and both offers in one commit. Repeating a confirmation is a no-op.
    pub fn confirm_exchange(&self, caller: &UserId, trade_id: &TradeId) -> MarketResult<Trade> {
        self.transition(caller, trade_id, TradeAction::Confirm)
    }

    pub fn cancel_exchange(&self, caller: &UserId, trade_id: &TradeId) -> MarketResult<Trade> {
        self.transition(caller, trade_id, TradeAction::Cancel)
    }

    fn transition(
        &self,
        caller: &UserId,
        trade_id: &TradeId,
        action: TradeAction,
    ) -> MarketResult<Trade> {
        retry_on_stale(self.max_conflict_retries, action.as_str(), || {
            let current = self.store.trade(trade_id)?;
            let now = TimeStamp::new();

            let (next, effect) = match current.apply(action, caller, now.clone())? {
                Transition::Unchanged => {
                    debug!(trade = %trade_id, user = %caller, action = action.as_str(), "Nothing to apply");
                    return Ok(current);
                }
                Transition::Changed { trade, offers } => (trade, offers),
            };

            let (stored, superseded) = self.store.transaction(|tx| {
                tx.trade_at(trade_id, current.version())?;
                let superseded = match effect {
                    Some(OfferEffect::Settle) => settle_offers(tx, &next, &now)?,
                    Some(OfferEffect::Release) => {
                        for offer_id in next.offer_ids() {
                            release_offer(tx, offer_id, trade_id)?;
                        }
                        Vec::new()
                    }
                    None => Vec::new(),
                };
                Ok((tx.put_trade(next.clone())?, superseded))
            })?;

            info!(
                trade = %trade_id,
                user = %caller,
                action = action.as_str(),
                status = %stored.status(),
                "Trade updated"
            );
            if effect == Some(OfferEffect::Settle) {
                let [a, b] = stored.offer_ids();
                info!(trade = %trade_id, offer_a = %a, offer_b = %b, "Exchange completed, offers settled");
            }
            for other in &superseded {
                info!(trade = %other, settled_by = %trade_id, "Trade cancelled, offer no longer available");
            }

            Ok(stored)
        })
    }

    pub fn get_trade(&self, trade_id: &TradeId) -> MarketResult<Trade> {
        self.store.trade(trade_id)
    }

    /// All trades, newest first.
    pub fn trades(&self) -> MarketResult<Vec<Trade>> {
        let mut trades = self.store.trades()?;
        trades.sort_by(|a, b| {
            b.created_at()
                .to_datetime_utc()
                .cmp(&a.created_at().to_datetime_utc())
        });
        debug!(count = trades.len(), "Loaded trades");

        Ok(trades)
    }

    /// Resolve the live offer behind one side of a trade. `None` once the
    /// offer has been deleted; the snapshot on the trade is still there.
    pub fn current_offer(&self, trade: &Trade, side: Side) -> MarketResult<Option<Offer>> {
        self.store.find_offer(&trade.side(side).offer_id)
    }

    pub fn incoming_proposals(&self, user: &UserId) -> MarketResult<Vec<Trade>> {
        self.project(user, projections::incoming_proposals)
    }

    pub fn outgoing_proposals(&self, user: &UserId) -> MarketResult<Vec<Trade>> {
        self.project(user, projections::outgoing_proposals)
    }

    pub fn pending_confirmations(&self, user: &UserId) -> MarketResult<Vec<Trade>> {
        self.project(user, projections::pending_confirmations)
    }

    pub fn completed_exchanges(&self, user: &UserId) -> MarketResult<Vec<Trade>> {
        self.project(user, projections::completed_exchanges)
    }

    pub fn user_exchanges(&self, user: &UserId) -> MarketResult<Vec<Trade>> {
        self.project(user, projections::user_exchanges)
    }

    pub fn summary(&self, user: &UserId) -> MarketResult<ExchangeSummary> {
        Ok(ExchangeSummary::for_user(&self.trades()?, user))
    }

    fn project(
        &self,
        user: &UserId,
        view: for<'a> fn(&'a [Trade], &UserId) -> Vec<&'a Trade>,
    ) -> MarketResult<Vec<Trade>> {
        let trades = self.trades()?;
        Ok(view(&trades, user).into_iter().cloned().collect())
    }
}

fn release_offer(
    tx: &StoreTx<'_>,
    offer_id: &OfferId,
    trade_id: &TradeId,
) -> ConflictableTransactionResult<(), MarketError> {
    // open trades pin their offers, so the record is still there
    let mut offer = tx.offer(offer_id)?;
    offer.open_trades.retain(|id| id != trade_id);
    tx.put_offer(offer)?;
    Ok(())
}

/// Complete both offers of `trade` and cancel every other open trade that
/// referenced either of them. Returns the ids of the cancelled trades.
fn settle_offers(
    tx: &StoreTx<'_>,
    trade: &Trade,
    now: &TimeStamp<chrono::Utc>,
) -> ConflictableTransactionResult<Vec<TradeId>, MarketError> {
    let settled = trade.offer_ids();
    let mut superseded: Vec<TradeId> = Vec::new();

    for offer_id in settled {
        let mut offer = tx.offer(offer_id)?;
        if !offer.status.can_settle() {
            return abort(MarketError::invalid_transition(
                format!("complete offer '{offer_id}' for trade '{}'", trade.id()),
                offer.status.as_str(),
            ));
        }
        for other in offer.open_trades.drain(..) {
            if other != *trade.id() && !superseded.contains(&other) {
                superseded.push(other);
            }
        }
        offer.status = OfferStatus::Completed;
        offer.updated_at = now.clone();
        tx.put_offer(offer)?;
    }

    for other_id in &superseded {
        let Some(other) = tx.find_trade(other_id)? else {
            continue;
        };
        let Some(cancelled) = other.supersede(now.clone()) else {
            continue;
        };
        for offer_id in cancelled.offer_ids() {
            if !settled.contains(&offer_id) {
                release_offer(tx, offer_id, other_id)?;
            }
        }
        tx.put_trade(cancelled)?;
    }

    Ok(superseded)
}

/// Offer catalog and trade engine over one store.
pub struct Marketplace {
    pub offers: OfferStore,
    pub trades: TradeEngine,
}

impl Marketplace {
    pub fn new(
        store: Store,
        catalog: Arc<dyn CategoryCatalog + Send + Sync>,
        config: &MarketConfig,
    ) -> Self {
        Self {
            offers: OfferStore::new(
                store.clone(),
                catalog,
                config.media.clone(),
                &config.engine,
            ),
            trades: TradeEngine::new(store, &config.engine),
        }
    }

    pub fn open(
        config: &MarketConfig,
        catalog: Arc<dyn CategoryCatalog + Send + Sync>,
    ) -> MarketResult<Self> {
        config.validate()?;
        let store = Store::open(&config.storage)?;
        Ok(Self::new(store, catalog, config))
    }
}
