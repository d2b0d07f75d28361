//! Persistence boundary backed by sled
//!
//! Offers and trades live in two trees keyed by id, values are CBOR. All
//! writes go through [`Store::transaction`], which runs a closure over both
//! trees atomically. Records carry a `version` so callers can guard a
//! read-modify-write against concurrent updates with [`StoreTx::offer_at`]
//! and [`StoreTx::trade_at`].
use crate::config::StorageConfig;
use crate::error::{MarketError, MarketResult};
use crate::offer::Offer;
use crate::trade::Trade;
use crate::types::{OfferId, TradeId};
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionResult, TransactionError, TransactionalTree, abort,
};
use std::sync::Arc;
use tracing::{debug, warn};

const OFFERS_TREE: &str = "offers";
const TRADES_TREE: &str = "trades";

#[derive(Clone)]
pub struct Store {
    instance: Arc<sled::Db>,
    offers: sled::Tree,
    trades: sled::Tree,
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> MarketResult<Self> {
        let offers = instance.open_tree(OFFERS_TREE)?;
        let trades = instance.open_tree(TRADES_TREE)?;

        Ok(Self {
            instance,
            offers,
            trades,
        })
    }

    pub fn open(config: &StorageConfig) -> MarketResult<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary)
            .open()?;
        debug!(path = %config.path.display(), temporary = config.temporary, "Opened store");

        Self::new(Arc::new(db))
    }

    pub fn find_offer(&self, id: &OfferId) -> MarketResult<Option<Offer>> {
        match self.offers.get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn offer(&self, id: &OfferId) -> MarketResult<Offer> {
        self.find_offer(id)?
            .ok_or_else(|| MarketError::offer_not_found(id.as_str()))
    }

    pub fn offers(&self) -> MarketResult<Vec<Offer>> {
        self.offers
            .iter()
            .values()
            .map(|bytes| -> MarketResult<Offer> { Ok(minicbor::decode(&bytes?)?) })
            .collect()
    }

    pub fn find_trade(&self, id: &TradeId) -> MarketResult<Option<Trade>> {
        match self.trades.get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn trade(&self, id: &TradeId) -> MarketResult<Trade> {
        self.find_trade(id)?
            .ok_or_else(|| MarketError::trade_not_found(id.as_str()))
    }

    pub fn trades(&self) -> MarketResult<Vec<Trade>> {
        self.trades
            .iter()
            .values()
            .map(|bytes| -> MarketResult<Trade> { Ok(minicbor::decode(&bytes?)?) })
            .collect()
    }

    /// Run `f` atomically over both trees. Returning `Err` from `f` via
    /// [`abort`] discards every write made inside it.
    pub fn transaction<T, F>(&self, f: F) -> MarketResult<T>
    where
        F: Fn(&StoreTx<'_>) -> ConflictableTransactionResult<T, MarketError>,
    {
        (&self.offers, &self.trades)
            .transaction(|(offers, trades)| f(&StoreTx { offers, trades }))
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => MarketError::Storage(e),
            })
    }

    pub fn flush(&self) -> MarketResult<()> {
        self.instance.flush()?;
        Ok(())
    }
}

/// Both trees as seen from inside one transaction.
pub struct StoreTx<'a> {
    offers: &'a TransactionalTree,
    trades: &'a TransactionalTree,
}

impl StoreTx<'_> {
    pub fn find_offer(&self, id: &OfferId) -> ConflictableTransactionResult<Option<Offer>, MarketError> {
        match self.offers.get(id.as_str().as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn offer(&self, id: &OfferId) -> ConflictableTransactionResult<Offer, MarketError> {
        match self.find_offer(id)? {
            Some(offer) => Ok(offer),
            None => abort(MarketError::offer_not_found(id.as_str())),
        }
    }

    /// Read an offer and fail with `Conflict` unless it is still at `version`.
    pub fn offer_at(
        &self,
        id: &OfferId,
        version: u64,
    ) -> ConflictableTransactionResult<Offer, MarketError> {
        let offer = self.offer(id)?;
        if offer.version != version {
            return abort(MarketError::StaleVersion(id.to_string()));
        }
        Ok(offer)
    }

    /// Write an offer, bumping its version. Returns the stored record.
    pub fn put_offer(&self, mut offer: Offer) -> ConflictableTransactionResult<Offer, MarketError> {
        offer.version += 1;
        self.offers
            .insert(offer.id.as_str().as_bytes(), encode(&offer)?)?;
        Ok(offer)
    }

    pub fn remove_offer(&self, id: &OfferId) -> ConflictableTransactionResult<(), MarketError> {
        self.offers.remove(id.as_str().as_bytes())?;
        Ok(())
    }

    pub fn find_trade(&self, id: &TradeId) -> ConflictableTransactionResult<Option<Trade>, MarketError> {
        match self.trades.get(id.as_str().as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Read a trade and fail with `Conflict` unless it is still at `version`.
    pub fn trade_at(
        &self,
        id: &TradeId,
        version: u64,
    ) -> ConflictableTransactionResult<Trade, MarketError> {
        let trade = match self.find_trade(id)? {
            Some(trade) => trade,
            None => return abort(MarketError::trade_not_found(id.as_str())),
        };
        if trade.version() != version {
            return abort(MarketError::StaleVersion(id.to_string()));
        }
        Ok(trade)
    }

    /// Write a trade, bumping its version. Returns the stored record.
    pub fn put_trade(&self, mut trade: Trade) -> ConflictableTransactionResult<Trade, MarketError> {
        trade.bump_version();
        self.trades
            .insert(trade.id().as_str().as_bytes(), encode(&trade)?)?;
        Ok(trade)
    }
}

/// Re-run `op` while it fails with a stale version, at most `max_retries` extra times.
pub(crate) fn retry_on_stale<T>(
    max_retries: u32,
    operation: &str,
    mut op: impl FnMut() -> MarketResult<T>,
) -> MarketResult<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                warn!(operation, attempt, error = %e, "Retrying after concurrent update");
            }
            Err(e) if e.is_retryable() => {
                warn!(operation, attempts = attempt + 1, "Giving up after repeated conflicts");
                return Err(e);
            }
            result => return result,
        }
    }
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> ConflictableTransactionResult<Vec<u8>, MarketError> {
    match minicbor::to_vec(value) {
        Ok(bytes) => Ok(bytes),
        Err(e) => abort(MarketError::Encode(e.to_string())),
    }
}

fn decode<T>(bytes: &[u8]) -> ConflictableTransactionResult<T, MarketError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match minicbor::decode(bytes) {
        Ok(value) => Ok(value),
        Err(e) => abort(MarketError::Decode(e)),
    }
}
