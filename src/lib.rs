//! Offer catalog and bilateral exchange engine for a bartering marketplace.
//!
//! Users list items as [`offer::Offer`]s and negotiate two-sided swaps as
//! [`trade::Trade`]s. A trade is proposed, accepted or rejected by the
//! counterpart, then confirmed by both sides; the second confirmation
//! completes the trade and both offers in one atomic commit.

pub mod boundary;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod offer;
pub mod offer_store;
pub mod projections;
pub mod service;
pub mod store;
pub mod trade;
pub mod types;
pub mod utils;
pub mod wire;

pub use error::{ErrorKind, MarketError, MarketResult};
pub use service::{Marketplace, TradeEngine};
