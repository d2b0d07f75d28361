//! Per-user read models over the trade collection
//!
//! Pure filters. They never touch storage and are recomputed on every call.
use crate::trade::{Side, Trade, TradeStatus};
use crate::types::UserId;

/// Proposals waiting for `user` to accept or reject.
pub fn incoming_proposals<'a>(trades: &'a [Trade], user: &UserId) -> Vec<&'a Trade> {
    trades
        .iter()
        .filter(|t| t.status() == TradeStatus::Pending && t.side_of(user) == Some(Side::Responder))
        .collect()
}

/// Proposals `user` sent that the counterpart has not answered yet.
pub fn outgoing_proposals<'a>(trades: &'a [Trade], user: &UserId) -> Vec<&'a Trade> {
    trades
        .iter()
        .filter(|t| t.status() == TradeStatus::Pending && t.side_of(user) == Some(Side::Proposer))
        .collect()
}

/// Accepted trades where `user` still owes a confirmation.
pub fn pending_confirmations<'a>(trades: &'a [Trade], user: &UserId) -> Vec<&'a Trade> {
    trades
        .iter()
        .filter(|t| t.status() == TradeStatus::Accepted)
        .filter(|t| matches!(t.side_of(user), Some(side) if !t.is_confirmed(side)))
        .collect()
}

pub fn completed_exchanges<'a>(trades: &'a [Trade], user: &UserId) -> Vec<&'a Trade> {
    trades
        .iter()
        .filter(|t| t.status() == TradeStatus::Completed && t.is_party(user))
        .collect()
}

/// Every trade `user` takes part in, whatever its status.
pub fn user_exchanges<'a>(trades: &'a [Trade], user: &UserId) -> Vec<&'a Trade> {
    trades.iter().filter(|t| t.is_party(user)).collect()
}

/// Dashboard counters for one user.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeSummary {
    pub incoming: usize,
    pub outgoing: usize,
    pub awaiting_confirmation: usize,
    pub completed: usize,
    pub total: usize,
}

impl ExchangeSummary {
    pub fn for_user(trades: &[Trade], user: &UserId) -> Self {
        Self {
            incoming: incoming_proposals(trades, user).len(),
            outgoing: outgoing_proposals(trades, user).len(),
            awaiting_confirmation: pending_confirmations(trades, user).len(),
            completed: completed_exchanges(trades, user).len(),
            total: user_exchanges(trades, user).len(),
        }
    }
}
