//! Trade records and the pure proposal/confirmation state machine
//!
//! Nothing in here touches storage. Every operation takes the current record
//! and returns a [`Transition`] describing the next record and the side effect
//! the engine must commit on the two linked offers, in the same atomic unit.
use crate::error::{MarketError, MarketResult};
use crate::offer::Offer;
use crate::types::{OfferId, TimeStamp, TradeId, UserId};
use crate::utils::digest_cbor;
use chrono::Utc;

/// Cover shown when the offer had no image at proposal time.
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Completed,
    #[n(4)]
    Cancelled,
}

impl TradeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TradeStatus::Rejected | TradeStatus::Completed | TradeStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Proposer,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeAction {
    Accept,
    Reject,
    Confirm,
    Cancel,
}

impl TradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeAction::Accept => "accept",
            TradeAction::Reject => "reject",
            TradeAction::Confirm => "confirm",
            TradeAction::Cancel => "cancel",
        }
    }
}

/// Display copy of an offer taken when the trade was proposed. Never refreshed.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OfferSnapshot {
    #[n(0)]
    pub title: String,
    #[n(1)]
    pub image: String,
    #[n(2)]
    pub owner_id: UserId,
    #[n(3)]
    pub owner_name: String,
}

impl OfferSnapshot {
    pub fn capture(offer: &Offer) -> Self {
        Self {
            title: offer.title.clone(),
            image: offer
                .cover_image()
                .unwrap_or(PLACEHOLDER_IMAGE)
                .to_owned(),
            owner_id: offer.owner.user_id.clone(),
            owner_name: offer.owner.name.clone(),
        }
    }
}

/// One half of a trade: a weak reference to the live offer plus the owned snapshot.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TradeSide {
    #[n(0)]
    pub offer_id: OfferId,
    #[n(1)]
    pub snapshot: OfferSnapshot,
}

impl TradeSide {
    pub fn owner(&self) -> &UserId {
        &self.snapshot.owner_id
    }
}

/// What the engine has to do with both linked offers when committing a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferEffect {
    /// Trade left the open set, drop the reference count.
    Release,
    /// Trade completed, release and mark both offers completed.
    Settle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The action was already applied, nothing to write.
    Unchanged,
    Changed {
        trade: Trade,
        offers: Option<OfferEffect>,
    },
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Trade {
    #[n(0)]
    id: TradeId,
    #[n(1)]
    side_a: TradeSide,
    #[n(2)]
    side_b: TradeSide,
    #[n(3)]
    user_a_confirmed: bool,
    #[n(4)]
    user_b_confirmed: bool,
    #[n(5)]
    status: TradeStatus,
    #[n(6)]
    message: Option<String>,
    #[n(7)]
    created_at: TimeStamp<Utc>,
    #[n(8)]
    updated_at: TimeStamp<Utc>,
    #[n(9)]
    completed_at: Option<TimeStamp<Utc>>,
    #[n(10)]
    snapshot_digest: String, // sha256 of both snapshots at proposal time
    #[n(11)]
    version: u64,
}

impl Trade {
    /// Build a `pending` proposal from two live offers. `caller` must own `proposer`.
    pub fn propose(
        id: TradeId,
        caller: &UserId,
        proposer: &Offer,
        target: &Offer,
        message: Option<String>,
        now: TimeStamp<Utc>,
    ) -> MarketResult<Trade> {
        for offer in [proposer, target] {
            if !offer.status.is_tradeable() {
                return Err(MarketError::Validation(format!(
                    "offer '{}' is {} and cannot be traded",
                    offer.id,
                    offer.status.as_str()
                )));
            }
        }
        if !proposer.is_owned_by(caller) {
            return Err(MarketError::Forbidden(format!(
                "'{caller}' does not own offer '{}'",
                proposer.id
            )));
        }
        if proposer.owner_id() == target.owner_id() {
            return Err(MarketError::SelfTrade(
                proposer.id.to_string(),
                target.id.to_string(),
            ));
        }

        let side_a = TradeSide {
            offer_id: proposer.id.clone(),
            snapshot: OfferSnapshot::capture(proposer),
        };
        let side_b = TradeSide {
            offer_id: target.id.clone(),
            snapshot: OfferSnapshot::capture(target),
        };
        let snapshot_digest = snapshot_digest(&side_a.snapshot, &side_b.snapshot)?;
        let message = message
            .map(|m| m.trim().to_owned())
            .filter(|m| !m.is_empty());

        Ok(Trade {
            id,
            side_a,
            side_b,
            user_a_confirmed: false,
            user_b_confirmed: false,
            status: TradeStatus::Pending,
            message,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
            snapshot_digest,
            version: 0,
        })
    }

    /// Derive the next state for `action` performed by `caller`.
    pub fn apply(
        &self,
        action: TradeAction,
        caller: &UserId,
        now: TimeStamp<Utc>,
    ) -> MarketResult<Transition> {
        let side = self.side_of(caller).ok_or_else(|| {
            MarketError::Forbidden(format!("'{caller}' is not a party to trade '{}'", self.id))
        })?;

        match action {
            TradeAction::Accept | TradeAction::Reject => {
                if side != Side::Responder {
                    return Err(MarketError::Forbidden(format!(
                        "only the responder may {} trade '{}'",
                        action.as_str(),
                        self.id
                    )));
                }
                self.expect_status(action, &[TradeStatus::Pending])?;

                let status = if action == TradeAction::Accept {
                    TradeStatus::Accepted
                } else {
                    TradeStatus::Rejected
                };
                Ok(self.transition_to(status, now))
            }
            TradeAction::Confirm => {
                // confirming again is a no-op, even once the other side closed the trade
                if self.is_confirmed(side)
                    && matches!(self.status, TradeStatus::Accepted | TradeStatus::Completed)
                {
                    return Ok(Transition::Unchanged);
                }
                self.expect_status(action, &[TradeStatus::Accepted])?;

                let mut next = self.clone();
                match side {
                    Side::Proposer => next.user_a_confirmed = true,
                    Side::Responder => next.user_b_confirmed = true,
                }
                next.updated_at = now.clone();

                if next.user_a_confirmed && next.user_b_confirmed {
                    next.status = TradeStatus::Completed;
                    next.completed_at = Some(now);
                    return Ok(Transition::Changed {
                        trade: next,
                        offers: Some(OfferEffect::Settle),
                    });
                }

                Ok(Transition::Changed {
                    trade: next,
                    offers: None,
                })
            }
            TradeAction::Cancel => {
                self.expect_status(action, &[TradeStatus::Pending, TradeStatus::Accepted])?;
                Ok(self.transition_to(TradeStatus::Cancelled, now))
            }
        }
    }

    fn expect_status(&self, action: TradeAction, allowed: &[TradeStatus]) -> MarketResult<()> {
        if allowed.contains(&self.status) {
            return Ok(());
        }
        Err(MarketError::invalid_transition(
            format!("{} trade '{}'", action.as_str(), self.id),
            self.status.as_str(),
        ))
    }

    fn transition_to(&self, status: TradeStatus, now: TimeStamp<Utc>) -> Transition {
        let mut next = self.clone();
        next.status = status;
        next.updated_at = now;

        let offers = status.is_terminal().then_some(OfferEffect::Release);
        Transition::Changed {
            trade: next,
            offers,
        }
    }

    /// Cancel on behalf of no party, because one of the linked offers was
    /// settled by another trade. `None` when the trade is already closed.
    pub fn supersede(&self, now: TimeStamp<Utc>) -> Option<Trade> {
        if self.status.is_terminal() {
            return None;
        }
        let mut next = self.clone();
        next.status = TradeStatus::Cancelled;
        next.updated_at = now;
        Some(next)
    }

    pub fn side_of(&self, user: &UserId) -> Option<Side> {
        if self.side_a.owner() == user {
            Some(Side::Proposer)
        } else if self.side_b.owner() == user {
            Some(Side::Responder)
        } else {
            None
        }
    }

    pub fn is_party(&self, user: &UserId) -> bool {
        self.side_of(user).is_some()
    }

    pub fn is_confirmed(&self, side: Side) -> bool {
        match side {
            Side::Proposer => self.user_a_confirmed,
            Side::Responder => self.user_b_confirmed,
        }
    }

    pub fn side(&self, side: Side) -> &TradeSide {
        match side {
            Side::Proposer => &self.side_a,
            Side::Responder => &self.side_b,
        }
    }

    /// Recompute the snapshot digest and compare it with the one taken at proposal.
    pub fn verify_snapshots(&self) -> MarketResult<bool> {
        let digest = snapshot_digest(&self.side_a.snapshot, &self.side_b.snapshot)?;
        Ok(digest == self.snapshot_digest)
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn id(&self) -> &TradeId {
        &self.id
    }
    pub fn proposer(&self) -> &TradeSide {
        &self.side_a
    }
    pub fn responder(&self) -> &TradeSide {
        &self.side_b
    }
    pub fn offer_ids(&self) -> [&OfferId; 2] {
        [&self.side_a.offer_id, &self.side_b.offer_id]
    }
    pub fn user_a_confirmed(&self) -> bool {
        self.user_a_confirmed
    }
    pub fn user_b_confirmed(&self) -> bool {
        self.user_b_confirmed
    }
    pub fn status(&self) -> TradeStatus {
        self.status
    }
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }
    pub fn completed_at(&self) -> Option<&TimeStamp<Utc>> {
        self.completed_at.as_ref()
    }
    pub fn snapshot_digest(&self) -> &str {
        &self.snapshot_digest
    }
    pub fn version(&self) -> u64 {
        self.version
    }
}

fn snapshot_digest(a: &OfferSnapshot, b: &OfferSnapshot) -> MarketResult<String> {
    digest_cbor(&(a, b))
        .map(|(hash, _)| hash)
        .map_err(|e| MarketError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::{Condition, Location, OfferDraft, OfferStatus, OwnerProfile};

    fn offer(id: &str, owner: &str, status: OfferStatus) -> Offer {
        let fields = OfferDraft::new()
            .set_title(format!("{id} title"))
            .set_description("desc")
            .set_category("category_tech")
            .set_condition(Condition::Excellent)
            .set_location(Location::new("CDMX"))
            .add_image(format!("https://img.example/{id}.png"))
            .into_fields(3)
            .unwrap();
        let owner = OwnerProfile {
            user_id: UserId::new(owner),
            name: owner.to_uppercase(),
            avatar: None,
            rating: None,
        };
        Offer::new(OfferId::new(id), owner, fields, status, TimeStamp::new())
    }

    fn pending() -> Trade {
        Trade::propose(
            TradeId::new("trade_1"),
            &UserId::new("alice"),
            &offer("offer_a", "alice", OfferStatus::Published),
            &offer("offer_b", "bob", OfferStatus::Published),
            Some("  swap?  ".into()),
            TimeStamp::new(),
        )
        .unwrap()
    }

    fn changed(transition: Transition) -> (Trade, Option<OfferEffect>) {
        match transition {
            Transition::Changed { trade, offers } => (trade, offers),
            Transition::Unchanged => panic!("expected a state change"),
        }
    }

    #[test]
    fn proposal_snapshots_both_offers() {
        let trade = pending();

        assert_eq!(trade.status(), TradeStatus::Pending);
        assert!(!trade.user_a_confirmed() && !trade.user_b_confirmed());
        assert_eq!(trade.proposer().snapshot.title, "offer_a title");
        assert_eq!(trade.responder().snapshot.owner_name, "BOB");
        assert_eq!(trade.message(), Some("swap?"));
        assert!(trade.verify_snapshots().unwrap());
    }

    #[test]
    fn missing_cover_uses_placeholder() {
        let mut bare = offer("offer_a", "alice", OfferStatus::Published);
        bare.images.clear();
        assert_eq!(OfferSnapshot::capture(&bare).image, PLACEHOLDER_IMAGE);
    }

    #[test]
    fn only_responder_accepts() {
        let trade = pending();
        let err = trade
            .apply(TradeAction::Accept, &UserId::new("alice"), TimeStamp::new())
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let err = trade
            .apply(TradeAction::Accept, &UserId::new("mallory"), TimeStamp::new())
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[test]
    fn confirm_flow_settles_offers() {
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        let (trade, _) = changed(pending().apply(TradeAction::Accept, &bob, TimeStamp::new()).unwrap());
        let (trade, effect) =
            changed(trade.apply(TradeAction::Confirm, &alice, TimeStamp::new()).unwrap());
        assert_eq!(effect, None);
        assert_eq!(trade.status(), TradeStatus::Accepted);

        assert_eq!(
            trade.apply(TradeAction::Confirm, &alice, TimeStamp::new()).unwrap(),
            Transition::Unchanged
        );

        let (trade, effect) =
            changed(trade.apply(TradeAction::Confirm, &bob, TimeStamp::new()).unwrap());
        assert_eq!(effect, Some(OfferEffect::Settle));
        assert_eq!(trade.status(), TradeStatus::Completed);
        assert!(trade.completed_at().is_some());
    }

    #[test]
    fn confirm_requires_acceptance() {
        let err = pending()
            .apply(TradeAction::Confirm, &UserId::new("alice"), TimeStamp::new())
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[test]
    fn cancel_releases_offers() {
        let (trade, effect) = changed(
            pending()
                .apply(TradeAction::Cancel, &UserId::new("alice"), TimeStamp::new())
                .unwrap(),
        );
        assert_eq!(trade.status(), TradeStatus::Cancelled);
        assert_eq!(effect, Some(OfferEffect::Release));
    }

    #[test]
    fn supersede_closes_open_trades_only() {
        let trade = pending();
        let cancelled = trade.supersede(TimeStamp::new()).unwrap();
        assert_eq!(cancelled.status(), TradeStatus::Cancelled);
        assert!(cancelled.supersede(TimeStamp::new()).is_none());
    }

    #[test]
    fn trade_encoding() {
        let original = pending();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: Trade = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }
}
