//! Offer catalog: authoring, owner edits, lifecycle and browse views
use crate::boundary::{CategoryCatalog, Identity, MediaStore};
use crate::config::{EngineConfig, MediaLimits};
use crate::error::{MarketError, MarketResult};
use crate::media::{self, ImageUpload};
use crate::offer::{Offer, OfferDraft, OfferPatch, OfferStatus};
use crate::store::{Store, retry_on_stale};
use crate::types::{CategoryId, OfferId, TimeStamp, UserId};
use sled::transaction::abort;
use std::sync::Arc;
use tracing::{debug, info};

pub struct OfferStore {
    store: Store,
    catalog: Arc<dyn CategoryCatalog + Send + Sync>,
    limits: MediaLimits,
    max_conflict_retries: u32,
}

impl OfferStore {
    pub fn new(
        store: Store,
        catalog: Arc<dyn CategoryCatalog + Send + Sync>,
        limits: MediaLimits,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            limits,
            max_conflict_retries: engine.max_conflict_retries,
        }
    }

    /// Author a new offer, published straight away when `publish` is set.
    pub fn create_offer(
        &self,
        owner: &Identity,
        draft: OfferDraft,
        publish: bool,
    ) -> MarketResult<Offer> {
        let fields = draft.into_fields(self.limits.max_images_per_offer)?;
        self.check_category(&fields.category)?;

        let status = if publish {
            OfferStatus::Published
        } else {
            OfferStatus::Draft
        };
        let offer = Offer::new(
            OfferId::generate()?,
            owner.profile(),
            fields,
            status,
            TimeStamp::new(),
        );

        let offer = self
            .store
            .transaction(|tx| tx.put_offer(offer.clone()))?;
        info!(offer = %offer.id, owner = %owner.user_id, %status, "Offer created");

        Ok(offer)
    }

    /// Author an offer from raw image uploads. The batch is checked against the
    /// media limits and stored before the offer is written; a rejected batch
    /// stores nothing.
    pub fn create_offer_with_uploads(
        &self,
        owner: &Identity,
        mut draft: OfferDraft,
        uploads: &[(ImageUpload, Vec<u8>)],
        media_store: &dyn MediaStore,
        publish: bool,
    ) -> MarketResult<Offer> {
        let total = draft.images.len() + uploads.len();
        if total > self.limits.max_images_per_offer {
            return Err(MarketError::Validation(format!(
                "at most {} images are allowed, got {total}",
                self.limits.max_images_per_offer
            )));
        }

        let refs = media::upload_images(media_store, uploads, &self.limits)?;
        draft.images.extend(refs);

        self.create_offer(owner, draft, publish)
    }

    /// Owner-only edit. A status in the patch must follow the offer lifecycle.
    pub fn update_offer(
        &self,
        caller: &UserId,
        id: &OfferId,
        patch: OfferPatch,
    ) -> MarketResult<Offer> {
        if let Some(category) = &patch.category {
            self.check_category(category)?;
        }

        retry_on_stale(self.max_conflict_retries, "update_offer", || {
            let current = self.owned_offer(caller, id)?;
            let next = current.apply_patch(
                patch.clone(),
                self.limits.max_images_per_offer,
                TimeStamp::new(),
            )?;

            let stored = self.store.transaction(|tx| {
                tx.offer_at(id, current.version)?;
                tx.put_offer(next.clone())
            })?;
            if stored.status != current.status {
                info!(offer = %id, from = %current.status, to = %stored.status, "Offer status changed");
            } else {
                debug!(offer = %id, "Offer edited");
            }

            Ok(stored)
        })
    }

    pub fn set_status(
        &self,
        caller: &UserId,
        id: &OfferId,
        status: OfferStatus,
    ) -> MarketResult<Offer> {
        self.update_offer(caller, id, OfferPatch::status(status))
    }

    /// Owner-only removal. Offers still referenced by an open trade are kept.
    pub fn delete_offer(&self, caller: &UserId, id: &OfferId) -> MarketResult<()> {
        retry_on_stale(self.max_conflict_retries, "delete_offer", || {
            let current = self.owned_offer(caller, id)?;

            self.store.transaction(|tx| {
                let offer = tx.offer_at(id, current.version)?;
                if !offer.open_trades.is_empty() {
                    return abort(MarketError::Conflict(format!(
                        "offer '{id}' is referenced by {} open trade(s)",
                        offer.open_trades.len()
                    )));
                }
                tx.remove_offer(id)
            })?;
            info!(offer = %id, owner = %caller, "Offer deleted");

            Ok(())
        })
    }

    pub fn get_offer_by_id(&self, id: &OfferId) -> MarketResult<Offer> {
        self.store.offer(id)
    }

    /// Every offer of one owner, whatever its status, newest first.
    pub fn get_offers_by_owner(&self, owner: &UserId) -> MarketResult<Vec<Offer>> {
        self.filtered(|offer| offer.is_owned_by(owner))
    }

    /// Offers open for trading, newest first.
    pub fn get_published_offers(&self) -> MarketResult<Vec<Offer>> {
        self.filtered(|offer| offer.status == OfferStatus::Published)
    }

    pub fn get_offers_by_category(&self, category: &CategoryId) -> MarketResult<Vec<Offer>> {
        self.filtered(|offer| offer.status == OfferStatus::Published && offer.category == *category)
    }

    pub fn category_name(&self, offer: &Offer) -> Option<String> {
        self.catalog.category_name(&offer.category)
    }

    pub fn record_view(&self, id: &OfferId) -> MarketResult<Offer> {
        self.bump_counter(id, "record_view", |offer| offer.views += 1)
    }

    pub fn record_favorite(&self, id: &OfferId) -> MarketResult<Offer> {
        self.bump_counter(id, "record_favorite", |offer| offer.favorites += 1)
    }

    // counters are not owner edits, updated_at stays put
    fn bump_counter(
        &self,
        id: &OfferId,
        operation: &str,
        bump: impl Fn(&mut Offer),
    ) -> MarketResult<Offer> {
        retry_on_stale(self.max_conflict_retries, operation, || {
            let current = self.store.offer(id)?;
            let mut next = current.clone();
            bump(&mut next);

            self.store.transaction(|tx| {
                tx.offer_at(id, current.version)?;
                tx.put_offer(next.clone())
            })
        })
    }

    fn owned_offer(&self, caller: &UserId, id: &OfferId) -> MarketResult<Offer> {
        let offer = self.store.offer(id)?;
        if !offer.is_owned_by(caller) {
            return Err(MarketError::Forbidden(format!(
                "'{caller}' does not own offer '{id}'"
            )));
        }
        Ok(offer)
    }

    fn check_category(&self, category: &CategoryId) -> MarketResult<()> {
        if self.catalog.contains(category) {
            return Ok(());
        }
        Err(MarketError::Validation(format!(
            "unknown category '{category}'"
        )))
    }

    fn filtered(&self, keep: impl Fn(&Offer) -> bool) -> MarketResult<Vec<Offer>> {
        let mut offers: Vec<Offer> = self.store.offers()?.into_iter().filter(|o| keep(o)).collect();
        offers.sort_by(|a, b| {
            b.created_at
                .to_datetime_utc()
                .cmp(&a.created_at.to_datetime_utc())
        });
        debug!(count = offers.len(), "Listed offers");

        Ok(offers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::StaticCatalog;
    use crate::config::StorageConfig;
    use crate::offer::{Condition, Location};

    fn offer_store() -> OfferStore {
        offer_store_with(&EngineConfig::default())
    }

    fn offer_store_with(engine: &EngineConfig) -> OfferStore {
        let store = Store::open(&StorageConfig {
            path: std::env::temp_dir().join(format!("offer_store_{}", uuid7::uuid7())),
            temporary: true,
        })
        .unwrap();
        let catalog = StaticCatalog::new().with_category("category_tech", "Tecnología");
        OfferStore::new(
            store,
            Arc::new(catalog),
            MediaLimits::default(),
            engine,
        )
    }

    fn draft() -> OfferDraft {
        OfferDraft::new()
            .set_title("MacBook Pro 2021")
            .set_description("Includes original charger")
            .set_category("category_tech")
            .set_condition(Condition::Excellent)
            .set_location(Location::new("Ciudad de México"))
            .add_image("/macbook-pro-laptop.png")
    }

    #[test]
    fn create_and_publish() {
        let offers = offer_store();
        let carlos = Identity::new("user_carlos", "Carlos Mendoza");

        let draft_offer = offers.create_offer(&carlos, draft(), false).unwrap();
        assert_eq!(draft_offer.status, OfferStatus::Draft);
        assert_eq!(draft_offer.version, 1);
        assert!(offers.get_published_offers().unwrap().is_empty());

        let published = offers
            .set_status(&carlos.user_id, &draft_offer.id, OfferStatus::Published)
            .unwrap();
        assert_eq!(published.status, OfferStatus::Published);
        assert_eq!(offers.get_published_offers().unwrap().len(), 1);
        assert_eq!(
            offers.category_name(&published),
            Some("Tecnología".to_string())
        );
    }

    struct MemoryMedia {
        stored: std::sync::Mutex<Vec<String>>,
    }

    impl MediaStore for MemoryMedia {
        fn store(&self, upload: &ImageUpload, _bytes: &[u8]) -> MarketResult<String> {
            let url = format!("/uploads/{}", upload.file_name);
            self.stored.lock().unwrap().push(url.clone());
            Ok(url)
        }
    }

    #[test]
    fn uploads_are_checked_before_authoring() {
        let offers = offer_store();
        let carlos = Identity::new("user_carlos", "Carlos");
        let media = MemoryMedia {
            stored: std::sync::Mutex::new(vec![]),
        };
        let bare = OfferDraft {
            images: vec![],
            ..draft()
        };

        let oversized = [(
            ImageUpload::new("huge.png", "image/png", 6 * 1024 * 1024),
            vec![0u8; 4],
        )];
        let err = offers
            .create_offer_with_uploads(&carlos, bare.clone(), &oversized, &media, true)
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        let svg = [(ImageUpload::new("logo.svg", "image/svg+xml", 10), vec![0u8; 4])];
        assert!(offers
            .create_offer_with_uploads(&carlos, bare.clone(), &svg, &media, true)
            .is_err());
        assert!(media.stored.lock().unwrap().is_empty());
        assert!(offers.get_offers_by_owner(&carlos.user_id).unwrap().is_empty());

        let photos = [
            (ImageUpload::new("front.jpg", "image/jpeg", 2048), vec![0u8; 4]),
            (ImageUpload::new("back.webp", "image/webp", 4096), vec![0u8; 4]),
        ];
        let offer = offers
            .create_offer_with_uploads(&carlos, bare, &photos, &media, true)
            .unwrap();
        assert_eq!(offer.images, vec!["/uploads/front.jpg", "/uploads/back.webp"]);
        assert_eq!(offer.cover_image(), Some("/uploads/front.jpg"));
    }

    #[test]
    fn uploads_count_against_existing_images() {
        let offers = offer_store();
        let carlos = Identity::new("user_carlos", "Carlos");
        let media = MemoryMedia {
            stored: std::sync::Mutex::new(vec![]),
        };
        let photos: Vec<_> = (0..3)
            .map(|i| (ImageUpload::new(format!("{i}.png"), "image/png", 10), vec![0u8]))
            .collect();

        // the draft already carries one image
        let err = offers
            .create_offer_with_uploads(&carlos, draft(), &photos, &media, true)
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
        assert!(media.stored.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_category_rejected() {
        let offers = offer_store();
        let carlos = Identity::new("user_carlos", "Carlos");

        let err = offers
            .create_offer(&carlos, draft().set_category("category_food"), true)
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[test]
    fn only_owner_edits() {
        let offers = offer_store();
        let carlos = Identity::new("user_carlos", "Carlos");
        let offer = offers.create_offer(&carlos, draft(), true).unwrap();

        let err = offers
            .set_status(&UserId::new("user_ana"), &offer.id, OfferStatus::Paused)
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let err = offers
            .set_status(&carlos.user_id, &offer.id, OfferStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[test]
    fn counters_only_grow() {
        let offers = offer_store();
        let carlos = Identity::new("user_carlos", "Carlos");
        let offer = offers.create_offer(&carlos, draft(), true).unwrap();

        offers.record_view(&offer.id).unwrap();
        offers.record_view(&offer.id).unwrap();
        let offer = offers.record_favorite(&offer.id).unwrap();

        assert_eq!(offer.views, 2);
        assert_eq!(offer.favorites, 1);
    }

    #[test]
    fn concurrent_views_are_all_counted() {
        // plenty of headroom, every stale read is retried
        let offers = offer_store_with(&EngineConfig {
            max_conflict_retries: 1_000,
        });
        let carlos = Identity::new("user_carlos", "Carlos");
        let offer = offers.create_offer(&carlos, draft(), true).unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..10 {
                        offers.record_view(&offer.id).unwrap();
                    }
                });
            }
        });

        let offer = offers.get_offer_by_id(&offer.id).unwrap();
        assert_eq!(offer.views, 40);
        assert_eq!(offer.version, 41);
    }

    #[test]
    fn delete_unreferenced_offer() {
        let offers = offer_store();
        let carlos = Identity::new("user_carlos", "Carlos");
        let offer = offers.create_offer(&carlos, draft(), true).unwrap();

        offers.delete_offer(&carlos.user_id, &offer.id).unwrap();
        assert!(matches!(
            offers.get_offer_by_id(&offer.id),
            Err(MarketError::NotFound { .. })
        ));
    }
}
