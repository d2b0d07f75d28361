//! Offer records, their lifecycle and the draft/patch inputs used to author them
use crate::error::{MarketError, MarketResult};
use crate::types::{CategoryId, OfferId, TimeStamp, TradeId, UserId};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    #[n(0)]
    New,
    #[n(1)]
    Excellent,
    #[n(2)]
    Good,
    #[n(3)]
    Fair,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfferStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Published,
    #[n(2)]
    Paused,
    #[n(3)]
    Completed,
}

impl OfferStatus {
    /// Transitions an owner may request directly. `Completed` is only ever
    /// reached through a settled trade, see [`OfferStatus::can_settle`].
    pub fn check_user_transition(self, to: OfferStatus) -> MarketResult<()> {
        use OfferStatus::*;

        match (self, to) {
            (Draft, Published) | (Published, Paused) | (Paused, Published) => Ok(()),
            (from, to) => Err(MarketError::invalid_transition(
                format!("move offer to {}", to.as_str()),
                from.as_str(),
            )),
        }
    }

    /// Whether a completing trade may mark an offer in this state as completed.
    /// Paused offers are included: the owner paused the listing after agreeing
    /// to the swap, which should not block the swap from closing.
    pub fn can_settle(self) -> bool {
        matches!(self, OfferStatus::Published | OfferStatus::Paused)
    }

    pub fn is_tradeable(self) -> bool {
        self == OfferStatus::Published
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    #[n(0)]
    pub latitude: f64,
    #[n(1)]
    pub longitude: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Location {
    #[n(0)]
    pub label: String,
    #[n(1)]
    pub coordinates: Option<Coordinates>,
}

impl Location {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            coordinates: None,
        }
    }
    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.coordinates = Some(Coordinates {
            latitude,
            longitude,
        });
        self
    }
}

/// Denormalized copy of the owner's display fields. Not authoritative, the
/// identity provider is.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct OwnerProfile {
    #[n(0)]
    pub user_id: UserId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub avatar: Option<String>,
    #[n(3)]
    pub rating: Option<f32>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Offer {
    #[n(0)]
    pub id: OfferId,
    #[n(1)]
    pub title: String,
    #[n(2)]
    pub description: String,
    #[n(3)]
    pub category: CategoryId,
    #[n(4)]
    pub condition: Condition,
    #[n(5)]
    pub location: Location,
    #[n(6)]
    pub images: Vec<String>, // ordered, first one is the cover
    #[n(7)]
    pub owner: OwnerProfile,
    #[n(8)]
    pub status: OfferStatus,
    #[n(9)]
    pub views: u64,
    #[n(10)]
    pub favorites: u64,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
    #[n(12)]
    pub updated_at: TimeStamp<Utc>,
    #[n(13)]
    pub open_trades: Vec<TradeId>, // non-terminal trades referencing this offer
    #[n(14)]
    pub version: u64,
}

impl Offer {
    pub fn new(
        id: OfferId,
        owner: OwnerProfile,
        fields: OfferFields,
        status: OfferStatus,
        now: TimeStamp<Utc>,
    ) -> Self {
        Self {
            id,
            title: fields.title,
            description: fields.description,
            category: fields.category,
            condition: fields.condition,
            location: fields.location,
            images: fields.images,
            owner,
            status,
            views: 0,
            favorites: 0,
            created_at: now.clone(),
            updated_at: now,
            open_trades: Vec::new(),
            version: 0,
        }
    }

    pub fn owner_id(&self) -> &UserId {
        &self.owner.user_id
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.owner.user_id == *user
    }

    pub fn cover_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    pub fn fields(&self) -> OfferFields {
        OfferFields {
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            condition: self.condition,
            location: self.location.clone(),
            images: self.images.clone(),
        }
    }

    /// Apply an owner edit, returning the edited copy. Status changes go
    /// through the lifecycle check and the edited fields are re-validated.
    pub fn apply_patch(
        &self,
        patch: OfferPatch,
        max_images: usize,
        now: TimeStamp<Utc>,
    ) -> MarketResult<Offer> {
        if self.status == OfferStatus::Completed {
            return Err(MarketError::invalid_transition(
                "edit offer",
                OfferStatus::Completed.as_str(),
            ));
        }

        let mut next = self.clone();
        if let Some(title) = patch.title {
            next.title = title;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(category) = patch.category {
            next.category = category;
        }
        if let Some(condition) = patch.condition {
            next.condition = condition;
        }
        if let Some(location) = patch.location {
            next.location = location;
        }
        if let Some(images) = patch.images {
            next.images = images;
        }
        if let Some(status) = patch.status {
            if status != self.status {
                self.status.check_user_transition(status)?;
                next.status = status;
            }
        }

        next.fields().validate(max_images)?;
        next.updated_at = now;

        Ok(next)
    }
}

/// The validated, owner-authored part of an offer.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferFields {
    pub title: String,
    pub description: String,
    pub category: CategoryId,
    pub condition: Condition,
    pub location: Location,
    pub images: Vec<String>,
}

impl OfferFields {
    pub fn validate(&self, max_images: usize) -> MarketResult<()> {
        if self.title.trim().is_empty() {
            return Err(MarketError::Validation("title is required".into()));
        }
        if self.description.trim().is_empty() {
            return Err(MarketError::Validation("description is required".into()));
        }
        if self.category.as_str().trim().is_empty() {
            return Err(MarketError::Validation("category is required".into()));
        }
        if self.location.label.trim().is_empty() {
            return Err(MarketError::Validation("location is required".into()));
        }
        if let Some(coordinates) = &self.location.coordinates {
            if !coordinates.is_valid() {
                return Err(MarketError::Validation(format!(
                    "coordinates out of range: {}, {}",
                    coordinates.latitude, coordinates.longitude
                )));
            }
        }
        if self.images.is_empty() {
            return Err(MarketError::Validation(
                "at least one image is required".into(),
            ));
        }
        if self.images.len() > max_images {
            return Err(MarketError::Validation(format!(
                "at most {max_images} images are allowed, got {}",
                self.images.len()
            )));
        }
        if self.images.iter().any(|image| image.trim().is_empty()) {
            return Err(MarketError::Validation("image reference is blank".into()));
        }

        Ok(())
    }
}

// Used for authoring new offers
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OfferDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<CategoryId>,
    pub condition: Option<Condition>,
    pub location: Option<Location>,
    pub images: Vec<String>,
}

impl OfferDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
    pub fn set_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
    pub fn set_category(mut self, category: impl Into<CategoryId>) -> Self {
        self.category = Some(category.into());
        self
    }
    pub fn set_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
    pub fn set_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
    pub fn add_image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }

    /// Checks every required field is present and well formed.
    pub fn into_fields(self, max_images: usize) -> MarketResult<OfferFields> {
        let missing = |field: &str| MarketError::Validation(format!("{field} is required"));

        let fields = OfferFields {
            title: self.title.ok_or_else(|| missing("title"))?,
            description: self.description.ok_or_else(|| missing("description"))?,
            category: self.category.ok_or_else(|| missing("category"))?,
            condition: self.condition.ok_or_else(|| missing("condition"))?,
            location: self.location.ok_or_else(|| missing("location"))?,
            images: self.images,
        };
        fields.validate(max_images)?;

        Ok(fields)
    }
}

/// Partial owner edit. `None` leaves the field untouched.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OfferPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<CategoryId>,
    pub condition: Option<Condition>,
    pub location: Option<Location>,
    pub images: Option<Vec<String>>,
    pub status: Option<OfferStatus>,
}

impl OfferPatch {
    pub fn status(status: OfferStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> OfferDraft {
        OfferDraft::new()
            .set_title("Bicicleta Trek")
            .set_description("Mountain bike in good shape")
            .set_category("category_sports")
            .set_condition(Condition::Good)
            .set_location(Location::new("Guadalajara"))
            .add_image("https://img.example/bike.jpg")
    }

    fn offer(status: OfferStatus) -> Offer {
        let owner = OwnerProfile {
            user_id: UserId::new("user_ana"),
            name: "Ana".into(),
            avatar: None,
            rating: Some(4.9),
        };
        let fields = draft().into_fields(3).unwrap();
        Offer::new(OfferId::new("offer_1"), owner, fields, status, TimeStamp::new())
    }

    #[test]
    fn lifecycle_table() {
        use OfferStatus::*;

        assert!(Draft.check_user_transition(Published).is_ok());
        assert!(Published.check_user_transition(Paused).is_ok());
        assert!(Paused.check_user_transition(Published).is_ok());

        assert!(Published.check_user_transition(Completed).is_err());
        assert!(Published.check_user_transition(Draft).is_err());
        assert!(Draft.check_user_transition(Paused).is_err());
        assert!(Completed.check_user_transition(Published).is_err());
    }

    #[test]
    fn draft_requires_fields() {
        let err = OfferDraft::new().into_fields(3).unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        let no_images = OfferDraft {
            images: vec![],
            ..draft()
        };
        assert!(no_images.into_fields(3).is_err());

        let too_many = draft().add_image("b").add_image("c").add_image("d");
        assert!(too_many.into_fields(3).is_err());
    }

    #[test]
    fn bad_coordinates_rejected() {
        let located = draft().set_location(Location::new("Nowhere").with_coordinates(91.0, 0.0));
        assert!(located.into_fields(3).is_err());
    }

    #[test]
    fn patch_edits_fields_and_status() {
        let original = offer(OfferStatus::Draft);
        let patch = OfferPatch {
            title: Some("Trek Marlin 5".into()),
            status: Some(OfferStatus::Published),
            ..OfferPatch::default()
        };

        let edited = original.apply_patch(patch, 3, TimeStamp::new()).unwrap();
        assert_eq!(edited.title, "Trek Marlin 5");
        assert_eq!(edited.status, OfferStatus::Published);
        assert_eq!(edited.created_at, original.created_at);
    }

    #[test]
    fn completed_offer_is_frozen() {
        let done = offer(OfferStatus::Completed);
        let patch = OfferPatch {
            title: Some("new".into()),
            ..OfferPatch::default()
        };
        assert!(matches!(
            done.apply_patch(patch, 3, TimeStamp::new()),
            Err(MarketError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn offer_encoding() {
        let original = offer(OfferStatus::Published);

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: Offer = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }
}
