//! Collaborators the core consumes but does not own: identity, categories and media.
use crate::error::{MarketError, MarketResult};
use crate::media::ImageUpload;
use crate::offer::OwnerProfile;
use crate::types::{CategoryId, UserId};
use std::collections::HashMap;

/// An authenticated user as vouched for by the identity provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar: Option<String>,
    pub rating: Option<f32>,
}

impl Identity {
    pub fn new(user_id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar: None,
            rating: None,
        }
    }

    /// Display copy stored on offers the user authors.
    pub fn profile(&self) -> OwnerProfile {
        OwnerProfile {
            user_id: self.user_id.clone(),
            name: self.display_name.clone(),
            avatar: self.avatar.clone(),
            rating: self.rating,
        }
    }
}

pub trait IdentityProvider {
    /// Resolve a bearer credential. Unknown or expired credentials are `Forbidden`.
    fn authenticate(&self, bearer: &str) -> MarketResult<Identity>;
}

pub trait CategoryCatalog {
    fn category_name(&self, id: &CategoryId) -> Option<String>;

    fn contains(&self, id: &CategoryId) -> bool {
        self.category_name(id).is_some()
    }
}

pub trait MediaStore {
    /// Persist the payload and return a stable reference (usually a URL).
    fn store(&self, upload: &ImageUpload, bytes: &[u8]) -> MarketResult<String>;
}

/// Fixed category list, handy for tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    categories: HashMap<CategoryId, String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_category(mut self, id: impl Into<CategoryId>, name: impl Into<String>) -> Self {
        self.categories.insert(id.into(), name.into());
        self
    }
}

impl CategoryCatalog for StaticCatalog {
    fn category_name(&self, id: &CategoryId) -> Option<String> {
        self.categories.get(id).cloned()
    }
}

/// Bearer tokens issued up front, for tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentities {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentities {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_token(mut self, bearer: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(bearer.into(), identity);
        self
    }
}

impl IdentityProvider for StaticIdentities {
    fn authenticate(&self, bearer: &str) -> MarketResult<Identity> {
        self.tokens
            .get(bearer)
            .cloned()
            .ok_or_else(|| MarketError::Forbidden("unknown or expired credential".into()))
    }
}

impl<T: CategoryCatalog + ?Sized> CategoryCatalog for std::sync::Arc<T> {
    fn category_name(&self, id: &CategoryId) -> Option<String> {
        (**self).category_name(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_catalog_lookup() {
        let catalog = StaticCatalog::new()
            .with_category("category_tech", "Tecnología")
            .with_category("category_sports", "Deportes");

        assert_eq!(
            catalog.category_name(&CategoryId::new("category_tech")),
            Some("Tecnología".to_string())
        );
        assert!(!catalog.contains(&CategoryId::new("category_food")));
    }

    #[test]
    fn static_identities_resolve_tokens() {
        let identities = StaticIdentities::new()
            .with_token("tok-carlos", Identity::new("user_carlos", "Carlos Mendoza"));

        let carlos = identities.authenticate("tok-carlos").unwrap();
        assert_eq!(carlos.user_id, UserId::new("user_carlos"));
        assert!(matches!(
            identities.authenticate("tok-nobody"),
            Err(MarketError::Forbidden(_))
        ));
    }

    #[test]
    fn identity_profile_copies_display_fields() {
        let mut identity = Identity::new("user_carlos", "Carlos Mendoza");
        identity.rating = Some(4.8);

        let profile = identity.profile();
        assert_eq!(profile.user_id, UserId::new("user_carlos"));
        assert_eq!(profile.name, "Carlos Mendoza");
        assert_eq!(profile.rating, Some(4.8));
    }
}
