use barter_exchange::{
    Marketplace,
    boundary::{Identity, IdentityProvider, StaticCatalog, StaticIdentities},
    config::{MarketConfig, StorageConfig},
    logging,
    offer::{Condition, Location, OfferDraft},
};
use std::sync::Arc;

// Walks one swap from listing to completion against a throwaway database.
fn main() -> anyhow::Result<()> {
    let config = MarketConfig {
        storage: StorageConfig {
            temporary: true,
            ..StorageConfig::at("demo.db")
        },
        ..MarketConfig::default()
    };
    logging::init(&config.logging);

    let catalog = StaticCatalog::new()
        .with_category("category_tech", "Tecnología")
        .with_category("category_music", "Música");
    let market = Marketplace::open(&config, Arc::new(catalog))?;

    let identities = StaticIdentities::new()
        .with_token("token-ana", Identity::new("user_ana", "Ana"))
        .with_token("token-luis", Identity::new("user_luis", "Luis"));
    let ana = identities.authenticate("token-ana")?;
    let luis = identities.authenticate("token-luis")?;

    let camera = market.offers.create_offer(
        &ana,
        OfferDraft::new()
            .set_title("Cámara Canon AE-1")
            .set_description("Film camera, 50mm lens included")
            .set_category("category_tech")
            .set_condition(Condition::Excellent)
            .set_location(Location::new("CDMX"))
            .add_image("/uploads/camera.jpg"),
        true,
    )?;
    let guitar = market.offers.create_offer(
        &luis,
        OfferDraft::new()
            .set_title("Guitarra acústica")
            .set_description("Yamaha, comes with case")
            .set_category("category_music")
            .set_condition(Condition::Good)
            .set_location(Location::new("Puebla"))
            .add_image("/uploads/guitar.jpg"),
        true,
    )?;

    let trade = market.trades.propose_exchange(
        &ana.user_id,
        &camera.id,
        &guitar.id,
        Some("¿Te interesa un intercambio?".into()),
    )?;
    println!("proposed {} ({})", trade.id(), trade.status());

    market.trades.accept_proposal(&luis.user_id, trade.id())?;
    market.trades.confirm_exchange(&ana.user_id, trade.id())?;
    let trade = market.trades.confirm_exchange(&luis.user_id, trade.id())?;
    println!("{:#?}", trade);

    for offer in [&camera, &guitar] {
        let offer = market.offers.get_offer_by_id(&offer.id)?;
        println!("{}: {} ({})", offer.title, offer.status, offer.condition.label_es());
    }
    println!("{:#?}", market.trades.summary(&ana.user_id)?);

    Ok(())
}
