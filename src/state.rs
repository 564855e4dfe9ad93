use crate::{
    auth::TokenVerifier,
    config::Config,
    geofence::Geofence,
    restaurants::RestaurantDirectory,
    store::{Store, StoreResult},
};
use std::sync::Arc;

/// Everything a request handler needs. All of it is built once at startup;
/// only the store changes afterwards.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub restaurants: Arc<RestaurantDirectory>,
    pub geofence: Arc<Geofence>,
    pub verifier: Arc<TokenVerifier>,
}

impl AppState {
    /// Opens the store under `config.data_dir` and builds the read-only
    /// lookups from `config`.
    pub fn new(config: Config) -> StoreResult<Self> {
        let store = Store::open(&config.data_dir)?;
        let restaurants = RestaurantDirectory::new(config.restaurants.iter().cloned());
        let geofence = Geofence::from_directory(&restaurants, config.max_radius_km);
        let verifier = TokenVerifier::new(config.credentials.iter().cloned());
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            restaurants: Arc::new(restaurants),
            geofence: Arc::new(geofence),
            verifier: Arc::new(verifier),
        })
    }
}
