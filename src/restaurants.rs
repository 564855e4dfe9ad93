use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// A restaurant as this service sees it. Restaurants are managed elsewhere;
/// we only reference them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    /// Account id allowed to manage this restaurant's orders.
    pub owner: String,
    pub name: String,
    pub address: String,
    pub coordinate: Coordinate,
    /// Advertised radius. Deliverability is decided against the service-wide
    /// maximum, see [`Geofence`](crate::geofence::Geofence).
    pub delivery_radius_km: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Read-only restaurant lookup, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct RestaurantDirectory {
    by_id: HashMap<String, Restaurant>,
}

impl RestaurantDirectory {
    pub fn new(restaurants: impl IntoIterator<Item = Restaurant>) -> Self {
        RestaurantDirectory {
            by_id: restaurants.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Restaurant> {
        self.by_id.get(id)
    }

    /// The restaurant only if `owner` owns it.
    pub fn find_by_owner_and_id(&self, owner: &str, id: &str) -> Option<&Restaurant> {
        self.find_by_id(id).filter(|r| r.owner == owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Restaurant> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
