//! Radius-based delivery decisions.
//!
//! A [`Geofence`] is built once at startup from the restaurant directory and a
//! single service-wide maximum radius, then shared read-only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    geo::{self, Coordinate},
    restaurants::RestaurantDirectory,
};

/// Label used when the restaurant is not in the location table.
pub const FALLBACK_RESTAURANT_NAME: &str = "Restaurant";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantLocation {
    pub display_name: String,
    pub address: String,
    pub coordinate: Coordinate,
}

/// Outcome of a delivery check. Returned as a normal response even when
/// delivery is not possible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDecision {
    pub can_deliver: bool,
    /// Kilometers, rounded to 2 decimals. `None` when the restaurant location
    /// is unknown.
    pub distance: Option<f64>,
    pub restaurant_name: String,
    pub max_radius: f64,
    /// Only present when delivery is refused.
    pub restaurant_address: Option<String>,
    /// Only present when delivery is refused.
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Geofence {
    locations: HashMap<String, RestaurantLocation>,
    max_radius_km: f64,
}

impl Geofence {
    pub fn new(locations: HashMap<String, RestaurantLocation>, max_radius_km: f64) -> Self {
        Geofence {
            locations,
            max_radius_km,
        }
    }

    pub fn from_directory(directory: &RestaurantDirectory, max_radius_km: f64) -> Self {
        let locations = directory
            .iter()
            .map(|r| {
                (
                    r.id.clone(),
                    RestaurantLocation {
                        display_name: r.name.clone(),
                        address: r.address.clone(),
                        coordinate: r.coordinate,
                    },
                )
            })
            .collect();
        Geofence::new(locations, max_radius_km)
    }

    pub fn max_radius_km(&self) -> f64 {
        self.max_radius_km
    }

    pub fn location(&self, restaurant_id: &str) -> Option<&RestaurantLocation> {
        self.locations.get(restaurant_id)
    }

    /// Decides whether `customer` is within the delivery radius of
    /// `restaurant_id`. The boundary is inclusive.
    ///
    /// An unknown restaurant degrades to an undetermined, refused decision
    /// instead of an error.
    pub fn evaluate(&self, restaurant_id: &str, customer: Coordinate) -> DeliveryDecision {
        let Some(location) = self.locations.get(restaurant_id) else {
            return DeliveryDecision {
                can_deliver: false,
                distance: None,
                restaurant_name: FALLBACK_RESTAURANT_NAME.to_string(),
                max_radius: self.max_radius_km,
                restaurant_address: None,
                message: Some(
                    "Delivery availability could not be determined for this restaurant".to_string(),
                ),
            };
        };

        let distance = geo::distance(location.coordinate, customer);
        let can_deliver = distance <= self.max_radius_km;
        let rounded = round2(distance);

        let (restaurant_address, message) = if can_deliver {
            (None, None)
        } else {
            (
                Some(location.address.clone()),
                Some(format!(
                    "Sorry, {} only delivers within {} km. Your location is {:.2} km away from {}.",
                    location.display_name, self.max_radius_km, rounded, location.address
                )),
            )
        };

        DeliveryDecision {
            can_deliver,
            distance: Some(rounded),
            restaurant_name: location.display_name.clone(),
            max_radius: self.max_radius_km,
            restaurant_address,
            message,
        }
    }
}

fn round2(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}
