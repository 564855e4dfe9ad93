use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    errors::AppError,
    orders::Order,
    restaurants::RestaurantDirectory,
    status::OrderStatus,
    store::Store,
};

/// Reporting window. Each period has a lower bound on `placed_at` and runs
/// up to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Today,
    Week,
    Month,
}

impl Period {
    /// Midnight UTC of the current day, now - 7 days, now - 30 days.
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Period::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc())
                .unwrap_or(now),
            Period::Week => now - Duration::days(7),
            Period::Month => now - Duration::days(30),
        }
    }
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(Period::Today),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            _ => Err(AppError::InvalidPeriod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub restaurant_id: String,
    pub period: Period,
    pub since: DateTime<Utc>,
    pub total_orders: u64,
    /// Delivered orders only.
    pub total_revenue: f64,
    /// Over every order in the window, delivered or not.
    pub average_order_value: f64,
    pub status_counts: BTreeMap<OrderStatus, u64>,
    /// UTC placement date -> delivered revenue.
    pub daily_revenue: BTreeMap<NaiveDate, f64>,
}

/// Aggregates `orders` into a report. Pure; `orders` is expected to already
/// be restricted to the window.
///
/// Revenue counts delivered orders only, while the average divides the total
/// of *all* orders by their count.
pub fn summarize_orders(
    restaurant_id: &str,
    period: Period,
    since: DateTime<Utc>,
    orders: &[Order],
) -> AnalyticsReport {
    let mut status_counts: BTreeMap<OrderStatus, u64> =
        OrderStatus::ALL.into_iter().map(|s| (s, 0)).collect();
    let mut daily_revenue: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut total_revenue = 0.0;
    let mut gross = 0.0;

    for order in orders {
        gross += order.total_amount;
        // legacy "accepted" records already load as confirmed
        *status_counts.entry(order.status).or_insert(0) += 1;
        if order.status == OrderStatus::Delivered {
            total_revenue += order.total_amount;
            *daily_revenue.entry(order.placed_at.date_naive()).or_insert(0.0) += order.total_amount;
        }
    }

    let total_orders = orders.len() as u64;
    let average_order_value = if total_orders == 0 {
        0.0
    } else {
        gross / total_orders as f64
    };

    AnalyticsReport {
        restaurant_id: restaurant_id.to_string(),
        period,
        since,
        total_orders,
        total_revenue,
        average_order_value,
        status_counts,
        daily_revenue,
    }
}

/// Builds the report for a restaurant the caller owns. Restaurants the
/// caller does not own are reported as not found.
pub fn summarize(
    store: &Store,
    restaurants: &RestaurantDirectory,
    actor_id: &str,
    restaurant_id: &str,
    period: Period,
    now: DateTime<Utc>,
) -> Result<AnalyticsReport, AppError> {
    let restaurant = restaurants
        .find_by_owner_and_id(actor_id, restaurant_id)
        .ok_or(AppError::RestaurantNotFound)?;

    let since = period.window_start(now);
    let orders = store.orders_for_restaurant_since(&restaurant.id, since)?;
    debug!(restaurant = %restaurant.id, ?period, count = orders.len(), "summarizing orders");
    Ok(summarize_orders(&restaurant.id, period, since, &orders))
}
