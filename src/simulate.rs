//! Synthetic traffic against a running order service.
//!
//! Places a batch of orders as a customer, then keeps firing status changes
//! as the restaurant owner and delivery checks around the restaurant until
//! the time limit passes or the cancel token fires (e.g. on Ctrl-C).
//!
//! - Arrivals follow Exp(λ = `rate_hz`), i.e. a Poisson stream.
//! - Requested statuses are drawn from canonical names, aliases and one
//!   deliberately invalid value, so the summary shows accepted, rejected and
//!   conflicting updates side by side.
//! - Delivery probes are the restaurant location displaced by N(0, σ) km on
//!   each axis, so roughly the share inside the radius can be read off the
//!   summary.

use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::geo::{Coordinate, EARTH_RADIUS_KM};

/// Status values the simulator asks for.
pub const REQUESTED_STATUSES: [&str; 8] = [
    "accepted",
    "confirmed",
    "preparing",
    "ready",
    "handed_to_delivery",
    "delivered",
    "rejected",
    "lost_in_transit",
];

#[derive(Clone, Debug)]
pub struct SimConfig {
    pub api_base: String,
    pub customer_token: String,
    pub owner_token: String,
    pub restaurant_id: String,
    pub restaurant_location: Coordinate,
    pub orders: usize,
    pub run_secs: Option<u64>,
    pub rate_hz: f64,
    pub jitter_km: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimStats {
    pub placed: u64,
    pub updated: u64,
    pub rejected: u64,
    pub conflicts: u64,
    pub other_failures: u64,
    pub deliverable: u64,
    pub undeliverable: u64,
}

/// `origin` moved `north_km` north and `east_km` east (small-offset
/// approximation).
pub fn displace(origin: Coordinate, north_km: f64, east_km: f64) -> Coordinate {
    let d_lat = (north_km / EARTH_RADIUS_KM).to_degrees();
    let d_lon = (east_km / (EARTH_RADIUS_KM * origin.latitude.to_radians().cos())).to_degrees();
    Coordinate::new(
        (origin.latitude + d_lat).clamp(-90.0, 90.0),
        (origin.longitude + d_lon).clamp(-180.0, 180.0),
    )
}

async fn place_orders(client: &Client, cfg: &SimConfig, stats: &mut SimStats) -> anyhow::Result<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(cfg.orders);
    for _ in 0..cfg.orders {
        let amount = (rand::rng().random_range(5.0..60.0_f64) * 100.0).round() / 100.0;
        let created = client
            .post(format!("{}/orders", cfg.api_base))
            .bearer_auth(&cfg.customer_token)
            .json(&json!({ "restaurantId": cfg.restaurant_id, "totalAmount": amount }))
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;
        let id = created["id"]
            .as_str()
            .and_then(|s| s.parse::<Uuid>().ok())
            .ok_or_else(|| anyhow::anyhow!("order response without id: {created}"))?;
        ids.push(id);
        stats.placed += 1;
    }
    Ok(ids)
}

async fn send_one_update(client: &Client, cfg: &SimConfig, order_id: Uuid, stats: &mut SimStats) -> anyhow::Result<()> {
    let status = REQUESTED_STATUSES[rand::rng().random_range(0..REQUESTED_STATUSES.len())];
    let res = client
        .patch(format!("{}/orders/{}/status", cfg.api_base, order_id))
        .bearer_auth(&cfg.owner_token)
        .json(&json!({ "status": status }))
        .send()
        .await?;
    match res.status() {
        StatusCode::OK => stats.updated += 1,
        StatusCode::BAD_REQUEST => stats.rejected += 1,
        StatusCode::CONFLICT => stats.conflicts += 1,
        _ => stats.other_failures += 1,
    }
    Ok(())
}

async fn send_one_probe(client: &Client, cfg: &SimConfig, noise: &Normal<f64>, stats: &mut SimStats) -> anyhow::Result<()> {
    let (north, east) = {
        let mut rng = rand::rng();
        (noise.sample(&mut rng), noise.sample(&mut rng))
    };
    let point = displace(cfg.restaurant_location, north, east);
    let decision = client
        .post(format!("{}/delivery/validate", cfg.api_base))
        .json(&json!({
            "restaurantId": cfg.restaurant_id,
            "userLocation": { "latitude": point.latitude, "longitude": point.longitude },
        }))
        .send()
        .await?
        .error_for_status()?
        .json::<serde_json::Value>()
        .await?;
    if decision["canDeliver"].as_bool().unwrap_or(false) {
        stats.deliverable += 1;
    } else {
        stats.undeliverable += 1;
    }
    Ok(())
}

/// Runs the simulation until `cfg.run_secs` elapse or `cancel_token` fires.
///
/// # Errors
/// Fails if the server is unreachable, if placing the seed orders fails, or
/// if `rate_hz`/`jitter_km` are not positive.
pub async fn run_simulation(cfg: SimConfig, cancel_token: CancellationToken) -> anyhow::Result<SimStats> {
    let client = Client::new();
    let arrivals = Exp::new(cfg.rate_hz).map_err(|e| anyhow::anyhow!("rate_hz must be > 0: {e}"))?;
    let noise = Normal::new(0.0, cfg.jitter_km).map_err(|e| anyhow::anyhow!("jitter_km must be >= 0: {e}"))?;

    let mut stats = SimStats::default();
    let order_ids = place_orders(&client, &cfg, &mut stats).await?;
    info!(placed = order_ids.len(), "seed orders placed");
    if order_ids.is_empty() {
        return Ok(stats);
    }

    let start = Instant::now();
    loop {
        if let Some(max_secs) = cfg.run_secs {
            if start.elapsed().as_secs() >= max_secs {
                break;
            }
        }
        let wait_secs = arrivals.sample(&mut rand::rng());
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("received shutdown, stopping simulation");
                break;
            }
            _ = sleep(Duration::from_secs_f64(wait_secs)) => {
                let order_id = order_ids[rand::rng().random_range(0..order_ids.len())];
                send_one_update(&client, &cfg, order_id, &mut stats).await?;
                send_one_probe(&client, &cfg, &noise, &mut stats).await?;
                println!(
                    "[{:.1}s] updated={} rejected={} conflicts={} deliverable={} undeliverable={}",
                    start.elapsed().as_secs_f64(),
                    stats.updated, stats.rejected, stats.conflicts, stats.deliverable, stats.undeliverable
                );
            }
        }
    }
    println!("--- done --- {stats:?}");
    Ok(stats)
}
