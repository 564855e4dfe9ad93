use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    api::router,
    config::Config,
    geo::{self, Coordinate},
    geofence::Geofence,
    restaurants::RestaurantDirectory,
    simulate::{SimConfig, run_simulation},
    state::AppState,
    utils::shutdown_token,
};

/// Order fulfillment lifecycle and delivery geofence service
#[derive(Parser)]
#[command(name = "order_fulfillment", version, about)]
struct Cli {
    /// JSON config file; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Overrides the configured port
        #[arg(long)]
        port: Option<u16>,
        /// Overrides the configured data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Accept the built-in development tokens
        #[arg(long)]
        dev: bool,
    },

    /// Print the great-circle distance between two points, in km
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,
    },

    /// Check whether a configured restaurant delivers to a point
    CheckDelivery {
        restaurant_id: String,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },

    /// Drive a running server with synthetic orders, status changes and
    /// delivery checks
    Simulate {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        api_base: String,
        /// Restaurant to order from; the first configured one by default
        #[arg(long)]
        restaurant_id: Option<String>,
        #[arg(long, default_value = "dev-customer")]
        customer_token: String,
        #[arg(long, default_value = "dev-owner-spice")]
        owner_token: String,
        /// Number of seed orders
        #[arg(long, default_value_t = 20)]
        orders: usize,
        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        run_secs: Option<u64>,
        /// Mean requests per second
        #[arg(long, default_value_t = 5.0)]
        rate_hz: f64,
        /// Standard deviation of delivery probe offsets, in km
        #[arg(long, default_value_t = 4.0)]
        jitter_km: f64,
    },
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.check_credentials()?;
    let addr = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(config).context("failed to open order store")?;
    info!(
        restaurants = state.restaurants.len(),
        max_radius_km = state.geofence.max_radius_km(),
        "state loaded"
    );

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    let token = shutdown_token();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    info!("server stopped");
    Ok(())
}

fn check_delivery(config: &Config, restaurant_id: &str, customer: Coordinate) -> anyhow::Result<()> {
    customer.validate()?;
    let directory = RestaurantDirectory::new(config.restaurants.iter().cloned());
    let geofence = Geofence::from_directory(&directory, config.max_radius_km);
    let decision = geofence.evaluate(restaurant_id, customer);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, data_dir, dev } => {
            config.dev_mode |= dev;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            serve(config).await
        }
        Commands::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => {
            let a = Coordinate::new(lat1, lon1);
            let b = Coordinate::new(lat2, lon2);
            a.validate()?;
            b.validate()?;
            println!("{:.3} km", geo::distance(a, b));
            Ok(())
        }
        Commands::CheckDelivery {
            restaurant_id,
            latitude,
            longitude,
        } => check_delivery(&config, &restaurant_id, Coordinate::new(latitude, longitude)),
        Commands::Simulate {
            api_base,
            restaurant_id,
            customer_token,
            owner_token,
            orders,
            run_secs,
            rate_hz,
            jitter_km,
        } => {
            let restaurant = match restaurant_id {
                Some(id) => config
                    .restaurants
                    .iter()
                    .find(|r| r.id == id)
                    .with_context(|| format!("restaurant `{id}` is not configured"))?,
                None => config
                    .restaurants
                    .first()
                    .context("no restaurants configured")?,
            };
            let cfg = SimConfig {
                api_base,
                customer_token,
                owner_token,
                restaurant_id: restaurant.id.clone(),
                restaurant_location: restaurant.coordinate,
                orders,
                run_secs,
                rate_hz,
                jitter_km,
            };
            run_simulation(cfg, shutdown_token()).await?;
            Ok(())
        }
    }
}
