pub mod analytics;
pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod geo;
pub mod geofence;
pub mod lifecycle;
pub mod orders;
pub mod restaurants;
pub mod simulate;
pub mod state;
pub mod status;
pub mod store;
pub mod utils;
