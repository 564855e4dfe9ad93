use std::{
    env,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    auth::{Credential, Role},
    geo::{Coordinate, CoordinateError},
    restaurants::Restaurant,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("restaurant `{id}` has an invalid coordinate: {source}")]
    Coordinate { id: String, source: CoordinateError },
    #[error("max_radius_km must be a positive number, got {0}")]
    Radius(f64),
    #[error(
        "refusing to serve with built-in development tokens ({}); configure credentials or run with --dev",
        .0.join(", ")
    )]
    DevCredentials(Vec<String>),
}

/// Bearer tokens of the built-in development credentials. They are public,
/// so `serve` only accepts them in dev mode.
pub const DEV_TOKENS: [&str; 4] = ["dev-customer", "dev-owner-spice", "dev-owner-tandoor", "dev-admin"];

/// Service configuration. Loaded once at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    /// Service-wide delivery radius applied to every restaurant.
    pub max_radius_km: f64,
    /// Adds internal error detail to 500 responses. Never enable in production.
    pub expose_error_detail: bool,
    /// Allows serving with the built-in development tokens.
    pub dev_mode: bool,
    pub restaurants: Vec<Restaurant>,
    pub credentials: Vec<Credential>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            data_dir: PathBuf::from("data"),
            max_radius_km: 5.0,
            expose_error_detail: false,
            dev_mode: false,
            restaurants: vec![
                Restaurant {
                    id: "spice-route".into(),
                    owner: "owner-spice".into(),
                    name: "Spice Route".into(),
                    address: "Connaught Place, New Delhi".into(),
                    coordinate: Coordinate::new(28.6139, 77.2090),
                    delivery_radius_km: 5.0,
                    is_active: true,
                },
                Restaurant {
                    id: "tandoor-house".into(),
                    owner: "owner-tandoor".into(),
                    name: "Tandoor House".into(),
                    address: "Hauz Khas Village, New Delhi".into(),
                    coordinate: Coordinate::new(28.5535, 77.1926),
                    delivery_radius_km: 5.0,
                    is_active: true,
                },
            ],
            credentials: vec![
                Credential {
                    token: "dev-customer".into(),
                    account_id: "customer-1".into(),
                    role: Role::Customer,
                },
                Credential {
                    token: "dev-owner-spice".into(),
                    account_id: "owner-spice".into(),
                    role: Role::RestaurantAdmin,
                },
                Credential {
                    token: "dev-owner-tandoor".into(),
                    account_id: "owner-tandoor".into(),
                    role: Role::RestaurantAdmin,
                },
                Credential {
                    token: "dev-admin".into(),
                    account_id: "admin-1".into(),
                    role: Role::SuperAdmin,
                },
            ],
        }
    }
}

impl Config {
    /// Reads `path` when given, otherwise starts from the built-in defaults,
    /// then applies `ORDER_SERVICE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                info!("no config file given, using built-in defaults");
                Config::default()
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self) {
        override_from_env("ORDER_SERVICE_PORT", &mut self.port);
        override_from_env("ORDER_SERVICE_DATA_DIR", &mut self.data_dir);
        override_from_env("ORDER_SERVICE_MAX_RADIUS_KM", &mut self.max_radius_km);
        override_from_env("ORDER_SERVICE_EXPOSE_ERRORS", &mut self.expose_error_detail);
        if let Ok(raw) = env::var("ORDER_SERVICE_DEV") {
            self.dev_mode = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Configured tokens that are among [`DEV_TOKENS`].
    pub fn dev_tokens_in_use(&self) -> Vec<String> {
        self.credentials
            .iter()
            .filter(|c| DEV_TOKENS.contains(&c.token.as_str()))
            .map(|c| c.token.clone())
            .collect()
    }

    /// Refuses development tokens outside dev mode. In dev mode they are
    /// allowed but logged.
    pub fn check_credentials(&self) -> Result<(), ConfigError> {
        let tokens = self.dev_tokens_in_use();
        if tokens.is_empty() {
            return Ok(());
        }
        if !self.dev_mode {
            return Err(ConfigError::DevCredentials(tokens));
        }
        warn!(tokens = %tokens.join(", "), "dev mode: accepting built-in development tokens");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_radius_km.is_finite() && self.max_radius_km > 0.0) {
            return Err(ConfigError::Radius(self.max_radius_km));
        }
        for r in &self.restaurants {
            r.coordinate.validate().map_err(|source| ConfigError::Coordinate {
                id: r.id.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Replaces `slot` with the parsed value of `key` if set. Unparsable values
/// are logged and ignored.
fn override_from_env<T: FromStr>(key: &str, slot: &mut T)
where
    T::Err: Display,
{
    let Ok(raw) = env::var(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => {
            info!("{key} set, overriding config");
            *slot = value;
        }
        Err(e) => warn!("Invalid {key} value `{raw}`: {e}; keeping configured value"),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.expose_error_detail);
        assert_eq!(config.restaurants.len(), 2);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port": 8081, "max_radius_km": 2.0, "restaurants": [] }}"#).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.max_radius_km, 2.0);
        assert!(config.restaurants.is_empty());
        assert_eq!(config.credentials.len(), Config::default().credentials.len());
    }

    #[test]
    fn test_rejects_bad_radius_and_coordinates() {
        let mut config = Config::default();
        config.max_radius_km = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Radius(_))));

        let mut config = Config::default();
        config.restaurants[0].coordinate = Coordinate::new(123.0, 0.0);
        assert!(matches!(config.validate(), Err(ConfigError::Coordinate { .. })));
    }

    #[test]
    fn test_default_credentials_are_the_dev_tokens() {
        let config = Config::default();
        let mut tokens = config.dev_tokens_in_use();
        tokens.sort();
        let mut expected: Vec<String> = DEV_TOKENS.iter().map(|t| t.to_string()).collect();
        expected.sort();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_dev_tokens_refused_outside_dev_mode() {
        let config = Config::default();
        match config.check_credentials() {
            Err(ConfigError::DevCredentials(tokens)) => assert!(tokens.contains(&"dev-admin".to_string())),
            other => panic!("expected DevCredentials, got {other:?}"),
        }

        // A single leftover dev token is enough to refuse.
        let mut mixed = Config::default();
        mixed.credentials = vec![
            Credential {
                token: "s3cr3t".into(),
                account_id: "owner-spice".into(),
                role: Role::RestaurantAdmin,
            },
            Credential {
                token: "dev-admin".into(),
                account_id: "admin-1".into(),
                role: Role::SuperAdmin,
            },
        ];
        assert!(matches!(mixed.check_credentials(), Err(ConfigError::DevCredentials(t)) if t == ["dev-admin"]));
    }

    #[test]
    fn test_dev_tokens_allowed_in_dev_mode_and_custom_tokens_always() {
        let mut config = Config::default();
        config.dev_mode = true;
        assert!(config.check_credentials().is_ok());

        let mut custom = Config::default();
        custom.credentials = vec![Credential {
            token: "s3cr3t".into(),
            account_id: "admin-1".into(),
            role: Role::SuperAdmin,
        }];
        assert!(custom.check_credentials().is_ok());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Config::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
