//! Environment driven configuration.

use std::time::Duration;

use envconfig::Envconfig;
use reqwest::Url;

use crate::services::store;
use crate::sources::gps::WatchConfig;

/// Process environment for the tracker daemon.
#[derive(Envconfig)]
pub struct Environment {
    /// Base URL of the remote real-time database.
    #[envconfig(from = "STORE_DATABASE_URL")]
    pub database_url: Url,

    /// Record path overwritten with the latest location.
    #[envconfig(from = "STORE_RECORD_PATH", default = "users/driver1/location")]
    pub record_path: String,

    /// Address of the gpsd daemon.
    #[envconfig(from = "GPSD_ADDRESS", default = "localhost:2947")]
    pub gpsd_address: String,

    /// Minimum movement, in meters, for a fix to be delivered early.
    #[envconfig(from = "WATCH_DISTANCE_M", default = "10.0")]
    pub distance_m: f64,

    /// Maximum seconds between deliveries while fixes keep arriving.
    #[envconfig(from = "WATCH_INTERVAL_SECS", default = "5")]
    pub interval_secs: u64,
}

impl Environment {
    /// Load the environment from the environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or unparsable.
    pub fn load() -> Result<Self, envconfig::Error> {
        Self::init_from_env()
    }

    /// Store connection parameters.
    #[must_use]
    pub fn store_config(&self) -> store::Config {
        store::Config {
            database_url: self.database_url.clone(),
            record_path: self.record_path.clone(),
        }
    }

    /// Watch thresholds.
    #[must_use]
    pub const fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            distance_m: self.distance_m,
            interval: Duration::from_secs(self.interval_secs),
        }
    }
}
