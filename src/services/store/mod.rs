//! Sink for the remote real-time store.
//!
//! The client owns the HTTP connection and consumes a channel of records;
//! everything else holds a cheap [`StoreTx`] handle. Each record overwrites
//! the configured record path wholesale. There is no retry and no
//! acknowledgment; a rejected write is logged and forgotten.

use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::location::LocationRecord;
use crate::pipes::PIPE_SIZE;
use crate::spawn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters for the remote store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the real-time database.
    pub database_url: Url,
    /// Record path overwritten with the latest location.
    pub record_path: String,
}

/// An error constructing the store client.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The record path could not be joined onto the database URL.
    #[error("Invalid record path {0}: {1}")]
    InvalidPath(String, url::ParseError),

    /// The HTTP client could not be built.
    #[error("Error building HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Struct used to send records to the store client.
#[derive(Clone)]
pub struct StoreTx(mpsc::Sender<LocationRecord>);

impl StoreTx {
    /// Queue a record for publishing, dropping it if the client has gone
    /// away or is saturated.
    pub fn try_send(&self, record: LocationRecord) {
        if let Err(err) = self.0.try_send(record) {
            error!("store: send error: {err}");
        }
    }
}

/// Create the channel pair used to talk to the store client.
///
/// Tests substitute a fake store by consuming the receiver directly
/// instead of passing it to [`run_client`].
#[must_use]
pub fn store_channel() -> (StoreTx, mpsc::Receiver<LocationRecord>) {
    let (tx, rx) = mpsc::channel(PIPE_SIZE);
    (StoreTx(tx), rx)
}

/// Run the client that overwrites the remote record path with each record
/// received on `rx`.
///
/// # Errors
///
/// Returns an error if the record URL is invalid or the HTTP client cannot
/// be built.
pub fn run_client(mut rx: mpsc::Receiver<LocationRecord>, config: Config) -> Result<(), StoreError> {
    let url = record_url(&config)?;
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    spawn(async move {
        while let Some(record) = rx.recv().await {
            put_record(&client, url.clone(), &record).await;
        }
        debug!("store: channel closed");
    });

    Ok(())
}

fn record_url(config: &Config) -> Result<Url, StoreError> {
    let path = format!("{}.json", config.record_path.trim_matches('/'));
    let mut base = config.database_url.clone();
    // Url::join discards the last segment of a base without a trailing slash.
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base.join(&path)
        .map_err(|err| StoreError::InvalidPath(path, err))
}

async fn put_record(client: &reqwest::Client, url: Url, record: &LocationRecord) {
    match client.put(url).json(record).send().await {
        Ok(response) => {
            if let Err(err) = response.error_for_status() {
                error!("store: put rejected: {err}");
            }
        }
        Err(err) => {
            error!("store: put failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn config(record_path: &str) -> Config {
        Config {
            database_url: Url::parse("https://tracker-test.firebaseio.com").unwrap(),
            record_path: record_path.to_string(),
        }
    }

    #[test]
    fn test_record_url() {
        let url = record_url(&config("users/driver1/location")).unwrap();
        assert_eq!(
            "https://tracker-test.firebaseio.com/users/driver1/location.json",
            url.as_str()
        );
    }

    #[test]
    fn test_record_url_keeps_a_base_path_without_trailing_slash() {
        let config = Config {
            database_url: Url::parse("https://tracker-test.firebaseio.com/fleet").unwrap(),
            record_path: "users/driver1/location".to_string(),
        };
        let url = record_url(&config).unwrap();
        assert_eq!(
            "https://tracker-test.firebaseio.com/fleet/users/driver1/location.json",
            url.as_str()
        );
    }

    #[test]
    fn test_record_url_strips_surrounding_slashes() {
        let url = record_url(&config("/users/driver1/location/")).unwrap();
        assert_eq!(
            "https://tracker-test.firebaseio.com/users/driver1/location.json",
            url.as_str()
        );
    }
}
