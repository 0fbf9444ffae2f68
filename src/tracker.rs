//! The live-tracking session: a watcher wired to the publisher.

use crate::location::Coordinate;
use crate::services::store::StoreTx;
use crate::sinks;
use crate::sources::gps::{self, PositionSource, Watch, WatchConfig};

/// A running tracking session.
///
/// Holds the watch handle; dropping the session cancels the watch and no
/// further records are published.
pub struct Tracker {
    watch: Watch,
}

impl Tracker {
    /// Start tracking: each delivery from `source` updates the local state
    /// and is published via `store`.
    pub async fn start<S>(source: S, store: StoreTx, config: WatchConfig) -> Self
    where
        S: PositionSource + Send + 'static,
    {
        let watch = gps::watch(source, config);
        sinks::publish_locations(watch.updates.clone(), store).await;
        Self { watch }
    }

    /// The most recent coordinate, for display.
    ///
    /// `None` until the initial fix arrives, or after a denied permission
    /// request.
    pub async fn current(&self) -> Option<Coordinate> {
        self.watch.state.get().await
    }

    /// Request an on-demand refresh; a changed position is delivered and
    /// published, an unchanged one is dropped.
    pub fn refresh(&self) {
        self.watch.refresh();
    }
}
