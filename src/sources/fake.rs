//! Fake a positioning device.
//!
//! Fixes are pushed through a channel by the test (or demo) driving it; the
//! one-shot fix and the continuous feed consume the same queue.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::location::Coordinate;
use crate::pipes::PIPE_SIZE;

use super::gps::{Permission, PositionError, PositionSource};

/// A channel-driven position source.
pub struct FakeGps {
    permission: Permission,
    rx: mpsc::Receiver<Coordinate>,
}

/// Pushes fixes into a [`FakeGps`].
#[derive(Clone)]
pub struct FakeGpsHandle {
    tx: mpsc::Sender<Coordinate>,
}

/// Create a fake position source answering permission requests with
/// `permission`.
#[must_use]
pub fn fake_gps(permission: Permission) -> (FakeGpsHandle, FakeGps) {
    let (tx, rx) = mpsc::channel(PIPE_SIZE);
    (FakeGpsHandle { tx }, FakeGps { permission, rx })
}

impl FakeGpsHandle {
    /// Push the next fix, dropping it if the device has been torn down.
    pub async fn send(&self, fix: Coordinate) {
        if self.tx.send(fix).await.is_err() {
            debug!("fake gps: fix dropped, device gone");
        }
    }
}

#[async_trait]
impl PositionSource for FakeGps {
    async fn request_permission(&mut self) -> Result<Permission, PositionError> {
        Ok(self.permission)
    }

    async fn current_position(&mut self) -> Result<Coordinate, PositionError> {
        self.rx.recv().await.ok_or(PositionError::FeedClosed)
    }

    async fn next_position(&mut self) -> Option<Coordinate> {
        self.rx.recv().await
    }
}
