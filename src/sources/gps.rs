//! Watch a position source and deliver filtered updates.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::location::Coordinate;
use crate::pipes::{self, Receiver, Sender};
use crate::spawn;

/// Result of a foreground access request to the positioning device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Access granted; positions may be read.
    Granted,
    /// Access refused; the watch terminates without reading anything.
    Denied,
}

/// An error from the positioning device.
#[derive(Error, Debug)]
pub enum PositionError {
    /// The device could not be reached.
    #[error("Device IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The position feed ended.
    #[error("The position feed ended")]
    FeedClosed,

    /// No fix arrived in time.
    #[error("Timed out waiting for a fix")]
    Timeout,
}

/// Boundary to the positioning device.
///
/// Methods are called sequentially from the watch task, so implementations
/// only need `next_position` to be cancel safe.
#[async_trait]
pub trait PositionSource {
    /// Request foreground access to the device.
    async fn request_permission(&mut self) -> Result<Permission, PositionError>;

    /// Obtain a single immediate fix.
    async fn current_position(&mut self) -> Result<Coordinate, PositionError>;

    /// Wait for the next raw fix from the device.
    ///
    /// Returns `None` when the feed has ended.
    async fn next_position(&mut self) -> Option<Coordinate>;
}

/// Thresholds applied to the raw fix feed.
#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    /// Minimum movement, in meters, for a fix to be delivered early.
    pub distance_m: f64,
    /// Maximum time between deliveries while fixes keep arriving.
    pub interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            distance_m: 10.0,
            interval: Duration::from_secs(5),
        }
    }
}

enum WatchCommand {
    Refresh,
}

/// A live, cancelable feed of coordinate updates.
///
/// Dropping the handle stops the watch task; no further values are
/// delivered and the device is no longer polled.
pub struct Watch {
    /// Latest coordinate for display, primed with the initial fix.
    pub state: Receiver<Coordinate>,
    /// Deliveries destined for the publisher.
    pub updates: Receiver<Coordinate>,
    commands: mpsc::Sender<WatchCommand>,
}

impl Watch {
    /// Request one immediate fix, delivered only if the position changed.
    pub fn refresh(&self) {
        if self.commands.try_send(WatchCommand::Refresh).is_err() {
            debug!("gps: refresh requested after teardown");
        }
    }
}

/// Start watching `source`, delivering fixes that pass the `config`
/// thresholds.
///
/// If access to the device is denied the watch terminates silently after
/// logging; both pipes close without delivering anything.
#[must_use]
pub fn watch<S>(source: S, config: WatchConfig) -> Watch
where
    S: PositionSource + Send + 'static,
{
    let (state_tx, state_rx) = pipes::create_stateful("gps (state)");
    let (updates_tx, updates_rx) = pipes::create_stateless("gps (updates)");
    let (commands_tx, commands_rx) = mpsc::channel(pipes::PIPE_SIZE);

    spawn(run_watch(source, config, state_tx, updates_tx, commands_rx));

    Watch {
        state: state_rx,
        updates: updates_rx,
        commands: commands_tx,
    }
}

async fn run_watch<S>(
    mut source: S,
    config: WatchConfig,
    state: Sender<Coordinate>,
    updates: Sender<Coordinate>,
    mut commands: mpsc::Receiver<WatchCommand>,
) where
    S: PositionSource + Send,
{
    match source.request_permission().await {
        Ok(Permission::Granted) => {}
        Ok(Permission::Denied) => {
            warn!("Permission to access location was denied");
            return;
        }
        Err(err) => {
            error!("Requesting location access failed: {err}");
            return;
        }
    }

    // The initial fix primes the display state but is not published.
    let mut last = match source.current_position().await {
        Ok(fix) if !fix.is_finite() => {
            warn!("gps: discarding non-finite initial fix {fix:?}");
            return;
        }
        Ok(fix) => {
            state.try_send(fix);
            fix
        }
        Err(err) => {
            error!("Error fetching initial location: {err}");
            return;
        }
    };
    let mut last_delivery = Instant::now();

    loop {
        select! {
            fix = source.next_position() => {
                let Some(fix) = fix else {
                    debug!("gps: position feed ended");
                    break;
                };
                if !fix.is_finite() {
                    warn!("gps: discarding non-finite fix {fix:?}");
                    continue;
                }
                if fix.distance_m(last) >= config.distance_m
                    || last_delivery.elapsed() >= config.interval
                {
                    state.try_send(fix);
                    updates.try_send(fix);
                    last = fix;
                    last_delivery = Instant::now();
                }
            }
            cmd = commands.recv() => match cmd {
                Some(WatchCommand::Refresh) => match source.current_position().await {
                    Ok(fix) if !fix.is_finite() => {
                        warn!("gps: discarding non-finite fix {fix:?}");
                    }
                    Ok(fix) if fix != last => {
                        state.try_send(fix);
                        updates.try_send(fix);
                        last = fix;
                        last_delivery = Instant::now();
                    }
                    Ok(_) => {
                        debug!("gps: refresh returned an unchanged fix");
                    }
                    Err(err) => {
                        error!("Error fetching location: {err}");
                    }
                },
                None => {
                    debug!("gps: watch handle dropped");
                    break;
                }
            }
        }
    }
}
