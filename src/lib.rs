//! Track the live position of a driver device and publish it to a remote store.
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod location;
pub mod pipes;
pub mod services;
pub mod sinks;
pub mod sources;
pub mod tracker;

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawn a task and automatically monitor its execution.
pub fn spawn<T>(future: T) -> JoinHandle<()>
where
    T: Future + Send + 'static,
    T::Output: Send + 'static,
{
    let task = tokio::spawn(future);

    tokio::spawn(async move {
        let rc = task.await;

        match rc {
            Ok(_rc) => {
                debug!("The thread terminated normally");
            }
            Err(err) => {
                error!("The thread aborted with error: {err}");
                std::process::exit(1);
            }
        };
    })
}
