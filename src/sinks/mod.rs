//! Sinks consuming position pipes.

use tracing::debug;

use crate::location::Coordinate;
use crate::pipes::Receiver;
use crate::services::store::StoreTx;
use crate::spawn;

/// Forward every coordinate on `rx` to the remote store, stamped at the
/// time of publishing.
///
/// Fire-and-forget: nothing is awaited per record and a failed write is
/// only logged by the store client. The subscription is established before
/// this function returns, so no value sent afterwards is missed. The task
/// ends when the pipe closes.
pub async fn publish_locations(rx: Receiver<Coordinate>, store: StoreTx) {
    let mut subscription = rx.subscribe().await;

    spawn(async move {
        while let Ok(position) = subscription.recv().await {
            store.try_send(position.record_now());
        }
        debug!("publish_locations: pipe closed");
    });
}
