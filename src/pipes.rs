//! Pipes connecting position sources to sinks.
//!
//! A pipe is a small task owning the latest value; senders push values in,
//! receivers either ask for the latest value or subscribe to a broadcast of
//! new values. The pipe task exits when every sender or every receiver has
//! gone away, which closes all outstanding subscriptions.

use thiserror::Error;
use tokio::select;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error};

use crate::spawn;

/// Size of all pipes.
pub const PIPE_SIZE: usize = 10;

enum SendMessage<T> {
    Set(T),
}

enum ReceiveMessage<T> {
    Get(oneshot::Sender<Option<T>>),
    Subscribe(oneshot::Sender<(broadcast::Receiver<T>, Option<T>)>),
}

/// Send a value into a pipe.
pub struct Sender<T> {
    name: String,
    tx: mpsc::Sender<SendMessage<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send> Sender<T> {
    /// Send a value into the pipe, dropping it if the pipe is full or closed.
    pub fn try_send(&self, data: T) {
        let msg = SendMessage::Set(data);
        if let Err(err) = self.tx.try_send(msg) {
            error!("{}: send failed: {err}", self.name);
        }
    }
}

/// Receive values from a pipe.
pub struct Receiver<T> {
    name: String,
    tx: mpsc::Sender<ReceiveMessage<T>>,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + Clone> Receiver<T> {
    /// Retrieve the most recent value, or `None` if nothing was sent yet
    /// or the pipe has closed.
    ///
    /// Stateless pipes never keep a value, so this is always `None` for
    /// them; use [`Receiver::subscribe`] instead.
    pub async fn get(&self) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        let msg = ReceiveMessage::Get(tx);
        if self.tx.send(msg).await.is_err() {
            debug!("{}: get on closed pipe", self.name);
            return None;
        }
        rx.await.unwrap_or_else(|_| {
            debug!("{}: get response lost", self.name);
            None
        })
    }

    /// Subscribe to values from this pipe.
    ///
    /// Returns an already closed subscription if the pipe has closed. For
    /// stateful pipes the current value, if any, is delivered first.
    pub async fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = oneshot::channel();
        let msg = ReceiveMessage::Subscribe(tx);
        if self.tx.send(msg).await.is_err() {
            debug!("{}: subscribe on closed pipe", self.name);
            return Subscription::closed();
        }
        rx.await.map_or_else(
            |_| {
                debug!("{}: subscribe response lost", self.name);
                Subscription::closed()
            },
            |(rx, initial)| Subscription { rx, initial },
        )
    }
}

/// Something went wrong receiving from a pipe.
#[derive(Error, Debug)]
pub enum RecvError {
    /// The pipe was closed.
    #[error("The pipe was closed")]
    Closed,
}

/// A subscription to values from a pipe.
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
    initial: Option<T>,
}

impl<T: Send + Clone> Subscription<T> {
    fn closed() -> Self {
        let (tx, rx) = broadcast::channel(1);
        drop(tx);
        Self { rx, initial: None }
    }

    /// Wait for the next value from the pipe.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Closed` if the pipe is closed.
    pub async fn recv(&mut self) -> Result<T, RecvError> {
        if let Some(initial) = self.initial.take() {
            return Ok(initial);
        }
        loop {
            match self.rx.recv().await {
                Ok(v) => return Ok(v),
                Err(err) => match err {
                    broadcast::error::RecvError::Closed => return Err(RecvError::Closed),
                    broadcast::error::RecvError::Lagged(_) => {
                        error!("recv failed: The pipe was lagged");
                    }
                },
            }
        }
    }

    /// Get the next value but don't wait for it. Returns `None` if there is
    /// no value pending.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Closed` if the pipe is closed.
    pub fn try_recv(&mut self) -> Result<Option<T>, RecvError> {
        if let Some(initial) = self.initial.take() {
            return Ok(Some(initial));
        }
        loop {
            match self.rx.try_recv() {
                Ok(v) => return Ok(Some(v)),
                Err(err) => match err {
                    broadcast::error::TryRecvError::Closed => return Err(RecvError::Closed),
                    broadcast::error::TryRecvError::Empty => return Ok(None),
                    broadcast::error::TryRecvError::Lagged(_) => {
                        error!("try_recv failed: The pipe was lagged");
                    }
                },
            }
        }
    }
}

/// Create a stateless pipe that broadcasts every value sent to it.
///
/// Subscriptions see only values sent after they were established, and
/// [`Receiver::get`] always returns `None`.
#[must_use]
pub fn create_stateless<T>(name: impl Into<String>) -> (Sender<T>, Receiver<T>)
where
    T: Clone + PartialEq + Send + 'static,
{
    create(name, false)
}

/// Create a stateful pipe that remembers the latest value and only
/// broadcasts a value when it differs from the previous one.
///
/// Subscriptions are primed with the current value.
#[must_use]
pub fn create_stateful<T>(name: impl Into<String>) -> (Sender<T>, Receiver<T>)
where
    T: Clone + PartialEq + Send + 'static,
{
    create(name, true)
}

fn create<T>(name: impl Into<String>, stateful: bool) -> (Sender<T>, Receiver<T>)
where
    T: Clone + PartialEq + Send + 'static,
{
    let (send_tx, mut send_rx) = mpsc::channel::<SendMessage<T>>(PIPE_SIZE);
    let (receive_tx, mut receive_rx) = mpsc::channel::<ReceiveMessage<T>>(PIPE_SIZE);
    let (out_tx, out_rx) = broadcast::channel::<T>(PIPE_SIZE);

    drop(out_rx);

    let name = name.into();

    let sender = Sender {
        tx: send_tx,
        name: name.clone(),
    };
    let receiver = Receiver {
        tx: receive_tx,
        name: name.clone(),
    };

    spawn(async move {
        let name = name;
        let mut saved: Option<T> = None;

        loop {
            select! {
                msg = send_rx.recv() => match msg {
                    Some(SendMessage::Set(data)) => {
                        let changed = saved.as_ref() != Some(&data);
                        if stateful {
                            saved = Some(data.clone());
                        }
                        if !stateful || changed {
                            if out_tx.send(data).is_err() {
                                // It is not an error if there are no subscribers.
                                debug!("{name}: send to broadcast failed (not an error)");
                            }
                        }
                    }
                    None => {
                        debug!("{name}: all senders closed");
                        break;
                    }
                },
                msg = receive_rx.recv() => match msg {
                    Some(ReceiveMessage::Get(tx)) => {
                        if tx.send(saved.clone()).is_err() {
                            error!("{name}: get send failed");
                        }
                    }
                    Some(ReceiveMessage::Subscribe(tx)) => {
                        let rx = out_tx.subscribe();
                        if tx.send((rx, saved.clone())).is_err() {
                            error!("{name}: subscribe send failed");
                        }
                    }
                    None => {
                        debug!("{name}: all receivers closed");
                        break;
                    }
                },
            }
        }
    });

    (sender, receiver)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[tokio::test]
    async fn test_stateless_pipe() {
        let (tx, rx) = create_stateless::<String>("test");
        let mut s = rx.subscribe().await;
        tx.try_send("hello".to_string());
        tx.try_send("hello".to_string());
        tx.try_send("goodbye".to_string());

        assert_eq!("hello", s.recv().await.unwrap());
        assert_eq!("hello", s.recv().await.unwrap());
        assert_eq!("goodbye", s.recv().await.unwrap());

        // stateless pipes do not remember the latest value
        assert_eq!(None, rx.get().await);
        assert!(s.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stateful_pipe() {
        let (tx, rx) = create_stateful::<String>("test");
        tx.try_send("hello".to_string());
        let mut s = rx.subscribe().await;
        tx.try_send("hello".to_string());
        tx.try_send("goodbye".to_string());

        // primed with the current value, duplicate suppressed
        assert_eq!("hello", s.recv().await.unwrap());
        assert_eq!("goodbye", s.recv().await.unwrap());

        assert_eq!(Some("goodbye".to_string()), rx.get().await);
        assert!(s.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pipe_closes_when_senders_gone() {
        let (tx, rx) = create_stateless::<u32>("test");
        let mut s = rx.subscribe().await;
        tx.try_send(10);
        drop(tx);

        assert_eq!(10, s.recv().await.unwrap());
        assert!(matches!(s.recv().await, Err(RecvError::Closed)));
        assert_eq!(None, rx.get().await);
    }
}
