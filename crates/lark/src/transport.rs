//! Live-connection boundary.
//!
//! The wire protocol itself lives outside this crate; a transport only has to
//! feed raw event payloads into the registered handler until cancelled. The
//! handler never fails across this boundary — internal pipeline errors are
//! caught and logged inside the handler, and the connection keeps running.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::Value,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

/// Receives raw platform events from a transport.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Must not panic; all failures are handled internally.
    async fn handle_event(&self, raw: Value);
}

/// A source of raw platform events for one account.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Run until the event source is exhausted or `cancel` fires. An `Err`
    /// return means the connection died and the account should be disabled.
    async fn run(
        &self,
        handler: Arc<dyn EventHandler>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()>;
}

/// Transport backed by an in-process queue. Used by tests and by hosts that
/// receive events through their own HTTP callback endpoint and push them in.
pub struct QueueTransport {
    receiver: tokio::sync::Mutex<mpsc::Receiver<Value>>,
}

impl QueueTransport {
    /// Create a transport and the sender half used to push events into it.
    #[must_use]
    pub fn new(capacity: usize) -> (mpsc::Sender<Value>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self {
            receiver: tokio::sync::Mutex::new(receiver),
        })
    }
}

#[async_trait]
impl EventTransport for QueueTransport {
    async fn run(
        &self,
        handler: Arc<dyn EventHandler>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut receiver = self.receiver.lock().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("transport cancelled");
                    return Ok(());
                }
                event = receiver.recv() => match event {
                    Some(raw) => handler.handle_event(raw).await,
                    None => {
                        debug!("event queue closed");
                        return Ok(());
                    }
                },
            }
        }
    }
}
