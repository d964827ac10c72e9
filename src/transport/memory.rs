//! In-process duplex channel.
//!
//! The client half implements [`MessageChannel`]; the [`MemoryPeer`] half plays
//! the remote service: it sees every message the client sends, in order, and
//! scripts what the client receives.

use crate::error::ChannelError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::{BoxFuture, ChannelReceiver, ChannelSender, MessageChannel};

/// What the peer delivers to the client's receiving half.
#[derive(Debug, Clone)]
pub enum Inbound {
    Text(String),
    /// Tear the channel down with a transport error.
    Abort(String),
}

pub struct MemoryChannel {
    outgoing: mpsc::Sender<String>,
    incoming: mpsc::Receiver<Inbound>,
    closes: Arc<AtomicUsize>,
}

pub struct MemoryPeer {
    pub sent: mpsc::Receiver<String>,
    inbound: Option<mpsc::Sender<Inbound>>,
    closes: Arc<AtomicUsize>,
}

/// Create a connected channel pair with the given per-direction buffer.
#[must_use]
pub fn channel(capacity: usize) -> (MemoryChannel, MemoryPeer) {
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let closes = Arc::new(AtomicUsize::new(0));
    (
        MemoryChannel { outgoing: out_tx, incoming: in_rx, closes: Arc::clone(&closes) },
        MemoryPeer { sent: out_rx, inbound: Some(in_tx), closes },
    )
}

impl MemoryPeer {
    /// Deliver one text message to the client.
    ///
    /// # Errors
    /// Returns an error if the client side is gone or the peer already closed.
    pub async fn push(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        self.deliver(Inbound::Text(text.into())).await
    }

    /// Deliver a JSON value as one text message.
    ///
    /// # Errors
    /// Returns an error if the client side is gone or the peer already closed.
    pub async fn push_json(&self, value: &serde_json::Value) -> Result<(), ChannelError> {
        self.push(value.to_string()).await
    }

    /// Make the client's next receive fail with a transport error.
    ///
    /// # Errors
    /// Returns an error if the client side is gone or the peer already closed.
    pub async fn abort(&self, reason: impl Into<String>) -> Result<(), ChannelError> {
        self.deliver(Inbound::Abort(reason.into())).await
    }

    /// Close the server-to-client direction normally.
    pub fn close(&mut self) {
        self.inbound = None;
    }

    /// How many times the client closed its sending half.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    async fn deliver(&self, msg: Inbound) -> Result<(), ChannelError> {
        let inbound = self.inbound.as_ref().ok_or(ChannelError::Closed)?;
        inbound.send(msg).await.map_err(|_| ChannelError::Closed)
    }
}

impl MessageChannel for MemoryChannel {
    fn split(self: Box<Self>) -> (Box<dyn ChannelSender>, Box<dyn ChannelReceiver>) {
        let Self { outgoing, incoming, closes } = *self;
        (
            Box::new(MemorySender { outgoing: Some(outgoing), closes }),
            Box::new(MemoryReceiver { incoming }),
        )
    }
}

struct MemorySender {
    outgoing: Option<mpsc::Sender<String>>,
    closes: Arc<AtomicUsize>,
}

impl ChannelSender for MemorySender {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<(), ChannelError>> {
        Box::pin(async move {
            let outgoing = self.outgoing.as_ref().ok_or(ChannelError::Closed)?;
            outgoing.send(text).await.map_err(|_| ChannelError::Closed)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.outgoing.take().is_some() {
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
        })
    }
}

struct MemoryReceiver {
    incoming: mpsc::Receiver<Inbound>,
}

impl ChannelReceiver for MemoryReceiver {
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<String>, ChannelError>> {
        Box::pin(async move {
            match self.incoming.recv().await {
                Some(Inbound::Text(text)) => Ok(Some(text)),
                Some(Inbound::Abort(reason)) => Err(ChannelError::Transport(reason)),
                None => Ok(None),
            }
        })
    }
}
