//! Message channel capability.
//!
//! A duplex channel is split once into a sending and a receiving half so the
//! uplink and downlink loops can drive the two directions concurrently
//! without sharing a lock.

pub mod memory;
pub mod ws;

use crate::error::ChannelError;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound half of a message channel. Preserves message boundaries and order.
pub trait ChannelSender: Send {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<(), ChannelError>>;

    /// Close the channel. Safe to call on an already-closed channel.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Inbound half of a message channel.
pub trait ChannelReceiver: Send {
    /// `Ok(None)` means the peer closed the channel normally; an `Err` means it
    /// went away abruptly.
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<String>, ChannelError>>;
}

/// A connected duplex channel ready to be split between the two loops.
pub trait MessageChannel: Send {
    fn split(self: Box<Self>) -> (Box<dyn ChannelSender>, Box<dyn ChannelReceiver>);
}
