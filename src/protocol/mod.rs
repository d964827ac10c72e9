pub mod client_events;
pub mod codec;
pub mod models;
pub mod server_events;

pub use client_events::ClientEvent;
pub use codec::Codec;
pub use server_events::ServerEvent;
