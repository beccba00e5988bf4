// NATS notification transport

mod client;
mod publisher;

pub use client::{NatsClient, NatsConfig};
pub use publisher::NatsBroadcaster;
