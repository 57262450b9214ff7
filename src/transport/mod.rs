//! Batched network transport for line protocols
//!
//! A single actor task owns the socket and packs queued lines into frames
//! no larger than the configured packet size. See [`actor`] for the
//! connection state machine.

pub mod actor;
mod connector;
mod frame;

pub use actor::{
    spawn_transport, transport_pair, TransportActor, TransportHandle, TransportState,
    TransportStats, TransportStatsSnapshot,
};
pub use connector::{
    Connection, Connector, InMemoryConnection, InMemoryConnector, UdpConnection, UdpConnector,
};
pub use frame::TransportFrame;
