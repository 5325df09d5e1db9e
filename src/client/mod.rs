//! The client side protocol engine: request / response exchanges, per-socket send windows with
//!  their ack and retransmit workers, and inbound delivery.

pub mod inbound;
pub mod mcast_client;
pub mod multicast_socket;
pub mod send_window;
pub mod socket_registry;
pub mod socket_state;
pub mod stream_workers;
pub mod sync_channel;
