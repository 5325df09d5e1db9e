//! Wire format of the middleware IPC protocol: frame header, message kinds and payload shapes.

pub mod frame;
pub mod group_uri;
pub mod message_kind;
pub mod wire_codec;

/// identifier the middleware assigns to a socket
pub type SocketId = u32;
/// identifier the middleware assigns to a (socket, destination group) send stream
pub type StreamId = u16;
pub type InterfaceId = u32;
pub type SequenceNumber = u32;
