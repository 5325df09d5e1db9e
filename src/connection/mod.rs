//! The byte stream to the middleware: handshake, frame reassembly and the ordered write path.

pub mod connection_state;
pub mod frame_reader;
pub mod handshake;
pub mod outbound_writer;
