pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod ipc;
pub mod util;
pub mod test_util;

pub use client::mcast_client::McastClient;
pub use client::multicast_socket::MulticastSocket;
pub use config::ClientConfig;
pub use error::ClientError;
pub use ipc::group_uri::GroupUri;
pub use ipc::wire_codec::{DeliveredUnit, GroupDescriptor, InterfaceDescriptor};


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
