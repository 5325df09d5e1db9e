use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tracing::debug;


/// Where a running middleware publishes the port it listens on
pub const DEFAULT_MEETING_POINT: &str = "/tmp/hamcast/meeting_point/middleware/middleware.config_file";

pub struct ClientConfig {
    pub middleware_addr: SocketAddr,

    /// Upper bound for one synchronous request / response round trip. `None` waits indefinitely,
    ///  which is only advisable in tests.
    pub sync_timeout: Option<Duration>,
    /// Upper bound for a blocking send waiting for acks to free up its send window
    pub send_timeout: Option<Duration>,

    /// Bytes of unacknowledged frames (header included) a single send window may hold. A frame
    ///  is only admitted if it is strictly smaller than the remaining budget.
    pub send_window_capacity: usize,
    /// Bytes of received but not yet consumed data a socket buffers before dropping inbound data
    pub receive_budget: usize,
    /// Application level cap on a single payload. The effective limit is the smaller of this
    ///  and the maximum message size the middleware announces during the handshake.
    pub max_payload_len: usize,

    /// capacity of the queues feeding the ack and retransmit workers
    pub signal_queue_len: usize,
    pub read_chunk_len: usize,
    /// Frames announcing a bigger payload are treated as a corrupted stream
    pub max_frame_payload_len: u32,
    pub tcp_nodelay: bool,
}

impl ClientConfig {
    pub fn new(middleware_addr: SocketAddr) -> ClientConfig {
        ClientConfig {
            middleware_addr,
            sync_timeout: Some(Duration::from_secs(30)),
            send_timeout: Some(Duration::from_secs(60)),
            send_window_capacity: 16 * 1024 * 1024,
            receive_budget: 10 * 1024 * 1024,
            max_payload_len: 65_000,
            signal_queue_len: 1024,
            read_chunk_len: 64 * 1024,
            max_frame_payload_len: 16 * 1024 * 1024,
            tcp_nodelay: true,
        }
    }

    /// Config for a middleware on the local host, with the port taken from the file the
    ///  middleware writes on startup
    pub fn from_meeting_point() -> anyhow::Result<ClientConfig> {
        Self::from_middleware_config_file(DEFAULT_MEETING_POINT)
    }

    pub fn from_middleware_config_file(path: impl AsRef<Path>) -> anyhow::Result<ClientConfig> {
        let file = MiddlewareConfigFile::read_from(path)?;
        Ok(ClientConfig::new(SocketAddr::from((Ipv4Addr::LOCALHOST, file.port))))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_payload_len == 0 {
            bail!("max payload length must be positive");
        }
        if self.send_window_capacity <= crate::ipc::frame::FrameHeader::SERIALIZED_LEN {
            bail!("send window capacity of {} bytes cannot hold a single frame", self.send_window_capacity);
        }
        if self.signal_queue_len == 0 {
            bail!("signal queue length must be positive");
        }
        if self.read_chunk_len == 0 {
            bail!("read chunk length must be positive");
        }
        if self.sync_timeout == Some(Duration::ZERO) || self.send_timeout == Some(Duration::ZERO) {
            bail!("timeouts must be positive");
        }
        Ok(())
    }
}


/// The middleware's own config file: `key = value` lines, of which `middleware.port` and
///  `middleware.pid` are required. Other lines are ignored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MiddlewareConfigFile {
    pub port: u16,
    pub pid: u32,
}

impl MiddlewareConfigFile {
    pub fn read_from(path: impl AsRef<Path>) -> anyhow::Result<MiddlewareConfigFile> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read middleware config file {}", path.display()))?;
        debug!("read middleware config file {}", path.display());
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<MiddlewareConfigFile> {
        let mut port = None;
        let mut pid = None;

        for line in content.lines() {
            let Some((key, value)) = line.split_once(" = ") else {
                continue;
            };
            match key {
                "middleware.port" => {
                    if port.is_some() {
                        bail!("multiple ports given in middleware config file");
                    }
                    port = Some(parse_positive::<u16>(value)
                        .with_context(|| format!("invalid port {:?}", value))?);
                }
                "middleware.pid" => {
                    if pid.is_some() {
                        bail!("multiple process ids given in middleware config file");
                    }
                    pid = Some(parse_positive::<u32>(value)
                        .with_context(|| format!("invalid process id {:?}", value))?);
                }
                _ => {}
            }
        }

        Ok(MiddlewareConfigFile {
            port: port.ok_or_else(|| anyhow!("no port given in middleware config file"))?,
            pid: pid.ok_or_else(|| anyhow!("no process id given in middleware config file"))?,
        })
    }
}

fn parse_positive<T: std::str::FromStr + Default + PartialEq>(s: &str) -> anyhow::Result<T> {
    if s.starts_with('0') || !s.chars().all(|c| c.is_ascii_digit()) {
        bail!("not a positive decimal number");
    }
    let value = s.parse::<T>()
        .map_err(|_| anyhow!("out of range"))?;
    if value == T::default() {
        bail!("must not be zero");
    }
    Ok(value)
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 1234)));
        config.validate().unwrap();
        assert_eq!(config.send_window_capacity, 16 * 1024 * 1024);
        assert_eq!(config.receive_budget, 10 * 1024 * 1024);
        assert_eq!(config.max_payload_len, 65_000);
    }

    #[rstest]
    #[case::tiny_window(|c: &mut ClientConfig| c.send_window_capacity = 16)]
    #[case::no_payload(|c: &mut ClientConfig| c.max_payload_len = 0)]
    #[case::no_signal_queue(|c: &mut ClientConfig| c.signal_queue_len = 0)]
    #[case::zero_timeout(|c: &mut ClientConfig| c.sync_timeout = Some(Duration::ZERO))]
    fn test_validate_rejects(#[case] modify: fn(&mut ClientConfig)) {
        let mut config = ClientConfig::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 1234)));
        modify(&mut config);
        assert!(config.validate().is_err());
    }

    #[rstest]
    #[case::plain("middleware.port = 35000\nmiddleware.pid = 4711\n", 35000, 4711)]
    #[case::reordered("middleware.pid = 1\n\nmiddleware.port = 1\n", 1, 1)]
    #[case::extra_lines("# comment\nmiddleware.port = 80\nother.key = 5\nmiddleware.pid = 2", 80, 2)]
    fn test_parse_config_file(#[case] content: &str, #[case] port: u16, #[case] pid: u32) {
        assert_eq!(MiddlewareConfigFile::parse(content).unwrap(), MiddlewareConfigFile { port, pid });
    }

    #[rstest]
    #[case::empty("")]
    #[case::no_pid("middleware.port = 35000\n")]
    #[case::no_port("middleware.pid = 35000\n")]
    #[case::duplicate_port("middleware.port = 1\nmiddleware.port = 2\nmiddleware.pid = 3\n")]
    #[case::duplicate_pid("middleware.port = 1\nmiddleware.pid = 2\nmiddleware.pid = 3\n")]
    #[case::zero_port("middleware.port = 0\nmiddleware.pid = 3\n")]
    #[case::leading_zero("middleware.port = 080\nmiddleware.pid = 3\n")]
    #[case::port_overflow("middleware.port = 70000\nmiddleware.pid = 3\n")]
    #[case::garbage_pid("middleware.port = 1\nmiddleware.pid = abc\n")]
    fn test_parse_config_file_invalid(#[case] content: &str) {
        assert!(MiddlewareConfigFile::parse(content).is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("mcast-client-config-test-{}", std::process::id()));
        std::fs::write(&path, "middleware.port = 4242\nmiddleware.pid = 17\n").unwrap();

        let config = ClientConfig::from_middleware_config_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.middleware_addr, SocketAddr::from((Ipv4Addr::LOCALHOST, 4242)));
    }

    #[test]
    fn test_missing_file() {
        assert!(MiddlewareConfigFile::read_from("/nonexistent/middleware.config_file").is_err());
    }
}
