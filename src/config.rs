use std::time::Duration;

/// Server settings, read-only once the server starts.
#[derive(Debug, Clone)]
pub struct Config {
    /// Largest frame payload accepted, and the fragment size for sends.
    pub max_frame_payload: usize,
    /// Largest reassembled message accepted.
    pub max_message_size: usize,
    /// Largest HTTP request head accepted before the upgrade.
    pub max_header_bytes: usize,
    /// Time allowed for the request head to arrive.
    pub handshake_timeout: Option<Duration>,
    /// Per-read idle deadline once the connection is upgraded.
    pub read_timeout: Option<Duration>,
    /// Time to wait for the peer's Close after sending ours.
    pub close_timeout: Duration,
    /// Interval between keepalive pings, if any.
    pub ping_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame_payload: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_header_bytes: 8 * 1024,
            handshake_timeout: Some(Duration::from_secs(10)),
            read_timeout: None,
            close_timeout: Duration::from_secs(5),
            ping_interval: None,
        }
    }
}
