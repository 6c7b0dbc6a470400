use std::time::Instant;

const N: usize = 5;
pub(crate) const NONCE_LEN: usize = 8;

// Stores and calculates average of last N latencies
pub(crate) struct PingStats {
    history: [Option<u16>; N],
    idx: usize,
    last_nonce: Option<[u8; NONCE_LEN]>,
    last_ping: Instant,
}

impl PingStats {
    pub(crate) fn new() -> Self {
        Self {
            history: [None; N],
            idx: 0,
            last_nonce: None,
            last_ping: Instant::now(),
        }
    }

    /// Starts a new round trip and returns the nonce to send as Ping payload.
    pub(crate) fn new_ping(&mut self) -> [u8; NONCE_LEN] {
        let mut nonce = [0; NONCE_LEN];
        rand::fill(&mut nonce);
        self.last_nonce = Some(nonce);
        self.last_ping = Instant::now();
        nonce
    }

    /// Latency in ms if `payload` answers the last ping.
    ///
    /// Unsolicited pongs are allowed by the protocol and yield `None`.
    pub(crate) fn on_pong(&mut self, payload: &[u8]) -> Option<u16> {
        let nonce = self.last_nonce?;
        if payload != nonce {
            tracing::debug!(got = ?payload, expected = ?nonce, "unmatched pong");
            return None;
        }
        self.last_nonce = None;

        let latency = u16::try_from(self.last_ping.elapsed().as_millis()).unwrap_or(u16::MAX);
        self.add(latency);
        Some(latency)
    }

    /// True while a ping is unanswered.
    pub(crate) fn awaiting_pong(&self) -> bool { self.last_nonce.is_some() }

    pub(crate) fn add(&mut self, rtt: u16) {
        self.history[self.idx] = Some(rtt);
        self.idx = (self.idx + 1) % N;
    }

    pub(crate) fn average(&self) -> Option<u16> {
        let (sum, count) = self
            .history
            .iter()
            .flatten()
            .fold((0u32, 0u32), |(sum, count), &v| (sum + u32::from(v), count + 1));
        sum.checked_div(count).and_then(|avg| u16::try_from(avg).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_last_five() {
        let mut stats = PingStats::new();
        assert_eq!(stats.average(), None);
        for rtt in [100, 1, 2, 3, 4, 5] {
            stats.add(rtt);
        }
        assert_eq!(stats.average(), Some(3));
    }

    #[test]
    fn matching_pong_records_latency() {
        let mut stats = PingStats::new();
        let nonce = stats.new_ping();
        assert!(stats.awaiting_pong());
        assert_eq!(stats.on_pong(b"unrelated"), None);
        assert!(stats.on_pong(&nonce).is_some());
        assert!(!stats.awaiting_pong());
        assert!(stats.average().is_some());
        // a second copy of the same pong is no longer expected
        assert_eq!(stats.on_pong(&nonce), None);
    }
}
