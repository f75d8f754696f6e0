use std::time::Duration;

use crate::cli::Args;

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of discovery iterations (pings per hop)
    pub count: u64,
    /// ICMP reply timeout per probe
    pub timeout: Duration,
    /// Wait between discovery iterations
    pub interval: Duration,
    /// Wait before probing the next hop
    pub hop_sleep: Duration,
    /// Maximum TTL
    pub max_hops: u8,
    /// Consecutive silent hops tolerated before giving up
    pub max_unknown_hops: u8,
    /// Per-hop packet history capacity
    pub buffer_size: usize,
    /// Reverse-lookup hop addresses in the renderer
    pub ptr_lookup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            count: 5,
            timeout: Duration::from_millis(800),
            interval: Duration::from_secs(1),
            hop_sleep: Duration::from_nanos(1),
            max_hops: 64,
            max_unknown_hops: 10,
            buffer_size: 50,
            ptr_lookup: false,
        }
    }
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            count: args.count,
            timeout: args.timeout_duration(),
            interval: args.interval_duration(),
            hop_sleep: args.hop_sleep_duration(),
            max_hops: args.max_hops,
            max_unknown_hops: args.max_unknown_hops,
            buffer_size: args.buffer_size,
            ptr_lookup: args.ptr,
        }
    }
}
