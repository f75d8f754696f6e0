use clap::Parser;
use std::time::Duration;

/// mtr-style traceroute with continuous per-hop latency and loss statistics
#[derive(Parser, Debug, Clone)]
#[command(name = "hopstat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host to trace (IP address or hostname)
    #[arg(required = true)]
    pub target: String,

    /// Amount of pings per hop
    #[arg(short = 'c', long = "count", default_value = "5")]
    pub count: u64,

    /// ICMP reply timeout in seconds
    #[arg(short = 't', long = "timeout", default_value = "0.8")]
    pub timeout: f64,

    /// Wait time in seconds between discovery iterations
    #[arg(short = 'i', long = "interval", default_value = "1.0")]
    pub interval: f64,

    /// Wait time in seconds before pinging the next hop
    #[arg(long = "hop-sleep", default_value = "1e-9")]
    pub hop_sleep: f64,

    /// Maximal TTL count
    #[arg(long = "max-hops", default_value = "64")]
    pub max_hops: u8,

    /// Consecutive silent hops tolerated before aborting discovery
    #[arg(long = "max-unknown-hops", default_value = "10")]
    pub max_unknown_hops: u8,

    /// Cached packet buffer size per hop
    #[arg(long = "buffer-size", default_value = "50")]
    pub buffer_size: usize,

    /// Reverse-lookup hop addresses
    #[arg(long = "ptr")]
    pub ptr: bool,

    /// Print json results instead of the live table
    #[arg(long = "json")]
    pub json: bool,

    /// Source address to bind probes to
    #[arg(long = "address")]
    pub address: Option<String>,
}

impl Args {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.interval)
    }

    pub fn hop_sleep_duration(&self) -> Duration {
        Duration::from_secs_f64(self.hop_sleep)
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.count == 0 {
            return Err("Count must be at least 1".into());
        }

        if self.timeout <= 0.0 {
            return Err("Timeout must be positive".into());
        }

        if self.interval <= 0.0 {
            return Err("Interval must be positive".into());
        }

        if self.hop_sleep < 0.0 {
            return Err("Hop sleep cannot be negative".into());
        }

        if self.max_hops == 0 {
            return Err("Max hops must be at least 1".into());
        }

        if self.max_unknown_hops == 0 {
            return Err("Max unknown hops must be at least 1".into());
        }

        if self.buffer_size == 0 {
            return Err("Buffer size must be at least 1".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let args = Args::parse_from(["hopstat", "8.8.8.8"]);
        assert_eq!(args.count, 5);
        assert_eq!(args.timeout_duration(), Duration::from_millis(800));
        assert_eq!(args.interval_duration(), Duration::from_secs(1));
        assert_eq!(args.hop_sleep_duration(), Duration::from_nanos(1));
        assert_eq!(args.max_hops, 64);
        assert_eq!(args.max_unknown_hops, 10);
        assert_eq!(args.buffer_size, 50);
        assert!(!args.ptr);
        assert!(!args.json);
        assert!(args.address.is_none());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_valued_limits() {
        let args = Args::parse_from(["hopstat", "--max-hops", "0", "8.8.8.8"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["hopstat", "--buffer-size", "0", "8.8.8.8"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["hopstat", "-c", "0", "8.8.8.8"]);
        assert!(args.validate().is_err());
    }
}
