use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::config::Config;
use crate::state::hop::{HopStatistic, ProbeOutcome};

/// The root aggregate for one run: resolved destination, bind address,
/// tuning parameters and the per-TTL statistics map.
///
/// Shared as `Arc<RwLock<Session>>`; the engine holds the write lock for a
/// whole register transaction, readers copy a [`TraceReport`] out.
#[derive(Debug)]
pub struct Session {
    pub destination: IpAddr,
    pub source: IpAddr,
    pub config: Config,
    /// Keyed by TTL; BTreeMap iteration gives the natural hop order the
    /// renderer needs.
    pub statistic: BTreeMap<u8, HopStatistic>,
}

impl Session {
    pub fn new(destination: IpAddr, source: IpAddr, config: Config) -> Self {
        Self {
            destination,
            source,
            config,
            statistic: BTreeMap::new(),
        }
    }

    /// Merge one probe outcome into the statistic for `ttl`, creating the
    /// entry on first contact with that TTL.
    pub fn register(&mut self, ttl: u8, outcome: ProbeOutcome) {
        let buffer_size = self.config.buffer_size;
        self.statistic
            .entry(ttl)
            .or_insert_with(|| HopStatistic::new(ttl, buffer_size))
            .record(outcome);
    }

    /// A consistent, owned view of the whole run with all derived metrics
    /// computed. This is what the renderer and the JSON output consume.
    pub fn snapshot(&self) -> TraceReport {
        TraceReport {
            destination: self.destination.to_string(),
            source: self.source.to_string(),
            statistic: self
                .statistic
                .iter()
                .map(|(&ttl, hop)| (ttl, HopReport::from_statistic(hop)))
                .collect(),
        }
    }
}

/// One ring slot in the report; `None` slots serialize as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketReport {
    pub success: bool,
    pub respond_ms: f64,
}

/// Rendered statistics for one hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopReport {
    pub ttl: u8,
    pub sent: u64,
    pub target: String,
    pub last_ms: f64,
    pub best_ms: f64,
    pub worst_ms: f64,
    pub avg_ms: f64,
    pub stdev_ms: f64,
    pub loss_percent: f64,
    pub packet_buffer_size: usize,
    /// Exactly `packet_buffer_size` entries, oldest first.
    pub packet_list_ms: Vec<Option<PacketReport>>,
}

impl HopReport {
    fn from_statistic(hop: &HopStatistic) -> Self {
        let packet_list_ms = hop
            .history
            .iter_oldest_first()
            .map(|slot| {
                slot.map(|p| PacketReport {
                    success: p.success,
                    respond_ms: if p.success {
                        p.elapsed.as_secs_f64() * 1000.0
                    } else {
                        0.0
                    },
                })
            })
            .collect();

        Self {
            ttl: hop.ttl,
            sent: hop.sent,
            target: hop.primary_target(),
            last_ms: hop.last_ms(),
            best_ms: hop.best_ms(),
            worst_ms: hop.worst_ms(),
            avg_ms: hop.avg_ms(),
            stdev_ms: hop.stdev_ms(),
            loss_percent: hop.loss_percent(),
            packet_buffer_size: hop.history.capacity(),
            packet_list_ms,
        }
    }
}

/// The public snapshot of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceReport {
    pub destination: String,
    pub source: String,
    pub statistic: BTreeMap<u8, HopReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_session() -> Session {
        let config = Config {
            buffer_size: 4,
            ..Config::default()
        };
        Session::new(
            "10.0.0.4".parse().unwrap(),
            "0.0.0.0".parse().unwrap(),
            config,
        )
    }

    fn reply(s: &str, ms: u64) -> ProbeOutcome {
        ProbeOutcome::replied(s.parse().unwrap(), Duration::from_millis(ms))
    }

    #[test]
    fn test_register_creates_entries_lazily() {
        let mut session = test_session();
        assert!(session.statistic.is_empty());

        session.register(2, reply("10.0.0.2", 5));
        session.register(1, reply("10.0.0.1", 2));

        let ttls: Vec<u8> = session.statistic.keys().copied().collect();
        assert_eq!(ttls, vec![1, 2]);
        assert_eq!(session.statistic[&2].sent, 1);
    }

    #[test]
    fn test_snapshot_shape() {
        let mut session = test_session();
        session.register(1, reply("10.0.0.1", 10));
        session.register(1, ProbeOutcome::lost());

        let report = session.snapshot();
        assert_eq!(report.destination, "10.0.0.4");
        assert_eq!(report.source, "0.0.0.0");

        let hop = &report.statistic[&1];
        assert_eq!(hop.ttl, 1);
        assert_eq!(hop.sent, 2);
        assert_eq!(hop.target, "10.0.0.1");
        assert_eq!(hop.packet_buffer_size, 4);
        assert_eq!(hop.packet_list_ms.len(), 4);
        // Oldest first: two empty slots, then the reply, then the loss.
        assert!(hop.packet_list_ms[0].is_none());
        assert!(hop.packet_list_ms[1].is_none());
        assert!(hop.packet_list_ms[2].as_ref().unwrap().success);
        assert!(!hop.packet_list_ms[3].as_ref().unwrap().success);
        assert!((hop.loss_percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_json_round_trip() {
        let mut session = test_session();
        session.register(1, reply("10.0.0.1", 10));
        session.register(2, ProbeOutcome::lost());
        session.register(2, reply("10.0.0.2", 31));

        let report = session.snapshot();
        let json = serde_json::to_string(&report).expect("serialize");
        let loaded: TraceReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_report_json_field_names() {
        let mut session = test_session();
        session.register(1, reply("10.0.0.1", 10));

        let value = serde_json::to_value(session.snapshot()).expect("serialize");
        assert!(value.get("destination").is_some());
        assert!(value.get("source").is_some());
        let hop = &value["statistic"]["1"];
        for field in [
            "ttl",
            "sent",
            "target",
            "last_ms",
            "best_ms",
            "worst_ms",
            "avg_ms",
            "stdev_ms",
            "loss_percent",
            "packet_buffer_size",
            "packet_list_ms",
        ] {
            assert!(hop.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(hop["packet_list_ms"].as_array().unwrap().len(), 4);
    }
}
