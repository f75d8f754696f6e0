use std::net::IpAddr;
use std::time::Duration;

use crate::state::ring::PacketRing;

/// Placeholder shown for a hop that has only ever stayed silent.
pub const UNKNOWN_HOP: &str = "???";

/// The result of one probe attempt.
///
/// `success` is true iff any matching ICMP response (Time-Exceeded or Echo
/// Reply) arrived within the probe's timeout. `elapsed` is only meaningful
/// for successful outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub responder: Option<IpAddr>,
    pub elapsed: Duration,
}

impl ProbeOutcome {
    pub fn replied(responder: IpAddr, elapsed: Duration) -> Self {
        Self {
            success: true,
            responder: Some(responder),
            elapsed,
        }
    }

    pub fn lost() -> Self {
        Self::default()
    }

    fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Rolling statistics for one TTL level.
#[derive(Debug, Clone)]
pub struct HopStatistic {
    pub ttl: u8,
    pub sent: u64,
    pub lost: u64,
    /// Distinct responder addresses seen at this TTL, in first-observed
    /// order. Empty while every probe has timed out.
    pub targets: Vec<IpAddr>,
    pub last: ProbeOutcome,
    pub best: Option<ProbeOutcome>,
    pub worst: Option<ProbeOutcome>,
    /// Sum over successful outcomes only.
    pub sum_elapsed: Duration,
    pub history: PacketRing,
}

impl HopStatistic {
    pub fn new(ttl: u8, buffer_size: usize) -> Self {
        Self {
            ttl,
            sent: 0,
            lost: 0,
            targets: Vec::new(),
            last: ProbeOutcome::default(),
            best: None,
            worst: None,
            sum_elapsed: Duration::ZERO,
            history: PacketRing::new(buffer_size),
        }
    }

    /// Merge one outcome. Losses still advance `last`, `sent` and the
    /// history ring; only the timing aggregates are gated on success.
    pub fn record(&mut self, outcome: ProbeOutcome) {
        self.last = outcome.clone();
        self.sent += 1;

        if let Some(addr) = outcome.responder
            && !self.targets.contains(&addr)
        {
            self.targets.push(addr);
        }

        self.history.push(outcome.clone());

        if !outcome.success {
            self.lost += 1;
            return;
        }

        self.sum_elapsed += outcome.elapsed;

        if self.best.as_ref().is_none_or(|b| outcome.elapsed < b.elapsed) {
            self.best = Some(outcome.clone());
        }
        if self.worst.as_ref().is_none_or(|w| outcome.elapsed > w.elapsed) {
            self.worst = Some(outcome);
        }
    }

    /// The address this hop is displayed as: the first responder seen, or
    /// the unknown-hop placeholder while only silence has been observed.
    pub fn primary_target(&self) -> String {
        self.targets
            .first()
            .map(|a| a.to_string())
            .unwrap_or_else(|| UNKNOWN_HOP.to_string())
    }

    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.lost as f64 / self.sent as f64 * 100.0
        }
    }

    pub fn last_ms(&self) -> f64 {
        self.last.elapsed_ms()
    }

    pub fn best_ms(&self) -> f64 {
        self.best.as_ref().map(ProbeOutcome::elapsed_ms).unwrap_or(0.0)
    }

    pub fn worst_ms(&self) -> f64 {
        self.worst.as_ref().map(ProbeOutcome::elapsed_ms).unwrap_or(0.0)
    }

    pub fn avg_ms(&self) -> f64 {
        let received = self.sent - self.lost;
        if received == 0 {
            0.0
        } else {
            self.sum_elapsed.as_secs_f64() * 1000.0 / received as f64
        }
    }

    /// Standard deviation of the successful outcomes still in the history
    /// window, around the whole-run average.
    pub fn stdev_ms(&self) -> f64 {
        let avg = self.avg_ms();
        let mut sum_squares = 0.0;
        let mut n = 0u64;

        for outcome in self.history.iter_oldest_first().flatten() {
            if !outcome.success {
                continue;
            }
            let distance = outcome.elapsed_ms() - avg;
            sum_squares += distance * distance;
            n += 1;
        }

        if n == 0 {
            0.0
        } else {
            (sum_squares / n as f64).sqrt()
        }
    }
}
