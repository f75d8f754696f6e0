use parking_lot::RwLock;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::probe::{ProbeRequest, Prober};
use crate::state::Session;

/// How a run can end early.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The raw socket could not be created or bound; probing never started
    /// or cannot continue.
    #[error("raw icmp socket unavailable: {0}")]
    Socket(#[from] std::io::Error),
    /// Too many consecutive silent TTLs during discovery.
    #[error("max unknown hops exceeded")]
    MaxUnknownHops,
    /// Cooperative cancellation; partial statistics remain valid.
    #[error("timed out before trace could complete")]
    Cancelled,
}

/// Drives discovery sweeps against the target and folds every outcome into
/// the shared session.
///
/// Each of the `count` iterations walks the TTLs from 1 until the destination
/// answers, issuing one probe per TTL, so later iterations double as the
/// repeat-ping rounds for every known hop. A unit is sent on the update
/// channel after each statistics merge; the channel closes when the engine
/// returns.
pub struct ProbeEngine<P> {
    config: Config,
    target: IpAddr,
    source: IpAddr,
    identifier: u16,
    state: Arc<RwLock<Session>>,
    prober: P,
    cancel: CancellationToken,
    updates: mpsc::Sender<()>,
}

impl<P: Prober> ProbeEngine<P> {
    pub fn new(
        config: Config,
        target: IpAddr,
        source: IpAddr,
        state: Arc<RwLock<Session>>,
        prober: P,
        cancel: CancellationToken,
        updates: mpsc::Sender<()>,
    ) -> Self {
        Self {
            config,
            target,
            source,
            // A fresh random identifier per run; the process id would collide
            // when several runs share one binary.
            identifier: rand::random(),
            state,
            prober,
            cancel,
            updates,
        }
    }

    /// Run `count` discovery iterations. See [`EngineError`] for the early
    /// exits; `Ok(())` means every iteration completed.
    pub async fn run(self, count: u64) -> Result<(), EngineError> {
        // Start the sequence space at a random point so replies to an
        // earlier, timed-out run cannot match this one.
        let mut seq: u16 = rand::random();

        for _ in 0..count {
            self.pause(self.config.interval).await?;

            let mut unknown_streak: u32 = 0;

            for ttl in 1..=self.config.max_hops {
                seq = seq.wrapping_add(1);
                self.pause(self.config.hop_sleep).await?;

                let request = ProbeRequest {
                    src: self.source,
                    dst: self.target,
                    ttl,
                    id: self.identifier,
                    seq,
                    timeout: self.config.timeout,
                    expected_peer: None,
                };

                let outcome = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(EngineError::Cancelled),
                    result = self.prober.probe(request) => result?,
                };

                {
                    let mut state = self.state.write();
                    state.register(ttl, outcome.clone());
                }
                self.signal_update().await?;

                if outcome.responder == Some(self.target) {
                    break;
                }
                if !outcome.success {
                    unknown_streak += 1;
                    if unknown_streak >= u32::from(self.config.max_unknown_hops) {
                        return Err(EngineError::MaxUnknownHops);
                    }
                } else {
                    unknown_streak = 0;
                }
            }
        }

        Ok(())
    }

    // Cancellation outranks whatever the suspension point was waiting for.
    async fn pause(&self, duration: Duration) -> Result<(), EngineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Tell the renderer a hop statistic changed. A closed receiver just
    /// means nobody is watching.
    async fn signal_update(&self) -> Result<(), EngineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            _ = self.updates.send(()) => Ok(()),
        }
    }
}
