use anyhow::Result;
use crossterm::QueueableCommand;
use crossterm::cursor::MoveTo;
use crossterm::terminal::{Clear, ClearType};
use parking_lot::RwLock;
use std::io::{Write, stdout};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::lookup::RdnsCache;
use crate::state::{HopReport, Session, UNKNOWN_HOP};

/// Live terminal table, repainted in place after every update signal.
pub struct Renderer {
    state: Arc<RwLock<Session>>,
    rdns: Option<RdnsCache>,
    buffer_size: usize,
}

impl Renderer {
    pub fn new(state: Arc<RwLock<Session>>, ptr_lookup: bool) -> Self {
        let buffer_size = state.read().config.buffer_size;
        Self {
            state,
            rdns: ptr_lookup.then(RdnsCache::new),
            buffer_size,
        }
    }

    /// Repaint until the update channel closes, then draw the final frame.
    pub async fn run(
        mut self,
        mut updates: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut out = stdout();
        out.queue(Clear(ClearType::All))?;
        out.flush()?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                update = updates.recv() => {
                    if update.is_none() {
                        break;
                    }
                    self.paint().await?;
                }
            }
        }

        self.paint().await?;
        Ok(())
    }

    async fn paint(&mut self) -> Result<()> {
        let snapshot = self.state.read().snapshot();

        let mut out = stdout();
        out.queue(MoveTo(0, 0))?;
        write_line(
            &mut out,
            &format!(
                "HOP:    {:<24}  {:>5}%  {:>4}  {:>6}  {:>6}  {:>6}  {:>6}  {:>width$}",
                "Address",
                "Loss",
                "Sent",
                "Last",
                "Avg",
                "Best",
                "Worst",
                "Packets",
                width = self.buffer_size
            ),
        )?;

        for hop in snapshot.statistic.values() {
            let address = self.display_address(hop).await;
            write_line(
                &mut out,
                &format!(
                    "{:3}:|-- {:<24}  {:>5.1}%  {:>4}  {:>6.1}  {:>6.1}  {:>6.1}  {:>6.1}  {}",
                    hop.ttl,
                    truncate(&address, 24),
                    hop.loss_percent,
                    hop.sent,
                    hop.last_ms,
                    hop.avg_ms,
                    hop.best_ms,
                    hop.worst_ms,
                    packet_glyphs(hop),
                ),
            )?;
        }

        out.flush()?;
        Ok(())
    }

    async fn display_address(&mut self, hop: &HopReport) -> String {
        if hop.target == UNKNOWN_HOP {
            return hop.target.clone();
        }
        let Some(rdns) = self.rdns.as_mut() else {
            return hop.target.clone();
        };
        let Ok(ip) = hop.target.parse() else {
            return hop.target.clone();
        };
        match rdns.lookup(ip).await {
            Some(name) => name,
            None => hop.target.clone(),
        }
    }
}

/// One glyph per ring slot, oldest first: never probed, lost, answered.
fn packet_glyphs(hop: &HopReport) -> String {
    hop.packet_list_ms
        .iter()
        .map(|slot| match slot {
            None => ' ',
            Some(p) if p.success => '.',
            Some(_) => '?',
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn write_line<W: Write>(out: &mut W, line: &str) -> Result<()> {
    write!(out, "{line}")?;
    out.queue(Clear(ClearType::UntilNewLine))?;
    write!(out, "\r\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PacketReport;

    fn report_with_packets(packets: Vec<Option<PacketReport>>) -> HopReport {
        HopReport {
            ttl: 1,
            sent: packets.len() as u64,
            target: "10.0.0.1".into(),
            last_ms: 0.0,
            best_ms: 0.0,
            worst_ms: 0.0,
            avg_ms: 0.0,
            stdev_ms: 0.0,
            loss_percent: 0.0,
            packet_buffer_size: packets.len(),
            packet_list_ms: packets,
        }
    }

    #[test]
    fn test_packet_glyphs() {
        let hop = report_with_packets(vec![
            None,
            Some(PacketReport {
                success: false,
                respond_ms: 0.0,
            }),
            Some(PacketReport {
                success: true,
                respond_ms: 12.5,
            }),
        ]);
        assert_eq!(packet_glyphs(&hop), " ?.");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 4), "abcd");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
