use std::time::{Duration, Instant};

use crate::probe::wire::{ECHO_PAYLOAD_LEN, ReplyKind, ReplyRecord, echo_payload};

/// An in-flight probe awaiting its reply.
///
/// The correlation key is `(id, seq)` for both address families; `ttl` rides
/// along for diagnostics only. Sequence numbers increase monotonically within
/// a run, so a key is never reused while a probe is outstanding.
#[derive(Debug, Clone, Copy)]
pub struct OutstandingProbe {
    pub id: u16,
    pub seq: u16,
    pub ttl: u8,
    pub start_time: Instant,
    pub timeout: Duration,
}

impl OutstandingProbe {
    pub fn new(id: u16, seq: u16, ttl: u8, timeout: Duration) -> Self {
        Self {
            id,
            seq,
            ttl,
            start_time: Instant::now(),
            timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.start_time + self.timeout
    }

    pub fn expected_payload(&self) -> [u8; ECHO_PAYLOAD_LEN] {
        echo_payload(self.seq)
    }
}

/// Whether a parsed reply belongs to `probe`.
///
/// Echo Replies must match identifier, sequence and the embedded payload;
/// Time-Exceeded messages match on the quoted inner `(id, seq)`. Everything
/// else never matches. The caller stops reading on the first match, which
/// gives each probe its at-most-one reply.
pub fn reply_matches(reply: &ReplyRecord, probe: &OutstandingProbe) -> bool {
    match &reply.kind {
        ReplyKind::EchoReply { id, seq, payload } => {
            *id == probe.id && *seq == probe.seq && payload[..] == probe.expected_payload()
        }
        ReplyKind::TimeExceeded { inner } => *inner == Some((probe.id, probe.seq)),
        ReplyKind::Other => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn record(kind: ReplyKind) -> ReplyRecord {
        ReplyRecord {
            responder: IpAddr::from([192, 0, 2, 1]),
            received_at: Instant::now(),
            kind,
        }
    }

    fn probe() -> OutstandingProbe {
        OutstandingProbe::new(0xABCD, 0x1234, 5, Duration::from_millis(800))
    }

    #[test]
    fn test_echo_reply_matches_on_id_seq_payload() {
        let reply = record(ReplyKind::EchoReply {
            id: 0xABCD,
            seq: 0x1234,
            payload: echo_payload(0x1234).to_vec(),
        });
        assert!(reply_matches(&reply, &probe()));
    }

    #[test]
    fn test_echo_reply_rejects_wrong_identifier() {
        let reply = record(ReplyKind::EchoReply {
            id: 0xABCE,
            seq: 0x1234,
            payload: echo_payload(0x1234).to_vec(),
        });
        assert!(!reply_matches(&reply, &probe()));
    }

    #[test]
    fn test_echo_reply_rejects_wrong_payload() {
        // Right id/seq but a foreign payload, e.g. another ping utility.
        let reply = record(ReplyKind::EchoReply {
            id: 0xABCD,
            seq: 0x1234,
            payload: vec![0u8; 56],
        });
        assert!(!reply_matches(&reply, &probe()));
    }

    #[test]
    fn test_time_exceeded_matches_on_inner() {
        let reply = record(ReplyKind::TimeExceeded {
            inner: Some((0xABCD, 0x1234)),
        });
        assert!(reply_matches(&reply, &probe()));

        let stale = record(ReplyKind::TimeExceeded {
            inner: Some((0xABCD, 0x1233)),
        });
        assert!(!reply_matches(&stale, &probe()));

        let undecoded = record(ReplyKind::TimeExceeded { inner: None });
        assert!(!reply_matches(&undecoded, &probe()));
    }

    #[test]
    fn test_other_never_matches() {
        assert!(!reply_matches(&record(ReplyKind::Other), &probe()));
    }

    #[test]
    fn test_deadline_is_start_plus_timeout() {
        let p = probe();
        assert_eq!(p.deadline(), p.start_time + Duration::from_millis(800));
    }
}
