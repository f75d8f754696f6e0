use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::future::Future;
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use crate::probe::correlate::{OutstandingProbe, reply_matches};
use crate::probe::wire::{build_echo_request, parse_reply};
use crate::state::ProbeOutcome;

const RECV_BUFFER_LEN: usize = 1500;

/// Everything one probe needs: addressing, TTL, correlation identity and the
/// reply deadline. `expected_peer` restricts matching to one responder, used
/// when pinging the final destination directly.
#[derive(Debug, Clone, Copy)]
pub struct ProbeRequest {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub ttl: u8,
    pub id: u16,
    pub seq: u16,
    pub timeout: Duration,
    pub expected_peer: Option<IpAddr>,
}

/// The seam between the engine and the wire.
///
/// The real implementation opens a raw socket per call; tests substitute a
/// scripted one. An `Err` means the socket could not be created or bound and
/// is fatal to the run; a probe that merely saw no matching reply resolves to
/// `Ok` with a lost outcome.
pub trait Prober {
    fn probe(&self, req: ProbeRequest) -> impl Future<Output = io::Result<ProbeOutcome>> + Send;
}

/// Probes over raw ICMP/ICMPv6 sockets.
///
/// Each probe binds its own socket and reads with a deadline, so replies for
/// one probe can never be consumed by another; the per-probe bind cost buys
/// freedom from shared reply dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcmpProber;

impl Prober for IcmpProber {
    fn probe(&self, req: ProbeRequest) -> impl Future<Output = io::Result<ProbeOutcome>> + Send {
        async move {
            tokio::task::spawn_blocking(move || send_probe(req))
                .await
                .map_err(io::Error::other)?
        }
    }
}

/// Send one Echo Request and block until a matching reply or the deadline.
///
/// Socket errors after the bind are not fatal: like an expired deadline they
/// resolve to a lost outcome and the hop shows up as silent.
pub fn send_probe(req: ProbeRequest) -> io::Result<ProbeOutcome> {
    let probe = OutstandingProbe::new(req.id, req.seq, req.ttl, req.timeout);
    let socket = open_probe_socket(&req)?;

    let packet = match (req.src, req.dst) {
        (IpAddr::V6(src), IpAddr::V6(dst)) => {
            build_echo_request(req.id, req.seq, true, Some((src, dst)))
        }
        _ => build_echo_request(req.id, req.seq, false, None),
    };

    let dst = SockAddr::from(SocketAddr::new(req.dst, 0));
    if socket.send_to(&packet, &dst).is_err() {
        return Ok(ProbeOutcome::lost());
    }

    let mut buffer = [0u8; RECV_BUFFER_LEN];
    loop {
        let Some(remaining) = probe.deadline().checked_duration_since(Instant::now()) else {
            return Ok(ProbeOutcome::lost());
        };
        if remaining.is_zero() || socket.set_read_timeout(Some(remaining)).is_err() {
            return Ok(ProbeOutcome::lost());
        }

        let (len, peer) = match recv_datagram(&socket, &mut buffer) {
            Ok(read) => read,
            // WouldBlock / TimedOut mean the deadline elapsed; anything else
            // is equally unrecoverable within this probe's lifetime.
            Err(_) => return Ok(ProbeOutcome::lost()),
        };
        let Some(peer) = peer else { continue };

        if let Some(expected) = req.expected_peer
            && peer != expected
        {
            continue;
        }

        let Some(record) = parse_reply(&buffer[..len], peer, req.seq) else {
            continue;
        };
        if reply_matches(&record, &probe) {
            let elapsed = record.received_at.duration_since(probe.start_time);
            return Ok(ProbeOutcome::replied(peer, elapsed));
        }
        // Duplicate or foreign reply: keep reading until deadline.
    }
}

/// Bind a fresh raw ICMP socket of the destination's family and set the
/// outgoing TTL / hop limit. Failure here aborts the run.
fn open_probe_socket(req: &ProbeRequest) -> io::Result<Socket> {
    let (domain, protocol) = if req.dst.is_ipv6() {
        (Domain::IPV6, Protocol::ICMPV6)
    } else {
        (Domain::IPV4, Protocol::ICMPV4)
    };

    let socket = Socket::new(domain, Type::RAW, Some(protocol))?;
    socket.bind(&SockAddr::from(SocketAddr::new(req.src, 0)))?;

    if req.dst.is_ipv6() {
        socket.set_unicast_hops_v6(req.ttl as u32)?;
    } else {
        socket.set_ttl(req.ttl as u32)?;
    }

    Ok(socket)
}

fn recv_datagram(socket: &Socket, buffer: &mut [u8]) -> io::Result<(usize, Option<IpAddr>)> {
    // socket2 wants MaybeUninit; the buffer is already initialized.
    let uninit: &mut [MaybeUninit<u8>] = unsafe {
        std::slice::from_raw_parts_mut(buffer.as_mut_ptr() as *mut MaybeUninit<u8>, buffer.len())
    };

    let (len, addr) = socket.recv_from(uninit)?;
    Ok((len, addr.as_socket().map(|s| s.ip())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_request_is_copy() {
        let req = ProbeRequest {
            src: IpAddr::from([0, 0, 0, 0]),
            dst: IpAddr::from([10, 0, 0, 4]),
            ttl: 3,
            id: 7,
            seq: 9,
            timeout: Duration::from_millis(800),
            expected_peer: None,
        };
        let copy = req;
        assert_eq!(copy.ttl, req.ttl);
        assert_eq!(copy.dst, req.dst);
    }
}
