// ICMP sweeper: raw ICMP echo over `socket2` + `pnet_packet::icmp`, run on
// `spawn_blocking` workers bounded by a semaphore. The only suspension
// points are blocking-pool queuing and the OS read/write; there is no
// busy-loop polling.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::Packet;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{ReconError, Result};

#[derive(Debug, Clone)]
pub struct PingResult {
    pub ip: Ipv4Addr,
    pub alive: bool,
    pub rtt: Option<Duration>,
    pub ttl: Option<u8>,
}

/// Maps an observed TTL to a coarse OS hint by range (spec.md §4.2):
/// `[225,255] -> network_equipment`, `[110,128] -> windows`,
/// `[35,64] -> linux`; anything else (including 0 and negative values,
/// which can't occur in a real `u8` TTL but are accepted here as `i32` for
/// the boundary test in spec.md §8) yields an empty string.
pub fn ttl_to_os_hint(ttl: i32) -> String {
    match ttl {
        225..=255 => "network_equipment".to_string(),
        110..=128 => "windows".to_string(),
        35..=64 => "linux".to_string(),
        _ => String::new(),
    }
}

/// Sweeps every host in `hosts`, bounded by `concurrency` in-flight probes.
/// A collector error for a single host never aborts the sweep: hosts that
/// can't be probed (e.g. missing raw-socket privilege) come back as
/// `alive = false`.
pub async fn sweep(
    hosts: Vec<Ipv4Addr>,
    concurrency: usize,
    timeout: Duration,
    count: u32,
) -> Vec<PingResult> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(hosts.len());

    for ip in hosts {
        let permit = semaphore.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore closed");
            tokio::task::spawn_blocking(move || ping_host(ip, timeout, count))
                .await
                .unwrap_or(PingResult { ip, alive: false, rtt: None, ttl: None })
        }));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(r) => results.push(r),
            Err(e) => warn!(error = %e, "icmp sweep task panicked"),
        }
    }
    results
}

/// Sends up to `count` echo requests to `ip`, each bounded by `timeout`,
/// and returns on the first reply (or after exhausting `count` attempts).
fn ping_host(ip: Ipv4Addr, timeout: Duration, count: u32) -> PingResult {
    for attempt in 0..count.max(1) {
        match send_one_echo(ip, timeout, attempt as u16) {
            Ok((rtt, ttl)) => {
                return PingResult { ip, alive: true, rtt: Some(rtt), ttl: Some(ttl) };
            }
            Err(e) => {
                debug!(%ip, attempt, error = %e, "icmp probe attempt failed");
            }
        }
    }
    PingResult { ip, alive: false, rtt: None, ttl: None }
}

fn send_one_echo(ip: Ipv4Addr, timeout: Duration, sequence: u16) -> Result<(Duration, u8)> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(|e| {
        ReconError::CollectorProtocol {
            collector: "icmp",
            target: ip.to_string(),
            detail: format!("opening raw socket: {e} (requires CAP_NET_RAW / root)"),
        }
    })?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ReconError::CollectorProtocol {
            collector: "icmp",
            target: ip.to_string(),
            detail: e.to_string(),
        })?;

    let mut buf = [0u8; 64];
    {
        let mut echo = MutableEchoRequestPacket::new(&mut buf[..]).expect("buffer large enough for echo request");
        echo.set_icmp_type(IcmpTypes::EchoRequest);
        echo.set_icmp_code(IcmpCode::new(0));
        echo.set_identifier(std::process::id() as u16);
        echo.set_sequence_number(sequence);
        let checksum = pnet_packet::util::checksum(echo.packet(), 1);
        echo.set_checksum(checksum);
    }

    let dest: SocketAddr = SocketAddr::new(IpAddr::V4(ip), 0);
    let start = Instant::now();
    socket.send_to(&buf, &dest.into()).map_err(|e| ReconError::CollectorTimeout {
        collector: "icmp",
        target: ip.to_string(),
    }.into_detailed(e))?;

    let mut recv_buf = [std::mem::MaybeUninit::new(0u8); 128];
    let (n, _addr) = socket.recv_from(&mut recv_buf).map_err(|_| ReconError::CollectorTimeout {
        collector: "icmp",
        target: ip.to_string(),
    })?;
    let rtt = start.elapsed();

    // The kernel hands back the full IPv4 datagram on a raw ICMP socket;
    // the header length is encoded in the low nibble of the first byte.
    let bytes: Vec<u8> = recv_buf[..n].iter().map(|b| unsafe { b.assume_init() }).collect();
    if bytes.is_empty() {
        return Err(ReconError::CollectorProtocol {
            collector: "icmp",
            target: ip.to_string(),
            detail: "empty reply".to_string(),
        });
    }
    let ip_header_len = ((bytes[0] & 0x0f) as usize) * 4;
    let ttl = *bytes.get(8).unwrap_or(&0);
    let icmp_bytes = bytes.get(ip_header_len..).unwrap_or(&[]);

    let reply = IcmpPacket::new(icmp_bytes).ok_or_else(|| ReconError::CollectorProtocol {
        collector: "icmp",
        target: ip.to_string(),
        detail: "truncated ICMP reply".to_string(),
    })?;
    if reply.get_icmp_type() != IcmpTypes::EchoReply {
        return Err(ReconError::CollectorProtocol {
            collector: "icmp",
            target: ip.to_string(),
            detail: format!("unexpected ICMP type {:?}", reply.get_icmp_type()),
        });
    }
    let _ = EchoReplyPacket::new(icmp_bytes);

    Ok((rtt, ttl))
}

// Small helper so the error-construction call sites above read linearly;
// `CollectorTimeout` carries no room for the underlying I/O error text, so
// this widens it into `CollectorProtocol` instead of losing the detail.
trait IntoDetailed {
    fn into_detailed(self, e: std::io::Error) -> ReconError;
}

impl IntoDetailed for ReconError {
    fn into_detailed(self, e: std::io::Error) -> ReconError {
        match self {
            ReconError::CollectorTimeout { collector, target } => ReconError::CollectorProtocol {
                collector,
                target,
                detail: e.to_string(),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_hint_boundaries() {
        assert_eq!(ttl_to_os_hint(255), "network_equipment");
        assert_eq!(ttl_to_os_hint(225), "network_equipment");
        assert_eq!(ttl_to_os_hint(128), "windows");
        assert_eq!(ttl_to_os_hint(110), "windows");
        assert_eq!(ttl_to_os_hint(64), "linux");
        assert_eq!(ttl_to_os_hint(35), "linux");
    }

    #[test]
    fn test_ttl_hint_out_of_range_is_empty() {
        for ttl in [0, 34, 100, 200, -1, -50] {
            assert_eq!(ttl_to_os_hint(ttl), "");
        }
    }
}
