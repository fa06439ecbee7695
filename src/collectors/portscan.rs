// Port scanner: TCP connect attempts under a bounded semaphore. Returns
// open ports sorted ascending; never fails the caller (an unreachable port
// is indistinguishable from a closed one).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use super::PROBE_PORTS;

/// Probes `ports` on `ip`, `concurrency` dials in flight at once (default
/// 10 per host, per spec.md §5), each bounded by `per_port_timeout`.
/// Returns the subset that accepted a connection, ascending.
pub async fn scan(
    ip: IpAddr,
    ports: &[u16],
    concurrency: usize,
    per_port_timeout: Duration,
) -> Vec<u16> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(ports.len());

    for &port in ports {
        let permit = semaphore.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore closed");
            let addr = SocketAddr::new(ip, port);
            match timeout(per_port_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_stream)) => Some(port),
                _ => None,
            }
        }));
    }

    let mut open: Vec<u16> = Vec::new();
    for task in tasks {
        if let Ok(Some(port)) = task.await {
            open.push(port);
        }
    }
    open.sort_unstable();
    open
}

/// Probes the fixed infrastructure port set (spec.md §4.2/§6).
pub async fn scan_probe_set(ip: IpAddr, concurrency: usize, per_port_timeout: Duration) -> Vec<u16> {
    scan(ip, PROBE_PORTS, concurrency, per_port_timeout).await
}
