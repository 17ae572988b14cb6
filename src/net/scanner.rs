use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;

use crate::constants::{FALLBACK_SUBNETS, PORT, SCAN_CONNECT_TIMEOUT, SCAN_MAX_IN_FLIGHT};

/// Enumerates candidate /24s to probe: local interface subnets plus the
/// fixed fallback list, matching the discovery approach described in
/// SPEC_FULL.md §4.5 (the Python original had no equivalent, relying on
/// `gateway_discovery.py`'s reactive peer-sharing only).
pub fn candidate_hosts() -> Vec<Ipv4Addr> {
    let mut hosts = Vec::new();
    for iface_ip in local_ipv4_addrs() {
        let octets = iface_ip.octets();
        for last in 1..=254u8 {
            hosts.push(Ipv4Addr::new(octets[0], octets[1], octets[2], last));
        }
    }
    for &(a, b, c, _) in FALLBACK_SUBNETS {
        for last in 1..=254u8 {
            hosts.push(Ipv4Addr::new(a, b, c, last));
        }
    }
    hosts
}

/// This node's best-guess LAN-facing address, falling back to loopback when
/// none can be determined (e.g. no network interfaces up).
pub fn local_ip_or_loopback() -> Ipv4Addr {
    local_ipv4_addrs().into_iter().next().unwrap_or(Ipv4Addr::LOCALHOST)
}

/// Best-effort enumeration of this host's non-loopback IPv4 addresses. No
/// portable stdlib API exists for this, so we probe by opening a UDP socket
/// toward a public address without sending anything — a common trick to
/// learn the outbound-facing local address without any network traffic.
fn local_ipv4_addrs() -> Vec<Ipv4Addr> {
    match std::net::UdpSocket::bind("0.0.0.0:0").and_then(|sock| {
        sock.connect("8.8.8.8:80")?;
        sock.local_addr()
    }) {
        Ok(addr) => match addr.ip() {
            std::net::IpAddr::V4(v4) => vec![v4],
            std::net::IpAddr::V6(_) => Vec::new(),
        },
        Err(_) => Vec::new(),
    }
}

/// Probes candidate hosts concurrently (bounded by a semaphore) and returns
/// those that accept a TCP connection on `PORT`.
pub async fn discover_peers(hosts: Vec<Ipv4Addr>, self_ip: Option<Ipv4Addr>) -> Vec<Ipv4Addr> {
    let semaphore = Arc::new(Semaphore::new(SCAN_MAX_IN_FLIGHT));
    let mut tasks = Vec::with_capacity(hosts.len());

    for host in hosts {
        if Some(host) == self_ip {
            continue;
        }
        let permit = semaphore.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit.acquire_owned().await.ok()?;
            probe(host).await.then_some(host)
        }));
    }

    let mut found = Vec::new();
    for task in tasks {
        if let Ok(Some(host)) = task.await {
            found.push(host);
        }
    }
    found
}

async fn probe(host: Ipv4Addr) -> bool {
    let addr = (host, PORT);
    matches!(
        tokio::time::timeout(SCAN_CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_hosts_includes_fallback_subnets() {
        let hosts = candidate_hosts();
        assert!(hosts.contains(&Ipv4Addr::new(192, 168, 1, 1)));
        assert!(hosts.contains(&Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[tokio::test]
    async fn probing_an_unreachable_host_returns_false() {
        let unreachable = Ipv4Addr::new(198, 51, 100, 1);
        let found = discover_peers(vec![unreachable], None).await;
        assert!(found.is_empty());
    }
}
