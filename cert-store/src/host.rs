//! Best-effort discovery of the addresses this host is reachable on.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, UdpSocket};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostIps {
    pub public: Vec<IpAddr>,
    pub private: Vec<IpAddr>,
}

impl HostIps {
    pub fn all(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.public.iter().chain(self.private.iter()).copied()
    }

    fn push(&mut self, ip: IpAddr) {
        if ip.is_loopback() || ip.is_unspecified() || self.all().any(|known| known == ip) {
            return;
        }
        if is_private(&ip) {
            self.private.push(ip);
        } else {
            self.public.push(ip);
        }
    }
}

/// Source addresses the kernel would pick for outbound IPv4 and IPv6 traffic.
///
/// Connecting a UDP socket sends nothing; it only asks the routing table for
/// a source address. Hosts without a route simply contribute nothing.
pub fn host_ips() -> HostIps {
    let mut ips = HostIps::default();
    let probes: [(IpAddr, IpAddr); 2] = [
        (
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
        ),
        (
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)),
        ),
    ];

    for (bind, target) in probes {
        match route_source(bind, target) {
            Ok(ip) => ips.push(ip),
            Err(e) => tracing::debug!(error = %e, %target, "No route for host IP discovery"),
        }
    }
    ips
}

fn route_source(bind: IpAddr, target: IpAddr) -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind((bind, 0))?;
    socket.connect((target, 9))?;
    Ok(socket.local_addr()?.ip())
}

fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || is_shared(v4),
        // fc00::/7 unique local, fe80::/10 link local
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

// 100.64.0.0/10 carrier-grade NAT
fn is_shared(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 100 && (b & 0xc0) == 64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_addresses() {
        let mut ips = HostIps::default();
        for ip in [
            "10.0.0.4",
            "192.168.1.9",
            "100.72.3.1",
            "8.8.8.8",
            "127.0.0.1",
            "fd00::1",
            "2606:4700::1111",
            "10.0.0.4",
        ] {
            ips.push(ip.parse().unwrap());
        }

        let private: Vec<String> = ips.private.iter().map(ToString::to_string).collect();
        let public: Vec<String> = ips.public.iter().map(ToString::to_string).collect();
        assert_eq!(private, ["10.0.0.4", "192.168.1.9", "100.72.3.1", "fd00::1"]);
        assert_eq!(public, ["8.8.8.8", "2606:4700::1111"]);
    }

    #[test]
    fn discovery_never_reports_loopback() {
        assert!(host_ips().all().all(|ip| !ip.is_loopback()));
    }
}
