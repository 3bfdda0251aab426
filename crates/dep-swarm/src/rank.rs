//! Address ranking (§4.5.3): private/loopback first, then QUIC, then TCP,
//! then relay-circuit, then everything else. Within a class, lower
//! observed RTT sorts first; unknown RTT sorts last in its class.

use std::net::IpAddr;
use std::time::Duration;

use dep_core::{Multiaddr, Protocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum AddrClass {
    PrivateOrLoopback,
    Quic,
    Tcp,
    RelayCircuit,
    Other,
}

fn is_private_or_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn classify(addr: &Multiaddr) -> AddrClass {
    let mut ip = None;
    let mut has_quic = false;
    let mut has_tcp = false;
    let mut has_relay = false;

    for proto in addr.iter() {
        match proto {
            Protocol::Ip4(v) => ip = Some(IpAddr::V4(v)),
            Protocol::Ip6(v) => ip = Some(IpAddr::V6(v)),
            Protocol::QuicV1 | Protocol::Quic => has_quic = true,
            Protocol::Tcp(_) => has_tcp = true,
            Protocol::P2pCircuit => has_relay = true,
            _ => {}
        }
    }

    if let Some(ip) = ip {
        if is_private_or_loopback(ip) {
            return AddrClass::PrivateOrLoopback;
        }
    }
    if has_relay {
        AddrClass::RelayCircuit
    } else if has_quic {
        AddrClass::Quic
    } else if has_tcp {
        AddrClass::Tcp
    } else {
        AddrClass::Other
    }
}

/// Rank `addrs` per §4.5.3's default policy, given an RTT lookup
/// (`None` sorts last within its class).
pub fn rank_addrs(mut addrs: Vec<Multiaddr>, rtt_of: impl Fn(&Multiaddr) -> Option<Duration>) -> Vec<Multiaddr> {
    addrs.sort_by(|a, b| {
        let class_a = classify(a);
        let class_b = classify(b);
        class_a.cmp(&class_b).then_with(|| match (rtt_of(a), rtt_of(b)) {
            (Some(ra), Some(rb)) => ra.cmp(&rb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
    });
    addrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn private_addrs_sort_first() {
        let addrs = vec![
            addr("/ip4/8.8.8.8/udp/4001/quic-v1"),
            addr("/ip4/192.168.1.5/udp/4001/quic-v1"),
        ];
        let ranked = rank_addrs(addrs, |_| None);
        assert_eq!(ranked[0], addr("/ip4/192.168.1.5/udp/4001/quic-v1"));
    }

    #[test]
    fn quic_before_tcp_before_relay() {
        let addrs = vec![
            addr("/ip4/8.8.8.8/tcp/4001"),
            addr("/ip4/8.8.8.8/udp/4001/quic-v1"),
        ];
        let ranked = rank_addrs(addrs, |_| None);
        assert_eq!(ranked[0], addr("/ip4/8.8.8.8/udp/4001/quic-v1"));
    }

    #[test]
    fn lower_rtt_sorts_first_within_class() {
        let fast = addr("/ip4/8.8.8.8/udp/4001/quic-v1");
        let slow = addr("/ip4/8.8.4.4/udp/4001/quic-v1");
        let addrs = vec![slow.clone(), fast.clone()];
        let ranked = rank_addrs(addrs, |a| {
            if *a == fast {
                Some(Duration::from_millis(10))
            } else {
                Some(Duration::from_millis(200))
            }
        });
        assert_eq!(ranked[0], fast);
    }

    #[test]
    fn unknown_rtt_sorts_last_in_class() {
        let known = addr("/ip4/8.8.8.8/udp/4001/quic-v1");
        let unknown = addr("/ip4/8.8.4.4/udp/4001/quic-v1");
        let addrs = vec![unknown.clone(), known.clone()];
        let ranked = rank_addrs(addrs, |a| {
            if *a == known {
                Some(Duration::from_millis(50))
            } else {
                None
            }
        });
        assert_eq!(ranked[0], known);
        assert_eq!(ranked[1], unknown);
    }
}
