//! Candidate addresses (§4.7): unverified hints from STUN, UPnP/NAT-PMP
//! port mappings, or raw socket observations. Never published anywhere
//! until validated.

use std::time::{Duration, Instant};

use dep_core::Multiaddr;

/// Expiry window for a candidate without a successful re-probe (§4.7).
pub const CANDIDATE_TTL: Duration = Duration::from_secs(5 * 60);

/// Where a candidate address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateSource {
    Stun,
    Upnp,
    NatPmp,
    Observed,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub addr: Multiaddr,
    pub source: CandidateSource,
    pub reported_at: Instant,
    pub last_reprobe: Instant,
}

impl Candidate {
    pub fn new(addr: Multiaddr, source: CandidateSource) -> Self {
        let now = Instant::now();
        Self {
            addr,
            source,
            reported_at: now,
            last_reprobe: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.last_reprobe.elapsed() > CANDIDATE_TTL
    }

    pub fn mark_reprobed(&mut self) {
        self.last_reprobe = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_candidate_is_not_expired() {
        let addr: Multiaddr = "/ip4/203.0.113.1/udp/4001/quic-v1".parse().unwrap();
        let c = Candidate::new(addr, CandidateSource::Stun);
        assert!(!c.is_expired());
    }
}
