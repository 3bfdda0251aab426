//! UPnP / NAT-PMP port mapping (§4.8.2): discover an IGD gateway, request
//! a mapping, report the external address as a candidate, and renew
//! before the lease expires.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use dep_core::Multiaddr;
use dep_reachability::{CandidateSource, ReachabilityCoordinator};
use igd_next::aio::tokio::search_gateway;
use igd_next::{PortMappingProtocol, SearchOptions};
use tracing::{info, instrument, warn};

use crate::error::{NatError, NatResult};

/// Mapping lease TTL (§4.8.2).
pub const MAPPING_TTL: Duration = Duration::from_secs(3600);
/// Renew a little before the lease would otherwise expire.
pub const RENEWAL_MARGIN: Duration = Duration::from_secs(300);

pub struct PortMapping {
    pub external_port: u16,
    pub internal_port: u16,
    pub local_addr: SocketAddrV4,
}

/// Discover a gateway, map `internal_port -> external_port`, and return
/// the external multiaddr to report as a candidate.
#[instrument]
pub async fn map_port(internal_port: u16, external_port: u16, description: &str) -> NatResult<Multiaddr> {
    let gateway = search_gateway(SearchOptions::default())
        .await
        .map_err(|_| NatError::NoGateway)?;

    let local_ip = local_ipv4().ok_or(NatError::NoGateway)?;
    let local_addr = SocketAddrV4::new(local_ip, internal_port);

    gateway
        .add_port(
            PortMappingProtocol::UDP,
            external_port,
            local_addr,
            MAPPING_TTL.as_secs() as u32,
            description,
        )
        .await
        .map_err(|e| NatError::PortMappingRejected(e.to_string()))?;

    let external_ip = gateway
        .get_external_ip()
        .await
        .map_err(|e| NatError::PortMappingRejected(e.to_string()))?;

    info!(%external_ip, external_port, "UPnP port mapping established");
    format!("/ip4/{external_ip}/udp/{external_port}/quic-v1")
        .parse()
        .map_err(|_| NatError::PortMappingRejected("failed to build multiaddr from mapping".into()))
}

fn local_ipv4() -> Option<Ipv4Addr> {
    // Best-effort: connect a UDP socket to a public address without sending
    // anything, then read the local address the kernel picked for the
    // default route. This never transmits a packet.
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("1.1.1.1:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(v4) => Some(v4),
        std::net::IpAddr::V6(_) => None,
    }
}

/// Periodically renew `mapping` until cancelled, reporting each refreshed
/// external address to `coordinator` as a candidate (§4.8.2).
pub async fn run_renewal_loop(
    mapping: PortMapping,
    description: String,
    coordinator: std::sync::Arc<ReachabilityCoordinator>,
    cancel: tokio_util::sync::CancellationToken,
) {
    let renew_every = MAPPING_TTL.saturating_sub(RENEWAL_MARGIN);
    loop {
        match map_port(mapping.internal_port, mapping.external_port, &description).await {
            Ok(addr) => coordinator.report_candidate(addr, CandidateSource::Upnp),
            Err(e) => warn!(error = %e, "UPnP renewal failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(renew_every) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renewal_margin_is_smaller_than_the_lease() {
        assert!(RENEWAL_MARGIN < MAPPING_TTL);
    }
}
