//! Hole punching (§4.8.3): coordinated simultaneous-dial over a
//! relay-provided signaling channel. This module only knows the protocol
//! shape; the signaling transport and the dial primitive are injected so
//! it never has to depend on the relay or swarm crates directly.

use std::time::Duration;

use dep_core::{Multiaddr, NatType};
use tracing::{info, instrument, warn};

use crate::error::{NatError, NatResult};

/// Protocol ID the initiator opens the signaling stream on (§4.8.3).
pub const HOLEPUNCH_PROTOCOL: &str = "/dep/sys/holepunch/1.0";

/// Overall deadline for the simultaneous-dial phase once candidates have
/// been exchanged.
pub const DIAL_WINDOW: Duration = Duration::from_secs(10);

/// A bidirectional channel carrying hole-punch coordination messages,
/// backed in practice by an established relay connection (§4.9.2).
#[async_trait::async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send_candidates(&self, addrs: &[Multiaddr]) -> NatResult<()>;
    async fn recv_candidates(&self) -> NatResult<Vec<Multiaddr>>;
}

/// Attempts a direct dial to one candidate address as part of the
/// "SYN-flood"-style simultaneous dial. `Output` is whatever connection
/// type the caller's transport layer produces.
#[async_trait::async_trait]
pub trait SimultaneousDialer: Send + Sync {
    type Output: Send + 'static;

    async fn dial(&self, addr: Multiaddr) -> NatResult<Self::Output>;
}

/// Check the two preconditions from §4.8.3 before attempting anything.
pub fn check_preconditions(
    has_signaling_channel: bool,
    local_nat: NatType,
    remote_nat: NatType,
) -> NatResult<()> {
    if !has_signaling_channel {
        return Err(NatError::NoSignalingChannel);
    }
    if local_nat.is_symmetric() && remote_nat.is_symmetric() {
        return Err(NatError::SymmetricNat);
    }
    Ok(())
}

/// Run the full protocol: exchange current observed candidates over
/// `signaling`, then simultaneously dial every address the remote side
/// offered via `dialer`. Returns the first connection that completes a
/// handshake. The signaling channel itself is left open by the caller on
/// both success and failure — it is kept as a signaling/relay backup
/// (§4.8.3), never closed by this function.
#[instrument(skip(signaling, dialer, local_candidates))]
pub async fn run_holepunch<D>(
    local_candidates: &[Multiaddr],
    local_nat: NatType,
    remote_nat: NatType,
    signaling: &dyn SignalingChannel,
    dialer: &D,
) -> NatResult<D::Output>
where
    D: SimultaneousDialer,
{
    check_preconditions(true, local_nat, remote_nat)?;

    signaling.send_candidates(local_candidates).await?;
    let remote_candidates = signaling.recv_candidates().await?;
    if remote_candidates.is_empty() {
        return Err(NatError::HolePunchTimedOut);
    }

    race_simultaneous_dial(remote_candidates, dialer, DIAL_WINDOW).await
}

async fn race_simultaneous_dial<D>(addrs: Vec<Multiaddr>, dialer: &D, window: Duration) -> NatResult<D::Output>
where
    D: SimultaneousDialer,
{
    use futures::stream::{FuturesUnordered, StreamExt};

    let mut futs: FuturesUnordered<_> = addrs.into_iter().map(|addr| dialer.dial(addr)).collect();

    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!("hole punch dial window expired");
                return Err(NatError::HolePunchTimedOut);
            }
            next = futs.next() => {
                match next {
                    Some(Ok(output)) => {
                        info!("hole punch succeeded");
                        return Ok(output);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "hole punch dial attempt failed");
                    }
                    None => return Err(NatError::HolePunchTimedOut),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_symmetric_nats_fail_fast() {
        let err = check_preconditions(true, NatType::Symmetric, NatType::Symmetric).unwrap_err();
        matches!(err, NatError::SymmetricNat);
    }

    #[test]
    fn missing_signaling_channel_fails_fast() {
        let err = check_preconditions(false, NatType::FullCone, NatType::FullCone).unwrap_err();
        matches!(err, NatError::NoSignalingChannel);
    }

    #[test]
    fn one_sided_symmetric_nat_is_allowed() {
        assert!(check_preconditions(true, NatType::Symmetric, NatType::FullCone).is_ok());
    }
}
