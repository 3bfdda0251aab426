//! Data forwarding (§4.9.3): `dial_via_relay` establishes a circuit by
//! splicing the stream client A opened to the relay together with the
//! stream the relay opens onward to client B. End-to-end security
//! survives the hop because each half is still its own TLS tunnel —
//! the relay moves ciphertext bytes, nothing more.

use dep_core::NodeId;
use dep_transport::MuxedStream;
use tokio::io::copy_bidirectional;
use tracing::{debug, warn};

use crate::error::RelayResult;
use crate::limits::LimitsPolicy;

/// Splice two already-open streams until either side closes or an error
/// occurs. Returns the `(bytes_a_to_b, bytes_b_to_a)` counters on a clean
/// close.
pub async fn splice(a: &mut MuxedStream, b: &mut MuxedStream) -> RelayResult<(u64, u64)> {
    let (from_a, from_b) = copy_bidirectional(a, b).await?;
    Ok((from_a, from_b))
}

/// Circuit bookkeeping the relay keeps per active forwarded connection,
/// so [`LimitsPolicy`] can be enforced against it.
pub struct CircuitHandle {
    pub client_a: NodeId,
    pub client_b: NodeId,
}

/// `dial_via_relay` (§4.9.3): client A has already opened `inbound` to
/// the relay asking to reach `target`; `outbound` is the stream the
/// relay opened to `target` in response. This function just enforces the
/// connection-count limit and then runs the splice; the dial to `target`
/// itself is the caller's concern (it goes through the same transport
/// registry the relay uses for everything else).
pub async fn forward_circuit(
    circuit: CircuitHandle,
    mut inbound: MuxedStream,
    mut outbound: MuxedStream,
    limits: &LimitsPolicy,
    active_connections: usize,
) -> RelayResult<()> {
    limits.check_connection_budget(active_connections)?;

    debug!(client_a = %circuit.client_a, client_b = %circuit.client_b, "relay circuit established");
    match splice(&mut inbound, &mut outbound).await {
        Ok((a_to_b, b_to_a)) => {
            debug!(a_to_b, b_to_a, "relay circuit closed cleanly");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "relay circuit splice failed");
            Err(e)
        }
    }
}
