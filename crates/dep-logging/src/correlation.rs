//! Correlation IDs for tracing a dial, handshake, or relay forward across
//! the async tasks that carry it out.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub hop_count: u32,
}

impl CorrelationContext {
    pub fn new_root() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            hop_count: 0,
        }
    }

    /// New span in the same trace, e.g. when a relay forwards a reservation
    /// request on to the destination peer.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            hop_count: self.hop_count + 1,
        }
    }

    pub fn trace_id_str(&self) -> String {
        self.trace_id.to_string()
    }

    pub fn span_id_str(&self) -> String {
        self.span_id.to_string()
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new_root()
    }
}

pub trait CorrelationExt {
    fn record_correlation(&self, ctx: &CorrelationContext);
}

impl CorrelationExt for tracing::Span {
    fn record_correlation(&self, ctx: &CorrelationContext) {
        self.record("trace_id", ctx.trace_id_str());
        self.record("span_id", ctx.span_id_str());
        if let Some(parent) = ctx.parent_span_id {
            self.record("parent_span_id", parent.to_string());
        }
        self.record("hop_count", ctx.hop_count);
    }
}

/// Standard field names, kept consistent across crates so log aggregation
/// queries don't have to guess a key per subsystem.
pub mod fields {
    pub const TRACE_ID: &str = "trace_id";
    pub const SPAN_ID: &str = "span_id";
    pub const PARENT_SPAN_ID: &str = "parent_span_id";
    pub const NODE_ID: &str = "node_id";
    pub const PEER_ID: &str = "peer_id";
    pub const REALM_ID: &str = "realm_id";
    pub const ADDR: &str = "addr";
    pub const DIRECTION: &str = "direction";
    pub const DECISION: &str = "decision";
    pub const REASON: &str = "reason";
    pub const LATENCY_MS: &str = "latency_ms";
}

/// Standard span names for the transport/swarm/NAT/relay/realm pipeline.
pub mod spans {
    pub const DIAL: &str = "dial";
    pub const ACCEPT: &str = "accept";
    pub const HANDSHAKE: &str = "handshake";
    pub const STREAM_OPEN: &str = "stream_open";
    pub const ADDRESS_RANK: &str = "address_rank";
    pub const AUTONAT_PROBE: &str = "autonat_probe";
    pub const HOLE_PUNCH: &str = "hole_punch";
    pub const RELAY_RESERVE: &str = "relay_reserve";
    pub const RELAY_FORWARD: &str = "relay_forward";
    pub const DHT_LOOKUP: &str = "dht_lookup";
    pub const REALM_AUTH: &str = "realm_auth";
    pub const REALM_CONNECT: &str = "realm_connect";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_shares_trace_increments_hop() {
        let root = CorrelationContext::new_root();
        let child = root.child();
        assert_eq!(child.trace_id, root.trace_id);
        assert_ne!(child.span_id, root.span_id);
        assert_eq!(child.parent_span_id, Some(root.span_id));
        assert_eq!(child.hop_count, 1);
    }

    #[test]
    fn chain_preserves_trace_id() {
        let root = CorrelationContext::new_root();
        let c1 = root.child();
        let c2 = c1.child();
        assert_eq!(c1.trace_id, root.trace_id);
        assert_eq!(c2.trace_id, root.trace_id);
        assert_eq!(c2.hop_count, 2);
    }
}
