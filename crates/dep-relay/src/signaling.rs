//! Signaling channel (§4.9.2): the relay forwards hole-punch
//! coordination messages between two of its own clients. Both ends must
//! hold a currently-valid reservation; a disconnected or expired client
//! simply has no forwarding target.

use dashmap::DashMap;
use dep_core::NodeId;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{RelayError, RelayResult};

#[derive(Debug, Clone)]
pub struct SignalingMessage {
    pub from: NodeId,
    pub payload: Vec<u8>,
}

/// Whatever tracks reservation validity (the relay's reservation table);
/// kept as a trait so this module doesn't need to know the table's
/// storage details.
pub trait ReservationLookup: Send + Sync {
    fn has_valid_reservation(&self, node_id: &NodeId) -> bool;
}

/// Per-client inbound signaling queues, keyed by the holding client's
/// `NodeId`. A client registers its sender half when its relay
/// connection is established and unregisters on disconnect.
#[derive(Default)]
pub struct SignalingHub {
    inboxes: DashMap<NodeId, mpsc::Sender<SignalingMessage>>,
}

impl SignalingHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node_id: NodeId, inbox: mpsc::Sender<SignalingMessage>) {
        self.inboxes.insert(node_id, inbox);
    }

    pub fn unregister(&self, node_id: &NodeId) {
        self.inboxes.remove(node_id);
    }

    /// `send_signaling` (§4.9.2). Requires both `from` and `target` to
    /// currently hold a valid reservation with this relay.
    pub async fn send_signaling(
        &self,
        from: NodeId,
        target: NodeId,
        payload: Vec<u8>,
        reservations: &dyn ReservationLookup,
    ) -> RelayResult<()> {
        if !reservations.has_valid_reservation(&from) || !reservations.has_valid_reservation(&target) {
            return Err(RelayError::TargetNotReserved);
        }

        let inbox = self.inboxes.get(&target).ok_or(RelayError::UnknownTarget)?.clone();
        debug!(%from, %target, "forwarding signaling message");
        inbox
            .send(SignalingMessage { from, payload })
            .await
            .map_err(|_| RelayError::UnknownTarget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllReserved;
    impl ReservationLookup for AllReserved {
        fn has_valid_reservation(&self, _node_id: &NodeId) -> bool {
            true
        }
    }

    struct NoneReserved;
    impl ReservationLookup for NoneReserved {
        fn has_valid_reservation(&self, _node_id: &NodeId) -> bool {
            false
        }
    }

    fn node(b: u8) -> NodeId {
        NodeId::from_public_key_bytes(&[b; 32])
    }

    #[tokio::test]
    async fn message_reaches_a_registered_target() {
        let hub = SignalingHub::new();
        let (tx, mut rx) = mpsc::channel(4);
        let target = node(2);
        hub.register(target, tx);

        hub.send_signaling(node(1), target, b"hello".to_vec(), &AllReserved)
            .await
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.from, node(1));
        assert_eq!(msg.payload, b"hello");
    }

    #[tokio::test]
    async fn unregistered_target_fails() {
        let hub = SignalingHub::new();
        let err = hub
            .send_signaling(node(1), node(2), vec![], &AllReserved)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UnknownTarget));
    }

    #[tokio::test]
    async fn without_a_reservation_signaling_is_refused() {
        let hub = SignalingHub::new();
        let (tx, _rx) = mpsc::channel(4);
        let target = node(2);
        hub.register(target, tx);

        let err = hub
            .send_signaling(node(1), target, vec![], &NoneReserved)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::TargetNotReserved));
    }
}
