//! Node context injection for logging.
//!
//! A running node wraps its event loop in a [`NodeContextGuard`] so every
//! tracing event emitted on that thread carries the node's short id,
//! without threading a `NodeId` through every function signature.

use std::cell::RefCell;

use dep_core::NodeId;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NodeContextData {
    pub node_id: String,
    pub instance_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard that sets the node identity for the current thread's logs.
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    pub fn new(node_id: &NodeId) -> Self {
        Self::with_instance_id(node_id, Uuid::new_v4())
    }

    pub fn with_instance_id(node_id: &NodeId, instance_id: Uuid) -> Self {
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow().clone());
        let new_ctx = NodeContextData {
            node_id: node_id.short_id(),
            instance_id,
        };
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some(new_ctx));
        Self { previous }
    }

    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_node_id() -> Option<String> {
        Self::current().map(|ctx| ctx.node_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_set_and_cleared() {
        assert!(NodeContextGuard::current().is_none());
        let node_id = NodeId::from_public_key_bytes(&[9u8; 32]);
        {
            let _guard = NodeContextGuard::new(&node_id);
            assert_eq!(
                NodeContextGuard::current_node_id(),
                Some(node_id.short_id())
            );
        }
        assert!(NodeContextGuard::current().is_none());
    }

    #[test]
    fn nested_contexts_restore_outer() {
        let a = NodeId::from_public_key_bytes(&[1u8; 32]);
        let b = NodeId::from_public_key_bytes(&[2u8; 32]);

        let _guard_a = NodeContextGuard::new(&a);
        assert_eq!(NodeContextGuard::current_node_id(), Some(a.short_id()));
        {
            let _guard_b = NodeContextGuard::new(&b);
            assert_eq!(NodeContextGuard::current_node_id(), Some(b.short_id()));
        }
        assert_eq!(NodeContextGuard::current_node_id(), Some(a.short_id()));
    }
}
