//! Custom tracing layer injecting the active node context into spans.

use tracing::{span, Subscriber};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::context::{NodeContextData, NodeContextGuard};

pub struct NodeContextLayer;

impl NodeContextLayer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NodeContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct NodeContextExtension {
    pub data: NodeContextData,
}

impl<S> Layer<S> for NodeContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(node_ctx) = NodeContextGuard::current() {
                span.extensions_mut()
                    .insert(NodeContextExtension { data: node_ctx });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dep_core::NodeId;

    #[test]
    fn layer_is_constructible() {
        let _layer = NodeContextLayer::new();
    }

    #[test]
    fn extension_carries_context_data() {
        let node_id = NodeId::from_public_key_bytes(&[4u8; 32]);
        let _guard = NodeContextGuard::new(&node_id);
        let ctx = NodeContextGuard::current().unwrap();
        let ext = NodeContextExtension { data: ctx };
        assert_eq!(ext.data.node_id, node_id.short_id());
    }
}
