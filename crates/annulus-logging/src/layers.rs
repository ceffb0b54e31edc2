//! Custom tracing layers for Annulus
//!
//! [`NodeContextLayer`] attaches the active node context to every new
//! span, so formatters and other layers can tell nodes apart even when
//! the span itself was opened without node fields.

use tracing::{Subscriber, span};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::context::{NodeContextData, NodeContextGuard};

/// Layer that copies the thread's node context onto new spans
#[derive(Debug, Default)]
pub struct NodeContextLayer;

impl NodeContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct NodeContextExtension {
    pub data: NodeContextData,
}

impl<S> Layer<S> for NodeContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        // inherit from the parent span when no guard is active
        let data = NodeContextGuard::current().or_else(|| {
            span.parent().and_then(|parent| {
                parent
                    .extensions()
                    .get::<NodeContextExtension>()
                    .map(|ext| ext.data.clone())
            })
        });
        if let Some(data) = data {
            span.extensions_mut().insert(NodeContextExtension { data });
        }
    }
}

/// The node context recorded on `span` or its nearest ancestor
pub fn node_context_of<S>(ctx: &Context<'_, S>, id: &span::Id) -> Option<NodeContextData>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    let span = ctx.span(id)?;
    span.scope().find_map(|s| {
        s.extensions()
            .get::<NodeContextExtension>()
            .map(|ext| ext.data.clone())
    })
}
