//! Node context for multi-node logging
//!
//! A simulation runs many nodes on one thread, so log lines need to say
//! which node emitted them. [`NodeContextGuard`] keeps the current node
//! in thread-local storage for a scope; spans opened inside the scope
//! carry it.

use std::cell::RefCell;

use annulus_core::Address;
use chrono::{DateTime, Utc};
use tracing::Span;
use uuid::Uuid;

/// Node context data stored in thread-local storage
#[derive(Debug, Clone)]
pub struct NodeContextData {
    /// The node's ring address
    pub address: Address,
    /// Unique id of this node instance
    pub instance_id: Uuid,
    /// When the node instance started
    pub started_at: DateTime<Utc>,
}

impl NodeContextData {
    /// Context for a node instance starting now
    pub fn new(address: Address) -> Self {
        Self {
            address,
            instance_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// A span recording this node's identity; events inside it carry both fields
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "node",
            node = %self.address,
            instance_id = %self.instance_id
        )
    }
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Creating the guard sets the node for the current thread; dropping it
/// restores whatever was set before.
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    /// Set `address` as the current node, with a fresh instance id
    pub fn new(address: Address) -> Self {
        Self::enter(NodeContextData::new(address))
    }

    /// Set the current node with a known instance id
    pub fn with_instance_id(address: Address, instance_id: Uuid) -> Self {
        Self::enter(NodeContextData {
            address,
            instance_id,
            started_at: Utc::now(),
        })
    }

    /// Re-enter a context captured earlier, e.g. when a node resumes work
    pub fn enter(data: NodeContextData) -> Self {
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Get the current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current node address (if set)
    pub fn current_address() -> Option<Address> {
        Self::current().map(|ctx| ctx.address)
    }

    /// Get the current instance ID (if set)
    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with a node context set
///
/// ```ignore
/// with_node_context!(address, {
///     tracing::info!("Routing packet");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($address:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($address);
        $body
    }};
}
