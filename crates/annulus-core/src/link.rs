//! Link abstraction for pushing packets to a neighbor
//!
//! The [`Link`] trait is the router's only outbound primitive. A send is
//! non-blocking and best-effort: it either hands the bytes to the
//! underlying transport or fails with a [`LinkError`] saying whether the
//! link may recover.
//!
//! ## Implementations
//!
//! - [`ChannelLink`]: in-memory link over tokio channels (in this module)
//! - Real transports (TCP, UDP, tunnels) live outside this workspace

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::LinkError;

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a link, stable for the link's lifetime
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("link#{_0}")]
pub struct LinkId(pub u64);

impl LinkId {
    /// Allocate a process-unique link id
    pub fn next() -> Self {
        Self(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Outbound handle to a neighbor
pub trait Link: Send + Sync + Debug {
    /// Identity used for cache keys and bounce-back checks
    fn id(&self) -> LinkId;

    /// Hand a serialized packet to the transport without blocking
    fn send(&self, data: Bytes) -> Result<(), LinkError>;

    /// Close the link; further sends fail permanently
    fn close(&self);

    /// Whether the link has been closed
    fn is_closed(&self) -> bool;
}

/// A frame delivered by a [`ChannelLink`]
#[derive(Debug, Clone)]
pub struct LinkFrame {
    /// The receiver's link back to the sender (the arrival link)
    pub link: LinkId,
    /// Serialized packet
    pub data: Bytes,
}

/// In-memory link for tests and simulation
///
/// Frames are pushed into the peer's inbox with `try_send`, so a full
/// inbox surfaces as a transient failure and a dropped inbox or closed
/// link as a permanent one.
#[derive(Debug)]
pub struct ChannelLink {
    id: LinkId,
    /// Id of the reverse link at the receiver
    remote_id: LinkId,
    peer_inbox: mpsc::Sender<LinkFrame>,
    /// Shared by both directions of the same edge
    closed: Arc<AtomicBool>,
}

impl ChannelLink {
    /// Create the two directions of an edge between inboxes `a` and `b`
    ///
    /// Returns `(a_to_b, b_to_a)`: the first is owned by `a` and sends into
    /// `b`'s inbox, tagging frames with the id of `b_to_a`.
    pub fn pair(
        inbox_a: mpsc::Sender<LinkFrame>,
        inbox_b: mpsc::Sender<LinkFrame>,
    ) -> (Arc<Self>, Arc<Self>) {
        let a_to_b_id = LinkId::next();
        let b_to_a_id = LinkId::next();
        let closed = Arc::new(AtomicBool::new(false));

        let a_to_b = Arc::new(Self {
            id: a_to_b_id,
            remote_id: b_to_a_id,
            peer_inbox: inbox_b,
            closed: closed.clone(),
        });
        let b_to_a = Arc::new(Self {
            id: b_to_a_id,
            remote_id: a_to_b_id,
            peer_inbox: inbox_a,
            closed,
        });
        (a_to_b, b_to_a)
    }

    /// Id of the matching link on the other end
    pub fn remote_id(&self) -> LinkId {
        self.remote_id
    }
}

impl Link for ChannelLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn send(&self, data: Bytes) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Permanent(format!("{} is closed", self.id)));
        }

        let frame = LinkFrame {
            link: self.remote_id,
            data,
        };

        self.peer_inbox.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                LinkError::Transient(format!("{} inbox full", self.id))
            }
            mpsc::error::TrySendError::Closed(_) => {
                self.closed.store(true, Ordering::Release);
                LinkError::Permanent(format!("{} peer inbox dropped", self.id))
            }
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
