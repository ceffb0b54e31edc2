//! Connection records handed out by the connection table

use std::fmt::{self, Display};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::link::{Link, LinkId};

/// Major connection types
///
/// Connections may carry a subtype after a dot (`"structured.near"`,
/// `"structured.shortcut"`); only the part before the dot selects the
/// main type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    /// Point-to-point connections
    Leaf,
    /// Connections used to route structured addresses
    Structured,
    /// Connections used to route unstructured addresses
    Unstructured,
    /// Anything else
    Unknown,
}

impl ConnectionType {
    /// Parse the main type from a possibly sub-typed string
    pub fn parse(s: &str) -> Self {
        let main = s.split('.').next().unwrap_or_default();
        match main.to_ascii_lowercase().as_str() {
            "leaf" => Self::Leaf,
            "structured" => Self::Structured,
            "unstructured" => Self::Unstructured,
            _ => Self::Unknown,
        }
    }

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::Structured => "structured",
            Self::Unstructured => "unstructured",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live connection to a neighbor
///
/// Immutable after creation. The router only ever holds transient
/// `Arc<Connection>` references obtained from table queries.
#[derive(Debug)]
pub struct Connection {
    address: Address,
    link: Arc<dyn Link>,
    con_type: String,
    main_type: ConnectionType,
    created_at: DateTime<Utc>,
}

impl Connection {
    /// Create a connection with an explicit (possibly sub-typed) type string
    pub fn new(address: Address, link: Arc<dyn Link>, con_type: impl Into<String>) -> Self {
        let con_type = con_type.into();
        let main_type = ConnectionType::parse(&con_type);
        Self {
            address,
            link,
            con_type,
            main_type,
            created_at: Utc::now(),
        }
    }

    /// Create a structured-overlay connection
    pub fn structured(address: Address, link: Arc<dyn Link>) -> Self {
        Self::new(address, link, ConnectionType::Structured.as_str())
    }

    /// Create a point-to-point connection
    pub fn leaf(address: Address, link: Arc<dyn Link>) -> Self {
        Self::new(address, link, ConnectionType::Leaf.as_str())
    }

    /// The neighbor's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The outbound link to the neighbor
    pub fn link(&self) -> &Arc<dyn Link> {
        &self.link
    }

    /// Shortcut for `self.link().id()`
    pub fn link_id(&self) -> LinkId {
        self.link.id()
    }

    /// Full type string, including any subtype
    pub fn con_type(&self) -> &str {
        &self.con_type
    }

    /// Main type parsed from the type string
    pub fn main_type(&self) -> ConnectionType {
        self.main_type
    }

    /// When this connection record was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, address: {}, type: {}",
            self.link_id(),
            self.address,
            self.con_type
        )
    }
}
