//! Node Client Adapter
//!
//! Abstract capability the verification core uses to talk to cluster nodes.
//! The orchestrators in `verify` and `latency` depend only on these traits;
//! the concrete RESP implementation lives in `resp` and tests substitute an
//! in-memory cluster.

pub mod resp;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;
use crate::topology::NodeAddr;

pub use resp::RespClient;

/// Authentication material for cluster nodes
#[derive(Clone, Default)]
pub struct Credentials {
    password: Option<String>,
}

impl Credentials {
    /// No authentication
    pub fn none() -> Self {
        Self { password: None }
    }

    /// Password authentication
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }

    pub fn as_password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log the password itself
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Role a node reports for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Primary,
    Replica,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Primary => write!(f, "primary"),
            NodeRole::Replica => write!(f, "replica"),
        }
    }
}

/// Point-in-time replication snapshot of a single node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationFacts {
    /// Role the node reports for itself
    pub role: NodeRole,
    /// Replication history identifier (`master_replid`)
    pub replication_id: String,
    /// Replication stream offset (`master_repl_offset`), node-local monotonic
    pub replication_offset: i64,
    /// Number of replicas the node reports as connected (`connected_slaves`)
    pub connected_replicas: usize,
}

/// Factory for node connections
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    type Connection: NodeConnection;

    /// Establish an authenticated connection to a node
    async fn connect(&self, node: &NodeAddr, credentials: &Credentials)
        -> Result<Self::Connection>;
}

/// A live connection to a single cluster node
///
/// `subscribe` switches the connection into subscriber mode; after that only
/// `next_message` and `close` are meaningful, matching how Redis connections
/// behave. `close` is idempotent and safe on any connection state.
#[async_trait]
pub trait NodeConnection: Send + 'static {
    /// Ask the node which role it is currently acting as
    async fn role(&mut self) -> Result<NodeRole>;

    /// Fetch the node's current replication snapshot
    async fn replication_facts(&mut self) -> Result<ReplicationFacts>;

    /// Publish a payload on a channel
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<()>;

    /// Subscribe this connection to a channel
    async fn subscribe(&mut self, channel: &str) -> Result<()>;

    /// Wait for the next published message on the subscribed channel
    async fn next_message(&mut self) -> Result<String>;

    /// Release the connection; idempotent
    async fn close(&mut self);
}
