//! Cluster Topology
//!
//! The set of nodes a verification run targets: one primary and one or more
//! replicas, loaded from a JSON targets file. A topology is validated once at
//! construction and never mutated afterwards, so workers share it freely.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// Network address of a single cluster member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    /// Hostname or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Render this address as a connectable `host:port` endpoint
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A validated primary/replica topology
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTopology")]
pub struct Topology {
    /// The node expected to act as primary
    pub primary: NodeAddr,
    /// The nodes expected to act as replicas (never empty)
    replicas: Vec<NodeAddr>,
}

/// Unvalidated shape of the targets file
#[derive(Debug, Deserialize)]
struct RawTopology {
    primary: NodeAddr,
    #[serde(default)]
    replicas: Vec<NodeAddr>,
}

impl TryFrom<RawTopology> for Topology {
    type Error = Error;

    fn try_from(raw: RawTopology) -> Result<Self> {
        Topology::new(raw.primary, raw.replicas)
    }
}

impl Topology {
    /// Create a topology, rejecting one with no replicas
    pub fn new(primary: NodeAddr, replicas: Vec<NodeAddr>) -> Result<Self> {
        if replicas.is_empty() {
            return Err(Error::Config(
                "at least one replica node expected".to_string(),
            ));
        }
        Ok(Self { primary, replicas })
    }

    /// Load and validate a topology from a JSON targets file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let topology: Topology = serde_json::from_str(&contents)?;
        Ok(topology)
    }

    pub fn replicas(&self) -> &[NodeAddr] {
        &self.replicas
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// All nodes, primary first
    pub fn all_nodes(&self) -> impl Iterator<Item = &NodeAddr> {
        std::iter::once(&self.primary).chain(self.replicas.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_endpoint_rendering() {
        let addr = NodeAddr::new("redis-1.internal", 6379);
        assert_eq!(addr.endpoint(), "redis-1.internal:6379");
        assert_eq!(addr.to_string(), "redis-1.internal:6379");
    }

    #[test]
    fn test_topology_requires_replicas() {
        let err = Topology::new(NodeAddr::new("primary", 6379), vec![]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_targets_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "primary": {{"host": "10.0.0.1", "port": 6379}},
                "replicas": [
                    {{"host": "10.0.0.2", "port": 6379}},
                    {{"host": "10.0.0.3", "port": 6380}}
                ]
            }}"#
        )
        .unwrap();

        let topology = Topology::from_file(file.path()).unwrap();
        assert_eq!(topology.primary, NodeAddr::new("10.0.0.1", 6379));
        assert_eq!(topology.replica_count(), 2);
        assert_eq!(topology.replicas()[1].port, 6380);
        assert_eq!(topology.all_nodes().count(), 3);
    }

    #[test]
    fn test_load_rejects_empty_replicas() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"primary": {{"host": "10.0.0.1", "port": 6379}}, "replicas": []}}"#
        )
        .unwrap();

        let err = Topology::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::TopologyParse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Topology::from_file("/nonexistent/targets.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
