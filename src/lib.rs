//! Replcheck - Replication Consistency Checker
//!
//! An operational diagnostic tool for replicated key-value clusters with one
//! primary and one or more replicas. It is run ad hoc or from deployment
//! pipelines, never as a daemon, and only detects and reports problems.
//!
//! # Architecture
//!
//! Two orchestrators make up the core:
//!
//! - [`verify::ReplicationVerifier`] captures a replication baseline from the
//!   primary and concurrently checks every replica's replication id and
//!   offset against it.
//! - [`latency::PropagationTester`] runs a synchronized publish/subscribe
//!   experiment that measures how long a message takes to propagate to each
//!   replica, bounded by a shared deadline.
//!
//! Both depend only on the abstract [`client::NodeClient`] adapter; the
//! bundled [`client::RespClient`] implements it for Redis-compatible nodes.

pub mod client;
pub mod error;
pub mod latency;
pub mod report;
pub mod sync;
pub mod topology;
pub mod verify;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{Credentials, NodeClient, NodeConnection, NodeRole, ReplicationFacts};
    pub use crate::client::RespClient;
    pub use crate::error::{Error, Result};
    pub use crate::latency::{LatencyOptions, PropagationTester};
    pub use crate::report::{LatencyReport, ReplicaOutcome, VerificationReport};
    pub use crate::topology::{NodeAddr, Topology};
    pub use crate::verify::{ReplicationVerifier, VerifyOptions};
}
