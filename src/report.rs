//! Verification Reports
//!
//! Aggregated outcomes returned to the caller. Reports are keyed by node
//! address, never by check order, and are immutable once a run finishes. The
//! presentation layer (CLI) decides how to render them and which exit code
//! they map to.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::client::ReplicationFacts;
use crate::error::Error;
use crate::topology::NodeAddr;

/// Which part of the replication baseline a replica disagreed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    ReplicationId,
    Offset,
    IdAndOffset,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::ReplicationId => write!(f, "replication id mismatch"),
            Divergence::Offset => write!(f, "offset mismatch"),
            Divergence::IdAndOffset => write!(f, "replication id and offset mismatch"),
        }
    }
}

/// Outcome of checking a single replica
#[derive(Debug)]
pub enum ReplicaOutcome {
    /// Replication id and offset both match the primary baseline
    Consistent,
    /// The replica reached a different replication state than the primary;
    /// both snapshots are kept for diagnosis
    Inconsistent {
        divergence: Divergence,
        primary: ReplicationFacts,
        replica: ReplicationFacts,
    },
    /// The check itself failed (connection, role mismatch, timeout)
    Failed { cause: Error },
}

impl ReplicaOutcome {
    pub fn is_consistent(&self) -> bool {
        matches!(self, ReplicaOutcome::Consistent)
    }
}

impl fmt::Display for ReplicaOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaOutcome::Consistent => write!(f, "consistent"),
            ReplicaOutcome::Inconsistent {
                divergence,
                primary,
                replica,
            } => write!(
                f,
                "inconsistent ({}): primary replid '{}' offset {}, replica replid '{}' offset {}",
                divergence,
                primary.replication_id,
                primary.replication_offset,
                replica.replication_id,
                replica.replication_offset,
            ),
            ReplicaOutcome::Failed { cause } => write!(f, "failed: {}", cause),
        }
    }
}

/// Aggregated result of a replication verification run
#[derive(Debug)]
pub struct VerificationReport {
    /// The primary node the baseline was captured from
    pub primary: NodeAddr,
    /// The primary's replication snapshot used as the comparison baseline
    pub baseline: ReplicationFacts,
    /// Replica count from the targets file
    pub expected_replicas: usize,
    /// Replica count the primary reported as connected
    pub connected_replicas: usize,
    /// Per-replica outcomes, keyed by node identity
    pub replicas: HashMap<NodeAddr, ReplicaOutcome>,
}

impl VerificationReport {
    /// True when every replica outcome is `Consistent`
    pub fn passed(&self) -> bool {
        self.replicas.values().all(ReplicaOutcome::is_consistent)
    }

    /// Nodes whose check did not come back `Consistent`
    pub fn failures(&self) -> impl Iterator<Item = (&NodeAddr, &ReplicaOutcome)> {
        self.replicas
            .iter()
            .filter(|(_, outcome)| !outcome.is_consistent())
    }

    /// True when the primary's connected-replica count disagrees with the
    /// configured topology (informational drift, never fatal)
    pub fn has_replica_count_drift(&self) -> bool {
        self.connected_replicas != self.expected_replicas
    }
}

/// How a single replica fared in the propagation experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationOutcome {
    /// The published message arrived
    Received,
    /// The deadline elapsed before the message arrived
    TimedOut,
}

/// Per-replica measurement from the propagation experiment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyObservation {
    /// Time from the shared start signal to receipt (or to cancellation)
    pub elapsed: Duration,
    pub outcome: PropagationOutcome,
}

/// Aggregated result of a propagation latency run
#[derive(Debug)]
pub struct LatencyReport {
    /// The one-off channel the probe message was published on
    pub channel: String,
    /// Per-replica observations, keyed by node identity
    pub observations: HashMap<NodeAddr, LatencyObservation>,
}

impl LatencyReport {
    /// True when every replica received the probe before the deadline
    pub fn all_received(&self) -> bool {
        self.observations
            .values()
            .all(|obs| obs.outcome == PropagationOutcome::Received)
    }

    /// Replicas that never saw the probe
    pub fn timed_out(&self) -> impl Iterator<Item = (&NodeAddr, &LatencyObservation)> {
        self.observations
            .iter()
            .filter(|(_, obs)| obs.outcome == PropagationOutcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NodeRole;

    fn facts(offset: i64) -> ReplicationFacts {
        ReplicationFacts {
            role: NodeRole::Primary,
            replication_id: "abc123".to_string(),
            replication_offset: offset,
            connected_replicas: 1,
        }
    }

    #[test]
    fn test_report_passed_and_failures() {
        let mut replicas = HashMap::new();
        replicas.insert(NodeAddr::new("b", 6379), ReplicaOutcome::Consistent);
        replicas.insert(
            NodeAddr::new("c", 6379),
            ReplicaOutcome::Inconsistent {
                divergence: Divergence::Offset,
                primary: facts(100),
                replica: facts(90),
            },
        );

        let report = VerificationReport {
            primary: NodeAddr::new("a", 6379),
            baseline: facts(100),
            expected_replicas: 2,
            connected_replicas: 2,
            replicas,
        };

        assert!(!report.passed());
        assert!(!report.has_replica_count_drift());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, &NodeAddr::new("c", 6379));
    }

    #[test]
    fn test_inconsistent_outcome_display_names_both_sides() {
        let outcome = ReplicaOutcome::Inconsistent {
            divergence: Divergence::Offset,
            primary: facts(100),
            replica: facts(90),
        };
        let rendered = outcome.to_string();
        assert!(rendered.contains("offset mismatch"));
        assert!(rendered.contains("100"));
        assert!(rendered.contains("90"));
    }

    #[test]
    fn test_latency_report_timed_out() {
        let mut observations = HashMap::new();
        observations.insert(
            NodeAddr::new("b", 6379),
            LatencyObservation {
                elapsed: Duration::from_millis(3),
                outcome: PropagationOutcome::Received,
            },
        );
        observations.insert(
            NodeAddr::new("c", 6379),
            LatencyObservation {
                elapsed: Duration::from_secs(5),
                outcome: PropagationOutcome::TimedOut,
            },
        );

        let report = LatencyReport {
            channel: "probe".to_string(),
            observations,
        };
        assert!(!report.all_received());
        assert_eq!(report.timed_out().count(), 1);
    }
}
