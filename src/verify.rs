//! Replication Verifier
//!
//! Captures a replication baseline from the primary, then inspects every
//! configured replica concurrently and compares its replication id and offset
//! against that baseline. Each replica check runs in its own task, enforces
//! its own timeout, and converts every local failure into a recorded outcome,
//! so one bad node never blocks or contaminates its siblings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;

use crate::client::{Credentials, NodeClient, NodeConnection, NodeRole, ReplicationFacts};
use crate::error::{Error, Result};
use crate::report::{Divergence, ReplicaOutcome, VerificationReport};
use crate::topology::{NodeAddr, Topology};

/// Per-run verification parameters
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub credentials: Credentials,
    /// Upper bound for one node's connect-and-inspect sequence
    pub per_node_timeout: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            credentials: Credentials::none(),
            per_node_timeout: Duration::from_secs(5),
        }
    }
}

/// Orchestrates a single replication consistency check
pub struct ReplicationVerifier<C: NodeClient> {
    client: Arc<C>,
    options: VerifyOptions,
}

impl<C: NodeClient> ReplicationVerifier<C> {
    pub fn new(client: C, options: VerifyOptions) -> Self {
        Self {
            client: Arc::new(client),
            options,
        }
    }

    /// Run the full check against a topology
    ///
    /// Errs only on setup failures: an unreachable primary or a primary that
    /// reports itself as a replica. Per-replica problems are recorded in the
    /// returned report, which may have `passed() == false`.
    pub async fn verify(&self, topology: &Topology) -> Result<VerificationReport> {
        tracing::info!(primary = %topology.primary, "Connecting to primary");

        let baseline = timeout(
            self.options.per_node_timeout,
            self.inspect_primary(&topology.primary),
        )
        .await
        .map_err(|_| Error::ConnectionTimeout(topology.primary.endpoint()))??;

        if baseline.connected_replicas != topology.replica_count() {
            tracing::warn!(
                expected = topology.replica_count(),
                connected = baseline.connected_replicas,
                "Targets file and primary disagree on replica count"
            );
        } else {
            tracing::info!(
                primary = %topology.primary,
                replicas = baseline.connected_replicas,
                "Primary reports all configured replicas attached"
            );
        }

        tracing::info!(count = topology.replica_count(), "Checking replicas");

        let handles: Vec<_> = topology
            .replicas()
            .iter()
            .map(|replica| {
                let client = Arc::clone(&self.client);
                let credentials = self.options.credentials.clone();
                let node = replica.clone();
                let baseline = baseline.clone();
                let per_node_timeout = self.options.per_node_timeout;
                tokio::spawn(async move {
                    let outcome = check_replica(
                        client.as_ref(),
                        &node,
                        &credentials,
                        &baseline,
                        per_node_timeout,
                    )
                    .await;
                    (node, outcome)
                })
            })
            .collect();

        let mut replicas = HashMap::new();
        for (replica, joined) in topology.replicas().iter().zip(join_all(handles).await) {
            match joined {
                Ok((node, outcome)) => {
                    replicas.insert(node, outcome);
                }
                Err(e) => {
                    replicas.insert(
                        replica.clone(),
                        ReplicaOutcome::Failed {
                            cause: Error::Internal(format!("replica check task failed: {e}")),
                        },
                    );
                }
            }
        }

        Ok(VerificationReport {
            primary: topology.primary.clone(),
            expected_replicas: topology.replica_count(),
            connected_replicas: baseline.connected_replicas,
            baseline,
            replicas,
        })
    }

    /// Connect to the primary and capture the comparison baseline
    async fn inspect_primary(&self, node: &NodeAddr) -> Result<ReplicationFacts> {
        let mut conn = self.client.connect(node, &self.options.credentials).await?;
        let result = probe_primary(&mut conn, node).await;
        conn.close().await;
        result
    }
}

async fn probe_primary<N: NodeConnection>(
    conn: &mut N,
    node: &NodeAddr,
) -> Result<ReplicationFacts> {
    if conn.role().await? == NodeRole::Replica {
        return Err(Error::PrimaryRoleMismatch(node.to_string()));
    }
    conn.replication_facts().await
}

/// Check one replica, bounded by the per-node timeout; never fails the run
async fn check_replica<C: NodeClient>(
    client: &C,
    node: &NodeAddr,
    credentials: &Credentials,
    baseline: &ReplicationFacts,
    per_node_timeout: Duration,
) -> ReplicaOutcome {
    let inspection = timeout(
        per_node_timeout,
        inspect_replica(client, node, credentials, baseline),
    )
    .await;

    match inspection {
        Ok(Ok(outcome)) => {
            if outcome.is_consistent() {
                tracing::info!(replica = %node, "Replica is up to date with primary");
            } else {
                tracing::error!(replica = %node, outcome = %outcome, "Replica diverged");
            }
            outcome
        }
        Ok(Err(cause)) => {
            tracing::error!(replica = %node, error = %cause, "Replica check failed");
            ReplicaOutcome::Failed { cause }
        }
        Err(_) => {
            tracing::error!(replica = %node, "Replica check timed out");
            ReplicaOutcome::Failed {
                cause: Error::Timeout(format!("replica check on {node}")),
            }
        }
    }
}

async fn inspect_replica<C: NodeClient>(
    client: &C,
    node: &NodeAddr,
    credentials: &Credentials,
    baseline: &ReplicationFacts,
) -> Result<ReplicaOutcome> {
    let mut conn = client.connect(node, credentials).await?;
    let result = probe_replica(&mut conn, node, baseline).await;
    conn.close().await;
    result
}

async fn probe_replica<N: NodeConnection>(
    conn: &mut N,
    node: &NodeAddr,
    baseline: &ReplicationFacts,
) -> Result<ReplicaOutcome> {
    if conn.role().await? == NodeRole::Primary {
        return Err(Error::ReplicaRoleMismatch(node.to_string()));
    }
    let facts = conn.replication_facts().await?;
    Ok(compare_facts(baseline, &facts))
}

/// Exact-value comparison of a replica snapshot against the primary baseline
fn compare_facts(baseline: &ReplicationFacts, replica: &ReplicationFacts) -> ReplicaOutcome {
    let id_matches = baseline.replication_id == replica.replication_id;
    let offset_matches = baseline.replication_offset == replica.replication_offset;

    let divergence = match (id_matches, offset_matches) {
        (true, true) => return ReplicaOutcome::Consistent,
        (false, true) => Divergence::ReplicationId,
        (true, false) => Divergence::Offset,
        (false, false) => Divergence::IdAndOffset,
    };

    ReplicaOutcome::Inconsistent {
        divergence,
        primary: baseline.clone(),
        replica: replica.clone(),
    }
}
