//! Propagation Latency Tester
//!
//! Measures end-to-end pub/sub propagation with a single synchronized
//! experiment: every replica subscribes to a one-off channel, a counting
//! barrier guarantees all subscriptions are registered before the primary
//! publishes, and each replica times the interval from the shared start
//! signal to message receipt. One deadline-derived cancellation token bounds
//! every wait, so a slow or silent replica is recorded as timed out instead
//! of hanging the run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::{Credentials, NodeClient, NodeConnection};
use crate::error::Result;
use crate::report::{LatencyObservation, LatencyReport, PropagationOutcome};
use crate::sync::{Countdown, Gate};
use crate::topology::{NodeAddr, Topology};

/// Per-run experiment parameters
#[derive(Debug, Clone)]
pub struct LatencyOptions {
    pub credentials: Credentials,
    /// Overall experiment deadline, shared by every wait
    pub deadline: Duration,
}

impl Default for LatencyOptions {
    fn default() -> Self {
        Self {
            credentials: Credentials::none(),
            deadline: Duration::from_secs(5),
        }
    }
}

/// Orchestrates a single propagation experiment
pub struct PropagationTester<C: NodeClient> {
    client: Arc<C>,
    options: LatencyOptions,
}

impl<C: NodeClient> PropagationTester<C> {
    pub fn new(client: C, options: LatencyOptions) -> Self {
        Self {
            client: Arc::new(client),
            options,
        }
    }

    /// Run the experiment against a topology
    ///
    /// Errs only if a participant cannot be connected before the experiment
    /// starts (or the publish itself fails); replica timeouts are recorded as
    /// observations, not failures.
    pub async fn measure(&self, topology: &Topology) -> Result<LatencyReport> {
        let nodes: Vec<NodeAddr> = topology.all_nodes().cloned().collect();
        tracing::info!(count = nodes.len(), "Connecting to cluster nodes");

        // Every participant must be connected before the experiment starts
        let results = join_all(
            nodes
                .iter()
                .map(|node| self.client.connect(node, &self.options.credentials)),
        )
        .await;

        let mut connections = Vec::with_capacity(nodes.len());
        let mut setup_failure = None;
        for (node, result) in nodes.iter().zip(results) {
            match result {
                Ok(conn) => connections.push((node.clone(), conn)),
                Err(e) => {
                    tracing::error!(node = %node, error = %e, "Connection failed");
                    setup_failure.get_or_insert(e);
                }
            }
        }
        if let Some(failure) = setup_failure {
            for (_, mut conn) in connections {
                conn.close().await;
            }
            return Err(failure);
        }

        // all_nodes yields the primary first
        let (primary_addr, mut primary_conn) = connections.remove(0);

        // Single-use probe identity, collision-free with real traffic
        let token = Uuid::new_v4().to_string();
        let channel = format!("replcheck:probe:{token}");

        let subscribed = Arc::new(Countdown::new(connections.len()));
        let start = Arc::new(Gate::new());
        let cancel = CancellationToken::new();

        let deadline_timer = {
            let cancel = cancel.clone();
            let deadline = self.options.deadline;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                cancel.cancel();
            })
        };

        let workers: Vec<_> = connections
            .into_iter()
            .map(|(node, conn)| {
                let channel = channel.clone();
                let subscribed = Arc::clone(&subscribed);
                let start = Arc::clone(&start);
                let cancel = cancel.clone();
                tokio::spawn(replica_worker(conn, node, channel, subscribed, start, cancel))
            })
            .collect();

        // Publishing before every replica is listening would manufacture
        // false timeouts, so the barrier comes first
        if subscribed.wait(&cancel).await.is_completed() {
            tracing::info!(primary = %primary_addr, channel = %channel, "Publishing probe message");
            start.open();
            if let Err(e) = primary_conn.publish(&channel, &token).await {
                cancel.cancel();
                for worker in workers {
                    let _ = worker.await;
                }
                primary_conn.close().await;
                deadline_timer.abort();
                return Err(e);
            }
        } else {
            tracing::error!("Deadline elapsed before every replica subscribed");
        }

        let mut observations = HashMap::new();
        for (replica, joined) in topology.replicas().iter().zip(join_all(workers).await) {
            match joined {
                Ok((node, observation)) => {
                    observations.insert(node, observation);
                }
                Err(e) => {
                    tracing::error!(replica = %replica, error = %e, "Replica worker task failed");
                    observations.insert(
                        replica.clone(),
                        LatencyObservation {
                            elapsed: Duration::ZERO,
                            outcome: PropagationOutcome::TimedOut,
                        },
                    );
                }
            }
        }

        primary_conn.close().await;
        deadline_timer.abort();

        Ok(LatencyReport {
            channel,
            observations,
        })
    }
}

/// Owns one replica connection for the duration of the experiment and
/// releases it on every exit path
async fn replica_worker<N: NodeConnection>(
    mut conn: N,
    node: NodeAddr,
    channel: String,
    subscribed: Arc<Countdown>,
    start: Arc<Gate>,
    cancel: CancellationToken,
) -> (NodeAddr, LatencyObservation) {
    let observation =
        observe_propagation(&mut conn, &node, &channel, &subscribed, &start, &cancel).await;
    conn.close().await;
    (node, observation)
}

async fn observe_propagation<N: NodeConnection>(
    conn: &mut N,
    node: &NodeAddr,
    channel: &str,
    subscribed: &Countdown,
    start: &Gate,
    cancel: &CancellationToken,
) -> LatencyObservation {
    if let Err(e) = conn.subscribe(channel).await {
        tracing::error!(replica = %node, error = %e, "Subscribe failed");
        // Still counted as arrived so healthy siblings get measured
        subscribed.arrive();
        return timed_out(node, Duration::ZERO);
    }
    subscribed.arrive();

    if !start.wait(cancel).await.is_completed() {
        return timed_out(node, Duration::ZERO);
    }

    let stopwatch = Instant::now();
    tokio::select! {
        message = conn.next_message() => {
            let elapsed = stopwatch.elapsed();
            match message {
                Ok(_) => {
                    tracing::info!(replica = %node, ?elapsed, "Message received");
                    LatencyObservation {
                        elapsed,
                        outcome: PropagationOutcome::Received,
                    }
                }
                Err(e) => {
                    tracing::error!(replica = %node, error = %e, "Subscription dropped");
                    timed_out(node, elapsed)
                }
            }
        }
        _ = cancel.cancelled() => {
            timed_out(node, stopwatch.elapsed())
        }
    }
}

fn timed_out(node: &NodeAddr, elapsed: Duration) -> LatencyObservation {
    tracing::error!(replica = %node, ?elapsed, "Timed out waiting for probe message");
    LatencyObservation {
        elapsed,
        outcome: PropagationOutcome::TimedOut,
    }
}
