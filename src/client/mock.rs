//! In-memory cluster used by orchestrator tests
//!
//! Simulates a primary/replica cluster behind the `NodeClient` traits,
//! recording every adapter call so tests can assert on ordering (barrier
//! before publish) and call counts (no replica contact after a fatal
//! primary failure).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Credentials, NodeClient, NodeConnection, NodeRole, ReplicationFacts};
use crate::error::{Error, Result};
use crate::topology::NodeAddr;

/// Adapter calls observed by the mock, in global order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Connect(NodeAddr),
    Subscribe(NodeAddr),
    Publish(NodeAddr),
    Close(NodeAddr),
}

/// Behavior profile for one simulated node
#[derive(Debug, Clone)]
pub struct MockNode {
    pub facts: ReplicationFacts,
    /// When false, `connect` fails with `ConnectionFailed`
    pub reachable: bool,
    /// When false, published messages never reach this node's subscriptions
    pub receives_published: bool,
    /// Artificial delay before answering a replication-facts query
    pub facts_delay: Option<Duration>,
}

impl MockNode {
    pub fn healthy(role: NodeRole, replication_id: &str, offset: i64) -> Self {
        Self {
            facts: ReplicationFacts {
                role,
                replication_id: replication_id.to_string(),
                replication_offset: offset,
                connected_replicas: 0,
            },
            reachable: true,
            receives_published: true,
            facts_delay: None,
        }
    }

    pub fn with_connected_replicas(mut self, count: usize) -> Self {
        self.facts.connected_replicas = count;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn dropping_messages(mut self) -> Self {
        self.receives_published = false;
        self
    }

    pub fn with_facts_delay(mut self, delay: Duration) -> Self {
        self.facts_delay = Some(delay);
        self
    }
}

struct ClusterState {
    nodes: HashMap<NodeAddr, MockNode>,
    events: Vec<MockEvent>,
    /// Active subscriptions: (channel, subscriber) -> delivery sender
    subscriptions: HashMap<(String, NodeAddr), mpsc::UnboundedSender<String>>,
}

/// `NodeClient` implementation backed by in-process state
#[derive(Clone)]
pub struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MockCluster {
    pub fn new(nodes: Vec<(NodeAddr, MockNode)>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                nodes: nodes.into_iter().collect(),
                events: Vec::new(),
                subscriptions: HashMap::new(),
            })),
        }
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn connect_attempts(&self, node: &NodeAddr) -> usize {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|event| matches!(event, MockEvent::Connect(n) if n == node))
            .count()
    }
}

#[async_trait]
impl NodeClient for MockCluster {
    type Connection = MockConnection;

    async fn connect(
        &self,
        node: &NodeAddr,
        _credentials: &Credentials,
    ) -> Result<Self::Connection> {
        let profile = {
            let mut state = self.state.lock().unwrap();
            state.events.push(MockEvent::Connect(node.clone()));
            state
                .nodes
                .get(node)
                .cloned()
                .ok_or_else(|| Error::ConnectionFailed {
                    address: node.endpoint(),
                    reason: "unknown node".to_string(),
                })?
        };

        if !profile.reachable {
            return Err(Error::ConnectionFailed {
                address: node.endpoint(),
                reason: "connection refused".to_string(),
            });
        }

        Ok(MockConnection {
            node: node.clone(),
            profile,
            state: Arc::clone(&self.state),
            inbox: None,
            closed: false,
        })
    }
}

pub struct MockConnection {
    node: NodeAddr,
    profile: MockNode,
    state: Arc<Mutex<ClusterState>>,
    inbox: Option<mpsc::UnboundedReceiver<String>>,
    closed: bool,
}

impl MockConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl NodeConnection for MockConnection {
    async fn role(&mut self) -> Result<NodeRole> {
        self.ensure_open()?;
        Ok(self.profile.facts.role)
    }

    async fn replication_facts(&mut self) -> Result<ReplicationFacts> {
        self.ensure_open()?;
        if let Some(delay) = self.profile.facts_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.profile.facts.clone())
    }

    async fn publish(&mut self, channel: &str, payload: &str) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock().unwrap();
        state.events.push(MockEvent::Publish(self.node.clone()));
        let deliverable: Vec<mpsc::UnboundedSender<String>> = state
            .subscriptions
            .iter()
            .filter(|((sub_channel, subscriber), _)| {
                sub_channel == channel
                    && state
                        .nodes
                        .get(subscriber)
                        .map(|n| n.receives_published)
                        .unwrap_or(false)
            })
            .map(|(_, tx)| tx.clone())
            .collect();
        drop(state);
        // Dropped receivers are fine; delivery is best effort like real pubsub
        for tx in deliverable {
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        state
            .subscriptions
            .insert((channel.to_string(), self.node.clone()), tx);
        state.events.push(MockEvent::Subscribe(self.node.clone()));
        self.inbox = Some(rx);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<String> {
        self.ensure_open()?;
        let inbox = self
            .inbox
            .as_mut()
            .ok_or_else(|| Error::Protocol("not subscribed".to_string()))?;
        inbox.recv().await.ok_or(Error::ConnectionClosed)
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.inbox = None;
        self.state
            .lock()
            .unwrap()
            .events
            .push(MockEvent::Close(self.node.clone()));
    }
}
