//! Redis RESP Adapter
//!
//! Minimal RESP client implementing the `NodeClient` traits over a plain
//! TCP connection. Only the handful of commands the checker needs are
//! supported: AUTH, INFO replication, PUBLISH and SUBSCRIBE.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{Credentials, NodeClient, NodeConnection, NodeRole, ReplicationFacts};
use crate::error::{Error, Result};
use crate::topology::NodeAddr;

/// A single RESP reply
#[derive(Debug, Clone, PartialEq)]
enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<String>),
    Array(Option<Vec<Reply>>),
}

/// Encode a command as a RESP array of bulk strings
fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

/// Parse the body of an `INFO replication` reply into replication facts
fn parse_replication_info(info: &str) -> Result<ReplicationFacts> {
    let mut role = None;
    let mut replication_id = None;
    let mut replication_offset = None;
    let mut connected_replicas = None;

    for line in info.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key {
            "role" => {
                role = Some(match value {
                    "master" => NodeRole::Primary,
                    "slave" => NodeRole::Replica,
                    other => {
                        return Err(Error::Protocol(format!("unknown role '{other}'")));
                    }
                });
            }
            "master_replid" => replication_id = Some(value.to_string()),
            "master_repl_offset" => {
                replication_offset = Some(value.parse::<i64>().map_err(|e| {
                    Error::Protocol(format!("bad master_repl_offset '{value}': {e}"))
                })?);
            }
            "connected_slaves" => {
                connected_replicas = Some(value.parse::<usize>().map_err(|e| {
                    Error::Protocol(format!("bad connected_slaves '{value}': {e}"))
                })?);
            }
            _ => {}
        }
    }

    let missing = |field: &str| Error::Protocol(format!("replication info missing '{field}'"));
    Ok(ReplicationFacts {
        role: role.ok_or_else(|| missing("role"))?,
        replication_id: replication_id.ok_or_else(|| missing("master_replid"))?,
        replication_offset: replication_offset.ok_or_else(|| missing("master_repl_offset"))?,
        connected_replicas: connected_replicas.ok_or_else(|| missing("connected_slaves"))?,
    })
}

/// Factory for RESP connections
pub struct RespClient {
    connect_timeout: Duration,
}

impl RespClient {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for RespClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl NodeClient for RespClient {
    type Connection = RespConnection;

    async fn connect(
        &self,
        node: &NodeAddr,
        credentials: &Credentials,
    ) -> Result<Self::Connection> {
        let address = node.endpoint();
        let stream = match timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(Error::ConnectionFailed {
                    address,
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(Error::ConnectionTimeout(address)),
        };
        stream.set_nodelay(true)?;

        let mut conn = RespConnection {
            stream: Some(BufReader::new(stream)),
        };
        if let Some(password) = credentials.as_password() {
            match conn.command(&["AUTH", password]).await? {
                Reply::Simple(_) => {}
                Reply::Error(message) => return Err(Error::Server(message)),
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected AUTH reply: {other:?}"
                    )))
                }
            }
        }
        Ok(conn)
    }
}

/// One TCP connection to a Redis-compatible node
#[derive(Debug)]
pub struct RespConnection {
    stream: Option<BufReader<TcpStream>>,
}

impl RespConnection {
    fn stream_mut(&mut self) -> Result<&mut BufReader<TcpStream>> {
        self.stream.as_mut().ok_or(Error::ConnectionClosed)
    }

    async fn send(&mut self, args: &[&str]) -> Result<()> {
        let buf = encode_command(args);
        let stream = self.stream_mut()?;
        stream.get_mut().write_all(&buf).await?;
        stream.get_mut().flush().await?;
        Ok(())
    }

    async fn command(&mut self, args: &[&str]) -> Result<Reply> {
        self.send(args).await?;
        self.read_reply().await
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.stream_mut()?.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Read one reply; boxed because array replies recurse
    fn read_reply(&mut self) -> BoxFuture<'_, Result<Reply>> {
        async move {
            let line = self.read_line().await?;
            if line.is_empty() {
                return Err(Error::Protocol("empty reply line".to_string()));
            }
            let (prefix, rest) = line.split_at(1);

            match prefix {
                "+" => Ok(Reply::Simple(rest.to_string())),
                "-" => Ok(Reply::Error(rest.to_string())),
                ":" => {
                    let value = rest
                        .parse::<i64>()
                        .map_err(|e| Error::Protocol(format!("bad integer reply: {e}")))?;
                    Ok(Reply::Integer(value))
                }
                "$" => {
                    let len = rest
                        .parse::<i64>()
                        .map_err(|e| Error::Protocol(format!("bad bulk length: {e}")))?;
                    if len < 0 {
                        return Ok(Reply::Bulk(None));
                    }
                    let mut buf = vec![0u8; len as usize + 2];
                    self.stream_mut()?.read_exact(&mut buf).await?;
                    buf.truncate(len as usize);
                    let body = String::from_utf8(buf)
                        .map_err(|e| Error::Protocol(format!("non-utf8 bulk reply: {e}")))?;
                    Ok(Reply::Bulk(Some(body)))
                }
                "*" => {
                    let len = rest
                        .parse::<i64>()
                        .map_err(|e| Error::Protocol(format!("bad array length: {e}")))?;
                    if len < 0 {
                        return Ok(Reply::Array(None));
                    }
                    let mut items = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        items.push(self.read_reply().await?);
                    }
                    Ok(Reply::Array(Some(items)))
                }
                other => Err(Error::Protocol(format!("unknown reply prefix '{other}'"))),
            }
        }
        .boxed()
    }

    async fn info_replication(&mut self) -> Result<ReplicationFacts> {
        match self.command(&["INFO", "replication"]).await? {
            Reply::Bulk(Some(body)) => parse_replication_info(&body),
            Reply::Error(message) => Err(Error::Server(message)),
            other => Err(Error::Protocol(format!("unexpected INFO reply: {other:?}"))),
        }
    }
}

#[async_trait]
impl NodeConnection for RespConnection {
    async fn role(&mut self) -> Result<NodeRole> {
        Ok(self.info_replication().await?.role)
    }

    async fn replication_facts(&mut self) -> Result<ReplicationFacts> {
        self.info_replication().await
    }

    async fn publish(&mut self, channel: &str, payload: &str) -> Result<()> {
        match self.command(&["PUBLISH", channel, payload]).await? {
            Reply::Integer(_) => Ok(()),
            Reply::Error(message) => Err(Error::Server(message)),
            other => Err(Error::Protocol(format!(
                "unexpected PUBLISH reply: {other:?}"
            ))),
        }
    }

    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        match self.command(&["SUBSCRIBE", channel]).await? {
            Reply::Array(Some(items))
                if matches!(items.first(), Some(Reply::Bulk(Some(kind))) if kind == "subscribe") =>
            {
                Ok(())
            }
            Reply::Error(message) => Err(Error::Server(message)),
            other => Err(Error::Protocol(format!(
                "unexpected SUBSCRIBE reply: {other:?}"
            ))),
        }
    }

    async fn next_message(&mut self) -> Result<String> {
        // Skip any further subscription confirmations; only message pushes count
        loop {
            if let Reply::Array(Some(items)) = self.read_reply().await? {
                if let [Reply::Bulk(Some(kind)), _, Reply::Bulk(Some(payload))] = items.as_slice()
                {
                    if kind == "message" {
                        return Ok(payload.clone());
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.get_mut().shutdown().await;
        }
    }
}
