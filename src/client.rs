//! Round-robin protocol client over persistent node connections.
//!
//! One connection per configured endpoint, opened lazily on first use and
//! reused for the rest of the run. Requests rotate across endpoints for load
//! distribution only: a failing endpoint's error goes straight back to the
//! caller, it is not retried against a different node.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::endpoints::NodeEndpoint;
use crate::types::{BlockId, ContractAddress};
use crate::wire::{self, Request, Response, WireError};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("no endpoints configured")]
    NoEndpoints,
    #[error("i/o error talking to {peer}: {source}")]
    Io {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("malformed response: {0}")]
    Wire(#[from] WireError),
    #[error("node error {code}: {message}")]
    Node { code: i32, message: String },
    #[error("unexpected response, expected {expected}")]
    UnexpectedResponse { expected: &'static str },
}

struct Connection {
    endpoint: NodeEndpoint,
    stream: Option<TcpStream>,
}

impl Connection {
    async fn exchange(&mut self, payload: &[u8]) -> io::Result<Vec<u8>> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => TcpStream::connect(self.endpoint.socket_addr()).await?,
        };
        let stream = self.stream.insert(stream);
        wire::write_frame(stream, payload).await?;
        wire::read_frame(stream).await
    }
}

/// Client for the block-lookup / state-fetch protocol.
pub struct LiteClient {
    conns: Vec<Connection>,
    cursor: usize,
}

impl LiteClient {
    pub fn new(endpoints: Vec<NodeEndpoint>) -> Result<Self, ProtocolError> {
        if endpoints.is_empty() {
            return Err(ProtocolError::NoEndpoints);
        }
        let conns = endpoints
            .into_iter()
            .map(|endpoint| Connection {
                endpoint,
                stream: None,
            })
            .collect();
        Ok(Self { conns, cursor: 0 })
    }

    /// Resolve the block covering or most closely preceding `utime`.
    pub async fn lookup_block(
        &mut self,
        workchain: i32,
        shard: u64,
        utime: u32,
    ) -> Result<BlockId, ProtocolError> {
        let request = Request::LookupBlock {
            workchain,
            shard,
            utime,
        };
        match self.query(&request).await? {
            Response::BlockHeader(block) => Ok(block),
            Response::Error { code, message } => Err(ProtocolError::Node { code, message }),
            _ => Err(ProtocolError::UnexpectedResponse {
                expected: "blockHeader",
            }),
        }
    }

    /// Fetch the raw serialized state of `address` as of `block`. An account
    /// absent at that block is reported by the node as an error, not as an
    /// empty blob.
    pub async fn get_account_state(
        &mut self,
        address: &ContractAddress,
        block: &BlockId,
    ) -> Result<Vec<u8>, ProtocolError> {
        let request = Request::GetAccountState {
            block: block.clone(),
            address: address.clone(),
        };
        match self.query(&request).await? {
            Response::AccountState(raw) => Ok(raw),
            Response::Error { code, message } => Err(ProtocolError::Node { code, message }),
            _ => Err(ProtocolError::UnexpectedResponse {
                expected: "accountState",
            }),
        }
    }

    async fn query(&mut self, request: &Request) -> Result<Response, ProtocolError> {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.conns.len();
        let conn = &mut self.conns[index];
        debug!(peer = %conn.endpoint.socket_addr(), "sending request");

        match conn.exchange(&request.encode()).await {
            Ok(payload) => Ok(Response::decode(&payload)?),
            Err(source) => {
                // Drop the broken stream; the endpoint will be redialed the
                // next time the rotation reaches it
                conn.stream = None;
                Err(ProtocolError::Io {
                    peer: conn.endpoint.socket_addr(),
                    source,
                })
            }
        }
    }

    /// Shut down all open connections.
    pub async fn close(&mut self) {
        for conn in &mut self.conns {
            if let Some(mut stream) = conn.stream.take() {
                let _ = stream.shutdown().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_endpoint_list_rejected() {
        assert!(matches!(
            LiteClient::new(vec![]),
            Err(ProtocolError::NoEndpoints)
        ));
    }
}
