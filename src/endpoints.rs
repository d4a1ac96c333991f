//! Endpoint directory: bootstrap the node list from the well-known network
//! configuration document.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CONFIG_URL: &str = "https://ton.org/global.config.json";

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to fetch network config: {0}")]
    Http(#[from] reqwest::Error),
    #[error("liteserver {index} has a malformed public key")]
    BadKey { index: usize },
    #[error("network config lists no liteservers")]
    NoEndpoints,
}

/// One remote node: address, port and its 32-byte public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    pub host: Ipv4Addr,
    pub port: u16,
    pub public_key: [u8; 32],
}

impl NodeEndpoint {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.host, self.port))
    }
}

#[derive(Debug, Deserialize)]
struct GlobalConfig {
    liteservers: Vec<LiteserverEntry>,
}

#[derive(Debug, Deserialize)]
struct LiteserverEntry {
    /// IPv4 packed into a signed 32-bit integer
    ip: i64,
    port: u16,
    id: NodeId,
}

#[derive(Debug, Deserialize)]
struct NodeId {
    /// base64 ed25519 public key
    key: String,
}

/// Fetch and parse the network configuration document. Any failure here is
/// fatal for the whole run.
pub async fn fetch_endpoints(url: &str) -> Result<Vec<NodeEndpoint>, BootstrapError> {
    let config: GlobalConfig = reqwest::get(url)
        .await?
        .error_for_status()?
        .json()
        .await?;
    let endpoints = endpoints_from_config(config)?;
    info!(count = endpoints.len(), "bootstrapped endpoint directory");
    Ok(endpoints)
}

fn endpoints_from_config(config: GlobalConfig) -> Result<Vec<NodeEndpoint>, BootstrapError> {
    if config.liteservers.is_empty() {
        return Err(BootstrapError::NoEndpoints);
    }
    config
        .liteservers
        .iter()
        .enumerate()
        .map(|(index, server)| {
            let key = STANDARD
                .decode(&server.id.key)
                .ok()
                .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
                .ok_or(BootstrapError::BadKey { index })?;
            Ok(NodeEndpoint {
                host: int_to_ip(server.ip),
                port: server.port,
                public_key: key,
            })
        })
        .collect()
}

/// Unpack the config's signed-integer IPv4 representation.
pub fn int_to_ip(packed: i64) -> Ipv4Addr {
    let bits = packed as u32;
    Ipv4Addr::new(
        (bits >> 24) as u8,
        (bits >> 16) as u8,
        (bits >> 8) as u8,
        bits as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_to_ip() {
        assert_eq!(int_to_ip(1592601963), Ipv4Addr::new(94, 237, 45, 107));
        // Negative packed values wrap around to the high half of the space
        assert_eq!(int_to_ip(-1185526007), Ipv4Addr::new(185, 86, 79, 9));
    }

    #[test]
    fn test_parse_config_document() {
        let raw = r#"{
            "liteservers": [
                {"ip": 1592601963, "port": 4924, "id": {"@type": "pub.ed25519", "key": "n4VDnSCUuSpjnCyUk9e3QOOd6o0ItSWYbTnW3Wnn8wk="}}
            ],
            "validator": {}
        }"#;
        let config: GlobalConfig = serde_json::from_str(raw).unwrap();
        let endpoints = endpoints_from_config(config).unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].port, 4924);
        assert_eq!(endpoints[0].host, Ipv4Addr::new(94, 237, 45, 107));
    }

    #[test]
    fn test_bad_key_rejected() {
        let raw = r#"{"liteservers": [{"ip": 0, "port": 1, "id": {"key": "dG9vIHNob3J0"}}]}"#;
        let config: GlobalConfig = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            endpoints_from_config(config),
            Err(BootstrapError::BadKey { index: 0 })
        ));
    }

    #[test]
    fn test_empty_directory_rejected() {
        let config: GlobalConfig = serde_json::from_str(r#"{"liteservers": []}"#).unwrap();
        assert!(matches!(
            endpoints_from_config(config),
            Err(BootstrapError::NoEndpoints)
        ));
    }
}
