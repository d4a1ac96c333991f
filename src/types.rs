use alloy_primitives::B256;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Masterchain workchain id used for block-by-time lookups.
pub const MASTERCHAIN: i32 = -1;

/// The full shard covering the whole workchain.
pub const SHARD_FULL: u64 = 0x8000_0000_0000_0000;

/// Balance installed on the replayed account. The historical on-chain balance
/// is not needed by the getters, so every sandbox gets the same generous
/// placeholder to guarantee execution never runs out of funds.
pub const PLACEHOLDER_BALANCE: u128 = 100_000_000_000;

/// Which lending pool deployment to replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    #[serde(alias = "Main", alias = "MAIN")]
    Main,
    #[serde(alias = "Lp", alias = "LP")]
    Lp,
}

impl Pool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pool::Main => "main",
            Pool::Lp => "lp",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown pool selector: {0} (expected \"main\" or \"lp\")")]
pub struct PoolParseError(String);

impl FromStr for Pool {
    type Err = PoolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(Pool::Main),
            "lp" => Ok(Pool::Lp),
            other => Err(PoolParseError(other.to_string())),
        }
    }
}

/// One asset tracked by a pool registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    /// Friendly-form address of the asset's own contract (informational,
    /// used in diagnostics only)
    pub address: String,
    /// 256-bit key under which the pool contract indexes this asset
    pub key: B256,
    /// Decimal precision; displayed values are raw / 10^digits
    pub digits: u32,
}

impl Asset {
    pub fn new(name: &str, address: &str, key: B256, digits: u32) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            key,
            digits,
        }
    }
}

/// Raw (workchain, hash) form of a contract address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAddress {
    pub workchain: i32,
    pub hash: B256,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is not valid base64url")]
    BadBase64,
    #[error("decoded address is {0} bytes, expected 36")]
    BadLength(usize),
    #[error("unknown address tag byte {0:#04x}")]
    BadTag(u8),
    #[error("address checksum mismatch")]
    BadChecksum,
}

impl ContractAddress {
    /// Parse the 48-character friendly form: base64url over
    /// [tag, workchain, hash(32), crc16(2)].
    ///
    /// Tag 0x11 is bounceable, 0x51 non-bounceable; bit 0x80 marks testnet
    /// addresses and is accepted but ignored.
    pub fn parse_friendly(s: &str) -> Result<Self, AddressError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| AddressError::BadBase64)?;
        if bytes.len() != 36 {
            return Err(AddressError::BadLength(bytes.len()));
        }
        let tag = bytes[0] & !0x80;
        if tag != 0x11 && tag != 0x51 {
            return Err(AddressError::BadTag(bytes[0]));
        }
        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc16_xmodem(&bytes[..34]) != expected {
            return Err(AddressError::BadChecksum);
        }
        Ok(Self {
            workchain: bytes[1] as i8 as i32,
            hash: B256::from_slice(&bytes[2..34]),
        })
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workchain, hex::encode(self.hash))
    }
}

/// CRC16/XMODEM (poly 0x1021, init 0), the checksum used by friendly addresses
fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Identifier of one immutable ledger snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockId {
    pub workchain: i32,
    pub shard: u64,
    pub seqno: u32,
    pub root_hash: B256,
    /// Generation time of the block, unix seconds
    pub gen_utime: u32,
}

/// One day's worth of per-asset entries for a single series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySample<E> {
    /// Midnight UTC of the sampled day, unix seconds
    pub timestamp: i64,
    /// Per-asset values in registry order; assets whose getters failed
    /// that day are omitted
    pub entries: Vec<E>,
}

/// Ordered samples, one per successfully processed day, ascending by date
pub type TimeSeries<E> = Vec<DailySample<E>>;

/// (value, asset name) — serialized as a two-element JSON array
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReserveEntry(pub f64, pub String);

/// (supply, borrow, asset name) — serialized as a three-element JSON array
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalsEntry(pub f64, pub f64, pub String);
