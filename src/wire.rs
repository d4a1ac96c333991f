//! Tagged binary frames for the node query protocol.
//!
//! Every message travels as a length-prefixed frame whose payload starts
//! with a 32-bit tag. Responses are decoded into a discriminated
//! [`Response`] enum at this boundary; anything with an unknown tag or a
//! short body is rejected before it reaches the client.

use alloy_primitives::B256;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::{BlockId, ContractAddress};

pub const TAG_LOOKUP_BLOCK: u32 = 0x8a2f_6f31;
pub const TAG_BLOCK_HEADER: u32 = 0x7527_c021;
pub const TAG_GET_ACCOUNT_STATE: u32 = 0x4be3_9a10;
pub const TAG_ACCOUNT_STATE: u32 = 0x51c8_77f4;
pub const TAG_ERROR: u32 = 0xbba9_d2c6;

/// Frames larger than this are treated as malformed.
pub const MAX_FRAME: usize = 4 << 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("message truncated")]
    Truncated,
    #[error("unknown message tag {0:#010x}")]
    UnknownTag(u32),
    #[error("declared length {0} exceeds the message body")]
    BadLength(u32),
    #[error("error message is not valid utf-8")]
    BadUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Block whose validity window covers or most closely precedes `utime`
    LookupBlock {
        workchain: i32,
        shard: u64,
        utime: u32,
    },
    /// Serialized state of one account as of `block`
    GetAccountState {
        block: BlockId,
        address: ContractAddress,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    BlockHeader(BlockId),
    AccountState(Vec<u8>),
    Error { code: i32, message: String },
}

impl Request {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Request::LookupBlock {
                workchain,
                shard,
                utime,
            } => {
                out.extend(TAG_LOOKUP_BLOCK.to_be_bytes());
                out.extend(workchain.to_be_bytes());
                out.extend(shard.to_be_bytes());
                out.extend(utime.to_be_bytes());
            }
            Request::GetAccountState { block, address } => {
                out.extend(TAG_GET_ACCOUNT_STATE.to_be_bytes());
                encode_block_id(&mut out, block);
                out.extend(address.workchain.to_be_bytes());
                out.extend(address.hash.as_slice());
            }
        }
        out
    }

    /// Used by the serving side (and tests) to interpret incoming frames.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Cursor::new(payload);
        match r.read_u32()? {
            TAG_LOOKUP_BLOCK => Ok(Request::LookupBlock {
                workchain: r.read_i32()?,
                shard: r.read_u64()?,
                utime: r.read_u32()?,
            }),
            TAG_GET_ACCOUNT_STATE => {
                let block = decode_block_id(&mut r)?;
                let workchain = r.read_i32()?;
                let hash = B256::from_slice(r.read_bytes(32)?);
                Ok(Request::GetAccountState {
                    block,
                    address: ContractAddress { workchain, hash },
                })
            }
            tag => Err(WireError::UnknownTag(tag)),
        }
    }
}

impl Response {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Response::BlockHeader(block) => {
                out.extend(TAG_BLOCK_HEADER.to_be_bytes());
                encode_block_id(&mut out, block);
            }
            Response::AccountState(raw) => {
                out.extend(TAG_ACCOUNT_STATE.to_be_bytes());
                out.extend((raw.len() as u32).to_be_bytes());
                out.extend(raw);
            }
            Response::Error { code, message } => {
                out.extend(TAG_ERROR.to_be_bytes());
                out.extend(code.to_be_bytes());
                out.extend((message.len() as u16).to_be_bytes());
                out.extend(message.as_bytes());
            }
        }
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Cursor::new(payload);
        match r.read_u32()? {
            TAG_BLOCK_HEADER => Ok(Response::BlockHeader(decode_block_id(&mut r)?)),
            TAG_ACCOUNT_STATE => {
                let len = r.read_u32()?;
                if len as usize > MAX_FRAME {
                    return Err(WireError::BadLength(len));
                }
                Ok(Response::AccountState(r.read_bytes(len as usize)?.to_vec()))
            }
            TAG_ERROR => {
                let code = r.read_i32()?;
                let len = r.read_u16()? as usize;
                let message = String::from_utf8(r.read_bytes(len)?.to_vec())
                    .map_err(|_| WireError::BadUtf8)?;
                Ok(Response::Error { code, message })
            }
            tag => Err(WireError::UnknownTag(tag)),
        }
    }
}

fn encode_block_id(out: &mut Vec<u8>, block: &BlockId) {
    out.extend(block.workchain.to_be_bytes());
    out.extend(block.shard.to_be_bytes());
    out.extend(block.seqno.to_be_bytes());
    out.extend(block.root_hash.as_slice());
    out.extend(block.gen_utime.to_be_bytes());
}

fn decode_block_id(r: &mut Cursor<'_>) -> Result<BlockId, WireError> {
    Ok(BlockId {
        workchain: r.read_i32()?,
        shard: r.read_u64()?,
        seqno: r.read_u32()?,
        root_hash: B256::from_slice(r.read_bytes(32)?),
        gen_utime: r.read_u32()?,
    })
}

/// Write one length-prefixed frame.
pub async fn write_frame<S>(stream: &mut S, payload: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

/// Read one length-prefixed frame.
pub async fn read_frame<S>(stream: &mut S) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.buf.len() - self.pos < n {
            return Err(WireError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.read_bytes(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.read_bytes(4)?.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_be_bytes(self.read_bytes(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_be_bytes(self.read_bytes(8)?.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MASTERCHAIN, SHARD_FULL};

    #[test]
    fn test_lookup_request_roundtrip() {
        let req = Request::LookupBlock {
            workchain: MASTERCHAIN,
            shard: SHARD_FULL,
            utime: 1_704_067_200,
        };
        assert_eq!(Request::decode(&req.encode()), Ok(req));
    }

    #[test]
    fn test_error_response_decodes() {
        let resp = Response::Error {
            code: -251,
            message: "ltdb: block not found".into(),
        };
        assert_eq!(Response::decode(&resp.encode()), Ok(resp));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut payload = 0xdeadbeefu32.to_be_bytes().to_vec();
        payload.extend([0; 8]);
        assert_eq!(
            Response::decode(&payload),
            Err(WireError::UnknownTag(0xdeadbeef))
        );
    }

    #[test]
    fn test_truncated_body_rejected() {
        let resp = Response::AccountState(vec![1, 2, 3, 4, 5]);
        let payload = resp.encode();
        assert_eq!(
            Response::decode(&payload[..payload.len() - 2]),
            Err(WireError::Truncated)
        );
    }
}
