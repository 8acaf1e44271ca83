//! RFC4254 wire encoding
//!
//! Forwarding payloads are sequences of SSH `string` (uint32 big-endian
//! length followed by the bytes) and `uint32` fields. Field order is part of
//! the protocol, so every payload type encodes and decodes its fields by hand.

mod payloads;

pub use payloads::{
    LocalForwardOpenData, RemoteForwardCancelRequest, RemoteForwardChannelData,
    RemoteForwardRequest, RemoteForwardSuccess,
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors produced while decoding a payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ended before a field was complete
    #[error("unexpected end of payload: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes required by the field being decoded
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Bytes were left over after the last field
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// A value with a fixed RFC4254 encoding
pub trait WireEncode {
    /// Append the encoded fields to `buf`
    fn encode_to(&self, buf: &mut BytesMut);

    /// Encode into a fresh buffer
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_to(&mut buf);
        buf.freeze()
    }
}

/// A value that can be parsed from its RFC4254 encoding
pub trait WireDecode: Sized {
    /// Decode the fields from the front of `buf`, advancing it
    fn decode_from(buf: &mut &[u8]) -> Result<Self, WireError>;

    /// Decode a complete payload, rejecting trailing data
    fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut buf = data;
        let value = Self::decode_from(&mut buf)?;
        if !buf.is_empty() {
            return Err(WireError::TrailingBytes(buf.len()));
        }
        Ok(value)
    }
}

pub(crate) fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

pub(crate) fn get_u32(buf: &mut &[u8]) -> Result<u32, WireError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

/// Read a length-prefixed string
///
/// Invalid UTF-8 sequences are replaced with U+FFFD.
pub(crate) fn get_string(buf: &mut &[u8]) -> Result<String, WireError> {
    let len = get_u32(buf)? as usize;
    ensure(buf, len)?;
    let raw = buf.copy_to_bytes(len);
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn ensure(buf: &[u8], needed: usize) -> Result<(), WireError> {
    if buf.len() < needed {
        return Err(WireError::UnexpectedEof {
            needed,
            remaining: buf.len(),
        });
    }
    Ok(())
}
