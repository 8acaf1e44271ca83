//! Forwarding payloads from RFC4254 §7

use bytes::{BufMut, BytesMut};

use super::{get_string, get_u32, put_string, WireDecode, WireEncode, WireError};

/// Extra data of a `direct-tcpip` channel-open (RFC4254 §7.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalForwardOpenData {
    /// Host the client wants the server to connect to
    pub dest_host: String,
    /// Port the client wants the server to connect to
    pub dest_port: u32,
    /// Address of the originating client socket
    pub origin_host: String,
    /// Port of the originating client socket
    pub origin_port: u32,
}

/// Payload of a `tcpip-forward` global request (RFC4254 §7.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteForwardRequest {
    /// Address the server should listen on, as sent by the client
    pub bind_addr: String,
    /// Port to listen on; 0 lets the server pick
    pub bind_port: u32,
}

/// Reply payload of a successful `tcpip-forward`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteForwardSuccess {
    /// Port the listener actually bound
    pub bound_port: u32,
}

/// Payload of a `cancel-tcpip-forward` global request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteForwardCancelRequest {
    /// Address passed to the earlier `tcpip-forward`
    pub bind_addr: String,
    /// Port passed to the earlier `tcpip-forward`
    pub bind_port: u32,
}

/// Extra data of a server-initiated `forwarded-tcpip` channel-open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteForwardChannelData {
    /// Bind address from the `tcpip-forward` request
    pub dest_host: String,
    /// Port the listener is bound to
    pub dest_port: u32,
    /// Peer address of the accepted connection
    pub origin_host: String,
    /// Peer port of the accepted connection
    pub origin_port: u32,
}

impl WireEncode for LocalForwardOpenData {
    fn encode_to(&self, buf: &mut BytesMut) {
        put_string(buf, &self.dest_host);
        buf.put_u32(self.dest_port);
        put_string(buf, &self.origin_host);
        buf.put_u32(self.origin_port);
    }
}

impl WireDecode for LocalForwardOpenData {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            dest_host: get_string(buf)?,
            dest_port: get_u32(buf)?,
            origin_host: get_string(buf)?,
            origin_port: get_u32(buf)?,
        })
    }
}

impl WireEncode for RemoteForwardRequest {
    fn encode_to(&self, buf: &mut BytesMut) {
        put_string(buf, &self.bind_addr);
        buf.put_u32(self.bind_port);
    }
}

impl WireDecode for RemoteForwardRequest {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            bind_addr: get_string(buf)?,
            bind_port: get_u32(buf)?,
        })
    }
}

impl WireEncode for RemoteForwardSuccess {
    fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u32(self.bound_port);
    }
}

impl WireDecode for RemoteForwardSuccess {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            bound_port: get_u32(buf)?,
        })
    }
}

impl WireEncode for RemoteForwardCancelRequest {
    fn encode_to(&self, buf: &mut BytesMut) {
        put_string(buf, &self.bind_addr);
        buf.put_u32(self.bind_port);
    }
}

impl WireDecode for RemoteForwardCancelRequest {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            bind_addr: get_string(buf)?,
            bind_port: get_u32(buf)?,
        })
    }
}

impl WireEncode for RemoteForwardChannelData {
    fn encode_to(&self, buf: &mut BytesMut) {
        put_string(buf, &self.dest_host);
        buf.put_u32(self.dest_port);
        put_string(buf, &self.origin_host);
        buf.put_u32(self.origin_port);
    }
}

impl WireDecode for RemoteForwardChannelData {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            dest_host: get_string(buf)?,
            dest_port: get_u32(buf)?,
            origin_host: get_string(buf)?,
            origin_port: get_u32(buf)?,
        })
    }
}
