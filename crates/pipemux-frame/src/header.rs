use bytes::{BufMut, BytesMut};
use uuid::Uuid;

use crate::protocol_type::{type_header_length, ProtocolType};

/// Fixed header: type (1) + request id (16) + length (4) + end flag (1) = 22 bytes.
pub const HEADER_SIZE: usize = 22;

/// Default maximum content length accepted for a single packet: 16 MiB.
pub const DEFAULT_MAX_PACKET_LENGTH: usize = 16 * 1024 * 1024;

const TYPE_OFFSET: usize = 0;
const REQUEST_ID_OFFSET: usize = 1;
const LENGTH_OFFSET: usize = 17;
const END_OFFSET: usize = 21;

/// Header of one wire packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Raw payload type tag. Unknown tags survive decoding so the receiver
    /// can reject them per request.
    pub payload_type: u8,
    /// Request id shared by every packet of one exchange.
    pub request_id: Uuid,
    /// Content bytes following this header (and its type header).
    pub length: u32,
    /// Set on the final packet of a payload.
    pub is_end: bool,
    /// Content feed index, for content-carrying types.
    pub type_header: Option<u8>,
}

impl PacketHeader {
    /// The typed payload kind, or the raw tag if it is unknown.
    pub fn protocol_type(&self) -> Result<ProtocolType, u8> {
        ProtocolType::try_from(self.payload_type)
    }

    /// Length of the type header implied by the tag.
    pub fn type_header_length(&self) -> usize {
        type_header_length(self.payload_type)
    }

    /// Encode the header and its type header, if any, into `dst`.
    ///
    /// Wire format:
    /// ```text
    /// ┌──────────┬──────────────────┬───────────┬─────────┬─────────────┐
    /// │ Type (1B)│ Request id (16B) │ Length    │ End (1B)│ Type header │
    /// │          │ RFC 4122 order   │ (4B LE)   │ 0 or 1  │ (0 or 1B)   │
    /// └──────────┴──────────────────┴───────────┴─────────┴─────────────┘
    /// ```
    pub fn encode(&self, dst: &mut BytesMut) {
        let type_header_len = self.type_header_length();
        dst.reserve(HEADER_SIZE + type_header_len);
        dst.put_u8(self.payload_type);
        dst.put_slice(self.request_id.as_bytes());
        dst.put_u32_le(self.length);
        dst.put_u8(u8::from(self.is_end));
        if type_header_len == 1 {
            dst.put_u8(self.type_header.unwrap_or_default());
        }
    }

    /// Decode the fixed part of a header.
    ///
    /// `type_header` is left `None`; the reader fills it in after reading
    /// [`type_header_length`](Self::type_header_length) more bytes. Any
    /// non-zero end byte counts as set.
    pub fn decode(src: &[u8; HEADER_SIZE]) -> Self {
        let mut id = [0u8; 16];
        id.copy_from_slice(&src[REQUEST_ID_OFFSET..LENGTH_OFFSET]);
        let mut length = [0u8; 4];
        length.copy_from_slice(&src[LENGTH_OFFSET..END_OFFSET]);

        Self {
            payload_type: src[TYPE_OFFSET],
            request_id: Uuid::from_bytes(id),
            length: u32::from_le_bytes(length),
            is_end: src[END_OFFSET] != 0,
            type_header: None,
        }
    }
}

/// Limits applied by the packet reader.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Largest `length` accepted in an inbound header. Default: 16 MiB.
    pub max_packet_length: usize,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_packet_length: DEFAULT_MAX_PACKET_LENGTH,
        }
    }
}
