//! Packet framing for pipemux.
//!
//! Every packet on the wire is a fixed 22-byte header, an optional type
//! header, then `length` content bytes:
//! - 1-byte payload type
//! - 16-byte request id (UUID, RFC 4122 byte order)
//! - 4-byte little-endian content length
//! - 1-byte end-of-payload flag
//!
//! Logical payloads of any size are shredded into packets of at most
//! [`MAX_PACKET_SIZE`] content bytes; the receiver reassembles them by
//! request id.

pub mod error;
pub mod header;
pub mod payload;
pub mod protocol_type;
pub mod reader;
pub mod writer;

pub use error::{FrameError, Result};
pub use header::{PacketConfig, PacketHeader, DEFAULT_MAX_PACKET_LENGTH, HEADER_SIZE};
pub use payload::{to_packets, Packet, Payload, MAX_PACKET_SIZE};
pub use protocol_type::{protocol_type_name, type_header_length, ProtocolType};
pub use reader::PacketReader;
pub use writer::PacketWriter;
