use bytes::Bytes;
use uuid::Uuid;

use crate::header::PacketHeader;
use crate::protocol_type::ProtocolType;

/// Largest content chunk carried by one outbound packet.
pub const MAX_PACKET_SIZE: usize = 4096;

/// One bounded chunk of a payload, as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub content: Bytes,
}

/// One complete logical unit (a header record or one content feed) before
/// shredding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub payload_type: u8,
    pub type_header: Option<u8>,
    pub request_id: Uuid,
    pub content: Bytes,
}

impl Payload {
    /// Create a payload without a type header.
    pub fn new(kind: ProtocolType, request_id: Uuid, content: impl Into<Bytes>) -> Self {
        Self {
            payload_type: kind.as_u8(),
            type_header: None,
            request_id,
            content: content.into(),
        }
    }

    /// Create a `Content` payload for feed `feed_id`.
    pub fn content(request_id: Uuid, feed_id: u8, content: impl Into<Bytes>) -> Self {
        Self {
            payload_type: ProtocolType::Content.as_u8(),
            type_header: Some(feed_id),
            request_id,
            content: content.into(),
        }
    }

    /// The typed payload kind, or the raw tag if it is unknown.
    pub fn protocol_type(&self) -> Result<ProtocolType, u8> {
        ProtocolType::try_from(self.payload_type)
    }

    pub fn content_length(&self) -> usize {
        self.content.len()
    }

    /// Number of packets [`to_packets`] produces for this payload.
    pub fn packet_count(&self) -> usize {
        self.content.len().div_ceil(MAX_PACKET_SIZE).max(1)
    }

    fn packet_header(&self, length: usize, is_end: bool) -> PacketHeader {
        PacketHeader {
            payload_type: self.payload_type,
            request_id: self.request_id,
            // Chunks never exceed MAX_PACKET_SIZE.
            length: length as u32,
            is_end,
            type_header: self.type_header,
        }
    }
}

/// Split a payload into wire packets.
///
/// Produces `ceil(len / MAX_PACKET_SIZE)` packets, and one empty packet for
/// an empty payload. Every packet copies the payload's type, request id and
/// type header; only the last one is marked `is_end`. Packet contents are
/// slices of the payload's buffer, not copies.
pub fn to_packets(payload: &Payload) -> Vec<Packet> {
    let total = payload.content.len();
    if total == 0 {
        return vec![Packet {
            header: payload.packet_header(0, true),
            content: Bytes::new(),
        }];
    }

    (0..total)
        .step_by(MAX_PACKET_SIZE)
        .map(|start| {
            let end = (start + MAX_PACKET_SIZE).min(total);
            Packet {
                header: payload.packet_header(end - start, end == total),
                content: payload.content.slice(start..end),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned(len: usize) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>().into()
    }

    #[test]
    fn shredding_preserves_bytes_and_counts() {
        for len in [0usize, 1, 4095, 4096, 4097, 50_000] {
            let payload = Payload::new(ProtocolType::Request, Uuid::new_v4(), patterned(len));
            let packets = to_packets(&payload);

            assert_eq!(packets.len(), len.div_ceil(MAX_PACKET_SIZE).max(1), "len {len}");
            assert_eq!(packets.len(), payload.packet_count());

            let joined: Vec<u8> = packets
                .iter()
                .flat_map(|packet| packet.content.iter().copied())
                .collect();
            assert_eq!(joined, payload.content.as_ref(), "len {len}");
        }
    }

    #[test]
    fn only_last_packet_is_end() {
        let payload = Payload::new(ProtocolType::Response, Uuid::new_v4(), patterned(10_000));
        let packets = to_packets(&payload);
        let ends: Vec<bool> = packets.iter().map(|packet| packet.header.is_end).collect();
        assert_eq!(ends, vec![false, false, true]);
    }

    #[test]
    fn headers_copy_payload_identity() {
        let request_id = Uuid::new_v4();
        let payload = Payload::content(request_id, 4, patterned(9000));
        for packet in to_packets(&payload) {
            assert_eq!(packet.header.request_id, request_id);
            assert_eq!(packet.header.payload_type, ProtocolType::Content.as_u8());
            assert_eq!(packet.header.type_header, Some(4));
            assert_eq!(packet.header.length as usize, packet.content.len());
            assert!(packet.content.len() <= MAX_PACKET_SIZE);
        }
    }

    #[test]
    fn empty_payload_yields_single_terminal_packet() {
        let payload = Payload::new(ProtocolType::ContentHeader, Uuid::new_v4(), Bytes::new());
        let packets = to_packets(&payload);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].header.is_end);
        assert_eq!(packets[0].header.length, 0);
    }

    #[test]
    fn shredding_is_repeatable() {
        let payload = Payload::new(ProtocolType::Request, Uuid::new_v4(), patterned(5000));
        assert_eq!(to_packets(&payload), to_packets(&payload));
    }
}
