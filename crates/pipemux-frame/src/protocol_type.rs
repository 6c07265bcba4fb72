//! Payload type tags.
//!
//! The tag in byte 0 of every packet header says what the payload carries.
//! Only content-carrying types are followed by a one-byte type header (the
//! content feed index); its presence is derived from the tag, never sent.

/// Known payload types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolType {
    /// Request header (method, path, headers, feed count).
    Request = 0,
    /// Response header (status, headers, feed count).
    Response = 1,
    /// Metadata announcing the next content feed.
    ContentHeader = 2,
    /// One content feed's bytes.
    Content = 3,
    /// Reserved for streamed content. Not implemented.
    ContentStream = 4,
    /// Reserved for cancellation. Not implemented.
    Cancel = 5,
}

impl ProtocolType {
    /// The wire tag.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether packets of this type carry a type header.
    pub const fn has_type_header(self) -> bool {
        matches!(self, Self::Content | Self::ContentStream)
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Response => "RESPONSE",
            Self::ContentHeader => "CONTENT_HEADER",
            Self::Content => "CONTENT",
            Self::ContentStream => "CONTENT_STREAM",
            Self::Cancel => "CANCEL",
        }
    }
}

impl TryFrom<u8> for ProtocolType {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, u8> {
        match tag {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            2 => Ok(Self::ContentHeader),
            3 => Ok(Self::Content),
            4 => Ok(Self::ContentStream),
            5 => Ok(Self::Cancel),
            other => Err(other),
        }
    }
}

impl From<ProtocolType> for u8 {
    fn from(value: ProtocolType) -> Self {
        value.as_u8()
    }
}

/// Length of the type header that follows a packet header with this tag.
///
/// Unknown tags carry no type header.
pub fn type_header_length(tag: u8) -> usize {
    match ProtocolType::try_from(tag) {
        Ok(kind) if kind.has_type_header() => 1,
        _ => 0,
    }
}

/// Returns a human-readable name for a raw type tag.
pub fn protocol_type_name(tag: u8) -> &'static str {
    ProtocolType::try_from(tag).map_or("UNKNOWN", ProtocolType::name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_content_types_have_type_headers() {
        let with_header: Vec<u8> = (0..=u8::MAX)
            .filter(|tag| type_header_length(*tag) == 1)
            .collect();
        assert_eq!(with_header, vec![3, 4]);
    }

    #[test]
    fn tags_convert_both_ways() {
        for tag in 0..=5u8 {
            let kind = ProtocolType::try_from(tag).unwrap();
            assert_eq!(u8::from(kind), tag);
        }
        assert_eq!(ProtocolType::try_from(6), Err(6));
    }

    #[test]
    fn names_cover_unknown_tags() {
        assert_eq!(protocol_type_name(0), "REQUEST");
        assert_eq!(protocol_type_name(3), "CONTENT");
        assert_eq!(protocol_type_name(200), "UNKNOWN");
    }
}
