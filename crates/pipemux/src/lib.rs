//! Multiplexed request/response messaging over local pipe pairs.
//!
//! pipemux lets two processes exchange HTTP-like requests and responses over
//! a pair of one-way pipes, with any number of exchanges in flight at once.
//!
//! # Crate Structure
//!
//! - [`transport`]: Pipe-pair transports (Unix domain sockets, named pipes, in-memory)
//! - [`frame`]: Packet header codec, payload shredding and packet I/O
//! - [`protocol`]: Connections, request/response types and multiplexing

/// Re-export transport types.
pub mod transport {
    pub use pipemux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pipemux_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use pipemux_protocol::*;
}
