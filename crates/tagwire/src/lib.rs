//! Type-tagged packet transport with write backpressure.
//!
//! tagwire carries text and binary packets over persistent, message-oriented
//! connections. Each packet is one frame with a leading type tag; sends are
//! gated by a writable flag that flips back only once the connection has
//! acknowledged the whole batch.
//!
//! # Crate Structure
//!
//! - [`frame`]: Packet framing and stream message delimiting
//! - [`transport`]: Backpressure gate, transport adapter, connections
//! - [`session`]: Blocking owner that buffers writes until the transport drains

/// Re-export frame types.
pub mod frame {
    pub use tagwire_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use tagwire_transport::*;
}

pub mod session;

pub use session::{Session, TcpSession};
