//! Framing between the socket and typed messages.
//!
//! | Direction | Type                | Input             | Output            |
//! |-----------|---------------------|-------------------|-------------------|
//! | inbound   | [`FrameDecoder`]    | `BytesMut`        | [`Request`]       |
//! | outbound  | [`ResponseEncoder`] | [`Outbound`]      | framed `Bytes`    |
//!
//! [`Request`]: crate::protocol::Request

mod decoder;
mod encoder;

pub use decoder::FrameDecoder;
pub use encoder::{spawn_writer_task, Outbound, ResponseEncoder};
