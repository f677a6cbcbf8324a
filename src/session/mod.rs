//! Logical stream sessions.
//!
//! A physical connection carries many logical streams, keyed by the 2-byte stream
//! id of each request. Every stream owns an open-file table and processes its
//! requests strictly in order on its own task.
//!
//! ```text
//! Connection ──> LogicalStreamManager ──┬──> LogicalStream 1 ──> StreamListener
//!                 (admission control)   ├──> LogicalStream 7 ──> StreamListener
//!                                       └──> ...
//! ```

mod manager;
mod stream;
mod table;

pub use manager::{LogicalStreamManager, SessionPolicy, StreamRegistry, DEDICATED_STREAM_ID};
pub use stream::{LogicalStream, StreamListener};
pub use table::{OpenFile, OpenFileTable};
