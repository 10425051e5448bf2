//! Byte-stream sources for media images.
//!
//! This module provides the stream layer consumed by the media manager:
//! - `StreamSource`: open-by-name interface plus whole-file checksum
//! - `MediaStream`: an open, seekable image stream
//! - `HostStreamSource`: host filesystem implementation
//! - `MemoryStreamSource`: in-memory implementation

mod host;
mod memory;
mod source;

pub use host::HostStreamSource;
pub use memory::{MemoryStream, MemoryStreamSource, OpenAttempt};
pub use source::{crc32_stream, FileType, MediaStream, StreamSource};
