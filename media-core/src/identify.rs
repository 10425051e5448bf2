//! Content identification.
//!
//! The checksum of an image comes from the first source that yields a
//! nonzero value:
//! 1. partial-checksum hooks of the slot's device type, in registration order
//! 2. the byte-stream source's whole-file checksum
//! 3. the checksum cache, for files shorter than [`SHORT_FILE_LIMIT`]

use std::io::SeekFrom;

use log::debug;

use crate::checksum_cache::{CachedChecksum, ChecksumCache};
use crate::device::{DeviceTable, DeviceType};
use crate::error::MediaResult;
use crate::stream::{MediaStream, StreamSource};

/// Files shorter than this may take their checksum from the cache.
pub const SHORT_FILE_LIMIT: u64 = 0x10_0000;

/// Result of identifying an open image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Identification {
    pub length: u64,
    /// Zero when no source produced a checksum.
    pub crc: u32,
}

impl Identification {
    pub fn has_checksum(&self) -> bool {
        self.crc != 0
    }
}

/// Everything identification needs besides the stream itself.
pub struct Identifier<'a> {
    pub devices: &'a DeviceTable,
    pub source: &'a mut dyn StreamSource,
    pub cache: &'a mut ChecksumCache,
    pub system: &'a str,
}

impl Identifier<'_> {
    /// Identify `stream`, leaving it positioned at offset 0.
    pub fn identify(
        &mut self,
        device: DeviceType,
        filename: &str,
        stream: &mut dyn MediaStream,
    ) -> MediaResult<Identification> {
        stream.seek(SeekFrom::Start(0))?;
        let mut length = stream.size()?;
        let mut crc = 0;

        let mut scratch: Option<Vec<u8>> = None;
        for descriptor in self.devices.checksum_hooks(device) {
            if scratch.is_none() {
                let mut buf = Vec::with_capacity(length as usize);
                stream.read_to_end(&mut buf)?;
                stream.seek(SeekFrom::Start(0))?;
                scratch = Some(buf);
            }
            let data = scratch.as_deref().unwrap_or_default();
            crc = descriptor.hooks().partial_checksum(data);
            debug!("identify: partial checksum for {} -> {:08x}", filename, crc);
            if crc != 0 {
                break;
            }
        }

        if crc == 0 {
            crc = self.source.whole_file_checksum(stream)?;
            debug!("identify: whole-file checksum for {} -> {:08x}", filename, crc);
        }

        if crc == 0 && length < SHORT_FILE_LIMIT {
            if let Some(cached) = self.cache.lookup(self.system, filename) {
                debug!("identify: cached checksum for {} -> {:08x}", filename, cached.crc);
                crc = cached.crc;
                length = cached.length;
            }
        } else if crc != 0 && length < SHORT_FILE_LIMIT {
            self.cache
                .remember(self.system, filename, CachedChecksum { length, crc });
        }

        stream.seek(SeekFrom::Start(0))?;
        Ok(Identification { length, crc })
    }
}
