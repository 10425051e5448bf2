//! Byte-stream collaborator interface.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};

use crate::negotiate::OpenMode;

/// Kind of file being opened; sources may map kinds to different locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    /// A media image.
    #[default]
    Image,
    /// A write-back difference file kept next to a read-only image.
    ImageDiff,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::Image => f.write_str("image"),
            FileType::ImageDiff => f.write_str("image-diff"),
        }
    }
}

/// An open media stream. Dropping it closes it.
pub trait MediaStream: Read + Write + Seek + Send {
    /// Total length in bytes. The stream position is preserved.
    fn size(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }
}

impl MediaStream for std::fs::File {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl MediaStream for io::Cursor<Vec<u8>> {}

/// Opens media streams by name.
pub trait StreamSource: Send {
    /// Open `filename` for `system` in `mode`. Fails if the file cannot be
    /// opened in exactly that mode.
    fn open(
        &mut self,
        system: &str,
        filename: &str,
        filetype: FileType,
        mode: OpenMode,
    ) -> io::Result<Box<dyn MediaStream>>;

    /// CRC-32 over the whole stream. The stream position is preserved.
    fn whole_file_checksum(&mut self, stream: &mut dyn MediaStream) -> io::Result<u32> {
        crc32_stream(stream)
    }
}

/// CRC-32 of everything in `stream`, restoring its position afterwards.
pub fn crc32_stream(stream: &mut dyn MediaStream) -> io::Result<u32> {
    let pos = stream.stream_position()?;
    stream.seek(SeekFrom::Start(0))?;

    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    stream.seek(SeekFrom::Start(pos))?;
    Ok(hasher.finalize())
}
