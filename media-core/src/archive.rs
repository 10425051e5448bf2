//! Transparent single-entry archive handling.
//!
//! An image may arrive wrapped in a ZIP container. The opener only looks at
//! the first local file header: if the stream starts with the local header
//! signature, the entry name stored in that header is appended to the outer
//! path and the composed path is opened instead. Sources resolve such
//! composed paths with [`split_archive_path`] and [`read_entry`].

use std::io::{Read, Seek, SeekFrom};
use std::path::MAIN_SEPARATOR;

use zip::ZipArchive;

use crate::error::{MediaError, MediaResult};
use crate::stream::MediaStream;

/// Local file header signature ("PK\x03\x04").
pub const LOCAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Offset of the little-endian filename length in a local file header.
const NAME_LENGTH_OFFSET: u64 = 26;

/// Offset of the filename in a local file header.
const NAME_OFFSET: u64 = 30;

/// Inspect an open stream for a local file header.
///
/// Returns the inner entry name, or `None` if the stream is not an archive.
/// A header that matches the signature but is cut short is reported as
/// [`MediaError::MalformedArchive`]. The stream position is unspecified
/// afterwards.
pub fn probe_inner_name(stream: &mut dyn MediaStream, outer: &str) -> MediaResult<Option<String>> {
    let mut signature = [0u8; 4];
    stream.seek(SeekFrom::Start(0))?;
    if read_full(stream, &mut signature)? < signature.len() || signature != LOCAL_HEADER_SIGNATURE
    {
        return Ok(None);
    }

    let malformed = |reason: &str| MediaError::MalformedArchive {
        name: outer.to_string(),
        reason: reason.to_string(),
    };

    let mut len_bytes = [0u8; 2];
    stream.seek(SeekFrom::Start(NAME_LENGTH_OFFSET))?;
    if read_full(stream, &mut len_bytes)? < len_bytes.len() {
        return Err(malformed("truncated local header"));
    }
    let name_len = u16::from_le_bytes(len_bytes) as usize;
    if name_len == 0 {
        return Err(malformed("empty entry name"));
    }

    let mut name = vec![0u8; name_len];
    stream.seek(SeekFrom::Start(NAME_OFFSET))?;
    if read_full(stream, &mut name)? < name_len {
        return Err(malformed("truncated entry name"));
    }

    Ok(Some(String::from_utf8_lossy(&name).into_owned()))
}

/// Path used to reopen the inner entry of `outer`.
pub fn compose_inner_path(outer: &str, inner: &str) -> String {
    format!("{}{}{}", outer, MAIN_SEPARATOR, inner)
}

/// Every way to split `path` into (container, entry), longest container first.
pub fn split_archive_path(path: &str) -> impl Iterator<Item = (&str, &str)> {
    path.char_indices()
        .rev()
        .filter(|&(_, c)| is_separator(c))
        .map(move |(i, c)| (&path[..i], &path[i + c.len_utf8()..]))
        .filter(|(container, entry)| !container.is_empty() && !entry.is_empty())
}

/// Read the bytes of `entry` from a ZIP archive.
pub fn read_entry<R: Read + Seek>(reader: R, entry: &str) -> MediaResult<Vec<u8>> {
    let mut archive = ZipArchive::new(reader)?;
    let mut file = archive.by_name(entry)?;
    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)?;
    Ok(data)
}

/// Whether `c` separates path components.
pub fn is_separator(c: char) -> bool {
    c == '/' || c == MAIN_SEPARATOR
}

/// Read until `buf` is full or the stream ends; returns bytes read.
fn read_full(stream: &mut dyn MediaStream, buf: &mut [u8]) -> MediaResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
