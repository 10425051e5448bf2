//! In-memory stream source.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use super::source::{FileType, MediaStream, StreamSource};
use crate::archive::{read_entry, split_archive_path};
use crate::negotiate::OpenMode;

/// One call to [`StreamSource::open`], recorded for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAttempt {
    pub filename: String,
    pub mode: OpenMode,
    pub succeeded: bool,
}

#[derive(Default)]
struct MemoryInner {
    files: HashMap<String, Vec<u8>>,
    read_only: HashSet<String>,
    attempts: Vec<OpenAttempt>,
}

/// Stream source backed by a shared in-memory file table.
///
/// Clones share the same table, so a clone kept outside the manager sees the
/// files written by streams and the log of open attempts. Archive entries are
/// resolved through ZIP files stored in the table and are always read-only.
#[derive(Default, Clone)]
pub struct MemoryStreamSource {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStreamSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with initial files.
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        let source = Self::new();
        for (name, data) in files {
            source.add_file(name, data);
        }
        source
    }

    /// Add or replace a file.
    pub fn add_file(&self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        let name = name.into();
        let mut inner = self.lock();
        inner.read_only.remove(&name);
        inner.files.insert(name, data.into());
    }

    /// Add a file that can only be opened for reading.
    pub fn add_read_only(&self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        let name = name.into();
        let mut inner = self.lock();
        inner.files.insert(name.clone(), data.into());
        inner.read_only.insert(name);
    }

    /// Current content of a file.
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().files.get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.lock().files.contains_key(name)
    }

    /// All open attempts so far, oldest first.
    pub fn attempts(&self) -> Vec<OpenAttempt> {
        self.lock().attempts.clone()
    }

    pub fn clear_attempts(&self) {
        self.lock().attempts.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // Every update is a single insert or push.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open_inner(&self, filename: &str, mode: OpenMode) -> io::Result<MemoryStream> {
        let inner = self.lock();
        let exists = inner.files.contains_key(filename);
        let read_only = inner.read_only.contains(filename);

        if !exists {
            if let Some(data) = archive_entry(&inner.files, filename)? {
                if mode.is_writable() {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        "archive entries are read-only",
                    ));
                }
                return Ok(MemoryStream::detached(data));
            }
        }

        match mode {
            OpenMode::Read if exists => {
                let data = inner.files.get(filename).cloned().unwrap_or_default();
                Ok(MemoryStream::detached(data))
            }
            OpenMode::ReadWrite if exists && !read_only => {
                let data = inner.files.get(filename).cloned().unwrap_or_default();
                Ok(MemoryStream::attached(data, self.clone(), filename))
            }
            OpenMode::Write | OpenMode::ReadWriteCreate if !read_only => {
                if !exists && container_exists(&inner.files, filename) {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        "cannot create a file inside an archive",
                    ));
                }
                drop(inner);
                self.add_file(filename, Vec::new());
                let mut stream = MemoryStream::attached(Vec::new(), self.clone(), filename);
                stream.readable = mode != OpenMode::Write;
                Ok(stream)
            }
            _ if read_only => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is read-only", filename),
            )),
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", filename),
            )),
        }
    }
}

impl StreamSource for MemoryStreamSource {
    fn open(
        &mut self,
        _system: &str,
        filename: &str,
        _filetype: FileType,
        mode: OpenMode,
    ) -> io::Result<Box<dyn MediaStream>> {
        let result = self.open_inner(filename, mode);
        self.lock().attempts.push(OpenAttempt {
            filename: filename.to_string(),
            mode,
            succeeded: result.is_ok(),
        });
        result.map(|stream| Box::new(stream) as Box<dyn MediaStream>)
    }
}

/// Resolve `path` as `container/entry` against ZIP files in the table.
fn archive_entry(files: &HashMap<String, Vec<u8>>, path: &str) -> io::Result<Option<Vec<u8>>> {
    for (container, entry) in split_archive_path(path) {
        if let Some(zip) = files.get(container) {
            return read_entry(Cursor::new(zip.as_slice()), entry)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()));
        }
    }
    Ok(None)
}

fn container_exists(files: &HashMap<String, Vec<u8>>, path: &str) -> bool {
    split_archive_path(path).any(|(container, _)| files.contains_key(container))
}

/// Stream over an in-memory copy of a file.
///
/// Writable streams write their content back to the source when dropped.
/// Streams opened in [`OpenMode::Write`] cannot be read, like a write-only
/// host file.
pub struct MemoryStream {
    cursor: Cursor<Vec<u8>>,
    sink: Option<(MemoryStreamSource, String)>,
    readable: bool,
    dirty: bool,
}

impl MemoryStream {
    fn detached(data: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(data),
            sink: None,
            readable: true,
            dirty: false,
        }
    }

    fn attached(data: Vec<u8>, source: MemoryStreamSource, name: &str) -> Self {
        Self {
            cursor: Cursor::new(data),
            sink: Some((source, name.to_string())),
            readable: true,
            dirty: false,
        }
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.readable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "stream opened write-only",
            ));
        }
        self.cursor.read(buf)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sink.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "stream opened read-only",
            ));
        }
        self.dirty = true;
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some((source, name)) = &self.sink {
            if self.dirty {
                source.lock().files.insert(name.clone(), self.cursor.get_ref().clone());
                self.dirty = false;
            }
        }
        Ok(())
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl MediaStream for MemoryStream {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
