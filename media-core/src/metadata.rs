//! Descriptive metadata lookup by checksum.
//!
//! A metadata database maps the hex checksum of an image to a record of the
//! form `longname|manufacturer|year|playable|extrainfo`.

use std::collections::HashMap;
use std::path::PathBuf;

use log::debug;

use crate::stream::FileType;

/// Descriptive fields for a known image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    pub longname: String,
    pub manufacturer: String,
    pub year: String,
    pub playable: String,
    pub extrainfo: String,
}

impl MetadataRecord {
    /// Parse a pipe-delimited record. Fields are trimmed; missing trailing
    /// fields are empty and anything past the fifth separator belongs to
    /// `extrainfo`.
    pub fn parse(line: &str) -> Self {
        let mut fields = line.splitn(5, '|').map(str::trim);
        let mut next = || fields.next().unwrap_or_default().to_string();
        Self {
            longname: next(),
            manufacturer: next(),
            year: next(),
            playable: next(),
            extrainfo: next(),
        }
    }
}

/// Checksum formatted as a database key.
pub fn checksum_key(crc: u32) -> String {
    format!("{:08x}", crc)
}

/// An open metadata database. Dropping it closes it.
pub trait MetadataHandle {
    /// The raw record stored under `key`, if any.
    fn lookup_line(&mut self, key: &str) -> Option<String>;
}

/// Opens metadata databases per system.
pub trait MetadataDatabase: Send {
    fn open(&mut self, system: &str, filetype: FileType) -> Option<Box<dyn MetadataHandle + '_>>;
}

/// Look up the record for `crc` in the database for `system`.
///
/// A missing database or key is not an error; it yields `None`.
pub fn enrich(db: &mut dyn MetadataDatabase, system: &str, crc: u32) -> Option<MetadataRecord> {
    let mut handle = db.open(system, FileType::Image)?;
    let key = checksum_key(crc);
    let line = handle.lookup_line(&key)?;
    debug!("metadata: found {} = {}", key, line);
    Some(MetadataRecord::parse(&line))
}

/// Database that never has anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataDatabase for NoMetadata {
    fn open(&mut self, _system: &str, _filetype: FileType) -> Option<Box<dyn MetadataHandle + '_>> {
        None
    }
}

/// INI-style `.crc` files read from a directory: `<dir>/<system>.crc`.
///
/// ```text
/// [nes]
/// 1234abcd=Some Game|Acme|1985|Yes|Bonus text
/// ```
///
/// Keys match case-insensitively; `#` and `;` start comment lines. Only
/// keys in the `[<system>]` section, or before any section header, are
/// looked up.
#[derive(Debug, Clone)]
pub struct IniMetadataDatabase {
    dir: PathBuf,
}

impl IniMetadataDatabase {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MetadataDatabase for IniMetadataDatabase {
    fn open(&mut self, system: &str, _filetype: FileType) -> Option<Box<dyn MetadataHandle + '_>> {
        let path = self.dir.join(format!("{}.crc", system));
        let text = std::fs::read_to_string(&path).ok()?;
        debug!("metadata: opened {}", path.display());
        Some(Box::new(IniHandle {
            text,
            section: system.to_string(),
        }))
    }
}

struct IniHandle {
    text: String,
    section: String,
}

impl MetadataHandle for IniHandle {
    fn lookup_line(&mut self, key: &str) -> Option<String> {
        let mut in_scope = true;
        for line in self.text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with(['#', ';']) {
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let name = header.trim_end_matches(']').trim();
                in_scope = name.eq_ignore_ascii_case(&self.section);
                continue;
            }
            if !in_scope {
                continue;
            }
            if let Some((k, value)) = line.split_once('=') {
                if k.trim().eq_ignore_ascii_case(key) {
                    let value = value.trim();
                    return (!value.is_empty()).then(|| value.to_string());
                }
            }
        }
        None
    }
}

/// In-memory database: system -> key -> record line.
#[derive(Debug, Default, Clone)]
pub struct MemoryMetadataDatabase {
    systems: HashMap<String, HashMap<String, String>>,
}

impl MemoryMetadataDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line in `.crc` syntax (`key=record`) for `system`.
    pub fn add_line(&mut self, system: &str, line: &str) {
        if let Some((key, value)) = line.split_once('=') {
            self.systems
                .entry(system.to_string())
                .or_default()
                .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
}

impl MetadataDatabase for MemoryMetadataDatabase {
    fn open(&mut self, system: &str, _filetype: FileType) -> Option<Box<dyn MetadataHandle + '_>> {
        let records = self.systems.get(system)?;
        Some(Box::new(MemoryHandle { records }))
    }
}

struct MemoryHandle<'a> {
    records: &'a HashMap<String, String>,
}

impl MetadataHandle for MemoryHandle<'_> {
    fn lookup_line(&mut self, key: &str) -> Option<String> {
        self.records.get(&key.to_ascii_lowercase()).cloned()
    }
}
