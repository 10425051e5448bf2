//! Media slots.
//!
//! A slot is one addressable place media can be loaded into, identified by
//! device type and instance. Everything it owns (stream, strings, driver
//! buffers) is dropped or released together by [`Slot::clear`].

use std::fmt;

use crate::arena::{ArenaHandle, SlotArena};
use crate::device::DeviceType;
use crate::identify::Identification;
use crate::metadata::MetadataRecord;
use crate::negotiate::OpenMode;
use crate::stream::MediaStream;

/// Address of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub device: DeviceType,
    pub instance: usize,
}

impl SlotKey {
    pub fn new(device: DeviceType, instance: usize) -> Self {
        Self { device, instance }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.device, self.instance)
    }
}

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Empty,
    Loading,
    Loaded,
    Unloading,
}

#[derive(Debug, Default, Clone, Copy)]
struct Enrichment {
    longname: Option<ArenaHandle>,
    manufacturer: Option<ArenaHandle>,
    year: Option<ArenaHandle>,
    playable: Option<ArenaHandle>,
    extrainfo: Option<ArenaHandle>,
}

/// One media slot.
pub struct Slot {
    key: SlotKey,
    state: SlotState,
    stream: Option<Box<dyn MediaStream>>,
    arena: SlotArena,
    name: Option<ArenaHandle>,
    dir: Option<ArenaHandle>,
    length: u64,
    crc: u32,
    identified: bool,
    mode: Option<OpenMode>,
    enrichment: Enrichment,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("name", &self.filename())
            .field("open", &self.stream.is_some())
            .field("length", &self.length)
            .field("crc", &format_args!("{:08x}", self.crc))
            .finish_non_exhaustive()
    }
}

impl Slot {
    pub fn new(key: SlotKey) -> Self {
        Self {
            key,
            state: SlotState::Empty,
            stream: None,
            arena: SlotArena::new(),
            name: None,
            dir: None,
            length: 0,
            crc: 0,
            identified: false,
            mode: None,
            enrichment: Enrichment::default(),
        }
    }

    pub fn key(&self) -> SlotKey {
        self.key
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == SlotState::Loaded
    }

    /// Full image name, rewritten to `archive/entry` after an unwrap.
    pub fn filename(&self) -> Option<&str> {
        self.arena_str(self.name)
    }

    /// Whether the slot has an image name.
    pub fn exists(&self) -> bool {
        self.name.is_some()
    }

    /// Name without its directory part.
    pub fn basename(&self) -> Option<&str> {
        let name = self.filename()?;
        Some(match name.rfind(is_dir_separator) {
            Some(pos) => &name[pos + 1..],
            None => name,
        })
    }

    /// Extension of the basename, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let base = self.basename()?;
        base.rfind('.').map(|pos| &base[pos + 1..])
    }

    /// Everything before the basename, without the trailing separator;
    /// empty for a bare filename.
    pub fn directory(&self) -> Option<&str> {
        self.arena_str(self.dir)
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Checksum of the image; zero when none could be computed.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Effective open mode of the current stream.
    pub fn open_mode(&self) -> Option<OpenMode> {
        self.mode
    }

    pub fn longname(&self) -> Option<&str> {
        self.arena_str(self.enrichment.longname)
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.arena_str(self.enrichment.manufacturer)
    }

    pub fn year(&self) -> Option<&str> {
        self.arena_str(self.enrichment.year)
    }

    pub fn playable(&self) -> Option<&str> {
        self.arena_str(self.enrichment.playable)
    }

    pub fn extrainfo(&self) -> Option<&str> {
        self.arena_str(self.enrichment.extrainfo)
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// The open stream, for devices that read or write media directly.
    pub fn stream_mut(&mut self) -> Option<&mut dyn MediaStream> {
        match self.stream.as_mut() {
            Some(stream) => {
                let stream: &mut dyn MediaStream = stream.as_mut();
                Some(stream)
            }
            None => None,
        }
    }

    pub fn arena(&self) -> &SlotArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut SlotArena {
        &mut self.arena
    }

    pub(crate) fn set_state(&mut self, state: SlotState) {
        self.state = state;
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = Some(self.arena.strdup(name));
        let dir = match name.rfind(is_dir_separator) {
            Some(pos) => &name[..pos],
            None => "",
        };
        self.dir = Some(self.arena.strdup(dir));
    }

    pub(crate) fn is_identified(&self) -> bool {
        self.identified
    }

    pub(crate) fn set_length(&mut self, length: u64) {
        self.length = length;
    }

    pub(crate) fn set_identification(&mut self, id: Identification) {
        self.length = id.length;
        self.crc = id.crc;
        self.identified = true;
    }

    pub(crate) fn set_enrichment(&mut self, record: &MetadataRecord) {
        let mut dup = |s: &str| Some(self.arena.strdup(s));
        self.enrichment = Enrichment {
            longname: dup(&record.longname),
            manufacturer: dup(&record.manufacturer),
            year: dup(&record.year),
            playable: dup(&record.playable),
            extrainfo: dup(&record.extrainfo),
        };
    }

    pub(crate) fn attach_stream(&mut self, stream: Box<dyn MediaStream>, mode: OpenMode) {
        self.stream = Some(stream);
        self.mode = Some(mode);
    }

    /// Record the effective mode reported by negotiation.
    pub(crate) fn attach_mode(&mut self, mode: OpenMode) {
        self.mode = Some(mode);
    }

    /// Close the stream, keeping the rest of the slot.
    pub(crate) fn close_stream(&mut self) -> bool {
        self.mode = None;
        self.stream.take().is_some()
    }

    /// Drop the stream, release the arena and forget everything.
    pub(crate) fn clear(&mut self) {
        self.stream = None;
        self.arena.release();
        *self = Self {
            arena: std::mem::take(&mut self.arena),
            ..Self::new(self.key)
        };
    }

    fn arena_str(&self, handle: Option<ArenaHandle>) -> Option<&str> {
        handle.and_then(|h| self.arena.str(h))
    }
}

fn is_dir_separator(c: char) -> bool {
    matches!(c, '/' | '\\' | ':')
}
