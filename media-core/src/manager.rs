//! Media lifecycle orchestration.
//!
//! `MediaManager` owns the device table, one [`Slot`] per (type, instance)
//! pair and the collaborators media loading needs: a byte-stream source, a
//! metadata database, the checksum cache and the machine being emulated.
//!
//! # Load sequence
//!
//! 1. unload whatever is in the slot
//! 2. remember the image name (empty name: nameless slot)
//! 3. reset the machine if the device's reset depth asks for it and the
//!    machine is running; this happens before the file is touched, so a
//!    failed load still resets
//! 4. negotiate an open mode, unwrap archives, identify and enrich; a
//!    write-only stream is not read, so it gets no checksum
//! 5. call the device's init hook
//! 6. floppy family: mark disk inserted and drive connected

use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom};

use log::{debug, error, info, warn};

use crate::archive::{compose_inner_path, probe_inner_name};
use crate::arena::ArenaHandle;
use crate::checksum_cache::ChecksumCache;
use crate::device::{DeviceTable, DeviceType, ResetDepth};
use crate::error::{MediaError, MediaResult};
use crate::floppy::FloppyDrives;
use crate::identify::Identifier;
use crate::metadata::{enrich, MetadataDatabase, NoMetadata};
use crate::negotiate::{negotiate, OpenMode};
use crate::slot::{Slot, SlotKey, SlotState};
use crate::stream::{FileType, MediaStream, StreamSource};

/// The emulated machine, as far as media changes are concerned.
pub trait MachineControl: Send {
    /// Reinitialize the machine before new media is initialized.
    fn reset(&mut self);
}

impl<F: FnMut() + Send> MachineControl for F {
    fn reset(&mut self) {
        self()
    }
}

/// Owner of every media slot of one emulated system.
pub struct MediaManager {
    system: String,
    devices: DeviceTable,
    slots: BTreeMap<SlotKey, Slot>,
    source: Box<dyn StreamSource>,
    metadata: Box<dyn MetadataDatabase>,
    cache: ChecksumCache,
    machine: Option<Box<dyn MachineControl>>,
    floppy: FloppyDrives,
    running: bool,
}

impl MediaManager {
    /// Create a manager with one empty slot per registered (type, instance).
    pub fn new(
        system: impl Into<String>,
        devices: DeviceTable,
        source: impl StreamSource + 'static,
    ) -> Self {
        let slots = devices
            .slots()
            .into_iter()
            .map(|(device, instance)| {
                let key = SlotKey::new(device, instance);
                (key, Slot::new(key))
            })
            .collect();
        Self {
            system: system.into(),
            devices,
            slots,
            source: Box::new(source),
            metadata: Box::new(NoMetadata),
            cache: ChecksumCache::new(),
            machine: None,
            floppy: FloppyDrives::new(),
            running: false,
        }
    }

    pub fn with_metadata(mut self, metadata: impl MetadataDatabase + 'static) -> Self {
        self.metadata = Box::new(metadata);
        self
    }

    pub fn with_cache(mut self, cache: ChecksumCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_machine(mut self, machine: impl MachineControl + 'static) -> Self {
        self.machine = Some(Box::new(machine));
        self
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    /// Whether the emulated machine has started; loads into reset-class
    /// devices reset it only while running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn floppy_drives(&self) -> &FloppyDrives {
        &self.floppy
    }

    pub fn checksum_cache(&self) -> &ChecksumCache {
        &self.cache
    }

    pub fn checksum_cache_mut(&mut self) -> &mut ChecksumCache {
        &mut self.cache
    }

    /// Device type whose descriptor recognizes the extension of `filename`.
    pub fn device_for_file(&self, filename: &str) -> Option<DeviceType> {
        let ext = filename.rsplit_once('.')?.1;
        self.devices.device_for_extension(ext)
    }

    pub fn slot(&self, device: DeviceType, instance: usize) -> MediaResult<&Slot> {
        let key = self.slot_key(device, instance)?;
        self.slots
            .get(&key)
            .ok_or(MediaError::InvalidInstance { device, instance })
    }

    pub fn slot_mut(&mut self, device: DeviceType, instance: usize) -> MediaResult<&mut Slot> {
        let key = self.slot_key(device, instance)?;
        self.slots
            .get_mut(&key)
            .ok_or(MediaError::InvalidInstance { device, instance })
    }

    /// All slots in (type, instance) order.
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    /// The stream of a slot, for devices needing ongoing random access.
    pub fn stream_mut(&mut self, device: DeviceType, instance: usize) -> Option<&mut dyn MediaStream> {
        self.slot_mut(device, instance).ok()?.stream_mut()
    }

    /// Load `name` into a slot. See the module docs for the sequence.
    ///
    /// On error the slot is left empty.
    pub fn load(&mut self, device: DeviceType, instance: usize, name: &str) -> MediaResult<()> {
        let key = self.slot_key(device, instance)?;

        if self.slot(device, instance)?.is_loaded() {
            self.unload(device, instance)?;
        }

        let (intent, depth, caps) = {
            let desc = self
                .devices
                .find(device)
                .ok_or(MediaError::UnknownDevice(device))?;
            (desc.intent(), desc.depth(), desc.caps())
        };

        let slot = self.slot_mut(device, instance)?;
        slot.set_state(SlotState::Loading);
        if !name.is_empty() {
            slot.set_name(name);
        }
        let has_name = slot.exists();

        if self.running && depth >= ResetDepth::Cpu {
            info!("{}: media change resets the machine", key);
            if let Some(machine) = self.machine.as_mut() {
                machine.reset();
            }
        }

        let mut mode = None;
        if intent.opens_stream() && has_name {
            let result = negotiate(intent, name, |attempt| {
                self.open_slot_stream(key, FileType::Image, attempt)
            });
            match result {
                Ok(((), effective)) => {
                    debug!("{}: opened {} as {}", key, name, effective);
                    if let Some(slot) = self.slots.get_mut(&key) {
                        slot.attach_mode(effective);
                    }
                    mode = Some(effective);
                }
                Err(e) => {
                    error!("Unable to open image file {}: {}", name, e);
                    self.clear_slot(key);
                    return Err(e);
                }
            }
        }

        if caps.init {
            let desc = self
                .devices
                .find_mut(device)
                .ok_or(MediaError::UnknownDevice(device))?;
            let slot = self
                .slots
                .get_mut(&key)
                .ok_or(MediaError::InvalidInstance { device, instance })?;
            if let Err(reason) = desc.hooks_mut().init(instance, slot.stream_mut(), mode) {
                warn!("{}: init rejected {}: {}", key, name, reason);
                self.clear_slot(key);
                return Err(MediaError::DeviceInitRejected {
                    device,
                    instance,
                    reason,
                });
            }
        }

        if device.is_floppy_family() {
            self.floppy.insert(instance);
        }

        let slot = self.slot_mut(device, instance)?;
        slot.set_state(SlotState::Loaded);
        info!(
            "{}: loaded {} ({} bytes, crc {:08x})",
            key,
            slot.filename().unwrap_or("<none>"),
            slot.length(),
            slot.crc()
        );
        Ok(())
    }

    /// Unload a slot: exit hook, floppy eject, then release everything the
    /// slot owns. Unloading an empty slot does nothing.
    pub fn unload(&mut self, device: DeviceType, instance: usize) -> MediaResult<()> {
        let key = self.slot_key(device, instance)?;
        let slot = self.slot_mut(device, instance)?;
        if !slot.is_loaded() {
            return Ok(());
        }
        slot.set_state(SlotState::Unloading);

        if let Some(desc) = self.devices.find_mut(device) {
            if desc.caps().exit {
                desc.hooks_mut().exit(instance);
            }
        }

        if device.is_floppy_family() {
            self.floppy.eject(instance);
        }

        self.clear_slot(key);
        info!("{}: unloaded", key);
        Ok(())
    }

    /// Unload every slot; used at session teardown.
    pub fn unload_all(&mut self) -> MediaResult<()> {
        for (device, instance) in self.devices.slots() {
            self.unload(device, instance)?;
        }
        Ok(())
    }

    /// Open the slot's current image on behalf of its device.
    ///
    /// Fails if the slot has no name or already holds a stream. The checksum
    /// and enrichment computed by an earlier open are kept.
    pub fn open_image(
        &mut self,
        device: DeviceType,
        instance: usize,
        filetype: FileType,
        mode: OpenMode,
    ) -> MediaResult<()> {
        let key = self.slot_key(device, instance)?;
        self.open_slot_stream(key, filetype, mode)
    }

    /// Close a slot's stream without unloading it.
    pub fn close_stream(&mut self, device: DeviceType, instance: usize) -> MediaResult<bool> {
        Ok(self.slot_mut(device, instance)?.close_stream())
    }

    /// Allocate a zeroed buffer owned by the slot.
    pub fn slot_alloc(&mut self, device: DeviceType, instance: usize, size: usize) -> MediaResult<ArenaHandle> {
        Ok(self.slot_mut(device, instance)?.arena_mut().alloc(size))
    }

    /// Copy a string into the slot's arena.
    pub fn slot_strdup(&mut self, device: DeviceType, instance: usize, s: &str) -> MediaResult<ArenaHandle> {
        Ok(self.slot_mut(device, instance)?.arena_mut().strdup(s))
    }

    pub fn slot_realloc(
        &mut self,
        device: DeviceType,
        instance: usize,
        handle: ArenaHandle,
        size: usize,
    ) -> MediaResult<Option<ArenaHandle>> {
        Ok(self.slot_mut(device, instance)?.arena_mut().realloc(handle, size))
    }

    pub fn slot_bytes(&self, device: DeviceType, instance: usize, handle: ArenaHandle) -> Option<&[u8]> {
        self.slot(device, instance).ok()?.arena().bytes(handle)
    }

    pub fn slot_bytes_mut(
        &mut self,
        device: DeviceType,
        instance: usize,
        handle: ArenaHandle,
    ) -> Option<&mut [u8]> {
        self.slot_mut(device, instance).ok()?.arena_mut().bytes_mut(handle)
    }

    fn slot_key(&self, device: DeviceType, instance: usize) -> MediaResult<SlotKey> {
        let desc = self
            .devices
            .find(device)
            .ok_or(MediaError::UnknownDevice(device))?;
        if instance >= desc.max_instances() {
            return Err(MediaError::InvalidInstance { device, instance });
        }
        Ok(SlotKey::new(device, instance))
    }

    fn clear_slot(&mut self, key: SlotKey) {
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.clear();
        }
    }

    /// Open, unwrap, identify and enrich; on success the stream is stored on
    /// the slot.
    fn open_slot_stream(&mut self, key: SlotKey, filetype: FileType, mode: OpenMode) -> MediaResult<()> {
        let slot = self.slots.get_mut(&key).ok_or(MediaError::InvalidInstance {
            device: key.device,
            instance: key.instance,
        })?;
        let mut name = slot.filename().ok_or(MediaError::NoImage)?.to_string();
        if slot.has_stream() {
            return Err(MediaError::StreamAlreadyOpen);
        }

        debug!("open: trying {} for system {} as {}", name, self.system, mode);
        let mut stream = open_source(self.source.as_mut(), &self.system, &name, filetype, mode)?;

        // Write-only streams cannot be read back: no archive probe, no checksum.
        let readable = mode != OpenMode::Write;

        if readable {
            if let Some(inner) = probe_inner_name(stream.as_mut(), &name)? {
                drop(stream);
                let composed = compose_inner_path(&name, &inner);
                debug!("open: {} is an archive, reopening {}", name, composed);
                stream = open_source(self.source.as_mut(), &self.system, &composed, filetype, mode)?;
                slot.set_name(&composed);
                name = composed;
            }
        }

        stream.seek(SeekFrom::Start(0))?;
        slot.set_length(stream.size()?);
        debug!("open: found {} for system {}", name, self.system);

        if readable && !slot.is_identified() {
            let mut identifier = Identifier {
                devices: &self.devices,
                source: self.source.as_mut(),
                cache: &mut self.cache,
                system: &self.system,
            };
            let id = identifier.identify(key.device, &name, stream.as_mut())?;
            slot.set_identification(id);

            if id.has_checksum() {
                if let Some(record) = enrich(self.metadata.as_mut(), &self.system, id.crc) {
                    slot.set_enrichment(&record);
                }
            }
        }

        slot.attach_stream(stream, mode);
        Ok(())
    }
}

fn open_source(
    source: &mut dyn StreamSource,
    system: &str,
    name: &str,
    filetype: FileType,
    mode: OpenMode,
) -> MediaResult<Box<dyn MediaStream>> {
    source.open(system, name, filetype, mode).map_err(|e| {
        debug!("open: {} as {} failed: {}", name, mode, e);
        MediaError::OpenFailure {
            name: name.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Capabilities, DeviceDescriptor, DeviceHooks, NoHooks};
    use crate::devices::{CartridgeHooks, INES_HEADER_LEN, INES_MAGIC};
    use crate::floppy::FloppyFlag;
    use crate::metadata::MemoryMetadataDatabase;
    use crate::negotiate::OpenIntent;
    use crate::stream::MemoryStreamSource;
    use std::io::{Cursor, Write};
    use std::sync::{Arc, Mutex};

    type Events = Arc<Mutex<Vec<String>>>;

    /// Hooks that log every call.
    struct Recorder {
        events: Events,
        reject: bool,
        checksum: u32,
    }

    impl Recorder {
        fn new(events: &Events) -> Self {
            Self {
                events: events.clone(),
                reject: false,
                checksum: 0,
            }
        }
    }

    impl DeviceHooks for Recorder {
        fn init(
            &mut self,
            instance: usize,
            stream: Option<&mut dyn MediaStream>,
            _mode: Option<OpenMode>,
        ) -> Result<(), String> {
            let open = if stream.is_some() { "stream" } else { "none" };
            self.events
                .lock()
                .unwrap()
                .push(format!("init {} {}", instance, open));
            if self.reject {
                return Err("bad image".into());
            }
            Ok(())
        }

        fn exit(&mut self, instance: usize) {
            self.events.lock().unwrap().push(format!("exit {}", instance));
        }

        fn partial_checksum(&self, _data: &[u8]) -> u32 {
            self.checksum
        }
    }

    fn events() -> Events {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn logged(events: &Events) -> Vec<String> {
        events.lock().unwrap().clone()
    }

    fn floppy(events: &Events) -> DeviceDescriptor {
        DeviceDescriptor::new(DeviceType::Floppy, Recorder::new(events))
            .instances(2)
            .extensions(&["dsk"])
            .open_intent(OpenIntent::ReadWriteOrRead)
    }

    fn manager_with(source: &MemoryStreamSource, descriptors: Vec<DeviceDescriptor>) -> MediaManager {
        let mut devices = DeviceTable::new();
        for descriptor in descriptors {
            devices.register(descriptor).unwrap();
        }
        MediaManager::new("testsys", devices, source.clone())
    }

    fn single_entry_zip(name: &str, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.start_file::<_, ()>(name, Default::default()).unwrap();
            zip.write_all(data).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    fn read_stream(mgr: &mut MediaManager, device: DeviceType, instance: usize) -> Vec<u8> {
        let stream = mgr.stream_mut(device, instance).unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_load_populates_slot() {
        let ev = events();
        let source = MemoryStreamSource::with_files([("disks/a.dsk", b"disk data".to_vec())]);
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);

        mgr.load(DeviceType::Floppy, 1, "disks/a.dsk").unwrap();

        let slot = mgr.slot(DeviceType::Floppy, 1).unwrap();
        assert_eq!(slot.state(), SlotState::Loaded);
        assert_eq!(slot.filename(), Some("disks/a.dsk"));
        assert_eq!(slot.basename(), Some("a.dsk"));
        assert_eq!(slot.directory(), Some("disks"));
        assert_eq!(slot.extension(), Some("dsk"));
        assert_eq!(slot.length(), 9);
        assert_eq!(slot.crc(), crc32fast::hash(b"disk data"));
        assert_eq!(slot.open_mode(), Some(OpenMode::ReadWrite));
        assert!(slot.has_stream());
        assert_eq!(logged(&ev), vec!["init 1 stream"]);
        assert_eq!(read_stream(&mut mgr, DeviceType::Floppy, 1), b"disk data");
    }

    #[test]
    fn test_unload_clears_everything() {
        let ev = events();
        let source = MemoryStreamSource::with_files([("a.dsk", b"disk".to_vec())]);
        let mut mgr = manager_with(&source, vec![floppy(&ev)]).with_metadata({
            let mut db = MemoryMetadataDatabase::new();
            db.add_line("testsys", &format!("{:08x}=Disk|Acme|1984|Yes|", crc32fast::hash(b"disk")));
            db
        });

        mgr.load(DeviceType::Floppy, 0, "a.dsk").unwrap();
        let buffer = mgr.slot_alloc(DeviceType::Floppy, 0, 64).unwrap();
        assert!(mgr.slot_bytes(DeviceType::Floppy, 0, buffer).is_some());
        assert_eq!(mgr.slot(DeviceType::Floppy, 0).unwrap().longname(), Some("Disk"));

        mgr.unload(DeviceType::Floppy, 0).unwrap();

        let slot = mgr.slot(DeviceType::Floppy, 0).unwrap();
        assert_eq!(slot.state(), SlotState::Empty);
        assert!(!slot.has_stream());
        assert!(!slot.exists());
        assert!(slot.arena().is_empty());
        assert_eq!(slot.longname(), None);
        assert_eq!(slot.crc(), 0);
        assert_eq!(slot.length(), 0);
        assert!(mgr.slot_bytes(DeviceType::Floppy, 0, buffer).is_none());
        assert_eq!(logged(&ev), vec!["init 0 stream", "exit 0"]);
    }

    #[test]
    fn test_unload_empty_slot_is_noop() {
        let ev = events();
        let source = MemoryStreamSource::new();
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);

        mgr.unload(DeviceType::Floppy, 0).unwrap();
        mgr.unload_all().unwrap();

        assert!(logged(&ev).is_empty());
        assert_eq!(mgr.slot(DeviceType::Floppy, 0).unwrap().state(), SlotState::Empty);
    }

    #[test]
    fn test_reload_calls_exit_first() {
        let ev = events();
        let source = MemoryStreamSource::with_files([
            ("a.dsk", b"first".to_vec()),
            ("b.dsk", b"second".to_vec()),
        ]);
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);

        mgr.load(DeviceType::Floppy, 0, "a.dsk").unwrap();
        mgr.load(DeviceType::Floppy, 0, "b.dsk").unwrap();

        assert_eq!(logged(&ev), vec!["init 0 stream", "exit 0", "init 0 stream"]);
        assert_eq!(mgr.slot(DeviceType::Floppy, 0).unwrap().filename(), Some("b.dsk"));
        assert_eq!(read_stream(&mut mgr, DeviceType::Floppy, 0), b"second");
    }

    #[test]
    fn test_floppy_flags_follow_media() {
        let ev = events();
        let source = MemoryStreamSource::with_files([("a.dsk", b"disk".to_vec())]);
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);

        mgr.load(DeviceType::Floppy, 1, "a.dsk").unwrap();
        assert!(mgr.floppy_drives().flag_state(1, FloppyFlag::DiskInserted));
        assert!(mgr.floppy_drives().flag_state(1, FloppyFlag::Connected));
        assert!(!mgr.floppy_drives().flag_state(0, FloppyFlag::DiskInserted));

        mgr.unload(DeviceType::Floppy, 1).unwrap();
        assert!(!mgr.floppy_drives().flag_state(1, FloppyFlag::DiskInserted));
        assert!(!mgr.floppy_drives().flag_state(1, FloppyFlag::Connected));
    }

    #[test]
    fn test_reset_precedes_init() {
        let ev = events();
        let source = MemoryStreamSource::with_files([("game.rom", b"rom".to_vec())]);
        let machine_ev = ev.clone();
        let mut mgr = manager_with(
            &source,
            vec![DeviceDescriptor::new(DeviceType::Cartridge, Recorder::new(&ev))
                .open_intent(OpenIntent::Read)
                .reset_depth(ResetDepth::Cpu)],
        )
        .with_machine(move || machine_ev.lock().unwrap().push("reset".to_string()));

        mgr.load(DeviceType::Cartridge, 0, "game.rom").unwrap();
        assert_eq!(logged(&ev), vec!["init 0 stream"]);

        mgr.set_running(true);
        mgr.load(DeviceType::Cartridge, 0, "game.rom").unwrap();
        assert_eq!(
            logged(&ev),
            vec!["init 0 stream", "exit 0", "reset", "init 0 stream"]
        );
    }

    #[test]
    fn test_failed_open_still_resets() {
        let ev = events();
        let source = MemoryStreamSource::new();
        let machine_ev = ev.clone();
        let mut mgr = manager_with(
            &source,
            vec![DeviceDescriptor::new(DeviceType::Snapshot, Recorder::new(&ev))
                .open_intent(OpenIntent::Read)
                .reset_depth(ResetDepth::Machine)],
        )
        .with_machine(move || machine_ev.lock().unwrap().push("reset".to_string()));
        mgr.set_running(true);

        let err = mgr.load(DeviceType::Snapshot, 0, "missing.sna").unwrap_err();
        assert!(matches!(err, MediaError::OpenFailure { .. }));
        assert_eq!(logged(&ev), vec!["reset"]);

        let slot = mgr.slot(DeviceType::Snapshot, 0).unwrap();
        assert_eq!(slot.state(), SlotState::Empty);
        assert!(!slot.exists());
    }

    #[test]
    fn test_zip_image_is_unwrapped() {
        let ev = events();
        let source = MemoryStreamSource::with_files([(
            "game.dsk",
            single_entry_zip("GAME.BIN", b"inner bytes"),
        )]);
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);

        mgr.load(DeviceType::Floppy, 0, "game.dsk").unwrap();

        let slot = mgr.slot(DeviceType::Floppy, 0).unwrap();
        let name = slot.filename().unwrap();
        assert!(name.ends_with("GAME.BIN"), "{}", name);
        assert_eq!(slot.basename(), Some("GAME.BIN"));
        assert_eq!(slot.length(), 11);
        assert_eq!(slot.crc(), crc32fast::hash(b"inner bytes"));
        // Archive entries cannot be written, so read/write fell back to read.
        assert_eq!(slot.open_mode(), Some(OpenMode::Read));
        assert_eq!(read_stream(&mut mgr, DeviceType::Floppy, 0), b"inner bytes");
    }

    #[test]
    fn test_truncated_archive_is_malformed() {
        let ev = events();
        let source = MemoryStreamSource::with_files([("bad.dsk", b"PK\x03\x04truncated".to_vec())]);
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);

        let err = mgr.load(DeviceType::Floppy, 0, "bad.dsk").unwrap_err();
        assert!(matches!(err, MediaError::MalformedArchive { .. }));
        // No fallback to read-only after a malformed header.
        assert_eq!(source.attempts().len(), 1);
        assert!(logged(&ev).is_empty());
        assert_eq!(mgr.slot(DeviceType::Floppy, 0).unwrap().state(), SlotState::Empty);
    }

    #[test]
    fn test_partial_checksum_overrides_whole_file() {
        let payload = b"PRG and CHR banks";
        let mut image = INES_MAGIC.to_vec();
        image.resize(INES_HEADER_LEN, 0);
        image.extend_from_slice(payload);
        let source = MemoryStreamSource::with_files([("game.nes", image.clone())]);
        let mut mgr = manager_with(
            &source,
            vec![DeviceDescriptor::new(DeviceType::Cartridge, CartridgeHooks)
                .open_intent(OpenIntent::Read)
                .capabilities(Capabilities::ALL)],
        );

        mgr.load(DeviceType::Cartridge, 0, "game.nes").unwrap();

        let slot = mgr.slot(DeviceType::Cartridge, 0).unwrap();
        assert_eq!(slot.crc(), crc32fast::hash(payload));
        assert_ne!(slot.crc(), crc32fast::hash(&image));
        assert_eq!(slot.length(), image.len() as u64);
    }

    #[test]
    fn test_checksum_stable_across_sessions() {
        let crc_of = |name: &str| {
            let ev = events();
            let source = MemoryStreamSource::with_files([(name, b"same content".to_vec())]);
            let mut mgr = manager_with(&source, vec![floppy(&ev)]);
            mgr.load(DeviceType::Floppy, 0, name).unwrap();
            mgr.slot(DeviceType::Floppy, 0).unwrap().crc()
        };
        assert_eq!(crc_of("one.dsk"), crc_of("two.dsk"));
        assert_ne!(crc_of("one.dsk"), 0);
    }

    #[test]
    fn test_metadata_enrichment() {
        let ev = events();
        let source = MemoryStreamSource::with_files([("game.rom", b"rom".to_vec())]);
        let mut db = MemoryMetadataDatabase::new();
        db.add_line("testsys", "1234ABCD=Some Game|Acme|1985|Yes|Bonus text");
        let mut mgr = manager_with(
            &source,
            vec![DeviceDescriptor::new(
                DeviceType::Cartridge,
                Recorder {
                    checksum: 0x1234_abcd,
                    ..Recorder::new(&ev)
                },
            )
            .open_intent(OpenIntent::Read)
            .capabilities(Capabilities::ALL)],
        )
        .with_metadata(db);

        mgr.load(DeviceType::Cartridge, 0, "game.rom").unwrap();

        let slot = mgr.slot(DeviceType::Cartridge, 0).unwrap();
        assert_eq!(slot.crc(), 0x1234_abcd);
        assert_eq!(slot.longname(), Some("Some Game"));
        assert_eq!(slot.manufacturer(), Some("Acme"));
        assert_eq!(slot.year(), Some("1985"));
        assert_eq!(slot.playable(), Some("Yes"));
        assert_eq!(slot.extrainfo(), Some("Bonus text"));
    }

    #[test]
    fn test_unmatched_checksum_leaves_fields_empty() {
        let ev = events();
        let source = MemoryStreamSource::with_files([("a.dsk", b"unknown".to_vec())]);
        let mut db = MemoryMetadataDatabase::new();
        db.add_line("testsys", "1234ABCD=Some Game|Acme|1985|Yes|Bonus text");
        let mut mgr = manager_with(&source, vec![floppy(&ev)]).with_metadata(db);

        mgr.load(DeviceType::Floppy, 0, "a.dsk").unwrap();

        let slot = mgr.slot(DeviceType::Floppy, 0).unwrap();
        assert!(slot.is_loaded());
        assert_ne!(slot.crc(), 0);
        assert_eq!(slot.longname(), None);
        assert_eq!(slot.manufacturer(), None);
        assert_eq!(slot.extrainfo(), None);
    }

    #[test]
    fn test_init_rejection_leaves_slot_empty() {
        let ev = events();
        let source = MemoryStreamSource::with_files([("a.dsk", b"disk".to_vec())]);
        let mut mgr = manager_with(
            &source,
            vec![DeviceDescriptor::new(
                DeviceType::Floppy,
                Recorder {
                    reject: true,
                    ..Recorder::new(&ev)
                },
            )
            .open_intent(OpenIntent::Read)],
        );

        let err = mgr.load(DeviceType::Floppy, 0, "a.dsk").unwrap_err();
        assert!(matches!(
            err,
            MediaError::DeviceInitRejected { device: DeviceType::Floppy, instance: 0, .. }
        ));

        let slot = mgr.slot(DeviceType::Floppy, 0).unwrap();
        assert_eq!(slot.state(), SlotState::Empty);
        assert!(!slot.has_stream());
        assert!(slot.arena().is_empty());
        assert!(!mgr.floppy_drives().flag_state(0, FloppyFlag::DiskInserted));
    }

    #[test]
    fn test_read_only_image_falls_back_to_read() {
        let ev = events();
        let source = MemoryStreamSource::new();
        source.add_read_only("a.dsk", b"locked".to_vec());
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);

        mgr.load(DeviceType::Floppy, 0, "a.dsk").unwrap();

        let modes: Vec<(OpenMode, bool)> = source
            .attempts()
            .into_iter()
            .map(|a| (a.mode, a.succeeded))
            .collect();
        assert_eq!(modes, vec![(OpenMode::ReadWrite, false), (OpenMode::Read, true)]);
        assert_eq!(
            mgr.slot(DeviceType::Floppy, 0).unwrap().open_mode(),
            Some(OpenMode::Read)
        );
    }

    #[test]
    fn test_read_or_write_creates_missing_tape() {
        let ev = events();
        let source = MemoryStreamSource::new();
        let mut mgr = manager_with(
            &source,
            vec![DeviceDescriptor::new(DeviceType::Cassette, Recorder::new(&ev))
                .open_intent(OpenIntent::ReadOrWrite)],
        );

        mgr.load(DeviceType::Cassette, 0, "new.cas").unwrap();

        let modes: Vec<OpenMode> = source.attempts().into_iter().map(|a| a.mode).collect();
        assert_eq!(modes, vec![OpenMode::Read, OpenMode::ReadWriteCreate]);
        let slot = mgr.slot(DeviceType::Cassette, 0).unwrap();
        assert_eq!(slot.open_mode(), Some(OpenMode::Write));
        assert_eq!(slot.length(), 0);
        assert_eq!(slot.crc(), 0);
        assert!(source.exists("new.cas"));
    }

    #[test]
    fn test_written_media_reaches_source_on_unload() {
        let source = MemoryStreamSource::new();
        let mut mgr = manager_with(
            &source,
            vec![DeviceDescriptor::new(DeviceType::Printer, NoHooks)
                .open_intent(OpenIntent::Write)
                .capabilities(Capabilities::NONE)],
        );

        mgr.load(DeviceType::Printer, 0, "out.prn").unwrap();
        let slot = mgr.slot(DeviceType::Printer, 0).unwrap();
        assert_eq!(slot.open_mode(), Some(OpenMode::Write));
        assert_eq!(slot.crc(), 0);
        assert_eq!(source.attempts().len(), 1);

        mgr.stream_mut(DeviceType::Printer, 0)
            .unwrap()
            .write_all(b"HELLO\r\n")
            .unwrap();
        mgr.unload(DeviceType::Printer, 0).unwrap();

        assert_eq!(source.file("out.prn").unwrap(), b"HELLO\r\n");
    }

    #[test]
    fn test_nameless_load_skips_stream() {
        let ev = events();
        let source = MemoryStreamSource::new();
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);

        mgr.load(DeviceType::Floppy, 0, "").unwrap();

        let slot = mgr.slot(DeviceType::Floppy, 0).unwrap();
        assert!(slot.is_loaded());
        assert!(!slot.exists());
        assert!(!slot.has_stream());
        assert!(source.attempts().is_empty());
        assert_eq!(logged(&ev), vec!["init 0 none"]);
    }

    #[test]
    fn test_open_image_and_close_stream() {
        let ev = events();
        let source = MemoryStreamSource::with_files([("a.dsk", b"disk".to_vec())]);
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);

        let err = mgr
            .open_image(DeviceType::Floppy, 0, FileType::Image, OpenMode::Read)
            .unwrap_err();
        assert!(matches!(err, MediaError::NoImage));

        mgr.load(DeviceType::Floppy, 0, "a.dsk").unwrap();
        let err = mgr
            .open_image(DeviceType::Floppy, 0, FileType::Image, OpenMode::Read)
            .unwrap_err();
        assert!(matches!(err, MediaError::StreamAlreadyOpen));

        assert!(mgr.close_stream(DeviceType::Floppy, 0).unwrap());
        assert!(!mgr.close_stream(DeviceType::Floppy, 0).unwrap());
        let crc = mgr.slot(DeviceType::Floppy, 0).unwrap().crc();

        mgr.open_image(DeviceType::Floppy, 0, FileType::Image, OpenMode::Read)
            .unwrap();
        let slot = mgr.slot(DeviceType::Floppy, 0).unwrap();
        assert_eq!(slot.open_mode(), Some(OpenMode::Read));
        assert_eq!(slot.crc(), crc);
    }

    #[test]
    fn test_bad_slot_addresses() {
        let ev = events();
        let source = MemoryStreamSource::new();
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);

        assert!(matches!(
            mgr.load(DeviceType::Floppy, 2, "a.dsk"),
            Err(MediaError::InvalidInstance { instance: 2, .. })
        ));
        assert!(matches!(
            mgr.load(DeviceType::Cassette, 0, "a.cas"),
            Err(MediaError::UnknownDevice(DeviceType::Cassette))
        ));
    }

    #[test]
    fn test_slot_arena_helpers() {
        let ev = events();
        let source = MemoryStreamSource::with_files([("a.dsk", b"disk".to_vec())]);
        let mut mgr = manager_with(&source, vec![floppy(&ev)]);
        mgr.load(DeviceType::Floppy, 0, "a.dsk").unwrap();

        let buf = mgr.slot_alloc(DeviceType::Floppy, 0, 4).unwrap();
        mgr.slot_bytes_mut(DeviceType::Floppy, 0, buf)
            .unwrap()
            .copy_from_slice(b"abcd");
        let grown = mgr
            .slot_realloc(DeviceType::Floppy, 0, buf, 6)
            .unwrap()
            .unwrap();
        assert_eq!(
            mgr.slot_bytes(DeviceType::Floppy, 0, grown).unwrap(),
            b"abcd\0\0"
        );

        let label = mgr.slot_strdup(DeviceType::Floppy, 0, "side A").unwrap();
        assert_eq!(
            mgr.slot(DeviceType::Floppy, 0).unwrap().arena().str(label),
            Some("side A")
        );
    }

    #[test]
    fn test_device_for_file() {
        let ev = events();
        let source = MemoryStreamSource::new();
        let mgr = manager_with(&source, vec![floppy(&ev)]);
        assert_eq!(mgr.device_for_file("games/a.DSK"), Some(DeviceType::Floppy));
        assert_eq!(mgr.device_for_file("a.wav"), None);
        assert_eq!(mgr.device_for_file("noext"), None);
    }
}
