//! Shared media manager for multi-threaded hosts.
//!
//! `SharedMedia` provides:
//! - One manager shared by every thread that inserts or ejects media
//! - Mutual exclusion of `load`/`unload`, so a slot never sees two
//!   lifecycle operations interleave
//! - Cheap cloning (just clones the Arc)

use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::DeviceType;
use crate::error::{MediaError, MediaResult};
use crate::manager::MediaManager;
use crate::slot::Slot;

/// Summary of a slot, detached from the manager lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotInfo {
    pub filename: Option<String>,
    pub length: u64,
    pub crc: u32,
    pub longname: Option<String>,
    pub loaded: bool,
}

impl From<&Slot> for SlotInfo {
    fn from(slot: &Slot) -> Self {
        Self {
            filename: slot.filename().map(str::to_string),
            length: slot.length(),
            crc: slot.crc(),
            longname: slot.longname().map(str::to_string),
            loaded: slot.is_loaded(),
        }
    }
}

/// Thread-safe handle to a [`MediaManager`].
#[derive(Clone)]
pub struct SharedMedia {
    inner: Arc<Mutex<MediaManager>>,
}

impl SharedMedia {
    pub fn new(manager: MediaManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    pub fn load(&self, device: DeviceType, instance: usize, name: &str) -> MediaResult<()> {
        self.lock()?.load(device, instance, name)
    }

    pub fn unload(&self, device: DeviceType, instance: usize) -> MediaResult<()> {
        self.lock()?.unload(device, instance)
    }

    pub fn unload_all(&self) -> MediaResult<()> {
        self.lock()?.unload_all()
    }

    /// Snapshot of a slot.
    pub fn slot_info(&self, device: DeviceType, instance: usize) -> MediaResult<SlotInfo> {
        let manager = self.lock()?;
        Ok(SlotInfo::from(manager.slot(device, instance)?))
    }

    /// Run `f` with exclusive access to the manager.
    pub fn with<R>(&self, f: impl FnOnce(&mut MediaManager) -> R) -> MediaResult<R> {
        let mut manager = self.lock()?;
        Ok(f(&mut manager))
    }

    fn lock(&self) -> MediaResult<MutexGuard<'_, MediaManager>> {
        self.inner.lock().map_err(|_| MediaError::LockPoisoned)
    }
}
