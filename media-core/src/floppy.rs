//! Externally visible floppy drive status.

use crate::device::MAX_DEV_INSTANCES;

/// Drive status flags shared by every floppy-like device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloppyFlag {
    DiskInserted,
    Connected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveStatus {
    pub disk_inserted: bool,
    pub connected: bool,
}

/// Status of every floppy drive, indexed by instance.
#[derive(Debug, Clone, Default)]
pub struct FloppyDrives {
    drives: [DriveStatus; MAX_DEV_INSTANCES],
}

impl FloppyDrives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flag_state(&mut self, drive: usize, flag: FloppyFlag, state: bool) {
        let Some(status) = self.drives.get_mut(drive) else {
            return;
        };
        match flag {
            FloppyFlag::DiskInserted => status.disk_inserted = state,
            FloppyFlag::Connected => status.connected = state,
        }
    }

    pub fn flag_state(&self, drive: usize, flag: FloppyFlag) -> bool {
        self.drives.get(drive).is_some_and(|status| match flag {
            FloppyFlag::DiskInserted => status.disk_inserted,
            FloppyFlag::Connected => status.connected,
        })
    }

    pub fn status(&self, drive: usize) -> DriveStatus {
        self.drives.get(drive).copied().unwrap_or_default()
    }

    /// Disk inserted and drive connected.
    pub(crate) fn insert(&mut self, drive: usize) {
        log::debug!("floppy: drive {} disk inserted, connected", drive);
        self.set_flag_state(drive, FloppyFlag::DiskInserted, true);
        self.set_flag_state(drive, FloppyFlag::Connected, true);
    }

    /// Disk removed and drive disconnected.
    pub(crate) fn eject(&mut self, drive: usize) {
        log::debug!("floppy: drive {} disk removed, disconnected", drive);
        self.set_flag_state(drive, FloppyFlag::DiskInserted, false);
        self.set_flag_state(drive, FloppyFlag::Connected, false);
    }
}
