//! Removable Media Manager Core
//!
//! This crate manages the media slots of an emulated machine:
//! - Slot lifecycle (load, unload, unload all) with per-slot arenas
//! - Open-mode negotiation and transparent ZIP unwrapping
//! - Content identification by CRC-32 and metadata enrichment
//!
//! # Architecture
//!
//! The manager talks to the outside world through a few traits:
//! - `StreamSource`: opens media byte streams by name and mode
//! - `MetadataDatabase`: looks up descriptive records by checksum
//! - `DeviceHooks`: per-device-type init, exit and partial checksum
//! - `MachineControl`: resets the emulated machine on media change
//!
//! `MediaManager` drives them; `SharedMedia` shares one manager across
//! threads.

pub mod archive;
pub mod arena;
pub mod checksum_cache;
pub mod config;
pub mod device;
pub mod devices;
pub mod error;
pub mod floppy;
pub mod identify;
pub mod manager;
pub mod metadata;
pub mod negotiate;
pub mod shared;
pub mod slot;
pub mod stream;

pub use arena::{ArenaHandle, SlotArena};
pub use checksum_cache::{CachedChecksum, ChecksumCache};
pub use config::{Mount, SessionConfig};
pub use device::{
    Capabilities, DeviceDescriptor, DeviceHooks, DeviceTable, DeviceType, NoHooks, ResetDepth,
    MAX_DEV_INSTANCES,
};
pub use devices::builtin_devices;
pub use error::{MediaError, MediaResult};
pub use floppy::{DriveStatus, FloppyDrives, FloppyFlag};
pub use identify::Identification;
pub use manager::{MachineControl, MediaManager};
pub use metadata::{
    IniMetadataDatabase, MemoryMetadataDatabase, MetadataDatabase, MetadataHandle, MetadataRecord,
    NoMetadata,
};
pub use negotiate::{OpenIntent, OpenMode};
pub use shared::{SharedMedia, SlotInfo};
pub use slot::{Slot, SlotKey, SlotState};
pub use stream::{FileType, HostStreamSource, MediaStream, MemoryStreamSource, StreamSource};
