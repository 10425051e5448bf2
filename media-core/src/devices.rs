//! Built-in device descriptors.
//!
//! A generic machine with one descriptor per common media kind. Emulated
//! systems with their own drivers build a [`DeviceTable`] directly instead.

use log::debug;

use crate::device::{Capabilities, DeviceDescriptor, DeviceHooks, DeviceTable, DeviceType, ResetDepth};
use crate::error::MediaResult;
use crate::negotiate::{OpenIntent, OpenMode};
use crate::stream::MediaStream;

/// iNES header magic.
pub const INES_MAGIC: &[u8; 4] = b"NES\x1a";
/// Size of the iNES header excluded from the partial checksum.
pub const INES_HEADER_LEN: usize = 16;

/// Floppy drives refuse read-only images with nothing on them.
#[derive(Debug, Default)]
pub struct FloppyHooks;

impl DeviceHooks for FloppyHooks {
    fn init(
        &mut self,
        instance: usize,
        stream: Option<&mut dyn MediaStream>,
        mode: Option<OpenMode>,
    ) -> Result<(), String> {
        let Some(stream) = stream else {
            return Ok(());
        };
        let size = stream.size().map_err(|e| e.to_string())?;
        if size == 0 && mode == Some(OpenMode::Read) {
            return Err("empty read-only disk image".into());
        }
        debug!("floppy {}: {} byte image", instance, size);
        Ok(())
    }
}

/// Cartridges are identified by their PRG/CHR data, not the iNES header.
#[derive(Debug, Default)]
pub struct CartridgeHooks;

impl DeviceHooks for CartridgeHooks {
    fn init(
        &mut self,
        _instance: usize,
        stream: Option<&mut dyn MediaStream>,
        _mode: Option<OpenMode>,
    ) -> Result<(), String> {
        if let Some(stream) = stream {
            if stream.size().map_err(|e| e.to_string())? == 0 {
                return Err("cartridge image is empty".into());
            }
        }
        Ok(())
    }

    fn partial_checksum(&self, data: &[u8]) -> u32 {
        ines_checksum(data)
    }
}

/// CRC-32 of an iNES image without its header; zero for anything else.
pub fn ines_checksum(data: &[u8]) -> u32 {
    if data.len() <= INES_HEADER_LEN || !data.starts_with(INES_MAGIC) {
        return 0;
    }
    crc32fast::hash(&data[INES_HEADER_LEN..])
}

/// Drivers with no per-image state.
#[derive(Debug, Default)]
pub struct PassiveHooks;

impl DeviceHooks for PassiveHooks {}

/// Table of the generic machine: two floppy drives, a cassette deck, a
/// cartridge port, snapshots, a printer and a punch tape reader.
pub fn builtin_devices() -> MediaResult<DeviceTable> {
    DeviceTable::new()
        .with(
            DeviceDescriptor::new(DeviceType::Floppy, FloppyHooks)
                .instances(2)
                .extensions(&["dsk", "img"])
                .open_intent(OpenIntent::ReadWriteOrRead),
        )?
        .with(
            DeviceDescriptor::new(DeviceType::Cassette, PassiveHooks)
                .extensions(&["cas", "wav"])
                .open_intent(OpenIntent::ReadOrWrite),
        )?
        .with(
            DeviceDescriptor::new(DeviceType::Cartridge, CartridgeHooks)
                .extensions(&["rom", "bin", "nes"])
                .open_intent(OpenIntent::Read)
                .reset_depth(ResetDepth::Cpu)
                .capabilities(Capabilities::ALL),
        )?
        .with(
            DeviceDescriptor::new(DeviceType::Snapshot, PassiveHooks)
                .extensions(&["sna", "z80"])
                .open_intent(OpenIntent::Read)
                .reset_depth(ResetDepth::Machine),
        )?
        .with(
            DeviceDescriptor::new(DeviceType::Printer, PassiveHooks)
                .extensions(&["prn"])
                .open_intent(OpenIntent::Write)
                .capabilities(Capabilities::NONE),
        )?
        .with(
            DeviceDescriptor::new(DeviceType::PunchTape, PassiveHooks)
                .extensions(&["tap", "ptp"])
                .open_intent(OpenIntent::ReadWriteCreateOrRead),
        )
}
