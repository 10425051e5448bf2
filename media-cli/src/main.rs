//! Media CLI - Mount emulator media images and report what was found.
//!
//! Usage:
//!   media [options] [mounts...]
//!
//! Examples:
//!   media --system coco3 floppy:0=game.dsk         # Mount a disk in drive 0
//!   media --system nes rom.nes                      # Device picked by extension
//!   media --config session.json cassette:0=new.cas  # Session file plus extra mounts
//!   media --metadata-dir hash --cache crc.json game.dsk

use std::path::PathBuf;

use clap::Parser;
use flexi_logger::Logger;
use log::{error, info};

use media_core::{
    builtin_devices, ChecksumCache, HostStreamSource, IniMetadataDatabase, MediaError,
    MediaManager, Mount, SessionConfig, Slot,
};

/// Removable media manager CLI
#[derive(Parser, Debug)]
#[command(name = "media")]
#[command(about = "Mount emulator media images and report slot state")]
struct Args {
    /// Mounts as `device:instance=file`, `device=file` or a bare file whose
    /// extension picks the device
    mounts: Vec<String>,

    /// Session file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emulated system name
    #[arg(short, long)]
    system: Option<String>,

    /// Directory images are looked up in
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Directory holding `<system>.crc` metadata files
    #[arg(long)]
    metadata_dir: Option<PathBuf>,

    /// Checksum cache file (JSON)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Treat the machine as running, so cartridge and snapshot loads reset it
    #[arg(long)]
    running: bool,

    /// Log level or flexi_logger spec string
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let _logger = Logger::try_with_str(&args.log_level)?
        .log_to_stderr()
        .start()?;

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(system) = &args.system {
        config.system = system.clone();
    }
    if config.system.is_empty() {
        config.system = "generic".to_string();
    }
    if args.media_dir.is_some() {
        config.media_dir = args.media_dir.clone();
    }
    if args.metadata_dir.is_some() {
        config.metadata_dir = args.metadata_dir.clone();
    }
    if args.cache.is_some() {
        config.checksum_cache = args.cache.clone();
    }
    config.running |= args.running;

    let cache = match &config.checksum_cache {
        Some(path) => ChecksumCache::load(path)?,
        None => ChecksumCache::new(),
    };
    let media_dir = config.media_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut manager = MediaManager::new(
        config.system.clone(),
        builtin_devices()?,
        HostStreamSource::new(media_dir),
    )
    .with_cache(cache)
    .with_machine(|| info!("machine reset"));
    if let Some(dir) = &config.metadata_dir {
        manager = manager.with_metadata(IniMetadataDatabase::new(dir));
    }

    for arg in &args.mounts {
        config.mounts.push(parse_mount(&manager, arg)?);
    }

    manager.set_running(config.running);
    let mut failures = 0;
    for mount in &config.mounts {
        if let Err(e) = manager.load(mount.device, mount.instance, &mount.file) {
            error!("{}:{}={}: {}", mount.device, mount.instance, mount.file, e);
            failures += 1;
        }
    }

    for slot in manager.slots().filter(|slot| slot.is_loaded()) {
        println!("{}", describe(slot));
    }

    manager.unload_all()?;
    if let Some(path) = &config.checksum_cache {
        manager.checksum_cache_mut().save(path)?;
    }

    if failures > 0 {
        return Err(format!("{} of {} mounts failed", failures, config.mounts.len()).into());
    }
    Ok(())
}

/// A bare filename is mounted in instance 0 of the device claiming its
/// extension.
fn parse_mount(manager: &MediaManager, arg: &str) -> Result<Mount, MediaError> {
    if arg.contains('=') {
        return arg.parse();
    }
    let device = manager
        .device_for_file(arg)
        .ok_or_else(|| MediaError::InvalidMount(arg.to_string()))?;
    Ok(Mount {
        device,
        instance: 0,
        file: arg.to_string(),
    })
}

fn describe(slot: &Slot) -> String {
    let mut line = format!(
        "{:<14} {}  {} bytes  crc {:08x}",
        slot.key().to_string(),
        slot.filename().unwrap_or("-"),
        slot.length(),
        slot.crc()
    );
    if let Some(mode) = slot.open_mode() {
        line.push_str(&format!("  [{}]", mode));
    }
    if let Some(longname) = slot.longname() {
        line.push_str(&format!("  {}", longname));
        let details: Vec<&str> = [slot.manufacturer(), slot.year()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if !details.is_empty() {
            line.push_str(&format!(" ({})", details.join(", ")));
        }
    }
    line
}
