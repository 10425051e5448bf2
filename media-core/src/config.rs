//! Session configuration.
//!
//! A session file is JSON describing one emulated system and the media
//! mounted in it:
//!
//! ```json
//! {
//!   "system": "coco3",
//!   "mediaDir": "media",
//!   "metadataDir": "hash",
//!   "checksumCache": "crc-cache.json",
//!   "running": true,
//!   "mounts": [{ "device": "floppy", "instance": 0, "file": "game.dsk" }]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::device::DeviceType;
use crate::error::{MediaError, MediaResult};
use crate::manager::MediaManager;

/// One image to load into one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub device: DeviceType,
    #[serde(default)]
    pub instance: usize,
    pub file: String,
}

impl FromStr for Mount {
    type Err = MediaError;

    /// Parse `device:instance=file` or `device=file` (instance 0).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MediaError::InvalidMount(s.to_string());

        let (slot, file) = s.split_once('=').ok_or_else(invalid)?;
        if file.is_empty() {
            return Err(invalid());
        }
        let (device, instance) = match slot.split_once(':') {
            Some((device, instance)) => {
                let instance = instance.parse::<usize>().map_err(|_| invalid())?;
                (device, instance)
            }
            None => (slot, 0),
        };

        Ok(Mount {
            device: device.parse()?,
            instance,
            file: file.to_string(),
        })
    }
}

/// Session file schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub media_dir: Option<PathBuf>,
    #[serde(default)]
    pub metadata_dir: Option<PathBuf>,
    #[serde(default)]
    pub checksum_cache: Option<PathBuf>,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub mounts: Vec<Mount>,
}

impl SessionConfig {
    pub fn from_json(text: &str) -> MediaResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> MediaResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Load every mount in order, stopping at the first failure.
    pub fn apply(&self, manager: &mut MediaManager) -> MediaResult<()> {
        manager.set_running(self.running);
        for mount in &self.mounts {
            manager.load(mount.device, mount.instance, &mount.file)?;
        }
        Ok(())
    }
}
