//! Device capability table.
//!
//! Each kind of removable media a machine supports is described once by a
//! [`DeviceDescriptor`]: how many drives of that kind exist, which file
//! extensions it recognizes, how it wants its stream opened, how much of the
//! machine must reset when media changes, and the hooks the lifecycle calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};
use crate::negotiate::{OpenIntent, OpenMode};
use crate::stream::MediaStream;

/// Upper bound on instances of one device type.
pub const MAX_DEV_INSTANCES: usize = 16;

/// Closed set of removable-media device kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    Floppy,
    Cassette,
    Cartridge,
    Snapshot,
    Printer,
    PunchTape,
    Quickload,
    HardDisk,
    Serial,
}

impl DeviceType {
    pub const ALL: [DeviceType; 9] = [
        DeviceType::Floppy,
        DeviceType::Cassette,
        DeviceType::Cartridge,
        DeviceType::Snapshot,
        DeviceType::Printer,
        DeviceType::PunchTape,
        DeviceType::Quickload,
        DeviceType::HardDisk,
        DeviceType::Serial,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DeviceType::Floppy => "floppy",
            DeviceType::Cassette => "cassette",
            DeviceType::Cartridge => "cartridge",
            DeviceType::Snapshot => "snapshot",
            DeviceType::Printer => "printer",
            DeviceType::PunchTape => "punch-tape",
            DeviceType::Quickload => "quickload",
            DeviceType::HardDisk => "hard-disk",
            DeviceType::Serial => "serial",
        }
    }

    /// Floppy-like devices get the common drive-status side effects on
    /// load and unload.
    pub fn is_floppy_family(self) -> bool {
        self == DeviceType::Floppy
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceType {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let device = match lower.as_str() {
            "floppy" | "flop" | "disk" => DeviceType::Floppy,
            "cassette" | "cass" => DeviceType::Cassette,
            "cartridge" | "cart" => DeviceType::Cartridge,
            "snapshot" | "snap" => DeviceType::Snapshot,
            "printer" | "prin" => DeviceType::Printer,
            "punch-tape" | "punchtape" | "punch" => DeviceType::PunchTape,
            "quickload" | "quik" => DeviceType::Quickload,
            "hard-disk" | "harddisk" | "hard" => DeviceType::HardDisk,
            "serial" | "serl" => DeviceType::Serial,
            _ => return Err(MediaError::UnknownDeviceKind(s.to_string())),
        };
        Ok(device)
    }
}

/// How much of the machine reinitializes when media in a slot changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetDepth {
    #[default]
    None,
    Cpu,
    Machine,
}

/// Which hooks of a descriptor the lifecycle should call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub init: bool,
    pub exit: bool,
    pub partial_checksum: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        init: false,
        exit: false,
        partial_checksum: false,
    };

    pub const LIFECYCLE: Capabilities = Capabilities {
        init: true,
        exit: true,
        partial_checksum: false,
    };

    pub const ALL: Capabilities = Capabilities {
        init: true,
        exit: true,
        partial_checksum: true,
    };

    pub const CHECKSUM_ONLY: Capabilities = Capabilities {
        init: false,
        exit: false,
        partial_checksum: true,
    };
}

/// Per-device-type hooks.
///
/// Only the hooks enabled in the descriptor's [`Capabilities`] are called.
pub trait DeviceHooks: Send {
    /// Accept or reject newly inserted media. `stream` is `None` for
    /// nameless slots and devices that never open a stream; `mode` is the
    /// effective open mode when a stream is present.
    fn init(
        &mut self,
        _instance: usize,
        _stream: Option<&mut dyn MediaStream>,
        _mode: Option<OpenMode>,
    ) -> Result<(), String> {
        Ok(())
    }

    /// Media is being removed.
    fn exit(&mut self, _instance: usize) {}

    /// Identify content from the whole image. Zero means "no opinion".
    fn partial_checksum(&self, _data: &[u8]) -> u32 {
        0
    }
}

/// Hooks for devices that need no driver logic.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl DeviceHooks for NoHooks {}

/// Static description of one device type.
pub struct DeviceDescriptor {
    device: DeviceType,
    max_instances: usize,
    extensions: Vec<String>,
    open_intent: OpenIntent,
    reset_depth: ResetDepth,
    caps: Capabilities,
    checksum_only: bool,
    hooks: Box<dyn DeviceHooks>,
}

impl fmt::Debug for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDescriptor")
            .field("device", &self.device)
            .field("max_instances", &self.max_instances)
            .field("extensions", &self.extensions)
            .field("open_intent", &self.open_intent)
            .field("reset_depth", &self.reset_depth)
            .field("caps", &self.caps)
            .field("checksum_only", &self.checksum_only)
            .finish_non_exhaustive()
    }
}

impl DeviceDescriptor {
    /// A lifecycle-owning descriptor with one instance, init and exit
    /// enabled, no stream and no reset.
    pub fn new(device: DeviceType, hooks: impl DeviceHooks + 'static) -> Self {
        Self {
            device,
            max_instances: 1,
            extensions: Vec::new(),
            open_intent: OpenIntent::None,
            reset_depth: ResetDepth::None,
            caps: Capabilities::LIFECYCLE,
            checksum_only: false,
            hooks: Box::new(hooks),
        }
    }

    /// An extra descriptor that only contributes a partial checksum for
    /// `device`.
    pub fn checksum_only(device: DeviceType, hooks: impl DeviceHooks + 'static) -> Self {
        Self {
            caps: Capabilities::CHECKSUM_ONLY,
            checksum_only: true,
            ..Self::new(device, hooks)
        }
    }

    pub fn instances(mut self, count: usize) -> Self {
        self.max_instances = count;
        self
    }

    pub fn extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn open_intent(mut self, intent: OpenIntent) -> Self {
        self.open_intent = intent;
        self
    }

    pub fn reset_depth(mut self, depth: ResetDepth) -> Self {
        self.reset_depth = depth;
        self
    }

    pub fn capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    pub fn device(&self) -> DeviceType {
        self.device
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    pub fn extension_list(&self) -> &[String] {
        &self.extensions
    }

    pub fn intent(&self) -> OpenIntent {
        self.open_intent
    }

    pub fn depth(&self) -> ResetDepth {
        self.reset_depth
    }

    pub fn caps(&self) -> Capabilities {
        self.caps
    }

    pub fn is_checksum_only(&self) -> bool {
        self.checksum_only
    }

    /// Case-insensitive extension match, with or without a leading dot.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn hooks(&self) -> &dyn DeviceHooks {
        self.hooks.as_ref()
    }

    pub fn hooks_mut(&mut self) -> &mut dyn DeviceHooks {
        self.hooks.as_mut()
    }

    fn validate(&self) -> MediaResult<()> {
        let invalid = |reason: String| MediaError::InvalidDescriptor {
            device: self.device,
            reason,
        };

        if self.checksum_only {
            if !self.caps.partial_checksum || self.caps.init || self.caps.exit {
                return Err(invalid(
                    "checksum-only descriptor must enable only partial_checksum".into(),
                ));
            }
            return Ok(());
        }

        if self.max_instances == 0 || self.max_instances > MAX_DEV_INSTANCES {
            return Err(invalid(format!(
                "instance count {} outside 1..={}",
                self.max_instances, MAX_DEV_INSTANCES
            )));
        }
        for ext in &self.extensions {
            let valid = !ext.is_empty()
                && !ext.starts_with('.')
                && ext.chars().all(|c| !c.is_ascii_uppercase() && !c.is_whitespace());
            if !valid {
                return Err(invalid(format!("bad extension {:?}", ext)));
            }
        }
        Ok(())
    }
}

/// Registry of device descriptors for one machine.
#[derive(Debug, Default)]
pub struct DeviceTable {
    descriptors: Vec<DeviceDescriptor>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a descriptor.
    ///
    /// A type may have one lifecycle-owning descriptor and any number of
    /// checksum-only descriptors.
    pub fn register(&mut self, descriptor: DeviceDescriptor) -> MediaResult<()> {
        descriptor.validate()?;
        if !descriptor.checksum_only && self.find(descriptor.device).is_some() {
            return Err(MediaError::InvalidDescriptor {
                device: descriptor.device,
                reason: "device type already registered".into(),
            });
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, descriptor: DeviceDescriptor) -> MediaResult<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// The lifecycle-owning descriptor for `device`.
    pub fn find(&self, device: DeviceType) -> Option<&DeviceDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.device == device && !d.checksum_only)
    }

    pub fn find_mut(&mut self, device: DeviceType) -> Option<&mut DeviceDescriptor> {
        self.descriptors
            .iter_mut()
            .find(|d| d.device == device && !d.checksum_only)
    }

    /// Descriptors of `device` that expose a partial checksum, in
    /// registration order.
    pub fn checksum_hooks(&self, device: DeviceType) -> impl Iterator<Item = &DeviceDescriptor> {
        self.descriptors
            .iter()
            .filter(move |d| d.device == device && d.caps.partial_checksum)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.descriptors.iter()
    }

    /// First lifecycle-owning device type that recognizes `ext`.
    pub fn device_for_extension(&self, ext: &str) -> Option<DeviceType> {
        self.descriptors
            .iter()
            .find(|d| !d.checksum_only && d.accepts_extension(ext))
            .map(|d| d.device)
    }

    /// Every addressable (type, instance) pair.
    pub fn slots(&self) -> Vec<(DeviceType, usize)> {
        self.descriptors
            .iter()
            .filter(|d| !d.checksum_only)
            .flat_map(|d| (0..d.max_instances).map(move |i| (d.device, i)))
            .collect()
    }
}
