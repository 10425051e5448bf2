//! Error types for the media manager.

use thiserror::Error;

use crate::device::DeviceType;

/// Errors that can occur while loading, opening or unloading media.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unable to open image file {name}")]
    OpenFailure { name: String },

    #[error("{device} #{instance} rejected the image: {reason}")]
    DeviceInitRejected {
        device: DeviceType,
        instance: usize,
        reason: String,
    },

    #[error("Malformed archive {name}: {reason}")]
    MalformedArchive { name: String, reason: String },

    #[error("Device not registered: {0}")]
    UnknownDevice(DeviceType),

    #[error("Invalid instance {instance} for {device}")]
    InvalidInstance { device: DeviceType, instance: usize },

    #[error("Invalid descriptor for {device}: {reason}")]
    InvalidDescriptor { device: DeviceType, reason: String },

    #[error("No image name set")]
    NoImage,

    #[error("Slot already holds an open stream")]
    StreamAlreadyOpen,

    #[error("Unknown device kind: {0}")]
    UnknownDeviceKind(String),

    #[error("Invalid mount spec: {0}")]
    InvalidMount(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MediaError {
    /// Whether the open-mode negotiator may move on to the next candidate.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, MediaError::OpenFailure { .. })
    }
}

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;
