//! Open-mode negotiation.
//!
//! Devices declare an abstract [`OpenIntent`]; the negotiator turns it into
//! one concrete [`OpenMode`] by trying candidates in a fixed order and
//! stopping at the first that opens.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Concrete mode a stream is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
    /// Read-write, creating (and truncating) the file.
    ReadWriteCreate,
}

impl OpenMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpenMode::Read => "read",
            OpenMode::Write => "write",
            OpenMode::ReadWrite => "read-write",
            OpenMode::ReadWriteCreate => "read-write-create",
        };
        f.write_str(s)
    }
}

/// What a device asks for when its media is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenIntent {
    /// The device never opens a stream.
    #[default]
    None,
    Read,
    Write,
    ReadWrite,
    ReadWriteCreate,
    ReadWriteOrRead,
    ReadWriteCreateOrRead,
    ReadOrWrite,
}

/// One negotiation step: the mode to open with and the mode to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub attempt: OpenMode,
    pub reported: OpenMode,
}

const fn same(mode: OpenMode) -> Candidate {
    Candidate {
        attempt: mode,
        reported: mode,
    }
}

const READ: Candidate = same(OpenMode::Read);
const WRITE: Candidate = same(OpenMode::Write);
const READ_WRITE: Candidate = same(OpenMode::ReadWrite);
const READ_WRITE_CREATE: Candidate = same(OpenMode::ReadWriteCreate);
// The write fallback creates the file but is reported as plain write.
const CREATE_AS_WRITE: Candidate = Candidate {
    attempt: OpenMode::ReadWriteCreate,
    reported: OpenMode::Write,
};

impl OpenIntent {
    /// Candidates in the order they are tried.
    pub fn candidates(self) -> &'static [Candidate] {
        match self {
            OpenIntent::None => &[],
            OpenIntent::Read => &[READ],
            OpenIntent::Write => &[WRITE],
            OpenIntent::ReadWrite => &[READ_WRITE],
            OpenIntent::ReadWriteCreate => &[READ_WRITE_CREATE],
            OpenIntent::ReadWriteOrRead => &[READ_WRITE, READ],
            OpenIntent::ReadWriteCreateOrRead => &[READ_WRITE, READ, READ_WRITE_CREATE],
            OpenIntent::ReadOrWrite => &[READ, CREATE_AS_WRITE],
        }
    }

    pub fn opens_stream(self) -> bool {
        self != OpenIntent::None
    }
}

/// Try each candidate of `intent` with `attempt`, returning the first opened
/// value together with its effective mode.
///
/// An [`MediaError::OpenFailure`] moves on to the next candidate; any other
/// error stops negotiation. When every candidate fails the result is
/// `OpenFailure` for `name`.
pub fn negotiate<T, F>(intent: OpenIntent, name: &str, mut attempt: F) -> MediaResult<(T, OpenMode)>
where
    F: FnMut(OpenMode) -> MediaResult<T>,
{
    for candidate in intent.candidates() {
        debug!("negotiate: trying {} as {}", name, candidate.attempt);
        match attempt(candidate.attempt) {
            Ok(value) => return Ok((value, candidate.reported)),
            Err(e) if e.is_open_failure() => continue,
            Err(e) => return Err(e),
        }
    }
    Err(MediaError::OpenFailure {
        name: name.to_string(),
    })
}
