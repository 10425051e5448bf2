//! Host filesystem stream source.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use log::debug;

use super::source::{FileType, MediaStream, StreamSource};
use crate::archive::{read_entry, split_archive_path};
use crate::negotiate::OpenMode;

/// Opens images from a media directory on the host.
///
/// Relative names are looked up in `<root>/<system>/` first and then in
/// `<root>/`; absolute names are used as they are. Difference files live
/// under `<root>/diff/<system>/`. A name whose prefix is an existing file is
/// treated as `archive/entry` and the entry is extracted read-only.
#[derive(Debug, Clone)]
pub struct HostStreamSource {
    root: PathBuf,
}

impl HostStreamSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate locations for `filename`, in lookup order.
    fn candidates(&self, system: &str, filename: &str, filetype: FileType) -> Vec<PathBuf> {
        let path = Path::new(filename);
        if path.is_absolute() {
            return vec![path.to_path_buf()];
        }
        match filetype {
            FileType::Image => vec![self.root.join(system).join(path), self.root.join(path)],
            FileType::ImageDiff => vec![self.root.join("diff").join(system).join(path)],
        }
    }
}

impl StreamSource for HostStreamSource {
    fn open(
        &mut self,
        system: &str,
        filename: &str,
        filetype: FileType,
        mode: OpenMode,
    ) -> io::Result<Box<dyn MediaStream>> {
        let candidates = self.candidates(system, filename, filetype);

        // Existing files and archive entries take precedence over creation.
        for path in &candidates {
            if path.is_file() {
                debug!("host: opening {} as {}", path.display(), mode);
                return open_file(path, mode);
            }
            if let Some(data) = archive_entry(path)? {
                if mode.is_writable() {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        "archive entries are read-only",
                    ));
                }
                debug!("host: extracted {}", path.display());
                return Ok(Box::new(io::Cursor::new(data)));
            }
        }

        if matches!(mode, OpenMode::Write | OpenMode::ReadWriteCreate) {
            let target = candidates
                .iter()
                .find(|p| p.parent().is_some_and(Path::is_dir))
                .ok_or_else(|| not_found(filename))?;
            debug!("host: creating {}", target.display());
            return open_file(target, mode);
        }

        Err(not_found(filename))
    }
}

fn open_file(path: &Path, mode: OpenMode) -> io::Result<Box<dyn MediaStream>> {
    let mut options = OpenOptions::new();
    match mode {
        OpenMode::Read => options.read(true),
        OpenMode::Write => options.write(true).create(true).truncate(true),
        OpenMode::ReadWrite => options.read(true).write(true),
        OpenMode::ReadWriteCreate => options.read(true).write(true).create(true).truncate(true),
    };
    let file: File = options.open(path)?;
    Ok(Box::new(file))
}

/// Extract `container/entry` if some prefix of `path` is an existing file.
fn archive_entry(path: &Path) -> io::Result<Option<Vec<u8>>> {
    let Some(text) = path.to_str() else {
        return Ok(None);
    };
    for (container, entry) in split_archive_path(text) {
        let container = Path::new(container);
        if container.is_file() {
            let file = File::open(container)?;
            return read_entry(BufReader::new(file), entry)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()));
        }
    }
    Ok(None)
}

fn not_found(filename: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_system_directory_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("coco")).unwrap();
        std::fs::write(dir.path().join("coco").join("a.dsk"), b"system").unwrap();
        std::fs::write(dir.path().join("a.dsk"), b"shared").unwrap();

        let mut source = HostStreamSource::new(dir.path());
        let mut stream = source
            .open("coco", "a.dsk", FileType::Image, OpenMode::Read)
            .unwrap();
        let mut data = Vec::new();
        stream.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"system");
    }

    #[test]
    fn test_missing_read_fails_create_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = HostStreamSource::new(dir.path());
        assert!(source
            .open("coco", "new.prn", FileType::Image, OpenMode::Read)
            .is_err());

        let mut stream = source
            .open("coco", "new.prn", FileType::Image, OpenMode::ReadWriteCreate)
            .unwrap();
        stream.write_all(b"printed").unwrap();
        drop(stream);
        // No coco/ directory, so the file lands in the root.
        assert_eq!(std::fs::read(dir.path().join("new.prn")).unwrap(), b"printed");
    }

    #[test]
    fn test_archive_entry_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("game.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&zip_path).unwrap());
            zip.start_file::<_, ()>("GAME.BIN", Default::default()).unwrap();
            zip.write_all(b"inner").unwrap();
            zip.finish().unwrap();
        }

        let mut source = HostStreamSource::new(dir.path());
        let name = crate::archive::compose_inner_path("game.zip", "GAME.BIN");
        assert!(source
            .open("nes", &name, FileType::Image, OpenMode::ReadWrite)
            .is_err());

        let mut stream = source.open("nes", &name, FileType::Image, OpenMode::Read).unwrap();
        let mut data = Vec::new();
        stream.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"inner");
    }

    #[test]
    fn test_difference_files_in_diff_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("diff").join("coco")).unwrap();
        std::fs::write(dir.path().join("a.dsk"), b"image").unwrap();

        let mut source = HostStreamSource::new(dir.path());
        assert!(source
            .open("coco", "a.dsk", FileType::ImageDiff, OpenMode::Read)
            .is_err());

        let mut stream = source
            .open("coco", "a.dsk", FileType::ImageDiff, OpenMode::ReadWriteCreate)
            .unwrap();
        stream.write_all(b"delta").unwrap();
        drop(stream);

        let diff = dir.path().join("diff").join("coco").join("a.dsk");
        assert_eq!(std::fs::read(diff).unwrap(), b"delta");
        assert_eq!(std::fs::read(dir.path().join("a.dsk")).unwrap(), b"image");
    }
}
