use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use lattice_error::{lattice_bail, lattice_err, LatticeResult};

use crate::uri::Uri;

/// Metadata of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStat {
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Whether the object is a directory.
    pub is_dir: bool,
}

/// The capability set every storage backend provides. Backends are
/// selected per URI scheme; schemes with no registered backend are
/// reported as unsupported at dispatch time.
pub trait ObjectStore: Debug + Send + Sync {
    /// Object metadata, or `None` if it does not exist.
    fn stat(&self, uri: &Uri) -> LatticeResult<Option<ObjectStat>>;

    /// The immediate children of a directory.
    fn list(&self, uri: &Uri) -> LatticeResult<Vec<Uri>>;

    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read_into(&self, uri: &Uri, offset: u64, buf: &mut [u8]) -> LatticeResult<()>;

    /// Appends `data` to the object, creating it if needed.
    fn write(&self, uri: &Uri, data: &[u8]) -> LatticeResult<()>;

    /// Renames an object or directory.
    fn move_to(&self, from: &Uri, to: &Uri) -> LatticeResult<()>;

    /// Removes a file.
    fn remove_file(&self, uri: &Uri) -> LatticeResult<()>;

    /// Removes a directory and its contents.
    fn remove_dir(&self, uri: &Uri) -> LatticeResult<()>;

    /// Creates a directory.
    fn create_dir(&self, uri: &Uri) -> LatticeResult<()>;

    /// Creates an empty file.
    fn touch(&self, uri: &Uri) -> LatticeResult<()>;
}

/// POSIX filesystem backend.
#[derive(Debug, Default)]
pub struct PosixStore;

impl PosixStore {
    fn path_of(uri: &Uri) -> LatticeResult<std::path::PathBuf> {
        if !uri.is_file() {
            lattice_bail!(Vfs: "not a local file URI: {}", uri);
        }
        Ok(uri.to_path())
    }

    fn uri_of(path: &Path) -> LatticeResult<Uri> {
        Uri::try_from(path)
    }
}

impl ObjectStore for PosixStore {
    fn stat(&self, uri: &Uri) -> LatticeResult<Option<ObjectStat>> {
        let path = Self::path_of(uri)?;
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(Some(ObjectStat {
                size: if meta.is_dir() { 0 } else { meta.len() },
                is_dir: meta.is_dir(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, uri: &Uri) -> LatticeResult<Vec<Uri>> {
        let path = Self::path_of(uri)?;
        let mut children = Vec::new();
        for entry in std::fs::read_dir(&path)? {
            children.push(Self::uri_of(&entry?.path())?);
        }
        children.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(children)
    }

    fn read_into(&self, uri: &Uri, offset: u64, buf: &mut [u8]) -> LatticeResult<()> {
        let mut file = File::open(Self::path_of(uri)?)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write(&self, uri: &Uri, data: &[u8]) -> LatticeResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(Self::path_of(uri)?)?;
        file.write_all(data)?;
        Ok(())
    }

    fn move_to(&self, from: &Uri, to: &Uri) -> LatticeResult<()> {
        std::fs::rename(Self::path_of(from)?, Self::path_of(to)?)?;
        Ok(())
    }

    fn remove_file(&self, uri: &Uri) -> LatticeResult<()> {
        std::fs::remove_file(Self::path_of(uri)?)?;
        Ok(())
    }

    fn remove_dir(&self, uri: &Uri) -> LatticeResult<()> {
        std::fs::remove_dir_all(Self::path_of(uri)?)?;
        Ok(())
    }

    fn create_dir(&self, uri: &Uri) -> LatticeResult<()> {
        std::fs::create_dir_all(Self::path_of(uri)?)?;
        Ok(())
    }

    fn touch(&self, uri: &Uri) -> LatticeResult<()> {
        let path = Self::path_of(uri)?;
        if std::fs::metadata(&path).is_ok() {
            return Err(lattice_err!(Vfs: "cannot touch existing object {}", uri));
        }
        File::create(&path)?;
        Ok(())
    }
}
