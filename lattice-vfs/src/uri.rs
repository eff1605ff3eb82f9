use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use lattice_error::{lattice_bail, LatticeResult};

/// URI scheme of a storage resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Local filesystem (`file://` or a bare path).
    File,
    /// An S3 object store.
    S3,
    /// An HDFS cluster.
    Hdfs,
}

/// A storage resource name. Bare paths are taken as local files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    raw: String,
    scheme: Scheme,
}

impl Uri {
    /// Parses a URI, classifying it by scheme.
    pub fn new(raw: impl Into<String>) -> LatticeResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            lattice_bail!(Vfs: "empty URI");
        }
        let scheme = if raw.starts_with("s3://") {
            Scheme::S3
        } else if raw.starts_with("hdfs://") {
            Scheme::Hdfs
        } else if let Some(rest) = raw.strip_prefix("file://") {
            if rest.is_empty() {
                lattice_bail!(Vfs: "URI {} has no path", raw);
            }
            Scheme::File
        } else if raw.contains("://") {
            lattice_bail!(Vfs: "unsupported URI scheme: {}", raw);
        } else {
            Scheme::File
        };
        Ok(Self { raw, scheme })
    }

    /// The URI scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Whether this is a local file URI.
    pub fn is_file(&self) -> bool {
        self.scheme == Scheme::File
    }

    /// The local path of a file URI.
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(self.raw.strip_prefix("file://").unwrap_or(&self.raw))
    }

    /// The full URI string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// A URI naming `child` under this one.
    pub fn join(&self, child: &str) -> Uri {
        let mut raw = self.raw.trim_end_matches('/').to_string();
        raw.push('/');
        raw.push_str(child);
        Uri {
            raw,
            scheme: self.scheme,
        }
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<&Path> for Uri {
    type Error = lattice_error::LatticeError;

    fn try_from(path: &Path) -> LatticeResult<Self> {
        Uri::new(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_schemes() {
        assert_eq!(Uri::new("file:///tmp/a").unwrap().scheme(), Scheme::File);
        assert_eq!(Uri::new("/tmp/a").unwrap().scheme(), Scheme::File);
        assert_eq!(Uri::new("s3://bucket/a").unwrap().scheme(), Scheme::S3);
        assert_eq!(Uri::new("hdfs://nn/a").unwrap().scheme(), Scheme::Hdfs);
        assert!(Uri::new("gopher://x").is_err());
        assert!(Uri::new("").is_err());
    }

    #[test]
    fn file_paths_round_trip() {
        assert_eq!(
            Uri::new("file:///tmp/a").unwrap().to_path(),
            PathBuf::from("/tmp/a")
        );
        assert_eq!(Uri::new("/tmp/a").unwrap().to_path(), PathBuf::from("/tmp/a"));
    }

    #[test]
    fn join_appends_segments() {
        let base = Uri::new("file:///tmp/array/").unwrap();
        assert_eq!(base.join("frag").as_str(), "file:///tmp/array/frag");
    }
}
