use std::collections::HashMap;

use lattice_error::{lattice_err, LatticeResult};
use rayon::iter::{IntoParallelIterator, ParallelIterator as _};

use crate::store::{ObjectStore, PosixStore};
use crate::uri::{Scheme, Uri};

/// Default smallest batch size for coalescing reads (20 MiB).
pub const DEFAULT_MIN_BATCH_SIZE: u64 = 20 * 1024 * 1024;

/// Default largest gap bridged between adjacent read regions (500 KiB).
pub const DEFAULT_MIN_BATCH_GAP: u64 = 500 * 1024;

/// Tuning knobs for batched reads.
#[derive(Debug, Clone, Copy)]
pub struct VfsConfig {
    /// Regions are merged while the batch stays at or below this size.
    pub min_batch_size: u64,
    /// Regions are merged while the gap between them is at most this.
    pub min_batch_gap: u64,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            min_batch_gap: DEFAULT_MIN_BATCH_GAP,
        }
    }
}

/// One byte region to read: a source offset and the destination buffer.
#[derive(Debug)]
pub struct ReadRegion<'a> {
    /// Offset into the source object.
    pub offset: u64,
    /// Destination; its length is the read size.
    pub dest: &'a mut [u8],
}

#[derive(Debug)]
struct ReadBatch<'a> {
    offset: u64,
    nbytes: u64,
    regions: Vec<ReadRegion<'a>>,
}

/// Storage façade dispatching on URI scheme.
///
/// Only the POSIX backend is built in; object-store backends register at
/// construction time and absent ones surface as unsupported-scheme errors.
#[derive(Debug)]
pub struct Vfs {
    stores: HashMap<Scheme, Box<dyn ObjectStore>>,
    config: VfsConfig,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new(VfsConfig::default())
    }
}

impl Vfs {
    /// Creates a VFS with the POSIX backend registered.
    pub fn new(config: VfsConfig) -> Self {
        let mut stores: HashMap<Scheme, Box<dyn ObjectStore>> = HashMap::new();
        stores.insert(Scheme::File, Box::new(PosixStore));
        Self { stores, config }
    }

    /// Registers (or replaces) the backend for `scheme`.
    pub fn register_store(&mut self, scheme: Scheme, store: Box<dyn ObjectStore>) {
        self.stores.insert(scheme, store);
    }

    /// The backend responsible for `uri`.
    pub fn store_for(&self, uri: &Uri) -> LatticeResult<&dyn ObjectStore> {
        self.stores
            .get(&uri.scheme())
            .map(|s| s.as_ref())
            .ok_or_else(|| {
                lattice_err!(Vfs: "built without support for the scheme of {}", uri)
            })
    }

    /// Reads exactly `buf.len()` bytes at `offset`.
    pub fn read(&self, uri: &Uri, offset: u64, buf: &mut [u8]) -> LatticeResult<()> {
        self.store_for(uri)?.read_into(uri, offset, buf)
    }

    /// Reads many byte regions of one object, coalescing them into batches
    /// and issuing each batch on the pool. Bytes land in each region's
    /// destination buffer.
    pub fn read_all(
        &self,
        uri: &Uri,
        regions: Vec<ReadRegion<'_>>,
        pool: &rayon::ThreadPool,
    ) -> LatticeResult<()> {
        if regions.is_empty() {
            return Ok(());
        }
        let store = self.store_for(uri)?;
        let batches = compute_read_batches(regions, &self.config);
        log::debug!("reading {} coalesced batches from {uri}", batches.len());
        pool.install(|| {
            batches.into_par_iter().try_for_each(|mut batch| {
                let mut buf = vec![0u8; batch.nbytes as usize];
                store.read_into(uri, batch.offset, &mut buf)?;
                for region in &mut batch.regions {
                    let from = (region.offset - batch.offset) as usize;
                    let len = region.dest.len();
                    region.dest.copy_from_slice(&buf[from..from + len]);
                }
                Ok(())
            })
        })
    }
}

/// Coalesces offset-sorted regions: a region joins the current batch while
/// the grown batch stays within `min_batch_size` or the gap to it is at
/// most `min_batch_gap`.
fn compute_read_batches<'a>(
    mut regions: Vec<ReadRegion<'a>>,
    config: &VfsConfig,
) -> Vec<ReadBatch<'a>> {
    regions.sort_unstable_by_key(|r| r.offset);

    let mut iter = regions.into_iter();
    let first = iter.next().expect("at least one region");
    let mut current = ReadBatch {
        offset: first.offset,
        nbytes: first.dest.len() as u64,
        regions: vec![first],
    };
    let mut batches = Vec::new();
    for region in iter {
        let offset = region.offset;
        let nbytes = region.dest.len() as u64;
        let grown = (offset + nbytes).saturating_sub(current.offset);
        let gap = offset.saturating_sub(current.offset + current.nbytes);
        if grown <= config.min_batch_size || gap <= config.min_batch_gap {
            current.nbytes = current.nbytes.max(grown);
            current.regions.push(region);
        } else {
            batches.push(current);
            current = ReadBatch {
                offset,
                nbytes,
                regions: vec![region],
            };
        }
    }
    batches.push(current);
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn tight_config() -> VfsConfig {
        VfsConfig {
            min_batch_size: 16,
            min_batch_gap: 2,
        }
    }

    #[test]
    fn adjacent_regions_coalesce() {
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        let regions = vec![
            ReadRegion {
                offset: 0,
                dest: &mut a,
            },
            ReadRegion {
                offset: 4,
                dest: &mut b,
            },
        ];
        let batches = compute_read_batches(regions, &tight_config());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].offset, 0);
        assert_eq!(batches[0].nbytes, 8);
    }

    #[test]
    fn small_gaps_are_bridged() {
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        let regions = vec![
            ReadRegion {
                offset: 0,
                dest: &mut a,
            },
            ReadRegion {
                offset: 6,
                dest: &mut b,
            },
        ];
        let batches = compute_read_batches(regions, &tight_config());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].nbytes, 10);
    }

    #[test]
    fn large_gaps_split_batches() {
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        let regions = vec![
            ReadRegion {
                offset: 0,
                dest: &mut a,
            },
            ReadRegion {
                offset: 100,
                dest: &mut b,
            },
        ];
        let batches = compute_read_batches(regions, &tight_config());
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].offset, 100);
    }

    #[test]
    fn unsorted_regions_are_sorted_first() {
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        let regions = vec![
            ReadRegion {
                offset: 100,
                dest: &mut a,
            },
            ReadRegion {
                offset: 0,
                dest: &mut b,
            },
        ];
        let batches = compute_read_batches(regions, &tight_config());
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].offset, 0);
    }

    #[test]
    fn read_all_scatters_into_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let uri = Uri::try_from(dir.path().join("data").as_path()).unwrap();
        let vfs = Vfs::default();
        let data: Vec<u8> = (0..=255).collect();
        vfs.store_for(&uri).unwrap().write(&uri, &data).unwrap();

        let mut head = [0u8; 4];
        let mut mid = [0u8; 8];
        let mut tail = [0u8; 4];
        let regions = vec![
            ReadRegion {
                offset: 0,
                dest: &mut head,
            },
            ReadRegion {
                offset: 100,
                dest: &mut mid,
            },
            ReadRegion {
                offset: 252,
                dest: &mut tail,
            },
        ];
        vfs.read_all(&uri, regions, &pool()).unwrap();
        assert_eq!(head, [0, 1, 2, 3]);
        assert_eq!(mid, [100, 101, 102, 103, 104, 105, 106, 107]);
        assert_eq!(tail, [252, 253, 254, 255]);
    }

    #[test]
    fn unsupported_scheme_is_reported() {
        let vfs = Vfs::default();
        let uri = Uri::new("s3://bucket/key").unwrap();
        assert!(vfs.read(&uri, 0, &mut [0u8; 1]).is_err());
    }

    #[test]
    fn registered_backends_take_over_their_scheme() {
        use crate::store::{ObjectStat, ObjectStore};

        #[derive(Debug)]
        struct NullStore;

        impl ObjectStore for NullStore {
            fn stat(&self, _uri: &Uri) -> lattice_error::LatticeResult<Option<ObjectStat>> {
                Ok(None)
            }
            fn list(&self, _uri: &Uri) -> lattice_error::LatticeResult<Vec<Uri>> {
                Ok(Vec::new())
            }
            fn read_into(
                &self,
                _uri: &Uri,
                _offset: u64,
                buf: &mut [u8],
            ) -> lattice_error::LatticeResult<()> {
                buf.fill(0);
                Ok(())
            }
            fn write(&self, _uri: &Uri, _data: &[u8]) -> lattice_error::LatticeResult<()> {
                Ok(())
            }
            fn move_to(&self, _from: &Uri, _to: &Uri) -> lattice_error::LatticeResult<()> {
                Ok(())
            }
            fn remove_file(&self, _uri: &Uri) -> lattice_error::LatticeResult<()> {
                Ok(())
            }
            fn remove_dir(&self, _uri: &Uri) -> lattice_error::LatticeResult<()> {
                Ok(())
            }
            fn create_dir(&self, _uri: &Uri) -> lattice_error::LatticeResult<()> {
                Ok(())
            }
            fn touch(&self, _uri: &Uri) -> lattice_error::LatticeResult<()> {
                Ok(())
            }
        }

        let mut vfs = Vfs::default();
        vfs.register_store(Scheme::S3, Box::new(NullStore));
        let uri = Uri::new("s3://bucket/key").unwrap();
        let mut buf = [7u8; 3];
        vfs.read(&uri, 0, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0]);
    }
}
