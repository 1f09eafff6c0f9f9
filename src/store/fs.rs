//! Filesystem chunk store
//!
//! Lays chunks out like an object store bucket:
//! `<root>/<tenant>/<fingerprint>/<from ms hex>-<through ms hex>.chunk`.

use super::{check_put, validate_tenant, ChunkStore, StoreError, WriteContext};
use crate::chunk::{Chunk, ChunkKey};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;
use std::path::{Path, PathBuf};

const CHUNK_EXTENSION: &str = "chunk";

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create the root directory if needed
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the object holding `key`
    pub fn key_path(&self, key: &ChunkKey) -> PathBuf {
        self.root
            .join(&key.tenant)
            .join(key.fingerprint.to_string())
            .join(format!("{:x}-{:x}.{}", key.from, key.through, CHUNK_EXTENSION))
    }

    /// Encoded bytes for `key`, if present
    pub fn read(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>, StoreError> {
        validate_tenant(&key.tenant)?;
        let path = self.key_path(key);

        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    /// Every chunk key stored for `tenant`
    pub fn list_keys(&self, tenant: &str) -> Result<Vec<ChunkKey>, StoreError> {
        validate_tenant(tenant)?;
        let tenant_dir = self.root.join(tenant);
        let mut keys = Vec::new();

        if !tenant_dir.exists() {
            return Ok(keys);
        }

        for fp_entry in fs::read_dir(&tenant_dir)? {
            let fp_entry = fp_entry?;
            let Some(fingerprint) = fp_entry.file_name().to_str().and_then(|s| s.parse().ok()) else {
                continue;
            };

            for entry in fs::read_dir(fp_entry.path())? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(CHUNK_EXTENSION) {
                    continue;
                }
                let Some((from, through)) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.split_once('-'))
                else {
                    continue;
                };

                if let (Ok(from), Ok(through)) =
                    (u64::from_str_radix(from, 16), u64::from_str_radix(through, 16))
                {
                    keys.push(ChunkKey {
                        tenant: tenant.to_string(),
                        fingerprint,
                        from: from as i64,
                        through: through as i64,
                    });
                }
            }
        }

        keys.sort_by(|a, b| (a.fingerprint, a.from, a.through).cmp(&(b.fingerprint, b.from, b.through)));
        Ok(keys)
    }
}

impl ChunkStore for FsStore {
    fn put_one(
        &self,
        ctx: &WriteContext,
        _from: DateTime<Utc>,
        _through: DateTime<Utc>,
        chunk: Chunk,
    ) -> Result<(), StoreError> {
        check_put(ctx, &chunk)?;

        let path = self.key_path(&chunk.key());
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;

        // Each put stages its own temp file, then renames it over the object
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(chunk.encoded())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{build_chunk, MemChunk};
    use crate::stream::Entry;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn chunk(service: &str) -> Chunk {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let entries: Vec<Entry> = (0..3)
            .map(|i| Entry::new(ts + Duration::seconds(i), "level=info"))
            .collect();
        build_chunk(&format!("{{service_name=\"{}\"}}", service), &entries, "fake").unwrap()
    }

    #[test]
    fn test_fs_put_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path()).unwrap();

        let c = chunk("api");
        let key = c.key();
        let encoded = c.encoded().to_vec();
        store.put_one(&WriteContext::default(), c.from(), c.through(), c).unwrap();

        let read = store.read(&key).unwrap().unwrap();
        assert_eq!(read, encoded);
        assert_eq!(MemChunk::decode(&read).unwrap().num_entries(), 3);
        assert!(store.key_path(&key).starts_with(temp_dir.path().join("fake")));
    }

    #[test]
    fn test_fs_list_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path()).unwrap();
        let ctx = WriteContext::default();

        let mut expected = Vec::new();
        for service in ["a", "b"] {
            let c = chunk(service);
            expected.push(c.key());
            store.put_one(&ctx, c.from(), c.through(), c).unwrap();
        }
        expected.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

        assert_eq!(store.list_keys("fake").unwrap(), expected);
        assert!(store.list_keys("empty").unwrap().is_empty());
    }

    #[test]
    fn test_fs_missing_and_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path()).unwrap();

        let mut key = chunk("a").key();
        assert!(store.read(&key).unwrap().is_none());

        key.tenant = "../escape".to_string();
        assert!(matches!(store.read(&key), Err(StoreError::InvalidTenant(_))));

        let c = chunk("a");
        let ctx = WriteContext::new("..");
        assert!(matches!(
            store.put_one(&ctx, c.from(), c.through(), c),
            Err(StoreError::InvalidTenant(_))
        ));
    }

    #[test]
    fn test_fs_concurrent_identical_puts() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path()).unwrap();
        let expected = chunk("a").encoded().to_vec();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        for _ in 0..16 {
                            let c = chunk("a");
                            store.put_one(&WriteContext::default(), c.from(), c.through(), c)?;
                        }
                        Ok::<_, StoreError>(())
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }
        });

        let key = chunk("a").key();
        assert_eq!(store.read(&key).unwrap().unwrap(), expected);
        assert_eq!(store.list_keys("fake").unwrap(), vec![key.clone()]);

        let leftovers = fs::read_dir(store.key_path(&key).parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
