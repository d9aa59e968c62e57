//! Account cache: one gzip-compressed JSON record per account.
//!
//! Records are written to a temporary file in the cache directory and then
//! hard-linked to `<account id>.gz`. The link fails if the entry already
//! exists, which makes `store` first-writer-wins without any locking and
//! means readers never observe a half-written record.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, warn};

use friendgraph_core::{AccountId, Error, FriendRecord, Result};

const RECORD_EXT: &str = "gz";

/// File-backed cache of [`FriendRecord`]s keyed by account id.
#[derive(Debug, Clone)]
pub struct AccountCache {
    root: PathBuf,
}

impl AccountCache {
    /// Open a cache rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn record_path(&self, id: &AccountId) -> PathBuf {
        self.root.join(format!("{}.{}", id, RECORD_EXT))
    }

    pub fn exists(&self, id: &AccountId) -> bool {
        self.record_path(id).is_file()
    }

    /// Load a record. `NotFound` if absent, `Cache` if it does not decode.
    pub fn load(&self, id: &AccountId) -> Result<FriendRecord> {
        let path = self.record_path(id);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("no cached record for {}", id)));
            }
            Err(e) => return Err(e.into()),
        };

        let decoder = GzDecoder::new(BufReader::new(file));
        serde_json::from_reader(decoder)
            .map_err(|e| Error::Cache(format!("{}: {}", path.display(), e)))
    }

    /// Persist a record unless one already exists.
    ///
    /// Returns `true` if this call created the entry, `false` if another
    /// writer got there first. Never overwrites.
    pub fn store(&self, id: &AccountId, record: &FriendRecord) -> Result<bool> {
        let dest = self.record_path(id);
        if dest.exists() {
            return Ok(false);
        }

        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", id, uuid::Uuid::new_v4().simple()));
        if let Err(e) = write_compressed(&tmp, record) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        let created = match fs::hard_link(&tmp, &dest) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => {
                // Filesystems without hard links get an exclusive create instead.
                debug!("hard_link unavailable for {} ({}), writing directly", id, e);
                write_exclusive(&dest, record)
            }
        };

        if let Err(e) = fs::remove_file(&tmp) {
            warn!("Failed to remove temp record {}: {}", tmp.display(), e);
        }
        created
    }

    /// Display name stored for an account, falling back to the id when the
    /// record has no username.
    pub fn display_name(&self, id: &AccountId) -> Result<String> {
        Ok(self.load(id)?.display_name().to_string())
    }

    /// Ids of every record currently in the cache.
    pub fn cached_ids(&self) -> Result<Vec<AccountId>> {
        let mut ids: Vec<AccountId> = fs::read_dir(&self.root)?
            .flatten()
            .filter_map(|entry| record_stem(&entry.file_name().to_string_lossy()).map(AccountId::new))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Number of records in the cache, without collecting their ids.
    pub fn record_count(&self) -> Result<usize> {
        Ok(fs::read_dir(&self.root)?
            .flatten()
            .filter(|entry| record_stem(&entry.file_name().to_string_lossy()).is_some())
            .count())
    }
}

/// Account id of a record file name. Temp files start with a dot.
fn record_stem(file_name: &str) -> Option<&str> {
    if file_name.starts_with('.') {
        return None;
    }
    file_name.strip_suffix(".gz")
}

fn encode_into<W: Write>(writer: W, record: &FriendRecord) -> Result<()> {
    let mut encoder = GzEncoder::new(writer, Compression::default());
    serde_json::to_writer(&mut encoder, record)?;
    let mut inner = encoder.finish()?;
    inner.flush()?;
    Ok(())
}

fn write_compressed(path: &Path, record: &FriendRecord) -> Result<()> {
    let file = File::create(path)?;
    encode_into(BufWriter::new(file), record)
}

fn write_exclusive(path: &Path, record: &FriendRecord) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => {
            encode_into(BufWriter::new(file), record)?;
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}
