//! Identifier → short id mapping, persisted as `identifier:shortid` lines.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, warn};

use friendgraph_core::Result;

/// Maps a crawl identifier (`id` or `smaller,larger`) to the short id its
/// graph document is stored under.
pub struct ShortLinkMap {
    path: PathBuf,
    links: RwLock<BTreeMap<String, String>>,
}

impl ShortLinkMap {
    pub fn open(path: &Path) -> Self {
        let links = load_links(path);
        info!("ShortLinkMap: {} mappings loaded", links.len());
        Self {
            path: path.to_path_buf(),
            links: RwLock::new(links),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<String> {
        self.links.read().get(identifier).cloned()
    }

    /// Reverse lookup, used when serving a document by its short id.
    pub fn identifier_for(&self, short_id: &str) -> Option<String> {
        self.links
            .read()
            .iter()
            .find(|(_, v)| v.as_str() == short_id)
            .map(|(k, _)| k.clone())
    }

    /// Existing short id for `identifier`, or a fresh one that is persisted
    /// before returning. The bool is `true` when the mapping already existed.
    pub fn get_or_create(&self, identifier: &str) -> Result<(String, bool)> {
        let mut links = self.links.write();
        if let Some(existing) = links.get(identifier) {
            return Ok((existing.clone(), true));
        }

        let short_id = uuid::Uuid::new_v4().simple().to_string();
        let mut updated = links.clone();
        updated.insert(identifier.to_string(), short_id.clone());
        save_links(&self.path, &updated)?;
        *links = updated;
        Ok((short_id, false))
    }

    pub fn len(&self) -> usize {
        self.links.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.read().is_empty()
    }
}

fn load_links(path: &Path) -> BTreeMap<String, String> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(_) => return BTreeMap::new(),
    };

    let mut links = BTreeMap::new();
    for line in data.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match line.rsplit_once(':') {
            Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                links.insert(key.to_string(), value.to_string());
            }
            _ => warn!("Skipping malformed mapping line {:?}", line),
        }
    }
    links
}

/// Rewrites the whole file.
fn save_links(path: &Path, links: &BTreeMap<String, String>) -> Result<()> {
    let mut out = String::new();
    for (key, value) in links {
        out.push_str(key);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}
