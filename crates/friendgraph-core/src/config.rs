//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::Credential;

/// Deepest crawl the engine accepts; the branching factor makes anything
/// beyond this impractical.
pub const MAX_DEPTH: u8 = 4;
/// Largest worker pool the engine accepts.
pub const MAX_WORKERS: usize = 60;

/// Paths to all friendgraph data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// One gzip record per account (`data/user-data/`).
    pub cache: PathBuf,
    /// Graph documents (`data/graphs/`).
    pub finished_graphs: PathBuf,
    /// Identifier to short id mapping (`data/url-mappings.txt`).
    pub link_map_file: PathBuf,
    /// One API key per line (`data/APIKEYS.txt`).
    pub api_keys_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            cache: root.join("user-data"),
            finished_graphs: root.join("graphs"),
            link_map_file: root.join("url-mappings.txt"),
            api_keys_file: root.join("APIKEYS.txt"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.cache)?;
        std::fs::create_dir_all(&self.finished_graphs)?;
        Ok(())
    }
}

/// Knobs for one crawl invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Deepest level that gets expanded; the root is level 1.
    pub depth_cap: u8,
    pub workers: usize,
    /// Skip cache reads. Writes still never clobber an existing record.
    pub force_recrawl: bool,
    /// Extra attempts for a job that failed with a transient upstream error.
    pub transient_retries: u32,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            depth_cap: 2,
            workers: 10,
            force_recrawl: false,
            transient_retries: 0,
        }
    }
}

impl CrawlSettings {
    pub fn validate(&self) -> Result<()> {
        validate_depth(self.depth_cap)?;
        validate_workers(self.workers)
    }
}

/// Knobs for assembling a graph out of the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    pub depth_cap: u8,
    pub workers: usize,
    /// Add the friends of the deepest expanded level as leaf nodes.
    pub include_frontier: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            depth_cap: 2,
            workers: 10,
            include_frontier: true,
        }
    }
}

impl GraphSettings {
    pub fn validate(&self) -> Result<()> {
        validate_depth(self.depth_cap)?;
        validate_workers(self.workers)
    }
}

impl From<&CrawlSettings> for GraphSettings {
    fn from(crawl: &CrawlSettings) -> Self {
        Self {
            depth_cap: crawl.depth_cap,
            workers: crawl.workers,
            ..Self::default()
        }
    }
}

pub fn validate_depth(depth_cap: u8) -> Result<()> {
    if (1..=MAX_DEPTH).contains(&depth_cap) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "invalid level {} given. depth cap must be in range 1-{} (inclusive)",
            depth_cap, MAX_DEPTH
        )))
    }
}

pub fn validate_workers(workers: usize) -> Result<()> {
    if (1..=MAX_WORKERS).contains(&workers) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "invalid worker count {} given. workers must be in range 1-{} (inclusive)",
            workers, MAX_WORKERS
        )))
    }
}

/// Top-level friendgraph configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendGraphConfig {
    /// HTTP server port.
    pub port: u16,
    pub data_paths: DataPaths,
    pub crawl: CrawlSettings,
    pub graph: GraphSettings,
    /// Rebuild graph documents even when a short link already exists.
    pub always_regraph: bool,
}

impl FriendGraphConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let crawl = CrawlSettings::default();
        Ok(Self {
            port: 8080,
            data_paths: DataPaths::new(data_dir)?,
            graph: GraphSettings::from(&crawl),
            crawl,
            always_regraph: false,
        })
    }

    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut config = Self::new(data_dir)?;

        if let Some(port) = env_parse("FRIENDGRAPH_PORT") {
            config.port = port;
        }
        if let Some(depth) = env_parse("FRIENDGRAPH_DEPTH") {
            config.crawl.depth_cap = depth;
        }
        if let Some(workers) = env_parse("FRIENDGRAPH_WORKERS") {
            config.crawl.workers = workers;
        }
        config.crawl.force_recrawl = env_flag("FRIENDGRAPH_FORCE_RECRAWL");
        config.always_regraph = env_flag("FRIENDGRAPH_ALWAYS_REGRAPH");

        config.graph.depth_cap = config.crawl.depth_cap;
        config.graph.workers = config.crawl.workers;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}", name, raw);
            None
        }
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).map(|v| v.trim().to_ascii_lowercase()),
        Ok(ref v) if v == "1" || v == "true" || v == "yes"
    )
}

/// Credentials from `FRIENDGRAPH_API_KEYS` (comma separated) or the keys file.
pub fn load_credentials(paths: &DataPaths) -> Result<Vec<Credential>> {
    if let Ok(raw) = std::env::var("FRIENDGRAPH_API_KEYS") {
        let keys = parse_keys(raw.split(','));
        if !keys.is_empty() {
            info!("Loaded {} API keys from environment", keys.len());
            return Ok(keys);
        }
    }
    read_credentials_file(&paths.api_keys_file)
}

/// One key per line, blank lines ignored.
pub fn read_credentials_file(path: &Path) -> Result<Vec<Credential>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read API keys from {}: {}", path.display(), e))
    })?;
    let keys = parse_keys(content.lines());
    if keys.is_empty() {
        return Err(Error::Config(format!(
            "no API keys found in {}",
            path.display()
        )));
    }
    info!("Loaded {} API keys from {}", keys.len(), path.display());
    Ok(keys)
}

fn parse_keys<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<Credential> {
    lines
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(Credential::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_paths_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path().join("data")).unwrap();
        assert!(paths.cache.is_dir());
        assert!(paths.finished_graphs.is_dir());
        assert_eq!(paths.link_map_file.file_name().unwrap(), "url-mappings.txt");
        assert!(!paths.api_keys_file.exists());
    }

    #[test]
    fn test_settings_bounds() {
        let mut settings = CrawlSettings::default();
        assert!(settings.validate().is_ok());

        settings.depth_cap = 0;
        assert!(settings.validate().is_err());
        settings.depth_cap = 5;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("invalid level 5"));
        settings.depth_cap = 4;
        assert!(settings.validate().is_ok());

        settings.workers = 0;
        assert!(settings.validate().is_err());
        settings.workers = 61;
        assert!(settings.validate().is_err());
        settings.workers = 60;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_graph_settings_follow_crawl() {
        let crawl = CrawlSettings {
            depth_cap: 3,
            workers: 7,
            ..Default::default()
        };
        let graph = GraphSettings::from(&crawl);
        assert_eq!(graph.depth_cap, 3);
        assert_eq!(graph.workers, 7);
        assert!(graph.include_frontier);
    }

    #[test]
    fn test_read_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("APIKEYS.txt");

        assert!(read_credentials_file(&path).is_err());

        std::fs::write(&path, "\n  \n").unwrap();
        assert!(matches!(read_credentials_file(&path), Err(Error::Config(_))));

        std::fs::write(&path, "KEYONE1234\n\n  KEYTWO5678  \n").unwrap();
        let keys = read_credentials_file(&path).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].expose(), "KEYONE1234");
        assert_eq!(keys[1].expose(), "KEYTWO5678");
    }
}
