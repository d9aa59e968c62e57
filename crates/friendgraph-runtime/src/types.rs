//! Runtime types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use friendgraph_core::{Error, Result};
use friendgraph_crawl::CrawlReport;
use friendgraph_graph::{GraphEdge, GraphNode};
use friendgraph_source::CredentialStatus;

/// What gets handed to the renderer: one JSON file per crawl identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    /// `id` or `smaller,larger`.
    pub identifier: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Shortest path between the two targets, when there are two and one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    /// RFC 3339.
    pub generated_at: String,
}

impl GraphDocument {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::NotFound(format!("graph document {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Result of a crawl-one / crawl-two run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlOutcome {
    pub identifier: String,
    pub short_id: String,
    /// An existing document was returned without crawling.
    pub reused: bool,
    pub path: Option<Vec<String>>,
    /// A path between the two targets exists. Always false for one target.
    pub found: bool,
    #[serde(skip)]
    pub document_path: PathBuf,
    /// Empty when `reused`.
    pub reports: Vec<CrawlReport>,
}

/// One line of `check-keys` output.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialCheck {
    /// Redacted.
    pub key: String,
    pub status: CredentialStatus,
}
