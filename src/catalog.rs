//! Reference image catalog bundled from a JSON file.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

/// A reference image and the tags it can be found by.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct CatalogEntry {
    /// Filename inside the gallery directory
    pub filename: String,
    /// Search tags
    pub tags: Vec<String>,
}

impl CatalogEntry {
    /// True when the lowercased query is a substring of any lowercased tag.
    fn matches(&self, query_lower: &str) -> bool {
        self.tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(query_lower))
    }
}

/// Errors returned when loading the catalog.
#[derive(Debug)]
pub enum CatalogError {
    /// The JSON payload could not be parsed.
    Parse(serde_json::Error),
    /// A filename would escape the gallery directory.
    InvalidFilename(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "Failed to parse catalog JSON: {err}"),
            Self::InvalidFilename(name) => write!(f, "Invalid catalog filename: {name}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// The static list of reference images, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Parses the catalog shipped in `data/catalog.json`.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_json(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/data/catalog.json"
        )))
    }

    /// Parses a JSON array of `{filename, tags}` objects.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(raw).map_err(CatalogError::Parse)?;
        for entry in &entries {
            let plain = Path::new(&entry.filename)
                .file_name()
                .is_some_and(|name| name == entry.filename.as_str());
            if !plain {
                return Err(CatalogError::InvalidFilename(entry.filename.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// All entries, in declaration order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Distinct tags in first-seen order, for the keyword hints on the page.
    pub fn suggestions(&self, limit: usize) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .flat_map(|entry| entry.tags.iter())
            .filter(|tag| seen.insert(tag.as_str()))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Filenames of entries matching `keyword` whose file is present in `gallery_dir`.
    ///
    /// A missing or blank keyword matches everything. Otherwise the keyword,
    /// untrimmed, must be a case-insensitive substring of some tag. File
    /// presence is checked on every call.
    pub async fn search(&self, gallery_dir: &Path, keyword: Option<&str>) -> Vec<&CatalogEntry> {
        let query = keyword
            .filter(|keyword| !keyword.trim().is_empty())
            .map(str::to_lowercase);

        let mut found = Vec::new();
        for entry in &self.entries {
            if let Some(query) = &query
                && !entry.matches(query)
            {
                continue;
            }
            if is_present(&gallery_dir.join(&entry.filename)).await {
                found.push(entry);
            }
        }
        found
    }
}

async fn is_present(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.is_file(),
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            warn!("Failed to stat {}: {}", path.display(), err);
            false
        }
    }
}
