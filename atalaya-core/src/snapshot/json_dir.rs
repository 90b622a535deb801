//! Provider reading collection exports from a directory of JSON files.
//!
//! Layout: one file per collection, either `<collection>.json` holding a
//! JSON array (`mongoexport --jsonArray`) or `<collection>.jsonl` holding
//! one document per line (plain `mongoexport`). When both exist the array
//! file wins.

use super::SnapshotProvider;
use crate::error::{Error, Result};
use glob::glob;
use std::path::{Path, PathBuf};

pub struct JsonDirProvider {
    root: PathBuf,
}

impl JsonDirProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, collection: &str) -> Option<PathBuf> {
        for ext in ["json", "jsonl"] {
            let candidate = self.root.join(format!("{}.{}", collection, ext));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

impl SnapshotProvider for JsonDirProvider {
    fn describe(&self) -> String {
        format!("json dir {}", self.root.display())
    }

    fn fetch(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        let Some(path) = self.file_for(collection) else {
            tracing::debug!(collection = collection, "No export file, treating as empty");
            return Ok(Vec::new());
        };

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::snapshot(collection, format!("{}: {}", path.display(), e)))?;

        parse_documents(collection, &path, &contents)
    }

    fn collections(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for ext in ["json", "jsonl"] {
            let pattern = self.root.join(format!("*.{}", ext));
            let entries = glob(&pattern.to_string_lossy())
                .map_err(|e| Error::snapshot("discovery", e.to_string()))?;

            for entry in entries {
                match entry {
                    Ok(path) => {
                        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                            names.push(stem.to_string());
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping unreadable directory entry");
                    }
                }
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Parse a collection file: a JSON array when the content opens with `[`,
/// one document per non-empty line otherwise. Malformed JSON is fatal for
/// the collection; there is no way to tell how much data went missing.
fn parse_documents(collection: &str, path: &Path, contents: &str) -> Result<Vec<serde_json::Value>> {
    let trimmed = contents.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(contents).map_err(|e| {
            Error::snapshot(collection, format!("{}: invalid JSON array: {}", path.display(), e))
        });
    }

    let mut documents = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = serde_json::from_str(line).map_err(|e| {
            Error::snapshot(
                collection,
                format!("{}: line {}: {}", path.display(), lineno + 1, e),
            )
        })?;
        documents.push(value);
    }
    Ok(documents)
}
