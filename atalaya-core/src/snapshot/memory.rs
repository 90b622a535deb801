//! In-memory provider, used by tests and ad-hoc tooling.

use super::SnapshotProvider;
use crate::error::Result;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    tables: HashMap<String, Vec<serde_json::Value>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; replaces any previous content of the collection.
    pub fn with(
        mut self,
        collection: impl Into<String>,
        documents: Vec<serde_json::Value>,
    ) -> Self {
        self.tables.insert(collection.into(), documents);
        self
    }

    pub fn insert(&mut self, collection: impl Into<String>, documents: Vec<serde_json::Value>) {
        self.tables.insert(collection.into(), documents);
    }
}

impl SnapshotProvider for StaticProvider {
    fn describe(&self) -> String {
        "static".to_string()
    }

    fn fetch(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        Ok(self.tables.get(collection).cloned().unwrap_or_default())
    }

    fn collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
