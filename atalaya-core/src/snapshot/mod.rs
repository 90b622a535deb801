//! Snapshot access layer: typed views over database collection exports
//!
//! Engines never talk to MongoDB. They consume a [`Snapshot`], a typed,
//! fetch-once copy of the collections a reporting run needs, loaded through
//! a [`SnapshotProvider`].
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Export files    │ ──► │ SnapshotProvider │ ──► │    Snapshot     │
//! │ (*.json, *.jsonl)│     │  ├─ JsonDir      │     │ (typed tables)  │
//! └──────────────────┘     │  └─ Static       │     └─────────────────┘
//!                          └──────────────────┘
//! ```
//!
//! A document that fails to decode is skipped with a warning; a collection
//! that cannot be read or parsed at all aborts the load. Absent collections
//! are empty tables, not errors.

pub mod json_dir;
pub mod memory;

pub use json_dir::JsonDirProvider;
pub use memory::StaticProvider;

use crate::error::Result;
use crate::types::{
    Answer, CoachThread, Company, Connection, Episode, Exercise, Group, Module, ProgressRecord,
    Survey, Training, Translation, User,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// Collections a reporting snapshot is built from, in load order.
pub const COLLECTIONS: [&str; 13] = [
    "companies",
    "groups",
    "users",
    "connections",
    "progress",
    "modules",
    "episodes",
    "exercises",
    "trainings",
    "surveys",
    "translations",
    "answers",
    "threads",
];

/// Source of raw collection documents.
pub trait SnapshotProvider {
    /// Human-readable identity of the source, for logs and reports.
    fn describe(&self) -> String;

    /// All documents of one collection. An absent collection yields an
    /// empty vector; only unreadable or unparseable sources are errors.
    fn fetch(&self, collection: &str) -> Result<Vec<serde_json::Value>>;

    /// Collection names the source can serve.
    fn collections(&self) -> Result<Vec<String>>;

    /// Distinct scalar values of one top-level field, sorted. Documents
    /// without the field, and non-scalar values, are skipped. Backs the
    /// selector lists (company names, group names) a front end offers.
    fn list_values(&self, collection: &str, field: &str) -> Result<Vec<String>> {
        let values: std::collections::BTreeSet<String> = self
            .fetch(collection)?
            .iter()
            .filter_map(|doc| match doc.get(field) {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
                _ => None,
            })
            .collect();
        Ok(values.into_iter().collect())
    }
}

/// A fetch-once, typed copy of the collections a reporting run works on.
///
/// Every engine call against the same snapshot sees the same data, so a
/// metric computed twice comes back identical even while the platform
/// keeps writing underneath.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Unique id of this load, new on every call to [`Snapshot::load`].
    pub id: String,
    /// SHA-256 over the raw documents; equal data yields an equal print.
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
    pub source: String,

    pub companies: Vec<Company>,
    pub groups: Vec<Group>,
    pub users: Vec<User>,
    pub connections: Vec<Connection>,
    pub progress: Vec<ProgressRecord>,
    pub modules: Vec<Module>,
    pub episodes: Vec<Episode>,
    pub exercises: Vec<Exercise>,
    pub trainings: Vec<Training>,
    pub surveys: Vec<Survey>,
    pub translations: Vec<Translation>,
    pub answers: Vec<Answer>,
    pub threads: Vec<CoachThread>,

    /// One entry per document skipped during decoding.
    pub warnings: Vec<String>,
}

impl Snapshot {
    /// Fetch and decode every collection from the provider.
    pub fn load(provider: &dyn SnapshotProvider) -> Result<Self> {
        let source = provider.describe();
        tracing::info!(source = %source, "Loading snapshot");

        let mut hasher = Sha256::new();
        let mut warnings = Vec::new();

        let companies = load_table(provider, "companies", &mut hasher, &mut warnings)?;
        let groups = load_table(provider, "groups", &mut hasher, &mut warnings)?;
        let users = load_table(provider, "users", &mut hasher, &mut warnings)?;
        let connections = load_table(provider, "connections", &mut hasher, &mut warnings)?;
        let progress = load_table(provider, "progress", &mut hasher, &mut warnings)?;
        let modules = load_table(provider, "modules", &mut hasher, &mut warnings)?;
        let episodes = load_table(provider, "episodes", &mut hasher, &mut warnings)?;
        let exercises = load_table(provider, "exercises", &mut hasher, &mut warnings)?;
        let trainings = load_table(provider, "trainings", &mut hasher, &mut warnings)?;
        let surveys = load_table(provider, "surveys", &mut hasher, &mut warnings)?;
        let translations = load_table(provider, "translations", &mut hasher, &mut warnings)?;
        let answers = load_table(provider, "answers", &mut hasher, &mut warnings)?;
        let threads = load_table(provider, "threads", &mut hasher, &mut warnings)?;

        let snapshot = Snapshot {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprint: hex::encode(hasher.finalize()),
            loaded_at: Utc::now(),
            source,
            companies,
            groups,
            users,
            connections,
            progress,
            modules,
            episodes,
            exercises,
            trainings,
            surveys,
            translations,
            answers,
            threads,
            warnings,
        };

        tracing::info!(
            snapshot_id = %snapshot.id,
            fingerprint = %snapshot.fingerprint,
            users = snapshot.users.len(),
            connections = snapshot.connections.len(),
            answers = snapshot.answers.len(),
            warnings = snapshot.warnings.len(),
            "Snapshot loaded"
        );

        Ok(snapshot)
    }

    /// Company names present in the snapshot, sorted.
    pub fn company_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.companies.iter().map(|c| c.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Group names of one company, sorted. Unknown companies yield nothing.
    pub fn group_names_for(&self, company_name: &str) -> Vec<String> {
        let company_ids: Vec<&str> = self
            .companies
            .iter()
            .filter(|c| c.name == company_name)
            .map(|c| c.id.as_str())
            .collect();

        let mut names: Vec<String> = self
            .groups
            .iter()
            .filter(|g| {
                g.company_id
                    .as_deref()
                    .map(|id| company_ids.contains(&id))
                    .unwrap_or(false)
            })
            .map(|g| g.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Row count per collection, in load order.
    pub fn table_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("companies", self.companies.len()),
            ("groups", self.groups.len()),
            ("users", self.users.len()),
            ("connections", self.connections.len()),
            ("progress", self.progress.len()),
            ("modules", self.modules.len()),
            ("episodes", self.episodes.len()),
            ("exercises", self.exercises.len()),
            ("trainings", self.trainings.len()),
            ("surveys", self.surveys.len()),
            ("translations", self.translations.len()),
            ("answers", self.answers.len()),
            ("threads", self.threads.len()),
        ]
    }
}

/// Fetch one collection and decode its documents, folding the raw bytes
/// into the snapshot fingerprint. Undecodable documents are skipped with
/// a warning so one malformed record cannot sink a whole report.
fn load_table<T: DeserializeOwned>(
    provider: &dyn SnapshotProvider,
    collection: &str,
    hasher: &mut Sha256,
    warnings: &mut Vec<String>,
) -> Result<Vec<T>> {
    let raw = provider.fetch(collection)?;

    hasher.update(collection.as_bytes());
    let mut rows = Vec::with_capacity(raw.len());

    for (index, value) in raw.into_iter().enumerate() {
        hasher.update(serde_json::to_string(&value)?.as_bytes());

        match serde_json::from_value::<T>(value) {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::warn!(
                    collection = collection,
                    index = index,
                    error = %e,
                    "Skipping undecodable document"
                );
                warnings.push(format!("{}[{}]: {}", collection, index, e));
            }
        }
    }

    tracing::debug!(collection = collection, rows = rows.len(), "Loaded table");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider_with_orgs() -> StaticProvider {
        StaticProvider::new()
            .with(
                "companies",
                vec![
                    json!({"_id": "c2", "name": "Beta SL"}),
                    json!({"_id": "c1", "name": "Acme"}),
                ],
            )
            .with(
                "groups",
                vec![
                    json!({"_id": "g1", "name": "Gerentes", "company": "c1"}),
                    json!({"_id": "g2", "name": "Equipo A", "company": "c1"}),
                    json!({"_id": "g3", "name": "Equipo B", "company": "c2"}),
                ],
            )
            .with(
                "users",
                vec![json!({"_id": "u1", "email": "x@acme.es", "group": "g1", "company": "c1"})],
            )
    }

    #[test]
    fn load_types_all_tables() {
        let snapshot = Snapshot::load(&provider_with_orgs()).unwrap();
        assert_eq!(snapshot.companies.len(), 2);
        assert_eq!(snapshot.groups.len(), 3);
        assert_eq!(snapshot.users.len(), 1);
        assert!(snapshot.connections.is_empty());
        assert!(snapshot.warnings.is_empty());
        assert!(!snapshot.id.is_empty());
    }

    #[test]
    fn undecodable_document_is_skipped_with_warning() {
        let provider = StaticProvider::new().with(
            "users",
            vec![
                json!({"_id": "u1"}),
                json!({"email": "no-id@x.es"}),
                json!({"_id": "u2"}),
            ],
        );

        let snapshot = Snapshot::load(&provider).unwrap();
        assert_eq!(snapshot.users.len(), 2);
        assert_eq!(snapshot.warnings.len(), 1);
        assert!(snapshot.warnings[0].starts_with("users[1]"));
    }

    #[test]
    fn fingerprint_tracks_data_not_load_time() {
        let provider = provider_with_orgs();
        let a = Snapshot::load(&provider).unwrap();
        let b = Snapshot::load(&provider).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.id, b.id);

        let changed = provider_with_orgs().with("users", vec![json!({"_id": "u9"})]);
        let c = Snapshot::load(&changed).unwrap();
        assert_ne!(a.fingerprint, c.fingerprint);
    }

    #[test]
    fn company_and_group_listings_are_sorted() {
        let snapshot = Snapshot::load(&provider_with_orgs()).unwrap();
        assert_eq!(snapshot.company_names(), vec!["Acme", "Beta SL"]);
        assert_eq!(snapshot.group_names_for("Acme"), vec!["Equipo A", "Gerentes"]);
        assert!(snapshot.group_names_for("Nadie").is_empty());
    }

    #[test]
    fn list_values_returns_distinct_scalars_sorted() {
        let provider = StaticProvider::new().with(
            "companies",
            vec![
                json!({"_id": {"$oid": "c1"}, "name": "Beta SL"}),
                json!({"_id": {"$oid": "c2"}, "name": "Acme"}),
                json!({"_id": {"$oid": "c3"}, "name": "Acme"}),
                json!({"_id": {"$oid": "c4"}}),
            ],
        );

        assert_eq!(
            provider.list_values("companies", "name").unwrap(),
            vec!["Acme", "Beta SL"]
        );
        // Extended-JSON ids are objects, not scalars.
        assert!(provider.list_values("companies", "_id").unwrap().is_empty());
        assert!(provider.list_values("missing", "name").unwrap().is_empty());
    }
}
