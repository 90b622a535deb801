//! Exclusion policy and normalized tables.
//!
//! Reports must never show internal accounts: demo companies, pilot groups
//! and the data-entry group operators use for manual QA. Instead of each
//! engine filtering on its own, the exclusion is applied once, here, and
//! every engine works from the normalized tables:
//!
//! - excluded companies are dropped by name,
//! - the reserved data-entry group and every group of an excluded company
//!   are dropped,
//! - users of a dropped company or group leave the authorized set,
//! - connections, progress, answers and coach threads are kept only for
//!   authorized users.
//!
//! Content tables (modules, episodes, exercises, trainings, surveys,
//! translations) carry no user linkage and pass through untouched.

use crate::config::ExclusionConfig;
use crate::snapshot::Snapshot;
use crate::types::{
    Answer, CoachThread, Company, Connection, Episode, Exercise, Group, Module, ProgressRecord,
    Survey, Training, Translation, User,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Which accounts stay out of the reports.
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    companies: HashSet<String>,
    data_entry_group: String,
    coach_companies: HashSet<String>,
}

impl ExclusionPolicy {
    pub fn from_config(config: &ExclusionConfig) -> Self {
        Self {
            companies: trimmed_set(&config.companies),
            data_entry_group: config.data_entry_group.trim().to_string(),
            coach_companies: trimmed_set(&config.coach_companies),
        }
    }

    /// Excluded from every report.
    pub fn is_company_excluded(&self, name: &str) -> bool {
        self.companies.contains(name.trim())
    }

    /// The reserved manual data-entry group.
    pub fn is_group_excluded(&self, name: &str) -> bool {
        !self.data_entry_group.is_empty() && name.trim() == self.data_entry_group
    }

    /// Additionally hidden from coach tables only.
    pub fn is_coach_company_excluded(&self, name: &str) -> bool {
        self.coach_companies.contains(name.trim())
    }
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::from_config(&ExclusionConfig::default())
    }
}

fn trimmed_set(names: &[String]) -> HashSet<String> {
    names.iter().map(|n| n.trim().to_string()).collect()
}

/// Snapshot tables with the exclusion policy applied once.
#[derive(Debug, Clone)]
pub struct NormalizedTables {
    pub companies: Vec<Company>,
    pub groups: Vec<Group>,
    pub users: Vec<User>,
    pub connections: Vec<Connection>,
    pub progress: Vec<ProgressRecord>,
    pub answers: Vec<Answer>,
    pub threads: Vec<CoachThread>,

    pub modules: Vec<Module>,
    pub episodes: Vec<Episode>,
    pub exercises: Vec<Exercise>,
    pub trainings: Vec<Training>,
    pub surveys: Vec<Survey>,
    pub translations: Vec<Translation>,
}

impl NormalizedTables {
    pub fn build(snapshot: &Snapshot, policy: &ExclusionPolicy) -> Self {
        let excluded_company_ids: HashSet<&str> = snapshot
            .companies
            .iter()
            .filter(|c| policy.is_company_excluded(&c.name))
            .map(|c| c.id.as_str())
            .collect();

        let excluded_group_ids: HashSet<&str> = snapshot
            .groups
            .iter()
            .filter(|g| {
                policy.is_group_excluded(&g.name)
                    || g.company_id
                        .as_deref()
                        .map(|id| excluded_company_ids.contains(id))
                        .unwrap_or(false)
            })
            .map(|g| g.id.as_str())
            .collect();

        let companies: Vec<Company> = snapshot
            .companies
            .iter()
            .filter(|c| !excluded_company_ids.contains(c.id.as_str()))
            .cloned()
            .collect();

        let groups: Vec<Group> = snapshot
            .groups
            .iter()
            .filter(|g| !excluded_group_ids.contains(g.id.as_str()))
            .cloned()
            .collect();

        let users: Vec<User> = snapshot
            .users
            .iter()
            .filter(|u| {
                let company_ok = u
                    .company_id
                    .as_deref()
                    .map(|id| !excluded_company_ids.contains(id))
                    .unwrap_or(true);
                let group_ok = u
                    .group_id
                    .as_deref()
                    .map(|id| !excluded_group_ids.contains(id))
                    .unwrap_or(true);
                company_ok && group_ok
            })
            .cloned()
            .collect();

        let authorized: HashSet<&str> = users.iter().map(|u| u.id.as_str()).collect();

        let connections: Vec<Connection> = snapshot
            .connections
            .iter()
            .filter(|c| authorized.contains(c.user_id.as_str()))
            .cloned()
            .collect();
        let progress: Vec<ProgressRecord> = snapshot
            .progress
            .iter()
            .filter(|p| authorized.contains(p.user_id.as_str()))
            .cloned()
            .collect();
        let answers: Vec<Answer> = snapshot
            .answers
            .iter()
            .filter(|a| authorized.contains(a.user_id.as_str()))
            .cloned()
            .collect();
        let threads: Vec<CoachThread> = snapshot
            .threads
            .iter()
            .filter(|t| authorized.contains(t.user_id.as_str()))
            .cloned()
            .collect();

        info!(
            excluded_companies = excluded_company_ids.len(),
            excluded_groups = excluded_group_ids.len(),
            authorized_users = users.len(),
            total_users = snapshot.users.len(),
            "Applied exclusion policy"
        );

        NormalizedTables {
            companies,
            groups,
            users,
            connections,
            progress,
            answers,
            threads,
            modules: snapshot.modules.clone(),
            episodes: snapshot.episodes.clone(),
            exercises: snapshot.exercises.clone(),
            trainings: snapshot.trainings.clone(),
            surveys: snapshot.surveys.clone(),
            translations: snapshot.translations.clone(),
        }
    }
}

/// One authorized user with group and company labels resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub group_name: Option<String>,
    pub company_name: Option<String>,
    pub has_unlocked_coach: bool,
}

impl DirectoryEntry {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Join index from user id to organization labels, O(1) per lookup.
///
/// Lookups are left joins: a user pointing at an unknown group or company
/// keeps empty labels instead of disappearing from the reports.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    entries: Vec<DirectoryEntry>,
    index: HashMap<String, usize>,
}

impl UserDirectory {
    pub fn build(tables: &NormalizedTables) -> Self {
        let group_by_id: HashMap<&str, &Group> =
            tables.groups.iter().map(|g| (g.id.as_str(), g)).collect();
        let company_by_id: HashMap<&str, &Company> = tables
            .companies
            .iter()
            .map(|c| (c.id.as_str(), c))
            .collect();

        let mut entries = Vec::with_capacity(tables.users.len());
        let mut index = HashMap::with_capacity(tables.users.len());

        for user in &tables.users {
            let group_name = match user.group_id.as_deref() {
                Some(id) => match group_by_id.get(id) {
                    Some(g) => Some(g.name.clone()),
                    None => {
                        warn!(user_id = %user.id, group_id = id, "User references unknown group");
                        None
                    }
                },
                None => None,
            };
            let company_name = match user.company_id.as_deref() {
                Some(id) => match company_by_id.get(id) {
                    Some(c) => Some(c.name.clone()),
                    None => {
                        warn!(user_id = %user.id, company_id = id, "User references unknown company");
                        None
                    }
                },
                None => None,
            };

            index.insert(user.id.clone(), entries.len());
            entries.push(DirectoryEntry {
                user_id: user.id.clone(),
                email: user.email.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                group_name,
                company_name,
                has_unlocked_coach: user.has_unlocked_coach,
            });
        }

        debug!(entries = entries.len(), "Built user directory");
        UserDirectory { entries, index }
    }

    pub fn get(&self, user_id: &str) -> Option<&DirectoryEntry> {
        self.index.get(user_id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.index.contains_key(user_id)
    }

    /// Entries in snapshot order.
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
