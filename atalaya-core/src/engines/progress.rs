//! Exercise completion per user and module.
//!
//! The denominator is the released catalog: exercises that appear in at
//! least one episode whose start date has passed (or that has none) and
//! that no released exercise supersedes. Completion marks are counted
//! against that set only, so drafts and retired content never move the
//! percentages.

use crate::catalog::Catalog;
use crate::engines::{opt_key, ReportFilter};
use crate::normalize::{NormalizedTables, UserDirectory};
use crate::types::ProgressKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProgressOptions {
    /// Emit a row for every selected user and module, zero-filled where no
    /// exercise was completed.
    pub include_zero_progress: bool,
    /// Episodes starting after this instant keep their exercises out of the
    /// denominators.
    pub as_of: DateTime<Utc>,
}

impl Default for ProgressOptions {
    fn default() -> Self {
        Self {
            include_zero_progress: false,
            as_of: Utc::now(),
        }
    }
}

/// Completion of one module by one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserModuleProgress {
    pub company_name: Option<String>,
    pub group_name: Option<String>,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub module_name: Option<String>,
    /// `None` when the module has no released exercises to count against.
    pub percent: Option<f64>,
    pub completed: i64,
    pub total: i64,
}

/// How many completion marks one exercise collected, for the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseCompletion {
    pub module_id: String,
    pub module_name: Option<String>,
    pub exercise_id: String,
    pub exercise_name: String,
    pub exercise_label: Option<String>,
    pub completions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub rows: Vec<UserModuleProgress>,
    pub leaderboard: Vec<ExerciseCompletion>,
}

pub fn compute(
    tables: &NormalizedTables,
    directory: &UserDirectory,
    catalog: &Catalog,
    filter: &ReportFilter,
    options: &ProgressOptions,
) -> ProgressReport {
    let released_episodes: HashSet<&str> = tables
        .episodes
        .iter()
        .filter(|e| e.start_date.map_or(true, |start| start <= options.as_of))
        .map(|e| e.id.as_str())
        .collect();

    let released: Vec<_> = tables
        .exercises
        .iter()
        .filter(|ex| {
            ex.episode_ids
                .iter()
                .any(|id| released_episodes.contains(id.as_str()))
        })
        .collect();

    // An exercise replaced by a released one is retired content.
    let superseded: HashSet<&str> = released
        .iter()
        .filter_map(|ex| ex.replaces.as_deref())
        .collect();

    // Deduplicated (exercise, module) pairs. An exercise released through
    // several episodes still counts once per module.
    let mut exercise_modules: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    let mut totals: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
    for exercise in released
        .iter()
        .filter(|ex| !superseded.contains(ex.id.as_str()))
    {
        for module_id in &exercise.module_ids {
            exercise_modules
                .entry(exercise.id.as_str())
                .or_default()
                .insert(module_id.as_str());
            totals
                .entry(module_id.as_str())
                .or_default()
                .insert(exercise.id.as_str());
        }
    }
    let totals: BTreeMap<&str, i64> = totals
        .into_iter()
        .map(|(module, exercises)| (module, exercises.len() as i64))
        .collect();

    let module_names: HashMap<&str, &str> = tables
        .modules
        .iter()
        .map(|m| (m.id.as_str(), m.named_id.as_str()))
        .collect();
    let exercise_names: HashMap<&str, &str> = tables
        .exercises
        .iter()
        .map(|ex| (ex.id.as_str(), ex.named_id.as_str()))
        .collect();

    let selected: Vec<_> = directory
        .entries()
        .iter()
        .filter(|entry| {
            filter.matches(
                entry.company_name.as_deref(),
                entry.group_name.as_deref(),
            )
        })
        .collect();
    let selected_ids: HashSet<&str> = selected.iter().map(|e| e.user_id.as_str()).collect();

    let mut completed: HashMap<(&str, &str), HashSet<&str>> = HashMap::new();
    let mut leaderboard_counts: BTreeMap<(&str, &str), i64> = BTreeMap::new();
    for record in &tables.progress {
        if record.kind != ProgressKind::Exercise || !record.completed {
            continue;
        }
        let Some(exercise_id) = record.exercise_id.as_deref() else {
            continue;
        };
        let Some(modules) = exercise_modules.get(exercise_id) else {
            continue;
        };
        for module_id in modules {
            completed
                .entry((record.user_id.as_str(), module_id))
                .or_default()
                .insert(exercise_id);
        }
        if selected_ids.contains(record.user_id.as_str()) {
            for module_id in modules {
                *leaderboard_counts
                    .entry((module_id, exercise_id))
                    .or_insert(0) += 1;
            }
        }
    }

    let mut rows = Vec::new();
    if options.include_zero_progress {
        for entry in &selected {
            for (&module_id, &total) in &totals {
                let done = completed
                    .get(&(entry.user_id.as_str(), module_id))
                    .map_or(0, |set| set.len() as i64);
                rows.push(progress_row(entry, module_id, done, total, &module_names));
            }
        }
    } else {
        for (&(user_id, module_id), exercises) in &completed {
            if !selected_ids.contains(user_id) {
                continue;
            }
            let Some(entry) = directory.get(user_id) else {
                continue;
            };
            let total = totals.get(module_id).copied().unwrap_or(0);
            rows.push(progress_row(
                entry,
                module_id,
                exercises.len() as i64,
                total,
                &module_names,
            ));
        }
    }
    rows.sort_by(|a, b| {
        opt_key(&a.company_name)
            .cmp(&opt_key(&b.company_name))
            .then_with(|| opt_key(&a.group_name).cmp(&opt_key(&b.group_name)))
            .then_with(|| a.user_id.cmp(&b.user_id))
            .then_with(|| opt_key(&a.module_name).cmp(&opt_key(&b.module_name)))
    });

    let mut leaderboard: Vec<ExerciseCompletion> = leaderboard_counts
        .into_iter()
        .map(|((module_id, exercise_id), completions)| {
            let exercise_name = exercise_names
                .get(exercise_id)
                .copied()
                .unwrap_or_default()
                .to_string();
            ExerciseCompletion {
                module_id: module_id.to_string(),
                module_name: module_names.get(module_id).map(|&n| n.to_string()),
                exercise_id: exercise_id.to_string(),
                exercise_label: catalog.exercise_label(&exercise_name).map(String::from),
                exercise_name,
                completions,
            }
        })
        .collect();
    leaderboard.sort_by(|a, b| {
        opt_key(&a.module_name)
            .cmp(&opt_key(&b.module_name))
            .then_with(|| b.completions.cmp(&a.completions))
            .then_with(|| a.exercise_id.cmp(&b.exercise_id))
    });

    debug!(
        rows = rows.len(),
        leaderboard = leaderboard.len(),
        zero_rows = options.include_zero_progress,
        "Computed progress report"
    );
    ProgressReport { rows, leaderboard }
}

fn progress_row(
    entry: &crate::normalize::DirectoryEntry,
    module_id: &str,
    completed: i64,
    total: i64,
    module_names: &HashMap<&str, &str>,
) -> UserModuleProgress {
    // A zero denominator is undefined, not 0%.
    let percent = (total > 0).then(|| completed as f64 / total as f64 * 100.0);
    UserModuleProgress {
        company_name: entry.company_name.clone(),
        group_name: entry.group_name.clone(),
        user_id: entry.user_id.clone(),
        first_name: entry.first_name.clone(),
        last_name: entry.last_name.clone(),
        module_name: module_names.get(module_id).map(|&n| n.to_string()),
        percent,
        completed,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        parse_datetime, Company, Episode, Exercise, Group, Module, ProgressRecord, User,
    };

    fn user(id: &str, group_id: &str, company_id: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{}@test.es", id),
            first_name: "Nombre".to_string(),
            last_name: id.to_uppercase(),
            group_id: Some(group_id.to_string()),
            company_id: Some(company_id.to_string()),
            has_unlocked_coach: false,
        }
    }

    fn episode(id: &str, start: Option<&str>) -> Episode {
        Episode {
            id: id.to_string(),
            named_id: format!("ep-{}", id),
            start_date: start.map(|s| parse_datetime(s).unwrap()),
        }
    }

    fn exercise(id: &str, named_id: &str, modules: &[&str], episodes: &[&str]) -> Exercise {
        Exercise {
            id: id.to_string(),
            named_id: named_id.to_string(),
            module_ids: modules.iter().map(|m| m.to_string()).collect(),
            episode_ids: episodes.iter().map(|e| e.to_string()).collect(),
            replaces: None,
        }
    }

    fn mark(id: &str, user_id: &str, exercise_id: &str, completed: bool) -> ProgressRecord {
        ProgressRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            kind: ProgressKind::Exercise,
            completed,
            is_viewed: true,
            completion_date: None,
            created_at: None,
            updated_at: None,
            training_named_id: None,
            exercise_id: Some(exercise_id.to_string()),
            module_ids: Vec::new(),
        }
    }

    fn tables() -> NormalizedTables {
        NormalizedTables {
            companies: vec![Company {
                id: "c1".to_string(),
                name: "Acme".to_string(),
            }],
            groups: vec![Group {
                id: "g1".to_string(),
                name: "Equipo A".to_string(),
                company_id: Some("c1".to_string()),
            }],
            users: vec![user("u1", "g1", "c1"), user("u2", "g1", "c1")],
            connections: vec![],
            progress: vec![],
            answers: vec![],
            threads: vec![],
            modules: vec![
                Module {
                    id: "m1".to_string(),
                    named_id: "modulo-uno".to_string(),
                },
                Module {
                    id: "m2".to_string(),
                    named_id: "modulo-dos".to_string(),
                },
            ],
            episodes: vec![
                episode("e1", Some("2025-01-01 00:00:00")),
                episode("e2", None),
                episode("e3", Some("2030-01-01 00:00:00")),
            ],
            exercises: vec![
                exercise("x1", "mapa-relaciones", &["m1"], &["e1"]),
                exercise("x2", "conoce-ego", &["m1"], &["e2"]),
                exercise("x3", "feedback", &["m2"], &["e1", "e2"]),
            ],
            trainings: vec![],
            surveys: vec![],
            translations: vec![],
        }
    }

    fn options() -> ProgressOptions {
        ProgressOptions {
            include_zero_progress: false,
            as_of: parse_datetime("2025-06-01 00:00:00").unwrap(),
        }
    }

    fn run(tables: &NormalizedTables, options: &ProgressOptions) -> ProgressReport {
        let directory = UserDirectory::build(tables);
        let catalog = Catalog::embedded().unwrap();
        compute(tables, &directory, &catalog, &ReportFilter::default(), options)
    }

    #[test]
    fn percentages_use_released_exercises_only() {
        let mut tables = tables();
        // x4 sits only in a future episode; it must not join the totals.
        tables
            .exercises
            .push(exercise("x4", "cultura-feedback", &["m1"], &["e3"]));
        tables.progress = vec![mark("p1", "u1", "x1", true)];

        let report = run(&tables, &options());
        assert_eq!(report.rows.len(), 1);
        let row = &report.rows[0];
        assert_eq!(row.module_name.as_deref(), Some("modulo-uno"));
        assert_eq!(row.completed, 1);
        assert_eq!(row.total, 2);
        assert_eq!(row.percent, Some(50.0));
    }

    #[test]
    fn superseded_exercises_leave_the_denominator() {
        let mut tables = tables();
        tables.exercises[1].replaces = Some("x1".to_string());
        tables.progress = vec![mark("p1", "u1", "x1", true)];

        let report = run(&tables, &options());
        // x1 is retired, so the completion mark no longer lands anywhere.
        assert!(report.rows.is_empty());
        assert!(report.leaderboard.is_empty());
    }

    #[test]
    fn incomplete_marks_do_not_count() {
        let mut tables = tables();
        tables.progress = vec![
            mark("p1", "u1", "x1", true),
            mark("p2", "u1", "x2", false),
        ];

        let report = run(&tables, &options());
        assert_eq!(report.rows[0].completed, 1);
    }

    #[test]
    fn multi_episode_exercises_count_once() {
        let mut tables = tables();
        // x3 is released through e1 and e2; one completion is one completion.
        tables.progress = vec![mark("p1", "u1", "x3", true)];

        let report = run(&tables, &options());
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].completed, 1);
        assert_eq!(report.rows[0].total, 1);
        assert_eq!(report.leaderboard.len(), 1);
        assert_eq!(report.leaderboard[0].completions, 1);
    }

    #[test]
    fn zero_progress_rows_cover_every_user_and_module() {
        let mut tables = tables();
        tables.progress = vec![mark("p1", "u1", "x1", true)];

        let zero_options = ProgressOptions {
            include_zero_progress: true,
            ..options()
        };
        let report = run(&tables, &zero_options);

        // 2 users x 2 modules with released exercises.
        assert_eq!(report.rows.len(), 4);
        let zeros = report
            .rows
            .iter()
            .filter(|r| r.completed == 0 && r.percent == Some(0.0))
            .count();
        assert_eq!(zeros, 3);
    }

    #[test]
    fn leaderboard_sorts_by_module_then_count() {
        let mut tables = tables();
        tables.progress = vec![
            mark("p1", "u1", "x1", true),
            mark("p2", "u2", "x1", true),
            mark("p3", "u1", "x2", true),
            mark("p4", "u2", "x3", true),
        ];

        let report = run(&tables, &options());
        let summary: Vec<(&str, i64)> = report
            .leaderboard
            .iter()
            .map(|e| (e.exercise_name.as_str(), e.completions))
            .collect();
        assert_eq!(
            summary,
            vec![("feedback", 1), ("mapa-relaciones", 2), ("conoce-ego", 1)]
        );
        assert_eq!(
            report.leaderboard[1].exercise_label.as_deref(),
            Some("Mapa de relaciones")
        );
    }

    #[test]
    fn filter_restricts_rows_and_leaderboard() {
        let mut tables = tables();
        tables.companies.push(Company {
            id: "c2".to_string(),
            name: "Beta SL".to_string(),
        });
        tables.groups.push(Group {
            id: "g2".to_string(),
            name: "Equipo B".to_string(),
            company_id: Some("c2".to_string()),
        });
        tables.users.push(user("u3", "g2", "c2"));
        tables.progress = vec![
            mark("p1", "u1", "x1", true),
            mark("p2", "u3", "x1", true),
        ];

        let directory = UserDirectory::build(&tables);
        let catalog = Catalog::embedded().unwrap();
        let filter = ReportFilter::from_raw(Some("Beta SL"), None);
        let report = compute(&tables, &directory, &catalog, &filter, &options());

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].user_id, "u3");
        assert_eq!(report.leaderboard.len(), 1);
        assert_eq!(report.leaderboard[0].completions, 1);
    }
}
