//! Program completion and recurrence.
//!
//! A checkpoint progress record marks the end of one pass through the
//! program. Users with more than one checkpoint finished it at least once
//! and started again; if they also kept connecting after their latest
//! checkpoint, and did so within the active window, they are recurrent.
//! The report buckets the user base by (finished, recurrent) and averages
//! the post-completion engagement of the recurrent segment.

use crate::engines::{mean_rounded, ReportFilter};
use crate::normalize::{NormalizedTables, UserDirectory};
use crate::types::ProgressKind;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RecurrenceOptions {
    /// Users whose last connection falls after this date count as active.
    pub active_after: NaiveDate,
}

impl Default for RecurrenceOptions {
    fn default() -> Self {
        Self {
            active_after: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        }
    }
}

impl From<&crate::config::ReferenceConfig> for RecurrenceOptions {
    fn from(reference: &crate::config::ReferenceConfig) -> Self {
        Self {
            active_after: reference.active_after,
        }
    }
}

/// Per-user recurrence flags and the aggregates behind them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurrenceUser {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub group_name: Option<String>,
    pub company_name: Option<String>,
    /// Number of checkpoint records; missing when the user has none.
    pub checkpoint_count: Option<i64>,
    /// Latest checkpoint completion.
    pub checkpoint_date: Option<DateTime<Utc>>,
    /// Latest connection end.
    pub last_connection: Option<DateTime<Utc>>,
    /// Connections ending strictly after the latest checkpoint.
    pub connection_count: Option<i64>,
    /// Days between the latest checkpoint and the last connection.
    pub days_since_completion: Option<i64>,
    pub is_manager: bool,
    pub is_active: bool,
    pub is_finished: bool,
    pub is_recurrent: bool,
    pub is_recurrent_all_time: bool,
}

/// One (finished, recurrent) bucket of the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurrenceBucket {
    pub finished: bool,
    pub recurrent: bool,
    pub users: i64,
    /// Share of the filtered user base, in percent (unrounded).
    pub percentage: f64,
}

/// Averages over the recurrent segment, rounded to integers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurrenceMeans {
    pub connection_count: Option<i64>,
    pub days_since_completion: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurrenceReport {
    pub users: Vec<RecurrenceUser>,
    pub buckets: Vec<RecurrenceBucket>,
    pub means: RecurrenceMeans,
}

pub fn compute(
    tables: &NormalizedTables,
    directory: &UserDirectory,
    filter: &ReportFilter,
    options: &RecurrenceOptions,
) -> RecurrenceReport {
    // Checkpoint count and latest checkpoint per user.
    let mut checkpoints: HashMap<&str, (i64, Option<DateTime<Utc>>)> = HashMap::new();
    for record in &tables.progress {
        if record.kind != ProgressKind::Checkpoint {
            continue;
        }
        let entry = checkpoints.entry(record.user_id.as_str()).or_insert((0, None));
        entry.0 += 1;
        if let Some(date) = record.completion_date {
            if entry.1.map(|latest| date > latest).unwrap_or(true) {
                entry.1 = Some(date);
            }
        }
    }

    // Last connection end per user, and connections past the checkpoint.
    let mut last_connection: HashMap<&str, DateTime<Utc>> = HashMap::new();
    let mut post_checkpoint: HashMap<&str, i64> = HashMap::new();
    for connection in &tables.connections {
        let Some(end) = connection.end_date else {
            continue;
        };
        let user_id = connection.user_id.as_str();
        last_connection
            .entry(user_id)
            .and_modify(|latest| {
                if end > *latest {
                    *latest = end;
                }
            })
            .or_insert(end);
        if let Some((_, Some(checkpoint_date))) = checkpoints.get(user_id) {
            if end > *checkpoint_date {
                *post_checkpoint.entry(user_id).or_insert(0) += 1;
            }
        }
    }

    let active_cutoff = Utc.from_utc_datetime(&options.active_after.and_time(NaiveTime::MIN));

    let mut users = Vec::new();
    for entry in directory.entries() {
        if !filter.matches(entry.company_name.as_deref(), entry.group_name.as_deref()) {
            continue;
        }

        let (checkpoint_count, checkpoint_date) = checkpoints
            .get(entry.user_id.as_str())
            .map(|(count, date)| (Some(*count), *date))
            .unwrap_or((None, None));
        let last = last_connection.get(entry.user_id.as_str()).copied();
        let connection_count = post_checkpoint.get(entry.user_id.as_str()).copied();
        let days_since_completion = match (last, checkpoint_date) {
            (Some(last), Some(checkpoint)) => Some((last - checkpoint).num_days()),
            _ => None,
        };

        let is_finished = checkpoint_count.map(|c| c > 1).unwrap_or(false);
        let is_active = last.map(|l| l > active_cutoff).unwrap_or(false);
        let recurred = days_since_completion.map(|d| d > 0).unwrap_or(false);
        let is_recurrent = is_active && is_finished && recurred;
        let is_recurrent_all_time = is_finished && recurred;
        let is_manager = entry
            .group_name
            .as_deref()
            .map(|g| g.contains("Gerente"))
            .unwrap_or(false);

        users.push(RecurrenceUser {
            user_id: entry.user_id.clone(),
            email: entry.email.clone(),
            full_name: entry.full_name(),
            group_name: entry.group_name.clone(),
            company_name: entry.company_name.clone(),
            checkpoint_count,
            checkpoint_date,
            last_connection: last,
            connection_count,
            days_since_completion,
            is_manager,
            is_active,
            is_finished,
            is_recurrent,
            is_recurrent_all_time,
        });
    }

    // Bucket counts, ascending over (finished, recurrent); only buckets
    // with users appear.
    let mut counts: BTreeMap<(bool, bool), i64> = BTreeMap::new();
    for user in &users {
        *counts.entry((user.is_finished, user.is_recurrent)).or_insert(0) += 1;
    }
    let total = users.len() as i64;
    let buckets: Vec<RecurrenceBucket> = counts
        .into_iter()
        .map(|((finished, recurrent), count)| RecurrenceBucket {
            finished,
            recurrent,
            users: count,
            percentage: if total > 0 {
                100.0 * count as f64 / total as f64
            } else {
                0.0
            },
        })
        .collect();

    let means = RecurrenceMeans {
        connection_count: mean_rounded(
            users
                .iter()
                .filter(|u| u.is_recurrent)
                .filter_map(|u| u.connection_count),
        ),
        days_since_completion: mean_rounded(
            users
                .iter()
                .filter(|u| u.is_recurrent)
                .filter_map(|u| u.days_since_completion),
        ),
    };

    debug!(
        users = users.len(),
        buckets = buckets.len(),
        "Computed recurrence report"
    );

    RecurrenceReport {
        users,
        buckets,
        means,
    }
}
