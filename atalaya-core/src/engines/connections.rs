//! Connection activity.
//!
//! Projects sessions onto their user's organization labels and derives the
//! aggregate views the dashboard charts: volume, mean duration, duration by
//! company and a Monday-first weekday histogram.

use crate::engines::ReportFilter;
use crate::normalize::{NormalizedTables, UserDirectory};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One session with its organization labels resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRow {
    pub user_id: String,
    pub connection_id: String,
    pub duration_minutes: Option<f64>,
    pub group_name: Option<String>,
    pub company_name: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
}

/// Mean session duration of one company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyDuration {
    pub company_name: String,
    pub mean_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub rows: Vec<ConnectionRow>,
}

impl ConnectionReport {
    /// Count of distinct connection ids. A session exported twice still
    /// counts once.
    pub fn total_connections(&self) -> i64 {
        let ids: HashSet<&str> = self.rows.iter().map(|r| r.connection_id.as_str()).collect();
        ids.len() as i64
    }

    /// Mean duration in minutes over sessions with a recorded duration,
    /// rounded. Zero when no session has one.
    pub fn mean_duration(&self) -> i64 {
        let durations: Vec<f64> = self
            .rows
            .iter()
            .filter_map(|r| r.duration_minutes)
            .collect();
        if durations.is_empty() {
            return 0;
        }
        let sum: f64 = durations.iter().sum();
        (sum / durations.len() as f64).round() as i64
    }

    /// Mean duration per company, longest first. Sessions without a company
    /// label or a recorded duration are left out, and so are companies with
    /// no measured session at all.
    pub fn mean_duration_by_company(&self) -> Vec<CompanyDuration> {
        let mut sums: HashMap<&str, (f64, i64)> = HashMap::new();
        for row in &self.rows {
            let Some(company) = row.company_name.as_deref() else {
                continue;
            };
            let Some(minutes) = row.duration_minutes else {
                continue;
            };
            let entry = sums.entry(company).or_insert((0.0, 0));
            entry.0 += minutes;
            entry.1 += 1;
        }

        let mut means: Vec<CompanyDuration> = sums
            .into_iter()
            .map(|(company, (sum, count))| CompanyDuration {
                company_name: company.to_string(),
                mean_minutes: sum / count as f64,
            })
            .collect();
        means.sort_by(|a, b| {
            b.mean_minutes
                .total_cmp(&a.mean_minutes)
                .then_with(|| a.company_name.cmp(&b.company_name))
        });
        means
    }

    /// Connections per weekday of their start, Monday first. Sessions
    /// without a start date are left out; all seven buckets are always
    /// present.
    pub fn weekday_histogram(&self) -> [i64; 7] {
        let mut buckets = [0i64; 7];
        for row in &self.rows {
            if let Some(start) = row.start_date {
                buckets[start.weekday().num_days_from_monday() as usize] += 1;
            }
        }
        buckets
    }
}

pub fn compute(
    tables: &NormalizedTables,
    directory: &UserDirectory,
    filter: &ReportFilter,
) -> ConnectionReport {
    let mut rows = Vec::new();

    for connection in &tables.connections {
        let entry = directory.get(&connection.user_id);
        let group_name = entry.and_then(|e| e.group_name.clone());
        let company_name = entry.and_then(|e| e.company_name.clone());

        if !filter.matches(company_name.as_deref(), group_name.as_deref()) {
            continue;
        }

        rows.push(ConnectionRow {
            user_id: connection.user_id.clone(),
            connection_id: connection.id.clone(),
            duration_minutes: connection.duration_minutes,
            group_name,
            company_name,
            start_date: connection.start_date,
        });
    }

    debug!(rows = rows.len(), "Computed connection report");
    ConnectionReport { rows }
}
