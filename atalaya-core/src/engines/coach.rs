//! Coach conversation metrics.
//!
//! Threads join to the user directory to pick up organization labels, demo
//! companies are dropped, and the remainder is summarized two ways: users
//! the coach reached (any thread) and users who replied (at least one user
//! message), both grouped by company and group. Replying users also
//! contribute a per-message detail table.

use crate::engines::ReportFilter;
use crate::normalize::{ExclusionPolicy, NormalizedTables, UserDirectory};
use crate::types::MessageRole;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Thread count of one company/group bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoachGroupCount {
    pub company_name: String,
    pub group_name: String,
    pub count: i64,
}

/// One coach conversation message, with the labels of the user it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoachMessageRow {
    pub company_name: Option<String>,
    pub group_name: Option<String>,
    pub user_name: String,
    pub email: String,
    pub date: Option<DateTime<Utc>>,
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoachReport {
    pub reached: Vec<CoachGroupCount>,
    pub responded: Vec<CoachGroupCount>,
    pub messages: Vec<CoachMessageRow>,
}

pub fn compute(
    tables: &NormalizedTables,
    directory: &UserDirectory,
    policy: &ExclusionPolicy,
    filter: &ReportFilter,
) -> CoachReport {
    let mut reached: BTreeMap<(String, String), i64> = BTreeMap::new();
    let mut responded: BTreeMap<(String, String), i64> = BTreeMap::new();
    let mut messages = Vec::new();

    for thread in &tables.threads {
        // Threads of users outside the directory carry no labels to report on.
        let Some(entry) = directory.get(&thread.user_id) else {
            continue;
        };
        let company = entry.company_name.as_deref().map(str::trim);
        let group = entry.group_name.as_deref().map(str::trim);

        if company.is_some_and(|c| policy.is_coach_company_excluded(c)) {
            continue;
        }
        if !filter.matches(company, group) {
            continue;
        }

        // Group counts need both labels; unlabeled threads only feed the
        // message detail.
        if let (Some(company), Some(group)) = (company, group) {
            let key = (company.to_string(), group.to_string());
            // The cutoff keeps every thread, since the count is never
            // negative. Whether ">0" was meant is an open product question;
            // until someone answers it, the shipped rule stands.
            if thread.assistant_messages >= 0 {
                *reached.entry(key.clone()).or_insert(0) += 1;
            }
            if thread.user_messages > 0 {
                *responded.entry(key).or_insert(0) += 1;
            }
        }

        if thread.user_messages > 0 {
            for message in &thread.messages {
                messages.push(CoachMessageRow {
                    company_name: company.map(str::to_string),
                    group_name: group.map(str::to_string),
                    user_name: entry.full_name(),
                    email: entry.email.clone(),
                    date: message.date,
                    role: message.role,
                    content: message.content.clone(),
                });
            }
        }
    }

    let report = CoachReport {
        reached: into_counts(reached),
        responded: into_counts(responded),
        messages,
    };
    debug!(
        reached = report.reached.len(),
        responded = report.responded.len(),
        messages = report.messages.len(),
        "Computed coach report"
    );
    report
}

fn into_counts(buckets: BTreeMap<(String, String), i64>) -> Vec<CoachGroupCount> {
    buckets
        .into_iter()
        .map(|((company_name, group_name), count)| CoachGroupCount {
            company_name,
            group_name,
            count,
        })
        .collect()
}

/// Distinct users who unlocked the coach and connected after `since`
/// (exclusive, measured from midnight). This is the funnel entry count the
/// coach adoption reports start from; demo companies stay in on purpose.
pub fn count_unlocked_active_users(
    tables: &NormalizedTables,
    directory: &UserDirectory,
    filter: &ReportFilter,
    since: NaiveDate,
) -> i64 {
    let cutoff = Utc.from_utc_datetime(&since.and_time(NaiveTime::MIN));

    let mut recent: HashSet<&str> = HashSet::new();
    for connection in &tables.connections {
        if connection.start_date.is_some_and(|start| start > cutoff) {
            recent.insert(connection.user_id.as_str());
        }
    }

    directory
        .entries()
        .iter()
        .filter(|entry| {
            entry.has_unlocked_coach
                && recent.contains(entry.user_id.as_str())
                && filter.matches(
                    entry.company_name.as_deref().map(str::trim),
                    entry.group_name.as_deref().map(str::trim),
                )
        })
        .count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parse_datetime, Company, Connection, CoachThread, Group, ThreadMessage, User};

    fn user(id: &str, group_id: &str, company_id: &str, unlocked: bool) -> User {
        User {
            id: id.to_string(),
            email: format!("{}@test.es", id),
            first_name: "Nombre".to_string(),
            last_name: id.to_uppercase(),
            group_id: Some(group_id.to_string()),
            company_id: Some(company_id.to_string()),
            has_unlocked_coach: unlocked,
        }
    }

    fn message(role: MessageRole, content: &str, date: &str) -> ThreadMessage {
        ThreadMessage {
            role,
            content: content.to_string(),
            date: Some(parse_datetime(date).unwrap()),
        }
    }

    fn thread(id: &str, user_id: &str, replies: i64, messages: Vec<ThreadMessage>) -> CoachThread {
        CoachThread {
            id: id.to_string(),
            user_id: user_id.to_string(),
            assistant_messages: 1,
            user_messages: replies,
            messages,
        }
    }

    fn tables(threads: Vec<CoachThread>, connections: Vec<Connection>) -> NormalizedTables {
        NormalizedTables {
            companies: vec![
                Company {
                    id: "c1".to_string(),
                    name: "Acme".to_string(),
                },
                Company {
                    id: "c2".to_string(),
                    name: "Beta SL".to_string(),
                },
                Company {
                    id: "c3".to_string(),
                    name: "Demos Clientes".to_string(),
                },
            ],
            groups: vec![
                Group {
                    id: "g1".to_string(),
                    name: "Equipo A".to_string(),
                    company_id: Some("c1".to_string()),
                },
                Group {
                    id: "g2".to_string(),
                    name: "Equipo B".to_string(),
                    company_id: Some("c2".to_string()),
                },
                Group {
                    id: "g3".to_string(),
                    name: "Demo".to_string(),
                    company_id: Some("c3".to_string()),
                },
            ],
            users: vec![
                user("u1", "g1", "c1", true),
                user("u2", "g2", "c2", true),
                user("u3", "g3", "c3", true),
            ],
            connections,
            progress: vec![],
            answers: vec![],
            threads,
            modules: vec![],
            episodes: vec![],
            exercises: vec![],
            trainings: vec![],
            surveys: vec![],
            translations: vec![],
        }
    }

    fn report(tables: &NormalizedTables) -> CoachReport {
        let directory = UserDirectory::build(tables);
        compute(
            tables,
            &directory,
            &ExclusionPolicy::default(),
            &ReportFilter::default(),
        )
    }

    #[test]
    fn reached_counts_every_thread_and_responded_needs_replies() {
        let tables = tables(
            vec![
                thread("t1", "u1", 0, vec![]),
                thread(
                    "t2",
                    "u2",
                    2,
                    vec![message(MessageRole::User, "hola", "2025-03-01 09:00:00")],
                ),
            ],
            vec![],
        );
        let report = report(&tables);

        assert_eq!(report.reached.len(), 2);
        assert_eq!(report.reached[0].company_name, "Acme");
        assert_eq!(report.reached[0].count, 1);

        assert_eq!(report.responded.len(), 1);
        assert_eq!(report.responded[0].company_name, "Beta SL");
        assert_eq!(report.responded[0].group_name, "Equipo B");
        assert_eq!(report.responded[0].count, 1);
    }

    #[test]
    fn demo_companies_stay_out_of_coach_reports() {
        let tables = tables(vec![thread("t1", "u3", 3, vec![])], vec![]);
        let report = report(&tables);

        assert!(report.reached.is_empty());
        assert!(report.responded.is_empty());
        assert!(report.messages.is_empty());
    }

    #[test]
    fn threads_of_unknown_users_are_skipped() {
        let tables = tables(vec![thread("t1", "ghost", 5, vec![])], vec![]);
        let report = report(&tables);
        assert!(report.reached.is_empty());
        assert!(report.messages.is_empty());
    }

    #[test]
    fn message_detail_keeps_thread_order_and_labels() {
        let tables = tables(
            vec![thread(
                "t1",
                "u1",
                1,
                vec![
                    message(MessageRole::Assistant, "¿Qué tal la semana?", "2025-03-01 09:00:00"),
                    message(MessageRole::User, "Bien, avanzando", "2025-03-01 09:05:00"),
                ],
            )],
            vec![],
        );
        let report = report(&tables);

        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[0].role, MessageRole::Assistant);
        assert_eq!(report.messages[1].role, MessageRole::User);
        assert_eq!(report.messages[1].user_name, "Nombre U1");
        assert_eq!(report.messages[1].email, "u1@test.es");
        assert_eq!(report.messages[1].company_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn funnel_counts_distinct_recent_unlocked_users() {
        let since = NaiveDate::from_ymd_opt(2025, 2, 28).unwrap();
        let tables = tables(
            vec![],
            vec![
                Connection {
                    id: "cx1".to_string(),
                    user_id: "u1".to_string(),
                    start_date: Some(parse_datetime("2025-03-01 10:00:00").unwrap()),
                    end_date: None,
                    duration_minutes: None,
                },
                Connection {
                    id: "cx2".to_string(),
                    user_id: "u1".to_string(),
                    start_date: Some(parse_datetime("2025-03-05 10:00:00").unwrap()),
                    end_date: None,
                    duration_minutes: None,
                },
                // Midnight of the threshold day itself does not qualify.
                Connection {
                    id: "cx3".to_string(),
                    user_id: "u2".to_string(),
                    start_date: Some(parse_datetime("2025-02-28 00:00:00").unwrap()),
                    end_date: None,
                    duration_minutes: None,
                },
            ],
        );
        let directory = UserDirectory::build(&tables);

        let count =
            count_unlocked_active_users(&tables, &directory, &ReportFilter::default(), since);
        assert_eq!(count, 1);
    }

    #[test]
    fn funnel_keeps_demo_companies() {
        let since = NaiveDate::from_ymd_opt(2025, 2, 28).unwrap();
        let tables = tables(
            vec![],
            vec![Connection {
                id: "cx1".to_string(),
                user_id: "u3".to_string(),
                start_date: Some(parse_datetime("2025-03-01 10:00:00").unwrap()),
                end_date: None,
                duration_minutes: None,
            }],
        );
        let directory = UserDirectory::build(&tables);

        let count =
            count_unlocked_active_users(&tables, &directory, &ReportFilter::default(), since);
        assert_eq!(count, 1);
    }

    #[test]
    fn bucket_keys_are_trimmed() {
        let mut tables = tables(vec![thread("t1", "u1", 0, vec![])], vec![]);
        tables.companies[0].name = "  Acme  ".to_string();

        let directory = UserDirectory::build(&tables);
        let filter = ReportFilter::from_raw(Some("Acme"), None);
        let report = compute(&tables, &directory, &ExclusionPolicy::default(), &filter);

        assert_eq!(report.reached.len(), 1);
        assert_eq!(report.reached[0].company_name, "Acme");
    }
}
