//! Metric engines.
//!
//! Each engine is a pure function from normalized tables to a typed report:
//! no I/O, no shared state, same input same output. The exclusion policy
//! has already been applied by [`crate::normalize::NormalizedTables`], so
//! nothing computed here can leak an excluded account.

pub mod coach;
pub mod connections;
pub mod progress;
pub mod recurrence;
pub mod trainings;

/// The reports this crate can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Recurrence,
    Connections,
    Trainings,
    Coach,
    Progress,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Recurrence,
        MetricKind::Connections,
        MetricKind::Trainings,
        MetricKind::Coach,
        MetricKind::Progress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Recurrence => "recurrence",
            MetricKind::Connections => "connections",
            MetricKind::Trainings => "trainings",
            MetricKind::Coach => "coach",
            MetricKind::Progress => "progress",
        }
    }

    /// Section title used when printing reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            MetricKind::Recurrence => "Recurrencia",
            MetricKind::Connections => "Conexiones",
            MetricKind::Trainings => "Entrenamientos",
            MetricKind::Coach => "Coach",
            MetricKind::Progress => "Avance",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recurrence" => Ok(MetricKind::Recurrence),
            "connections" => Ok(MetricKind::Connections),
            "trainings" => Ok(MetricKind::Trainings),
            "coach" => Ok(MetricKind::Coach),
            "progress" => Ok(MetricKind::Progress),
            _ => Err(format!("unknown metric: {}", s)),
        }
    }
}

/// Company/group scoping shared by every engine.
///
/// Built from raw dashboard input with [`ReportFilter::from_raw`]: values
/// are trimmed, and the `todas`/`todos` sentinels the selector widgets emit
/// mean "no filter".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub company: Option<String>,
    pub group: Option<String>,
}

impl ReportFilter {
    pub fn from_raw(company: Option<&str>, group: Option<&str>) -> Self {
        Self {
            company: normalize_selector(company, "todas"),
            group: normalize_selector(group, "todos"),
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.company.is_none() && self.group.is_none()
    }

    /// Does a row with these labels pass the filter? A missing label never
    /// matches an active filter.
    pub fn matches(&self, company: Option<&str>, group: Option<&str>) -> bool {
        if let Some(want) = self.company.as_deref() {
            if company != Some(want) {
                return false;
            }
        }
        if let Some(want) = self.group.as_deref() {
            if group != Some(want) {
                return false;
            }
        }
        true
    }
}

fn normalize_selector(value: Option<&str>, all_sentinel: &str) -> Option<String> {
    let value = value?.trim();
    // Selector widgets emit "Todas"/"Todos", scripts pass them lowercased.
    if value.is_empty() || value.eq_ignore_ascii_case(all_sentinel) {
        None
    } else {
        Some(value.to_string())
    }
}

/// Percentage of `count` over `denominator`, rounded to an integer.
/// Undefined (empty cell) when the denominator is not positive.
pub(crate) fn pct(count: f64, denominator: i64) -> Option<i64> {
    if denominator <= 0 {
        None
    } else {
        Some((100.0 * count / denominator as f64).round() as i64)
    }
}

/// Free-text answers shorter than eight characters are filler ("ok", "no",
/// "-", "asdf") and do not count as real responses.
pub(crate) fn is_valid_text(input: &str) -> bool {
    input.chars().count() > 7
}

/// Rounded mean, undefined over an empty sequence.
pub(crate) fn mean_rounded(values: impl Iterator<Item = i64>) -> Option<i64> {
    let mut sum = 0i64;
    let mut count = 0i64;
    for value in values {
        sum += value;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some((sum as f64 / count as f64).round() as i64)
    }
}

/// Sort key placing present labels first, in order, and missing ones last.
pub(crate) fn opt_key(value: &Option<String>) -> (bool, &str) {
    match value {
        Some(s) => (false, s.as_str()),
        None => (true, ""),
    }
}
