//! Training engagement and answer quality.
//!
//! One pass over the answers table feeds a per-training summary (completion
//! counts, exit-survey verdicts and free-text response rates) plus the
//! side tables the spreadsheet export ships: wide per-user pivots for
//! action plans, notepads and takeaways, a flat list of suggestions and a
//! per-affirmation check table.
//!
//! Free-text responses count only when they pass the length heuristic in
//! [`is_valid_text`]. Each user contributes the fraction of their fields
//! that were valid; fractions are summed per training and divided by the
//! completion count to yield a percentage.

use crate::catalog::Catalog;
use crate::engines::{is_valid_text, mean_rounded, opt_key, pct};
use crate::normalize::{NormalizedTables, UserDirectory};
use crate::types::{AnswerPayload, ProgressKind, Training};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// One training's row in the engagement summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummaryRow {
    pub module: i64,
    pub order: i64,
    pub training: String,
    pub completed: i64,
    pub available: i64,
    pub completion_pct: Option<i64>,
    pub clear_pct: Option<i64>,
    pub useful_pct: Option<i64>,
    pub suggestions_pct: Option<i64>,
    pub actions_pct: Option<i64>,
    pub notepad_pct: Option<i64>,
    pub check_pct: Option<i64>,
    pub takeaways_pct: Option<i64>,
}

/// Column of a wide per-user table: a training plus an optional prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotColumn {
    pub module: i64,
    pub order: i64,
    pub training: String,
    pub prompt: Option<String>,
}

impl PivotColumn {
    /// Flattened header used in exports.
    pub fn label(&self) -> String {
        match &self.prompt {
            Some(prompt) => format!("{}. {} - {}", self.order, self.training, prompt),
            None => format!("{}. {}", self.order, self.training),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub user_id: String,
    pub company_name: Option<String>,
    pub group_name: Option<String>,
    /// One slot per column, in column order.
    pub values: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub columns: Vec<PivotColumn>,
    pub rows: Vec<PivotRow>,
}

impl PivotTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One valid improvement suggestion from the exit survey.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionRow {
    pub user_id: String,
    pub company_name: Option<String>,
    pub group_name: Option<String>,
    pub module: i64,
    pub order: i64,
    pub training: String,
    pub suggestion: String,
}

/// Check rate of one closing affirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffirmationCheckRow {
    pub module: i64,
    pub order: i64,
    pub training: String,
    pub affirmation: String,
    pub check_pct: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingsReport {
    pub summary: Vec<TrainingSummaryRow>,
    pub actions: PivotTable,
    pub suggestions: Vec<SuggestionRow>,
    pub notepad_single: PivotTable,
    pub notepad_double: PivotTable,
    pub takeaways: PivotTable,
    pub affirmation_checks: Vec<AffirmationCheckRow>,
}

/// Valid-field tally of one user on one training.
#[derive(Debug, Default, Clone, Copy)]
struct ShareTally {
    valid: i64,
    total: i64,
}

type UserShares<'a> = HashMap<(&'a str, &'a str), ShareTally>;

/// Per-training sum of each user's valid-field fraction.
fn sum_shares<'a>(tallies: &UserShares<'a>) -> HashMap<&'a str, f64> {
    let mut sums: HashMap<&str, f64> = HashMap::new();
    for (&(_, named_id), tally) in tallies {
        if tally.total > 0 {
            *sums.entry(named_id).or_insert(0.0) += tally.valid as f64 / tally.total as f64;
        }
    }
    sums
}

/// Cells of a wide table, keyed by (user, training named id, prompt key).
/// The first answer encountered wins; later duplicates are ignored.
type PivotCells<'a> = HashMap<(&'a str, &'a str, String), &'a str>;

struct ColumnDecl<'a> {
    named_id: &'a str,
    key: String,
    module: i64,
    order: i64,
    training: &'a str,
    prompt: Option<String>,
}

/// The module filter narrows the summary; side tables always carry every
/// training so the export stays complete.
pub fn compute(
    tables: &NormalizedTables,
    directory: &UserDirectory,
    catalog: &Catalog,
    module: Option<i64>,
) -> TrainingsReport {
    let texts: HashMap<&str, &str> = tables
        .translations
        .iter()
        .filter_map(|t| t.text("es").map(|text| (t.id.as_str(), text)))
        .collect();
    let trainings_by_id: HashMap<&str, &Training> = tables
        .trainings
        .iter()
        .map(|t| (t.named_id.as_str(), t))
        .collect();
    let elements_by_id: HashMap<&str, _> = tables
        .trainings
        .iter()
        .flat_map(|t| t.elements.iter())
        .map(|e| (e.id.as_str(), e))
        .collect();
    let affirmation_labels: HashMap<&str, &str> = tables
        .trainings
        .iter()
        .flat_map(|t| t.questionnaire.affirmations.iter())
        .filter_map(|a| {
            let label = a.translations.name.as_deref().and_then(|id| texts.get(id).copied())?;
            Some((a.id.as_str(), label))
        })
        .collect();

    // Completion counters per training named id.
    let mut completed_counts: HashMap<&str, i64> = HashMap::new();
    let mut available_counts: HashMap<&str, i64> = HashMap::new();
    for record in &tables.progress {
        if record.kind != ProgressKind::Training {
            continue;
        }
        let Some(named_id) = record.training_named_id.as_deref() else {
            continue;
        };
        *available_counts.entry(named_id).or_insert(0) += 1;
        if record.completed {
            *completed_counts.entry(named_id).or_insert(0) += 1;
        }
    }

    // Exit-survey questions resolve through the first survey definition.
    let mut question_texts: HashMap<&str, &str> = HashMap::new();
    match tables.surveys.first() {
        Some(survey) => {
            for question in &survey.questions {
                if let Some(text) = question
                    .translations
                    .title
                    .as_deref()
                    .and_then(|id| texts.get(id).copied())
                {
                    question_texts.insert(question.id.as_str(), text);
                }
            }
        }
        None => warn!("Snapshot has no survey definition; survey columns stay empty"),
    }

    let mut clear_yes: HashMap<&str, i64> = HashMap::new();
    let mut useful_yes: HashMap<&str, i64> = HashMap::new();
    let mut suggestion_shares: UserShares = HashMap::new();
    let mut suggestion_texts: Vec<(&str, &str, &str)> = Vec::new();
    let mut action_shares: UserShares = HashMap::new();
    let mut action_cells: PivotCells = HashMap::new();
    let mut single_shares: UserShares = HashMap::new();
    let mut single_cells: PivotCells = HashMap::new();
    let mut double_shares: UserShares = HashMap::new();
    let mut double_cells: PivotCells = HashMap::new();
    let mut check_counts: BTreeMap<(&str, &str), i64> = BTreeMap::new();
    let mut takeaway_seen: HashSet<(&str, &str, &str)> = HashSet::new();
    let mut takeaway_entries: Vec<(&str, &str, &str)> = Vec::new();

    for answer in &tables.answers {
        let Some(named_id) = answer.training_named_id.as_deref() else {
            continue;
        };
        let user_id = answer.user_id.as_str();
        match &answer.payload {
            AnswerPayload::Survey { items } => {
                for item in items {
                    let Some(&question) = item
                        .question_id
                        .as_deref()
                        .and_then(|id| question_texts.get(id))
                    else {
                        continue;
                    };
                    if question == catalog.survey.suggestion_question {
                        let input = item.input.as_deref().unwrap_or_default();
                        let tally = suggestion_shares.entry((user_id, named_id)).or_default();
                        tally.total += 1;
                        if is_valid_text(input) {
                            tally.valid += 1;
                            suggestion_texts.push((user_id, named_id, input));
                        }
                    } else if item.value == Some(true) {
                        if question == catalog.survey.clarity_question {
                            *clear_yes.entry(named_id).or_insert(0) += 1;
                        } else if question == catalog.survey.usefulness_question {
                            *useful_yes.entry(named_id).or_insert(0) += 1;
                        }
                    }
                }
            }
            AnswerPayload::Action { action, input } => {
                let tally = action_shares.entry((user_id, named_id)).or_default();
                tally.total += 1;
                let input = input.as_deref().unwrap_or_default();
                if is_valid_text(input) {
                    tally.valid += 1;
                    if let Some(action_id) = action.as_deref() {
                        action_cells
                            .entry((user_id, named_id, action_id.to_string()))
                            .or_insert(input);
                    }
                }
            }
            AnswerPayload::Notepad {
                notepad,
                first_note_input,
                second_note_input,
            } => {
                let element = notepad.as_deref().and_then(|id| elements_by_id.get(id));
                let first = first_note_input.as_deref().unwrap_or_default();
                let second = second_note_input.as_deref().unwrap_or_default();
                // Shape follows the element declaration; answers pointing at
                // an unknown element fall back to the single-slot pipeline.
                if element.is_some_and(|e| e.second_note.is_some()) {
                    let tally = double_shares.entry((user_id, named_id)).or_default();
                    tally.total += 2;
                    tally.valid += is_valid_text(first) as i64 + is_valid_text(second) as i64;
                    if is_valid_text(first) && is_valid_text(second) {
                        if let Some(element) = element {
                            double_cells
                                .entry((user_id, named_id, format!("{}#1", element.id)))
                                .or_insert(first);
                            double_cells
                                .entry((user_id, named_id, format!("{}#2", element.id)))
                                .or_insert(second);
                        }
                    }
                } else {
                    let tally = single_shares.entry((user_id, named_id)).or_default();
                    tally.total += 1;
                    if is_valid_text(first) {
                        tally.valid += 1;
                        if let Some(element) = element {
                            single_cells
                                .entry((user_id, named_id, element.id.clone()))
                                .or_insert(first);
                        }
                    }
                }
            }
            AnswerPayload::Questionnaire {
                ending_affirmation_input,
                items,
            } => {
                for item in items {
                    if !item.is_checked {
                        continue;
                    }
                    let Some(&label) = item
                        .affirmation_id
                        .as_deref()
                        .and_then(|id| affirmation_labels.get(id))
                    else {
                        continue;
                    };
                    *check_counts.entry((named_id, label)).or_insert(0) += 1;
                }
                if !catalog.is_takeaway_excluded(named_id) {
                    let input = ending_affirmation_input.as_deref().unwrap_or_default();
                    // The same takeaway submitted twice counts once.
                    if takeaway_seen.insert((user_id, named_id, input)) {
                        takeaway_entries.push((user_id, named_id, input));
                    }
                }
            }
            AnswerPayload::Other => {}
        }
    }

    let mut takeaway_shares: UserShares = HashMap::new();
    let mut takeaway_cells: PivotCells = HashMap::new();
    for &(user_id, named_id, input) in &takeaway_entries {
        let tally = takeaway_shares.entry((user_id, named_id)).or_default();
        tally.total += 1;
        if is_valid_text(input) {
            tally.valid += 1;
            takeaway_cells
                .entry((user_id, named_id, String::new()))
                .or_insert(input);
        }
    }

    let suggestion_scores = sum_shares(&suggestion_shares);
    let action_scores = sum_shares(&action_shares);
    let single_scores = sum_shares(&single_shares);
    let double_scores = sum_shares(&double_shares);
    let takeaway_scores = sum_shares(&takeaway_shares);

    // Summary, in catalog order. Trainings nobody completed are not rolled
    // out yet and stay off the report.
    let mut summary = Vec::new();
    for meta in catalog.trainings() {
        if module.is_some_and(|m| meta.module != m) {
            continue;
        }
        let named_id = meta.named_id.as_str();
        let completed = completed_counts.get(named_id).copied().unwrap_or(0);
        if completed == 0 {
            continue;
        }
        let available = available_counts.get(named_id).copied().unwrap_or(0);

        let notepad_pct = mean_rounded(
            [
                single_scores.get(named_id).and_then(|&s| pct(s, completed)),
                double_scores.get(named_id).and_then(|&s| pct(s, completed)),
            ]
            .into_iter()
            .flatten(),
        );
        let check_pct = mean_rounded(
            check_counts
                .iter()
                .filter(|((nid, _), _)| *nid == named_id)
                .filter_map(|(_, &count)| pct(count as f64, completed)),
        );

        summary.push(TrainingSummaryRow {
            module: meta.module,
            order: meta.order,
            training: meta.title.clone(),
            completed,
            available,
            completion_pct: pct(completed as f64, available),
            clear_pct: clear_yes.get(named_id).and_then(|&c| pct(c as f64, completed)),
            useful_pct: useful_yes.get(named_id).and_then(|&c| pct(c as f64, completed)),
            suggestions_pct: suggestion_scores
                .get(named_id)
                .and_then(|&s| pct(s, completed)),
            actions_pct: action_scores.get(named_id).and_then(|&s| pct(s, completed)),
            notepad_pct,
            check_pct,
            takeaways_pct: takeaway_scores
                .get(named_id)
                .and_then(|&s| pct(s, completed)),
        });
    }

    // Column declarations, in catalog order then declaration order.
    let mut action_decls = Vec::new();
    let mut single_decls = Vec::new();
    let mut double_decls = Vec::new();
    let mut takeaway_decls = Vec::new();
    for meta in catalog.trainings() {
        let named_id = meta.named_id.as_str();
        if !catalog.is_takeaway_excluded(named_id) {
            takeaway_decls.push(ColumnDecl {
                named_id,
                key: String::new(),
                module: meta.module,
                order: meta.order,
                training: &meta.title,
                prompt: None,
            });
        }
        let Some(training) = trainings_by_id.get(named_id) else {
            continue;
        };
        for action in &training.actions {
            let Some(prompt) = action
                .translations
                .name
                .as_deref()
                .and_then(|id| texts.get(id).copied())
            else {
                continue;
            };
            action_decls.push(ColumnDecl {
                named_id,
                key: action.id.clone(),
                module: meta.module,
                order: meta.order,
                training: &meta.title,
                prompt: Some(prompt.to_string()),
            });
        }
        for element in &training.elements {
            let title = element
                .translations
                .title
                .as_deref()
                .and_then(|id| texts.get(id).copied());
            if element.second_note.is_some() {
                let first = element
                    .first_note_label_id()
                    .and_then(|id| texts.get(id).copied());
                let second = element
                    .second_note_label_id()
                    .and_then(|id| texts.get(id).copied());
                let (Some(title), Some(first), Some(second)) = (title, first, second) else {
                    continue;
                };
                double_decls.push(ColumnDecl {
                    named_id,
                    key: format!("{}#1", element.id),
                    module: meta.module,
                    order: meta.order,
                    training: &meta.title,
                    prompt: Some(format!("{} ({})", title, first)),
                });
                double_decls.push(ColumnDecl {
                    named_id,
                    key: format!("{}#2", element.id),
                    module: meta.module,
                    order: meta.order,
                    training: &meta.title,
                    prompt: Some(format!("{} ({})", title, second)),
                });
            } else if let Some(title) = title {
                single_decls.push(ColumnDecl {
                    named_id,
                    key: element.id.clone(),
                    module: meta.module,
                    order: meta.order,
                    training: &meta.title,
                    prompt: Some(title.to_string()),
                });
            }
        }
    }

    let mut suggestions = Vec::new();
    for &(user_id, named_id, text) in &suggestion_texts {
        let Some(meta) = catalog.training(named_id) else {
            continue;
        };
        let Some(entry) = directory.get(user_id) else {
            continue;
        };
        suggestions.push(SuggestionRow {
            user_id: entry.user_id.clone(),
            company_name: entry.company_name.clone(),
            group_name: entry.group_name.clone(),
            module: meta.module,
            order: meta.order,
            training: meta.title.clone(),
            suggestion: text.to_string(),
        });
    }
    suggestions.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.user_id.cmp(&b.user_id)));

    let mut affirmation_checks = Vec::new();
    for (&(named_id, label), &count) in &check_counts {
        let Some(meta) = catalog.training(named_id) else {
            continue;
        };
        let completed = completed_counts.get(named_id).copied().unwrap_or(0);
        if completed == 0 {
            continue;
        }
        affirmation_checks.push(AffirmationCheckRow {
            module: meta.module,
            order: meta.order,
            training: meta.title.clone(),
            affirmation: label.to_string(),
            check_pct: pct(count as f64, completed),
        });
    }
    affirmation_checks.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.affirmation.cmp(&b.affirmation))
    });

    let report = TrainingsReport {
        summary,
        actions: build_pivot(action_decls, &action_cells, directory),
        suggestions,
        notepad_single: build_pivot(single_decls, &single_cells, directory),
        notepad_double: build_pivot(double_decls, &double_cells, directory),
        takeaways: build_pivot(takeaway_decls, &takeaway_cells, directory),
        affirmation_checks,
    };
    debug!(
        trainings = report.summary.len(),
        suggestions = report.suggestions.len(),
        "Computed trainings report"
    );
    report
}

fn build_pivot<'a>(
    decls: Vec<ColumnDecl<'a>>,
    cells: &PivotCells<'a>,
    directory: &UserDirectory,
) -> PivotTable {
    let used: HashSet<(&str, &str)> = cells
        .keys()
        .map(|(_, named_id, key)| (*named_id, key.as_str()))
        .collect();
    let columns: Vec<ColumnDecl> = decls
        .into_iter()
        .filter(|d| used.contains(&(d.named_id, d.key.as_str())))
        .collect();

    let mut user_ids: Vec<&str> = cells.keys().map(|(user_id, _, _)| *user_id).collect();
    user_ids.sort_unstable();
    user_ids.dedup();

    let mut rows = Vec::new();
    for user_id in user_ids {
        let Some(entry) = directory.get(user_id) else {
            continue;
        };
        let values: Vec<Option<String>> = columns
            .iter()
            .map(|c| {
                cells
                    .get(&(user_id, c.named_id, c.key.clone()))
                    .map(|&text| text.to_string())
            })
            .collect();
        if values.iter().all(Option::is_none) {
            continue;
        }
        rows.push(PivotRow {
            user_id: entry.user_id.clone(),
            company_name: entry.company_name.clone(),
            group_name: entry.group_name.clone(),
            values,
        });
    }
    rows.sort_by(|a, b| {
        a.user_id
            .cmp(&b.user_id)
            .then_with(|| opt_key(&a.company_name).cmp(&opt_key(&b.company_name)))
            .then_with(|| opt_key(&a.group_name).cmp(&opt_key(&b.group_name)))
    });

    PivotTable {
        columns: columns
            .into_iter()
            .map(|d| PivotColumn {
                module: d.module,
                order: d.order,
                training: d.training.to_string(),
                prompt: d.prompt,
            })
            .collect(),
        rows,
    }
}
