//! atalaya-report - Engagement reports over coaching platform snapshots
//!
//! Loads a database snapshot export, applies the configured exclusions and
//! renders the selected reports as text tables or a JSON workbook.

use anyhow::{Context, Result};
use atalaya_core::engines::progress::ProgressOptions;
use atalaya_core::engines::recurrence::RecurrenceOptions;
use atalaya_core::engines::{
    coach, connections, progress, recurrence, trainings, MetricKind, ReportFilter,
};
use atalaya_core::normalize::UserDirectory;
use atalaya_core::{
    report, Catalog, Config, ExclusionPolicy, JsonDirProvider, NormalizedTables, Sheet, Snapshot,
    Workbook,
};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "atalaya-report")]
#[command(about = "Engagement reports over coaching platform snapshots")]
#[command(version)]
struct Args {
    /// Directory holding the collection exports (<collection>.json or .jsonl)
    #[arg(short, long)]
    snapshot: PathBuf,

    /// Report to compute: recurrence, connections, trainings, coach or
    /// progress. Repeatable; all reports when omitted.
    #[arg(short, long)]
    metric: Vec<String>,

    /// Keep only users of this company
    #[arg(long)]
    company: Option<String>,

    /// Keep only users of this group
    #[arg(long)]
    group: Option<String>,

    /// Narrow the trainings summary to one module
    #[arg(long)]
    module: Option<i64>,

    /// Emit progress rows for users without any completed exercise
    #[arg(long)]
    include_zero_progress: bool,

    /// Output format: table (default) or json
    #[arg(short, long, default_value = "table")]
    format: String,

    /// Write the output to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file path (default: ~/.config/atalaya/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print snapshot details and decode warnings
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = match &args.config {
        Some(path) => Config::load_from(path).context("failed to load configuration")?,
        None => Config::load().context("failed to load configuration")?,
    };
    let _log_guard =
        atalaya_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let metrics = selected_metrics(&args.metric)?;
    let catalog = Catalog::load(&config.catalog).context("failed to load content catalog")?;

    let provider = JsonDirProvider::new(&args.snapshot);
    let snapshot = Snapshot::load(&provider).context("failed to load snapshot")?;
    tracing::info!(
        session = %snapshot.id,
        fingerprint = %snapshot.fingerprint,
        skipped = snapshot.warnings.len(),
        "Snapshot loaded"
    );
    print_snapshot_notes(&snapshot, args.verbose);

    let policy = ExclusionPolicy::from_config(&config.exclusions);
    let tables = NormalizedTables::build(&snapshot, &policy);
    let directory = UserDirectory::build(&tables);
    let filter = ReportFilter::from_raw(args.company.as_deref(), args.group.as_deref());

    let mut sections: Vec<(MetricKind, Vec<Sheet>)> = Vec::new();
    for kind in metrics {
        let sheets = match kind {
            MetricKind::Recurrence => {
                let options = RecurrenceOptions::from(&config.reference);
                report::recurrence_sheets(&recurrence::compute(
                    &tables, &directory, &filter, &options,
                ))
            }
            MetricKind::Connections => {
                report::connection_sheets(&connections::compute(&tables, &directory, &filter))
            }
            MetricKind::Trainings => report::trainings_sheets(&trainings::compute(
                &tables,
                &directory,
                &catalog,
                args.module,
            )),
            MetricKind::Coach => {
                let mut sheets =
                    report::coach_sheets(&coach::compute(&tables, &directory, &policy, &filter));
                sheets.push(funnel_sheet(&tables, &directory, &filter, &config));
                sheets
            }
            MetricKind::Progress => {
                let options = ProgressOptions {
                    include_zero_progress: args.include_zero_progress,
                    as_of: Utc::now(),
                };
                report::progress_sheets(&progress::compute(
                    &tables, &directory, &catalog, &filter, &options,
                ))
            }
        };
        sections.push((kind, sheets));
    }

    let mut workbook = Workbook::default();
    for (_, sheets) in &sections {
        workbook.push(sheets.clone());
    }

    let rendered = match args.format.as_str() {
        "table" => {
            let mut text = render_sections(&sections);
            text.push_str(&format!(
                "---\n{} sheets from {}\n",
                workbook.sheets.len(),
                snapshot.source
            ));
            text
        }
        "json" => {
            let mut json = serde_json::to_string_pretty(&workbook)?;
            json.push('\n');
            json
        }
        other => anyhow::bail!("Unknown output format: {}. Use 'table' or 'json'", other),
    };

    match &args.output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{}", rendered),
    }
    tracing::info!(
        sheets = workbook.sheets.len(),
        format = %args.format,
        "Report run complete"
    );

    Ok(())
}

/// Requested metrics in export order; all of them when none are named.
fn selected_metrics(requested: &[String]) -> Result<Vec<MetricKind>> {
    if requested.is_empty() {
        return Ok(MetricKind::ALL.to_vec());
    }
    let mut picked = Vec::new();
    for name in requested {
        let kind = MetricKind::from_str(name).map_err(anyhow::Error::msg)?;
        if !picked.contains(&kind) {
            picked.push(kind);
        }
    }
    Ok(MetricKind::ALL
        .into_iter()
        .filter(|kind| picked.contains(kind))
        .collect())
}

fn print_snapshot_notes(snapshot: &Snapshot, verbose: bool) {
    if verbose {
        eprintln!("Snapshot {} from {}", snapshot.id, snapshot.source);
        eprintln!("Fingerprint: {}", snapshot.fingerprint);
        for (collection, count) in snapshot.table_counts() {
            eprintln!("  {:<12} {:>6}", collection, count);
        }
        for warning in &snapshot.warnings {
            eprintln!("warning: skipped {}", warning);
        }
    } else if !snapshot.warnings.is_empty() {
        eprintln!(
            "warning: {} document(s) skipped while decoding; re-run with --verbose for details",
            snapshot.warnings.len()
        );
    }
}

/// The coach adoption funnel entry count, shaped like the other sheets so
/// it travels through both output formats.
fn funnel_sheet(
    tables: &NormalizedTables,
    directory: &UserDirectory,
    filter: &ReportFilter,
    config: &Config,
) -> Sheet {
    let since = config.reference.coach_funnel_start;
    let count = coach::count_unlocked_active_users(tables, directory, filter, since);
    Sheet {
        name: "Embudo del coach".to_string(),
        columns: vec!["Métrica".to_string(), "Valor".to_string()],
        rows: vec![vec![
            format!(
                "Usuarios con coach conectados desde {}",
                since.format("%Y-%m-%d")
            ),
            count.to_string(),
        ]],
    }
}

fn render_sections(sections: &[(MetricKind, Vec<Sheet>)]) -> String {
    let mut out = String::new();
    for (kind, sheets) in sections {
        out.push_str(&format!("== {} ==\n\n", kind.display_name()));
        for sheet in sheets {
            render_sheet(&mut out, sheet);
            out.push('\n');
        }
    }
    out
}

/// One sheet as a padded text table. Widths count characters, not bytes,
/// so accented headers line up.
fn render_sheet(out: &mut String, sheet: &Sheet) {
    let mut widths: Vec<usize> = sheet.columns.iter().map(|c| c.chars().count()).collect();
    for row in &sheet.rows {
        for (cell, width) in row.iter().zip(widths.iter_mut()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    out.push_str(&sheet.name);
    out.push('\n');
    push_row(out, &sheet.columns, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(out, &rule, &widths);
    if sheet.is_empty() {
        out.push_str("  (no rows)\n");
    }
    for row in &sheet.rows {
        push_row(out, row, &widths);
    }
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let mut line = String::new();
    for (cell, width) in cells.iter().zip(widths) {
        line.push_str("  ");
        line.push_str(cell);
        for _ in cell.chars().count()..*width {
            line.push(' ');
        }
    }
    out.push_str(line.trim_end());
    out.push('\n');
}
