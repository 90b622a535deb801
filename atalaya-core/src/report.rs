//! Spreadsheet-shaped rendering of engine reports.
//!
//! Every engine report flattens into [`Sheet`]s: a name, a header row and
//! string cells, using the Spanish labels the dashboard exports carry.
//! Nothing here re-computes metrics; the CLI either prints the sheets as
//! text tables or serializes a whole [`Workbook`] to JSON.

use crate::engines::coach::{CoachGroupCount, CoachReport};
use crate::engines::connections::ConnectionReport;
use crate::engines::progress::ProgressReport;
use crate::engines::recurrence::RecurrenceReport;
use crate::engines::trainings::{PivotTable, TrainingsReport};
use crate::format::{fmt_datetime, fmt_opt_int, fmt_opt_str, pct_1, round_i64, si_no, WEEKDAYS};
use serde::Serialize;

/// One exported table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The sheets of one run, in export order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn push(&mut self, sheets: Vec<Sheet>) {
        self.sheets.extend(sheets);
    }
}

pub fn recurrence_sheets(report: &RecurrenceReport) -> Vec<Sheet> {
    let mut buckets = Sheet::new(
        "Recurrencia",
        &[
            "Terminó el programa",
            "Recurrencia",
            "Cantidad de Usuarios",
            "Porcentaje de Usuarios",
        ],
    );
    for bucket in &report.buckets {
        buckets.rows.push(vec![
            si_no(bucket.finished).to_string(),
            si_no(bucket.recurrent).to_string(),
            bucket.users.to_string(),
            pct_1(bucket.percentage),
        ]);
    }

    // Means display as zero when no user is recurrent.
    let mut means = Sheet::new("Promedios", &["Métrica", "Valor"]);
    means.rows.push(vec![
        "Tiempo Medio de Conexión".to_string(),
        report.means.connection_count.unwrap_or(0).to_string(),
    ]);
    means.rows.push(vec![
        "Días desde Check-out".to_string(),
        report.means.days_since_completion.unwrap_or(0).to_string(),
    ]);

    vec![buckets, means]
}

pub fn connection_sheets(report: &ConnectionReport) -> Vec<Sheet> {
    let mut summary = Sheet::new("Conexiones", &["Métrica", "Valor"]);
    summary.rows.push(vec![
        "Número total de conexiones".to_string(),
        report.total_connections().to_string(),
    ]);
    summary.rows.push(vec![
        "Tiempo medio de conexión (minutos)".to_string(),
        report.mean_duration().to_string(),
    ]);

    let mut by_company = Sheet::new(
        "Duración por empresa",
        &["Empresa", "Tiempo medio de conexión (minutos)"],
    );
    for company in report.mean_duration_by_company() {
        by_company.rows.push(vec![
            company.company_name.clone(),
            round_i64(company.mean_minutes).to_string(),
        ]);
    }

    let mut by_weekday = Sheet::new("Conexiones por día", &["Día de la semana", "Conexiones"]);
    for (label, count) in WEEKDAYS.iter().zip(report.weekday_histogram()) {
        by_weekday.rows.push(vec![(*label).to_string(), count.to_string()]);
    }

    vec![summary, by_company, by_weekday]
}

pub fn trainings_sheets(report: &TrainingsReport) -> Vec<Sheet> {
    let mut summary = Sheet::new(
        "Entrenamientos",
        &[
            "Módulo",
            "Orden Entrenamiento",
            "Entrenamiento",
            "Completado (#)",
            "Disponible (#)",
            "Completado (%)",
            "Claro (%)",
            "Útil (%)",
            "Sugerencias (%)",
            "¿Y ahora qué? (%)",
            "Cuaderno (%)",
            "Check (%)",
            "Otras cosas que te llevas del entrenamiento (%)",
        ],
    );
    for row in &report.summary {
        summary.rows.push(vec![
            row.module.to_string(),
            row.order.to_string(),
            row.training.clone(),
            row.completed.to_string(),
            row.available.to_string(),
            fmt_opt_int(row.completion_pct),
            fmt_opt_int(row.clear_pct),
            fmt_opt_int(row.useful_pct),
            fmt_opt_int(row.suggestions_pct),
            fmt_opt_int(row.actions_pct),
            fmt_opt_int(row.notepad_pct),
            fmt_opt_int(row.check_pct),
            fmt_opt_int(row.takeaways_pct),
        ]);
    }

    let mut suggestions = Sheet::new(
        "Sugerencias",
        &[
            "Usuario",
            "Empresa",
            "Grupo",
            "Módulo",
            "Orden Entrenamiento",
            "Entrenamiento",
            "Sugerencias",
        ],
    );
    for row in &report.suggestions {
        suggestions.rows.push(vec![
            row.user_id.clone(),
            fmt_opt_str(row.company_name.as_deref()),
            fmt_opt_str(row.group_name.as_deref()),
            row.module.to_string(),
            row.order.to_string(),
            row.training.clone(),
            row.suggestion.clone(),
        ]);
    }

    let mut checks = Sheet::new(
        "¡Sigue tus avances!",
        &[
            "Módulo",
            "Orden Entrenamiento",
            "Entrenamiento",
            "¡Sigue tus avances!",
            "Check (%)",
        ],
    );
    for row in &report.affirmation_checks {
        checks.rows.push(vec![
            row.module.to_string(),
            row.order.to_string(),
            row.training.clone(),
            row.affirmation.clone(),
            fmt_opt_int(row.check_pct),
        ]);
    }

    vec![
        summary,
        pivot_sheet("Y ahora qué", &report.actions),
        suggestions,
        pivot_sheet("Cuaderno de 1 hoja", &report.notepad_single),
        pivot_sheet("Cuaderno de 2 hojas", &report.notepad_double),
        checks,
        pivot_sheet("Otras cosas", &report.takeaways),
    ]
}

fn pivot_sheet(name: &str, table: &PivotTable) -> Sheet {
    let mut columns = vec![
        "Usuario".to_string(),
        "Empresa".to_string(),
        "Grupo".to_string(),
    ];
    columns.extend(table.columns.iter().map(|c| c.label()));

    let mut sheet = Sheet {
        name: name.to_string(),
        columns,
        rows: Vec::new(),
    };
    for row in &table.rows {
        let mut cells = vec![
            row.user_id.clone(),
            fmt_opt_str(row.company_name.as_deref()),
            fmt_opt_str(row.group_name.as_deref()),
        ];
        cells.extend(row.values.iter().map(|v| v.clone().unwrap_or_default()));
        sheet.rows.push(cells);
    }
    sheet
}

pub fn coach_sheets(report: &CoachReport) -> Vec<Sheet> {
    let mut messages = Sheet::new(
        "Mensajes del coach",
        &[
            "Compañía",
            "Grupo",
            "Nombre",
            "Correo",
            "Fecha",
            "Rol",
            "Mensaje",
        ],
    );
    for row in &report.messages {
        messages.rows.push(vec![
            fmt_opt_str(row.company_name.as_deref()),
            fmt_opt_str(row.group_name.as_deref()),
            row.user_name.clone(),
            row.email.clone(),
            row.date.as_ref().map(fmt_datetime).unwrap_or_default(),
            row.role.display_name().to_string(),
            row.content.clone(),
        ]);
    }

    vec![
        count_sheet("Alcanzados por el coach", &report.reached),
        count_sheet("Respondieron al coach", &report.responded),
        messages,
    ]
}

fn count_sheet(name: &str, counts: &[CoachGroupCount]) -> Sheet {
    let mut sheet = Sheet::new(name, &["Compañía", "Grupo", "# Usuarios"]);
    for row in counts {
        sheet.rows.push(vec![
            row.company_name.clone(),
            row.group_name.clone(),
            row.count.to_string(),
        ]);
    }
    sheet
}

pub fn progress_sheets(report: &ProgressReport) -> Vec<Sheet> {
    let mut rows = Sheet::new(
        "Avance por módulo",
        &[
            "Empresa",
            "Grupo",
            "Usuario",
            "Nombre",
            "Apellidos",
            "Módulo",
            "Avance (%)",
            "Completado (#)",
            "Disponible (#)",
        ],
    );
    for row in &report.rows {
        rows.rows.push(vec![
            fmt_opt_str(row.company_name.as_deref()),
            fmt_opt_str(row.group_name.as_deref()),
            row.user_id.clone(),
            row.first_name.clone(),
            row.last_name.clone(),
            fmt_opt_str(row.module_name.as_deref()),
            row.percent.map(|p| format!("{:.1}", p)).unwrap_or_default(),
            row.completed.to_string(),
            row.total.to_string(),
        ]);
    }

    let mut leaderboard = Sheet::new(
        "Ranking de ejercicios",
        &["Módulo", "Ejercicio", "Nombre completo", "Completado (#)"],
    );
    for row in &report.leaderboard {
        leaderboard.rows.push(vec![
            fmt_opt_str(row.module_name.as_deref()),
            row.exercise_name.clone(),
            fmt_opt_str(row.exercise_label.as_deref()),
            row.completions.to_string(),
        ]);
    }

    vec![rows, leaderboard]
}
