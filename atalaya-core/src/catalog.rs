//! Content catalog: the hand-maintained metadata reports are keyed on.
//!
//! The platform database stores trainings and exercises by technical
//! `namedId`; module numbers, presentation order, display titles and the
//! survey question wording live here instead. A catalog ships embedded in
//! the binary and can be overridden from a TOML file when the content team
//! publishes new material.

use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Catalog compiled into the binary. Mirrors the production content set.
const EMBEDDED_CATALOG: &str = r##"
version = 1

# Trainings whose affirmation takeaways stay out of the summary tables.
takeaway_exclusions = ["modelo-grow"]

[survey]
clarity_question = "¿Te ha resultado claro?"
usefulness_question = "¿Te ha sido útil el contenido de este entrenamiento?"
suggestion_question = "¿Cambiarías alguna cosa del entrenamiento?"

[[trainings]]
named_id = "valor-ser-curioso"
module = 1
order = 1
title = "El valor de ser curioso"

[[trainings]]
named_id = "mis-monstruos"
module = 1
order = 2
title = "Mis monstruos"

[[trainings]]
named_id = "flexibilidad-consciente"
module = 1
order = 3
title = "Flexibilidad consciente"

[[trainings]]
named_id = "aprender-confiar"
module = 2
order = 4
title = "Aprender a confiar"

[[trainings]]
named_id = "empatia-ceguera-emocional"
module = 2
order = 5
title = "Empatía y ceguera emocional"

[[trainings]]
named_id = "circulos-influencia"
module = 2
order = 6
title = "Círculos de influencia"

[[trainings]]
named_id = "modelo-grow-mando"
module = 3
order = 7
title = "Modelo GROW"

[[trainings]]
named_id = "construyendo-puentes"
module = 3
order = 8
title = "Construyendo puentes"

[[trainings]]
named_id = "ayudas-colaboras"
module = 3
order = 9
title = "¿Ayudas o colaboras?"

[exercise_labels]
capacidades-adaptacion = "Capacidades de adaptación"
comportamientos-modo-proteccion = "Comportamientos del modo protección"
contribuir-cambio = "Contribuir al cambio member"
contribuir-cambio-mando = "Contribuir al cambio"
elegir-retos-personales = "Elegir retos personales"
identificar-retos-adaptativos = "Identificar retos adaptativos"
mentalidades-trabajo = "Mentalidades en el trabajo"
miedos-profesionales = "Mis miedos profesionales"
percepciones-disparan-modo-proteccion = "Percepciones que disparan el modo protección"
prisa-interior-atencion-plena = "Prisa interior y atención plena"
solucionar-retos-adaptativos = "Solucionar retos adaptativos"
cociente-empatia = "Cociente de empatía"
conoce-ego = "Conoce tu ego"
conversaciones-feedback = "Conversaciones de feedback"
cultura-feedback = "Cultura de feedback"
feedback = "El feedback y yo"
perfil-confianza = "El perfil de confianza"
entorno-laboral-autoestima = "Entorno laboral y autoestima"
frenos-empatia = "Frenos a la empatía"
generosidad-inteligente = "La generosidad inteligente"
mapa-relaciones = "Mapa de relaciones"
relaciones-cotidianas = "Mis relaciones cotidianas"
inspirador-proposito = "Yo como inspirador del propósito"
conversaciones-desarrollo = "Conversaciones de desarrollo"
conversaciones-valientes-parte-1 = "Conversaciones valientes en transversal"
conversaciones-valientes-parte-2 = "Conversaciones valientes hacia arriba"
conversaciones-valientes-parte-3 = "Conversaciones valientes hacia abajo"
inteligencia-accion = "La inteligencia en acción"
bases-agilidad = "Las bases de la agilidad"
bases-colaboracion = "Las bases de la colaboración"
niveles-gustaria-moverme = "Niveles en los que me gustaría moverme"
niveles-muevo = "Niveles en los que me muevo"
"##;

/// Module number, order and display title of one training.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainingMeta {
    pub named_id: String,
    pub module: i64,
    pub order: i64,
    pub title: String,
}

/// Exact wording of the exit-survey questions, used to split survey items
/// into the clarity/usefulness/suggestion columns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SurveyQuestions {
    pub clarity_question: String,
    pub usefulness_question: String,
    pub suggestion_question: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub takeaway_exclusions: Vec<String>,
    pub survey: SurveyQuestions,
    trainings: Vec<TrainingMeta>,
    #[serde(default)]
    exercise_labels: HashMap<String, String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

fn default_version() -> u32 {
    1
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_CATALOG, "embedded")
    }

    /// Load a catalog override from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, &path.display().to_string())
    }

    /// Resolve the catalog for a configuration: the override file when one
    /// is configured, the embedded catalog otherwise.
    pub fn load(config: &CatalogConfig) -> Result<Self> {
        match &config.path {
            Some(path) => {
                info!(path = %path.display(), "Loading catalog override");
                Self::from_path(path)
            }
            None => Self::embedded(),
        }
    }

    fn parse(contents: &str, source: &str) -> Result<Self> {
        let mut catalog: Catalog = toml::from_str(contents)
            .map_err(|e| Error::Catalog(format!("{}: {}", source, e)))?;
        catalog.trainings.sort_by_key(|t| t.order);
        catalog.index = catalog
            .trainings
            .iter()
            .enumerate()
            .map(|(i, t)| (t.named_id.clone(), i))
            .collect();
        if catalog.index.len() != catalog.trainings.len() {
            return Err(Error::Catalog(format!(
                "{}: duplicate training named_id",
                source
            )));
        }
        Ok(catalog)
    }

    /// Trainings in presentation order.
    pub fn trainings(&self) -> &[TrainingMeta] {
        &self.trainings
    }

    /// Metadata for a training named id. Trainings absent from the catalog
    /// (retired or experimental content) have no metadata and are dropped
    /// from keyed reports.
    pub fn training(&self, named_id: &str) -> Option<&TrainingMeta> {
        self.index.get(named_id).map(|&i| &self.trainings[i])
    }

    /// Human label for an exercise named id, when one has been authored.
    pub fn exercise_label(&self, named_id: &str) -> Option<&str> {
        self.exercise_labels.get(named_id).map(String::as_str)
    }

    pub fn is_takeaway_excluded(&self, named_id: &str) -> bool {
        self.takeaway_exclusions.iter().any(|t| t == named_id)
    }
}
