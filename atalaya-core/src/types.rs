//! Entity types decoded from MongoDB collection exports.
//!
//! Snapshot files come from `mongoexport`-style dumps, so the decoders accept
//! both relaxed and canonical extended JSON: an id may be `"abc123"` or
//! `{"$oid": "abc123"}`, a timestamp may be an RFC 3339 string, a bare date,
//! `{"$date": "..."}` or `{"$date": {"$numberLong": "1700000000000"}}`.
//! Unknown fields are ignored everywhere; optional fields default so that a
//! sparse document still decodes.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

// ============================================================================
// Organization entities
// ============================================================================

/// A client company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A coaching group inside a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "company", default, deserialize_with = "de_opt_id")]
    pub company_id: Option<String>,
}

/// A platform user, attached to at most one group and company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(rename = "group", default, deserialize_with = "de_opt_id")]
    pub group_id: Option<String>,
    #[serde(rename = "company", default, deserialize_with = "de_opt_id")]
    pub company_id: Option<String>,
    #[serde(rename = "hasUnlockedCoach", default)]
    pub has_unlocked_coach: bool,
}

impl User {
    /// Full display name, `firstName lastName`.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ============================================================================
// Activity entities
// ============================================================================

/// One app session of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "user", deserialize_with = "de_id")]
    pub user_id: String,
    #[serde(rename = "startDate", default, deserialize_with = "de_opt_date")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(rename = "endDate", default, deserialize_with = "de_opt_date")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(rename = "connectionDuration", default)]
    pub duration_minutes: Option<f64>,
}

/// Discriminator for progress records. Kinds this engine does not use
/// decode as `Other` instead of rejecting the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum ProgressKind {
    #[serde(rename = "progress_exercise")]
    Exercise,
    #[serde(rename = "progress_module")]
    Module,
    #[serde(rename = "progress_training")]
    Training,
    #[serde(rename = "progress_checkpoint")]
    Checkpoint,
    Other,
}

impl From<String> for ProgressKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "progress_exercise" => ProgressKind::Exercise,
            "progress_module" => ProgressKind::Module,
            "progress_training" => ProgressKind::Training,
            "progress_checkpoint" => ProgressKind::Checkpoint,
            _ => ProgressKind::Other,
        }
    }
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::Exercise => "progress_exercise",
            ProgressKind::Module => "progress_module",
            ProgressKind::Training => "progress_training",
            ProgressKind::Checkpoint => "progress_checkpoint",
            ProgressKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's progress mark on an exercise, training or checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "user", deserialize_with = "de_id")]
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "isViewed", default)]
    pub is_viewed: bool,
    #[serde(rename = "completionDate", default, deserialize_with = "de_opt_date")]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt", default, deserialize_with = "de_opt_date")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default, deserialize_with = "de_opt_date")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "trainingNamedId", default)]
    pub training_named_id: Option<String>,
    #[serde(rename = "exercise", default, deserialize_with = "de_opt_id")]
    pub exercise_id: Option<String>,
    #[serde(rename = "modules", default, deserialize_with = "de_id_list")]
    pub module_ids: Vec<String>,
}

// ============================================================================
// Content entities
// ============================================================================

/// A content module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "namedId", default)]
    pub named_id: String,
}

/// A release window for exercises. Episodes with a future `startDate`
/// keep their exercises out of the progress denominators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "namedId", default)]
    pub named_id: String,
    #[serde(rename = "startDate", default, deserialize_with = "de_opt_date")]
    pub start_date: Option<DateTime<Utc>>,
}

/// An exercise, linked to one or more modules and episodes. `replaces`
/// points at an older exercise this one supersedes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "namedId", default)]
    pub named_id: String,
    #[serde(rename = "modules", default, deserialize_with = "de_id_list")]
    pub module_ids: Vec<String>,
    #[serde(rename = "episodes", default, deserialize_with = "de_id_list")]
    pub episode_ids: Vec<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub replaces: Option<String>,
}

/// A training, with the interactive element declarations the answer
/// engines resolve prompts against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Training {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "namedId", default)]
    pub named_id: String,
    #[serde(default)]
    pub elements: Vec<NotepadElement>,
    #[serde(default)]
    pub actions: Vec<ActionDecl>,
    #[serde(default)]
    pub questionnaire: Questionnaire,
}

/// A notepad element: a titled sheet with one or two note slots.
/// A slot exists when its label translation is declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotepadElement {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub translations: TitleRef,
    #[serde(rename = "firstNote", default)]
    pub first_note: Option<NoteDecl>,
    #[serde(rename = "secondNote", default)]
    pub second_note: Option<NoteDecl>,
}

impl NotepadElement {
    pub fn first_note_label_id(&self) -> Option<&str> {
        self.first_note.as_ref().and_then(|n| n.translations.name.as_deref())
    }

    pub fn second_note_label_id(&self) -> Option<&str> {
        self.second_note.as_ref().and_then(|n| n.translations.name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDecl {
    #[serde(default)]
    pub translations: NameRef,
}

/// An action prompt declared on a training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecl {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub translations: NameRef,
}

/// The closing questionnaire of a training.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Questionnaire {
    #[serde(default)]
    pub affirmations: Vec<AffirmationDecl>,
}

/// A checkable affirmation inside a questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffirmationDecl {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub translations: NameRef,
}

/// Reference to a translation holding a `title` text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TitleRef {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub title: Option<String>,
}

/// Reference to a translation holding a `name` text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NameRef {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub name: Option<String>,
}

/// The per-training exit survey definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub questions: Vec<SurveyQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyQuestion {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub translations: TitleRef,
}

/// A localized text blob keyed by language code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub content: HashMap<String, serde_json::Value>,
}

impl Translation {
    /// Text for a language code, when the stored value is a string.
    pub fn text(&self, lang: &str) -> Option<&str> {
        self.content.get(lang).and_then(|v| v.as_str())
    }
}

// ============================================================================
// Answer entities
// ============================================================================

/// A user's answer to an interactive training element. The payload shape
/// depends on the `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "user", deserialize_with = "de_id")]
    pub user_id: String,
    #[serde(rename = "trainingNamedId", default)]
    pub training_named_id: Option<String>,
    #[serde(flatten)]
    pub payload: AnswerPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnswerPayload {
    #[serde(rename = "answer_survey_training")]
    Survey {
        #[serde(default)]
        items: Vec<SurveyAnswerItem>,
    },
    #[serde(rename = "answer_training_action")]
    Action {
        #[serde(default, deserialize_with = "de_opt_id")]
        action: Option<String>,
        #[serde(default)]
        input: Option<String>,
    },
    #[serde(rename = "answer_training_notepad")]
    Notepad {
        #[serde(default, deserialize_with = "de_opt_id")]
        notepad: Option<String>,
        #[serde(rename = "firstNoteInput", default)]
        first_note_input: Option<String>,
        #[serde(rename = "secondNoteInput", default)]
        second_note_input: Option<String>,
    },
    #[serde(rename = "answer_training_questionnaire")]
    Questionnaire {
        #[serde(rename = "endingAffirmationInput", default)]
        ending_affirmation_input: Option<String>,
        #[serde(default)]
        items: Vec<AffirmationAnswerItem>,
    },
    #[serde(other)]
    Other,
}

/// One survey question response. Boolean questions fill `value`, free-text
/// questions fill `input`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyAnswerItem {
    #[serde(rename = "question", default, deserialize_with = "de_opt_id")]
    pub question_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: Option<bool>,
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffirmationAnswerItem {
    #[serde(rename = "affirmation", default, deserialize_with = "de_opt_id")]
    pub affirmation_id: Option<String>,
    #[serde(rename = "isChecked", default)]
    pub is_checked: bool,
}

// ============================================================================
// Coach entities
// ============================================================================

/// Author of a coach thread message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Other,
}

impl From<String> for MessageRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::Other,
        }
    }
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Other => "other",
        }
    }

    /// Label used in exported tables.
    pub fn display_name(&self) -> &'static str {
        match self {
            MessageRole::User => "Usuario",
            MessageRole::Assistant => "Coach",
            MessageRole::Other => "Otro",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A coach conversation thread. The message counters are maintained by the
/// platform on the document itself, alongside the message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachThread {
    #[serde(rename = "_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "user", deserialize_with = "de_id")]
    pub user_id: String,
    #[serde(rename = "assistantMessagesAmount", default)]
    pub assistant_messages: i64,
    #[serde(rename = "userMessagesAmount", default)]
    pub user_messages: i64,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub date: Option<DateTime<Utc>>,
}

// ============================================================================
// Extended JSON decoding
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Plain(String),
    Extended {
        #[serde(rename = "$oid")]
        oid: String,
    },
}

impl IdRepr {
    fn into_string(self) -> String {
        match self {
            IdRepr::Plain(s) => s,
            IdRepr::Extended { oid } => oid,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdListRepr {
    Many(Vec<IdRepr>),
    One(IdRepr),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DateRepr {
    Text(String),
    Millis(i64),
    Extended {
        #[serde(rename = "$date")]
        date: ExtendedDate,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtendedDate {
    Text(String),
    Millis(i64),
    NumberLong {
        #[serde(rename = "$numberLong")]
        millis: String,
    },
}

impl DateRepr {
    fn resolve(self) -> Option<DateTime<Utc>> {
        match self {
            DateRepr::Text(s) => parse_datetime(&s),
            DateRepr::Millis(ms) => Utc.timestamp_millis_opt(ms).single(),
            DateRepr::Extended { date } => match date {
                ExtendedDate::Text(s) => parse_datetime(&s),
                ExtendedDate::Millis(ms) => Utc.timestamp_millis_opt(ms).single(),
                ExtendedDate::NumberLong { millis } => {
                    let ms: i64 = millis.parse().ok()?;
                    Utc.timestamp_millis_opt(ms).single()
                }
            },
        }
    }
}

/// Parse a timestamp string: RFC 3339 first, then the bare formats the
/// export pipeline has been seen to emit.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)));
    }
    None
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    IdRepr::deserialize(deserializer).map(IdRepr::into_string)
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<IdRepr>::deserialize(deserializer)?;
    Ok(repr.map(IdRepr::into_string))
}

fn de_id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<IdListRepr>::deserialize(deserializer)?;
    Ok(match repr {
        Some(IdListRepr::Many(ids)) => ids.into_iter().map(IdRepr::into_string).collect(),
        Some(IdListRepr::One(id)) => vec![id.into_string()],
        None => Vec::new(),
    })
}

fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    // Unparseable timestamps coerce to None rather than rejecting the record.
    let repr = Option::<DateRepr>::deserialize(deserializer)?;
    Ok(repr.and_then(DateRepr::resolve))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_decodes_plain_and_extended_ids() {
        let plain: User = serde_json::from_value(json!({
            "_id": "u1", "email": "a@b.c", "firstName": "Ana", "lastName": "Pol",
            "group": "g1", "company": "c1"
        }))
        .unwrap();
        assert_eq!(plain.id, "u1");
        assert_eq!(plain.group_id.as_deref(), Some("g1"));
        assert!(!plain.has_unlocked_coach);

        let extended: User = serde_json::from_value(json!({
            "_id": {"$oid": "u2"}, "group": {"$oid": "g2"},
            "hasUnlockedCoach": true
        }))
        .unwrap();
        assert_eq!(extended.id, "u2");
        assert_eq!(extended.group_id.as_deref(), Some("g2"));
        assert!(extended.has_unlocked_coach);
        assert_eq!(extended.full_name(), " ");
    }

    #[test]
    fn connection_accepts_every_date_shape() {
        let conn: Connection = serde_json::from_value(json!({
            "_id": "c1", "user": "u1",
            "startDate": "2025-03-01T10:30:00Z",
            "endDate": {"$date": {"$numberLong": "1740825000000"}},
            "connectionDuration": 12.5
        }))
        .unwrap();
        assert!(conn.start_date.is_some());
        assert!(conn.end_date.is_some());
        assert_eq!(conn.duration_minutes, Some(12.5));

        let bare: Connection = serde_json::from_value(json!({
            "_id": "c2", "user": "u1", "startDate": "2025-03-01",
            "endDate": "2025-03-01 10:30:00"
        }))
        .unwrap();
        assert_eq!(
            bare.start_date.unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            bare.end_date.unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn garbled_optional_date_coerces_to_none() {
        let conn: Connection = serde_json::from_value(json!({
            "_id": "c1", "user": "u1", "startDate": "soon"
        }))
        .unwrap();
        assert!(conn.start_date.is_none());
    }

    #[test]
    fn answer_payload_follows_type_tag() {
        let action: Answer = serde_json::from_value(json!({
            "_id": "a1", "user": "u1", "trainingNamedId": "mis-monstruos",
            "type": "answer_training_action",
            "action": {"$oid": "act1"}, "input": "escuchar más en las reuniones"
        }))
        .unwrap();
        match action.payload {
            AnswerPayload::Action { action, input } => {
                assert_eq!(action.as_deref(), Some("act1"));
                assert!(input.unwrap().starts_with("escuchar"));
            }
            other => panic!("wrong payload: {:?}", other),
        }

        let unknown: Answer = serde_json::from_value(json!({
            "_id": "a2", "user": "u1", "type": "answer_video_seen"
        }))
        .unwrap();
        assert_eq!(unknown.payload, AnswerPayload::Other);
    }

    #[test]
    fn progress_kind_round_trips() {
        let rec: ProgressRecord = serde_json::from_value(json!({
            "_id": "p1", "user": "u1", "type": "progress_checkpoint",
            "completionDate": "2025-01-15T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(rec.kind, ProgressKind::Checkpoint);
        assert_eq!(rec.kind.to_string(), "progress_checkpoint");
        assert!(rec.module_ids.is_empty());

        let odd: ProgressRecord = serde_json::from_value(json!({
            "_id": "p2", "user": "u1", "type": "progress_video",
            "modules": [{"$oid": "m1"}, "m2"]
        }))
        .unwrap();
        assert_eq!(odd.kind, ProgressKind::Other);
        assert_eq!(odd.module_ids, vec!["m1", "m2"]);
    }

    #[test]
    fn exercise_module_list_accepts_scalar() {
        let ex: Exercise = serde_json::from_value(json!({
            "_id": "e1", "namedId": "feedback", "modules": "m1",
            "episodes": [{"$oid": "ep1"}, "ep2"]
        }))
        .unwrap();
        assert_eq!(ex.module_ids, vec!["m1"]);
        assert_eq!(ex.episode_ids, vec!["ep1", "ep2"]);
        assert!(ex.replaces.is_none());
    }

    #[test]
    fn thread_message_roles_decode() {
        let thread: CoachThread = serde_json::from_value(json!({
            "_id": "t1", "user": "u1",
            "assistantMessagesAmount": 2, "userMessagesAmount": 1,
            "messages": [
                {"role": "assistant", "content": "hola", "date": "2025-03-01T08:00:00Z"},
                {"role": "user", "content": "buenas"},
                {"role": "system", "content": "reset"}
            ]
        }))
        .unwrap();
        assert_eq!(thread.messages[0].role, MessageRole::Assistant);
        assert_eq!(thread.messages[0].role.display_name(), "Coach");
        assert_eq!(thread.messages[1].role.display_name(), "Usuario");
        assert_eq!(thread.messages[2].role, MessageRole::Other);
    }
}
