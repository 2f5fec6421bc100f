//! Workspace tunables, stored as JSON sections in the `settings` table and
//! merged over built-in defaults on every read.

use crate::db;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Moderation,
    ExamQuestions,
}

impl SetupSection {
    pub const ALL: [SetupSection; 2] = [SetupSection::Moderation, SetupSection::ExamQuestions];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "moderation" => Some(Self::Moderation),
            "examQuestions" => Some(Self::ExamQuestions),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Moderation => "moderation",
            Self::ExamQuestions => "examQuestions",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Moderation => "setup.moderation",
            Self::ExamQuestions => "setup.examQuestions",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Moderation => json!({
            "minRevisionFeedbackChars": 10,
            "enforceCommitteeDepartment": true
        }),
        SetupSection::ExamQuestions => json!({
            "maxItems": 200,
            "maxTotalMarks": 1000
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Moderation => match k.as_str() {
                "minRevisionFeedbackChars" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 2000)?));
                }
                "enforceCommitteeDepartment" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown moderation field: {}", k)),
            },
            SetupSection::ExamQuestions => match k.as_str() {
                "maxItems" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 1000)?));
                }
                "maxTotalMarks" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 100_000)?));
                }
                _ => return Err(format!("unknown examQuestions field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> rusqlite::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Stale fields from older builds must not block reads.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

/// Applies `patch` over the stored section and persists the result.
/// Returns the merged section, or a message naming the offending field.
pub fn update_section(
    conn: &Connection,
    section: SetupSection,
    patch: &Map<String, Value>,
) -> Result<Result<Value, String>, rusqlite::Error> {
    let mut current = load_section(conn, section)?;
    if let Err(msg) = merge_section_patch(section, &mut current, patch) {
        return Ok(Err(msg));
    }
    db::settings_set_json(conn, section.key(), &current)?;
    Ok(Ok(current))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModerationSettings {
    pub min_revision_feedback_chars: usize,
    pub enforce_committee_department: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExamQuestionSettings {
    pub max_items: usize,
    pub max_total_marks: i64,
}

pub fn moderation(conn: &Connection) -> rusqlite::Result<ModerationSettings> {
    let obj = load_section(conn, SetupSection::Moderation)?;
    Ok(ModerationSettings {
        min_revision_feedback_chars: obj
            .get("minRevisionFeedbackChars")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(10),
        enforce_committee_department: obj
            .get("enforceCommitteeDepartment")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
    })
}

pub fn exam_questions(conn: &Connection) -> rusqlite::Result<ExamQuestionSettings> {
    let obj = load_section(conn, SetupSection::ExamQuestions)?;
    Ok(ExamQuestionSettings {
        max_items: obj
            .get("maxItems")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(200),
        max_total_marks: obj
            .get("maxTotalMarks")
            .and_then(|v| v.as_i64())
            .unwrap_or(1000),
    })
}
