//! Exam question paper lifecycle.
//!
//! ```text
//!   create -> Draft --submit--> Submitted --startReview--> Moderating
//!               ^                   |                         |
//!               | edit              +---- approve / revise ---+
//!               |                   v                         v
//!        RevisionNeeded <------------------------------  Approved -> print
//! ```
//!
//! Everything here is pure: status and action enums, the per-action source
//! state table, actor checks, payload validation and feedback stamping. The
//! storage side lives in `exams`.

use crate::auth::{is_committee_member, Actor, CommitteeRef};
use crate::error::{ActionError, ActionResult};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamStatus {
    Draft,
    Submitted,
    Moderating,
    Approved,
    RevisionNeeded,
}

impl ExamStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "moderating" => Some(Self::Moderating),
            "approved" => Some(Self::Approved),
            "revision_needed" => Some(Self::RevisionNeeded),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Moderating => "moderating",
            Self::Approved => "approved",
            Self::RevisionNeeded => "revision_needed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomsLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl BloomsLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "remember" => Some(Self::Remember),
            "understand" => Some(Self::Understand),
            "apply" => Some(Self::Apply),
            "analyze" | "analyse" => Some(Self::Analyze),
            "evaluate" => Some(Self::Evaluate),
            "create" => Some(Self::Create),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remember => "remember",
            Self::Understand => "understand",
            Self::Apply => "apply",
            Self::Analyze => "analyze",
            Self::Evaluate => "evaluate",
            Self::Create => "create",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satisfaction {
    Yes,
    No,
    NotApplicable,
}

impl Satisfaction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            "n_a" | "n/a" | "na" => Some(Self::NotApplicable),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::NotApplicable => "n_a",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamAction {
    Edit,
    Submit,
    StartReview,
    Approve,
    RequestRevision,
    ReviewItems,
    Delete,
    Print,
}

impl ExamAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Submit => "submit",
            Self::StartReview => "start review",
            Self::Approve => "approve",
            Self::RequestRevision => "request revision",
            Self::ReviewItems => "review items",
            Self::Delete => "delete",
            Self::Print => "print",
        }
    }

    /// Statuses the action may start from.
    pub fn sources(self) -> &'static [ExamStatus] {
        use ExamStatus::*;
        match self {
            Self::Edit | Self::Submit | Self::Delete => &[Draft, RevisionNeeded],
            Self::StartReview => &[Submitted],
            Self::Approve | Self::RequestRevision => &[Submitted, Moderating],
            Self::ReviewItems => &[Submitted, Moderating, Approved, RevisionNeeded],
            Self::Print => &[Approved],
        }
    }

    fn is_moderation(self) -> bool {
        matches!(
            self,
            Self::StartReview | Self::Approve | Self::RequestRevision | Self::ReviewItems
        )
    }
}

pub fn check_source(action: ExamAction, status: ExamStatus) -> ActionResult<()> {
    if action.sources().contains(&status) {
        return Ok(());
    }
    Err(ActionError::state(format!(
        "cannot {} an exam question in status {}",
        action.as_str(),
        status.as_str()
    )))
}

/// Status after `action` succeeds. `review_status` is the requested outcome
/// of an item review and is ignored by every other action.
pub fn target_status(
    action: ExamAction,
    from: ExamStatus,
    review_status: Option<ExamStatus>,
) -> ActionResult<ExamStatus> {
    check_source(action, from)?;
    match action {
        ExamAction::Edit => Ok(ExamStatus::Draft),
        ExamAction::Submit => Ok(ExamStatus::Submitted),
        ExamAction::StartReview => Ok(ExamStatus::Moderating),
        ExamAction::Approve => Ok(ExamStatus::Approved),
        ExamAction::RequestRevision => Ok(ExamStatus::RevisionNeeded),
        ExamAction::ReviewItems => match review_status {
            Some(s @ (ExamStatus::Approved | ExamStatus::RevisionNeeded)) => Ok(s),
            _ => Err(ActionError::field(
                "status",
                "status must be one of: approved, revision_needed",
            )),
        },
        ExamAction::Delete | ExamAction::Print => Ok(from),
    }
}

/// The parts of a paper that decide who may act on it.
#[derive(Debug, Clone)]
pub struct PaperAccess<'a> {
    pub owner_teacher_id: &'a str,
    pub committee: Option<&'a CommitteeRef>,
}

pub fn authorize(action: ExamAction, actor: &Actor, paper: &PaperAccess<'_>) -> ActionResult<()> {
    let is_owner = actor.teacher_id() == Some(paper.owner_teacher_id);
    if action.is_moderation() {
        let member = match (actor.teacher.as_ref(), paper.committee) {
            (Some(t), Some(c)) => is_committee_member(t, c),
            _ => false,
        };
        // No admin bypass here; admins only get the print override.
        if member {
            return Ok(());
        }
        return Err(ActionError::forbidden(
            "only the moderation committee chairman or members may moderate this exam question",
        ));
    }
    match action {
        ExamAction::Print if is_owner || actor.is_admin() => Ok(()),
        ExamAction::Print => Err(ActionError::forbidden(
            "only the course teacher or an admin may print this exam question",
        )),
        _ if is_owner => Ok(()),
        _ => Err(ActionError::forbidden(
            "only the course teacher who authored this exam question may change it",
        )),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaperDraft {
    pub session: String,
    pub semester: String,
    pub total_marks: i64,
    pub duration: String,
    pub moderation_committee_id: Option<String>,
}

pub fn parse_paper(params: &Value, max_total_marks: i64) -> ActionResult<PaperDraft> {
    let session = crate::params::required_str(params, "session")?;
    let semester = crate::params::required_str(params, "semester")?;
    let total_marks = crate::params::required_i64(params, "totalMarks")?;
    if total_marks < 1 {
        return Err(ActionError::field("totalMarks", "totalMarks must be >= 1"));
    }
    if total_marks > max_total_marks {
        return Err(ActionError::field(
            "totalMarks",
            format!("totalMarks must be <= {}", max_total_marks),
        ));
    }
    let duration = crate::params::required_str(params, "duration")?;
    let moderation_committee_id = crate::params::opt_str(params, "moderationCommitteeId")?;
    Ok(PaperDraft {
        session,
        semester,
        total_marks,
        duration,
        moderation_committee_id,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub question_label: String,
    pub question_text: String,
    pub marks: f64,
    pub clo_id: String,
    pub blooms: BloomsLevel,
}

fn item_str(item: &Value, idx: usize, key: &str) -> ActionResult<String> {
    item.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ActionError::field(&format!("items[{idx}].{key}"), format!("missing {}", key))
        })
}

/// Validates the submitted item list. Order is kept; it becomes the position order.
pub fn parse_items(params: &Value, max_items: usize) -> ActionResult<Vec<ItemDraft>> {
    let arr = params
        .get("items")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ActionError::field("items", "items must be an array"))?;
    if arr.is_empty() {
        return Err(ActionError::field("items", "at least one item is required"));
    }
    if arr.len() > max_items {
        return Err(ActionError::field(
            "items",
            format!("at most {} items are allowed", max_items),
        ));
    }

    let mut out = Vec::with_capacity(arr.len());
    for (idx, item) in arr.iter().enumerate() {
        let question_label = item_str(item, idx, "questionLabel")?;
        let question_text = item_str(item, idx, "questionText")?;
        let marks = item
            .get("marks")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                ActionError::field(&format!("items[{idx}].marks"), "marks must be a number")
            })?;
        if !marks.is_finite() || marks < 0.0 {
            return Err(ActionError::field(
                &format!("items[{idx}].marks"),
                "marks must be >= 0",
            ));
        }
        let clo_id = item_str(item, idx, "cloId")?;
        let blooms_raw = item_str(item, idx, "bloomsTaxonomyLevel")?;
        let blooms = BloomsLevel::parse(&blooms_raw).ok_or_else(|| {
            ActionError::field(
                &format!("items[{idx}].bloomsTaxonomyLevel"),
                "bloomsTaxonomyLevel must be one of: remember, understand, apply, analyze, evaluate, create",
            )
        })?;
        out.push(ItemDraft {
            question_label,
            question_text,
            marks,
            clo_id,
            blooms,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemReview {
    pub item_id: String,
    pub is_satisfactory: Satisfaction,
    pub moderator_comment: Option<String>,
}

pub fn parse_reviews(params: &Value) -> ActionResult<Vec<ItemReview>> {
    let arr = params
        .get("items")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ActionError::field("items", "items must be an array"))?;
    let mut out: Vec<ItemReview> = Vec::with_capacity(arr.len());
    for (idx, item) in arr.iter().enumerate() {
        let item_id = item_str(item, idx, "id")?;
        if out.iter().any(|r| r.item_id == item_id) {
            return Err(ActionError::field(
                &format!("items[{idx}].id"),
                "duplicate item id",
            ));
        }
        let raw = item_str(item, idx, "isSatisfactory")?;
        let is_satisfactory = Satisfaction::parse(&raw).ok_or_else(|| {
            ActionError::field(
                &format!("items[{idx}].isSatisfactory"),
                "isSatisfactory must be one of: yes, no, n_a",
            )
        })?;
        let moderator_comment = item
            .get("moderatorComment")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        out.push(ItemReview {
            item_id,
            is_satisfactory,
            moderator_comment,
        });
    }
    Ok(out)
}

pub fn parse_review_status(params: &Value) -> ActionResult<ExamStatus> {
    let raw = crate::params::required_str(params, "status")?;
    ExamStatus::parse(&raw)
        .filter(|s| matches!(s, ExamStatus::Approved | ExamStatus::RevisionNeeded))
        .ok_or_else(|| {
            ActionError::field("status", "status must be one of: approved, revision_needed")
        })
}

pub fn validate_feedback(feedback: &str, min_chars: usize) -> ActionResult<String> {
    let trimmed = feedback.trim();
    if trimmed.chars().count() < min_chars {
        return Err(ActionError::field(
            "feedback",
            format!("feedback must be at least {} characters", min_chars),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn approval_stamp(moderator: &str, timestamp: &str) -> String {
    format!("Approved by {} on {}", moderator, timestamp)
}

/// Adds a revision request below any earlier feedback on the paper.
pub fn append_revision_feedback(
    existing: Option<&str>,
    feedback: &str,
    moderator: &str,
    timestamp: &str,
) -> String {
    let entry = format!(
        "Revision requested by {} on {}:\n{}",
        moderator, timestamp, feedback
    );
    match existing.map(str::trim).filter(|s| !s.is_empty()) {
        Some(prev) => format!("{}\n\n{}", prev, entry),
        None => entry,
    }
}
