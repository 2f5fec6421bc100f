use crate::auth::{self, Actor, CommitteeRef};
use crate::db::now_ts;
use crate::error::{ActionError, ActionResult};
use crate::workflow::{self, ExamStatus};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub teacher_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitteeView {
    pub id: String,
    pub department_id: String,
    pub session: String,
    pub semester: String,
    pub chairman: MemberView,
    pub members: Vec<MemberView>,
    pub updated_at: String,
}

fn validate_scope(session: &str, semester: &str, member_ids: &[String]) -> ActionResult<()> {
    if session.trim().is_empty() {
        return Err(ActionError::field("session", "missing session"));
    }
    if semester.trim().is_empty() {
        return Err(ActionError::field("semester", "missing semester"));
    }
    if member_ids.is_empty() {
        return Err(ActionError::field("memberIds", "at least one member is required"));
    }
    Ok(())
}

fn ensure_teachers_exist(conn: &Connection, ids: &[String]) -> ActionResult<()> {
    let mut stmt = conn.prepare("SELECT 1 FROM teachers WHERE id = ?")?;
    for id in ids {
        let found: Option<i64> = stmt.query_row([id], |r| r.get(0)).optional()?;
        if found.is_none() {
            return Err(ActionError::integrity(format!("teacher {} does not exist", id)));
        }
    }
    Ok(())
}

fn replace_members(conn: &Connection, committee_id: &str, member_ids: &[String]) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM moderation_committee_members WHERE committee_id = ?",
        [committee_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO moderation_committee_members(committee_id, teacher_id) VALUES(?, ?)",
    )?;
    for tid in member_ids {
        stmt.execute((committee_id, tid))?;
    }
    Ok(())
}

pub fn fetch_view(conn: &Connection, id: &str) -> ActionResult<CommitteeView> {
    let head = conn
        .query_row(
            "SELECT mc.id, mc.department_id, mc.session, mc.semester, mc.chairman_id, t.name, mc.updated_at
             FROM moderation_committees mc
             JOIN teachers t ON t.id = mc.chairman_id
             WHERE mc.id = ?",
            [id],
            |r| {
                Ok(CommitteeView {
                    id: r.get(0)?,
                    department_id: r.get(1)?,
                    session: r.get(2)?,
                    semester: r.get(3)?,
                    chairman: MemberView {
                        teacher_id: r.get(4)?,
                        name: r.get(5)?,
                    },
                    members: Vec::new(),
                    updated_at: r.get(6)?,
                })
            },
        )
        .optional()?;
    let mut view = head.ok_or(ActionError::NotFound("committee"))?;
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name FROM moderation_committee_members m
         JOIN teachers t ON t.id = m.teacher_id
         WHERE m.committee_id = ?
         ORDER BY t.name, t.id",
    )?;
    view.members = stmt
        .query_map([id], |r| {
            Ok(MemberView {
                teacher_id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(view)
}

/// Creates a committee chaired by the acting teacher, who must chair the department.
pub fn form(
    conn: &Connection,
    actor: &Actor,
    department_id: &str,
    session: &str,
    semester: &str,
    member_ids: &[String],
) -> ActionResult<CommitteeView> {
    let chairman = actor.require_teacher()?;
    validate_scope(session, semester, member_ids)?;
    let department = match auth::load_department(conn, department_id) {
        Ok(d) => d,
        Err(ActionError::NotFound(_)) => {
            return Err(ActionError::integrity(format!(
                "department {} does not exist",
                department_id
            )))
        }
        Err(e) => return Err(e),
    };
    if !auth::is_chairman_of(chairman, &department) {
        tracing::warn!(actor = %actor.user_id, department_id = %department_id, "committee formation denied");
        return Err(ActionError::forbidden(
            "only the department chairman may form a moderation committee",
        ));
    }
    ensure_teachers_exist(conn, member_ids)?;

    let id = Uuid::new_v4().to_string();
    let now = now_ts();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO moderation_committees(id, department_id, chairman_id, session, semester, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![id, department_id, chairman.id, session.trim(), semester.trim(), now, now],
    )?;
    replace_members(&tx, &id, member_ids)?;
    tx.commit()?;
    tracing::info!(committee_id = %id, members = member_ids.len(), "moderation committee formed");
    fetch_view(conn, &id)
}

fn authorize_manage(actor: &Actor, committee: &CommitteeRef) -> ActionResult<()> {
    if actor.is_admin() || actor.teacher_id() == Some(committee.chairman_id.as_str()) {
        return Ok(());
    }
    Err(ActionError::forbidden(
        "only the committee chairman or an admin may change this committee",
    ))
}

pub fn update(
    conn: &Connection,
    actor: &Actor,
    id: &str,
    session: &str,
    semester: &str,
    member_ids: &[String],
) -> ActionResult<CommitteeView> {
    let committee = auth::load_committee(conn, id)?;
    authorize_manage(actor, &committee)?;
    validate_scope(session, semester, member_ids)?;
    ensure_teachers_exist(conn, member_ids)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE moderation_committees SET session = ?, semester = ?, updated_at = ? WHERE id = ?",
        params![session.trim(), semester.trim(), now_ts(), id],
    )?;
    replace_members(&tx, id, member_ids)?;
    tx.commit()?;
    tracing::info!(committee_id = %id, members = member_ids.len(), "moderation committee updated");
    fetch_view(conn, id)
}

const DISSOLVED_NOTE: &str =
    "The moderation committee was dissolved. Select another committee and submit again.";

/// Papers waiting on the committee go back to their authors with a stamped note.
fn return_papers_in_review(conn: &Connection, actor: &Actor, committee_id: &str) -> ActionResult<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, moderator_feedback FROM exam_questions
         WHERE moderation_committee_id = ? AND status IN (?, ?)",
    )?;
    let waiting = stmt
        .query_map(
            params![
                committee_id,
                ExamStatus::Submitted.as_str(),
                ExamStatus::Moderating.as_str()
            ],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?)),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let now = now_ts();
    for (paper_id, feedback) in &waiting {
        let note = workflow::append_revision_feedback(
            feedback.as_deref(),
            DISSOLVED_NOTE,
            actor.display_name(),
            &now,
        );
        conn.execute(
            "UPDATE exam_questions SET status = ?, moderator_feedback = ?, updated_at = ? WHERE id = ?",
            params![ExamStatus::RevisionNeeded.as_str(), note, now, paper_id],
        )?;
        tracing::info!(exam_question_id = %paper_id, committee_id = %committee_id, "exam question returned on dissolve");
    }
    Ok(waiting.len())
}

pub fn dissolve(conn: &Connection, actor: &Actor, id: &str) -> ActionResult<()> {
    let committee = auth::load_committee(conn, id)?;
    authorize_manage(actor, &committee)?;
    let tx = conn.unchecked_transaction()?;
    let returned = return_papers_in_review(&tx, actor, id)?;
    tx.execute(
        "UPDATE exam_questions SET moderation_committee_id = NULL WHERE moderation_committee_id = ?",
        [id],
    )?;
    tx.execute(
        "DELETE FROM moderation_committee_members WHERE committee_id = ?",
        [id],
    )?;
    tx.execute("DELETE FROM moderation_committees WHERE id = ?", [id])?;
    tx.commit()?;
    tracing::info!(committee_id = %id, returned, "moderation committee dissolved");
    Ok(())
}

/// Committees in a department. Without an explicit department a teacher sees
/// their own department's committees only.
pub fn list(
    conn: &Connection,
    actor: &Actor,
    department_id: Option<&str>,
    session: Option<&str>,
    semester: Option<&str>,
) -> ActionResult<Vec<CommitteeView>> {
    let department_id = match department_id {
        Some(d) => Some(d.to_string()),
        None => actor.teacher.as_ref().map(|t| t.department_id.clone()),
    };
    if department_id.is_none() && !actor.is_admin() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT id FROM moderation_committees
         WHERE (?1 IS NULL OR department_id = ?1)
           AND (?2 IS NULL OR session = ?2)
           AND (?3 IS NULL OR semester = ?3)
         ORDER BY session DESC, semester, created_at",
    )?;
    let ids = stmt
        .query_map(params![department_id, session, semester], |r| {
            r.get::<_, String>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    ids.iter().map(|id| fetch_view(conn, id)).collect()
}
