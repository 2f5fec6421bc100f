use crate::auth::{self, Actor, CommitteeRef};
use crate::db::now_ts;
use crate::error::{ActionError, ActionResult};
use crate::settings;
use crate::workflow::{
    self, ExamAction, ExamStatus, ItemDraft, ItemReview, PaperAccess, PaperDraft,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PaperRow {
    pub id: String,
    pub course_id: String,
    pub course_teacher_id: String,
    pub session: String,
    pub semester: String,
    pub total_marks: i64,
    pub duration: String,
    pub status: ExamStatus,
    pub moderation_committee_id: Option<String>,
    pub moderator_feedback: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamItemView {
    pub id: String,
    pub position: i64,
    pub question_label: String,
    pub question_text: String,
    pub marks: f64,
    pub clo_id: String,
    pub clo_code: Option<String>,
    pub blooms_taxonomy_level: String,
    pub is_satisfactory: Option<String>,
    pub moderator_comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamQuestionView {
    pub id: String,
    pub course_id: String,
    pub course_code: String,
    pub course_title: String,
    pub course_teacher_id: String,
    pub course_teacher_name: String,
    pub session: String,
    pub semester: String,
    pub total_marks: i64,
    pub duration: String,
    pub status: &'static str,
    pub moderation_committee_id: Option<String>,
    pub moderator_feedback: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub items: Vec<ExamItemView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintItem {
    pub position: i64,
    pub question_label: String,
    pub question_text: String,
    pub marks: f64,
    pub clo_code: Option<String>,
    pub blooms_taxonomy_level: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintModel {
    pub exam_question_id: String,
    pub course_code: String,
    pub course_title: String,
    pub course_teacher_name: String,
    pub session: String,
    pub semester: String,
    pub total_marks: i64,
    pub duration: String,
    pub approval: Option<String>,
    pub items: Vec<PrintItem>,
    pub item_marks_sum: f64,
    pub generated_at: String,
}

const PAPER_COLUMNS: &str = "id, course_id, course_teacher_id, session, semester, total_marks, \
     duration, status, moderation_committee_id, moderator_feedback, created_at, updated_at";

fn paper_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<PaperRow> {
    let status_raw: String = r.get(7)?;
    let status = ExamStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            Type::Text,
            format!("unknown exam question status {}", status_raw).into(),
        )
    })?;
    Ok(PaperRow {
        id: r.get(0)?,
        course_id: r.get(1)?,
        course_teacher_id: r.get(2)?,
        session: r.get(3)?,
        semester: r.get(4)?,
        total_marks: r.get(5)?,
        duration: r.get(6)?,
        status,
        moderation_committee_id: r.get(8)?,
        moderator_feedback: r.get(9)?,
        created_at: r.get(10)?,
        updated_at: r.get(11)?,
    })
}

pub fn load_paper(conn: &Connection, id: &str) -> ActionResult<PaperRow> {
    let sql = format!("SELECT {} FROM exam_questions WHERE id = ?", PAPER_COLUMNS);
    conn.query_row(&sql, [id], paper_from_row)
        .optional()?
        .ok_or(ActionError::NotFound("exam question"))
}

fn load_items(conn: &Connection, paper_id: &str) -> ActionResult<Vec<ExamItemView>> {
    let mut stmt = conn.prepare(
        "SELECT i.id, i.position, i.question_label, i.question_text, i.marks, i.clo_id, c.code,
                i.blooms_taxonomy_level, i.is_satisfactory, i.moderator_comment
         FROM exam_question_items i
         LEFT JOIN clos c ON c.id = i.clo_id
         WHERE i.exam_question_id = ?
         ORDER BY i.position",
    )?;
    let items = stmt
        .query_map([paper_id], |r| {
            Ok(ExamItemView {
                id: r.get(0)?,
                position: r.get(1)?,
                question_label: r.get(2)?,
                question_text: r.get(3)?,
                marks: r.get(4)?,
                clo_id: r.get(5)?,
                clo_code: r.get(6)?,
                blooms_taxonomy_level: r.get(7)?,
                is_satisfactory: r.get(8)?,
                moderator_comment: r.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// The paper with its course, author and items, as returned after every action.
pub fn fetch_view(conn: &Connection, id: &str) -> ActionResult<ExamQuestionView> {
    let paper = load_paper(conn, id)?;
    let (course_code, course_title): (String, String) = conn.query_row(
        "SELECT code, title FROM courses WHERE id = ?",
        [&paper.course_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let course_teacher_name: String = conn.query_row(
        "SELECT name FROM teachers WHERE id = ?",
        [&paper.course_teacher_id],
        |r| r.get(0),
    )?;
    let items = load_items(conn, &paper.id)?;
    Ok(ExamQuestionView {
        id: paper.id,
        course_id: paper.course_id,
        course_code,
        course_title,
        course_teacher_id: paper.course_teacher_id,
        course_teacher_name,
        session: paper.session,
        semester: paper.semester,
        total_marks: paper.total_marks,
        duration: paper.duration,
        status: paper.status.as_str(),
        moderation_committee_id: paper.moderation_committee_id,
        moderator_feedback: paper.moderator_feedback,
        created_at: paper.created_at,
        updated_at: paper.updated_at,
        items,
    })
}

fn load_paper_committee(conn: &Connection, paper: &PaperRow) -> ActionResult<Option<CommitteeRef>> {
    match paper.moderation_committee_id.as_deref() {
        None => Ok(None),
        Some(cid) => match auth::load_committee(conn, cid) {
            Ok(c) => Ok(Some(c)),
            Err(ActionError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        },
    }
}

/// Loads the paper, then checks the actor before the source status.
fn guard(
    conn: &Connection,
    actor: &Actor,
    id: &str,
    action: ExamAction,
) -> ActionResult<(PaperRow, Option<CommitteeRef>)> {
    let paper = load_paper(conn, id)?;
    let committee = load_paper_committee(conn, &paper)?;
    let access = PaperAccess {
        owner_teacher_id: &paper.course_teacher_id,
        committee: committee.as_ref(),
    };
    if let Err(e) = workflow::authorize(action, actor, &access) {
        tracing::warn!(
            exam_question_id = %id,
            actor = %actor.user_id,
            action = action.as_str(),
            "exam question action denied"
        );
        return Err(e);
    }
    workflow::check_source(action, paper.status)?;
    Ok((paper, committee))
}

fn ensure_course_exists(conn: &Connection, course_id: &str) -> ActionResult<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(ActionError::integrity(format!("course {} does not exist", course_id)));
    }
    Ok(())
}

fn ensure_clos_in_course(conn: &Connection, course_id: &str, items: &[ItemDraft]) -> ActionResult<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for item in items {
        if !seen.insert(item.clo_id.as_str()) {
            continue;
        }
        let owner: Option<String> = conn
            .query_row(
                "SELECT course_id FROM clos WHERE id = ?",
                [&item.clo_id],
                |r| r.get(0),
            )
            .optional()?;
        match owner {
            None => {
                return Err(ActionError::integrity(format!(
                    "CLO {} does not exist",
                    item.clo_id
                )))
            }
            Some(c) if c != course_id => {
                return Err(ActionError::integrity(format!(
                    "CLO {} does not belong to this course",
                    item.clo_id
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// The committee must exist and, when enforced, sit in the course's department.
fn ensure_committee_fits(
    conn: &Connection,
    committee_id: &str,
    course_id: &str,
    enforce_department: bool,
) -> ActionResult<()> {
    let committee = match auth::load_committee(conn, committee_id) {
        Ok(c) => c,
        Err(ActionError::NotFound(_)) => {
            return Err(ActionError::integrity(format!(
                "moderation committee {} does not exist",
                committee_id
            )))
        }
        Err(e) => return Err(e),
    };
    if enforce_department {
        let department = auth::load_course_department(conn, course_id)?;
        if department.id != committee.department_id {
            return Err(ActionError::integrity(
                "moderation committee belongs to a different department than the course",
            ));
        }
    }
    Ok(())
}

fn ensure_assigned(
    conn: &Connection,
    course_id: &str,
    teacher_id: &str,
    paper: &PaperDraft,
) -> ActionResult<()> {
    let assigned: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM course_assignments
             WHERE course_id = ? AND teacher_id = ? AND session = ? AND semester = ?",
            (course_id, teacher_id, &paper.session, &paper.semester),
            |r| r.get(0),
        )
        .optional()?;
    if assigned.is_none() {
        return Err(ActionError::forbidden(
            "you are not assigned to this course for the given session and semester",
        ));
    }
    Ok(())
}

fn insert_items(conn: &Connection, paper_id: &str, items: &[ItemDraft]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO exam_question_items(
            id, exam_question_id, position, question_label, question_text, marks, clo_id,
            blooms_taxonomy_level
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for (position, item) in items.iter().enumerate() {
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            paper_id,
            position as i64,
            item.question_label,
            item.question_text,
            item.marks,
            item.clo_id,
            item.blooms.as_str(),
        ])?;
    }
    Ok(())
}

fn validate_payload(
    conn: &Connection,
    course_id: &str,
    params: &Value,
) -> ActionResult<(PaperDraft, Vec<ItemDraft>)> {
    let limits = settings::exam_questions(conn)?;
    let moderation = settings::moderation(conn)?;
    let paper = workflow::parse_paper(params, limits.max_total_marks)?;
    let items = workflow::parse_items(params, limits.max_items)?;
    if let Some(cid) = paper.moderation_committee_id.as_deref() {
        ensure_committee_fits(conn, cid, course_id, moderation.enforce_committee_department)?;
    }
    ensure_clos_in_course(conn, course_id, &items)?;
    Ok((paper, items))
}

pub fn create(conn: &Connection, actor: &Actor, params: &Value) -> ActionResult<ExamQuestionView> {
    let teacher = actor.require_teacher()?;
    let course_id = crate::params::required_str(params, "courseId")?;
    ensure_course_exists(conn, &course_id)?;
    let (paper, items) = validate_payload(conn, &course_id, params)?;
    ensure_assigned(conn, &course_id, &teacher.id, &paper)?;

    let id = Uuid::new_v4().to_string();
    let now = now_ts();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO exam_questions(
            id, course_id, course_teacher_id, session, semester, total_marks, duration, status,
            moderation_committee_id, moderator_feedback, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        params![
            id,
            course_id,
            teacher.id,
            paper.session,
            paper.semester,
            paper.total_marks,
            paper.duration,
            ExamStatus::Draft.as_str(),
            paper.moderation_committee_id,
            now,
            now,
        ],
    )?;
    insert_items(&tx, &id, &items)?;
    tx.commit()?;

    tracing::info!(
        exam_question_id = %id,
        course_id = %course_id,
        items = items.len(),
        "exam question created"
    );
    fetch_view(conn, &id)
}

/// Replaces scalars and the whole item set; the paper returns to draft.
pub fn update(
    conn: &Connection,
    actor: &Actor,
    id: &str,
    params: &Value,
) -> ActionResult<ExamQuestionView> {
    let (current, _) = guard(conn, actor, id, ExamAction::Edit)?;
    let next = workflow::target_status(ExamAction::Edit, current.status, None)?;
    let (paper, items) = validate_payload(conn, &current.course_id, params)?;
    if paper.session != current.session || paper.semester != current.semester {
        ensure_assigned(conn, &current.course_id, &current.course_teacher_id, &paper)?;
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE exam_questions
         SET session = ?, semester = ?, total_marks = ?, duration = ?,
             moderation_committee_id = ?, moderator_feedback = NULL, status = ?, updated_at = ?
         WHERE id = ?",
        params![
            paper.session,
            paper.semester,
            paper.total_marks,
            paper.duration,
            paper.moderation_committee_id,
            next.as_str(),
            now_ts(),
            id,
        ],
    )?;
    tx.execute(
        "DELETE FROM exam_question_items WHERE exam_question_id = ?",
        [id],
    )?;
    insert_items(&tx, id, &items)?;
    tx.commit()?;

    tracing::info!(
        exam_question_id = %id,
        from = current.status.as_str(),
        to = next.as_str(),
        items = items.len(),
        "exam question edited"
    );
    fetch_view(conn, id)
}

fn set_status(
    conn: &Connection,
    paper: &PaperRow,
    next: ExamStatus,
    feedback: Option<&str>,
) -> ActionResult<()> {
    match feedback {
        Some(f) => conn.execute(
            "UPDATE exam_questions SET status = ?, moderator_feedback = ?, updated_at = ? WHERE id = ?",
            params![next.as_str(), f, now_ts(), paper.id],
        )?,
        None => conn.execute(
            "UPDATE exam_questions SET status = ?, updated_at = ? WHERE id = ?",
            params![next.as_str(), now_ts(), paper.id],
        )?,
    };
    tracing::info!(
        exam_question_id = %paper.id,
        from = paper.status.as_str(),
        to = next.as_str(),
        "exam question transition"
    );
    Ok(())
}

pub fn submit(conn: &Connection, actor: &Actor, id: &str) -> ActionResult<ExamQuestionView> {
    let (paper, _) = guard(conn, actor, id, ExamAction::Submit)?;
    let Some(committee_id) = paper.moderation_committee_id.as_deref() else {
        return Err(ActionError::State {
            code: "committee_required",
            message: "select a moderation committee before submitting".to_string(),
        });
    };
    let moderation = settings::moderation(conn)?;
    ensure_committee_fits(
        conn,
        committee_id,
        &paper.course_id,
        moderation.enforce_committee_department,
    )?;
    let next = workflow::target_status(ExamAction::Submit, paper.status, None)?;
    set_status(conn, &paper, next, None)?;
    fetch_view(conn, id)
}

pub fn start_review(conn: &Connection, actor: &Actor, id: &str) -> ActionResult<ExamQuestionView> {
    let (paper, _) = guard(conn, actor, id, ExamAction::StartReview)?;
    let next = workflow::target_status(ExamAction::StartReview, paper.status, None)?;
    set_status(conn, &paper, next, None)?;
    fetch_view(conn, id)
}

pub fn approve(conn: &Connection, actor: &Actor, id: &str) -> ActionResult<ExamQuestionView> {
    let (paper, _) = guard(conn, actor, id, ExamAction::Approve)?;
    let next = workflow::target_status(ExamAction::Approve, paper.status, None)?;
    let stamp = workflow::approval_stamp(actor.display_name(), &now_ts());
    set_status(conn, &paper, next, Some(&stamp))?;
    fetch_view(conn, id)
}

pub fn request_revision(
    conn: &Connection,
    actor: &Actor,
    id: &str,
    feedback: &str,
) -> ActionResult<ExamQuestionView> {
    let (paper, _) = guard(conn, actor, id, ExamAction::RequestRevision)?;
    let moderation = settings::moderation(conn)?;
    let feedback = workflow::validate_feedback(feedback, moderation.min_revision_feedback_chars)?;
    let next = workflow::target_status(ExamAction::RequestRevision, paper.status, None)?;
    let combined = workflow::append_revision_feedback(
        paper.moderator_feedback.as_deref(),
        &feedback,
        actor.display_name(),
        &now_ts(),
    );
    set_status(conn, &paper, next, Some(&combined))?;
    fetch_view(conn, id)
}

/// Writes per-item annotations and the paper status in one transaction.
pub fn review_items(
    conn: &Connection,
    actor: &Actor,
    id: &str,
    reviews: &[ItemReview],
    requested: ExamStatus,
) -> ActionResult<ExamQuestionView> {
    let (paper, _) = guard(conn, actor, id, ExamAction::ReviewItems)?;
    let next = workflow::target_status(ExamAction::ReviewItems, paper.status, Some(requested))?;

    let existing: HashSet<String> = load_items(conn, id)?.into_iter().map(|i| i.id).collect();
    if let Some(stray) = reviews.iter().find(|r| !existing.contains(&r.item_id)) {
        return Err(ActionError::integrity(format!(
            "item {} does not belong to this exam question",
            stray.item_id
        )));
    }

    let tx = conn.unchecked_transaction()?;
    for r in reviews {
        tx.execute(
            "UPDATE exam_question_items SET is_satisfactory = ?, moderator_comment = ?
             WHERE id = ? AND exam_question_id = ?",
            params![r.is_satisfactory.as_str(), r.moderator_comment, r.item_id, id],
        )?;
    }
    set_status(&tx, &paper, next, None)?;
    tx.commit()?;
    fetch_view(conn, id)
}

pub fn delete(conn: &Connection, actor: &Actor, id: &str) -> ActionResult<()> {
    guard(conn, actor, id, ExamAction::Delete)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM exam_question_items WHERE exam_question_id = ?",
        [id],
    )?;
    tx.execute("DELETE FROM exam_questions WHERE id = ?", [id])?;
    tx.commit()?;
    tracing::info!(exam_question_id = %id, "exam question deleted");
    Ok(())
}

pub fn print(conn: &Connection, actor: &Actor, id: &str) -> ActionResult<PrintModel> {
    guard(conn, actor, id, ExamAction::Print)?;
    let view = fetch_view(conn, id)?;
    let item_marks_sum = view.items.iter().map(|i| i.marks).sum();
    Ok(PrintModel {
        exam_question_id: view.id,
        course_code: view.course_code,
        course_title: view.course_title,
        course_teacher_name: view.course_teacher_name,
        session: view.session,
        semester: view.semester,
        total_marks: view.total_marks,
        duration: view.duration,
        approval: view.moderator_feedback,
        items: view
            .items
            .into_iter()
            .map(|i| PrintItem {
                position: i.position,
                question_label: i.question_label,
                question_text: i.question_text,
                marks: i.marks,
                clo_code: i.clo_code,
                blooms_taxonomy_level: i.blooms_taxonomy_level,
            })
            .collect(),
        item_marks_sum,
        generated_at: now_ts(),
    })
}

/// Whether the actor may read the paper at all: author, committee seat, or admin.
pub fn can_view(conn: &Connection, actor: &Actor, paper: &PaperRow) -> ActionResult<bool> {
    if actor.is_admin() || actor.teacher_id() == Some(paper.course_teacher_id.as_str()) {
        return Ok(true);
    }
    let Some(teacher) = actor.teacher.as_ref() else {
        return Ok(false);
    };
    Ok(load_paper_committee(conn, paper)?
        .is_some_and(|c| auth::is_committee_member(teacher, &c)))
}

pub fn open(conn: &Connection, actor: &Actor, id: &str) -> ActionResult<ExamQuestionView> {
    let paper = load_paper(conn, id)?;
    if !can_view(conn, actor, &paper)? {
        return Err(ActionError::forbidden("you may not view this exam question"));
    }
    fetch_view(conn, id)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamQuestionSummary {
    pub id: String,
    pub course_id: String,
    pub course_code: String,
    pub course_teacher_id: String,
    pub session: String,
    pub semester: String,
    pub total_marks: i64,
    pub status: String,
    pub moderation_committee_id: Option<String>,
    pub item_count: i64,
    pub updated_at: String,
}

pub fn list(
    conn: &Connection,
    actor: &Actor,
    course_id: Option<&str>,
    status: Option<ExamStatus>,
) -> ActionResult<Vec<ExamQuestionSummary>> {
    let teacher_id = actor.teacher_id().unwrap_or("");
    if !actor.is_admin() && teacher_id.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT q.id, q.course_id, c.code, q.course_teacher_id, q.session, q.semester,
                q.total_marks, q.status, q.moderation_committee_id,
                (SELECT COUNT(*) FROM exam_question_items i WHERE i.exam_question_id = q.id),
                q.updated_at
         FROM exam_questions q
         JOIN courses c ON c.id = q.course_id
         WHERE (?1 IS NULL OR q.course_id = ?1)
           AND (?2 IS NULL OR q.status = ?2)
           AND (
             ?3 = 1
             OR q.course_teacher_id = ?4
             OR EXISTS (
               SELECT 1 FROM moderation_committees mc
               WHERE mc.id = q.moderation_committee_id
                 AND (mc.chairman_id = ?4
                      OR EXISTS (SELECT 1 FROM moderation_committee_members m
                                 WHERE m.committee_id = mc.id AND m.teacher_id = ?4))
             )
           )
         ORDER BY q.updated_at DESC, q.id",
    )?;
    let rows = stmt
        .query_map(
            params![
                course_id,
                status.map(|s| s.as_str()),
                actor.is_admin() as i64,
                teacher_id
            ],
            |r| {
                Ok(ExamQuestionSummary {
                    id: r.get(0)?,
                    course_id: r.get(1)?,
                    course_code: r.get(2)?,
                    course_teacher_id: r.get(3)?,
                    session: r.get(4)?,
                    semester: r.get(5)?,
                    total_marks: r.get(6)?,
                    status: r.get(7)?,
                    moderation_committee_id: r.get(8)?,
                    item_count: r.get(9)?,
                    updated_at: r.get(10)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, TeacherProfile};
    use serde_json::json;

    // Department d1 holds course k1 with CLOs clo1/clo2; course k2 has clo9.
    // Teacher t1 (owner) is assigned to k1 for 2024-2025/I. Committee c1 in d1
    // is chaired by t2 with member t3; committee c2 sits in department d2.
    fn seeded() -> Connection {
        let conn = crate::db::open_in_memory();
        conn.execute_batch(
            "INSERT INTO users(id, name, email, role, created_at) VALUES
               ('uf', 'Faculty', 'f@x', 'faculty', 't'),
               ('u1', 'Owner', 'u1@x', 'teacher', 't'),
               ('u2', 'Chair', 'u2@x', 'teacher', 't'),
               ('u3', 'Member', 'u3@x', 'teacher', 't'),
               ('u4', 'Outsider', 'u4@x', 'teacher', 't');
             INSERT INTO faculties(id, user_id, name) VALUES('f1', 'uf', 'Engineering');
             INSERT INTO departments(id, faculty_id, name) VALUES('d1', 'f1', 'CSE'), ('d2', 'f1', 'EEE');
             INSERT INTO teachers(id, user_id, department_id, name) VALUES
               ('t1', 'u1', 'd1', 'Dr. Owner'),
               ('t2', 'u2', 'd1', 'Dr. Chair'),
               ('t3', 'u3', 'd1', 'Dr. Member'),
               ('t4', 'u4', 'd1', 'Dr. Outsider');
             INSERT INTO programs(id, faculty_id, department_id, name) VALUES('p1', 'f1', 'd1', 'BSc CSE');
             INSERT INTO courses(id, program_id, code, title, credit_hours) VALUES
               ('k1', 'p1', 'CSE101', 'Programming', 3.0),
               ('k2', 'p1', 'CSE102', 'Discrete Math', 3.0);
             INSERT INTO clos(id, course_id, code, description) VALUES
               ('clo1', 'k1', 'CLO1', 'Write programs'),
               ('clo2', 'k1', 'CLO2', 'Debug programs'),
               ('clo9', 'k2', 'CLO1', 'Prove things');
             INSERT INTO course_assignments(id, course_id, teacher_id, session, semester, updated_at)
               VALUES('a1', 'k1', 't1', '2024-2025', 'I', 't');
             INSERT INTO moderation_committees(id, department_id, chairman_id, session, semester, created_at, updated_at)
               VALUES('c1', 'd1', 't2', '2024-2025', 'I', 't', 't'),
                     ('c2', 'd2', 't2', '2024-2025', 'I', 't', 't');
             INSERT INTO moderation_committee_members(committee_id, teacher_id) VALUES('c1', 't3');",
        )
        .expect("seed");
        conn
    }

    fn teacher(n: u8) -> Actor {
        let names = ["", "Dr. Owner", "Dr. Chair", "Dr. Member", "Dr. Outsider"];
        Actor {
            user_id: format!("u{n}"),
            name: names[n as usize].to_string(),
            role: Role::Teacher,
            teacher: Some(TeacherProfile {
                id: format!("t{n}"),
                department_id: "d1".into(),
                name: names[n as usize].to_string(),
            }),
        }
    }

    fn admin() -> Actor {
        Actor {
            user_id: "ua".into(),
            name: "Admin".into(),
            role: Role::Admin,
            teacher: None,
        }
    }

    fn payload(committee: Option<&str>) -> Value {
        json!({
            "courseId": "k1",
            "session": "2024-2025",
            "semester": "I",
            "totalMarks": 20,
            "duration": "2 hours",
            "moderationCommitteeId": committee,
            "items": [
                { "questionLabel": "1(a)", "questionText": "Explain loops", "marks": 5, "cloId": "clo1", "bloomsTaxonomyLevel": "understand" },
                { "questionLabel": "1(b)", "questionText": "Write a sort", "marks": 10, "cloId": "clo2", "bloomsTaxonomyLevel": "apply" }
            ]
        })
    }

    fn snapshot(conn: &Connection, id: &str) -> String {
        serde_json::to_string(&fetch_view(conn, id).unwrap()).unwrap()
    }

    #[test]
    fn create_stores_draft_with_positions_in_input_order() {
        let conn = seeded();
        let view = create(&conn, &teacher(1), &payload(None)).unwrap();
        assert_eq!(view.status, "draft");
        assert_eq!(view.items.len(), 2);
        let positions: Vec<i64> = view.items.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert_eq!(view.items[0].question_label, "1(a)");
        assert_eq!(view.items[1].clo_code.as_deref(), Some("CLO2"));
        assert!(view.items.iter().all(|i| i.is_satisfactory.is_none()));
    }

    #[test]
    fn create_requires_assignment_and_course_clos() {
        let conn = seeded();
        let err = create(&conn, &teacher(4), &payload(None)).unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let mut foreign = payload(None);
        foreign["items"][1]["cloId"] = json!("clo9");
        let err = create(&conn, &teacher(1), &foreign).unwrap_err();
        assert_eq!(err.code(), "integrity");
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM exam_questions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn committee_from_another_department_is_rejected_when_enforced() {
        let conn = seeded();
        let err = create(&conn, &teacher(1), &payload(Some("c2"))).unwrap_err();
        assert_eq!(err.code(), "integrity");

        crate::db::settings_set_json(
            &conn,
            "setup.moderation",
            &json!({ "enforceCommitteeDepartment": false }),
        )
        .unwrap();
        assert!(create(&conn, &teacher(1), &payload(Some("c2"))).is_ok());
    }

    #[test]
    fn submit_without_committee_is_a_soft_noop_then_succeeds_once() {
        let conn = seeded();
        let id = create(&conn, &teacher(1), &payload(None)).unwrap().id;
        let before = snapshot(&conn, &id);
        let err = submit(&conn, &teacher(1), &id).unwrap_err();
        assert_eq!(err.code(), "committee_required");
        assert_eq!(snapshot(&conn, &id), before);

        update(&conn, &teacher(1), &id, &payload(Some("c1"))).unwrap();
        assert_eq!(submit(&conn, &teacher(1), &id).unwrap().status, "submitted");
        assert_eq!(
            submit(&conn, &teacher(1), &id).unwrap_err().code(),
            "invalid_state"
        );
    }

    #[test]
    fn non_owner_mutations_leave_paper_untouched() {
        let conn = seeded();
        let id = create(&conn, &teacher(1), &payload(Some("c1"))).unwrap().id;
        let before = snapshot(&conn, &id);
        for actor in [teacher(2), teacher(4), admin()] {
            assert_eq!(
                update(&conn, &actor, &id, &payload(None)).unwrap_err().code(),
                "forbidden"
            );
            assert_eq!(submit(&conn, &actor, &id).unwrap_err().code(), "forbidden");
            assert_eq!(delete(&conn, &actor, &id).unwrap_err().code(), "forbidden");
        }
        assert_eq!(snapshot(&conn, &id), before);
    }

    #[test]
    fn edit_replaces_items_with_fresh_ids_and_clears_feedback() {
        let conn = seeded();
        let first = create(&conn, &teacher(1), &payload(Some("c1"))).unwrap();
        submit(&conn, &teacher(1), &first.id).unwrap();
        request_revision(&conn, &teacher(3), &first.id, "Question 1(b) is too long").unwrap();

        let mut edited = payload(Some("c1"));
        edited["items"] = json!([
            { "questionLabel": "Q1", "questionText": "New one", "marks": 7, "cloId": "clo2", "bloomsTaxonomyLevel": "analyze" },
            { "questionLabel": "Q2", "questionText": "New two", "marks": 3, "cloId": "clo1", "bloomsTaxonomyLevel": "remember" },
            { "questionLabel": "Q3", "questionText": "New three", "marks": 10, "cloId": "clo1", "bloomsTaxonomyLevel": "create" }
        ]);
        let after = update(&conn, &teacher(1), &first.id, &edited).unwrap();
        assert_eq!(after.status, "draft");
        assert_eq!(after.moderator_feedback, None);
        assert_eq!(after.items.len(), 3);
        let old_ids: HashSet<&str> = first.items.iter().map(|i| i.id.as_str()).collect();
        assert!(after.items.iter().all(|i| !old_ids.contains(i.id.as_str())));
        let labels: Vec<&str> = after.items.iter().map(|i| i.question_label.as_str()).collect();
        assert_eq!(labels, vec!["Q1", "Q2", "Q3"]);

        let reread = fetch_view(&conn, &first.id).unwrap();
        assert_eq!(
            serde_json::to_value(&reread.items).unwrap(),
            serde_json::to_value(&after.items).unwrap()
        );
    }

    #[test]
    fn edit_cannot_move_paper_to_an_unassigned_semester() {
        let conn = seeded();
        let id = create(&conn, &teacher(1), &payload(None)).unwrap().id;
        let before = snapshot(&conn, &id);
        let mut moved = payload(None);
        moved["semester"] = json!("II");
        assert_eq!(
            update(&conn, &teacher(1), &id, &moved).unwrap_err().code(),
            "forbidden"
        );
        assert_eq!(snapshot(&conn, &id), before);

        conn.execute(
            "INSERT INTO course_assignments(id, course_id, teacher_id, session, semester, updated_at)
             VALUES('a2', 'k1', 't1', '2024-2025', 'II', 't')",
            [],
        )
        .unwrap();
        assert_eq!(update(&conn, &teacher(1), &id, &moved).unwrap().semester, "II");
    }

    #[test]
    fn unknown_stored_status_fails_to_load() {
        let conn = seeded();
        let id = create(&conn, &teacher(1), &payload(None)).unwrap().id;
        conn.execute("UPDATE exam_questions SET status = 'archived' WHERE id = ?", [&id])
            .unwrap();
        assert_eq!(load_paper(&conn, &id).unwrap_err().code(), "db_query_failed");
        assert_eq!(load_paper(&conn, "missing").unwrap_err().code(), "not_found");
    }

    #[test]
    fn failed_edit_keeps_previous_items() {
        let conn = seeded();
        let first = create(&conn, &teacher(1), &payload(None)).unwrap();
        let before = snapshot(&conn, &first.id);
        let mut bad = payload(None);
        bad["items"][0]["cloId"] = json!("missing-clo");
        assert_eq!(
            update(&conn, &teacher(1), &first.id, &bad).unwrap_err().code(),
            "integrity"
        );
        assert_eq!(snapshot(&conn, &first.id), before);
    }

    #[test]
    fn moderation_from_draft_is_a_state_error() {
        let conn = seeded();
        let id = create(&conn, &teacher(1), &payload(Some("c1"))).unwrap().id;
        assert_eq!(approve(&conn, &teacher(2), &id).unwrap_err().code(), "invalid_state");
        assert_eq!(
            request_revision(&conn, &teacher(2), &id, "Needs more CLO2 coverage")
                .unwrap_err()
                .code(),
            "invalid_state"
        );
    }

    #[test]
    fn chairman_without_member_row_can_approve() {
        let conn = seeded();
        let id = create(&conn, &teacher(1), &payload(Some("c1"))).unwrap().id;
        submit(&conn, &teacher(1), &id).unwrap();
        let view = approve(&conn, &teacher(2), &id).unwrap();
        assert_eq!(view.status, "approved");
        assert!(view.moderator_feedback.unwrap().contains("Dr. Chair"));
        assert_eq!(
            update(&conn, &teacher(1), &id, &payload(Some("c1"))).unwrap_err().code(),
            "invalid_state"
        );
    }

    #[test]
    fn outsider_and_short_feedback_cannot_request_revision() {
        let conn = seeded();
        let id = create(&conn, &teacher(1), &payload(Some("c1"))).unwrap().id;
        submit(&conn, &teacher(1), &id).unwrap();
        assert_eq!(
            request_revision(&conn, &teacher(4), &id, "This is wrong entirely")
                .unwrap_err()
                .code(),
            "forbidden"
        );
        assert_eq!(
            request_revision(&conn, &teacher(3), &id, "too short")
                .unwrap_err()
                .code(),
            "bad_params"
        );
        assert_eq!(fetch_view(&conn, &id).unwrap().status, "submitted");

        start_review(&conn, &teacher(3), &id).unwrap();
        let view = request_revision(&conn, &teacher(3), &id, "Rebalance the marks").unwrap();
        assert_eq!(view.status, "revision_needed");
        let fb = view.moderator_feedback.unwrap();
        assert!(fb.contains("Dr. Member"));
        assert!(fb.contains("Rebalance the marks"));
    }

    #[test]
    fn review_items_writes_annotations_and_status_together() {
        let conn = seeded();
        let view = create(&conn, &teacher(1), &payload(Some("c1"))).unwrap();
        submit(&conn, &teacher(1), &view.id).unwrap();
        let reviews = vec![
            ItemReview {
                item_id: view.items[0].id.clone(),
                is_satisfactory: workflow::Satisfaction::Yes,
                moderator_comment: None,
            },
            ItemReview {
                item_id: view.items[1].id.clone(),
                is_satisfactory: workflow::Satisfaction::No,
                moderator_comment: Some("ambiguous".into()),
            },
        ];
        let after =
            review_items(&conn, &teacher(3), &view.id, &reviews, ExamStatus::RevisionNeeded)
                .unwrap();
        assert_eq!(after.status, "revision_needed");
        assert_eq!(after.items[0].is_satisfactory.as_deref(), Some("yes"));
        assert_eq!(after.items[1].moderator_comment.as_deref(), Some("ambiguous"));
        // Ids survive review; only the annotations changed.
        assert_eq!(after.items[1].id, view.items[1].id);

        let stray = vec![ItemReview {
            item_id: "not-an-item".into(),
            is_satisfactory: workflow::Satisfaction::Yes,
            moderator_comment: None,
        }];
        assert_eq!(
            review_items(&conn, &teacher(3), &view.id, &stray, ExamStatus::Approved)
                .unwrap_err()
                .code(),
            "integrity"
        );
        assert_eq!(fetch_view(&conn, &view.id).unwrap().status, "revision_needed");
    }

    #[test]
    fn print_needs_approval_and_allows_admin() {
        let conn = seeded();
        let id = create(&conn, &teacher(1), &payload(Some("c1"))).unwrap().id;
        assert_eq!(print(&conn, &teacher(1), &id).unwrap_err().code(), "invalid_state");
        submit(&conn, &teacher(1), &id).unwrap();
        approve(&conn, &teacher(3), &id).unwrap();
        let model = print(&conn, &admin(), &id).unwrap();
        assert_eq!(model.items.len(), 2);
        assert_eq!(model.item_marks_sum, 15.0);
        assert_eq!(model.total_marks, 20);
        assert_eq!(print(&conn, &teacher(4), &id).unwrap_err().code(), "forbidden");
    }

    #[test]
    fn dissolved_committee_hands_submitted_paper_back_to_owner() {
        let conn = seeded();
        let id = create(&conn, &teacher(1), &payload(Some("c1"))).unwrap().id;
        submit(&conn, &teacher(1), &id).unwrap();
        crate::committees::dissolve(&conn, &teacher(2), "c1").unwrap();

        let view = fetch_view(&conn, &id).unwrap();
        assert_eq!(view.status, "revision_needed");
        assert_eq!(view.moderation_committee_id, None);
        assert!(view.moderator_feedback.unwrap().contains("dissolved"));

        let edited = update(&conn, &teacher(1), &id, &payload(None)).unwrap();
        assert_eq!(edited.status, "draft");
        assert_eq!(
            submit(&conn, &teacher(1), &id).unwrap_err().code(),
            "committee_required"
        );
    }

    #[test]
    fn delete_removes_items_and_list_respects_visibility() {
        let conn = seeded();
        let keep = create(&conn, &teacher(1), &payload(Some("c1"))).unwrap().id;
        let gone = create(&conn, &teacher(1), &payload(None)).unwrap().id;
        delete(&conn, &teacher(1), &gone).unwrap();
        let items: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM exam_question_items WHERE exam_question_id = ?",
                [&gone],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(items, 0);

        assert_eq!(list(&conn, &teacher(1), None, None).unwrap().len(), 1);
        assert_eq!(list(&conn, &teacher(3), None, None).unwrap()[0].id, keep);
        assert!(list(&conn, &teacher(4), None, None).unwrap().is_empty());
        assert_eq!(
            list(&conn, &admin(), Some("k1"), Some(ExamStatus::Draft))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(open(&conn, &teacher(4), &keep).unwrap_err().code(), "forbidden");
    }
}
