use crate::auth::{self, Actor};
use crate::db::now_ts;
use crate::error::{ActionError, ActionResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub id: String,
    pub course_id: String,
    pub course_code: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub session: String,
    pub semester: String,
    pub assigned_by: Option<String>,
    pub updated_at: String,
}

const VIEW_SQL: &str = "SELECT a.id, a.course_id, c.code, a.teacher_id, t.name, a.session,
            a.semester, a.assigned_by, a.updated_at
     FROM course_assignments a
     JOIN courses c ON c.id = a.course_id
     JOIN teachers t ON t.id = a.teacher_id";

fn view_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AssignmentView> {
    Ok(AssignmentView {
        id: r.get(0)?,
        course_id: r.get(1)?,
        course_code: r.get(2)?,
        teacher_id: r.get(3)?,
        teacher_name: r.get(4)?,
        session: r.get(5)?,
        semester: r.get(6)?,
        assigned_by: r.get(7)?,
        updated_at: r.get(8)?,
    })
}

fn authorize_for_course(conn: &Connection, actor: &Actor, course_id: &str) -> ActionResult<()> {
    let department = match auth::load_course_department(conn, course_id) {
        Ok(d) => d,
        Err(ActionError::NotFound(_)) => {
            return Err(ActionError::integrity(format!("course {} does not exist", course_id)))
        }
        Err(e) => return Err(e),
    };
    if auth::can_administer_department(actor, &department) {
        return Ok(());
    }
    tracing::warn!(actor = %actor.user_id, course_id = %course_id, "course assignment denied");
    Err(ActionError::forbidden(
        "only the department chairman or an admin may assign courses",
    ))
}

/// Sets the teacher for (course, session, semester), overwriting any earlier assignment.
pub fn assign(
    conn: &Connection,
    actor: &Actor,
    course_id: &str,
    teacher_id: &str,
    session: &str,
    semester: &str,
) -> ActionResult<AssignmentView> {
    if session.trim().is_empty() {
        return Err(ActionError::field("session", "missing session"));
    }
    if semester.trim().is_empty() {
        return Err(ActionError::field("semester", "missing semester"));
    }
    authorize_for_course(conn, actor, course_id)?;
    let teacher_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [teacher_id], |r| r.get(0))
        .optional()?;
    if teacher_exists.is_none() {
        return Err(ActionError::integrity(format!("teacher {} does not exist", teacher_id)));
    }

    conn.execute(
        "INSERT INTO course_assignments(id, course_id, teacher_id, session, semester, assigned_by, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(course_id, session, semester) DO UPDATE SET
           teacher_id = excluded.teacher_id,
           assigned_by = excluded.assigned_by,
           updated_at = excluded.updated_at",
        params![
            Uuid::new_v4().to_string(),
            course_id,
            teacher_id,
            session.trim(),
            semester.trim(),
            actor.teacher_id(),
            now_ts(),
        ],
    )?;
    tracing::info!(
        course_id = %course_id,
        teacher_id = %teacher_id,
        session = %session,
        semester = %semester,
        "course assigned"
    );

    let sql = format!(
        "{} WHERE a.course_id = ? AND a.session = ? AND a.semester = ?",
        VIEW_SQL
    );
    Ok(conn.query_row(
        &sql,
        params![course_id, session.trim(), semester.trim()],
        view_from_row,
    )?)
}

pub fn unassign(conn: &Connection, actor: &Actor, assignment_id: &str) -> ActionResult<()> {
    let course_id: Option<String> = conn
        .query_row(
            "SELECT course_id FROM course_assignments WHERE id = ?",
            [assignment_id],
            |r| r.get(0),
        )
        .optional()?;
    let course_id = course_id.ok_or(ActionError::NotFound("course assignment"))?;
    authorize_for_course(conn, actor, &course_id)?;
    conn.execute("DELETE FROM course_assignments WHERE id = ?", [assignment_id])?;
    tracing::info!(assignment_id = %assignment_id, "course unassigned");
    Ok(())
}

#[derive(Debug, Default, Clone)]
pub struct AssignmentFilter {
    pub course_id: Option<String>,
    pub teacher_id: Option<String>,
    pub session: Option<String>,
    pub semester: Option<String>,
}

pub fn list(conn: &Connection, filter: &AssignmentFilter) -> ActionResult<Vec<AssignmentView>> {
    let sql = format!(
        "{} WHERE (?1 IS NULL OR a.course_id = ?1)
           AND (?2 IS NULL OR a.teacher_id = ?2)
           AND (?3 IS NULL OR a.session = ?3)
           AND (?4 IS NULL OR a.semester = ?4)
         ORDER BY a.session DESC, a.semester, c.code",
        VIEW_SQL
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![
                filter.course_id,
                filter.teacher_id,
                filter.session,
                filter.semester
            ],
            view_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
