use crate::auth::{self, Actor, Role};
use crate::db::now_ts;
use crate::error::{ActionError, ActionResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherView {
    pub id: String,
    pub user_id: String,
    pub department_id: String,
    pub name: String,
    pub designation: Option<String>,
    pub email: String,
}

fn user_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<UserView> {
    Ok(UserView {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        role: r.get(3)?,
        created_at: r.get(4)?,
    })
}

fn teacher_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<TeacherView> {
    Ok(TeacherView {
        id: r.get(0)?,
        user_id: r.get(1)?,
        department_id: r.get(2)?,
        name: r.get(3)?,
        designation: r.get(4)?,
        email: r.get(5)?,
    })
}

const TEACHER_SQL: &str = "SELECT t.id, t.user_id, t.department_id, t.name, t.designation, u.email
     FROM teachers t JOIN users u ON u.id = t.user_id";

fn insert_user(conn: &Connection, name: &str, email: &str, role: Role) -> ActionResult<String> {
    let email = email.trim().to_ascii_lowercase();
    if !email.contains('@') {
        return Err(ActionError::field("email", "email must contain @"));
    }
    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(ActionError::integrity(format!("email {} is already registered", email)));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, name, email, role, created_at) VALUES(?, ?, ?, ?, ?)",
        params![id, name, email, role.as_str(), now_ts()],
    )?;
    Ok(id)
}

/// Registers a login identity. There is no authentication layer, so this is open.
pub fn create_user(conn: &Connection, name: &str, email: &str, role: &str) -> ActionResult<UserView> {
    let role = Role::parse(role.trim())
        .ok_or_else(|| ActionError::field("role", format!("unknown role {}", role)))?;
    let id = insert_user(conn, name, email, role)?;
    tracing::info!(user_id = %id, role = role.as_str(), "user registered");
    Ok(conn.query_row(
        "SELECT id, name, email, role, created_at FROM users WHERE id = ?",
        [&id],
        user_from_row,
    )?)
}

pub fn list_users(conn: &Connection, actor: &Actor) -> ActionResult<Vec<UserView>> {
    if !actor.is_admin() {
        return Err(ActionError::forbidden("only admins may list users"));
    }
    let mut stmt =
        conn.prepare("SELECT id, name, email, role, created_at FROM users ORDER BY name, email")?;
    let rows = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct NewTeacher<'a> {
    pub department_id: &'a str,
    pub name: &'a str,
    pub designation: Option<&'a str>,
    /// Existing user to attach the profile to.
    pub user_id: Option<&'a str>,
    /// Used to register a fresh teacher user when `user_id` is absent.
    pub email: Option<&'a str>,
}

/// Adds a teacher profile to a department. Admins and the owning faculty account only.
pub fn create_teacher(conn: &Connection, actor: &Actor, new: &NewTeacher<'_>) -> ActionResult<TeacherView> {
    let department = match auth::load_department(conn, new.department_id) {
        Ok(d) => d,
        Err(ActionError::NotFound(_)) => {
            return Err(ActionError::integrity(format!(
                "department {} does not exist",
                new.department_id
            )))
        }
        Err(e) => return Err(e),
    };
    if !(actor.is_admin() || auth::owns_department(actor, &department)) {
        tracing::warn!(actor = %actor.user_id, department_id = %new.department_id, "teacher registration denied");
        return Err(ActionError::forbidden(
            "only the faculty account or an admin may add teachers",
        ));
    }

    let tx = conn.unchecked_transaction()?;
    let user_id = match (new.user_id, new.email) {
        (Some(uid), _) => {
            let found: Option<i64> = tx
                .query_row("SELECT 1 FROM users WHERE id = ?", [uid], |r| r.get(0))
                .optional()?;
            if found.is_none() {
                return Err(ActionError::integrity(format!("user {} does not exist", uid)));
            }
            let profiled: Option<i64> = tx
                .query_row("SELECT 1 FROM teachers WHERE user_id = ?", [uid], |r| r.get(0))
                .optional()?;
            if profiled.is_some() {
                return Err(ActionError::integrity(format!(
                    "user {} already has a teacher profile",
                    uid
                )));
            }
            uid.to_string()
        }
        (None, Some(email)) => insert_user(&tx, new.name, email, Role::Teacher)?,
        (None, None) => return Err(ActionError::field("email", "userId or email is required")),
    };

    let id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO teachers(id, user_id, department_id, name, designation) VALUES(?, ?, ?, ?, ?)",
        params![id, user_id, new.department_id, new.name, new.designation],
    )?;
    tx.commit()?;
    tracing::info!(teacher_id = %id, department_id = %new.department_id, "teacher registered");

    let sql = format!("{} WHERE t.id = ?", TEACHER_SQL);
    Ok(conn.query_row(&sql, [&id], teacher_from_row)?)
}

pub fn list_teachers(conn: &Connection, department_id: Option<&str>) -> ActionResult<Vec<TeacherView>> {
    let sql = format!(
        "{} WHERE (?1 IS NULL OR t.department_id = ?1) ORDER BY t.name",
        TEACHER_SQL
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([department_id], teacher_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
