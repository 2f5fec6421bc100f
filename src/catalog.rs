//! Plain validated CRUD for the academic hierarchy.
//!
//! Each record kind is described by a static [`KindDef`]: its table, parent
//! column, scalar fields and many-to-many link sets. Writes are gated by the
//! ownership chain up to the owning department (or faculty), and link sets
//! are replaced wholesale whenever a write carries them.

use crate::assignments;
use crate::auth::{self, Actor, DepartmentRef, FacultyRef, Role};
use crate::error::{ActionError, ActionResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Faculty,
    Department,
    Program,
    Peo,
    Plo,
    Course,
    Co,
    Clo,
    Content,
    Book,
    LessonPlan,
}

#[derive(Clone, Copy, Debug)]
enum FieldType {
    Text,
    OptText,
    Real { min: f64 },
    Int { min: i64 },
    OptInt { min: i64 },
    TeacherRef,
}

#[derive(Debug)]
struct Field {
    param: &'static str,
    column: &'static str,
    ty: FieldType,
}

#[derive(Clone, Copy, Debug)]
enum LinkScope {
    /// Target CLO must belong to the record's course.
    SameCourse,
    /// Target PLO must belong to the program of the record's course.
    SameProgram,
}

#[derive(Debug)]
struct Link {
    param: &'static str,
    table: &'static str,
    owner_col: &'static str,
    target_col: &'static str,
    scope: LinkScope,
}

#[derive(Debug)]
struct Parent {
    param: &'static str,
    column: &'static str,
    kind: EntityKind,
}

#[derive(Debug)]
pub struct KindDef {
    kind: EntityKind,
    prefix: &'static str,
    noun: &'static str,
    table: &'static str,
    parent: Option<Parent>,
    fields: &'static [Field],
    links: &'static [Link],
    /// Rows elsewhere that block deletion: (table, column).
    blockers: &'static [(&'static str, &'static str)],
    order_by: &'static str,
}

const fn text(param: &'static str, column: &'static str) -> Field {
    Field { param, column, ty: FieldType::Text }
}

const fn opt_text(param: &'static str, column: &'static str) -> Field {
    Field { param, column, ty: FieldType::OptText }
}

const CODE_DESCRIPTION: &[Field] = &[text("code", "code"), text("description", "description")];

const CLO_LINKS: &[Link] = &[Link {
    param: "cloIds",
    table: "content_clo",
    owner_col: "content_id",
    target_col: "clo_id",
    scope: LinkScope::SameCourse,
}];

const LESSON_PLAN_LINKS: &[Link] = &[Link {
    param: "cloIds",
    table: "lesson_plan_clo",
    owner_col: "lesson_plan_id",
    target_col: "clo_id",
    scope: LinkScope::SameCourse,
}];

const KINDS: &[KindDef] = &[
    KindDef {
        kind: EntityKind::Faculty,
        prefix: "faculties",
        noun: "faculty",
        table: "faculties",
        parent: None,
        fields: &[
            text("name", "name"),
            opt_text("shortName", "short_name"),
            Field { param: "deanId", column: "dean_id", ty: FieldType::TeacherRef },
        ],
        links: &[],
        blockers: &[("departments", "faculty_id"), ("programs", "faculty_id")],
        order_by: "name",
    },
    KindDef {
        kind: EntityKind::Department,
        prefix: "departments",
        noun: "department",
        table: "departments",
        parent: Some(Parent { param: "facultyId", column: "faculty_id", kind: EntityKind::Faculty }),
        fields: &[
            text("name", "name"),
            opt_text("shortName", "short_name"),
            Field { param: "chairmanId", column: "chairman_id", ty: FieldType::TeacherRef },
        ],
        links: &[],
        blockers: &[
            ("programs", "department_id"),
            ("teachers", "department_id"),
            ("moderation_committees", "department_id"),
        ],
        order_by: "name",
    },
    KindDef {
        kind: EntityKind::Program,
        prefix: "programs",
        noun: "program",
        table: "programs",
        parent: Some(Parent { param: "departmentId", column: "department_id", kind: EntityKind::Department }),
        fields: &[text("name", "name"), opt_text("code", "code"), opt_text("description", "description")],
        links: &[],
        blockers: &[("peos", "program_id"), ("plos", "program_id"), ("courses", "program_id")],
        order_by: "name",
    },
    KindDef {
        kind: EntityKind::Peo,
        prefix: "peos",
        noun: "PEO",
        table: "peos",
        parent: Some(Parent { param: "programId", column: "program_id", kind: EntityKind::Program }),
        fields: CODE_DESCRIPTION,
        links: &[],
        blockers: &[],
        order_by: "code",
    },
    KindDef {
        kind: EntityKind::Plo,
        prefix: "plos",
        noun: "PLO",
        table: "plos",
        parent: Some(Parent { param: "programId", column: "program_id", kind: EntityKind::Program }),
        fields: CODE_DESCRIPTION,
        links: &[],
        blockers: &[],
        order_by: "code",
    },
    KindDef {
        kind: EntityKind::Course,
        prefix: "courses",
        noun: "course",
        table: "courses",
        parent: Some(Parent { param: "programId", column: "program_id", kind: EntityKind::Program }),
        fields: &[
            text("code", "code"),
            text("title", "title"),
            Field { param: "creditHours", column: "credit_hours", ty: FieldType::Real { min: 0.0 } },
            opt_text("description", "description"),
        ],
        links: &[],
        blockers: &[
            ("cos", "course_id"),
            ("clos", "course_id"),
            ("contents", "course_id"),
            ("books", "course_id"),
            ("lesson_plans", "course_id"),
            ("course_assignments", "course_id"),
            ("exam_questions", "course_id"),
        ],
        order_by: "code",
    },
    KindDef {
        kind: EntityKind::Co,
        prefix: "cos",
        noun: "CO",
        table: "cos",
        parent: Some(Parent { param: "courseId", column: "course_id", kind: EntityKind::Course }),
        fields: CODE_DESCRIPTION,
        links: &[],
        blockers: &[],
        order_by: "code",
    },
    KindDef {
        kind: EntityKind::Clo,
        prefix: "clos",
        noun: "CLO",
        table: "clos",
        parent: Some(Parent { param: "courseId", column: "course_id", kind: EntityKind::Course }),
        fields: CODE_DESCRIPTION,
        links: &[Link {
            param: "ploIds",
            table: "clo_plo",
            owner_col: "clo_id",
            target_col: "plo_id",
            scope: LinkScope::SameProgram,
        }],
        blockers: &[("exam_question_items", "clo_id")],
        order_by: "code",
    },
    KindDef {
        kind: EntityKind::Content,
        prefix: "contents",
        noun: "content",
        table: "contents",
        parent: Some(Parent { param: "courseId", column: "course_id", kind: EntityKind::Course }),
        fields: &[
            text("title", "title"),
            opt_text("body", "body"),
            Field { param: "weekNo", column: "week_no", ty: FieldType::OptInt { min: 1 } },
        ],
        links: CLO_LINKS,
        blockers: &[],
        order_by: "week_no, title",
    },
    KindDef {
        kind: EntityKind::Book,
        prefix: "books",
        noun: "book",
        table: "books",
        parent: Some(Parent { param: "courseId", column: "course_id", kind: EntityKind::Course }),
        fields: &[
            text("title", "title"),
            opt_text("author", "author"),
            opt_text("publisher", "publisher"),
            opt_text("edition", "edition"),
        ],
        links: &[],
        blockers: &[],
        order_by: "title",
    },
    KindDef {
        kind: EntityKind::LessonPlan,
        prefix: "lessonPlans",
        noun: "lesson plan",
        table: "lesson_plans",
        parent: Some(Parent { param: "courseId", column: "course_id", kind: EntityKind::Course }),
        fields: &[
            Field { param: "weekNo", column: "week_no", ty: FieldType::Int { min: 1 } },
            text("topic", "topic"),
            opt_text("activities", "activities"),
            opt_text("assessment", "assessment"),
        ],
        links: LESSON_PLAN_LINKS,
        blockers: &[],
        order_by: "week_no, topic",
    },
];

pub fn kind_def(kind: EntityKind) -> &'static KindDef {
    KINDS
        .iter()
        .find(|s| s.kind == kind)
        .unwrap_or(&KINDS[0])
}

/// Splits `courses.create` into its kind and verb.
pub fn resolve_method(method: &str) -> Option<(&'static KindDef, &str)> {
    let (prefix, verb) = method.split_once('.')?;
    let def = KINDS.iter().find(|s| s.prefix == prefix)?;
    Some((def, verb))
}

enum Scope {
    Faculty(FacultyRef),
    Department {
        department: DepartmentRef,
        course_id: Option<String>,
    },
}

fn parent_id_of(conn: &Connection, def: &KindDef, id: &str) -> ActionResult<Option<String>> {
    let Some(parent) = def.parent.as_ref() else {
        return Ok(None);
    };
    let sql = format!("SELECT {} FROM {} WHERE id = ?", parent.column, def.table);
    let found: Option<String> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    found.map(Some).ok_or(ActionError::NotFound(def.noun))
}

/// Ownership scope of an existing record of `kind`.
fn scope_of(conn: &Connection, kind: EntityKind, id: &str) -> ActionResult<Scope> {
    match kind {
        EntityKind::Faculty => Ok(Scope::Faculty(auth::load_faculty(conn, id)?)),
        EntityKind::Department => Ok(Scope::Department {
            department: auth::load_department(conn, id)?,
            course_id: None,
        }),
        _ => {
            let def = kind_def(kind);
            let parent = def
                .parent
                .as_ref()
                .ok_or(ActionError::NotFound(def.noun))?;
            let parent_id = parent_id_of(conn, def, id)?.unwrap_or_default();
            let scope = scope_of(conn, parent.kind, &parent_id)?;
            match (kind, scope) {
                (EntityKind::Course, Scope::Department { department, .. }) => {
                    Ok(Scope::Department {
                        department,
                        course_id: Some(id.to_string()),
                    })
                }
                (_, s) => Ok(s),
            }
        }
    }
}

fn is_course_child(kind: EntityKind) -> bool {
    matches!(
        kind,
        EntityKind::Co | EntityKind::Clo | EntityKind::Content | EntityKind::Book | EntityKind::LessonPlan
    )
}

fn authorize_write(
    conn: &Connection,
    actor: &Actor,
    kind: EntityKind,
    scope: &Scope,
) -> ActionResult<()> {
    let allowed = match scope {
        Scope::Faculty(f) => actor.is_admin() || auth::owns_faculty(actor, f),
        Scope::Department { department, course_id } => {
            if auth::can_manage_curriculum(actor, department) {
                true
            } else {
                match (is_course_child(kind), course_id, actor.teacher_id()) {
                    (true, Some(cid), Some(tid)) => {
                        let filter = assignments::AssignmentFilter {
                            course_id: Some(cid.clone()),
                            teacher_id: Some(tid.to_string()),
                            ..Default::default()
                        };
                        !assignments::list(conn, &filter)?.is_empty()
                    }
                    _ => false,
                }
            }
        }
    };
    if allowed {
        return Ok(());
    }
    tracing::warn!(actor = %actor.user_id, kind = ?kind, "catalog write denied");
    Err(ActionError::forbidden(format!(
        "you may not change this {}",
        kind_def(kind).noun
    )))
}

fn parse_field(params: &JsonValue, field: &Field) -> ActionResult<Value> {
    let key = field.param;
    match field.ty {
        FieldType::Text => Ok(Value::Text(crate::params::required_str(params, key)?)),
        FieldType::OptText | FieldType::TeacherRef => Ok(crate::params::opt_str(params, key)?
            .map(Value::Text)
            .unwrap_or(Value::Null)),
        FieldType::Real { min } => {
            let v = crate::params::opt_f64(params, key)?
                .ok_or_else(|| ActionError::field(key, format!("missing {}", key)))?;
            if !v.is_finite() || v < min {
                return Err(ActionError::field(key, format!("{} must be >= {}", key, min)));
            }
            Ok(Value::Real(v))
        }
        FieldType::Int { min } => {
            let v = crate::params::required_i64(params, key)?;
            if v < min {
                return Err(ActionError::field(key, format!("{} must be >= {}", key, min)));
            }
            Ok(Value::Integer(v))
        }
        FieldType::OptInt { min } => match crate::params::opt_i64(params, key)? {
            None => Ok(Value::Null),
            Some(v) if v < min => Err(ActionError::field(key, format!("{} must be >= {}", key, min))),
            Some(v) => Ok(Value::Integer(v)),
        },
    }
}

fn ensure_teacher_ref(conn: &Connection, field: &Field, value: &Value) -> ActionResult<()> {
    let Value::Text(id) = value else {
        return Ok(());
    };
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [id], |r| r.get(0))
        .optional()?;
    if found.is_none() {
        return Err(ActionError::integrity(format!(
            "{} refers to unknown teacher {}",
            field.param, id
        )));
    }
    Ok(())
}

/// Columns and values to write. With `partial`, absent keys are skipped.
fn collect_fields(
    conn: &Connection,
    def: &KindDef,
    params: &JsonValue,
    partial: bool,
) -> ActionResult<Vec<(&'static str, Value)>> {
    let mut out = Vec::with_capacity(def.fields.len());
    for field in def.fields {
        if partial && params.get(field.param).is_none() {
            continue;
        }
        let value = parse_field(params, field)?;
        if matches!(field.ty, FieldType::TeacherRef) {
            ensure_teacher_ref(conn, field, &value)?;
        }
        out.push((field.column, value));
    }
    Ok(out)
}

/// Every link target must sit inside the record's course, or its program for PLOs.
fn link_targets_ok(
    conn: &Connection,
    link: &Link,
    course_id: &str,
    target_ids: &[String],
) -> ActionResult<()> {
    for target in target_ids {
        let ok: Option<i64> = match link.scope {
            LinkScope::SameCourse => conn
                .query_row(
                    "SELECT 1 FROM clos WHERE id = ? AND course_id = ?",
                    [target.as_str(), course_id],
                    |r| r.get(0),
                )
                .optional()?,
            LinkScope::SameProgram => conn
                .query_row(
                    "SELECT 1 FROM plos pl
                     JOIN courses c ON c.program_id = pl.program_id
                     WHERE pl.id = ? AND c.id = ?",
                    [target.as_str(), course_id],
                    |r| r.get(0),
                )
                .optional()?,
        };
        if ok.is_none() {
            return Err(ActionError::integrity(format!(
                "{} contains {} which is outside this course's scope",
                link.param, target
            )));
        }
    }
    Ok(())
}

fn collect_links(
    conn: &Connection,
    def: &KindDef,
    params: &JsonValue,
    course_id: Option<&str>,
) -> ActionResult<Vec<(&'static Link, Vec<String>)>> {
    let mut out = Vec::new();
    for link in def.links {
        let Some(ids) = crate::params::opt_id_list(params, link.param)? else {
            continue;
        };
        if let Some(cid) = course_id {
            link_targets_ok(conn, link, cid, &ids)?;
        }
        out.push((link, ids));
    }
    Ok(out)
}

fn replace_links(
    conn: &Connection,
    id: &str,
    links: &[(&'static Link, Vec<String>)],
) -> rusqlite::Result<()> {
    for (link, ids) in links {
        conn.execute(
            &format!("DELETE FROM {} WHERE {} = ?", link.table, link.owner_col),
            [id],
        )?;
        let sql = format!(
            "INSERT INTO {}({}, {}) VALUES(?, ?)",
            link.table, link.owner_col, link.target_col
        );
        let mut stmt = conn.prepare(&sql)?;
        for target in ids {
            stmt.execute((id, target))?;
        }
    }
    Ok(())
}

fn sql_value_to_json(v: Value) -> JsonValue {
    match v {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => json!(i),
        Value::Real(f) => json!(f),
        Value::Text(s) => JsonValue::String(s),
        Value::Blob(_) => JsonValue::Null,
    }
}

fn select_columns(def: &KindDef) -> Vec<&'static str> {
    let mut cols = vec!["id"];
    if let Some(p) = def.parent.as_ref() {
        cols.push(p.column);
    }
    if def.kind == EntityKind::Faculty {
        cols.push("user_id");
    }
    cols.extend(def.fields.iter().map(|f| f.column));
    cols
}

fn param_name(def: &KindDef, column: &str) -> &'static str {
    if column == "id" {
        return "id";
    }
    if column == "user_id" {
        return "userId";
    }
    if let Some(p) = def.parent.as_ref().filter(|p| p.column == column) {
        return p.param;
    }
    def.fields
        .iter()
        .find(|f| f.column == column)
        .map(|f| f.param)
        .unwrap_or("unknown")
}

fn row_to_json(def: &KindDef, cols: &[&'static str], row: &rusqlite::Row<'_>) -> rusqlite::Result<Map<String, JsonValue>> {
    let mut obj = Map::new();
    for (i, col) in cols.iter().enumerate() {
        let v: Value = row.get(i)?;
        obj.insert(param_name(def, col).to_string(), sql_value_to_json(v));
    }
    Ok(obj)
}

fn load_link_ids(conn: &Connection, link: &Link, id: &str) -> rusqlite::Result<Vec<String>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ? ORDER BY {}",
        link.target_col, link.table, link.owner_col, link.target_col
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn open(conn: &Connection, def: &KindDef, id: &str) -> ActionResult<JsonValue> {
    let cols = select_columns(def);
    let sql = format!("SELECT {} FROM {} WHERE id = ?", cols.join(", "), def.table);
    let mut obj = conn
        .query_row(&sql, [id], |r| row_to_json(def, &cols, r))
        .optional()?
        .ok_or(ActionError::NotFound(def.noun))?;
    for link in def.links {
        obj.insert(link.param.to_string(), json!(load_link_ids(conn, link, id)?));
    }
    Ok(JsonValue::Object(obj))
}

pub fn list(conn: &Connection, def: &KindDef, params: &JsonValue) -> ActionResult<Vec<JsonValue>> {
    let cols = select_columns(def);
    let mut sql = format!("SELECT {} FROM {}", cols.join(", "), def.table);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(parent) = def.parent.as_ref() {
        if let Some(pid) = crate::params::opt_str(params, parent.param)? {
            sql.push_str(&format!(" WHERE {} = ?", parent.column));
            bind.push(Value::Text(pid));
        }
    }
    sql.push_str(&format!(" ORDER BY {}", def.order_by));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind.iter()), |r| row_to_json(def, &cols, r))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for mut obj in rows {
        let id = obj
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        for link in def.links {
            obj.insert(link.param.to_string(), json!(load_link_ids(conn, link, &id)?));
        }
        out.push(JsonValue::Object(obj));
    }
    Ok(out)
}

fn course_id_for_links(def: &KindDef, parent_id: Option<&str>) -> Option<String> {
    match def.parent.as_ref() {
        Some(p) if p.kind == EntityKind::Course => parent_id.map(str::to_string),
        _ => None,
    }
}

pub fn create(
    conn: &Connection,
    actor: &Actor,
    def: &KindDef,
    params: &JsonValue,
) -> ActionResult<JsonValue> {
    let mut columns: Vec<&'static str> = vec!["id"];
    let id = Uuid::new_v4().to_string();
    let mut values: Vec<Value> = vec![Value::Text(id.clone())];

    let parent_id = match def.parent.as_ref() {
        None => {
            // Faculty accounts own what they create; admins name the owner.
            let owner = match actor.role {
                Role::Admin => crate::params::opt_str(params, "userId")?
                    .unwrap_or_else(|| actor.user_id.clone()),
                Role::Faculty => actor.user_id.clone(),
                _ => return Err(ActionError::forbidden("only faculty accounts or admins may create faculties")),
            };
            columns.push("user_id");
            values.push(Value::Text(owner));
            None
        }
        Some(parent) => {
            let pid = crate::params::required_str(params, parent.param)?;
            let scope = match scope_of(conn, parent.kind, &pid) {
                Ok(s) => s,
                Err(ActionError::NotFound(noun)) => {
                    return Err(ActionError::integrity(format!("{} {} does not exist", noun, pid)))
                }
                Err(e) => return Err(e),
            };
            authorize_write(conn, actor, def.kind, &scope)?;
            if def.kind == EntityKind::Program {
                // Programs also record their faculty, taken from the department.
                if let Scope::Department { department, .. } = &scope {
                    columns.push("faculty_id");
                    values.push(Value::Text(department.faculty.id.clone()));
                }
            }
            columns.push(parent.column);
            values.push(Value::Text(pid.clone()));
            Some(pid)
        }
    };

    for (col, v) in collect_fields(conn, def, params, false)? {
        columns.push(col);
        values.push(v);
    }
    let course_id = course_id_for_links(def, parent_id.as_deref());
    let links = collect_links(conn, def, params, course_id.as_deref())?;

    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {}({}) VALUES({})",
        def.table,
        columns.join(", "),
        placeholders
    );
    let tx = conn.unchecked_transaction()?;
    tx.execute(&sql, params_from_iter(values.iter()))?;
    replace_links(&tx, &id, &links)?;
    tx.commit()?;
    tracing::info!(kind = def.noun, id = %id, "catalog record created");
    open(conn, def, &id)
}

pub fn update(
    conn: &Connection,
    actor: &Actor,
    def: &KindDef,
    id: &str,
    params: &JsonValue,
) -> ActionResult<JsonValue> {
    let scope = scope_of(conn, def.kind, id)?;
    authorize_write(conn, actor, def.kind, &scope)?;
    let parent_id = parent_id_of(conn, def, id)?;

    let fields = collect_fields(conn, def, params, true)?;
    let course_id = course_id_for_links(def, parent_id.as_deref());
    let links = collect_links(conn, def, params, course_id.as_deref())?;

    let tx = conn.unchecked_transaction()?;
    if !fields.is_empty() {
        let sets: Vec<String> = fields.iter().map(|(c, _)| format!("{} = ?", c)).collect();
        let sql = format!("UPDATE {} SET {} WHERE id = ?", def.table, sets.join(", "));
        let mut values: Vec<Value> = fields.into_iter().map(|(_, v)| v).collect();
        values.push(Value::Text(id.to_string()));
        tx.execute(&sql, params_from_iter(values.iter()))?;
    }
    replace_links(&tx, id, &links)?;
    tx.commit()?;
    tracing::info!(kind = def.noun, id = %id, "catalog record updated");
    open(conn, def, id)
}

pub fn delete(conn: &Connection, actor: &Actor, def: &KindDef, id: &str) -> ActionResult<()> {
    let scope = scope_of(conn, def.kind, id)?;
    authorize_write(conn, actor, def.kind, &scope)?;
    for (table, column) in def.blockers {
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {} = ?", table, column),
            [id],
            |r| r.get(0),
        )?;
        if n > 0 {
            return Err(ActionError::integrity(format!(
                "{} is still referenced by {} row(s) in {}",
                def.noun, n, table
            )));
        }
    }
    conn.execute(&format!("DELETE FROM {} WHERE id = ?", def.table), [id])?;
    tracing::info!(kind = def.noun, id = %id, "catalog record deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TeacherProfile;

    fn seeded() -> Connection {
        let conn = crate::db::open_in_memory();
        conn.execute_batch(
            "INSERT INTO users(id, name, email, role, created_at) VALUES
               ('uf', 'Faculty', 'f@x', 'faculty', 't'),
               ('ux', 'Other Faculty', 'x@x', 'faculty', 't'),
               ('ut', 'Teacher', 't@x', 'teacher', 't'),
               ('uo', 'Outsider', 'o@x', 'teacher', 't');
             INSERT INTO faculties(id, user_id, name) VALUES('f1', 'uf', 'Engineering');
             INSERT INTO departments(id, faculty_id, name) VALUES('d1', 'f1', 'CSE');
             INSERT INTO teachers(id, user_id, department_id, name) VALUES
               ('t1', 'ut', 'd1', 'Dr. T'), ('t2', 'uo', 'd1', 'Dr. O');
             INSERT INTO programs(id, faculty_id, department_id, name) VALUES('p1', 'f1', 'd1', 'BSc CSE');
             INSERT INTO programs(id, faculty_id, department_id, name) VALUES('p2', 'f1', 'd1', 'MSc CSE');
             INSERT INTO plos(id, program_id, code, description) VALUES
               ('plo1', 'p1', 'PLO1', 'Knowledge'), ('plo9', 'p2', 'PLO1', 'Research');
             INSERT INTO courses(id, program_id, code, title, credit_hours) VALUES('k1', 'p1', 'CSE101', 'Programming', 3.0);
             INSERT INTO course_assignments(id, course_id, teacher_id, session, semester, updated_at)
               VALUES('a1', 'k1', 't1', '2024-2025', 'I', 't');",
        )
        .expect("seed");
        conn
    }

    fn user(id: &str, role: Role, teacher: Option<&str>) -> Actor {
        Actor {
            user_id: id.into(),
            name: id.into(),
            role,
            teacher: teacher.map(|t| TeacherProfile {
                id: t.into(),
                department_id: "d1".into(),
                name: t.into(),
            }),
        }
    }

    #[test]
    fn method_names_resolve_to_kinds() {
        let (def, verb) = resolve_method("lessonPlans.update").unwrap();
        assert_eq!(def.kind, EntityKind::LessonPlan);
        assert_eq!(verb, "update");
        assert!(resolve_method("examQuestions.create").is_none());
    }

    #[test]
    fn faculty_owner_manages_hierarchy_and_outsiders_cannot() {
        let conn = seeded();
        let owner = user("uf", Role::Faculty, None);
        let stranger = user("ux", Role::Faculty, None);
        let course = create(
            &conn,
            &owner,
            kind_def(EntityKind::Course),
            &json!({ "programId": "p1", "code": "CSE202", "title": "Algorithms", "creditHours": 3 }),
        )
        .unwrap();
        assert_eq!(course["programId"], json!("p1"));
        assert_eq!(course["creditHours"], json!(3.0));

        let err = create(
            &conn,
            &stranger,
            kind_def(EntityKind::Course),
            &json!({ "programId": "p1", "code": "X", "title": "Y", "creditHours": 1 }),
        )
        .unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[test]
    fn program_records_faculty_from_department() {
        let conn = seeded();
        let admin = user("root", Role::Admin, None);
        let p = create(
            &conn,
            &admin,
            kind_def(EntityKind::Program),
            &json!({ "departmentId": "d1", "name": "BSc SWE" }),
        )
        .unwrap();
        let faculty_id: String = conn
            .query_row(
                "SELECT faculty_id FROM programs WHERE id = ?",
                [p["id"].as_str().unwrap()],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(faculty_id, "f1");
    }

    #[test]
    fn assigned_teacher_edits_course_children_with_scoped_links() {
        let conn = seeded();
        let teacher = user("ut", Role::Teacher, Some("t1"));
        let clo = create(
            &conn,
            &teacher,
            kind_def(EntityKind::Clo),
            &json!({ "courseId": "k1", "code": "CLO1", "description": "Write code", "ploIds": ["plo1"] }),
        )
        .unwrap();
        assert_eq!(clo["ploIds"], json!(["plo1"]));
        let clo_id = clo["id"].as_str().unwrap().to_string();

        let err = update(
            &conn,
            &teacher,
            kind_def(EntityKind::Clo),
            &clo_id,
            &json!({ "ploIds": ["plo9"] }),
        )
        .unwrap_err();
        assert_eq!(err.code(), "integrity");

        let updated = update(
            &conn,
            &teacher,
            kind_def(EntityKind::Clo),
            &clo_id,
            &json!({ "description": "Write and test code", "ploIds": [] }),
        )
        .unwrap();
        assert_eq!(updated["ploIds"], json!([]));
        assert_eq!(updated["code"], json!("CLO1"));

        let lp = create(
            &conn,
            &teacher,
            kind_def(EntityKind::LessonPlan),
            &json!({ "courseId": "k1", "weekNo": 1, "topic": "Intro", "cloIds": [clo_id] }),
        )
        .unwrap();
        assert_eq!(lp["cloIds"], json!([clo_id]));

        let outsider = user("uo", Role::Teacher, Some("t2"));
        let err = create(
            &conn,
            &outsider,
            kind_def(EntityKind::Book),
            &json!({ "courseId": "k1", "title": "SICP" }),
        )
        .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        // The assigned teacher may not rewrite the course record itself.
        let err = update(
            &conn,
            &teacher,
            kind_def(EntityKind::Course),
            "k1",
            &json!({ "title": "Renamed" }),
        )
        .unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[test]
    fn delete_refuses_records_with_children() {
        let conn = seeded();
        let owner = user("uf", Role::Faculty, None);
        let err = delete(&conn, &owner, kind_def(EntityKind::Program), "p1").unwrap_err();
        assert_eq!(err.code(), "integrity");
        delete(&conn, &owner, kind_def(EntityKind::Plo), "plo9").unwrap();
        let listed = list(&conn, kind_def(EntityKind::Plo), &json!({ "programId": "p2" })).unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn validation_names_the_field() {
        let conn = seeded();
        let owner = user("uf", Role::Faculty, None);
        let err = create(
            &conn,
            &owner,
            kind_def(EntityKind::Course),
            &json!({ "programId": "p1", "code": "C", "title": "T", "creditHours": -1 }),
        )
        .unwrap_err();
        assert_eq!(err.details(), Some(json!({ "field": "creditHours" })));

        let err = update(
            &conn,
            &owner,
            kind_def(EntityKind::Department),
            "d1",
            &json!({ "chairmanId": "ghost" }),
        )
        .unwrap_err();
        assert_eq!(err.code(), "integrity");
    }
}
