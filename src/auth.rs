//! Who is acting, and what they may touch.
//!
//! Every request names its acting user. The user's role and optional teacher
//! profile are loaded once into an [`Actor`], and all permission checks are pure
//! predicates over that value and small reference structs, so they can be
//! exercised without a database.

use crate::error::{ActionError, ActionResult};
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Faculty,
    Department,
    Teacher,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "faculty" => Some(Self::Faculty),
            "department" => Some(Self::Department),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Faculty => "faculty",
            Self::Department => "department",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherProfile {
    pub id: String,
    pub department_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    pub teacher: Option<TeacherProfile>,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn teacher_id(&self) -> Option<&str> {
        self.teacher.as_ref().map(|t| t.id.as_str())
    }

    /// Name used in audit stamps; prefers the teacher profile's name.
    pub fn display_name(&self) -> &str {
        self.teacher
            .as_ref()
            .map(|t| t.name.as_str())
            .unwrap_or(&self.name)
    }

    pub fn require_teacher(&self) -> ActionResult<&TeacherProfile> {
        self.teacher
            .as_ref()
            .ok_or_else(|| ActionError::forbidden("a teacher profile is required"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacultyRef {
    pub id: String,
    pub user_id: String,
    pub dean_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentRef {
    pub id: String,
    pub faculty: FacultyRef,
    pub chairman_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitteeRef {
    pub id: String,
    pub department_id: String,
    pub chairman_id: String,
    pub member_ids: Vec<String>,
}

pub fn owns_faculty(actor: &Actor, faculty: &FacultyRef) -> bool {
    faculty.user_id == actor.user_id
}

pub fn owns_department(actor: &Actor, department: &DepartmentRef) -> bool {
    owns_faculty(actor, &department.faculty)
}

pub fn is_chairman_of(teacher: &TeacherProfile, department: &DepartmentRef) -> bool {
    department.chairman_id.as_deref() == Some(teacher.id.as_str())
}

pub fn is_dean_of(teacher: &TeacherProfile, faculty: &FacultyRef) -> bool {
    faculty.dean_id.as_deref() == Some(teacher.id.as_str())
}

pub fn is_committee_member(teacher: &TeacherProfile, committee: &CommitteeRef) -> bool {
    committee.chairman_id == teacher.id || committee.member_ids.iter().any(|m| *m == teacher.id)
}

/// Admin, or the chairman of `department` acting through their teacher profile.
pub fn can_administer_department(actor: &Actor, department: &DepartmentRef) -> bool {
    actor.is_admin()
        || actor
            .teacher
            .as_ref()
            .is_some_and(|t| is_chairman_of(t, department))
}

/// Curriculum records under a department: admin, the faculty account owning it,
/// its dean, or its chairman.
pub fn can_manage_curriculum(actor: &Actor, department: &DepartmentRef) -> bool {
    if actor.is_admin() || owns_department(actor, department) {
        return true;
    }
    actor.teacher.as_ref().is_some_and(|t| {
        is_chairman_of(t, department) || is_dean_of(t, &department.faculty)
    })
}

pub fn load_actor(conn: &Connection, user_id: &str) -> ActionResult<Actor> {
    let user: Option<(String, String)> = conn
        .query_row(
            "SELECT name, role FROM users WHERE id = ?",
            [user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((name, role_raw)) = user else {
        return Err(ActionError::forbidden("unknown acting user"));
    };
    let role = Role::parse(&role_raw)
        .ok_or_else(|| ActionError::integrity(format!("user has unknown role {role_raw}")))?;

    let teacher = conn
        .query_row(
            "SELECT id, department_id, name FROM teachers WHERE user_id = ?",
            [user_id],
            |r| {
                Ok(TeacherProfile {
                    id: r.get(0)?,
                    department_id: r.get(1)?,
                    name: r.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(Actor {
        user_id: user_id.to_string(),
        name,
        role,
        teacher,
    })
}

pub fn load_faculty(conn: &Connection, faculty_id: &str) -> ActionResult<FacultyRef> {
    conn.query_row(
        "SELECT id, user_id, dean_id FROM faculties WHERE id = ?",
        [faculty_id],
        |r| {
            Ok(FacultyRef {
                id: r.get(0)?,
                user_id: r.get(1)?,
                dean_id: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(ActionError::NotFound("faculty"))
}

pub fn load_department(conn: &Connection, department_id: &str) -> ActionResult<DepartmentRef> {
    conn.query_row(
        "SELECT d.id, d.chairman_id, f.id, f.user_id, f.dean_id
         FROM departments d
         JOIN faculties f ON f.id = d.faculty_id
         WHERE d.id = ?",
        [department_id],
        |r| {
            Ok(DepartmentRef {
                id: r.get(0)?,
                chairman_id: r.get(1)?,
                faculty: FacultyRef {
                    id: r.get(2)?,
                    user_id: r.get(3)?,
                    dean_id: r.get(4)?,
                },
            })
        },
    )
    .optional()?
    .ok_or(ActionError::NotFound("department"))
}

/// Department owning a course, through course -> program -> department.
pub fn load_course_department(conn: &Connection, course_id: &str) -> ActionResult<DepartmentRef> {
    let department_id: Option<String> = conn
        .query_row(
            "SELECT p.department_id FROM courses c
             JOIN programs p ON p.id = c.program_id
             WHERE c.id = ?",
            [course_id],
            |r| r.get(0),
        )
        .optional()?;
    let department_id = department_id.ok_or(ActionError::NotFound("course"))?;
    load_department(conn, &department_id)
}

pub fn load_committee(conn: &Connection, committee_id: &str) -> ActionResult<CommitteeRef> {
    let head: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, department_id, chairman_id FROM moderation_committees WHERE id = ?",
            [committee_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((id, department_id, chairman_id)) = head else {
        return Err(ActionError::NotFound("committee"));
    };
    let mut stmt = conn.prepare(
        "SELECT teacher_id FROM moderation_committee_members WHERE committee_id = ? ORDER BY teacher_id",
    )?;
    let member_ids = stmt
        .query_map([&id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CommitteeRef {
        id,
        department_id,
        chairman_id,
        member_ids,
    })
}
