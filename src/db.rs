use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "curriculum.sqlite3";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users(
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS faculties(
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        dean_id TEXT,
        name TEXT NOT NULL,
        short_name TEXT,
        FOREIGN KEY(user_id) REFERENCES users(id)
    )",
    "CREATE TABLE IF NOT EXISTS departments(
        id TEXT PRIMARY KEY,
        faculty_id TEXT NOT NULL,
        chairman_id TEXT,
        name TEXT NOT NULL,
        short_name TEXT,
        FOREIGN KEY(faculty_id) REFERENCES faculties(id)
    )",
    "CREATE TABLE IF NOT EXISTS teachers(
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL UNIQUE,
        department_id TEXT NOT NULL,
        name TEXT NOT NULL,
        designation TEXT,
        FOREIGN KEY(user_id) REFERENCES users(id),
        FOREIGN KEY(department_id) REFERENCES departments(id)
    )",
    "CREATE TABLE IF NOT EXISTS programs(
        id TEXT PRIMARY KEY,
        faculty_id TEXT NOT NULL,
        department_id TEXT NOT NULL,
        name TEXT NOT NULL,
        code TEXT,
        description TEXT,
        FOREIGN KEY(faculty_id) REFERENCES faculties(id),
        FOREIGN KEY(department_id) REFERENCES departments(id)
    )",
    "CREATE TABLE IF NOT EXISTS peos(
        id TEXT PRIMARY KEY,
        program_id TEXT NOT NULL,
        code TEXT NOT NULL,
        description TEXT NOT NULL,
        FOREIGN KEY(program_id) REFERENCES programs(id)
    )",
    "CREATE TABLE IF NOT EXISTS plos(
        id TEXT PRIMARY KEY,
        program_id TEXT NOT NULL,
        code TEXT NOT NULL,
        description TEXT NOT NULL,
        FOREIGN KEY(program_id) REFERENCES programs(id)
    )",
    "CREATE TABLE IF NOT EXISTS courses(
        id TEXT PRIMARY KEY,
        program_id TEXT NOT NULL,
        code TEXT NOT NULL,
        title TEXT NOT NULL,
        credit_hours REAL NOT NULL,
        description TEXT,
        FOREIGN KEY(program_id) REFERENCES programs(id)
    )",
    "CREATE TABLE IF NOT EXISTS cos(
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        code TEXT NOT NULL,
        description TEXT NOT NULL,
        FOREIGN KEY(course_id) REFERENCES courses(id)
    )",
    "CREATE TABLE IF NOT EXISTS clos(
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        code TEXT NOT NULL,
        description TEXT NOT NULL,
        FOREIGN KEY(course_id) REFERENCES courses(id)
    )",
    "CREATE TABLE IF NOT EXISTS clo_plo(
        clo_id TEXT NOT NULL,
        plo_id TEXT NOT NULL,
        PRIMARY KEY(clo_id, plo_id),
        FOREIGN KEY(clo_id) REFERENCES clos(id) ON DELETE CASCADE,
        FOREIGN KEY(plo_id) REFERENCES plos(id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS contents(
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT,
        week_no INTEGER,
        FOREIGN KEY(course_id) REFERENCES courses(id)
    )",
    "CREATE TABLE IF NOT EXISTS content_clo(
        content_id TEXT NOT NULL,
        clo_id TEXT NOT NULL,
        PRIMARY KEY(content_id, clo_id),
        FOREIGN KEY(content_id) REFERENCES contents(id) ON DELETE CASCADE,
        FOREIGN KEY(clo_id) REFERENCES clos(id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS books(
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        title TEXT NOT NULL,
        author TEXT,
        publisher TEXT,
        edition TEXT,
        FOREIGN KEY(course_id) REFERENCES courses(id)
    )",
    "CREATE TABLE IF NOT EXISTS lesson_plans(
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        week_no INTEGER NOT NULL,
        topic TEXT NOT NULL,
        activities TEXT,
        assessment TEXT,
        FOREIGN KEY(course_id) REFERENCES courses(id)
    )",
    "CREATE TABLE IF NOT EXISTS lesson_plan_clo(
        lesson_plan_id TEXT NOT NULL,
        clo_id TEXT NOT NULL,
        PRIMARY KEY(lesson_plan_id, clo_id),
        FOREIGN KEY(lesson_plan_id) REFERENCES lesson_plans(id) ON DELETE CASCADE,
        FOREIGN KEY(clo_id) REFERENCES clos(id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS course_assignments(
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        teacher_id TEXT NOT NULL,
        session TEXT NOT NULL,
        semester TEXT NOT NULL,
        assigned_by TEXT,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(course_id) REFERENCES courses(id),
        FOREIGN KEY(teacher_id) REFERENCES teachers(id),
        UNIQUE(course_id, session, semester)
    )",
    "CREATE TABLE IF NOT EXISTS moderation_committees(
        id TEXT PRIMARY KEY,
        department_id TEXT NOT NULL,
        chairman_id TEXT NOT NULL,
        session TEXT NOT NULL,
        semester TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(department_id) REFERENCES departments(id),
        FOREIGN KEY(chairman_id) REFERENCES teachers(id)
    )",
    "CREATE TABLE IF NOT EXISTS moderation_committee_members(
        committee_id TEXT NOT NULL,
        teacher_id TEXT NOT NULL,
        PRIMARY KEY(committee_id, teacher_id),
        FOREIGN KEY(committee_id) REFERENCES moderation_committees(id) ON DELETE CASCADE,
        FOREIGN KEY(teacher_id) REFERENCES teachers(id)
    )",
    "CREATE TABLE IF NOT EXISTS exam_questions(
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        course_teacher_id TEXT NOT NULL,
        session TEXT NOT NULL,
        semester TEXT NOT NULL,
        total_marks INTEGER NOT NULL,
        duration TEXT NOT NULL,
        status TEXT NOT NULL,
        moderation_committee_id TEXT,
        moderator_feedback TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(course_id) REFERENCES courses(id),
        FOREIGN KEY(course_teacher_id) REFERENCES teachers(id),
        FOREIGN KEY(moderation_committee_id) REFERENCES moderation_committees(id) ON DELETE SET NULL
    )",
    "CREATE TABLE IF NOT EXISTS exam_question_items(
        id TEXT PRIMARY KEY,
        exam_question_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        question_label TEXT NOT NULL,
        question_text TEXT NOT NULL,
        marks REAL NOT NULL,
        clo_id TEXT NOT NULL,
        blooms_taxonomy_level TEXT NOT NULL,
        is_satisfactory TEXT,
        moderator_comment TEXT,
        FOREIGN KEY(exam_question_id) REFERENCES exam_questions(id) ON DELETE CASCADE,
        FOREIGN KEY(clo_id) REFERENCES clos(id),
        UNIQUE(exam_question_id, position)
    )",
    "CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value_json TEXT NOT NULL
    )",
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_departments_faculty ON departments(faculty_id)",
    "CREATE INDEX IF NOT EXISTS idx_teachers_department ON teachers(department_id)",
    "CREATE INDEX IF NOT EXISTS idx_programs_faculty ON programs(faculty_id)",
    "CREATE INDEX IF NOT EXISTS idx_courses_program ON courses(program_id)",
    "CREATE INDEX IF NOT EXISTS idx_clos_course ON clos(course_id)",
    "CREATE INDEX IF NOT EXISTS idx_course_assignments_teacher ON course_assignments(teacher_id)",
    "CREATE INDEX IF NOT EXISTS idx_committees_department ON moderation_committees(department_id)",
    "CREATE INDEX IF NOT EXISTS idx_exam_questions_course ON exam_questions(course_id)",
    "CREATE INDEX IF NOT EXISTS idx_exam_questions_teacher ON exam_questions(course_teacher_id)",
    "CREATE INDEX IF NOT EXISTS idx_exam_items_question ON exam_question_items(exam_question_id)",
];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
    // Another sidecar may hold the write lock on the same workspace.
    conn.busy_timeout(Duration::from_secs(5))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates every table the service needs. Safe to run on an existing workspace.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    for sql in SCHEMA.iter().chain(INDEXES) {
        conn.execute(sql, [])?;
    }
    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    // A corrupt row reads as unset so defaults apply.
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
pub fn open_in_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}
