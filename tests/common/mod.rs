#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_curriculumd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env_remove("CURRICULUMD_WORKSPACE")
            .spawn()
            .expect("spawn curriculumd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns and opens a fresh workspace.
    pub fn with_workspace(prefix: &str) -> Self {
        Self::at_workspace(&temp_dir(prefix))
    }

    /// Spawns and opens an existing workspace, possibly shared with another sidecar.
    pub fn at_workspace(workspace: &Path) -> Self {
        let mut sc = Self::spawn();
        sc.ok(
            None,
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        sc
    }

    /// Writes a request without waiting; pair with `receive`.
    pub fn send(&mut self, actor: Option<&str>, method: &str, params: Value) -> String {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(a) = actor {
            payload["actorUserId"] = json!(a);
        }
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");
        id
    }

    pub fn receive(&mut self, id: &str) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for request {}", id);
        let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
        value
    }

    pub fn request(&mut self, actor: Option<&str>, method: &str, params: Value) -> Value {
        let id = self.send(actor, method, params);
        self.receive(&id)
    }

    pub fn ok(&mut self, actor: Option<&str>, method: &str, params: Value) -> Value {
        let resp = self.request(actor, method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
        resp.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Returns the error object of a request that must fail.
    pub fn fail(&mut self, actor: Option<&str>, method: &str, params: Value) -> Value {
        let resp = self.request(actor, method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            resp
        );
        resp.get("error").cloned().unwrap_or(Value::Null)
    }

    pub fn fail_code(&mut self, actor: Option<&str>, method: &str, params: Value) -> String {
        let e = self.fail(actor, method, params);
        e.get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn str_of<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(|v| v.as_str()).expect(key)
}

/// A teacher seeded through the directory: login id and profile id.
#[derive(Clone, Debug)]
pub struct Person {
    pub user_id: String,
    pub teacher_id: String,
}

pub struct Fixture {
    pub admin: String,
    pub faculty_user: String,
    pub department_id: String,
    pub other_department_id: String,
    pub chair: Person,
    pub owner: Person,
    pub member: Person,
    pub outsider: Person,
    pub other_chair: Person,
    pub course_id: String,
    pub other_course_id: String,
    pub clo_id: String,
    pub other_clo_id: String,
    pub committee_id: String,
    pub other_committee_id: String,
}

pub const SESSION: &str = "2024-2025";
pub const SEMESTER: &str = "I";

fn add_teacher(sc: &mut Sidecar, faculty_user: &str, department_id: &str, name: &str, email: &str) -> Person {
    let t = sc.ok(
        Some(faculty_user),
        "teachers.create",
        json!({ "departmentId": department_id, "name": name, "email": email }),
    );
    Person {
        user_id: str_of(&t, "userId").to_string(),
        teacher_id: str_of(&t, "id").to_string(),
    }
}

/// Faculty, two departments with chairmen, a course with an assigned owner,
/// and one committee per department.
pub fn seed(sc: &mut Sidecar) -> Fixture {
    let admin = sc.ok(
        None,
        "users.create",
        json!({ "name": "Root", "email": "root@uni.test", "role": "admin" }),
    );
    let admin = str_of(&admin, "id").to_string();
    let fu = sc.ok(
        None,
        "users.create",
        json!({ "name": "Faculty of Engineering", "email": "eng@uni.test", "role": "faculty" }),
    );
    let faculty_user = str_of(&fu, "id").to_string();

    let faculty = sc.ok(
        Some(&faculty_user),
        "faculties.create",
        json!({ "name": "Engineering", "shortName": "ENG" }),
    );
    let faculty_id = str_of(&faculty, "id").to_string();
    let d1 = sc.ok(
        Some(&faculty_user),
        "departments.create",
        json!({ "facultyId": faculty_id, "name": "Computer Science", "shortName": "CSE" }),
    );
    let department_id = str_of(&d1, "id").to_string();
    let d2 = sc.ok(
        Some(&faculty_user),
        "departments.create",
        json!({ "facultyId": faculty_id, "name": "Electrical", "shortName": "EEE" }),
    );
    let other_department_id = str_of(&d2, "id").to_string();

    let chair = add_teacher(sc, &faculty_user, &department_id, "Dr. Chair", "chair@uni.test");
    let owner = add_teacher(sc, &faculty_user, &department_id, "Dr. Owner", "owner@uni.test");
    let member = add_teacher(sc, &faculty_user, &department_id, "Dr. Member", "member@uni.test");
    let outsider = add_teacher(sc, &faculty_user, &department_id, "Dr. Outsider", "out@uni.test");
    let other_chair = add_teacher(sc, &faculty_user, &other_department_id, "Dr. Volt", "volt@uni.test");
    let other_member = add_teacher(sc, &faculty_user, &other_department_id, "Dr. Amp", "amp@uni.test");

    sc.ok(
        Some(&faculty_user),
        "departments.update",
        json!({ "id": department_id, "chairmanId": chair.teacher_id }),
    );
    sc.ok(
        Some(&faculty_user),
        "departments.update",
        json!({ "id": other_department_id, "chairmanId": other_chair.teacher_id }),
    );

    let program = sc.ok(
        Some(&faculty_user),
        "programs.create",
        json!({ "departmentId": department_id, "name": "BSc in CSE", "code": "BSCSE" }),
    );
    let program_id = str_of(&program, "id").to_string();
    let course = sc.ok(
        Some(&chair.user_id),
        "courses.create",
        json!({ "programId": program_id, "code": "CSE101", "title": "Structured Programming", "creditHours": 3 }),
    );
    let course_id = str_of(&course, "id").to_string();
    let other_course = sc.ok(
        Some(&chair.user_id),
        "courses.create",
        json!({ "programId": program_id, "code": "CSE102", "title": "Discrete Mathematics", "creditHours": 3 }),
    );
    let other_course_id = str_of(&other_course, "id").to_string();
    let clo = sc.ok(
        Some(&chair.user_id),
        "clos.create",
        json!({ "courseId": course_id, "code": "CLO1", "description": "Write structured programs" }),
    );
    let clo_id = str_of(&clo, "id").to_string();
    let other_clo = sc.ok(
        Some(&chair.user_id),
        "clos.create",
        json!({ "courseId": other_course_id, "code": "CLO1", "description": "Reason about sets" }),
    );
    let other_clo_id = str_of(&other_clo, "id").to_string();

    sc.ok(
        Some(&chair.user_id),
        "assignments.assign",
        json!({ "courseId": course_id, "teacherId": owner.teacher_id, "session": SESSION, "semester": SEMESTER }),
    );

    let committee = sc.ok(
        Some(&chair.user_id),
        "committees.form",
        json!({ "departmentId": department_id, "session": SESSION, "semester": SEMESTER, "memberIds": [member.teacher_id] }),
    );
    let committee_id = str_of(&committee, "id").to_string();
    let other_committee = sc.ok(
        Some(&other_chair.user_id),
        "committees.form",
        json!({ "departmentId": other_department_id, "session": SESSION, "semester": SEMESTER, "memberIds": [other_member.teacher_id] }),
    );
    let other_committee_id = str_of(&other_committee, "id").to_string();

    Fixture {
        admin,
        faculty_user,
        department_id,
        other_department_id,
        chair,
        owner,
        member,
        outsider,
        other_chair,
        course_id,
        other_course_id,
        clo_id,
        other_clo_id,
        committee_id,
        other_committee_id,
    }
}

/// A paper payload for the fixture course with two items (5 + 10 marks).
pub fn paper(fx: &Fixture, committee_id: Option<&str>) -> Value {
    json!({
        "courseId": fx.course_id,
        "session": SESSION,
        "semester": SEMESTER,
        "totalMarks": 20,
        "duration": "2 hours",
        "moderationCommitteeId": committee_id,
        "items": [
            {
                "questionLabel": "1(a)",
                "questionText": "Define a loop invariant.",
                "marks": 5,
                "cloId": fx.clo_id,
                "bloomsTaxonomyLevel": "remember"
            },
            {
                "questionLabel": "1(b)",
                "questionText": "Prove the invariant of binary search.",
                "marks": 10,
                "cloId": fx.clo_id,
                "bloomsTaxonomyLevel": "analyze"
            }
        ]
    })
}
