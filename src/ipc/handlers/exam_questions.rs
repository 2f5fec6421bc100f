use crate::error::{ActionError, ActionResult};
use crate::exams::{self, ExamQuestionSummary, ExamQuestionView, PrintModel};
use crate::ipc::helpers::{actor, db_conn, reply};
use crate::ipc::types::{AppState, Request};
use crate::params::{opt_str, required_str};
use crate::workflow::{self, ExamStatus};
use serde_json::{json, Value};

type Op = fn(&rusqlite::Connection, &crate::auth::Actor, &str) -> ActionResult<ExamQuestionView>;

/// Methods that take only the paper id.
fn by_id(state: &AppState, req: &Request, op: Op) -> ActionResult<ExamQuestionView> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    op(conn, &actor, &required_str(&req.params, "id")?)
}

fn create(state: &AppState, req: &Request) -> ActionResult<ExamQuestionView> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    exams::create(conn, &actor, &req.params)
}

fn update(state: &AppState, req: &Request) -> ActionResult<ExamQuestionView> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    let id = required_str(&req.params, "id")?;
    exams::update(conn, &actor, &id, &req.params)
}

fn request_revision(state: &AppState, req: &Request) -> ActionResult<ExamQuestionView> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    let id = required_str(&req.params, "id")?;
    let feedback = ["feedback", "moderatorFeedback"]
        .iter()
        .find_map(|k| req.params.get(*k).and_then(|v| v.as_str()))
        .unwrap_or_default();
    exams::request_revision(conn, &actor, &id, feedback)
}

fn review_items(state: &AppState, req: &Request) -> ActionResult<ExamQuestionView> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    let id = required_str(&req.params, "id")?;
    let reviews = workflow::parse_reviews(&req.params)?;
    let status = workflow::parse_review_status(&req.params)?;
    exams::review_items(conn, &actor, &id, &reviews, status)
}

fn delete(state: &AppState, req: &Request) -> ActionResult<Value> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    exams::delete(conn, &actor, &required_str(&req.params, "id")?)?;
    Ok(json!({ "ok": true }))
}

fn print(state: &AppState, req: &Request) -> ActionResult<PrintModel> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    exams::print(conn, &actor, &required_str(&req.params, "id")?)
}

fn list(state: &AppState, req: &Request) -> ActionResult<Vec<ExamQuestionSummary>> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    let course_id = opt_str(&req.params, "courseId")?;
    let status = match opt_str(&req.params, "status")? {
        None => None,
        Some(raw) => Some(
            ExamStatus::parse(&raw)
                .ok_or_else(|| ActionError::field("status", format!("unknown status {}", raw)))?,
        ),
    };
    exams::list(conn, &actor, course_id.as_deref(), status)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "examQuestions.create" => reply(req, create(state, req)),
        "examQuestions.update" => reply(req, update(state, req)),
        "examQuestions.submit" => reply(req, by_id(state, req, exams::submit)),
        "examQuestions.startReview" => reply(req, by_id(state, req, exams::start_review)),
        "examQuestions.approve" => reply(req, by_id(state, req, exams::approve)),
        "examQuestions.requestRevision" => reply(req, request_revision(state, req)),
        "examQuestions.reviewItems" => reply(req, review_items(state, req)),
        "examQuestions.delete" => reply(req, delete(state, req)),
        "examQuestions.print" => reply(req, print(state, req)),
        "examQuestions.open" => reply(req, by_id(state, req, exams::open)),
        "examQuestions.list" => reply(req, list(state, req)),
        _ => return None,
    };
    Some(resp)
}
