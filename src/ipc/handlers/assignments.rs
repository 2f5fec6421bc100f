use crate::assignments::{self, AssignmentFilter};
use crate::error::ActionResult;
use crate::ipc::helpers::{actor, db_conn, reply};
use crate::ipc::types::{AppState, Request};
use crate::params::{opt_str, required_str};
use serde_json::{json, Value};

fn assign(state: &AppState, req: &Request) -> ActionResult<assignments::AssignmentView> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    let p = &req.params;
    assignments::assign(
        conn,
        &actor,
        &required_str(p, "courseId")?,
        &required_str(p, "teacherId")?,
        &required_str(p, "session")?,
        &required_str(p, "semester")?,
    )
}

fn unassign(state: &AppState, req: &Request) -> ActionResult<Value> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    assignments::unassign(conn, &actor, &required_str(&req.params, "id")?)?;
    Ok(json!({ "ok": true }))
}

fn list(state: &AppState, req: &Request) -> ActionResult<Vec<assignments::AssignmentView>> {
    let conn = db_conn(state)?;
    let p = &req.params;
    let filter = AssignmentFilter {
        course_id: opt_str(p, "courseId")?,
        teacher_id: opt_str(p, "teacherId")?,
        session: opt_str(p, "session")?,
        semester: opt_str(p, "semester")?,
    };
    assignments::list(conn, &filter)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.assign" => Some(reply(req, assign(state, req))),
        "assignments.unassign" => Some(reply(req, unassign(state, req))),
        "assignments.list" => Some(reply(req, list(state, req))),
        _ => None,
    }
}
