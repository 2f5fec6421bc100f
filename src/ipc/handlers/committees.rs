use crate::committees::{self, CommitteeView};
use crate::error::{ActionError, ActionResult};
use crate::ipc::helpers::{actor, db_conn, reply};
use crate::ipc::types::{AppState, Request};
use crate::params::{opt_id_list, opt_str, required_str};
use serde_json::{json, Value};

fn member_ids(params: &Value) -> ActionResult<Vec<String>> {
    opt_id_list(params, "memberIds")?
        .ok_or_else(|| ActionError::field("memberIds", "missing memberIds"))
}

fn form(state: &AppState, req: &Request) -> ActionResult<CommitteeView> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    let p = &req.params;
    committees::form(
        conn,
        &actor,
        &required_str(p, "departmentId")?,
        &required_str(p, "session")?,
        &required_str(p, "semester")?,
        &member_ids(p)?,
    )
}

fn update(state: &AppState, req: &Request) -> ActionResult<CommitteeView> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    let p = &req.params;
    committees::update(
        conn,
        &actor,
        &required_str(p, "id")?,
        &required_str(p, "session")?,
        &required_str(p, "semester")?,
        &member_ids(p)?,
    )
}

fn dissolve(state: &AppState, req: &Request) -> ActionResult<Value> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    committees::dissolve(conn, &actor, &required_str(&req.params, "id")?)?;
    Ok(json!({ "ok": true }))
}

fn list(state: &AppState, req: &Request) -> ActionResult<Vec<CommitteeView>> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    let p = &req.params;
    let department_id = opt_str(p, "departmentId")?;
    let session = opt_str(p, "session")?;
    let semester = opt_str(p, "semester")?;
    committees::list(
        conn,
        &actor,
        department_id.as_deref(),
        session.as_deref(),
        semester.as_deref(),
    )
}

fn open(state: &AppState, req: &Request) -> ActionResult<CommitteeView> {
    let conn = db_conn(state)?;
    committees::fetch_view(conn, &required_str(&req.params, "id")?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "committees.form" => Some(reply(req, form(state, req))),
        "committees.update" => Some(reply(req, update(state, req))),
        "committees.dissolve" => Some(reply(req, dissolve(state, req))),
        "committees.list" => Some(reply(req, list(state, req))),
        "committees.open" => Some(reply(req, open(state, req))),
        _ => None,
    }
}
