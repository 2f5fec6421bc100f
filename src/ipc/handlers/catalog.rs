//! `faculties.*`, `departments.*`, `programs.*` and the other academic record
//! kinds share one handler; the method prefix picks the record kind.

use crate::catalog::{self, KindDef};
use crate::error::{ActionError, ActionResult};
use crate::ipc::helpers::{actor, db_conn, reply};
use crate::ipc::types::{AppState, Request};
use crate::params::required_str;
use serde_json::{json, Value};

fn dispatch(state: &AppState, req: &Request, def: &KindDef, verb: &str) -> ActionResult<Value> {
    let conn = db_conn(state)?;
    match verb {
        "list" => Ok(json!(catalog::list(conn, def, &req.params)?)),
        "open" => catalog::open(conn, def, &required_str(&req.params, "id")?),
        "create" => {
            let actor = actor(conn, req)?;
            catalog::create(conn, &actor, def, &req.params)
        }
        "update" => {
            let actor = actor(conn, req)?;
            let id = required_str(&req.params, "id")?;
            catalog::update(conn, &actor, def, &id, &req.params)
        }
        "delete" => {
            let actor = actor(conn, req)?;
            let id = required_str(&req.params, "id")?;
            catalog::delete(conn, &actor, def, &id)?;
            Ok(json!({ "ok": true }))
        }
        _ => Err(ActionError::invalid(format!("unknown method: {}", req.method))),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let (def, verb) = catalog::resolve_method(&req.method)?;
    if !matches!(verb, "list" | "open" | "create" | "update" | "delete") {
        return None;
    }
    Some(reply(req, dispatch(state, req, def, verb)))
}
