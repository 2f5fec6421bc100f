use crate::error::{ActionError, ActionResult};
use crate::ipc::helpers::{actor, db_conn, reply};
use crate::ipc::types::{AppState, Request};
use crate::settings::{self, SetupSection};
use serde_json::{Map, Value};

fn setup_get(state: &AppState) -> ActionResult<Value> {
    let conn = db_conn(state)?;
    let mut out = Map::new();
    for section in SetupSection::ALL {
        out.insert(
            section.name().to_string(),
            settings::load_section(conn, section)?,
        );
    }
    Ok(Value::Object(out))
}

fn setup_update(state: &AppState, req: &Request) -> ActionResult<Value> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    if !actor.is_admin() {
        return Err(ActionError::forbidden("only admins may change setup"));
    }
    let section_raw = crate::params::required_str(&req.params, "section")?;
    let section = SetupSection::parse(&section_raw)
        .ok_or_else(|| ActionError::field("section", "unknown section"))?;
    let patch = req
        .params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| ActionError::field("patch", "patch must be an object"))?;

    match settings::update_section(conn, section, patch)? {
        Ok(merged) => {
            tracing::info!(section = section.name(), "setup updated");
            Ok(merged)
        }
        Err(msg) => Err(ActionError::field("patch", msg)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(reply(req, setup_get(state))),
        "setup.update" => Some(reply(req, setup_update(state, req))),
        _ => None,
    }
}
