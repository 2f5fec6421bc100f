use crate::auth::{self, Actor};
use crate::error::{ActionError, ActionResult};
use crate::ipc::error::{action_err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::Serialize;

pub fn db_conn(state: &AppState) -> ActionResult<&Connection> {
    state.db.as_ref().ok_or(ActionError::NoWorkspace)
}

pub fn actor(conn: &Connection, req: &Request) -> ActionResult<Actor> {
    let user_id = req
        .actor_user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ActionError::field("actorUserId", "missing actorUserId"))?;
    auth::load_actor(conn, user_id)
}

pub fn reply<T: Serialize>(req: &Request, result: ActionResult<T>) -> serde_json::Value {
    match result.and_then(|v| {
        serde_json::to_value(v).map_err(|e| ActionError::invalid(format!("encode failed: {e}")))
    }) {
        Ok(v) => ok(&req.id, v),
        Err(e) => action_err(&req.id, &e),
    }
}
