use crate::directory::{self, NewTeacher};
use crate::error::ActionResult;
use crate::ipc::helpers::{actor, db_conn, reply};
use crate::ipc::types::{AppState, Request};
use crate::params::{opt_str, required_str};

fn users_create(state: &AppState, req: &Request) -> ActionResult<directory::UserView> {
    let conn = db_conn(state)?;
    let name = required_str(&req.params, "name")?;
    let email = required_str(&req.params, "email")?;
    let role = required_str(&req.params, "role")?;
    directory::create_user(conn, &name, &email, &role)
}

fn users_list(state: &AppState, req: &Request) -> ActionResult<Vec<directory::UserView>> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    directory::list_users(conn, &actor)
}

fn teachers_create(state: &AppState, req: &Request) -> ActionResult<directory::TeacherView> {
    let conn = db_conn(state)?;
    let actor = actor(conn, req)?;
    let department_id = required_str(&req.params, "departmentId")?;
    let name = required_str(&req.params, "name")?;
    let designation = opt_str(&req.params, "designation")?;
    let user_id = opt_str(&req.params, "userId")?;
    let email = opt_str(&req.params, "email")?;
    directory::create_teacher(
        conn,
        &actor,
        &NewTeacher {
            department_id: &department_id,
            name: &name,
            designation: designation.as_deref(),
            user_id: user_id.as_deref(),
            email: email.as_deref(),
        },
    )
}

fn teachers_list(state: &AppState, req: &Request) -> ActionResult<Vec<directory::TeacherView>> {
    let conn = db_conn(state)?;
    let department_id = opt_str(&req.params, "departmentId")?;
    directory::list_teachers(conn, department_id.as_deref())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.create" => Some(reply(req, users_create(state, req))),
        "users.list" => Some(reply(req, users_list(state, req))),
        "teachers.create" => Some(reply(req, teachers_create(state, req))),
        "teachers.list" => Some(reply(req, teachers_list(state, req))),
        _ => None,
    }
}
