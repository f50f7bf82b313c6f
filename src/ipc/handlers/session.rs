use serde_json::json;

use crate::ipc::helpers::{get_optional_str, get_required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::portal::Portal;

fn session_json(portal: &Portal) -> Result<serde_json::Value, HandlerErr> {
    let session = portal.session()?;
    Ok(json!({
        "session": session,
        "schools": session.school_ids(),
        "theme": portal.theme(),
        "dashboard": portal.dashboard(),
    }))
}

fn session_switch_school(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_id = get_required_str(params, "schoolId")?;
    let role = get_optional_str(params, "role")?
        .map(|r| Role::parse(&r))
        .transpose()?;
    portal.switch_school(school_id.trim(), role)?;
    session_json(portal)
}

fn session_logout(portal: &mut Portal) -> Result<serde_json::Value, HandlerErr> {
    portal.logout()?;
    Ok(json!({ "flow": portal.flow(), "theme": portal.theme() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let portal = &mut state.portal;
    let result = match req.method.as_str() {
        "session.get" => session_json(portal),
        "session.switchSchool" => session_switch_school(portal, &req.params),
        "session.logout" => session_logout(portal),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
