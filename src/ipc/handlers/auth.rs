use serde_json::json;
use uuid::Uuid;

use crate::ipc::helpers::{get_optional_str, get_optional_u64, get_required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::portal::Portal;
use crate::resolver::SchoolChoice;

fn flow_json(portal: &Portal) -> serde_json::Value {
    json!({ "flow": portal.flow(), "theme": portal.theme() })
}

fn auth_request_link(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let email = get_required_str(params, "email")?;
    let link_id = portal.request_link(&email)?;
    Ok(json!({ "linkId": link_id, "flow": portal.flow() }))
}

fn auth_confirm_link(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw = get_required_str(params, "linkId")?;
    let link_id =
        Uuid::parse_str(raw.trim()).map_err(|_| HandlerErr::bad_params("linkId must be a uuid"))?;
    portal.confirm_link(link_id)?;
    Ok(flow_json(portal))
}

/// `{ index }` picks from the offered candidates; otherwise `{ schoolId, role? }`.
fn parse_choice(params: &serde_json::Value) -> Result<SchoolChoice, HandlerErr> {
    if let Some(index) = get_optional_u64(params, "index")? {
        return Ok(SchoolChoice::Index(index as usize));
    }
    let school_id = get_required_str(params, "schoolId")?;
    let role = get_optional_str(params, "role")?
        .map(|r| Role::parse(&r))
        .transpose()?;
    Ok(SchoolChoice::School { school_id, role })
}

fn auth_select_school(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let choice = parse_choice(params)?;
    portal.select_school(&choice)?;
    Ok(flow_json(portal))
}

fn auth_cancel(portal: &mut Portal) -> Result<serde_json::Value, HandlerErr> {
    portal.cancel()?;
    Ok(flow_json(portal))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let portal = &mut state.portal;
    let result = match req.method.as_str() {
        "auth.requestLink" => auth_request_link(portal, &req.params),
        "auth.confirmLink" => auth_confirm_link(portal, &req.params),
        "auth.selectSchool" => auth_select_school(portal, &req.params),
        "auth.cancel" => auth_cancel(portal),
        "auth.state" => Ok(flow_json(portal)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
