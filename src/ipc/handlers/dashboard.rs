use serde_json::json;

use crate::dashboard::{route, route_name, Compose, Pane, Tab};
use crate::ipc::helpers::{get_optional_str, get_required_str, get_required_u64, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::portal::Portal;

fn nav_json(portal: &Portal) -> serde_json::Value {
    json!({ "dashboard": portal.dashboard() })
}

/// Without params, routes the active session; with `{ role }`, routes the
/// named role so clients can check a role string ahead of time.
fn dashboard_route(portal: &Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = match get_optional_str(params, "role")? {
        Some(raw) => route_name(&raw)?,
        None => route(portal.session()?),
    };
    Ok(json!({ "dashboard": kind }))
}

fn dashboard_view(portal: &Portal) -> Result<serde_json::Value, HandlerErr> {
    let view = portal.view()?;
    Ok(json!({
        "navigation": portal.dashboard(),
        "theme": portal.theme(),
        "view": to_json(&view)?,
    }))
}

fn dashboard_select_tab(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let tab = Tab::parse(&get_required_str(params, "tab")?)?;
    portal.select_tab(tab)?;
    Ok(nav_json(portal))
}

fn dashboard_open(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_u64(params, "studentId")?;
    portal.open(student_id)?;
    Ok(nav_json(portal))
}

fn dashboard_back(portal: &mut Portal) -> Result<serde_json::Value, HandlerErr> {
    portal.back()?;
    Ok(nav_json(portal))
}

fn dashboard_set_pane(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let pane = Pane::parse(&get_required_str(params, "pane")?)?;
    portal.set_pane(pane)?;
    Ok(nav_json(portal))
}

fn dashboard_compose(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mode = Compose::parse(&get_required_str(params, "mode")?)?;
    portal.compose(mode)?;
    Ok(nav_json(portal))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let portal = &mut state.portal;
    let result = match req.method.as_str() {
        "dashboard.view" => dashboard_view(portal),
        "dashboard.route" => dashboard_route(portal, &req.params),
        "dashboard.selectTab" => dashboard_select_tab(portal, &req.params),
        "dashboard.open" => dashboard_open(portal, &req.params),
        "dashboard.back" => dashboard_back(portal),
        "dashboard.setPane" => dashboard_set_pane(portal, &req.params),
        "dashboard.compose" => dashboard_compose(portal, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
