use serde_json::json;

use crate::ipc::helpers::{get_required_u64, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Notification;
use crate::notifications::unread_count;
use crate::portal::Portal;

fn list_json(list: Vec<Notification>) -> serde_json::Value {
    json!({
        "unread": unread_count(&list),
        "notifications": list,
    })
}

fn notifications_mark_read(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_u64(params, "id")?;
    Ok(list_json(portal.mark_notification_read(id)?))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let portal = &mut state.portal;
    let result = match req.method.as_str() {
        "notifications.list" => portal.notifications().map(list_json).map_err(HandlerErr::from),
        "notifications.markRead" => notifications_mark_read(portal, &req.params),
        "notifications.markAllRead" => portal
            .mark_all_notifications_read()
            .map(list_json)
            .map_err(HandlerErr::from),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
