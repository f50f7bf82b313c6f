use serde_json::json;

use crate::ipc::helpers::{get_optional_u64, get_required_str, get_required_u64, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::portal::Portal;

fn messages_send(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let receiver_id = get_required_u64(params, "receiverId")?;
    let content = get_required_str(params, "content")?;
    Ok(json!({ "message": portal.send_message(receiver_id, &content)? }))
}

fn messages_list(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let contact_id = get_optional_u64(params, "contactId")?;
    Ok(json!({ "messages": portal.messages(contact_id)? }))
}

fn messages_mark_read(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let contact_id = get_required_u64(params, "contactId")?;
    Ok(json!({ "updated": portal.mark_messages_read(contact_id)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&mut Portal, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "messages.send" => messages_send,
            "messages.list" => messages_list,
            "messages.markRead" => messages_mark_read,
            _ => return None,
        };
    Some(respond(&req.id, handler(&mut state.portal, &req.params)))
}
