use serde_json::json;
use std::collections::BTreeMap;

use crate::ipc::helpers::{
    get_optional_date, get_optional_str, get_optional_u64, get_required_date, get_required_str,
    get_required_u64, respond, to_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::GradeEntry;
use crate::portal::{NewAssignment, Portal};
use crate::store::AttendanceMark;

fn get_fields(params: &serde_json::Value) -> Result<BTreeMap<String, String>, HandlerErr> {
    match params.get("fields") {
        None | Some(serde_json::Value::Null) => Ok(BTreeMap::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| HandlerErr::bad_params("fields must be an object of strings")),
    }
}

fn get_grades(params: &serde_json::Value) -> Result<Vec<GradeEntry>, HandlerErr> {
    match params.get("grades") {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| HandlerErr::bad_params("grades must be a list of { subject, score }")),
    }
}

fn report_cards_publish(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_u64(params, "studentId")?;
    let term = get_optional_str(params, "term")?;
    let fields = get_fields(params)?;
    let grades = get_grades(params)?;
    let card = portal.publish_report_card(student_id, term.as_deref(), &fields, &grades)?;
    Ok(json!({ "reportCard": card }))
}

fn report_cards_list(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_u64(params, "studentId")?;
    Ok(json!({ "reportCards": portal.report_cards(student_id)? }))
}

fn attendance_mark(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_u64(params, "studentId")?;
    let mark = AttendanceMark::parse(&get_required_str(params, "status")?)?;
    let student = portal.mark_attendance(student_id, mark)?;
    Ok(json!({ "student": to_json(&student)? }))
}

fn grades_record(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_u64(params, "studentId")?;
    let subject = get_required_str(params, "subject")?;
    let score = get_required_str(params, "score")?;
    let student = portal.record_grade(student_id, &subject, &score)?;
    Ok(json!({ "student": to_json(&student)? }))
}

fn assignments_add(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let new = NewAssignment {
        student_id: get_optional_u64(params, "studentId")?,
        grade_level: get_optional_str(params, "gradeLevel")?,
        subject: get_required_str(params, "subject")?,
        title: get_required_str(params, "title")?,
        due_date: get_required_date(params, "dueDate")?,
    };
    Ok(json!({ "assignment": portal.add_assignment(new)? }))
}

fn announcements_post(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let title = get_required_str(params, "title")?;
    let content = get_optional_str(params, "content")?.unwrap_or_default();
    let date = get_optional_date(params, "date")?;
    Ok(json!({ "announcement": portal.post_announcement(&title, &content, date)? }))
}

fn events_add(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = get_required_date(params, "date")?;
    let title = get_required_str(params, "title")?;
    let description = get_optional_str(params, "description")?.unwrap_or_default();
    Ok(json!({ "event": portal.add_event(date, &title, &description)? }))
}

fn invoices_list(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_optional_u64(params, "studentId")?;
    Ok(json!({ "invoices": portal.invoices(student_id)? }))
}

fn invoices_pay(portal: &mut Portal, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let invoice_id = get_required_u64(params, "invoiceId")?;
    Ok(json!({ "invoice": portal.pay_invoice(invoice_id)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&mut Portal, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "reportCards.publish" => report_cards_publish,
            "reportCards.list" => report_cards_list,
            "attendance.mark" => attendance_mark,
            "grades.record" => grades_record,
            "assignments.add" => assignments_add,
            "announcements.post" => announcements_post,
            "events.add" => events_add,
            "invoices.list" => invoices_list,
            "invoices.pay" => invoices_pay,
            _ => return None,
        };
    Some(respond(&req.id, handler(&mut state.portal, &req.params)))
}
