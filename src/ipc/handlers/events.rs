use crate::events;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn handle_user_created(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let event: events::UserCreatedEvent = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let date = match events::resolve_event_date(event.date.as_deref()) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let outcome = events::apply_user_created(conn, &event, &date);
    ok(
        &req.id,
        json!({
            "userId": event.user_id,
            "date": outcome.date,
            "dashboard": outcome.dashboard.to_json(),
            "teacherCount": outcome.teacher_count.to_json()
        }),
    )
}

fn handle_answer_sheet_submitted(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if req
        .params
        .get("examId")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        return err(&req.id, "bad_params", "missing examId", None);
    }
    let event: events::AnswerSheetSubmittedEvent = match serde_json::from_value(req.params.clone())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let answer_id = event
        .answer_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let outcome = events::apply_sheet_submitted(conn, &event);
    ok(
        &req.id,
        json!({
            "examId": event.exam_id,
            "answerId": answer_id,
            "dashboard": outcome.dashboard.to_json(),
            "perGradeSubject": outcome.per_grade_subject.to_json()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "event.userCreated" => Some(handle_user_created(state, req)),
        "event.answerSheetSubmitted" => Some(handle_answer_sheet_submitted(state, req)),
        _ => None,
    }
}
