use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::tally::StatsKey;
use rusqlite::Connection;
use serde_json::json;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn stats_key(req: &Request) -> Result<StatsKey, serde_json::Value> {
    Ok(StatsKey {
        exam_id: required_str(req, "examId")?,
        school_id: required_str(req, "schoolId")?,
        grade_id: required_str(req, "gradeId")?,
        subject_id: required_str(req, "subjectId")?,
    })
}

fn handle_stats_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let key = match stats_key(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match calc::load_stats(conn, &key) {
        Ok(Some(model)) => ok(&req.id, json!(model)),
        Ok(None) => err(
            &req.id,
            "not_found",
            "no stats for that exam/school/grade/subject",
            None,
        ),
        Err(e) => err(&req.id, &e.code, e.message, None),
    }
}

fn handle_question_detail(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let key = match stats_key(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match calc::build_question_report(conn, &key) {
        Ok(Some(model)) => ok(&req.id, json!(model)),
        Ok(None) => err(
            &req.id,
            "not_found",
            "no stats for that exam/school/grade/subject",
            None,
        ),
        Err(e) => err(&req.id, &e.code, e.message, None),
    }
}

fn handle_school_teacher_count(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let school_id = match required_str(req, "schoolId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match calc::load_school_teacher_count(conn, &school_id) {
        Ok(total_teacher) => ok(
            &req.id,
            json!({
                "schoolId": school_id,
                "totalTeacher": total_teacher
            }),
        ),
        Err(e) => err(&req.id, &e.code, e.message, None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.open" => Some(handle_stats_open(state, req)),
        "report.questionDetail" => Some(handle_question_detail(state, req)),
        "schools.teacherCount" => Some(handle_school_teacher_count(state, req)),
        _ => None,
    }
}
