use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn optional_date(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(raw) = v.as_str() else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a YYYY-MM-DD string", key),
                    None,
                ));
            };
            let trimmed = raw.trim();
            if NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_err() {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a YYYY-MM-DD string", key),
                    None,
                ));
            }
            Ok(Some(trimmed.to_string()))
        }
    }
}

fn handle_dashboard_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match calc::load_dashboard(conn) {
        Ok(model) => ok(&req.id, json!(model)),
        Err(e) => err(&req.id, &e.code, e.message, None),
    }
}

fn handle_growth_series(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let from = match optional_date(req, "from") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let to = match optional_date(req, "to") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let (Some(f), Some(t)) = (&from, &to) {
        if f > t {
            return err(&req.id, "bad_params", "from must be <= to", None);
        }
    }

    match calc::load_growth_series(conn, from.as_deref(), to.as_deref()) {
        Ok(buckets) => ok(
            &req.id,
            json!({
                "from": from,
                "to": to,
                "buckets": buckets
            }),
        ),
        Err(e) => err(&req.id, &e.code, e.message, None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.open" => Some(handle_dashboard_open(state, req)),
        "growth.series" => Some(handle_growth_series(state, req)),
        _ => None,
    }
}
