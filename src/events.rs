use crate::counters::{self, CounterOp};
use crate::tally::{self, AnswerSheet};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

/// Domain events the aggregation core reacts to. The delivery mechanism
/// (queue, trigger framework, request handler) stays outside; everything
/// arrives here as an explicit tagged value.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    UserCreated(UserCreatedEvent),
    AnswerSheetSubmitted(AnswerSheetSubmittedEvent),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreatedEvent {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub school_id: String,
    /// Bucket date override, `YYYY-MM-DD`. Defaults to today (UTC).
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSheetSubmittedEvent {
    pub exam_id: String,
    #[serde(default)]
    pub answer_id: Option<String>,
    #[serde(flatten)]
    pub sheet: AnswerSheet,
}

/// Result of one sub-update within an event. Sub-updates are independent:
/// one part failing or being skipped never blocks its siblings.
#[derive(Debug, Clone)]
pub struct PartOutcome {
    pub status: &'static str,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl PartOutcome {
    fn applied() -> Self {
        Self {
            status: "applied",
            code: None,
            message: None,
        }
    }

    fn skipped(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: "skipped",
            code: Some(code.to_string()),
            message: Some(message.into()),
        }
    }

    fn failed(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: "failed",
            code: Some(code.to_string()),
            message: Some(message.into()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut v = json!({ "status": self.status });
        if let Some(code) = &self.code {
            v["code"] = json!(code);
        }
        if let Some(message) = &self.message {
            v["message"] = json!(message);
        }
        v
    }
}

#[derive(Debug, Clone)]
pub struct UserCreatedOutcome {
    pub date: String,
    pub dashboard: PartOutcome,
    pub teacher_count: PartOutcome,
}

#[derive(Debug, Clone)]
pub struct SheetSubmittedOutcome {
    pub dashboard: PartOutcome,
    pub per_grade_subject: PartOutcome,
}

pub fn resolve_event_date(raw: Option<&str>) -> Result<String, String> {
    let Some(raw) = raw else {
        return Ok(Utc::now().date_naive().format("%Y-%m-%d").to_string());
    };
    let trimmed = raw.trim();
    match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(d) => Ok(d.format("%Y-%m-%d").to_string()),
        Err(_) => Err(format!("date {:?} must be YYYY-MM-DD", raw)),
    }
}

fn role_counts_as_staff(role: &str) -> bool {
    let r = role.trim();
    r.eq_ignore_ascii_case("teacher") || r.eq_ignore_ascii_case("headmaster")
}

/// UserCreated: (a) global total plus the daily growth bucket, applied in one
/// transaction; (b) the per-school staff counter when the role qualifies.
pub fn apply_user_created(
    conn: &Connection,
    event: &UserCreatedEvent,
    date: &str,
) -> UserCreatedOutcome {
    let dashboard = match counters::apply(
        conn,
        &[
            CounterOp::DashboardUser(1),
            CounterOp::GrowthBucket {
                date: date.to_string(),
                delta: 1,
            },
        ],
    ) {
        Ok(()) => PartOutcome::applied(),
        Err(e) => PartOutcome::failed("db_update_failed", e.to_string()),
    };

    let teacher_count = if !role_counts_as_staff(&event.role) {
        PartOutcome::skipped("role_not_counted", "role is not teacher or headmaster")
    } else if event.school_id.trim().is_empty() {
        PartOutcome::skipped("missing_school", "schoolId is required for staff counting")
    } else {
        match counters::apply(
            conn,
            &[CounterOp::SchoolTeacher {
                school_id: event.school_id.trim().to_string(),
                delta: 1,
            }],
        ) {
            Ok(()) => PartOutcome::applied(),
            Err(e) => PartOutcome::failed("db_update_failed", e.to_string()),
        }
    };

    UserCreatedOutcome {
        date: date.to_string(),
        dashboard,
        teacher_count,
    }
}

/// AnswerSheetSubmitted: (a) the global sheet total always; (b) the
/// per-grade-subject fold only when the sheet is complete and well-formed.
/// A malformed sheet skips (b) entirely rather than applying part of it.
pub fn apply_sheet_submitted(
    conn: &Connection,
    event: &AnswerSheetSubmittedEvent,
) -> SheetSubmittedOutcome {
    let dashboard = match counters::apply(conn, &[CounterOp::DashboardLjk(1)]) {
        Ok(()) => PartOutcome::applied(),
        Err(e) => PartOutcome::failed("db_update_failed", e.to_string()),
    };

    let per_grade_subject = match tally::compute_increments(&event.exam_id, &event.sheet) {
        Ok(inc) => match counters::apply(conn, &[CounterOp::PerGradeSubject(inc)]) {
            Ok(()) => PartOutcome::applied(),
            Err(e) => PartOutcome::failed("db_update_failed", e.to_string()),
        },
        Err(e) => PartOutcome::skipped(&e.code, e.message),
    };

    SheetSubmittedOutcome {
        dashboard,
        per_grade_subject,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::path::PathBuf;

    fn temp_workspace(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn resolve_event_date_validates_format() {
        assert_eq!(
            resolve_event_date(Some("2026-08-23")).expect("valid date"),
            "2026-08-23"
        );
        assert!(resolve_event_date(Some("23/08/2026")).is_err());
        assert!(resolve_event_date(Some("not-a-date")).is_err());
        // Default resolves to some valid YYYY-MM-DD.
        let today = resolve_event_date(None).expect("today");
        assert!(NaiveDate::parse_from_str(&today, "%Y-%m-%d").is_ok());
    }

    #[test]
    fn staff_roles_match_case_insensitively() {
        assert!(role_counts_as_staff("teacher"));
        assert!(role_counts_as_staff("Headmaster"));
        assert!(role_counts_as_staff(" TEACHER "));
        assert!(!role_counts_as_staff("student"));
        assert!(!role_counts_as_staff(""));
    }

    #[test]
    fn user_created_applies_both_parts_for_teacher() {
        let ws = temp_workspace("ljkd-events-user");
        let conn = db::open_db(&ws).expect("open db");
        let event = UserCreatedEvent {
            user_id: Some("u1".to_string()),
            role: "teacher".to_string(),
            school_id: "school-1".to_string(),
            date: None,
        };

        let outcome = apply_user_created(&conn, &event, "2026-08-23");
        assert_eq!(outcome.dashboard.status, "applied");
        assert_eq!(outcome.teacher_count.status, "applied");

        let total_user: i64 = conn
            .query_row(
                "SELECT total_user FROM dashboard_admin WHERE id = 1",
                [],
                |r| r.get(0),
            )
            .expect("dashboard");
        assert_eq!(total_user, 1);
        let teachers: i64 = conn
            .query_row(
                "SELECT total_teacher FROM schools WHERE id = 'school-1'",
                [],
                |r| r.get(0),
            )
            .expect("school");
        assert_eq!(teachers, 1);

        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn user_created_skips_staff_counter_for_students() {
        let ws = temp_workspace("ljkd-events-student");
        let conn = db::open_db(&ws).expect("open db");
        let event = UserCreatedEvent {
            user_id: None,
            role: "student".to_string(),
            school_id: "school-1".to_string(),
            date: None,
        };

        let outcome = apply_user_created(&conn, &event, "2026-08-23");
        assert_eq!(outcome.dashboard.status, "applied");
        assert_eq!(outcome.teacher_count.status, "skipped");
        assert_eq!(outcome.teacher_count.code.as_deref(), Some("role_not_counted"));

        let schools: i64 = conn
            .query_row("SELECT COUNT(*) FROM schools", [], |r| r.get(0))
            .expect("count");
        assert_eq!(schools, 0);

        let _ = std::fs::remove_dir_all(ws);
    }

    // P3: a sheet without schoolId still bumps total_ljk and leaves every
    // per-grade-subject record untouched.
    #[test]
    fn malformed_sheet_only_increments_global_total() {
        let ws = temp_workspace("ljkd-events-malformed");
        let conn = db::open_db(&ws).expect("open db");

        let event = AnswerSheetSubmittedEvent {
            exam_id: "exam-1".to_string(),
            answer_id: None,
            sheet: AnswerSheet {
                school_id: String::new(),
                grade_id: "grade-6".to_string(),
                subject_id: "math".to_string(),
                student_answers: [(
                    "1".to_string(),
                    crate::tally::StudentAnswer {
                        selected: "A".to_string(),
                        is_correct: true,
                    },
                )]
                .into_iter()
                .collect(),
            },
        };

        let outcome = apply_sheet_submitted(&conn, &event);
        assert_eq!(outcome.dashboard.status, "applied");
        assert_eq!(outcome.per_grade_subject.status, "skipped");
        assert_eq!(
            outcome.per_grade_subject.code.as_deref(),
            Some("incomplete_key")
        );

        let total_ljk: i64 = conn
            .query_row(
                "SELECT total_ljk FROM dashboard_admin WHERE id = 1",
                [],
                |r| r.get(0),
            )
            .expect("dashboard");
        assert_eq!(total_ljk, 1);
        let stats_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM stats_per_grade_subject", [], |r| {
                r.get(0)
            })
            .expect("count");
        assert_eq!(stats_rows, 0);

        let _ = std::fs::remove_dir_all(ws);
    }
}
