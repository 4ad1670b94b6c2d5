use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_ljkd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn ljkd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("ljkd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));

    let selected = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected.get("ok").and_then(|v| v.as_bool()), Some(true));

    let user = request(
        &mut stdin,
        &mut reader,
        "3",
        "event.userCreated",
        json!({ "userId": "u1", "role": "teacher", "schoolId": "school-1" }),
    );
    assert_eq!(user.get("ok").and_then(|v| v.as_bool()), Some(true));

    let sheet = request(
        &mut stdin,
        &mut reader,
        "4",
        "event.answerSheetSubmitted",
        json!({
            "examId": "exam-1",
            "schoolId": "school-1",
            "gradeId": "grade-6",
            "subjectId": "math",
            "studentAnswers": { "1": { "selected": "A", "isCorrect": true } }
        }),
    );
    assert_eq!(sheet.get("ok").and_then(|v| v.as_bool()), Some(true));

    let dash = request(&mut stdin, &mut reader, "5", "dashboard.open", json!({}));
    assert_eq!(dash.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        dash.pointer("/result/totalUser").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        dash.pointer("/result/totalLjk").and_then(|v| v.as_i64()),
        Some(1)
    );

    let growth = request(&mut stdin, &mut reader, "6", "growth.series", json!({}));
    assert_eq!(growth.get("ok").and_then(|v| v.as_bool()), Some(true));

    let stats = request(
        &mut stdin,
        &mut reader,
        "7",
        "stats.open",
        json!({
            "examId": "exam-1",
            "schoolId": "school-1",
            "gradeId": "grade-6",
            "subjectId": "math"
        }),
    );
    assert_eq!(stats.get("ok").and_then(|v| v.as_bool()), Some(true));

    let report = request(
        &mut stdin,
        &mut reader,
        "8",
        "report.questionDetail",
        json!({
            "examId": "exam-1",
            "schoolId": "school-1",
            "gradeId": "grade-6",
            "subjectId": "math"
        }),
    );
    assert_eq!(report.get("ok").and_then(|v| v.as_bool()), Some(true));

    let teachers = request(
        &mut stdin,
        &mut reader,
        "9",
        "schools.teacherCount",
        json!({ "schoolId": "school-1" }),
    );
    assert_eq!(teachers.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        teachers
            .pointer("/result/totalTeacher")
            .and_then(|v| v.as_i64()),
        Some(1)
    );

    let unknown = request(&mut stdin, &mut reader, "10", "nope.method", json!({}));
    assert_eq!(unknown.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        unknown.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reads_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let dash = request(&mut stdin, &mut reader, "1", "dashboard.open", json!({}));
    assert_eq!(dash.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        dash.pointer("/error/code").and_then(|v| v.as_str()),
        Some("no_workspace")
    );

    let event = request(
        &mut stdin,
        &mut reader,
        "2",
        "event.userCreated",
        json!({ "role": "teacher" }),
    );
    assert_eq!(event.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        event.pointer("/error/code").and_then(|v| v.as_str()),
        Some("no_workspace")
    );

    drop(stdin);
    let _ = child.wait();
}
