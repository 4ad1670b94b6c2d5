use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("ljk.sqlite3");
    let conn = Connection::open(db_path)?;
    init_connection(&conn)?;
    Ok(conn)
}

/// Shared setup for every connection touching a workspace database.
/// Several sidecar processes may share one workspace file, so writers
/// must tolerate short lock waits instead of failing immediately.
pub fn init_connection(conn: &Connection) -> anyhow::Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS dashboard_admin(
            id INTEGER PRIMARY KEY CHECK(id = 1),
            total_user INTEGER NOT NULL DEFAULT 0,
            total_ljk INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_growth(
            date TEXT PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            total_teacher INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS stats_per_grade_subject(
            exam_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            grade_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            total_answer INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            PRIMARY KEY(exam_id, school_id, grade_id, subject_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS question_tallies(
            exam_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            grade_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            question_no INTEGER NOT NULL,
            blank INTEGER NOT NULL DEFAULT 0,
            correct INTEGER NOT NULL DEFAULT 0,
            incorrect INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(exam_id, school_id, grade_id, subject_id, question_no)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_question_tallies_key
         ON question_tallies(exam_id, school_id, grade_id, subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS choice_tallies(
            exam_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            grade_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            question_no INTEGER NOT NULL,
            choice TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(exam_id, school_id, grade_id, subject_id, question_no, choice)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_choice_tallies_key
         ON choice_tallies(exam_id, school_id, grade_id, subject_id)",
        [],
    )?;

    Ok(())
}
