use crate::tally::StatsIncrements;
use chrono::Utc;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

/// One named increment against a shared aggregate record. Deltas are
/// commutative, so the final value of every counter is the sum of applied
/// deltas regardless of interleaving.
#[derive(Debug, Clone)]
pub enum CounterOp {
    DashboardUser(i64),
    DashboardLjk(i64),
    GrowthBucket { date: String, delta: i64 },
    SchoolTeacher { school_id: String, delta: i64 },
    PerGradeSubject(StatsIncrements),
}

/// Bounded budget for write-conflict retries. SQLite's busy timeout already
/// absorbs short lock waits; this loop only covers the immediate-begin races
/// between concurrent writers.
const MAX_COMMIT_ATTEMPTS: u32 = 8;

/// Apply a batch of counter operations in a single all-or-nothing
/// transaction. Two concurrent batches against the same records converge to
/// the correct summed values; on conflict the whole batch retries. After the
/// retry budget the error surfaces and the caller must treat the batch as
/// not processed.
pub fn apply(conn: &Connection, ops: &[CounterOp]) -> anyhow::Result<()> {
    if ops.is_empty() {
        return Ok(());
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_apply(conn, ops) {
            Ok(()) => return Ok(()),
            Err(e) if is_busy(&e) && attempt < MAX_COMMIT_ATTEMPTS => {
                std::thread::sleep(std::time::Duration::from_millis(10 * attempt as u64));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn try_apply(conn: &Connection, ops: &[CounterOp]) -> Result<(), rusqlite::Error> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let now = Utc::now().to_rfc3339();
    for op in ops {
        apply_op(&tx, op, &now)?;
    }
    tx.commit()
}

fn apply_op(tx: &Transaction<'_>, op: &CounterOp, now: &str) -> Result<(), rusqlite::Error> {
    match op {
        CounterOp::DashboardUser(delta) => {
            tx.execute(
                "INSERT INTO dashboard_admin(id, total_user, total_ljk, updated_at)
                 VALUES(1, ?1, 0, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                     total_user = total_user + ?1,
                     updated_at = ?2",
                (delta, now),
            )?;
        }
        CounterOp::DashboardLjk(delta) => {
            tx.execute(
                "INSERT INTO dashboard_admin(id, total_user, total_ljk, updated_at)
                 VALUES(1, 0, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                     total_ljk = total_ljk + ?1,
                     updated_at = ?2",
                (delta, now),
            )?;
        }
        CounterOp::GrowthBucket { date, delta } => {
            tx.execute(
                "INSERT INTO user_growth(date, count, updated_at)
                 VALUES(?1, ?2, ?3)
                 ON CONFLICT(date) DO UPDATE SET
                     count = count + ?2,
                     updated_at = ?3",
                (date, delta, now),
            )?;
        }
        CounterOp::SchoolTeacher { school_id, delta } => {
            tx.execute(
                "INSERT INTO schools(id, total_teacher, updated_at)
                 VALUES(?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                     total_teacher = total_teacher + ?2,
                     updated_at = ?3",
                (school_id, delta, now),
            )?;
        }
        CounterOp::PerGradeSubject(inc) => {
            let k = &inc.key;
            tx.execute(
                "INSERT INTO stats_per_grade_subject(
                     exam_id, school_id, grade_id, subject_id, total_answer, updated_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(exam_id, school_id, grade_id, subject_id) DO UPDATE SET
                     total_answer = total_answer + ?5,
                     updated_at = ?6",
                (
                    &k.exam_id,
                    &k.school_id,
                    &k.grade_id,
                    &k.subject_id,
                    inc.total_answer,
                    now,
                ),
            )?;
            for (question_no, delta) in &inc.questions {
                tx.execute(
                    "INSERT INTO question_tallies(
                         exam_id, school_id, grade_id, subject_id, question_no,
                         blank, correct, incorrect)
                     VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(exam_id, school_id, grade_id, subject_id, question_no)
                     DO UPDATE SET
                         blank = blank + ?6,
                         correct = correct + ?7,
                         incorrect = incorrect + ?8",
                    (
                        &k.exam_id,
                        &k.school_id,
                        &k.grade_id,
                        &k.subject_id,
                        question_no,
                        delta.blank,
                        delta.correct,
                        delta.incorrect,
                    ),
                )?;
                for (choice, count) in &delta.choices {
                    tx.execute(
                        "INSERT INTO choice_tallies(
                             exam_id, school_id, grade_id, subject_id, question_no,
                             choice, count)
                         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
                         ON CONFLICT(exam_id, school_id, grade_id, subject_id,
                                     question_no, choice)
                         DO UPDATE SET count = count + ?7",
                        (
                            &k.exam_id,
                            &k.school_id,
                            &k.grade_id,
                            &k.subject_id,
                            question_no,
                            choice.as_char().to_string(),
                            count,
                        ),
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == ErrorCode::DatabaseBusy || f.code == ErrorCode::DatabaseLocked
    )
}
