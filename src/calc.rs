use crate::tally::StatsKey;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;

/// 1-decimal rounding used for report percentages:
/// `Int(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

pub fn correct_pct(correct: i64, incorrect: i64, blank: i64) -> f64 {
    let total = correct + incorrect + blank;
    if total > 0 {
        (correct as f64) / (total as f64) * 100.0
    } else {
        0.0
    }
}

/// Classify question difficulty from the share of correct answers.
/// A zero-total tally has correctPct 0 and classifies Hard.
pub fn classify_difficulty(correct_pct: f64) -> Difficulty {
    if correct_pct >= 70.0 {
        Difficulty::Easy
    } else if correct_pct < 30.0 {
        Difficulty::Hard
    } else {
        Difficulty::Medium
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

fn db_err(e: rusqlite::Error) -> CalcError {
    CalcError::new("db_query_failed", e.to_string())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardModel {
    pub total_user: i64,
    pub total_ljk: i64,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthBucketRow {
    pub date: String,
    pub count: i64,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionTallyRow {
    pub question_no: u32,
    pub blank: i64,
    pub correct: i64,
    pub incorrect: i64,
    pub choices: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsModel {
    pub exam_id: String,
    pub school_id: String,
    pub grade_id: String,
    pub subject_id: String,
    pub total_answer: i64,
    pub updated_at: Option<String>,
    pub questions: Vec<QuestionTallyRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionReportRow {
    pub question_no: u32,
    pub blank: i64,
    pub correct: i64,
    pub incorrect: i64,
    pub total: i64,
    pub correct_pct: f64,
    pub difficulty: &'static str,
    pub choices: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyCounts {
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionReportModel {
    pub exam_id: String,
    pub school_id: String,
    pub grade_id: String,
    pub subject_id: String,
    pub total_answer: i64,
    pub updated_at: Option<String>,
    pub difficulty_counts: DifficultyCounts,
    pub questions: Vec<QuestionReportRow>,
}

/// Dashboard reads never see a missing singleton: before the first event the
/// totals are simply zero.
pub fn load_dashboard(conn: &Connection) -> Result<DashboardModel, CalcError> {
    let row: Option<(i64, i64, Option<String>)> = conn
        .query_row(
            "SELECT total_user, total_ljk, updated_at FROM dashboard_admin WHERE id = 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(db_err)?;
    let (total_user, total_ljk, updated_at) = row.unwrap_or((0, 0, None));
    Ok(DashboardModel {
        total_user,
        total_ljk,
        updated_at,
    })
}

pub fn load_growth_series(
    conn: &Connection,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Vec<GrowthBucketRow>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT date, count, updated_at
             FROM user_growth
             WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date <= ?2)
             ORDER BY date",
        )
        .map_err(db_err)?;
    stmt.query_map((from, to), |r| {
        Ok(GrowthBucketRow {
            date: r.get(0)?,
            count: r.get(1)?,
            updated_at: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

pub fn load_school_teacher_count(
    conn: &Connection,
    school_id: &str,
) -> Result<i64, CalcError> {
    let count: Option<i64> = conn
        .query_row(
            "SELECT total_teacher FROM schools WHERE id = ?",
            [school_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;
    Ok(count.unwrap_or(0))
}

fn load_question_rows(
    conn: &Connection,
    key: &StatsKey,
) -> Result<Vec<QuestionTallyRow>, CalcError> {
    let key_params = (
        &key.exam_id,
        &key.school_id,
        &key.grade_id,
        &key.subject_id,
    );

    let mut stmt = conn
        .prepare(
            "SELECT question_no, blank, correct, incorrect
             FROM question_tallies
             WHERE exam_id = ?1 AND school_id = ?2 AND grade_id = ?3 AND subject_id = ?4
             ORDER BY question_no",
        )
        .map_err(db_err)?;
    let mut rows: Vec<QuestionTallyRow> = stmt
        .query_map(key_params, |r| {
            Ok(QuestionTallyRow {
                question_no: r.get(0)?,
                blank: r.get(1)?,
                correct: r.get(2)?,
                incorrect: r.get(3)?,
                choices: BTreeMap::new(),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut choice_stmt = conn
        .prepare(
            "SELECT question_no, choice, count
             FROM choice_tallies
             WHERE exam_id = ?1 AND school_id = ?2 AND grade_id = ?3 AND subject_id = ?4",
        )
        .map_err(db_err)?;
    let choices: Vec<(u32, String, i64)> = choice_stmt
        .query_map(key_params, |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut by_no: BTreeMap<u32, BTreeMap<String, i64>> = BTreeMap::new();
    for (question_no, choice, count) in choices {
        by_no.entry(question_no).or_default().insert(choice, count);
    }
    for row in &mut rows {
        if let Some(c) = by_no.remove(&row.question_no) {
            row.choices = c;
        }
    }
    Ok(rows)
}

fn load_stats_head(
    conn: &Connection,
    key: &StatsKey,
) -> Result<Option<(i64, Option<String>)>, CalcError> {
    conn.query_row(
        "SELECT total_answer, updated_at
         FROM stats_per_grade_subject
         WHERE exam_id = ?1 AND school_id = ?2 AND grade_id = ?3 AND subject_id = ?4",
        (
            &key.exam_id,
            &key.school_id,
            &key.grade_id,
            &key.subject_id,
        ),
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()
    .map_err(db_err)
}

pub fn load_stats(conn: &Connection, key: &StatsKey) -> Result<Option<StatsModel>, CalcError> {
    let Some((total_answer, updated_at)) = load_stats_head(conn, key)? else {
        return Ok(None);
    };
    let questions = load_question_rows(conn, key)?;
    Ok(Some(StatsModel {
        exam_id: key.exam_id.clone(),
        school_id: key.school_id.clone(),
        grade_id: key.grade_id.clone(),
        subject_id: key.subject_id.clone(),
        total_answer,
        updated_at,
        questions,
    }))
}

/// Report-detail projection: per-question accuracy and difficulty derived
/// from the stored tallies, never from raw answer sheets.
pub fn build_question_report(
    conn: &Connection,
    key: &StatsKey,
) -> Result<Option<QuestionReportModel>, CalcError> {
    let Some((total_answer, updated_at)) = load_stats_head(conn, key)? else {
        return Ok(None);
    };
    let rows = load_question_rows(conn, key)?;

    let mut counts = DifficultyCounts {
        easy: 0,
        medium: 0,
        hard: 0,
    };
    let questions = rows
        .into_iter()
        .map(|row| {
            let total = row.blank + row.correct + row.incorrect;
            let pct = correct_pct(row.correct, row.incorrect, row.blank);
            let difficulty = classify_difficulty(pct);
            match difficulty {
                Difficulty::Easy => counts.easy += 1,
                Difficulty::Medium => counts.medium += 1,
                Difficulty::Hard => counts.hard += 1,
            }
            QuestionReportRow {
                question_no: row.question_no,
                blank: row.blank,
                correct: row.correct,
                incorrect: row.incorrect,
                total,
                correct_pct: round_off_1_decimal(pct),
                difficulty: difficulty.as_str(),
                choices: row.choices,
            }
        })
        .collect();

    Ok(Some(QuestionReportModel {
        exam_id: key.exam_id.clone(),
        school_id: key.school_id.clone(),
        grade_id: key.grade_id.clone(),
        subject_id: key.subject_id.clone(),
        total_answer,
        updated_at,
        difficulty_counts: counts,
        questions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_off_1_decimal_half_rounds_up() {
        assert_eq!(round_off_1_decimal(0.0), 0.0);
        assert_eq!(round_off_1_decimal(3.54), 3.5);
        assert_eq!(round_off_1_decimal(3.55), 3.6);
        assert_eq!(round_off_1_decimal(66.6666), 66.7);
    }

    // P4 boundaries.
    #[test]
    fn classifier_boundaries() {
        assert_eq!(classify_difficulty(70.0), Difficulty::Easy);
        assert_eq!(classify_difficulty(69.999), Difficulty::Medium);
        assert_eq!(classify_difficulty(30.0), Difficulty::Medium);
        assert_eq!(classify_difficulty(29.999), Difficulty::Hard);
        assert_eq!(classify_difficulty(100.0), Difficulty::Easy);
    }

    // A tally nobody answered has correctPct 0, which lands below the
    // 30% line: Hard, not Medium.
    #[test]
    fn zero_total_tally_classifies_hard() {
        let pct = correct_pct(0, 0, 0);
        assert_eq!(pct, 0.0);
        assert_eq!(classify_difficulty(pct), Difficulty::Hard);
    }

    #[test]
    fn correct_pct_counts_blank_in_denominator() {
        // 7 correct, 2 incorrect, 1 blank: 70% exactly.
        let pct = correct_pct(7, 2, 1);
        assert_eq!(pct, 70.0);
        assert_eq!(classify_difficulty(pct), Difficulty::Easy);

        // 2 correct out of 10 total: 20%, Hard.
        let pct = correct_pct(2, 5, 3);
        assert_eq!(pct, 20.0);
        assert_eq!(classify_difficulty(pct), Difficulty::Hard);
    }
}
