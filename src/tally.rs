use serde::Deserialize;
use std::collections::BTreeMap;

/// One scanned answer sheet as delivered by the OMR ingestion pipeline.
/// Immutable input; the aggregator only ever reads it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSheet {
    #[serde(default)]
    pub school_id: String,
    #[serde(default)]
    pub grade_id: String,
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub student_answers: BTreeMap<String, StudentAnswer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnswer {
    #[serde(default)]
    pub selected: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// Aggregate identity for one PerGradeSubjectStats record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatsKey {
    pub exam_id: String,
    pub school_id: String,
    pub grade_id: String,
    pub subject_id: String,
}

/// A validated choice letter. Selections arrive pre-normalized upstream;
/// we only strip surrounding whitespace, never case-fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Choice(char);

impl Choice {
    pub fn parse(raw: &str) -> Option<Choice> {
        let trimmed = raw.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_whitespace() => Some(Choice(c)),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionDelta {
    pub blank: i64,
    pub correct: i64,
    pub incorrect: i64,
    pub choices: BTreeMap<Choice, i64>,
}

/// The sparse increment set produced by folding one answer sheet into its
/// aggregate. Applying this through the counter updater is what mutates
/// stored state; computing it has no side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsIncrements {
    pub key: StatsKey,
    pub total_answer: i64,
    pub questions: BTreeMap<u32, QuestionDelta>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyError {
    pub code: String,
    pub message: String,
}

impl TallyError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Expand one answer sheet into the increments for
/// `stats_per_grade_subject[examId, schoolId, gradeId, subjectId]`.
///
/// Pure and deterministic. Refuses (with no partial output) when the key is
/// incomplete or any per-question entry is malformed: a partially-applied
/// sheet would break `blank + correct + incorrect == total_answer`.
pub fn compute_increments(
    exam_id: &str,
    sheet: &AnswerSheet,
) -> Result<StatsIncrements, TallyError> {
    let exam_id = exam_id.trim();
    if exam_id.is_empty() {
        return Err(TallyError::new("incomplete_key", "missing examId"));
    }
    let school_id = sheet.school_id.trim();
    let grade_id = sheet.grade_id.trim();
    let subject_id = sheet.subject_id.trim();
    if school_id.is_empty() || grade_id.is_empty() || subject_id.is_empty() {
        return Err(TallyError::new(
            "incomplete_key",
            "schoolId, gradeId and subjectId are all required",
        ));
    }
    if sheet.student_answers.is_empty() {
        return Err(TallyError::new("empty_answers", "studentAnswers is empty"));
    }

    let mut questions: BTreeMap<u32, QuestionDelta> = BTreeMap::new();
    for (raw_no, answer) in &sheet.student_answers {
        let question_no: u32 = match raw_no.trim().parse() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(TallyError::new(
                    "bad_question_no",
                    format!("question number {:?} is not a positive integer", raw_no),
                ));
            }
        };
        // Distinct raw keys may normalize to one number ("1", "01", " 1").
        // Folding both would double-count the question against a single
        // total_answer, so the sheet is refused outright.
        if questions.contains_key(&question_no) {
            return Err(TallyError::new(
                "duplicate_question",
                format!(
                    "question number {:?} repeats question {}",
                    raw_no, question_no
                ),
            ));
        }

        let delta = questions.entry(question_no).or_default();
        let selected = answer.selected.trim();
        if selected.is_empty() {
            delta.blank += 1;
            continue;
        }
        let Some(choice) = Choice::parse(selected) else {
            return Err(TallyError::new(
                "bad_choice",
                format!(
                    "question {}: selection {:?} is not a single choice letter",
                    question_no, answer.selected
                ),
            ));
        };
        *delta.choices.entry(choice).or_insert(0) += 1;
        if answer.is_correct {
            delta.correct += 1;
        } else {
            delta.incorrect += 1;
        }
    }

    Ok(StatsIncrements {
        key: StatsKey {
            exam_id: exam_id.to_string(),
            school_id: school_id.to_string(),
            grade_id: grade_id.to_string(),
            subject_id: subject_id.to_string(),
        },
        total_answer: 1,
        questions,
    })
}
