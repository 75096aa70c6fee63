//! Automatic scoring of multiple-choice answers against the exam's key.
//!
//! Each sub-question contributes `+mark` when answered correctly, the exam's
//! flat `negative_mark` (already `<= 0`) when answered wrongly and nothing
//! when left blank. Sub-questions without a usable key are excluded and
//! reported as [`DataQualityWarning`]s. The total is floored at zero.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::db::models::QuestionSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct DataQualityWarning {
    pub(crate) sub_question_id: String,
    pub(crate) message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AnswerOutcome {
    Correct,
    Wrong,
    Unanswered,
    Unscoreable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct QuestionScore {
    pub(crate) category_id: String,
    pub(crate) question_id: String,
    pub(crate) sub_question_id: String,
    pub(crate) student_answer: Option<String>,
    pub(crate) correct_answer: Option<String>,
    pub(crate) is_correct: bool,
    pub(crate) marks_awarded: f64,
    pub(crate) max_marks: f64,
    pub(crate) outcome: AnswerOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ScoreReport {
    /// Floored at zero.
    pub(crate) total: f64,
    /// Sum before flooring; may be negative.
    pub(crate) raw_total: f64,
    pub(crate) max_total: f64,
    pub(crate) correct: usize,
    pub(crate) wrong: usize,
    pub(crate) unanswered: usize,
    pub(crate) breakdown: Vec<QuestionScore>,
    pub(crate) warnings: Vec<DataQualityWarning>,
}

impl ScoreReport {
    pub(crate) fn scoreable_count(&self) -> usize {
        self.correct + self.wrong + self.unanswered
    }

    pub(crate) fn percentage(&self) -> f64 {
        percentage_of(self.total, self.max_total)
    }

    pub(crate) fn passed(&self, min_pass_mark: f64) -> bool {
        self.percentage() >= min_pass_mark
    }
}

pub(crate) fn percentage_of(total: f64, max_total: f64) -> f64 {
    if max_total > 0.0 {
        (total / max_total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Upper bound of attainable marks, counting only scoreable sub-questions.
pub(crate) fn max_marks(question_set: &QuestionSet) -> f64 {
    question_set
        .categories
        .iter()
        .flat_map(|category| category.questions.iter())
        .flat_map(|question| question.sub_questions.iter())
        .filter(|sub| key_of(sub.correct_answer.as_deref()).is_some() && valid_mark(sub.mark))
        .map(|sub| sub.mark)
        .sum()
}

pub(crate) fn score_answers(
    question_set: &QuestionSet,
    answers: &BTreeMap<String, String>,
    negative_mark: f64,
) -> ScoreReport {
    debug_assert!(negative_mark <= 0.0, "negative_mark must be normalized before scoring");

    let mut report = ScoreReport {
        total: 0.0,
        raw_total: 0.0,
        max_total: 0.0,
        correct: 0,
        wrong: 0,
        unanswered: 0,
        breakdown: Vec::with_capacity(question_set.sub_question_count()),
        warnings: Vec::new(),
    };
    let mut seen = HashSet::new();

    for category in &question_set.categories {
        for question in &category.questions {
            for sub in &question.sub_questions {
                let student_answer = answers
                    .get(&sub.id)
                    .filter(|answer| !answer.trim().is_empty())
                    .cloned();
                let correct_answer = key_of(sub.correct_answer.as_deref());

                let unscoreable_reason = if !seen.insert(sub.id.as_str()) {
                    Some("duplicate sub-question id; only the first occurrence is scored")
                } else if correct_answer.is_none() {
                    Some("missing correct answer")
                } else if !valid_mark(sub.mark) {
                    Some("mark must be a finite, non-negative number")
                } else {
                    None
                };

                let (outcome, marks_awarded) = match (unscoreable_reason, &student_answer) {
                    (Some(reason), _) => {
                        report.warnings.push(DataQualityWarning {
                            sub_question_id: sub.id.clone(),
                            message: reason.to_string(),
                        });
                        (AnswerOutcome::Unscoreable, 0.0)
                    }
                    (None, None) => {
                        report.unanswered += 1;
                        (AnswerOutcome::Unanswered, 0.0)
                    }
                    (None, Some(answer)) if Some(answer.as_str()) == correct_answer => {
                        report.correct += 1;
                        (AnswerOutcome::Correct, sub.mark)
                    }
                    (None, Some(_)) => {
                        report.wrong += 1;
                        (AnswerOutcome::Wrong, negative_mark)
                    }
                };

                if outcome != AnswerOutcome::Unscoreable {
                    report.max_total += sub.mark;
                    report.raw_total += marks_awarded;
                }

                report.breakdown.push(QuestionScore {
                    category_id: category.id.clone(),
                    question_id: question.id.clone(),
                    sub_question_id: sub.id.clone(),
                    student_answer,
                    correct_answer: correct_answer.map(str::to_string),
                    is_correct: outcome == AnswerOutcome::Correct,
                    marks_awarded,
                    max_marks: sub.mark,
                    outcome,
                });
            }
        }
    }

    report.total = if report.raw_total > 0.0 { report.raw_total } else { 0.0 };
    report
}

fn key_of(correct_answer: Option<&str>) -> Option<&str> {
    correct_answer.filter(|answer| !answer.trim().is_empty())
}

fn valid_mark(mark: f64) -> bool {
    mark.is_finite() && mark >= 0.0
}
