use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{ExamMode, ExamStatus, ExamType};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) mode: ExamMode,
    /// Raw schedule input; parsed on every status query.
    pub(crate) scheduled_date: Option<String>,
    pub(crate) scheduled_time: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) status: ExamStatus,
    pub(crate) exam_type: ExamType,
    pub(crate) min_pass_mark: f64,
    /// Always within [-100, 0].
    pub(crate) negative_mark: f64,
    pub(crate) result_published: bool,
    pub(crate) question_set: Option<Json<QuestionSet>>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
}

impl Exam {
    pub(crate) fn question_set(&self) -> Option<&QuestionSet> {
        self.question_set.as_ref().map(|set| &set.0)
    }
}

/// Category -> Question -> SubQuestion, in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct QuestionSet {
    #[serde(default)]
    pub(crate) categories: Vec<QuestionCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct QuestionCategory {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Question {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) prompt: String,
    #[serde(default, alias = "subQuestions")]
    pub(crate) sub_questions: Vec<SubQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SubQuestion {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) prompt: String,
    #[serde(default)]
    pub(crate) options: Vec<String>,
    #[serde(default, alias = "correctAnswer")]
    pub(crate) correct_answer: Option<String>,
    #[serde(default)]
    pub(crate) mark: f64,
}

impl QuestionSet {
    pub(crate) fn sub_question_count(&self) -> usize {
        self.categories
            .iter()
            .flat_map(|category| category.questions.iter())
            .map(|question| question.sub_questions.len())
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    /// Sub-question id -> selected option.
    pub(crate) answers: Json<BTreeMap<String, String>>,
    /// Page order is significant.
    pub(crate) answer_images: Json<Vec<String>>,
    pub(crate) evaluated_images: Json<Vec<String>>,
    pub(crate) is_evaluated: bool,
    pub(crate) total_marks: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) grade: Option<String>,
    pub(crate) evaluated_by: Option<String>,
    pub(crate) evaluated_at: Option<PrimitiveDateTime>,
    pub(crate) evaluation_count: i32,
    /// Optimistic concurrency token, bumped on every successful save.
    pub(crate) revision: i64,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
