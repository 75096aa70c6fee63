use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "exammode", rename_all = "lowercase")]
pub(crate) enum ExamMode {
    Scheduled,
    Anytime,
}

/// Administrative status. Independent of the time-derived lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "examtype", rename_all = "UPPERCASE")]
pub(crate) enum ExamType {
    Mcq,
    Written,
}

impl ExamType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Mcq => "MCQ",
            Self::Written => "WRITTEN",
        }
    }
}
