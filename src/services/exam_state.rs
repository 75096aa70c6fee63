use serde::Serialize;
use time::{Duration, PrimitiveDateTime};

use crate::db::models::Exam;
use crate::db::types::{ExamMode, ExamStatus};
use crate::services::exam_window::{resolve_exam_window, ExamWindow, ScheduleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ExamPhase {
    Upcoming,
    Ongoing,
    Ended,
    Cancelled,
    AlwaysAvailable,
}

impl ExamPhase {
    /// Whether students may currently sit the exam.
    pub(crate) fn is_open(self) -> bool {
        matches!(self, Self::Ongoing | Self::AlwaysAvailable)
    }
}

/// Snapshot of an exam's lifecycle relative to one instant. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExamStateView {
    pub(crate) phase: ExamPhase,
    /// Time until the next transition; zero once ended, `None` when no
    /// transition is pending or the schedule could not be read.
    pub(crate) remaining: Option<Duration>,
    pub(crate) window: Option<(PrimitiveDateTime, PrimitiveDateTime)>,
    pub(crate) schedule_error: Option<ScheduleError>,
}

impl ExamStateView {
    pub(crate) fn label(&self) -> String {
        match (self.phase, self.remaining) {
            (ExamPhase::Cancelled, _) => "Exam cancelled".to_string(),
            (ExamPhase::AlwaysAvailable, _) => "Available anytime".to_string(),
            (ExamPhase::Ended, _) => "Exam ended".to_string(),
            (ExamPhase::Upcoming, Some(remaining)) => {
                format!("Starts in {}", format_remaining(remaining))
            }
            (ExamPhase::Ongoing, Some(remaining)) => {
                format!("Ends in {}", format_remaining(remaining))
            }
            (ExamPhase::Upcoming | ExamPhase::Ongoing, None) => "Schedule unavailable".to_string(),
        }
    }

    /// True when re-querying on a short cadence can change what is shown.
    pub(crate) fn needs_refresh(&self) -> bool {
        matches!(self.phase, ExamPhase::Upcoming | ExamPhase::Ongoing) && self.remaining.is_some()
    }
}

pub(crate) fn derive_exam_state(exam: &Exam, now: PrimitiveDateTime) -> ExamStateView {
    if exam.status == ExamStatus::Cancelled {
        return derive_state(exam.status, exam.mode, Ok(ExamWindow::AlwaysOpen), now);
    }

    let window = resolve_exam_window(exam);
    if let Err(err) = &window {
        tracing::warn!(exam_id = %exam.id, error = %err, "Exam schedule unreadable; showing as upcoming");
    }

    derive_state(exam.status, exam.mode, window, now)
}

/// Cancellation wins over everything, then anytime mode, then the window.
pub(crate) fn derive_state(
    status: ExamStatus,
    mode: ExamMode,
    window: Result<ExamWindow, ScheduleError>,
    now: PrimitiveDateTime,
) -> ExamStateView {
    if status == ExamStatus::Cancelled {
        return ExamStateView {
            phase: ExamPhase::Cancelled,
            remaining: None,
            window: None,
            schedule_error: None,
        };
    }

    if mode == ExamMode::Anytime {
        return ExamStateView {
            phase: ExamPhase::AlwaysAvailable,
            remaining: None,
            window: None,
            schedule_error: None,
        };
    }

    let (start, end) = match window {
        Ok(ExamWindow::Bounded { start, end }) => (start, end),
        Ok(ExamWindow::AlwaysOpen) => {
            return ExamStateView {
                phase: ExamPhase::AlwaysAvailable,
                remaining: None,
                window: None,
                schedule_error: None,
            };
        }
        Err(err) => {
            return ExamStateView {
                phase: ExamPhase::Upcoming,
                remaining: None,
                window: None,
                schedule_error: Some(err),
            };
        }
    };

    let (phase, remaining) = if now < start {
        (ExamPhase::Upcoming, start - now)
    } else if (ExamWindow::Bounded { start, end }).contains(now) {
        (ExamPhase::Ongoing, end - now)
    } else {
        (ExamPhase::Ended, Duration::ZERO)
    };

    ExamStateView { phase, remaining: Some(remaining), window: Some((start, end)), schedule_error: None }
}

/// `1d 2h 3m 4s` with zero units dropped; never empty (`0s` at worst).
pub(crate) fn format_remaining(remaining: Duration) -> String {
    let total = remaining.whole_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::exam_window::resolve_window;
    use crate::test_support;
    use time::macros::datetime;

    fn scheduled_exam() -> Exam {
        test_support::scheduled_exam("exam-1", "2025-01-10", "10:00", 60)
    }

    #[test]
    fn scheduled_exam_walks_through_phases() {
        let exam = scheduled_exam();

        let before = derive_exam_state(&exam, datetime!(2025-01-10 09:59:59));
        assert_eq!(before.phase, ExamPhase::Upcoming);
        assert_eq!(before.remaining, Some(Duration::seconds(1)));

        let during = derive_exam_state(&exam, datetime!(2025-01-10 10:30:00));
        assert_eq!(during.phase, ExamPhase::Ongoing);
        assert_eq!(during.remaining, Some(Duration::minutes(30)));
        assert_eq!(during.label(), "Ends in 30m");

        let after = derive_exam_state(&exam, datetime!(2025-01-10 11:00:01));
        assert_eq!(after.phase, ExamPhase::Ended);
        assert_eq!(after.remaining, Some(Duration::ZERO));
        assert_eq!(after.label(), "Exam ended");
    }

    #[test]
    fn every_instant_in_window_is_ongoing_and_end_is_ended() {
        let exam = scheduled_exam();
        let start = datetime!(2025-01-10 10:00:00);
        for offset in [0, 1, 59, 600, 3_599] {
            let view = derive_exam_state(&exam, start + Duration::seconds(offset));
            assert_eq!(view.phase, ExamPhase::Ongoing, "offset {offset}");
        }
        for offset in [3_600, 3_601, 86_400] {
            let view = derive_exam_state(&exam, start + Duration::seconds(offset));
            assert_eq!(view.phase, ExamPhase::Ended, "offset {offset}");
        }
    }

    #[test]
    fn cancelled_overrides_schedule_and_mode() {
        let mut exam = scheduled_exam();
        exam.status = ExamStatus::Cancelled;
        for now in [datetime!(2025-01-10 09:00:00), datetime!(2025-01-10 10:30:00)] {
            assert_eq!(derive_exam_state(&exam, now).phase, ExamPhase::Cancelled);
        }

        exam.mode = ExamMode::Anytime;
        assert_eq!(derive_exam_state(&exam, datetime!(2030-01-01 00:00:00)).phase, ExamPhase::Cancelled);

        exam.mode = ExamMode::Scheduled;
        exam.scheduled_date = Some("not a date".to_string());
        let view = derive_exam_state(&exam, datetime!(2025-01-10 10:30:00));
        assert_eq!(view.phase, ExamPhase::Cancelled);
        assert!(view.schedule_error.is_none());
    }

    #[test]
    fn anytime_is_always_available() {
        let mut exam = scheduled_exam();
        exam.mode = ExamMode::Anytime;
        exam.scheduled_date = None;
        exam.scheduled_time = None;
        for now in [datetime!(1999-12-31 23:59:59), datetime!(2025-01-10 10:30:00)] {
            let view = derive_exam_state(&exam, now);
            assert_eq!(view.phase, ExamPhase::AlwaysAvailable);
            assert!(view.phase.is_open());
            assert!(!view.needs_refresh());
        }
    }

    #[test]
    fn unreadable_schedule_falls_back_to_upcoming() {
        let mut exam = scheduled_exam();
        exam.scheduled_time = Some("ten o'clock".to_string());

        let view = derive_exam_state(&exam, datetime!(2025-01-10 10:30:00));
        assert_eq!(view.phase, ExamPhase::Upcoming);
        assert_eq!(view.remaining, None);
        assert!(view.schedule_error.is_some());
        assert_eq!(view.label(), "Schedule unavailable");
        assert!(!view.needs_refresh());
    }

    #[test]
    fn derive_state_accepts_injected_window() {
        let window = resolve_window(ExamMode::Scheduled, Some("2025-03-01"), Some("00:00"), 1);
        let view =
            derive_state(ExamStatus::Active, ExamMode::Scheduled, window, datetime!(2025-02-28 23:00:00));
        assert_eq!(view.phase, ExamPhase::Upcoming);
        assert_eq!(view.label(), "Starts in 1h");
        assert!(view.needs_refresh());
    }

    #[test]
    fn format_remaining_drops_zero_units() {
        assert_eq!(format_remaining(Duration::ZERO), "0s");
        assert_eq!(format_remaining(Duration::seconds(45)), "45s");
        assert_eq!(format_remaining(Duration::minutes(30)), "30m");
        assert_eq!(format_remaining(Duration::seconds(3_605)), "1h 5s");
        assert_eq!(
            format_remaining(Duration::days(2) + Duration::hours(3) + Duration::seconds(7)),
            "2d 3h 7s"
        );
        assert_eq!(format_remaining(Duration::seconds(-30)), "0s");
    }

    #[test]
    fn sub_second_remainder_formats_as_zero_seconds() {
        assert_eq!(format_remaining(Duration::milliseconds(400)), "0s");
    }
}
