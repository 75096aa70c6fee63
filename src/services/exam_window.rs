use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time};

use crate::db::models::Exam;
use crate::db::types::ExamMode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ScheduleError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

/// Availability window of an exam. Scheduled exams are open on `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExamWindow {
    AlwaysOpen,
    Bounded { start: PrimitiveDateTime, end: PrimitiveDateTime },
}

impl ExamWindow {
    pub(crate) fn contains(&self, now: PrimitiveDateTime) -> bool {
        match self {
            Self::AlwaysOpen => true,
            Self::Bounded { start, end } => *start <= now && now < *end,
        }
    }

    pub(crate) fn bounds(&self) -> Option<(PrimitiveDateTime, PrimitiveDateTime)> {
        match self {
            Self::AlwaysOpen => None,
            Self::Bounded { start, end } => Some((*start, *end)),
        }
    }
}

pub(crate) fn resolve_exam_window(exam: &Exam) -> Result<ExamWindow, ScheduleError> {
    resolve_window(
        exam.mode,
        exam.scheduled_date.as_deref(),
        exam.scheduled_time.as_deref(),
        exam.duration_minutes,
    )
}

/// Pure and uncached: callers re-derive on every query.
pub(crate) fn resolve_window(
    mode: ExamMode,
    scheduled_date: Option<&str>,
    scheduled_time: Option<&str>,
    duration_minutes: i32,
) -> Result<ExamWindow, ScheduleError> {
    if mode == ExamMode::Anytime {
        return Ok(ExamWindow::AlwaysOpen);
    }

    if duration_minutes < 0 {
        return Err(ScheduleError::InvalidSchedule(format!(
            "duration_minutes must be non-negative, got {duration_minutes}"
        )));
    }

    let date = scheduled_date
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ScheduleError::InvalidSchedule("scheduled_date is missing".to_string()))
        .and_then(parse_date)?;
    let time_of_day = scheduled_time
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ScheduleError::InvalidSchedule("scheduled_time is missing".to_string()))
        .and_then(parse_time_of_day)?;

    let start = PrimitiveDateTime::new(date, time_of_day);
    let end = start.checked_add(Duration::minutes(i64::from(duration_minutes))).ok_or_else(|| {
        ScheduleError::InvalidSchedule("exam window ends outside the supported range".to_string())
    })?;

    Ok(ExamWindow::Bounded { start, end })
}

/// Accepts a calendar date or a full timestamp whose clock fields are
/// discarded.
fn parse_date(raw: &str) -> Result<Date, ScheduleError> {
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Ok(date);
    }

    if let Ok(timestamp) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(timestamp.date());
    }

    if let Ok(timestamp) =
        PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
    {
        return Ok(timestamp.date());
    }

    Err(ScheduleError::InvalidSchedule(format!("unrecognised scheduled_date '{raw}'")))
}

/// `HH:MM` or `HH:MM:SS`; seconds are truncated to zero.
fn parse_time_of_day(raw: &str) -> Result<Time, ScheduleError> {
    let invalid = || ScheduleError::InvalidSchedule(format!("unrecognised scheduled_time '{raw}'"));

    let mut parts = raw.split(':');
    let hour = parts.next().and_then(|part| part.trim().parse::<u8>().ok()).ok_or_else(invalid)?;
    let minute =
        parts.next().and_then(|part| part.trim().parse::<u8>().ok()).ok_or_else(invalid)?;
    if let Some(second) = parts.next() {
        second.trim().parse::<u8>().map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }

    Time::from_hms(hour, minute, 0).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn scheduled(date: &str, time: &str, minutes: i32) -> Result<ExamWindow, ScheduleError> {
        resolve_window(ExamMode::Scheduled, Some(date), Some(time), minutes)
    }

    #[test]
    fn scheduled_window_spans_duration_in_minutes() {
        let window = scheduled("2025-01-10", "10:00", 60).expect("window");
        assert_eq!(
            window,
            ExamWindow::Bounded {
                start: datetime!(2025-01-10 10:00:00),
                end: datetime!(2025-01-10 11:00:00),
            }
        );
    }

    #[test]
    fn window_is_half_open() {
        let window = scheduled("2025-01-10", "10:00", 60).expect("window");
        assert!(!window.contains(datetime!(2025-01-10 09:59:59)));
        assert!(window.contains(datetime!(2025-01-10 10:00:00)));
        assert!(window.contains(datetime!(2025-01-10 10:59:59)));
        assert!(!window.contains(datetime!(2025-01-10 11:00:00)));
    }

    #[test]
    fn seconds_of_time_of_day_are_truncated() {
        let window = scheduled("2025-01-10", "10:00:45", 30).expect("window");
        assert_eq!(window.bounds().map(|(start, _)| start), Some(datetime!(2025-01-10 10:00:00)));
    }

    #[test]
    fn timestamp_dates_have_their_clock_overwritten() {
        let window = scheduled("2025-01-10T23:15:00Z", "08:30", 15).expect("window");
        assert_eq!(
            window.bounds(),
            Some((datetime!(2025-01-10 08:30:00), datetime!(2025-01-10 08:45:00)))
        );
    }

    #[test]
    fn zero_duration_gives_empty_window() {
        let window = scheduled("2025-01-10", "10:00", 0).expect("window");
        let (start, end) = window.bounds().expect("bounds");
        assert_eq!(start, end);
        assert!(!window.contains(start));
    }

    #[test]
    fn window_may_cross_midnight() {
        let window = scheduled("2025-01-10", "23:30", 90).expect("window");
        assert_eq!(window.bounds().map(|(_, end)| end), Some(datetime!(2025-01-11 01:00:00)));
    }

    #[test]
    fn anytime_ignores_schedule_fields() {
        let window = resolve_window(ExamMode::Anytime, None, Some("garbage"), -5).expect("window");
        assert_eq!(window, ExamWindow::AlwaysOpen);
        assert!(window.contains(datetime!(1970-01-01 00:00:00)));
        assert!(window.bounds().is_none());
    }

    #[test]
    fn missing_or_unparsable_schedule_is_rejected() {
        let cases = [
            resolve_window(ExamMode::Scheduled, None, Some("10:00"), 60),
            resolve_window(ExamMode::Scheduled, Some("2025-01-10"), None, 60),
            resolve_window(ExamMode::Scheduled, Some("  "), Some("10:00"), 60),
            scheduled("10/01/2025", "10:00", 60),
            scheduled("2025-01-10", "25:00", 60),
            scheduled("2025-01-10", "10", 60),
            scheduled("2025-01-10", "10:00:00:00", 60),
            scheduled("2025-01-10", "10:00", -1),
        ];

        for case in cases {
            assert!(matches!(case, Err(ScheduleError::InvalidSchedule(_))), "{case:?}");
        }
    }
}
