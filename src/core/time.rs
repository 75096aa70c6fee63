use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};

/// Source of the current instant. Everything time-dependent in the engine
/// takes `now` from here (or as an argument) instead of reading the system
/// clock directly.
pub(crate) trait Clock: Send + Sync {
    fn now(&self) -> PrimitiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> PrimitiveDateTime {
        primitive_now_utc()
    }
}

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn format_primitive_outputs_utc_z() {
        assert_eq!(format_primitive(datetime!(2025-01-02 10:20:30)), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn system_clock_is_close_to_offset_now() {
        let before = OffsetDateTime::now_utc();
        let now = SystemClock.now().assume_utc();
        assert!(now >= before - time::Duration::seconds(1));
    }
}
