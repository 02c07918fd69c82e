use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Whole seconds from `start` to `end`, negative when `end` is earlier.
pub(crate) fn seconds_between(start: PrimitiveDateTime, end: PrimitiveDateTime) -> i64 {
    (end - start).whole_seconds()
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
    fn to_primitive_utc_normalises_offset() {
        let shifted = datetime!(2025-01-02 13:20:30 +03:00);
        assert_eq!(to_primitive_utc(shifted), datetime!(2025-01-02 10:20:30));
    }

    #[test]
    fn seconds_between_is_signed() {
        let start = datetime!(2025-01-02 10:00:00);
        let end = datetime!(2025-01-02 10:11:05);
        assert_eq!(seconds_between(start, end), 665);
        assert_eq!(seconds_between(end, start), -665);
    }
}
