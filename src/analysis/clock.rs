//! Conversions between absolute timestamps and the two textual time formats
//! the model speaks: `MM:SS` offsets into a video, and `h:mm AM/PM` wall
//! clock times on the batch's own day.

use chrono::{Local, NaiveDate, NaiveTime, TimeZone};

use crate::db::helpers::local_datetime;

/// `MM:SS` to seconds. Anything other than exactly two unsigned integer
/// fields yields 0.
pub fn parse_offset_mmss(value: &str) -> i64 {
    let mut parts = value.trim().split(':');
    let (Some(minutes), Some(seconds), None) = (parts.next(), parts.next(), parts.next()) else {
        return 0;
    };
    match (minutes.parse::<u32>(), seconds.parse::<u32>()) {
        (Ok(minutes), Ok(seconds)) => i64::from(minutes) * 60 + i64::from(seconds),
        _ => 0,
    }
}

/// Seconds to zero-padded `MM:SS`; minutes are not wrapped into hours.
pub fn format_duration_mmss(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// `h:mm AM/PM` in local time, e.g. `1:12 PM`.
pub fn format_clock(ts: i64) -> String {
    local_datetime(ts).format("%-I:%M %p").to_string()
}

/// `HH:MM` in local time, used in canned debug output.
pub fn format_clock_24h(ts: i64) -> String {
    local_datetime(ts).format("%H:%M").to_string()
}

/// Combine an `h:mm AM/PM` string with `date` into a local timestamp.
pub fn parse_clock_on_date(value: &str, date: NaiveDate) -> Option<i64> {
    let time = NaiveTime::parse_from_str(value.trim(), "%I:%M %p").ok()?;
    Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.timestamp())
}

/// Clamp `(start, end)` into `[batch_start, batch_end]`. A range that ends up
/// empty or inverted is replaced by the whole batch range.
pub fn clamp_to_batch(start: i64, end: i64, batch_start: i64, batch_end: i64) -> (i64, i64) {
    let clamped_start = start.max(batch_start);
    let clamped_end = end.min(batch_end);
    if clamped_end <= clamped_start {
        (batch_start, batch_end)
    } else {
        (clamped_start, clamped_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_ts(date: NaiveDate, hour: u32, minute: u32) -> i64 {
        Local
            .from_local_datetime(&date.and_hms_opt(hour, minute, 0).unwrap())
            .earliest()
            .unwrap()
            .timestamp()
    }

    #[test]
    fn offsets_parse_strictly() {
        assert_eq!(parse_offset_mmss("00:00"), 0);
        assert_eq!(parse_offset_mmss("06:45"), 405);
        assert_eq!(parse_offset_mmss(" 14:58 "), 898);
        assert_eq!(parse_offset_mmss("75:00"), 4_500);
        assert_eq!(parse_offset_mmss("1:02:03"), 0);
        assert_eq!(parse_offset_mmss("ab:10"), 0);
        assert_eq!(parse_offset_mmss("-1:10"), 0);
        assert_eq!(parse_offset_mmss("90"), 0);
        assert_eq!(parse_offset_mmss(""), 0);
    }

    #[test]
    fn durations_format_as_minutes_and_seconds() {
        assert_eq!(format_duration_mmss(900), "15:00");
        assert_eq!(format_duration_mmss(65), "01:05");
        assert_eq!(format_duration_mmss(0), "00:00");
        assert_eq!(format_duration_mmss(-5), "00:00");
        assert_eq!(parse_offset_mmss(&format_duration_mmss(898)), 898);
    }

    #[test]
    fn clock_parses_model_style_times() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(parse_clock_on_date("1:12 PM", date), Some(local_ts(date, 13, 12)));
        assert_eq!(parse_clock_on_date("01:12 pm", date), Some(local_ts(date, 13, 12)));
        assert_eq!(parse_clock_on_date("12:05 AM", date), Some(local_ts(date, 0, 5)));
        assert_eq!(parse_clock_on_date("12:30 PM", date), Some(local_ts(date, 12, 30)));
        assert_eq!(parse_clock_on_date("13:12", date), None);
        assert_eq!(parse_clock_on_date("soon", date), None);
    }

    #[test]
    fn clock_round_trips_every_minute_of_a_day() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        for minute_of_day in (0..24 * 60).step_by(7) {
            let ts = local_ts(date, minute_of_day / 60, minute_of_day % 60);
            let text = format_clock(ts);
            assert_eq!(parse_clock_on_date(&text, date), Some(ts), "{text}");
        }
    }

    #[test]
    fn clamping_stays_inside_the_batch() {
        let (bs, be) = (1_000, 1_900);
        for s in (0..3_000).step_by(137) {
            for e in (0..3_000).step_by(149) {
                let (start, end) = clamp_to_batch(s, e, bs, be);
                assert!(bs <= start && start < end && end <= be, "({s}, {e})");
            }
        }
    }

    #[test]
    fn clamping_an_inner_range_is_a_no_op() {
        assert_eq!(clamp_to_batch(1_100, 1_500, 1_000, 1_900), (1_100, 1_500));
        assert_eq!(clamp_to_batch(1_000, 1_900, 1_000, 1_900), (1_000, 1_900));
    }

    #[test]
    fn inverted_range_becomes_the_whole_batch() {
        assert_eq!(clamp_to_batch(1_500, 1_100, 1_000, 1_900), (1_000, 1_900));
        assert_eq!(clamp_to_batch(5_000, 6_000, 1_000, 1_900), (1_000, 1_900));
    }
}
