//! Local calendar arithmetic
//!
//! Day boundaries are evaluated in a fixed local offset so the pipeline stays
//! deterministic: the host supplies "now" with every call and the offset comes
//! from configuration.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

const MS_PER_DAY: i64 = 86_400_000;
const MS_PER_SECOND: i64 = 1_000;

/// Converts epoch milliseconds to local calendar days and back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCalendar {
    offset: FixedOffset,
}

impl Default for LocalCalendar {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl LocalCalendar {
    /// Calendar for the given UTC offset in minutes (falls back to UTC when out of range)
    pub fn from_offset_minutes(minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local calendar day containing the instant
    pub fn local_day(&self, timestamp_ms: i64) -> NaiveDate {
        let utc = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).unwrap_or_default();
        utc.with_timezone(&self.offset).date_naive()
    }

    /// Epoch milliseconds of local 00:00:00.000 on `day`
    pub fn start_of_day_ms(&self, day: NaiveDate) -> i64 {
        let local_midnight = day.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        local_midnight - self.offset.local_minus_utc() as i64 * MS_PER_SECOND
    }

    /// Epoch milliseconds of local 23:59:59.999 on `day`
    pub fn end_of_day_ms(&self, day: NaiveDate) -> i64 {
        self.start_of_day_ms(day) + MS_PER_DAY - 1
    }

    /// Epoch milliseconds of local 23:59:59 on `day`, used for a day's final record
    pub fn final_record_timestamp(&self, day: NaiveDate) -> i64 {
        self.start_of_day_ms(day) + MS_PER_DAY - MS_PER_SECOND
    }

    /// First local midnight strictly after `now_ms`
    pub fn next_midnight_ms(&self, now_ms: i64) -> i64 {
        self.start_of_day_ms(self.local_day(now_ms)) + MS_PER_DAY
    }

    /// Inclusive millisecond range of the local day containing `now_ms`
    pub fn today_range(&self, now_ms: i64) -> (i64, i64) {
        let day = self.local_day(now_ms);
        (self.start_of_day_ms(day), self.end_of_day_ms(day))
    }

    /// Inclusive millisecond range of the ISO week (Monday first) containing `now_ms`
    pub fn week_range(&self, now_ms: i64) -> (i64, i64) {
        let day = self.local_day(now_ms);
        let monday = day - Duration::days(day.weekday().num_days_from_monday() as i64);
        let start = self.start_of_day_ms(monday);
        (start, start + 7 * MS_PER_DAY - 1)
    }

    /// Inclusive millisecond range of the calendar month containing `now_ms`
    pub fn month_range(&self, now_ms: i64) -> (i64, i64) {
        let day = self.local_day(now_ms);
        let first = day.with_day(1).unwrap_or(day);
        let next_first = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
        };
        let start = self.start_of_day_ms(first);
        let end = match next_first {
            Some(next) => self.start_of_day_ms(next) - 1,
            None => self.end_of_day_ms(day),
        };
        (start, end)
    }
}

/// Integer day key (days since the common era)
pub fn day_ordinal(day: NaiveDate) -> i32 {
    day.num_days_from_ce()
}

/// Format a duration as `H:MM:SS` when it reaches an hour, else `MM:SS`
pub fn format_duration(duration_ms: i64) -> String {
    let total_seconds = duration_ms.max(0) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds / 60) % 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-15T10:30:00Z
    const MID_MORNING_UTC: i64 = 1_710_498_600_000;

    #[test]
    fn test_local_day_respects_offset() {
        let utc = LocalCalendar::default();
        assert_eq!(utc.local_day(MID_MORNING_UTC), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());

        // UTC-11 puts the same instant on the previous day
        let samoa = LocalCalendar::from_offset_minutes(-11 * 60);
        assert_eq!(samoa.local_day(MID_MORNING_UTC), NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
    }

    #[test]
    fn test_day_boundaries() {
        let calendar = LocalCalendar::from_offset_minutes(60);
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let start = calendar.start_of_day_ms(day);

        // Local midnight at UTC+1 is 23:00 UTC the day before
        assert_eq!(start, 1_710_457_200_000);
        assert_eq!(calendar.local_day(start), day);
        assert_eq!(calendar.local_day(start - 1), day.pred_opt().unwrap());
        assert_eq!(calendar.final_record_timestamp(day), start + 86_399_000);
        assert_eq!(calendar.end_of_day_ms(day), start + 86_399_999);
    }

    #[test]
    fn test_next_midnight() {
        let calendar = LocalCalendar::default();
        let next = calendar.next_midnight_ms(MID_MORNING_UTC);
        assert_eq!(next, 1_710_547_200_000);
        assert_eq!(calendar.next_midnight_ms(next), next + MS_PER_DAY);
    }

    #[test]
    fn test_today_range() {
        let calendar = LocalCalendar::from_offset_minutes(60);
        let (start, end) = calendar.today_range(MID_MORNING_UTC);
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(start, calendar.start_of_day_ms(day));
        assert_eq!(end, calendar.end_of_day_ms(day));
        assert!(start <= MID_MORNING_UTC && MID_MORNING_UTC <= end);
        assert_eq!(calendar.local_day(end + 1), day.succ_opt().unwrap());
    }

    #[test]
    fn test_week_and_month_ranges() {
        let calendar = LocalCalendar::default();
        let (week_start, week_end) = calendar.week_range(MID_MORNING_UTC);
        // 2024-03-15 is a Friday; the week starts Monday 2024-03-11
        assert_eq!(calendar.local_day(week_start), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(calendar.local_day(week_end), NaiveDate::from_ymd_opt(2024, 3, 17).unwrap());

        let (month_start, month_end) = calendar.month_range(MID_MORNING_UTC);
        assert_eq!(calendar.local_day(month_start), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(calendar.local_day(month_end), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(calendar.local_day(month_end + 1), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    }

    #[test]
    fn test_day_ordinal_distinguishes_years() {
        let a = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_ne!(day_ordinal(a), day_ordinal(b));
        assert_eq!(day_ordinal(b) - day_ordinal(a), 366);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(65_000), "01:05");
        assert_eq!(format_duration(3_723_000), "1:02:03");
    }
}
