//! Capture tick arithmetic and the timestamp decoding collaborator.
//!
//! Capture timestamps are 100-nanosecond ticks counted from
//! 0001-01-01T00:00:00 UTC, the same unit the AAV frame timestamps use.

use chrono::{DateTime, Timelike, Utc};

/// Ticks in one millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;
/// Ticks in one second.
pub const TICKS_PER_SECOND: i64 = 1_000 * TICKS_PER_MILLISECOND;
/// Ticks in one day.
pub const TICKS_PER_DAY: i64 = 86_400 * TICKS_PER_SECOND;
/// Tick value of 1970-01-01T00:00:00 UTC.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Converts a UTC date/time into capture ticks.
pub fn ticks_from_datetime(dt: DateTime<Utc>) -> i64 {
    UNIX_EPOCH_TICKS
        + dt.timestamp() * TICKS_PER_SECOND
        + i64::from(dt.timestamp_subsec_nanos() / 100)
}

/// Converts capture ticks back into a UTC date/time.
///
/// Returns `None` for tick values outside chrono's representable range.
pub fn datetime_from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let since_epoch = ticks - UNIX_EPOCH_TICKS;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = (since_epoch.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Current UTC time as capture ticks.
pub fn now_ticks() -> i64 {
    ticks_from_datetime(Utc::now())
}

/// A time of day recovered for a frame, typically from the video overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeOfDay {
    /// Hour, 0 to 23.
    pub hour: u32,
    /// Minute.
    pub minute: u32,
    /// Second.
    pub second: u32,
    /// Millisecond.
    pub millisecond: u32,
}

impl TimeOfDay {
    /// Ticks elapsed since midnight.
    pub fn as_ticks(&self) -> i64 {
        i64::from(self.hour) * 3_600 * TICKS_PER_SECOND
            + i64::from(self.minute) * 60 * TICKS_PER_SECOND
            + i64::from(self.second) * TICKS_PER_SECOND
            + i64::from(self.millisecond) * TICKS_PER_MILLISECOND
    }
}

/// Maps a mid-exposure tick value to a calendar time of day.
///
/// Overlay-reading implementations live outside this crate; the recorder
/// only consumes the decoded result.
pub trait TimestampDecoder: Send + Sync {
    /// Decodes the time of day for the exposure centred on `ticks`.
    fn decode_time(&self, ticks: i64) -> TimeOfDay;
}

/// Decoder that trusts the capture clock: the time of day is read from the
/// ticks themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockTimestampDecoder;

impl TimestampDecoder for ClockTimestampDecoder {
    fn decode_time(&self, ticks: i64) -> TimeOfDay {
        match datetime_from_ticks(ticks) {
            Some(dt) => TimeOfDay {
                hour: dt.hour(),
                minute: dt.minute(),
                second: dt.second(),
                millisecond: dt.nanosecond() / 1_000_000,
            },
            None => TimeOfDay::default(),
        }
    }
}

/// Builds the AAV frame timestamp: the day of `mid_ticks` at `time_of_day`.
pub fn aav_timestamp(mid_ticks: i64, time_of_day: TimeOfDay) -> i64 {
    mid_ticks - mid_ticks.rem_euclid(TICKS_PER_DAY) + time_of_day.as_ticks()
}

/// Exposure duration in tenths of a millisecond.
pub fn exposure_tenths_of_ms(start_ticks: i64, end_ticks: i64) -> u32 {
    ((end_ticks - start_ticks).max(0) / 1_000).min(i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unix_epoch_round_trip() {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(ticks_from_datetime(epoch), UNIX_EPOCH_TICKS);
        assert_eq!(datetime_from_ticks(UNIX_EPOCH_TICKS), Some(epoch));
    }

    #[test]
    fn test_clock_decoder_reads_time_of_day() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 14, 21, 7, 45).unwrap()
            + chrono::Duration::milliseconds(320);
        let tod = ClockTimestampDecoder.decode_time(ticks_from_datetime(dt));

        assert_eq!(
            tod,
            TimeOfDay {
                hour: 21,
                minute: 7,
                second: 45,
                millisecond: 320
            }
        );
    }

    #[test]
    fn test_aav_timestamp_keeps_day_and_replaces_time() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 14, 21, 7, 45).unwrap();
        let ticks = ticks_from_datetime(dt);
        let tod = TimeOfDay {
            hour: 1,
            minute: 2,
            second: 3,
            millisecond: 4,
        };

        let stamped = datetime_from_ticks(aav_timestamp(ticks, tod)).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 14, 1, 2, 3).unwrap()
            + chrono::Duration::milliseconds(4);
        assert_eq!(stamped, expected);
    }

    #[test]
    fn test_exposure_in_tenths_of_ms() {
        // 40ms PAL field pair
        assert_eq!(exposure_tenths_of_ms(0, 40 * TICKS_PER_MILLISECOND), 400);
        assert_eq!(exposure_tenths_of_ms(100, 50), 0);
    }
}
