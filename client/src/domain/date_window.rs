//! Calendar windows used by date-filtered ride queries.
//!
//! Dates and times of day are interpreted in UTC. A filtered search starts at
//! the requested time of day (midnight when none is given) and always ends at
//! the following midnight: narrowing the start never narrows the end.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};

/// Validation errors returned when building a [`TimeWindow`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeWindowError {
    /// A component exceeded its range.
    #[error("{component} must be below {limit}, got {value}")]
    OutOfRange {
        /// Offending component name.
        component: &'static str,
        /// Exclusive upper bound.
        limit: u32,
        /// Supplied value.
        value: u32,
    },
    /// Text did not look like `HH:MM[:SS[.mmm]]`.
    #[error("time of day must look like HH:MM, HH:MM:SS or HH:MM:SS.mmm, got `{0}`")]
    Malformed(String),
}

/// Time of day that narrows the start of a date-filtered search.
///
/// Built from hour, minute, second and millisecond components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeWindow(NaiveTime);

impl TimeWindow {
    /// Validate components and build a window start.
    pub fn new(hour: u32, minute: u32, second: u32, millisecond: u32) -> Result<Self, TimeWindowError> {
        check_component("hour", hour, 24)?;
        check_component("minute", minute, 60)?;
        check_component("second", second, 60)?;
        check_component("millisecond", millisecond, 1_000)?;
        NaiveTime::from_hms_milli_opt(hour, minute, second, millisecond)
            .map(Self)
            .ok_or_else(|| TimeWindowError::Malformed(format!("{hour}:{minute}:{second}.{millisecond}")))
    }

    /// Time of day the window opens at.
    pub fn start_time(&self) -> NaiveTime {
        self.0
    }

    /// Components as `[hour, minute, second, millisecond]`.
    pub fn components(&self) -> [u32; 4] {
        [
            self.0.hour(),
            self.0.minute(),
            self.0.second(),
            self.0.nanosecond() / 1_000_000,
        ]
    }
}

fn check_component(component: &'static str, value: u32, limit: u32) -> Result<(), TimeWindowError> {
    if value >= limit {
        return Err(TimeWindowError::OutOfRange {
            component,
            limit,
            value,
        });
    }
    Ok(())
}

impl TryFrom<[u32; 4]> for TimeWindow {
    type Error = TimeWindowError;

    fn try_from([hour, minute, second, millisecond]: [u32; 4]) -> Result<Self, Self::Error> {
        Self::new(hour, minute, second, millisecond)
    }
}

impl FromStr for TimeWindow {
    type Err = TimeWindowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || TimeWindowError::Malformed(raw.to_owned());
        let (clock, millis) = match raw.split_once('.') {
            Some((clock, millis)) => (clock, Some(millis)),
            None => (raw, None),
        };
        let parts = clock
            .split(':')
            .map(|part| part.parse::<u32>().map_err(|_| malformed()))
            .collect::<Result<Vec<_>, _>>()?;
        let (hour, minute, second) = match parts.as_slice() {
            [hour, minute] => (*hour, *minute, 0),
            [hour, minute, second] => (*hour, *minute, *second),
            _ => return Err(malformed()),
        };
        let millisecond = match millis {
            Some(text) if parts.len() == 3 => text.parse::<u32>().map_err(|_| malformed())?,
            Some(_) => return Err(malformed()),
            None => 0,
        };
        Self::new(hour, minute, second, millisecond)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M:%S%.3f"))
    }
}

/// Half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// The whole calendar day: `[midnight date, midnight date+1)`.
    pub fn for_day(date: NaiveDate) -> Self {
        Self::starting_at(date, None)
    }

    /// From `date` at the window's time of day (midnight when absent) up to
    /// the next day's midnight.
    ///
    /// # Examples
    /// ```
    /// use chrono::NaiveDate;
    /// use carpool::domain::{DateWindow, TimeWindow, format_instant};
    ///
    /// let date = NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date");
    /// let window = DateWindow::starting_at(date, Some(TimeWindow::new(14, 0, 0, 0).expect("valid")));
    /// assert_eq!(format_instant(window.start), "2024-03-10T14:00:00.000Z");
    /// assert_eq!(format_instant(window.end), "2024-03-11T00:00:00.000Z");
    /// ```
    pub fn starting_at(date: NaiveDate, time_window: Option<TimeWindow>) -> Self {
        let start_time = time_window.map_or(NaiveTime::MIN, |window| window.start_time());
        let end = date
            .succ_opt()
            .map_or(DateTime::<Utc>::MAX_UTC, |next| next.and_time(NaiveTime::MIN).and_utc());
        Self {
            start: date.and_time(start_time).and_utc(),
            end,
        }
    }

    /// Whether `instant` falls inside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::format_instant;
    use rstest::rstest;

    fn march_tenth() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date")
    }

    #[rstest]
    #[case(Some([14, 0, 0, 0]), "2024-03-10T14:00:00.000Z")]
    #[case(Some([9, 30, 15, 250]), "2024-03-10T09:30:15.250Z")]
    #[case(None, "2024-03-10T00:00:00.000Z")]
    fn window_start_narrows_but_end_is_next_midnight(
        #[case] components: Option<[u32; 4]>,
        #[case] expected_start: &str,
    ) {
        let time_window = components.map(|parts| TimeWindow::try_from(parts).expect("valid"));

        let window = DateWindow::starting_at(march_tenth(), time_window);

        assert_eq!(format_instant(window.start), expected_start);
        assert_eq!(format_instant(window.end), "2024-03-11T00:00:00.000Z");
    }

    #[rstest]
    fn end_rolls_over_month_boundaries() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("leap day");
        let window = DateWindow::for_day(date);
        assert_eq!(format_instant(window.end), "2024-03-01T00:00:00.000Z");
    }

    #[rstest]
    fn contains_is_half_open() {
        let window = DateWindow::for_day(march_tenth());
        assert!(window.contains(window.start));
        assert!(!window.contains(window.end));
    }

    #[rstest]
    #[case([24, 0, 0, 0], "hour")]
    #[case([23, 60, 0, 0], "minute")]
    #[case([23, 0, 60, 0], "second")]
    #[case([23, 0, 0, 1_000], "millisecond")]
    fn rejects_out_of_range_components(#[case] parts: [u32; 4], #[case] component: &str) {
        let err = TimeWindow::try_from(parts).expect_err("out of range");
        assert!(
            matches!(err, TimeWindowError::OutOfRange { component: found, .. } if found == component),
            "unexpected error: {err:?}"
        );
    }

    #[rstest]
    #[case("14:00", [14, 0, 0, 0])]
    #[case("07:05:09", [7, 5, 9, 0])]
    #[case("23:59:59.999", [23, 59, 59, 999])]
    fn parses_clock_text(#[case] raw: &str, #[case] expected: [u32; 4]) {
        let window: TimeWindow = raw.parse().expect("parses");
        assert_eq!(window.components(), expected);
    }

    #[rstest]
    #[case("14")]
    #[case("14:00.5")]
    #[case("ab:cd")]
    fn rejects_malformed_clock_text(#[case] raw: &str) {
        assert!(matches!(raw.parse::<TimeWindow>(), Err(TimeWindowError::Malformed(_))));
    }
}
