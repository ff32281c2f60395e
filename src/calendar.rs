//! CF time-axis decoding and calendar arithmetic
//!
//! NetCDF time coordinates are stored as numeric offsets from an epoch, e.g.
//! `days since 2001-01-01 00:00:00`, interpreted in one of the CF calendars.
//! This module turns those offsets into calendar dates, re-encodes them into new
//! units, and defines the month / season vocabulary used to select climatology
//! periods.
//!
//! `standard` and `gregorian` are treated as proleptic Gregorian; data before
//! 1582 is not expected in model precipitation output.

use crate::errors::{ClimError, Result};
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_DAY: f64 = 86_400.0;

const COMMON_MONTHS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const LEAP_MONTHS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Supported CF calendars
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// Proleptic Gregorian (`standard`, `gregorian`, `proleptic_gregorian`)
    Standard,
    /// 365-day years (`noleap`, `365_day`)
    NoLeap,
    /// 366-day years (`all_leap`, `366_day`)
    AllLeap,
    /// Twelve 30-day months (`360_day`)
    Day360,
}

impl Calendar {
    /// CF name of the calendar
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::NoLeap => "noleap",
            Self::AllLeap => "all_leap",
            Self::Day360 => "360_day",
        }
    }

    fn month_lengths(self, year: i32) -> [u32; 12] {
        match self {
            Self::Standard => {
                let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
                if leap {
                    LEAP_MONTHS
                } else {
                    COMMON_MONTHS
                }
            }
            Self::NoLeap => COMMON_MONTHS,
            Self::AllLeap => LEAP_MONTHS,
            Self::Day360 => [30; 12],
        }
    }

    /// Fixed year length for the non-Gregorian calendars
    const fn fixed_year_length(self) -> i64 {
        match self {
            Self::AllLeap => 366,
            Self::Day360 => 360,
            Self::Standard | Self::NoLeap => 365,
        }
    }

    /// Continuous day count for a date in this calendar.
    fn day_number(self, year: i32, month: u32, day: u32) -> Result<i64> {
        let invalid = || {
            ClimError::PreconditionViolation(format!(
                "{year:04}-{month:02}-{day:02} is not a valid date in the {} calendar",
                self.as_str()
            ))
        };

        if !(1..=12).contains(&month) || day == 0 {
            return Err(invalid());
        }
        let lengths = self.month_lengths(year);
        if day > lengths[(month - 1) as usize] {
            return Err(invalid());
        }

        match self {
            Self::Standard => NaiveDate::from_ymd_opt(year, month, day)
                .map(|d| i64::from(d.num_days_from_ce()))
                .ok_or_else(invalid),
            _ => {
                let before: u32 = lengths[..(month - 1) as usize].iter().sum();
                Ok(i64::from(year) * self.fixed_year_length() + i64::from(before) + i64::from(day)
                    - 1)
            }
        }
    }

    /// Inverse of [`Calendar::day_number`].
    fn date_from_day_number(self, number: i64) -> Result<(i32, u32, u32)> {
        let overflow = || {
            ClimError::PreconditionViolation(format!(
                "day number {number} is out of range for the {} calendar",
                self.as_str()
            ))
        };

        match self {
            Self::Standard => {
                let n = i32::try_from(number).map_err(|_| overflow())?;
                NaiveDate::from_num_days_from_ce_opt(n)
                    .map(|d| (d.year(), d.month(), d.day()))
                    .ok_or_else(overflow)
            }
            _ => {
                let year_len = self.fixed_year_length();
                let year = i32::try_from(number.div_euclid(year_len)).map_err(|_| overflow())?;
                let mut remaining = number.rem_euclid(year_len) as u32;
                for (idx, &len) in self.month_lengths(year).iter().enumerate() {
                    if remaining < len {
                        return Ok((year, idx as u32 + 1, remaining + 1));
                    }
                    remaining -= len;
                }
                Err(overflow())
            }
        }
    }
}

impl FromStr for Calendar {
    type Err = ClimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Self::Standard),
            "noleap" | "365_day" => Ok(Self::NoLeap),
            "all_leap" | "366_day" => Ok(Self::AllLeap),
            "360_day" => Ok(Self::Day360),
            other => Err(ClimError::PreconditionViolation(format!(
                "unsupported calendar '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step of a CF `<step> since <epoch>` unit string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStep {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeStep {
    #[must_use]
    pub const fn seconds(self) -> f64 {
        match self {
            Self::Days => SECONDS_PER_DAY,
            Self::Hours => 3_600.0,
            Self::Minutes => 60.0,
            Self::Seconds => 1.0,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Hours => "hours",
            Self::Minutes => "minutes",
            Self::Seconds => "seconds",
        }
    }
}

impl FromStr for TimeStep {
    type Err = ClimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => Ok(Self::Days),
            "hours" | "hour" | "hr" | "h" => Ok(Self::Hours),
            "minutes" | "minute" | "min" => Ok(Self::Minutes),
            "seconds" | "second" | "sec" | "s" => Ok(Self::Seconds),
            "months" | "month" | "years" | "year" => Err(ClimError::PreconditionViolation(
                format!("time step '{s}' has no fixed length and is not supported"),
            )),
            other => Err(ClimError::PreconditionViolation(format!(
                "unrecognised time step '{other}'"
            ))),
        }
    }
}

/// Parsed `<step> since <epoch>` unit string
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub step: TimeStep,
    pub epoch_year: i32,
    pub epoch_month: u32,
    pub epoch_day: u32,
    /// Seconds after midnight of the epoch date
    pub epoch_seconds: f64,
}

impl FromStr for TimeUnits {
    type Err = ClimError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || ClimError::PreconditionViolation(format!("malformed time units '{s}'"));

        // Accept both "2001-01-01 00:00:00" and "2001-01-01T00:00:00"
        let normalized = s.replace('T', " ");
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        if tokens.len() < 3 || !tokens[1].eq_ignore_ascii_case("since") {
            return Err(malformed());
        }

        let step: TimeStep = tokens[0].parse()?;

        let (year, month, day) = parse_date(tokens[2]).ok_or_else(malformed)?;
        let epoch_seconds = match tokens.get(3) {
            Some(clock) => parse_clock(clock).ok_or_else(malformed)?,
            None => 0.0,
        };

        Ok(Self {
            step,
            epoch_year: year,
            epoch_month: month,
            epoch_day: day,
            epoch_seconds,
        })
    }
}

impl fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.epoch_seconds.round() as u32;
        write!(
            f,
            "{} since {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.step.as_str(),
            self.epoch_year,
            self.epoch_month,
            self.epoch_day,
            total / 3_600,
            (total % 3_600) / 60,
            total % 60
        )
    }
}

fn parse_date(text: &str) -> Option<(i32, u32, u32)> {
    let mut parts = text.splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    Some((year, month, day))
}

fn parse_clock(text: &str) -> Option<f64> {
    let text = text.trim_end_matches('Z');
    let mut parts = text.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next().map_or(Some(0.0), |m| m.parse().ok())?;
    let seconds: f64 = parts.next().map_or(Some(0.0), |s| s.parse().ok())?;
    Some(hours * 3_600.0 + minutes * 60.0 + seconds)
}

/// A decoded point on the time axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStamp {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub seconds: f64,
}

impl TimeStamp {
    /// Calendar month of this time stamp
    #[must_use]
    pub fn month(&self) -> Month {
        // month is always 1..=12 once decoded
        Month::from_number(self.month).unwrap_or(Month::January)
    }
}

/// Time coordinate of a field: raw offsets plus the units and calendar needed to decode them
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    offsets: Vec<f64>,
    units: TimeUnits,
    calendar: Calendar,
}

impl TimeAxis {
    #[must_use]
    pub fn new(offsets: Vec<f64>, units: TimeUnits, calendar: Calendar) -> Self {
        Self {
            offsets,
            units,
            calendar,
        }
    }

    #[must_use]
    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    #[must_use]
    pub fn units(&self) -> &TimeUnits {
        &self.units
    }

    #[must_use]
    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Decode every offset into a calendar date.
    pub fn dates(&self) -> Result<Vec<TimeStamp>> {
        let epoch = self.calendar.day_number(
            self.units.epoch_year,
            self.units.epoch_month,
            self.units.epoch_day,
        )?;

        self.offsets
            .iter()
            .map(|&offset| {
                let total = offset * self.units.step.seconds() + self.units.epoch_seconds;
                if !total.is_finite() {
                    return Err(ClimError::PreconditionViolation(format!(
                        "time offset {offset} cannot be decoded"
                    )));
                }
                let days = (total / SECONDS_PER_DAY).floor();
                let seconds = total - days * SECONDS_PER_DAY;
                let number = whole_days(days)
                    .and_then(|days| epoch.checked_add(days))
                    .ok_or_else(|| {
                        ClimError::PreconditionViolation(format!(
                            "time offset {offset} is outside the representable date range"
                        ))
                    })?;
                let (year, month, day) = self.calendar.date_from_day_number(number)?;
                Ok(TimeStamp {
                    year,
                    month,
                    day,
                    seconds,
                })
            })
            .collect()
    }

    /// Re-express the same instants relative to new units (same calendar).
    pub fn convert_units(&self, new_units: TimeUnits) -> Result<TimeAxis> {
        let old_epoch = self.calendar.day_number(
            self.units.epoch_year,
            self.units.epoch_month,
            self.units.epoch_day,
        )?;
        let new_epoch = self.calendar.day_number(
            new_units.epoch_year,
            new_units.epoch_month,
            new_units.epoch_day,
        )?;

        let shift = (old_epoch - new_epoch) as f64 * SECONDS_PER_DAY + self.units.epoch_seconds
            - new_units.epoch_seconds;

        let offsets = self
            .offsets
            .iter()
            .map(|&offset| (offset * self.units.step.seconds() + shift) / new_units.step.seconds())
            .collect();

        Ok(TimeAxis::new(offsets, new_units, self.calendar))
    }

    /// Keep only the time steps at `indices`, in order.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> TimeAxis {
        let offsets = indices.iter().map(|&i| self.offsets[i]).collect();
        TimeAxis::new(offsets, self.units, self.calendar)
    }
}

/// `days` as an integer day count, if it fits in `i64`.
fn whole_days(days: f64) -> Option<i64> {
    // i64::MIN and 2^63 are exact in f64
    (days >= i64::MIN as f64 && days < i64::MAX as f64).then_some(days as i64)
}

/// Calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    #[must_use]
    pub fn from_number(number: u32) -> Option<Month> {
        number
            .checked_sub(1)
            .and_then(|idx| Self::ALL.get(idx as usize).copied())
    }

    #[must_use]
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }

    /// Three-letter abbreviation, e.g. `Jan`
    #[must_use]
    pub fn abbreviation(self) -> &'static str {
        &self.name()[..3]
    }

    #[must_use]
    pub fn season(self) -> Season {
        match self {
            Month::December | Month::January | Month::February => Season::Djf,
            Month::March | Month::April | Month::May => Season::Mam,
            Month::June | Month::July | Month::August => Season::Jja,
            Month::September | Month::October | Month::November => Season::Son,
        }
    }
}

impl FromStr for Month {
    type Err = ClimError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| {
                m.name().eq_ignore_ascii_case(&wanted) || m.abbreviation().eq_ignore_ascii_case(&wanted)
            })
            .ok_or_else(|| ClimError::InputValidation(format!("unrecognised month '{s}'")))
    }
}

/// Three-month meteorological season
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    Djf,
    Mam,
    Jja,
    Son,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Djf, Season::Mam, Season::Jja, Season::Son];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Season::Djf => "DJF",
            Season::Mam => "MAM",
            Season::Jja => "JJA",
            Season::Son => "SON",
        }
    }
}

impl FromStr for Season {
    type Err = ClimError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|season| season.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ClimError::InputValidation(format!("unrecognised season '{s}'")))
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which time steps contribute to a climatology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSelector {
    Month(Month),
    Season(Season),
    /// Every time step (annual climatology)
    All,
}

impl TimeSelector {
    #[must_use]
    pub fn matches(&self, stamp: &TimeStamp) -> bool {
        match self {
            TimeSelector::Month(month) => stamp.month() == *month,
            TimeSelector::Season(season) => stamp.month().season() == *season,
            TimeSelector::All => true,
        }
    }

    /// Short label used in titles and attributes
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            TimeSelector::Month(month) => month.abbreviation(),
            TimeSelector::Season(season) => season.label(),
            TimeSelector::All => "annual",
        }
    }
}

impl FromStr for TimeSelector {
    type Err = ClimError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") || trimmed.eq_ignore_ascii_case("annual") {
            return Ok(TimeSelector::All);
        }
        if let Ok(season) = trimmed.parse::<Season>() {
            return Ok(TimeSelector::Season(season));
        }
        if let Ok(month) = trimmed.parse::<Month>() {
            return Ok(TimeSelector::Month(month));
        }
        Err(ClimError::InputValidation(format!(
            "unrecognised time selector '{s}' (expected a month name, DJF, MAM, JJA, SON or 'all')"
        )))
    }
}

impl fmt::Display for TimeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(offsets: Vec<f64>, units: &str, calendar: Calendar) -> TimeAxis {
        TimeAxis::new(offsets, units.parse().unwrap(), calendar)
    }

    #[test]
    fn test_parse_time_units() {
        let units: TimeUnits = "days since 2001-01-01 00:00:00".parse().unwrap();
        assert_eq!(units.step, TimeStep::Days);
        assert_eq!(
            (units.epoch_year, units.epoch_month, units.epoch_day),
            (2001, 1, 1)
        );
        assert_eq!(units.epoch_seconds, 0.0);

        let units: TimeUnits = "hours since 1850-1-1T06:30:00Z".parse().unwrap();
        assert_eq!(units.step, TimeStep::Hours);
        assert_eq!(units.epoch_seconds, 6.0 * 3_600.0 + 30.0 * 60.0);
        assert_eq!(units.to_string(), "hours since 1850-01-01 06:30:00");

        assert!("days after 2001-01-01".parse::<TimeUnits>().is_err());
        assert!("months since 2001-01-01".parse::<TimeUnits>().is_err());
    }

    #[test]
    fn test_standard_calendar_dates() {
        let axis = axis(vec![0.0, 31.0, 59.5, 365.0], "days since 2001-01-01", Calendar::Standard);
        let dates = axis.dates().unwrap();
        assert_eq!((dates[0].year, dates[0].month, dates[0].day), (2001, 1, 1));
        assert_eq!((dates[1].year, dates[1].month, dates[1].day), (2001, 2, 1));
        assert_eq!((dates[2].year, dates[2].month, dates[2].day), (2001, 3, 1));
        assert_eq!(dates[2].seconds, 43_200.0);
        assert_eq!((dates[3].year, dates[3].month, dates[3].day), (2002, 1, 1));
    }

    #[test]
    fn test_noleap_and_360_day_calendars() {
        // 2000 is a leap year in the Gregorian calendar but not in noleap
        let noleap = axis(vec![59.0], "days since 2000-01-01", Calendar::NoLeap);
        let date = noleap.dates().unwrap()[0];
        assert_eq!((date.year, date.month, date.day), (2000, 3, 1));

        let day360 = axis(vec![30.0, 359.0, 360.0], "days since 2000-01-01", Calendar::Day360);
        let dates = day360.dates().unwrap();
        assert_eq!((dates[0].month, dates[0].day), (2, 1));
        assert_eq!((dates[1].year, dates[1].month, dates[1].day), (2000, 12, 30));
        assert_eq!((dates[2].year, dates[2].month, dates[2].day), (2001, 1, 1));

        // February 30th exists only in the 360-day calendar
        assert!("days since 2000-02-30".parse::<TimeUnits>().is_ok());
        assert!(axis(vec![0.0], "days since 2000-02-30", Calendar::Standard)
            .dates()
            .is_err());
        assert!(axis(vec![0.0], "days since 2000-02-30", Calendar::Day360)
            .dates()
            .is_ok());
    }

    #[test]
    fn test_out_of_range_offsets_are_rejected() {
        for calendar in [Calendar::Standard, Calendar::NoLeap, Calendar::Day360] {
            let huge = axis(vec![15.0, 1.0e300], "days since 2001-01-01", calendar);
            assert!(matches!(
                huge.dates(),
                Err(ClimError::PreconditionViolation(_))
            ));

            let negative = axis(vec![-1.0e18], "days since 2001-01-01", calendar);
            assert!(matches!(
                negative.dates(),
                Err(ClimError::PreconditionViolation(_))
            ));
        }
    }

    #[test]
    fn test_convert_units_preserves_dates() {
        let original = axis(
            vec![15.5, 45.0, 74.5, 400.25],
            "days since 2001-01-01 00:00:00",
            Calendar::NoLeap,
        );
        let converted = original
            .convert_units("hours since 1999-06-01 12:00:00".parse().unwrap())
            .unwrap();

        assert_eq!(converted.units().step, TimeStep::Hours);
        assert_eq!(original.dates().unwrap(), converted.dates().unwrap());
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!(
            "jan".parse::<TimeSelector>().unwrap(),
            TimeSelector::Month(Month::January)
        );
        assert_eq!(
            "September".parse::<TimeSelector>().unwrap(),
            TimeSelector::Month(Month::September)
        );
        assert_eq!(
            "djf".parse::<TimeSelector>().unwrap(),
            TimeSelector::Season(Season::Djf)
        );
        assert_eq!("ALL".parse::<TimeSelector>().unwrap(), TimeSelector::All);

        let err = "winter".parse::<TimeSelector>().unwrap_err();
        assert!(matches!(err, ClimError::InputValidation(_)));
    }

    #[test]
    fn test_selector_matching() {
        let december = TimeStamp {
            year: 2001,
            month: 12,
            day: 16,
            seconds: 0.0,
        };
        assert!(TimeSelector::Season(Season::Djf).matches(&december));
        assert!(!TimeSelector::Season(Season::Jja).matches(&december));
        assert!(TimeSelector::Month(Month::December).matches(&december));
        assert!(TimeSelector::All.matches(&december));
        assert_eq!(Month::December.abbreviation(), "Dec");
    }
}
