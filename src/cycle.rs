//! Reporting cycles: the 16th of one month through the 15th of the next.

use std::fmt;

use time::{Date, Month, PrimitiveDateTime};

use crate::error::Error;

const START_DAY: u8 = 16;
const END_DAY: u8 = 15;

/// First day of the cycle containing `date`.
///
/// Saturates at [`Date::MIN`] when the cycle would begin before the
/// representable range.
#[must_use]
pub fn cycle_start(date: Date) -> Date {
    if date.day() >= START_DAY {
        return date.replace_day(START_DAY).unwrap_or(date);
    }
    let (year, month) = if date.month() == Month::January {
        (date.year() - 1, Month::December)
    } else {
        (date.year(), date.month().previous())
    };
    Date::from_calendar_date(year, month, START_DAY).unwrap_or(Date::MIN)
}

/// Last day of the cycle containing `date`.
///
/// Saturates at [`Date::MAX`] when the cycle would end after the
/// representable range.
#[must_use]
pub fn cycle_end(date: Date) -> Date {
    let start = cycle_start(date);
    let (year, month) = if start.month() == Month::December {
        (start.year() + 1, Month::January)
    } else {
        (start.year(), start.month().next())
    };
    Date::from_calendar_date(year, month, END_DAY).unwrap_or(Date::MAX)
}

/// One reporting cycle. The start is always a 16th and the end the following 15th.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportingCycle {
    start: Date,
    end: Date,
}

impl ReportingCycle {
    #[must_use]
    pub fn containing(date: Date) -> Self {
        Self {
            start: cycle_start(date),
            end: cycle_end(date),
        }
    }

    /// Build a cycle from bounds reported by the site.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] unless `start` is a 16th and `end` is the 15th that closes it.
    pub fn from_bounds(start: Date, end: Date) -> Result<Self, Error> {
        let cycle = Self::containing(start);
        if cycle.start != start || cycle.end != end {
            return Err(Error::Malformed(format!(
                "{start} - {end} is not a reporting cycle"
            )));
        }
        Ok(cycle)
    }

    #[must_use]
    pub fn start(&self) -> Date {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> Date {
        self.end
    }

    #[must_use]
    pub fn start_midnight(&self) -> PrimitiveDateTime {
        self.start.midnight()
    }

    #[must_use]
    pub fn end_midnight(&self) -> PrimitiveDateTime {
        self.end.midnight()
    }

    #[must_use]
    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }

    /// The following cycle, or this one if it already ends at [`Date::MAX`].
    #[must_use]
    pub fn next(&self) -> Self {
        self.end.next_day().map_or(*self, Self::containing)
    }
}

impl fmt::Display for ReportingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// Whether the site lists an unsigned cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverdueStatus {
    Due(ReportingCycle),
    NoOverdueCycles,
}

impl OverdueStatus {
    /// The overdue cycle, or the one containing `today` when nothing is overdue.
    #[must_use]
    pub fn cycle_or_current(self, today: Date) -> ReportingCycle {
        match self {
            Self::Due(cycle) => cycle,
            Self::NoOverdueCycles => ReportingCycle::containing(today),
        }
    }
}
