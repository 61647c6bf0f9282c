//! Rounding raw elapsed seconds into the units the entry form accepts.

use std::fmt;

const HALF_DAY_MIN_SECS: u64 = 7_200;
const FULL_DAY_MIN_SECS: u64 = 21_600;
const HOUR_SECS: u64 = 3_600;
const MAX_HOURS: u8 = 8;

/// Zero, half or whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HalfDaySteps {
    Zero,
    Half,
    Full,
}

impl HalfDaySteps {
    #[must_use]
    pub fn as_days(self) -> f32 {
        match self {
            Self::Zero => 0.0,
            Self::Half => 0.5,
            Self::Full => 1.0,
        }
    }
}

/// `< 2h` is nothing, `[2h, 6h)` is half a day, `>= 6h` is a whole day.
#[must_use]
pub fn to_half_day_steps(seconds: u64) -> HalfDaySteps {
    if seconds < HALF_DAY_MIN_SECS {
        HalfDaySteps::Zero
    } else if seconds < FULL_DAY_MIN_SECS {
        HalfDaySteps::Half
    } else {
        HalfDaySteps::Full
    }
}

/// Any time at all counts as the whole day.
#[must_use]
pub fn to_full_day_flag(seconds: u64) -> bool {
    seconds > 0
}

/// Whole hours, rounding up past the half hour, capped at a working day.
#[must_use]
pub fn to_hour_count(seconds: u64) -> u8 {
    let hours = seconds / HOUR_SECS + u64::from(seconds % HOUR_SECS > HOUR_SECS / 2);
    u8::try_from(hours.min(u64::from(MAX_HOURS))).unwrap_or(MAX_HOURS)
}

/// A quantized amount in the unit of its leave category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    HalfDays(HalfDaySteps),
    FullDay(bool),
    Hours(u8),
}

impl Quantity {
    /// Nothing to submit.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        matches!(
            self,
            Self::HalfDays(HalfDaySteps::Zero) | Self::FullDay(false) | Self::Hours(0)
        )
    }
}

/// Form value: day counts as `0.5`/`1.0`, hours as an integer.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HalfDays(steps) => write!(f, "{:.1}", steps.as_days()),
            Self::FullDay(true) => f.write_str("1.0"),
            Self::FullDay(false) => f.write_str("0.0"),
            Self::Hours(hours) => write!(f, "{hours}"),
        }
    }
}
