use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::Error;
use crate::quantize::{self, Quantity};

/// Leave categories understood by the entry form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeaveCategory {
    Vacation,
    Sick,
    FloatingHoliday,
    Bereavement,
    JuryDuty,
    MilitaryLeave,
}

impl LeaveCategory {
    pub const ALL: [Self; 6] = [
        Self::Vacation,
        Self::Sick,
        Self::FloatingHoliday,
        Self::Bereavement,
        Self::JuryDuty,
        Self::MilitaryLeave,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vacation => "VACATION",
            Self::Sick => "SICK",
            Self::FloatingHoliday => "FLOATINGHOLIDAY",
            Self::Bereavement => "BEREAVEMENT",
            Self::JuryDuty => "JURYDUTY",
            Self::MilitaryLeave => "MILITARYLEAVE",
        }
    }

    /// Value of the entry form's `type` control.
    #[must_use]
    pub fn type_code(self) -> &'static str {
        match self {
            Self::Vacation => "0",
            Self::Sick => "1",
            Self::FloatingHoliday => "2",
            Self::Bereavement => "3",
            Self::JuryDuty => "4",
            Self::MilitaryLeave => "5",
        }
    }

    /// Name of this category's own input on the per-category entry form.
    #[must_use]
    pub fn field_name(self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    /// Round `seconds` into this category's unit.
    #[must_use]
    pub fn quantize(self, seconds: u64) -> Quantity {
        match self {
            Self::Vacation | Self::Sick => {
                Quantity::HalfDays(quantize::to_half_day_steps(seconds))
            }
            Self::FloatingHoliday => Quantity::FullDay(quantize::to_full_day_flag(seconds)),
            Self::Bereavement | Self::JuryDuty | Self::MilitaryLeave => {
                Quantity::Hours(quantize::to_hour_count(seconds))
            }
        }
    }
}

impl fmt::Display for LeaveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaveCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Malformed(format!("unknown leave category {s:?}")))
    }
}

/// Raw leave time recorded for one date, by category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveEntry {
    pub date: Date,
    pub seconds: BTreeMap<LeaveCategory, u64>,
}

impl LeaveEntry {
    #[must_use]
    pub fn new(date: Date) -> Self {
        Self {
            date,
            seconds: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, category: LeaveCategory, seconds: u64) -> Self {
        *self.seconds.entry(category).or_default() += seconds;
        self
    }

    /// Non-zero quantized amounts, in category order.
    #[must_use]
    pub fn quantized(&self) -> Vec<(LeaveCategory, Quantity)> {
        self.seconds
            .iter()
            .map(|(&category, &secs)| (category, category.quantize(secs)))
            .filter(|(_, quantity)| !quantity.is_zero())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::quantize::HalfDaySteps;

    #[test]
    fn parses_category_names() {
        assert_eq!("SICK".parse::<LeaveCategory>().unwrap(), LeaveCategory::Sick);
        assert_eq!(
            "floatingholiday".parse::<LeaveCategory>().unwrap(),
            LeaveCategory::FloatingHoliday
        );
        assert!("HOLIDAY".parse::<LeaveCategory>().is_err());
    }

    #[test]
    fn serde_uses_upper_case_names() {
        let json = serde_json::to_string(&LeaveCategory::FloatingHoliday).unwrap();
        assert_eq!(json, "\"FLOATINGHOLIDAY\"");
        let parsed: LeaveCategory = serde_json::from_str("\"JURYDUTY\"").unwrap();
        assert_eq!(parsed, LeaveCategory::JuryDuty);
    }

    #[test]
    fn type_codes_and_field_names() {
        assert_eq!(LeaveCategory::Vacation.type_code(), "0");
        assert_eq!(LeaveCategory::Sick.type_code(), "1");
        assert_eq!(LeaveCategory::FloatingHoliday.type_code(), "2");
        assert_eq!(LeaveCategory::MilitaryLeave.field_name(), "militaryleave");
    }

    #[test]
    fn quantization_rule_per_category() {
        assert_eq!(
            LeaveCategory::Sick.quantize(3_600),
            Quantity::HalfDays(HalfDaySteps::Zero)
        );
        assert_eq!(LeaveCategory::FloatingHoliday.quantize(60), Quantity::FullDay(true));
        assert_eq!(LeaveCategory::JuryDuty.quantize(36_000), Quantity::Hours(8));
    }

    #[test]
    fn quantized_drops_zero_amounts() {
        let entry = LeaveEntry::new(date!(2024 - 03 - 18))
            .with(LeaveCategory::Sick, 3_600)
            .with(LeaveCategory::Vacation, 28_800);
        assert_eq!(
            entry.quantized(),
            vec![(LeaveCategory::Vacation, Quantity::HalfDays(HalfDaySteps::Full))]
        );
    }
}
