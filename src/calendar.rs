use std::collections::BTreeMap;
use std::future::Future;

use time::Date;

use crate::leave::{LeaveCategory, LeaveEntry};

/// Raw leave seconds per date and category.
pub type DayReport = BTreeMap<Date, BTreeMap<LeaveCategory, u64>>;

/// Consumer-provided source of recorded leave, e.g. an exported calendar.
///
/// # Example
///
/// ```rust,ignore
/// impl CalendarSource for ExchangeCalendar {
///     async fn per_day_report(
///         &self,
///         start: Date,
///         end: Option<Date>,
///     ) -> Result<DayReport, Box<dyn std::error::Error + Send + Sync>> {
///         let events = self.client.events_between(start, end).await?;
///         Ok(group_by_day(events))
///     }
/// }
/// ```
pub trait CalendarSource: Send + Sync {
    /// Leave recorded from `start` through `end` inclusive, or through today when `end` is `None`.
    fn per_day_report(
        &self,
        start: Date,
        end: Option<Date>,
    ) -> impl Future<Output = Result<DayReport, Box<dyn std::error::Error + Send + Sync>>> + Send;
}

/// Entries held in memory.
impl CalendarSource for Vec<LeaveEntry> {
    async fn per_day_report(
        &self,
        start: Date,
        end: Option<Date>,
    ) -> Result<DayReport, Box<dyn std::error::Error + Send + Sync>> {
        let mut report = DayReport::new();
        for entry in self
            .iter()
            .filter(|e| e.date >= start && end.is_none_or(|end| e.date <= end))
        {
            let day = report.entry(entry.date).or_default();
            for (&category, &secs) in &entry.seconds {
                *day.entry(category).or_default() += secs;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[tokio::test]
    async fn in_memory_report_is_bounded_and_merged() {
        let entries = vec![
            LeaveEntry::new(date!(2024 - 03 - 15)).with(LeaveCategory::Sick, 28_800),
            LeaveEntry::new(date!(2024 - 03 - 18)).with(LeaveCategory::Sick, 3_600),
            LeaveEntry::new(date!(2024 - 03 - 18)).with(LeaveCategory::Sick, 3_600),
            LeaveEntry::new(date!(2024 - 04 - 16)).with(LeaveCategory::Vacation, 28_800),
        ];
        let report = entries
            .per_day_report(date!(2024 - 03 - 16), Some(date!(2024 - 04 - 15)))
            .await
            .unwrap();

        assert_eq!(report.len(), 1);
        assert_eq!(report[&date!(2024 - 03 - 18)][&LeaveCategory::Sick], 7_200);
    }

    #[tokio::test]
    async fn open_ended_report() {
        let entries = vec![LeaveEntry::new(date!(2030 - 01 - 02)).with(LeaveCategory::JuryDuty, 60)];
        let report = entries.per_day_report(date!(2029 - 12 - 16), None).await.unwrap();
        assert_eq!(report.len(), 1);
    }
}
