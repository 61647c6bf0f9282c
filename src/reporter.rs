//! Leave submission and supervisor approval flows over an authenticated [`Session`].

use std::collections::BTreeMap;
use std::fmt;

use time::Date;

use crate::calendar::CalendarSource;
use crate::config::ReporterConfig;
use crate::cycle::{OverdueStatus, ReportingCycle};
use crate::document::Document;
use crate::error::Error;
use crate::extract;
use crate::leave::{LeaveCategory, LeaveEntry};
use crate::quantize::Quantity;
use crate::session::Session;
use crate::types::{ApprovalKey, EmployeeId};

/// Page text marking a date that must not be submitted.
pub const REJECTION_PHRASES: [&str; 3] = ["is on a weekend", "already submitted", "already finalized"];

const ENTRY_FORM: &str = "frmEntry";
const TYPE_FIELD: &str = "type";
const UNITS_FIELD: &str = "units";

/// Why a date was not submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The entry page carried one of [`REJECTION_PHRASES`].
    Rejected { phrase: &'static str },
    /// Every category rounded to nothing.
    ZeroValue,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { phrase } => write!(f, "date {phrase}"),
            Self::ZeroValue => f.write_str("reported time rounds to zero"),
        }
    }
}

/// Outcome for one date. `Skipped` is a normal result, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Submitted(Vec<(LeaveCategory, Quantity)>),
    Skipped(SkipReason),
}

impl Submission {
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// Only fetch and return the calendar entries.
    #[default]
    List,
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    NoOverdueCycles,
    Listed {
        cycle: ReportingCycle,
        entries: Vec<LeaveEntry>,
    },
    Submitted {
        cycle: ReportingCycle,
        results: Vec<(Date, Submission)>,
    },
}

/// Shape of the entry form on a date page.
enum EntryLayout {
    /// One input per category, all submitted together.
    PerCategory,
    /// A `type` selector and a `units` input, one category per submission.
    TypeUnits,
}

/// Leave reporter for one user.
pub struct Reporter {
    session: Session,
    config: ReporterConfig,
}

impl Reporter {
    /// # Errors
    ///
    /// See [`Session::new`].
    pub fn new(config: ReporterConfig) -> Result<Self, Error> {
        Ok(Self {
            session: Session::new(&config)?,
            config,
        })
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The earliest unsigned cycle listed on the leave index.
    ///
    /// # Errors
    ///
    /// Navigation and authentication errors. A missing period is
    /// [`OverdueStatus::NoOverdueCycles`], not an error.
    pub async fn overdue_cycle(&mut self) -> Result<OverdueStatus, Error> {
        let doc = self.session.get(self.config.index_url()?).await?;
        match extract::reporting_period(doc)? {
            Some((start, end)) => {
                let cycle = ReportingCycle::from_bounds(start, end)?;
                tracing::debug!(cycle = %cycle, "Overdue reporting cycle");
                Ok(OverdueStatus::Due(cycle))
            }
            None => Ok(OverdueStatus::NoOverdueCycles),
        }
    }

    /// The overdue cycle, or the one containing `today`.
    ///
    /// # Errors
    ///
    /// As [`overdue_cycle`](Self::overdue_cycle).
    pub async fn reporting_cycle(&mut self, today: Date) -> Result<ReportingCycle, Error> {
        Ok(self.overdue_cycle().await?.cycle_or_current(today))
    }

    /// Submit `seconds` of `category` leave for `date`.
    ///
    /// # Errors
    ///
    /// As [`submit_entry`](Self::submit_entry).
    pub async fn submit(
        &mut self,
        date: Date,
        category: LeaveCategory,
        seconds: u64,
    ) -> Result<Submission, Error> {
        self.submit_entry(&LeaveEntry::new(date).with(category, seconds))
            .await
    }

    /// Submit every non-zero category of `entry`.
    ///
    /// # Errors
    ///
    /// Navigation and authentication errors, or [`Error::NotFound`] if the
    /// date page has no usable entry form. These are fatal for the date.
    pub async fn submit_entry(&mut self, entry: &LeaveEntry) -> Result<Submission, Error> {
        let date = entry.date;
        let url = self.config.entry_url(date)?;
        let doc = self.session.get(url.clone()).await?;

        if let Some(phrase) = rejection(doc) {
            let reason = SkipReason::Rejected { phrase };
            tracing::warn!(%date, reason = %reason, "Skipping date");
            return Ok(Submission::Skipped(reason));
        }

        let quantized = entry.quantized();
        if quantized.is_empty() {
            tracing::info!(%date, "Skipping date, reported time rounds to zero");
            return Ok(Submission::Skipped(SkipReason::ZeroValue));
        }

        match entry_layout(doc, &quantized)? {
            EntryLayout::PerCategory => {
                let values: Vec<(String, String)> = quantized
                    .iter()
                    .map(|(category, quantity)| (category.field_name(), quantity.to_string()))
                    .collect();
                let overrides: Vec<(&str, &str)> = values
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str()))
                    .collect();
                tracing::debug!(%date, fields = ?values, "Submitting per-category entry");
                self.session.submit_form(Some(ENTRY_FORM), &overrides).await?;
                tracing::info!(%date, "Date submitted");
                Ok(Submission::Submitted(quantized))
            }
            EntryLayout::TypeUnits => {
                let mut submitted = Vec::with_capacity(quantized.len());
                for (index, (category, quantity)) in quantized.into_iter().enumerate() {
                    if index > 0 {
                        let doc = self.session.get(url.clone()).await?;
                        if let Some(phrase) = rejection(doc) {
                            tracing::warn!(%date, %category, phrase, "Date closed mid-submission");
                            break;
                        }
                    }
                    let units = quantity.to_string();
                    tracing::debug!(%date, %category, type_code = category.type_code(), units = %units, "Submitting entry");
                    self.session
                        .submit_form(
                            Some(ENTRY_FORM),
                            &[(TYPE_FIELD, category.type_code()), (UNITS_FIELD, units.as_str())],
                        )
                        .await?;
                    submitted.push((category, quantity));
                }
                tracing::info!(%date, categories = submitted.len(), "Date submitted");
                Ok(Submission::Submitted(submitted))
            }
        }
    }

    /// Fetch the overdue cycle's calendar entries and list or submit them.
    ///
    /// Skipped dates are logged and processing continues.
    ///
    /// # Errors
    ///
    /// [`Error::Calendar`] if the source fails, or the first fatal submission error.
    pub async fn report_overdue(
        &mut self,
        calendar: &impl CalendarSource,
        mode: ReportMode,
    ) -> Result<ReportOutcome, Error> {
        let OverdueStatus::Due(cycle) = self.overdue_cycle().await? else {
            tracing::info!("No overdue reporting cycles");
            return Ok(ReportOutcome::NoOverdueCycles);
        };

        let entries: Vec<LeaveEntry> = calendar
            .per_day_report(cycle.start(), Some(cycle.end()))
            .await
            .map_err(|e| Error::Calendar(e.to_string()))?
            .into_iter()
            .map(|(date, seconds)| LeaveEntry { date, seconds })
            .collect();
        tracing::info!(cycle = %cycle, days = entries.len(), "Calendar entries loaded");

        match mode {
            ReportMode::List => Ok(ReportOutcome::Listed { cycle, entries }),
            ReportMode::Submit => {
                let mut results = Vec::with_capacity(entries.len());
                for entry in &entries {
                    let outcome = self.submit_entry(entry).await?;
                    results.push((entry.date, outcome));
                }
                Ok(ReportOutcome::Submitted { cycle, results })
            }
        }
    }

    /// Entries awaiting this supervisor's approval, grouped by employee.
    ///
    /// # Errors
    ///
    /// Navigation and authentication errors, or [`Error::Malformed`] for an unresolvable link.
    pub async fn pending_approvals(
        &mut self,
    ) -> Result<BTreeMap<EmployeeId, Vec<ApprovalKey>>, Error> {
        let doc = self.session.get(self.config.approvals_url()?).await?;
        let mut pending: BTreeMap<EmployeeId, Vec<ApprovalKey>> = BTreeMap::new();
        for link in extract::pending_links(doc)? {
            pending.entry(link.employee).or_default().push(link.key);
        }
        tracing::debug!(employees = pending.len(), "Pending approvals listed");
        Ok(pending)
    }

    /// Approve one pending entry, confirming if the site asks.
    ///
    /// `employee` and `key` are the decoded values from
    /// [`pending_approvals`](Self::pending_approvals); they are encoded once here.
    ///
    /// # Errors
    ///
    /// Navigation and authentication errors.
    pub async fn approve_pending(
        &mut self,
        employee: &EmployeeId,
        key: &ApprovalKey,
    ) -> Result<(), Error> {
        let mut url = self.config.approvals_url()?.join("approve.asp")?;
        url.query_pairs_mut()
            .append_pair("uid", &employee.0)
            .append_pair("key", &key.0);

        let doc = self.session.get(url).await?;
        if !doc.forms().is_empty() {
            self.session.submit_form(None, &[]).await?;
        }
        tracing::info!(%employee, %key, "Entry approved");
        Ok(())
    }
}

fn rejection(doc: &Document) -> Option<&'static str> {
    REJECTION_PHRASES
        .into_iter()
        .find(|phrase| doc.contains_text(phrase))
}

fn entry_layout(doc: &Document, quantized: &[(LeaveCategory, Quantity)]) -> Result<EntryLayout, Error> {
    let form = doc
        .form_named(ENTRY_FORM)
        .ok_or_else(|| Error::NotFound(format!("form {ENTRY_FORM}")))?;

    if quantized
        .iter()
        .all(|(category, _)| form.has_field(&category.field_name()))
    {
        Ok(EntryLayout::PerCategory)
    } else if form.has_field(TYPE_FIELD) && form.has_field(UNITS_FIELD) {
        Ok(EntryLayout::TypeUnits)
    } else {
        Err(Error::NotFound(format!(
            "{ENTRY_FORM} inputs for {}",
            quantized
                .iter()
                .map(|(category, _)| category.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::HalfDaySteps;

    fn page(body: &str) -> Document {
        Document::parse(
            "https://my.engr.illinois.edu/vacation/setdate.asp?3/18/2024"
                .parse()
                .unwrap(),
            200,
            body.to_owned(),
        )
    }

    #[test]
    fn detects_rejection_phrases() {
        let doc = page("<p>3/16/2024 is on a weekend</p>");
        assert_eq!(rejection(&doc), Some("is on a weekend"));
        let doc = page("<p>You have already finalized leave submission</p>");
        assert_eq!(rejection(&doc), Some("already finalized"));
        assert_eq!(rejection(&page("<form name=frmEntry></form>")), None);
    }

    #[test]
    fn layout_prefers_per_category_inputs() {
        let doc = page(
            r#"<form name="frmEntry" method="post" action="setdate.asp">
                 <input name="vacation"><input name="sick">
                 <input name="type"><input name="units">
               </form>"#,
        );
        let quantized = [(LeaveCategory::Sick, Quantity::HalfDays(HalfDaySteps::Half))];
        assert!(matches!(entry_layout(&doc, &quantized), Ok(EntryLayout::PerCategory)));

        let quantized = [(LeaveCategory::JuryDuty, Quantity::Hours(3))];
        assert!(matches!(entry_layout(&doc, &quantized), Ok(EntryLayout::TypeUnits)));
    }

    #[test]
    fn layout_without_inputs_is_not_found() {
        let doc = page(r#"<form name="frmEntry"><input name="comment"></form>"#);
        let quantized = [(LeaveCategory::Vacation, Quantity::HalfDays(HalfDaySteps::Full))];
        assert!(matches!(entry_layout(&doc, &quantized), Err(Error::NotFound(_))));
        assert!(matches!(
            entry_layout(&page("<p>no form</p>"), &quantized),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn skip_reason_messages() {
        assert_eq!(
            SkipReason::Rejected { phrase: "already submitted" }.to_string(),
            "date already submitted"
        );
        assert!(!Submission::Skipped(SkipReason::ZeroValue).is_submitted());
        assert!(Submission::Submitted(vec![]).is_submitted());
    }
}
