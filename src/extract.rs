//! Pattern-based recovery of values embedded in rendered pages.
//!
//! The leave site and the identity provider expose no API, so every value the
//! protocol needs is scraped from HTML. All site-specific patterns live here
//! so they can be tested against fixture pages.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use time::{Date, Month};

use crate::document::Document;
use crate::error::Error;
use crate::types::{ApprovalKey, EmployeeId};

const PERIOD_MARKER: &str = "Reporting Period Signature Due";
const TABLE_END: &str = "</table>";

static DATE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([0-9]{1,2})/([0-9]{1,2})/([0-9]{4}) - ([0-9]{1,2})/([0-9]{1,2})/([0-9]{4})\b")
        .expect("static regex")
});
static SIG_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-sig-request="([^"]+)""#).expect("static regex"));
static POST_ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-post-action="([^"]+)""#).expect("static regex"));
static DUO_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-host="([^"]+)""#).expect("static regex"));
static APPROVAL_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="([^"]*approve\.asp\?[^"]*)""#)
        .expect("static regex")
});

/// First match of `pattern` in the document body.
#[must_use]
pub fn find_pattern<'d>(doc: &'d Document, pattern: &Regex) -> Option<Captures<'d>> {
    pattern.captures(doc.body())
}

/// Like [`find_pattern`], for values the caller cannot do without.
///
/// # Errors
///
/// Returns [`Error::NotFound`] naming `what` when there is no match.
pub fn require_pattern<'d>(
    doc: &'d Document,
    pattern: &Regex,
    what: &str,
) -> Result<Captures<'d>, Error> {
    find_pattern(doc, pattern).ok_or_else(|| Error::NotFound(what.to_owned()))
}

/// Every match of a repeating pattern, in document order.
#[must_use]
pub fn find_all<'d>(doc: &'d Document, pattern: &Regex) -> Vec<Captures<'d>> {
    pattern.captures_iter(doc.body()).collect()
}

/// Match `pattern` only between an occurrence of `start` and the next `boundary`.
///
/// Text after the boundary is never matched. Within one bounded segment the
/// last match wins; segments are tried in document order.
#[must_use]
pub fn find_bounded<'t>(
    text: &'t str,
    start: &str,
    boundary: &str,
    pattern: &Regex,
) -> Option<Captures<'t>> {
    let mut rest = text;
    while let Some(pos) = rest.find(start) {
        let after = &rest[pos + start.len()..];
        let segment = match after.find(boundary) {
            Some(end) => &after[..end],
            None => after,
        };
        if let Some(found) = pattern.captures_iter(segment).last() {
            return Some(found);
        }
        rest = after;
    }
    None
}

/// Decode the structured value carried by an inline script starting with `marker`.
///
/// Trailing script text after the value (`);`, further statements) is ignored.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if a marked script exists but its payload
/// does not decode as `T`.
pub fn find_embedded_config<T: DeserializeOwned>(
    doc: &Document,
    marker: &str,
) -> Result<Option<T>, Error> {
    let Some(payload) = doc
        .scripts()
        .iter()
        .find_map(|s| s.trim_start().strip_prefix(marker))
    else {
        return Ok(None);
    };

    let mut de = serde_json::Deserializer::from_str(payload.trim_start());
    let value = T::deserialize(&mut de)
        .map_err(|e| Error::Malformed(format!("embedded config after {marker:?}: {e}")))?;
    Ok(Some(value))
}

/// The overdue reporting period shown on the leave index page.
///
/// `Ok(None)` means the page reports nothing overdue.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if the matched text is not a valid calendar date.
pub fn reporting_period(doc: &Document) -> Result<Option<(Date, Date)>, Error> {
    let Some(found) = find_bounded(doc.body(), PERIOD_MARKER, TABLE_END, &DATE_RANGE) else {
        return Ok(None);
    };
    let start = calendar_date(&found[1], &found[2], &found[3])?;
    let end = calendar_date(&found[4], &found[5], &found[6])?;
    Ok(Some((start, end)))
}

fn calendar_date(month: &str, day: &str, year: &str) -> Result<Date, Error> {
    let malformed = || Error::Malformed(format!("invalid date {month}/{day}/{year}"));
    let month: u8 = month.parse().map_err(|_| malformed())?;
    let day: u8 = day.parse().map_err(|_| malformed())?;
    let year: i32 = year.parse().map_err(|_| malformed())?;
    let month = Month::try_from(month).map_err(|_| malformed())?;
    Date::from_calendar_date(year, month, day).map_err(|_| malformed())
}

/// Raw second-factor parameters found on the identity provider's page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChallengeParts {
    /// `TX|…:APP|…`
    pub sig_request: String,
    pub post_action: String,
    #[serde(default)]
    pub host: Option<String>,
}

/// Locate the second-factor challenge, preferring the iframe data attributes
/// and falling back to an inline config script starting with `marker`.
///
/// # Errors
///
/// Returns [`Error::ChallengeNotFound`] if neither form is present, or
/// [`Error::Malformed`] if the inline config cannot be decoded.
pub fn challenge_parts(doc: &Document, marker: &str) -> Result<ChallengeParts, Error> {
    if let (Some(sig), Some(action)) = (
        find_pattern(doc, &SIG_REQUEST),
        find_pattern(doc, &POST_ACTION),
    ) {
        return Ok(ChallengeParts {
            sig_request: unescape(&sig[1]),
            post_action: unescape(&action[1]),
            host: find_pattern(doc, &DUO_HOST).map(|h| unescape(&h[1])),
        });
    }

    find_embedded_config::<ChallengeParts>(doc, marker)?.ok_or_else(|| {
        Error::ChallengeNotFound(format!(
            "no data-sig-request/data-post-action attributes or {marker:?} script"
        ))
    })
}

/// One pending entry link on the supervisor page, with its query values decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLink {
    pub employee: EmployeeId,
    pub key: ApprovalKey,
}

/// Every `approve.asp?uid=…&key=…` link on the supervisor page.
///
/// Links without both a `uid` and a `key` are skipped.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if a link cannot be resolved against the page URL.
pub fn pending_links(doc: &Document) -> Result<Vec<PendingLink>, Error> {
    let mut links = Vec::new();
    for c in find_all(doc, &APPROVAL_LINK) {
        let url = doc.url().join(&unescape(&c[1]))?;
        let (mut employee, mut key) = (None, None);
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "uid" => employee = Some(EmployeeId(value.into_owned())),
                "key" => key = Some(ApprovalKey(value.into_owned())),
                _ => {}
            }
        }
        if let (Some(employee), Some(key)) = (employee, key) {
            links.push(PendingLink { employee, key });
        }
    }
    Ok(links)
}

fn unescape(attr: &str) -> String {
    attr.replace("&amp;", "&")
}
