//! Durable cookie jar for the leave-site session.
//!
//! The jar is the session's only server-side identity: after a successful
//! login the federation and application cookies land here and are written to
//! disk, so the next process run starts authenticated.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::error::Error;

/// One cookie as persisted in the jar file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    /// Set when the server sent no `Domain` attribute: only the exact host matches.
    #[serde(default)]
    pub host_only: bool,
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires: Option<OffsetDateTime>,
}

impl StoredCookie {
    /// Parse a `Set-Cookie` header value received from `url`.
    ///
    /// Returns `None` for unparsable headers and for cookies whose `Domain`
    /// does not cover the responding host.
    #[must_use]
    pub fn from_set_cookie(raw: &str, url: &Url) -> Option<Self> {
        let parsed = cookie::Cookie::parse(raw.to_owned()).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();

        let (domain, host_only) = match parsed.domain() {
            Some(d) => {
                let d = d.trim_start_matches('.').to_ascii_lowercase();
                if !domain_matches(&host, &d) {
                    return None;
                }
                (d, false)
            }
            None => (host, true),
        };

        let path = parsed
            .path()
            .filter(|p| p.starts_with('/'))
            .map_or_else(|| default_path(url), str::to_owned);

        // A Max-Age beyond the representable range never expires
        let expires = match parsed.max_age() {
            Some(age) => OffsetDateTime::now_utc().checked_add(age),
            None => parsed.expires_datetime(),
        };

        Some(Self {
            name: parsed.name().to_owned(),
            value: parsed.value().to_owned(),
            domain,
            host_only,
            path,
            secure: parsed.secure().unwrap_or(false),
            expires,
        })
    }

    fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn same_slot(&self, other: &Self) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn applies_to(&self, url: &Url, host: &str) -> bool {
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(host, &self.domain)
        };
        domain_ok && path_matches(url.path(), &self.path) && (!self.secure || url.scheme() == "https")
    }
}

/// Cookie store shared with `reqwest`, optionally backed by a JSON file.
#[derive(Debug)]
pub struct CookieJar {
    path: Option<PathBuf>,
    cookies: Mutex<Vec<StoredCookie>>,
}

impl CookieJar {
    /// A jar that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cookies: Mutex::new(Vec::new()),
        }
    }

    /// Load the jar at `path`, creating an empty one if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CookieStore`] if the file cannot be read, parsed or created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();

        let cookies = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::CookieStore(format!("failed to read {}: {e}", path.display())))?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    Error::CookieStore(format!("failed to parse {}: {e}", path.display()))
                })?
            }
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::CookieStore(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
            write_file(&path, &[])?;
            Vec::new()
        };

        tracing::debug!(path = %path.display(), count = cookies.len(), "Cookie jar loaded");

        Ok(Self {
            path: Some(path),
            cookies: Mutex::new(cookies),
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Value of the named cookie stored for `domain`, if any.
    #[must_use]
    pub fn get(&self, domain: &str, name: &str) -> Option<String> {
        self.lock()
            .iter()
            .find(|c| c.domain.eq_ignore_ascii_case(domain) && c.name == name)
            .map(|c| c.value.clone())
    }

    /// Insert or replace cookies and persist the jar.
    ///
    /// A cookie that is already expired removes its stored counterpart.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CookieStore`] if the jar file cannot be written.
    pub fn store(&self, incoming: impl IntoIterator<Item = StoredCookie>) -> Result<(), Error> {
        let now = OffsetDateTime::now_utc();
        let mut cookies = self.lock();
        for cookie in incoming {
            cookies.retain(|c| !c.same_slot(&cookie));
            if !cookie.is_expired(now) {
                cookies.push(cookie);
            }
        }
        match &self.path {
            Some(path) => write_file(path, &cookies),
            None => Ok(()),
        }
    }

    /// `Cookie` header value for a request to `url`.
    #[must_use]
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?.to_ascii_lowercase();
        let now = OffsetDateTime::now_utc();

        let cookies = self.lock();
        let mut matching: Vec<&StoredCookie> = cookies
            .iter()
            .filter(|c| !c.is_expired(now) && c.applies_to(url, &host))
            .collect();
        if matching.is_empty() {
            return None;
        }
        // More specific paths first
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        Some(
            matching
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredCookie>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let incoming: Vec<StoredCookie> = cookie_headers
            .filter_map(|h| h.to_str().ok())
            .filter_map(|raw| StoredCookie::from_set_cookie(raw, url))
            .collect();
        if incoming.is_empty() {
            return;
        }
        if let Err(e) = self.store(incoming) {
            tracing::warn!(error = %e, "Cookie jar could not be persisted");
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_for(url)
            .and_then(|header| HeaderValue::from_str(&header).ok())
    }
}

fn write_file(path: &Path, cookies: &[StoredCookie]) -> Result<(), Error> {
    let content = serde_json::to_string_pretty(cookies)
        .map_err(|e| Error::CookieStore(format!("failed to serialize cookies: {e}")))?;
    std::fs::write(path, content)
        .map_err(|e| Error::CookieStore(format!("failed to write {}: {e}", path.display())))
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/')))
}

fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => path[..idx].to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::cookie::CookieStore;

    use super::*;

    fn url(s: &str) -> Url {
        s.parse().unwrap()
    }

    #[test]
    fn host_only_cookie_matches_exact_host() {
        let jar = CookieJar::in_memory();
        let origin = url("https://my.engr.illinois.edu/vacation/index.asp");
        let cookie = StoredCookie::from_set_cookie("ASPSESSION=abc; path=/", &origin).unwrap();
        assert!(cookie.host_only);
        jar.store([cookie]).unwrap();

        assert_eq!(
            jar.header_for(&url("https://my.engr.illinois.edu/vacation/setdate.asp")),
            Some("ASPSESSION=abc".into())
        );
        assert_eq!(jar.header_for(&url("https://sub.my.engr.illinois.edu/")), None);
    }

    #[test]
    fn domain_cookie_matches_subdomains() {
        let origin = url("https://shibboleth.illinois.edu/idp/profile");
        let cookie =
            StoredCookie::from_set_cookie("shib_idp_session=s1; Domain=.illinois.edu; Path=/", &origin)
                .unwrap();
        assert_eq!(cookie.domain, "illinois.edu");

        let jar = CookieJar::in_memory();
        jar.store([cookie]).unwrap();
        assert!(jar.header_for(&url("https://my.engr.illinois.edu/")).is_some());
        assert!(jar.header_for(&url("https://notillinois.edu/")).is_none());
    }

    #[test]
    fn foreign_domain_is_rejected() {
        let origin = url("https://my.engr.illinois.edu/");
        assert!(StoredCookie::from_set_cookie("x=1; Domain=example.com", &origin).is_none());
    }

    #[test]
    fn default_path_is_directory_of_request() {
        let origin = url("https://host.test/vacation/index.asp");
        let cookie = StoredCookie::from_set_cookie("a=1", &origin).unwrap();
        assert_eq!(cookie.path, "/vacation");

        let jar = CookieJar::in_memory();
        jar.store([cookie]).unwrap();
        assert!(jar.header_for(&url("https://host.test/vacation/setdate.asp")).is_some());
        assert!(jar.header_for(&url("https://host.test/vacationx")).is_none());
        assert!(jar.header_for(&url("https://host.test/")).is_none());
    }

    #[test]
    fn secure_cookie_not_sent_over_http() {
        let origin = url("https://host.test/");
        let cookie = StoredCookie::from_set_cookie("s=1; Secure; Path=/", &origin).unwrap();
        let jar = CookieJar::in_memory();
        jar.store([cookie]).unwrap();
        assert!(jar.header_for(&url("http://host.test/")).is_none());
        assert!(jar.header_for(&url("https://host.test/")).is_some());
    }

    #[test]
    fn max_age_zero_removes_cookie() {
        let origin = url("https://host.test/");
        let jar = CookieJar::in_memory();
        jar.store([StoredCookie::from_set_cookie("s=1; Path=/", &origin).unwrap()])
            .unwrap();
        assert_eq!(jar.len(), 1);

        jar.store([StoredCookie::from_set_cookie("s=; Path=/; Max-Age=0", &origin).unwrap()])
            .unwrap();
        assert!(jar.is_empty());
    }

    #[test]
    fn oversized_max_age_never_expires() {
        let origin = url("https://host.test/");
        let cookie =
            StoredCookie::from_set_cookie("s=1; Path=/; Max-Age=99999999999999", &origin).unwrap();
        assert_eq!(cookie.expires, None);

        let jar = CookieJar::in_memory();
        jar.store([cookie]).unwrap();
        assert_eq!(jar.header_for(&url("https://host.test/")), Some("s=1".into()));
    }

    #[test]
    fn replacing_cookie_keeps_one_slot() {
        let origin = url("https://host.test/");
        let jar = CookieJar::in_memory();
        jar.store([StoredCookie::from_set_cookie("s=1; Path=/", &origin).unwrap()])
            .unwrap();
        jar.store([StoredCookie::from_set_cookie("s=2; Path=/", &origin).unwrap()])
            .unwrap();
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get("host.test", "s"), Some("2".into()));
    }

    #[test]
    fn jar_file_is_created_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cookiefile");

        let jar = CookieJar::open(&path).unwrap();
        assert!(path.exists());
        assert!(jar.is_empty());

        let origin = url("https://host.test/");
        let headers = [HeaderValue::from_static("session=ok; Path=/")];
        jar.set_cookies(&mut headers.iter(), &origin);
        drop(jar);

        let reloaded = CookieJar::open(&path).unwrap();
        assert_eq!(reloaded.get("host.test", "session"), Some("ok".into()));
        assert_eq!(
            reloaded.cookies(&origin).unwrap().to_str().unwrap(),
            "session=ok"
        );
    }

    #[test]
    fn corrupt_jar_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookiefile");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(CookieJar::open(&path), Err(Error::CookieStore(_))));
    }
}
