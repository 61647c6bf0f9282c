use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::secret::SecretString;

const DEFAULT_BASE_URL: &str = "https://my.engr.illinois.edu/";
const DEFAULT_DUO_BASE_URL: &str = "https://verify.uillinois.edu/frame/";
const DEFAULT_USER_AGENT: &str = concat!("vsl-reporter/", env!("CARGO_PKG_VERSION"));

/// Login credentials for the federated identity provider.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either value is empty.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<SecretString>,
    ) -> Result<Self, Error> {
        let username = username.into();
        let password = password.into();
        if username.is_empty() {
            return Err(Error::Config("empty username not allowed".into()));
        }
        if password.is_empty() {
            return Err(Error::Config("empty password not allowed".into()));
        }
        Ok(Self { username, password })
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &SecretString {
        &self.password
    }
}

/// How a fetched document is recognised as a login surface.
#[derive(Debug, Clone)]
pub struct LoginIndicators {
    pub path_prefixes: Vec<String>,
    pub hosts: Vec<String>,
}

impl Default for LoginIndicators {
    fn default() -> Self {
        Self {
            path_prefixes: vec!["/login".into()],
            hosts: vec!["shibboleth.illinois.edu".into()],
        }
    }
}

impl LoginIndicators {
    #[must_use]
    pub fn matches(&self, url: &Url) -> bool {
        let path = url.path();
        if self.path_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return true;
        }
        url.host_str()
            .is_some_and(|host| self.hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
    }
}

/// Settings for one [`DocumentClient`](crate::client::DocumentClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Durable cookie jar; `None` keeps cookies in memory only.
    pub cookie_file: Option<PathBuf>,
    /// Page capture directory; `None` disables capture.
    pub capture_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cookie_file: None,
            capture_dir: None,
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

/// Second-factor provider endpoints and polling budget.
#[derive(Debug, Clone)]
pub struct DuoConfig {
    pub(crate) base_url: Url,
    pub(crate) client_version: String,
    pub(crate) max_attempts: u32,
    pub(crate) poll_interval: Duration,
    pub(crate) deadline: Option<Duration>,
    pub(crate) client: ClientConfig,
}

impl Default for DuoConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DUO_BASE_URL.parse().expect("valid default URL"),
            client_version: "2.1".into(),
            max_attempts: 4,
            poll_interval: Duration::from_secs(5),
            deadline: None,
            client: ClientConfig::default(),
        }
    }
}

impl DuoConfig {
    /// Override the provider frame base URL. A trailing slash is added if missing.
    #[must_use]
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = with_trailing_slash(url);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Abort the whole approval wait after `deadline`, regardless of attempts left.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.client.capture_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Reporter configuration.
///
/// Credentials are a constructor parameter; everything else has a default
/// matching the production site and can be overridden with `with_*` methods.
///
/// ```rust,ignore
/// use vsl_reporter::{Credentials, ReporterConfig};
///
/// let config = ReporterConfig::new(Credentials::new("netid", "password")?)
///     .with_debug(true);
/// ```
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub(crate) credentials: Credentials,
    pub(crate) base_url: Url,
    pub(crate) index_path: String,
    pub(crate) entry_path: String,
    pub(crate) approvals_path: String,
    pub(crate) login: LoginIndicators,
    pub(crate) username_field: String,
    pub(crate) password_field: String,
    pub(crate) challenge_marker: String,
    pub(crate) debug: bool,
    pub(crate) capture_dir: PathBuf,
    pub(crate) client: ClientConfig,
    pub(crate) duo: DuoConfig,
}

impl ReporterConfig {
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.parse().expect("valid default URL"),
            index_path: "vacation/".into(),
            entry_path: "vacation/setdate.asp".into(),
            approvals_path: "vacation/supervisor.asp".into(),
            login: LoginIndicators::default(),
            username_field: "j_username".into(),
            password_field: "j_password".into(),
            challenge_marker: "Duo.init(".into(),
            debug: false,
            capture_dir: PathBuf::from("LOGS"),
            client: ClientConfig {
                cookie_file: Some(PathBuf::from("cookiefile")),
                ..ClientConfig::default()
            },
            duo: DuoConfig::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `VSL_USERNAME`, `VSL_PASSWORD`: identity provider credentials
    ///
    /// # Optional env vars
    /// - `VSL_BASE_URL`: Override the leave site base URL
    /// - `VSL_COOKIE_FILE`: Cookie jar path (default `cookiefile`)
    /// - `VSL_DEBUG`: `"1"` or `"true"` enables page capture
    /// - `VSL_CAPTURE_DIR`: Capture directory (default `LOGS`)
    /// - `VSL_DUO_BASE_URL`: Override the Duo frame base URL
    /// - `VSL_DUO_MAX_ATTEMPTS`: Status polls before giving up (default 4)
    /// - `VSL_DUO_POLL_INTERVAL_SECS`: Seconds between polls (default 5)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or a value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        let username = std::env::var("VSL_USERNAME")
            .map_err(|_| Error::Config("VSL_USERNAME is required".into()))?;
        let password = std::env::var("VSL_PASSWORD")
            .map_err(|_| Error::Config("VSL_PASSWORD is required".into()))?;

        let mut config = Self::new(Credentials::new(username, password)?);

        if let Ok(url_str) = std::env::var("VSL_BASE_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("VSL_BASE_URL: {e}")))?;
            config = config.with_base_url(url);
        }
        if let Ok(path) = std::env::var("VSL_COOKIE_FILE") {
            config = config.with_cookie_file(path);
        }
        if let Ok(dir) = std::env::var("VSL_CAPTURE_DIR") {
            config = config.with_capture_dir(dir);
        }
        let debug = matches!(std::env::var("VSL_DEBUG").as_deref(), Ok("1") | Ok("true"));
        config = config.with_debug(debug);

        let mut duo = config.duo.clone();
        if let Ok(url_str) = std::env::var("VSL_DUO_BASE_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("VSL_DUO_BASE_URL: {e}")))?;
            duo = duo.with_base_url(url);
        }
        if let Ok(attempts) = std::env::var("VSL_DUO_MAX_ATTEMPTS") {
            let attempts = attempts
                .parse()
                .map_err(|e| Error::Config(format!("VSL_DUO_MAX_ATTEMPTS: {e}")))?;
            duo = duo.with_max_attempts(attempts);
        }
        if let Ok(secs) = std::env::var("VSL_DUO_POLL_INTERVAL_SECS") {
            let secs = secs
                .parse()
                .map_err(|e| Error::Config(format!("VSL_DUO_POLL_INTERVAL_SECS: {e}")))?;
            duo = duo.with_poll_interval(Duration::from_secs(secs));
        }

        Ok(config.with_duo(duo))
    }

    /// Override the leave site base URL. A trailing slash is added if missing.
    #[must_use]
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = with_trailing_slash(url);
        self
    }

    #[must_use]
    pub fn with_login_indicators(mut self, login: LoginIndicators) -> Self {
        self.login = login;
        self
    }

    #[must_use]
    pub fn with_credential_fields(
        mut self,
        username_field: impl Into<String>,
        password_field: impl Into<String>,
    ) -> Self {
        self.username_field = username_field.into();
        self.password_field = password_field.into();
        self
    }

    /// Override the inline script prefix that carries the second-factor config.
    #[must_use]
    pub fn with_challenge_marker(mut self, marker: impl Into<String>) -> Self {
        self.challenge_marker = marker.into();
        self
    }

    #[must_use]
    pub fn with_cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.client.cookie_file = Some(path.into());
        self
    }

    /// Keep cookies in memory only.
    #[must_use]
    pub fn without_cookie_file(mut self) -> Self {
        self.client.cookie_file = None;
        self
    }

    /// Enable page capture for the session and the second-factor client.
    ///
    /// Captures go to the capture directory and a sibling `<dir>.DUO`.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client.timeout = timeout;
        self.duo.client.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_duo(mut self, duo: DuoConfig) -> Self {
        self.duo = duo;
        self
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn login_indicators(&self) -> &LoginIndicators {
        &self.login
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Leave index page listing the overdue reporting period.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the configured path does not form a URL.
    pub fn index_url(&self) -> Result<Url, Error> {
        Ok(self.base_url.join(&self.index_path)?)
    }

    /// Entry page for one date, e.g. `setdate.asp?3/16/2024`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the configured path does not form a URL.
    pub fn entry_url(&self, date: time::Date) -> Result<Url, Error> {
        let mut url = self.base_url.join(&self.entry_path)?;
        url.set_query(Some(&format!(
            "{}/{}/{}",
            u8::from(date.month()),
            date.day(),
            date.year()
        )));
        Ok(url)
    }

    /// Supervisor page listing entries awaiting approval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the configured path does not form a URL.
    pub fn approvals_url(&self) -> Result<Url, Error> {
        Ok(self.base_url.join(&self.approvals_path)?)
    }

    /// Client settings for the leave-site session.
    pub(crate) fn session_client(&self) -> ClientConfig {
        let mut client = self.client.clone();
        if self.debug && client.capture_dir.is_none() {
            client.capture_dir = Some(self.capture_dir.clone());
        }
        client
    }

    /// Second-factor settings, with capture scoped away from the session's directory.
    pub(crate) fn duo_config(&self) -> DuoConfig {
        let mut duo = self.duo.clone();
        if self.debug && duo.client.capture_dir.is_none() {
            let mut dir = self.capture_dir.clone().into_os_string();
            dir.push(".DUO");
            duo.client.capture_dir = Some(PathBuf::from(dir));
        }
        duo
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
