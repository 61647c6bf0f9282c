use url::Url;

use crate::auth::{Authenticator, LoginState};
use crate::client::{self, DocumentClient, RequestBody, redacted};
use crate::config::{LoginIndicators, ReporterConfig};
use crate::cookies::CookieJar;
use crate::document::Document;
use crate::error::Error;

/// An authenticated view of the leave site.
///
/// Every navigation that lands on a login surface runs the login flow once
/// and then reissues the original request. The `authenticating` flag stops the
/// login flow's own navigations from triggering another login.
///
/// Operations are strictly sequential; use one `Session` per credential.
pub struct Session {
    client: DocumentClient,
    authenticator: Authenticator,
    login: LoginIndicators,
    authenticating: bool,
}

impl Session {
    /// # Errors
    ///
    /// Returns an error if the cookie file or capture directory cannot be
    /// prepared, or the HTTP client cannot be built.
    pub fn new(config: &ReporterConfig) -> Result<Self, Error> {
        Ok(Self {
            client: DocumentClient::new(&config.session_client())?,
            authenticator: Authenticator::new(config),
            login: config.login.clone(),
            authenticating: false,
        })
    }

    /// Whether a login is in progress.
    #[must_use]
    pub fn is_authenticating(&self) -> bool {
        self.authenticating
    }

    #[must_use]
    pub fn login_state(&self) -> LoginState {
        self.authenticator.state()
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieJar {
        self.client.cookies()
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFound`] before the first navigation.
    pub fn document(&self) -> Result<&Document, Error> {
        self.client.document()
    }

    /// Navigate, logging in first if the site bounces to a login surface.
    ///
    /// # Errors
    ///
    /// Transport and status errors from the request, or
    /// [`Error::AuthenticationFailed`] if login was needed and did not complete.
    pub async fn navigate(&mut self, url: Url, body: Option<RequestBody>) -> Result<&Document, Error> {
        let doc = self.client.navigate(url.clone(), body.clone()).await?;
        if self.authenticating || !self.login.matches(doc.url()) {
            return self.client.document();
        }
        self.reauthenticate(url, body).await
    }

    pub async fn get(&mut self, url: Url) -> Result<&Document, Error> {
        self.navigate(url, None).await
    }

    /// Submit a form of the current document, or the first one when `name` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the form is absent, otherwise as [`navigate`](Self::navigate).
    pub async fn submit_form(
        &mut self,
        name: Option<&str>,
        overrides: &[(&str, &str)],
    ) -> Result<&Document, Error> {
        let doc = self.client.document()?;
        let form = match name {
            Some(name) => doc.form_named(name),
            None => doc.forms().first(),
        }
        .ok_or_else(|| {
            Error::NotFound(format!(
                "form {} on {}",
                name.unwrap_or("<first>"),
                redacted(doc.url())
            ))
        })?;
        let (url, body) = client::form_request(form, overrides);
        self.navigate(url, body).await
    }

    async fn reauthenticate(&mut self, url: Url, body: Option<RequestBody>) -> Result<&Document, Error> {
        tracing::info!(url = %redacted(&url), "Login surface detected, authenticating");

        {
            let _guard = AuthenticatingGuard::set(&mut self.authenticating);
            self.authenticator.login(&mut self.client).await?;
        }

        let landed = self.client.document()?.url();
        if landed.path() != url.path() || landed.query() != url.query() {
            tracing::debug!(url = %redacted(&url), "Reissuing original request");
            self.client.navigate(url.clone(), body).await?;
        }

        let doc = self.client.document()?;
        if self.login.matches(doc.url()) {
            return Err(Error::auth(
                LoginState::AssertionReplayed,
                Error::NotFound(format!("authenticated page at {}", redacted(&url))),
            ));
        }
        Ok(doc)
    }
}

/// Holds the re-entrancy flag for the duration of one login.
///
/// Cleared on drop, so a login future cancelled mid-flight leaves the
/// session unauthenticated rather than stuck in the authenticating state.
struct AuthenticatingGuard<'a>(&'a mut bool);

impl<'a> AuthenticatingGuard<'a> {
    fn set(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for AuthenticatingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}
