//! Federated login: primary credentials, second-factor push, assertion replay.

use std::fmt;

use url::Url;

use crate::client::{DocumentClient, RequestBody};
use crate::config::{Credentials, DuoConfig, ReporterConfig};
use crate::document::Document;
use crate::duo::DuoPoller;
use crate::error::Error;
use crate::extract::{self, ChallengeParts};
use crate::types::AuthSignature;

/// Auto-submitted forms tolerated between the login surface and the credential form.
const MAX_BOUNCES: usize = 3;
const EVENT_ID: &str = "_eventId";
const SIG_RESPONSE: &str = "sig_response";

/// Where a login attempt stands.
///
/// `Display` names the step being attempted, so a failure reads as
/// "authentication failed while extracting the challenge".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginState {
    #[default]
    Idle,
    PrimaryCredentialsSubmitted,
    ChallengeExtracted,
    SecondFactorPending,
    AssertionReplayed,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "detecting the login surface",
            Self::PrimaryCredentialsSubmitted => "submitting primary credentials",
            Self::ChallengeExtracted => "extracting the challenge",
            Self::SecondFactorPending => "awaiting second-factor approval",
            Self::AssertionReplayed => "replaying the signed assertion",
        })
    }
}

/// Second-factor challenge for one login attempt.
///
/// Not `Clone`: [`into_replay`](Self::into_replay) consumes it, so a challenge
/// cannot be answered twice.
#[derive(Debug)]
pub struct AuthChallenge {
    tx: String,
    app: String,
    parent: Url,
    host: Option<String>,
    echo: Vec<(String, String)>,
}

impl AuthChallenge {
    #[must_use]
    pub fn new(tx: impl Into<String>, app: impl Into<String>, parent: Url) -> Self {
        Self {
            tx: tx.into(),
            app: app.into(),
            parent,
            host: None,
            echo: Vec::new(),
        }
    }

    /// Split `TX|…:APP|…` and resolve the post action against `page`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the signature request is not a
    /// `TX|…:APP|…` pair or the post action is not a valid URL reference.
    pub fn from_parts(parts: ChallengeParts, page: &Url) -> Result<Self, Error> {
        let (tx, app) = parts
            .sig_request
            .split_once(":APP|")
            .filter(|(tx, _)| tx.starts_with("TX|"))
            .ok_or_else(|| Error::Malformed("sig_request is not TX|…:APP|…".into()))?;
        Ok(Self {
            tx: tx.to_owned(),
            app: format!("APP|{app}"),
            parent: page.join(&parts.post_action)?,
            host: parts.host,
            echo: Vec::new(),
        })
    }

    /// Fields echoed back with the signed response.
    #[must_use]
    pub fn with_echo(mut self, echo: Vec<(String, String)>) -> Self {
        self.echo = echo;
        self
    }

    #[must_use]
    pub fn tx(&self) -> &str {
        &self.tx
    }

    #[must_use]
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Hand-back URL.
    #[must_use]
    pub fn parent(&self) -> &Url {
        &self.parent
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    #[must_use]
    pub fn echo(&self) -> &[(String, String)] {
        &self.echo
    }

    /// Hand-back URL and form body carrying `sig_response = <signature>:<app>`.
    #[must_use]
    pub fn into_replay(self, signature: &AuthSignature) -> (Url, Vec<(String, String)>) {
        let mut pairs: Vec<(String, String)> = self
            .echo
            .into_iter()
            .filter(|(name, _)| name != SIG_RESPONSE)
            .collect();
        if !pairs.iter().any(|(name, _)| name == EVENT_ID) {
            pairs.push((EVENT_ID.into(), "proceed".into()));
        }
        pairs.push((SIG_RESPONSE.into(), format!("{signature}:{}", self.app)));
        (self.parent, pairs)
    }
}

/// Drives one login from a loaded login surface to the re-entered site.
pub struct Authenticator {
    steps: LoginSteps,
    state: LoginState,
}

/// The per-credential settings each login step reads.
struct LoginSteps {
    credentials: Credentials,
    username_field: String,
    password_field: String,
    challenge_marker: String,
    duo: DuoConfig,
}

impl Authenticator {
    #[must_use]
    pub fn new(config: &ReporterConfig) -> Self {
        Self {
            steps: LoginSteps {
                credentials: config.credentials.clone(),
                username_field: config.username_field.clone(),
                password_field: config.password_field.clone(),
                challenge_marker: config.challenge_marker.clone(),
                duo: config.duo_config(),
            },
            state: LoginState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Log in, starting from the login surface currently loaded in `client`.
    ///
    /// The state is back to [`LoginState::Idle`] once this returns, or once
    /// the future is dropped before completing.
    ///
    /// # Errors
    ///
    /// Any step failure is returned as [`Error::AuthenticationFailed`] naming
    /// the step. Nothing is retried.
    pub async fn login(&mut self, client: &mut DocumentClient) -> Result<(), Error> {
        tracing::debug!(username = %self.steps.credentials.username(), "Starting login");
        let mut progress = Progress::start(&mut self.state);
        let result = self.steps.run(client, &mut progress).await;
        drop(progress);
        match &result {
            Ok(()) => tracing::info!("Login complete"),
            Err(e) => tracing::debug!(error = %e, "Login aborted"),
        }
        result
    }
}

/// Tracks the state of a login in flight and resets it to idle on drop.
struct Progress<'a>(&'a mut LoginState);

impl<'a> Progress<'a> {
    fn start(state: &'a mut LoginState) -> Self {
        *state = LoginState::Idle;
        Self(state)
    }

    fn advance(&mut self, next: LoginState) {
        tracing::debug!(from = ?self.0, to = ?next, "Login state transition");
        *self.0 = next;
    }
}

impl Drop for Progress<'_> {
    fn drop(&mut self) {
        *self.0 = LoginState::Idle;
    }
}

impl LoginSteps {
    async fn run(&self, client: &mut DocumentClient, progress: &mut Progress<'_>) -> Result<(), Error> {
        self.reach_credential_form(client)
            .await
            .map_err(|e| Error::auth(LoginState::Idle, e))?;

        self.submit_credentials(client)
            .await
            .map_err(|e| Error::auth(LoginState::PrimaryCredentialsSubmitted, e))?;
        progress.advance(LoginState::PrimaryCredentialsSubmitted);

        let challenge = client
            .document()
            .and_then(|doc| self.extract_challenge(doc))
            .map_err(|e| Error::auth(LoginState::ChallengeExtracted, e))?;
        progress.advance(LoginState::ChallengeExtracted);

        progress.advance(LoginState::SecondFactorPending);
        let signature = self
            .await_approval(&challenge)
            .await
            .map_err(|e| Error::auth(LoginState::SecondFactorPending, e))?;

        replay(client, challenge, &signature)
            .await
            .map_err(|e| Error::auth(LoginState::AssertionReplayed, e))?;
        progress.advance(LoginState::AssertionReplayed);

        Ok(())
    }

    /// Submit intermediate forms until the credential form is loaded.
    async fn reach_credential_form(&self, client: &mut DocumentClient) -> Result<(), Error> {
        for _ in 0..MAX_BOUNCES {
            let doc = client.document()?;
            if doc.form_with_field(&self.username_field).is_some() {
                return Ok(());
            }
            if doc.forms().is_empty() {
                break;
            }
            client.submit_current_form(None, &[]).await?;
        }
        if client.document()?.form_with_field(&self.username_field).is_some() {
            return Ok(());
        }
        Err(Error::NotFound(format!(
            "credential form with field {:?}",
            self.username_field
        )))
    }

    async fn submit_credentials(&self, client: &mut DocumentClient) -> Result<(), Error> {
        let form = client
            .document()?
            .form_with_field(&self.username_field)
            .cloned()
            .ok_or_else(|| Error::NotFound(self.username_field.clone()))?;
        let doc = client
            .submit(
                &form,
                &[
                    (self.username_field.as_str(), self.credentials.username()),
                    (
                        self.password_field.as_str(),
                        self.credentials.password().expose_secret(),
                    ),
                ],
            )
            .await?;
        if doc.form_with_field(&self.username_field).is_some() {
            return Err(Error::CredentialsRejected);
        }
        Ok(())
    }

    fn extract_challenge(&self, doc: &Document) -> Result<AuthChallenge, Error> {
        let parts = extract::challenge_parts(doc, &self.challenge_marker)?;
        let challenge = AuthChallenge::from_parts(parts, doc.url())?;
        let echo = doc
            .forms()
            .iter()
            .find(|form| form.action() == challenge.parent())
            .map(|form| form.fields().to_vec())
            .unwrap_or_default();
        tracing::debug!(parent = %crate::client::redacted(challenge.parent()), "Challenge extracted");
        Ok(challenge.with_echo(echo))
    }

    async fn await_approval(&self, challenge: &AuthChallenge) -> Result<AuthSignature, Error> {
        // Fresh provider client per attempt
        let mut poller = DuoPoller::new(self.duo.clone())?;
        poller.push_and_await_approval(challenge).await
    }
}

async fn replay(
    client: &mut DocumentClient,
    challenge: AuthChallenge,
    signature: &AuthSignature,
) -> Result<(), Error> {
    let (parent, pairs) = challenge.into_replay(signature);
    let doc = client.navigate(parent, Some(RequestBody::Form(pairs))).await?;

    // "Press continue" page carrying the assertion back to the site
    if !doc.forms().is_empty() {
        client.submit_current_form(None, &[]).await?;
    }
    Ok(())
}
