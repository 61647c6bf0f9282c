//! Duo push approval over the provider's frame endpoints.
//!
//! The poller drives its own [`DocumentClient`] so the provider's cookies and
//! captured pages never mix with the leave-site session. The only values that
//! cross between the two are the challenge going in and the signature coming out.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use tokio::time::Instant;
use url::Url;

use crate::auth::AuthChallenge;
use crate::client::{DocumentClient, RequestBody};
use crate::config::DuoConfig;
use crate::error::Error;
use crate::types::AuthSignature;

/// A device registered with the provider, echoed back verbatim in the push request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuoDevice {
    #[serde(rename = "defDevice", default)]
    pub is_default: bool,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, JsonValue>,
}

impl DuoDevice {
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        ["device", "id", "deviceId"]
            .iter()
            .find_map(|key| self.attributes.get(*key).and_then(JsonValue::as_str))
    }
}

#[derive(Debug, Deserialize)]
struct PreAuthResponse {
    #[serde(default)]
    devices: Vec<DuoDevice>,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    tx: &'a str,
    parent: &'a str,
    device: &'a DuoDevice,
}

/// The push response carries the status transaction id in `status`.
#[derive(Debug, Deserialize)]
struct PushResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(rename = "authSig", default)]
    auth_sig: Option<String>,
}

/// Provider status, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalStatus {
    Allow,
    /// Terminal, anything but `allow`.
    Denied(String),
    Pending(String),
}

impl ApprovalStatus {
    #[must_use]
    pub fn classify(status: &str) -> Self {
        match status {
            "allow" => Self::Allow,
            "deny" | "fraud" | "timeout" | "error" => Self::Denied(status.to_owned()),
            other => Self::Pending(other.to_owned()),
        }
    }
}

/// The push currently awaiting the user's decision.
#[derive(Debug, Clone)]
pub struct DuoApprovalRequest {
    pub txid: String,
    pub device: Option<String>,
    pub poll_url: Url,
    pub attempts: u32,
    started: Instant,
}

impl DuoApprovalRequest {
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Second-factor poller: push to the default device, then poll until a decision.
pub struct DuoPoller {
    config: DuoConfig,
    client: DocumentClient,
    request: Option<DuoApprovalRequest>,
}

impl DuoPoller {
    /// # Errors
    ///
    /// Returns an error if the provider client cannot be built (see [`DocumentClient::new`]).
    pub fn new(config: DuoConfig) -> Result<Self, Error> {
        let client = DocumentClient::new(&config.client)?;
        Ok(Self {
            config,
            client,
            request: None,
        })
    }

    /// The in-flight approval, if a push has been sent and not yet resolved.
    #[must_use]
    pub fn pending_request(&self) -> Option<&DuoApprovalRequest> {
        self.request.as_ref()
    }

    /// Push to the default device and wait for approval.
    ///
    /// Honours the configured overall deadline, if any.
    ///
    /// # Errors
    ///
    /// [`Error::NoDefaultDevice`], [`Error::ApprovalDenied`],
    /// [`Error::ApprovalTimeout`] once the attempt budget is spent,
    /// [`Error::ApprovalCancelled`] when the deadline passes, or any transport error.
    pub async fn push_and_await_approval(
        &mut self,
        challenge: &AuthChallenge,
    ) -> Result<AuthSignature, Error> {
        match self.config.deadline {
            Some(limit) => {
                self.push_and_await_approval_until(challenge, Instant::now() + limit)
                    .await
            }
            None => self.approve(challenge).await,
        }
    }

    /// Like [`push_and_await_approval`](Self::push_and_await_approval), aborting at `deadline`.
    ///
    /// On abort the in-flight request is discarded. The push already shown on
    /// the device cannot be withdrawn, so callers must treat the whole login
    /// attempt as failed rather than resume polling.
    ///
    /// # Errors
    ///
    /// As [`push_and_await_approval`](Self::push_and_await_approval).
    pub async fn push_and_await_approval_until(
        &mut self,
        challenge: &AuthChallenge,
        deadline: Instant,
    ) -> Result<AuthSignature, Error> {
        match tokio::time::timeout_at(deadline, self.approve(challenge)).await {
            Ok(result) => result,
            Err(_) => {
                let attempts = self.request.take().map_or(0, |r| r.attempts);
                tracing::warn!(attempts, "Second-factor wait cancelled at deadline");
                Err(Error::ApprovalCancelled { attempts })
            }
        }
    }

    async fn approve(&mut self, challenge: &AuthChallenge) -> Result<AuthSignature, Error> {
        let result = self.run(challenge).await;
        self.request = None;
        result
    }

    async fn run(&mut self, challenge: &AuthChallenge) -> Result<AuthSignature, Error> {
        let tx = challenge.tx();
        let parent = challenge.parent().as_str();
        let base = self.config.base_url.clone();

        // Initialize: establishes the provider's session cookie
        let mut init = base.join("web/v1/auth")?;
        init.query_pairs_mut()
            .append_pair("tx", tx)
            .append_pair("parent", parent)
            .append_pair("v", &self.config.client_version);
        self.client.get(init).await?;

        let pre_auth = self
            .client
            .navigate(
                base.join("devices/preAuth")?,
                Some(RequestBody::form([("tx", tx), ("parent", parent)])),
            )
            .await?;
        let devices: PreAuthResponse = serde_json::from_str(pre_auth.body())?;
        let device = devices
            .devices
            .into_iter()
            .find(|d| d.is_default)
            .ok_or(Error::NoDefaultDevice)?;
        tracing::debug!(device = ?device.id(), "Default second-factor device selected");

        let push = RequestBody::json(&PushRequest {
            tx,
            parent,
            device: &device,
        })?;
        let pushed = self
            .client
            .navigate(base.join("devices/authPush_async")?, Some(push))
            .await?;
        let txid = serde_json::from_str::<PushResponse>(pushed.body())?.status;

        let poll_url = base.join(&format!("devices/authStatus/{txid}"))?;
        self.request = Some(DuoApprovalRequest {
            txid,
            device: device.id().map(str::to_owned),
            poll_url: poll_url.clone(),
            attempts: 0,
            started: Instant::now(),
        });
        tracing::info!("Push sent, awaiting approval on device");

        let max_attempts = self.config.max_attempts;
        for attempt in 1..=max_attempts {
            if let Some(request) = self.request.as_mut() {
                request.attempts = attempt;
            }
            tracing::debug!(attempt, max_attempts, "Polling approval status");

            let mut url = poll_url.clone();
            url.query_pairs_mut()
                .append_pair("tx", tx)
                .append_pair("parent", parent)
                .append_pair("_", &OffsetDateTime::now_utc().unix_timestamp().to_string());
            let doc = self.client.get(url).await?;
            let status: StatusResponse = serde_json::from_str(doc.body())?;

            match ApprovalStatus::classify(&status.status) {
                ApprovalStatus::Allow => {
                    let sig = status
                        .auth_sig
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| Error::Malformed("allow status without authSig".into()))?;
                    tracing::info!(attempt, "Second-factor approved");
                    return Ok(AuthSignature(sig));
                }
                ApprovalStatus::Denied(status) => {
                    tracing::warn!(status = %status, "Second-factor denied");
                    return Err(Error::ApprovalDenied(status));
                }
                ApprovalStatus::Pending(status) => {
                    tracing::debug!(status = %status, "Approval still pending");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                }
            }
        }

        Err(Error::ApprovalTimeout {
            attempts: max_attempts,
        })
    }
}
