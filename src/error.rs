use crate::auth::LoginState;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Network-level failure. The only retryable variant.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// A value the caller requires was absent from the document.
    #[error("not found: {0}")]
    NotFound(String),

    /// The login page no longer carries the second-factor markers.
    #[error("second-factor challenge not found: {0}")]
    ChallengeNotFound(String),

    /// The identity provider returned the credential form again.
    #[error("primary credentials rejected by the identity provider")]
    CredentialsRejected,

    #[error("no default second-factor device is registered")]
    NoDefaultDevice,

    #[error("second-factor approval denied (status: {0})")]
    ApprovalDenied(String),

    #[error("second-factor approval not granted after {attempts} attempts")]
    ApprovalTimeout { attempts: u32 },

    #[error("second-factor approval cancelled after {attempts} attempts")]
    ApprovalCancelled { attempts: u32 },

    #[error("authentication failed while {stage}: {source}")]
    AuthenticationFailed {
        stage: LoginState,
        #[source]
        source: Box<Error>,
    },

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cookie store error: {0}")]
    CookieStore(String),

    #[error("page capture failed: {0}")]
    Capture(#[source] std::io::Error),

    #[error("calendar source error: {0}")]
    Calendar(String),
}

impl Error {
    /// Whether repeating the failed operation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub(crate) fn auth(stage: LoginState, source: Error) -> Self {
        match source {
            already @ Self::AuthenticationFailed { .. } => already,
            other => Self::AuthenticationFailed {
                stage,
                source: Box::new(other),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::Malformed(format!("invalid URL: {e}"))
    }
}
