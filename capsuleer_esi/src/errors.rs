use std::fmt;

use thiserror::Error;

pub type EsiResult<T> = Result<T, EsiError>;
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum EsiError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("credential store i/o failed")]
    Io(#[from] std::io::Error),
    #[error("credential serialization failed")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to build http client")]
    HttpClient(#[from] reqwest::Error),
    #[error("authorization failed")]
    Auth(#[from] AuthError),
    #[error("character '{character}' is not authenticated")]
    NotAuthenticated { character: String },
    #[error("refresh token rejected for character '{character}': {reason}")]
    Refresh { character: String, reason: String },
    #[error("timed out waiting for the refresh lock of character '{character}'")]
    LockTimeout { character: String },
    #[error("esi request failed")]
    Api(#[from] ApiError),
    #[error("unexpected response body from {endpoint}: {detail}")]
    UnexpectedBody { endpoint: String, detail: String },
}

impl EsiError {
    pub fn display_chain(&self) -> DisplayChainedError<'_> {
        DisplayChainedError { inner: self }
    }

    /// The caller must run the login flow again before this character is usable.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated { .. }
                | Self::Refresh { .. }
                | Self::Api(ApiError {
                    kind: ApiErrorKind::Unauthorized,
                    ..
                })
        )
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no authorization callback received within {waited_secs}s")]
    CallbackTimeout { waited_secs: u64 },
    #[error("state mismatch: expected {expected}, got {got}")]
    StateMismatch { expected: String, got: String },
    #[error("authorization callback rejected: {0}")]
    CallbackRejected(String),
    #[error("callback listener failed")]
    CallbackIo(#[source] std::io::Error),
    #[error("invalid callback URL: {0}")]
    InvalidCallbackUrl(String),
    #[error("token endpoint rejected the request with status {status}: {body}")]
    TokenRejected { status: u16, body: String },
    #[error("token endpoint request failed")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint returned a malformed response: {0}")]
    MalformedTokenResponse(String),
    #[error("invalid token subject format: {0}")]
    InvalidTokenSubject(String),
    #[error("invalid token scope claim format: {0}")]
    InvalidScopeClaim(String),
    #[error("missing required scopes: {missing:?}")]
    MissingRequiredScopes { missing: Vec<String> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    Unauthorized,
    NotFound,
    BadRequest,
    RateLimited,
    ServerError,
    NetworkError,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not found",
            Self::BadRequest => "bad request",
            Self::RateLimited => "rate limited",
            Self::ServerError => "server error",
            Self::NetworkError => "network error",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind} from {endpoint}{}{}", page_label(.page), detail_label(.status, .body))]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub endpoint: String,
    pub page: Option<u32>,
    pub status: Option<u16>,
    pub body: Option<String>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            page: None,
            status: None,
            body: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        if !body.trim().is_empty() {
            self.body = Some(body);
        }
        self
    }

    pub fn on_page(mut self, page: Option<u32>) -> Self {
        self.page = page;
        self
    }
}

fn page_label(page: &Option<u32>) -> String {
    match page {
        Some(page) => format!(" (page {page})"),
        None => String::new(),
    }
}

fn detail_label(status: &Option<u16>, body: &Option<String>) -> String {
    match (status, body) {
        (Some(status), Some(body)) => format!(": HTTP {status}: {body}"),
        (Some(status), None) => format!(": HTTP {status}"),
        (None, Some(body)) => format!(": {body}"),
        (None, None) => String::new(),
    }
}

pub struct DisplayChainedError<'a> {
    inner: &'a (dyn std::error::Error + 'static),
}

impl fmt::Debug for DisplayChainedError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self.inner);

        while let Some(err) = current {
            if first {
                first = false;
            } else {
                write!(f, " -> ")?;
            }

            write!(f, "{err}")?;
            current = err.source();
        }

        Ok(())
    }
}

impl fmt::Display for DisplayChainedError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
