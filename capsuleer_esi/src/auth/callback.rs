use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
};
use tokio::{net::TcpListener, sync::oneshot};
use url::Url;

use crate::errors::AuthError;

/// Time allowed for in-flight responses once the redirect has been captured.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

type CallbackOutcome = Result<CallbackParams, AuthError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// Loopback listener that captures a single SSO redirect.
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

#[derive(Clone)]
struct CaptureState {
    outcome: Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>,
}

impl CaptureState {
    /// Hands the first outcome to `wait`; later redirects are answered but dropped.
    fn deliver(&self, outcome: CallbackOutcome) {
        let mut slot = match self.outcome.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.take() {
            Some(sender) => {
                let _ = sender.send(outcome);
            }
            None => log::debug!("ignoring repeated authorization callback"),
        }
    }
}

impl CallbackListener {
    pub async fn bind(callback_url: &str) -> Result<Self, AuthError> {
        let parsed = Url::parse(callback_url)
            .map_err(|err| AuthError::InvalidCallbackUrl(format!("{callback_url}: {err}")))?;
        if parsed.scheme() != "http" {
            return Err(AuthError::InvalidCallbackUrl(
                "callback URL must use http for the local listener".to_string(),
            ));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| AuthError::InvalidCallbackUrl("callback URL needs a host".to_string()))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| AuthError::InvalidCallbackUrl("callback URL needs a port".to_string()))?;

        let bind_addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(AuthError::CallbackIo)?;
        log::debug!("callback listener bound on {bind_addr}");

        Ok(Self {
            listener,
            path: parsed.path().to_owned(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AuthError> {
        self.listener.local_addr().map_err(AuthError::CallbackIo)
    }

    /// Serves the callback route until a redirect carrying `code` and `state`
    /// (or an SSO `error`) arrives, then shuts the server down. Other paths
    /// get a 404 and other methods a 405; neither ends the wait.
    pub async fn wait(self, timeout: Duration) -> Result<CallbackParams, AuthError> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let capture = CaptureState {
            outcome: Arc::new(Mutex::new(Some(outcome_tx))),
        };
        let app = Router::new()
            .route(&self.path, get(capture_redirect))
            .with_state(capture);

        let mut server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = match tokio::time::timeout(timeout, outcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_closed)) => Err(server_stopped(&mut server).await),
            Err(_elapsed) => Err(AuthError::CallbackTimeout {
                waited_secs: timeout.as_secs(),
            }),
        };

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
            log::debug!("callback server still has open connections; aborting it");
            server.abort();
        }

        outcome
    }
}

async fn capture_redirect(
    State(capture): State<CaptureState>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    let (status, body, outcome) = if let Some(error) = query.get("error") {
        (
            StatusCode::BAD_REQUEST,
            "Authorization was not granted.",
            Err(AuthError::CallbackRejected(error.clone())),
        )
    } else if let (Some(code), Some(state)) = (query.get("code"), query.get("state")) {
        (
            StatusCode::OK,
            "Authentication captured. You can close this tab.",
            Ok(CallbackParams {
                code: code.clone(),
                state: state.clone(),
            }),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            "Missing code/state query parameters.",
            Err(AuthError::CallbackRejected(
                "callback query is missing code and/or state".to_string(),
            )),
        )
    };

    capture.deliver(outcome);
    (status, body)
}

async fn server_stopped(
    server: &mut tokio::task::JoinHandle<std::io::Result<()>>,
) -> AuthError {
    match server.await {
        Ok(Err(err)) => AuthError::CallbackIo(err),
        _ => AuthError::CallbackIo(std::io::Error::other(
            "callback server stopped before a redirect arrived",
        )),
    }
}
