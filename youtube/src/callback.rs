//! Loopback listener that receives the OAuth redirect.
//!
//! A [`CallbackSession`] carries everything one authorization attempt needs: the `state` value
//! sent to the provider, a way to exchange the returned code, and the sending half of the
//! one-shot channel the waiting bootstrapper listens on. [`await_authorization`] serves the
//! session until the first successful callback or until the consent timeout, then shuts the
//! listener down.

use crate::credential::Credential;
use eyre::Context;
use http_body_util::Full;
use hyper::body::{self, Bytes};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use oauth2::{AuthorizationCode, CsrfToken};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;

/// Path of the redirect URI registered with the provider.
pub const CALLBACK_PATH: &str = "/oauth2callback";

const SUCCESS_MESSAGE: &str = "Authorization successful! You can close this window.";

/// How long open connections get to finish their response once the flow is over.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Exchanges an authorization code for a credential at the provider's token endpoint.
pub trait CodeExchange: Send + Sync + 'static {
    fn exchange(
        &self,
        code: AuthorizationCode,
    ) -> impl Future<Output = eyre::Result<Credential>> + Send;
}

/// Why a callback request did not complete the flow.
#[derive(Debug)]
pub enum CallbackRejection {
    /// The `state` parameter is missing or belongs to a different authorization attempt.
    StateMismatch,
    /// The provider redirected without an authorization code.
    MissingCode,
    /// The token endpoint refused the code or could not be reached.
    ExchangeFailed(eyre::Report),
    /// A credential was already handed off, or nobody is waiting for one anymore.
    NotWaiting,
}

impl CallbackRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::StateMismatch | Self::MissingCode => StatusCode::BAD_REQUEST,
            Self::ExchangeFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotWaiting => StatusCode::CONFLICT,
        }
    }
}

impl fmt::Display for CallbackRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateMismatch => f.write_str("State parameter doesn't match"),
            Self::MissingCode => f.write_str("Code not found in URL"),
            Self::ExchangeFailed(e) => write!(f, "Failed to exchange token: {e:#}"),
            Self::NotWaiting => f.write_str("No authorization is pending"),
        }
    }
}

impl std::error::Error for CallbackRejection {}

/// State for a single authorization attempt.
pub struct CallbackSession<E> {
    state: CsrfToken,
    exchange: E,
    waiter: Mutex<Option<oneshot::Sender<Credential>>>,
}

impl<E: CodeExchange> CallbackSession<E> {
    /// Creates a session expecting `state`, along with the receiver that resolves once a
    /// callback succeeds.
    pub fn new(state: CsrfToken, exchange: E) -> (Self, oneshot::Receiver<Credential>) {
        let (tx, rx) = oneshot::channel();
        let session = Self {
            state,
            exchange,
            waiter: Mutex::new(Some(tx)),
        };
        (session, rx)
    }

    fn is_waiting(&self) -> bool {
        self.waiter.lock().is_ok_and(|waiter| waiter.is_some())
    }

    /// Validates the redirect's query string and, if it is acceptable, exchanges the code and
    /// hands the credential to the waiter.
    pub async fn handle(&self, query: Option<&str>) -> Result<(), CallbackRejection> {
        let mut presented_state = None;
        let mut presented_code = None;
        for (k, v) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match &*k {
                "state" => presented_state = Some(v),
                "code" => presented_code = Some(v),
                _ => {}
            }
        }

        if presented_state.as_deref() != Some(self.state.secret().as_str()) {
            return Err(CallbackRejection::StateMismatch);
        }
        let Some(code) = presented_code.filter(|code| !code.is_empty()) else {
            return Err(CallbackRejection::MissingCode);
        };
        if !self.is_waiting() {
            return Err(CallbackRejection::NotWaiting);
        }

        let credential = self
            .exchange
            .exchange(AuthorizationCode::new(code.into_owned()))
            .await
            .map_err(CallbackRejection::ExchangeFailed)?;

        // first successful callback wins
        let waiter = self.waiter.lock().ok().and_then(|mut waiter| waiter.take());
        match waiter {
            Some(tx) => tx.send(credential).map_err(|_| CallbackRejection::NotWaiting),
            None => Err(CallbackRejection::NotWaiting),
        }
    }

    async fn respond(&self, uri: &Uri) -> Response<Full<Bytes>> {
        if uri.path() != CALLBACK_PATH {
            return plain_text(StatusCode::NOT_FOUND, "Not found".to_string());
        }

        match self.handle(uri.query()).await {
            Ok(()) => {
                tracing::info!("received OAuth callback with a valid authorization code");
                plain_text(StatusCode::OK, SUCCESS_MESSAGE.to_string())
            }
            Err(rejection) => {
                tracing::warn!(%rejection, "rejected OAuth callback");
                plain_text(rejection.status(), rejection.to_string())
            }
        }
    }
}

fn plain_text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Serves `session` on `listener` until a callback succeeds or `timeout` elapses.
///
/// The listener is closed and open connections are shut down before this returns, whichever
/// way the flow ends.
pub async fn await_authorization<E: CodeExchange>(
    listener: TcpListener,
    session: Arc<CallbackSession<E>>,
    credential: oneshot::Receiver<Credential>,
    timeout: Duration,
) -> eyre::Result<Credential> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut connections = JoinSet::new();

    let outcome = tokio::time::timeout(timeout, async {
        let mut credential = credential;
        loop {
            tokio::select! {
                received = &mut credential => {
                    return received.context("callback session ended without a credential");
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::trace!(%peer, "accepted callback connection");
                            connections.spawn(serve_connection(
                                stream,
                                Arc::clone(&session),
                                shutdown_rx.clone(),
                            ));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to accept callback connection");
                        }
                    }
                }
            }
        }
    })
    .await;

    drop(listener);
    let _ = shutdown_tx.send(true);
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::debug!("forcibly closing lingering callback connections");
        connections.abort_all();
    }

    match outcome {
        Ok(result) => result,
        Err(_) => Err(eyre::eyre!(
            "timed out after {timeout:?} waiting for the user to authorize access"
        )),
    }
}

async fn serve_connection<E: CodeExchange>(
    stream: TcpStream,
    session: Arc<CallbackSession<E>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<body::Incoming>| {
        let session = Arc::clone(&session);
        async move { Ok::<_, Infallible>(session.respond(req.uri()).await) }
    });
    let mut serve =
        std::pin::pin!(hyper::server::conn::http1::Builder::new().serve_connection(io, service));

    let mut shutting_down = false;
    loop {
        tokio::select! {
            exit = serve.as_mut() => {
                if let Err(e) = exit {
                    tracing::debug!(error = %e, "callback connection closed with an error");
                }
                break;
            }
            _ = shutdown.changed(), if !shutting_down => {
                serve.as_mut().graceful_shutdown();
                shutting_down = true;
            }
        }
    }
}
