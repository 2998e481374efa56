//! Authorization-type server: loopback OAuth redirect landing pages,
//! multiplexed by `state` so one process can host every provider's OAuth
//! flow concurrently on a single persistent listener.

use std::convert::Infallible;
use std::sync::Arc;

use dashmap::DashMap;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::response::{self, RespBody};

/// Registered per OAuth flow, keyed by the flow's CSRF `state`. Pages are
/// pre-rendered by the auth state machine; this server only routes.
pub trait AuthorizationHandler: Send + Sync {
    /// `GET /?state=&code=` — exchange is the caller's job; this returns
    /// the landing page to show while it happens.
    fn on_code(&self, code: &str) -> String;
    /// `GET /?state=&error=`.
    fn on_error(&self, error: &str) -> String;
    /// `GET /login?state=`.
    fn login_page(&self) -> String;
}

/// Removes its handler from the dispatch table on drop, so "a handler is
/// removed when its owning flow ends" holds even on early cancellation.
pub struct RegistrationGuard {
    handlers: Arc<DashMap<String, Arc<dyn AuthorizationHandler>>>,
    state: String,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.handlers.remove(&self.state);
    }
}

pub struct AuthorizationServer {
    port: u16,
    handlers: Arc<DashMap<String, Arc<dyn AuthorizationHandler>>>,
}

impl AuthorizationServer {
    /// Binds an OS-assigned loopback port, per-instance, and starts
    /// accepting connections in the background.
    pub async fn bind() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let handlers: Arc<DashMap<String, Arc<dyn AuthorizationHandler>>> = Arc::new(DashMap::new());

        let accept_handlers = handlers.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("authorization server accept failed: {e}");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let conn_handlers = accept_handlers.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| route(conn_handlers.clone(), req));
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("authorization server connection closed: {e}");
                    }
                });
            }
        });

        Ok(Self { port, handlers })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The redirect URI OAuth providers should be configured with.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    /// Registers a handler under `state`, returning a guard that
    /// deregisters it on drop.
    pub fn register(&self, state: impl Into<String>, handler: Arc<dyn AuthorizationHandler>) -> RegistrationGuard {
        let state = state.into();
        self.handlers.insert(state.clone(), handler);
        RegistrationGuard {
            handlers: self.handlers.clone(),
            state,
        }
    }
}

async fn route(
    handlers: Arc<DashMap<String, Arc<dyn AuthorizationHandler>>>,
    req: Request<Incoming>,
) -> Result<hyper::Response<RespBody>, Infallible> {
    let uri = req.uri().to_string();
    let _ = req.into_body().collect().await;

    let Ok(url) = url::Url::parse(&format!("http://localhost{uri}")) else {
        return Ok(response::empty(StatusCode::BAD_REQUEST));
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    // An unrecognized or missing `state` is a CSRF rejection: no handler runs.
    let Some(state) = state else {
        return Ok(response::empty(StatusCode::BAD_REQUEST));
    };
    let Some(handler) = handlers.get(&state).map(|entry| entry.clone()) else {
        return Ok(response::empty(StatusCode::BAD_REQUEST));
    };

    let body = if url.path() == "/login" {
        handler.login_page()
    } else if let Some(error) = error {
        handler.on_error(&error)
    } else if let Some(code) = code {
        handler.on_code(&code)
    } else {
        return Ok(response::empty(StatusCode::BAD_REQUEST));
    };

    Ok(response::html(StatusCode::OK, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingHandler;

    impl AuthorizationHandler for RecordingHandler {
        fn on_code(&self, code: &str) -> String {
            format!("code:{code}")
        }

        fn on_error(&self, error: &str) -> String {
            format!("error:{error}")
        }

        fn login_page(&self) -> String {
            "login".to_string()
        }
    }

    #[tokio::test]
    async fn routes_code_callback_to_registered_handler() {
        let server = AuthorizationServer::bind().await.unwrap();
        let _guard = server.register("s1", Arc::new(RecordingHandler));

        let url = format!("http://127.0.0.1:{}/?state=s1&code=abc", server.port());
        let body = reqwest::get(url).await.unwrap().text().await.unwrap();
        assert_eq!(body, "code:abc");
    }

    #[tokio::test]
    async fn routes_login_page_to_registered_handler() {
        let server = AuthorizationServer::bind().await.unwrap();
        let _guard = server.register("s2", Arc::new(RecordingHandler));

        let url = format!("http://127.0.0.1:{}/login?state=s2", server.port());
        let body = reqwest::get(url).await.unwrap().text().await.unwrap();
        assert_eq!(body, "login");
    }

    #[tokio::test]
    async fn unrecognized_state_is_rejected_without_invoking_a_handler() {
        let server = AuthorizationServer::bind().await.unwrap();
        let _guard = server.register("known", Arc::new(RecordingHandler));

        let url = format!("http://127.0.0.1:{}/?state=unknown&code=abc", server.port());
        let response = reqwest::get(url).await.unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn deregistering_removes_the_handler() {
        let server = AuthorizationServer::bind().await.unwrap();
        let guard = server.register("s3", Arc::new(RecordingHandler));
        drop(guard);

        let url = format!("http://127.0.0.1:{}/?state=s3&code=abc", server.port());
        let response = reqwest::get(url).await.unwrap();
        assert_eq!(response.status(), 400);
    }
}
