//! FileProvider-type server: hosts the streaming proxy for opaque
//! providers, multiplexed by `state` the same way the authorization
//! server multiplexes OAuth flows on one socket.
//!
//! This crate only owns the HTTP plumbing — range parsing, status codes,
//! dispatch by state. The bounded producer/consumer buffer that actually
//! backs a download lives in `cloudkit-proxy`, which implements
//! [`FileProviderHandler`] and hands this server a `Stream` for the body;
//! a `Stream`'s `Poll::Pending` already expresses the buffer's `Suspend`
//! outcome, and the stream ending expresses `Abort`/completion, so no
//! separate suspend/resume signal needs to cross this boundary.

use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use cloudkit_core::ports::ByteRange;
use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::response::{self, RespBody};

pub type ProxyBody = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

/// What a provider's streaming proxy answers an incoming file request
/// with.
pub enum ProxyResponse {
    /// 200 or 206, depending on whether `range` narrowed the whole file.
    Data {
        status: u16,
        content_type: String,
        content_length: u64,
        content_range: Option<String>,
        body: ProxyBody,
    },
    /// state matched but the item id is unknown.
    NotFound,
    /// provider is registered but not yet authorized.
    ServiceUnavailable,
    /// the requested range doesn't fit the item's size.
    RangeInvalid { total_size: u64 },
}

#[async_trait::async_trait]
pub trait FileProviderHandler: Send + Sync {
    /// `range` is the raw `Range` header value, unparsed: only the
    /// handler knows the item's total size needed to resolve an
    /// open-ended `bytes=a-` range, so resolution happens on that side
    /// (see [`parse_range`]).
    async fn serve(&self, file_id: &str, range: Option<&str>) -> ProxyResponse;
}

/// Resolves a `Range: bytes=a-b` or `bytes=a-` header against a known
/// total size. Anything else (malformed, multi-range) is treated as "no
/// range requested", falling back to serving the whole file.
#[must_use]
pub fn parse_range(header: &str, total: u64) -> Option<ByteRange> {
    let spec = header.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = if end.trim().is_empty() {
        total.checked_sub(1)?
    } else {
        end.trim().parse().ok()?
    };
    Some(ByteRange { start, end })
}

pub struct RegistrationGuard {
    handlers: Arc<DashMap<String, Arc<dyn FileProviderHandler>>>,
    state: String,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.handlers.remove(&self.state);
    }
}

pub struct FileProviderServer {
    port: u16,
    handlers: Arc<DashMap<String, Arc<dyn FileProviderHandler>>>,
}

impl FileProviderServer {
    pub async fn bind() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let handlers: Arc<DashMap<String, Arc<dyn FileProviderHandler>>> = Arc::new(DashMap::new());

        let accept_handlers = handlers.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("file provider server accept failed: {e}");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let conn_handlers = accept_handlers.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| route(conn_handlers.clone(), req));
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("file provider server connection closed: {e}");
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

    /// The base URL a provider embeds in an `Item`'s direct URL:
    /// `http://<endpoint>/?file=<id>&state=<state>`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn register(&self, state: impl Into<String>, handler: Arc<dyn FileProviderHandler>) -> RegistrationGuard {
        let state = state.into();
        self.handlers.insert(state.clone(), handler);
        RegistrationGuard {
            handlers: self.handlers.clone(),
            state,
        }
    }
}

async fn route(
    handlers: Arc<DashMap<String, Arc<dyn FileProviderHandler>>>,
    req: Request<Incoming>,
) -> Result<hyper::Response<RespBody>, Infallible> {
    let uri = req.uri().to_string();
    let range_header = req
        .headers()
        .get(hyper::header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let _ = req.into_body().collect().await;

    let Ok(url) = url::Url::parse(&format!("http://localhost{uri}")) else {
        return Ok(response::empty(StatusCode::BAD_REQUEST));
    };

    let mut state = None;
    let mut file = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "state" => state = Some(value.into_owned()),
            "file" => file = Some(value.into_owned()),
            _ => {}
        }
    }

    let (Some(state), Some(file)) = (state, file) else {
        return Ok(response::empty(StatusCode::BAD_REQUEST));
    };

    // state mismatch: reject without revealing whether the id exists.
    let Some(handler) = handlers.get(&state).map(|entry| entry.clone()) else {
        return Ok(response::empty(StatusCode::FORBIDDEN));
    };

    match handler.serve(&file, range_header.as_deref()).await {
        ProxyResponse::Data {
            status,
            content_type,
            content_length,
            content_range,
            body,
        } => {
            let stream = body.map(|chunk| chunk.map(Frame::data));
            let mut builder = hyper::Response::builder()
                .status(StatusCode::from_u16(status).unwrap_or(StatusCode::OK))
                .header("Content-Type", content_type)
                .header("Content-Length", content_length.to_string())
                .header("Accept-Ranges", "bytes")
                .header("Content-Disposition", "inline");
            if let Some(range) = content_range {
                builder = builder.header("Content-Range", range);
            }
            Ok(builder
                .body(StreamBody::new(stream).boxed())
                .expect("well-formed streaming response"))
        }
        ProxyResponse::NotFound => Ok(response::empty(StatusCode::NOT_FOUND)),
        ProxyResponse::ServiceUnavailable => Ok(response::empty(StatusCode::SERVICE_UNAVAILABLE)),
        ProxyResponse::RangeInvalid { total_size } => {
            let response = hyper::Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header("Content-Range", format!("bytes */{total_size}"))
                .body(http_body_util::Empty::<Bytes>::new().map_err(|e| match e {}).boxed())
                .expect("well-formed range-invalid response");
            Ok(response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    struct StaticHandler {
        data: Vec<u8>,
    }

    #[async_trait::async_trait]
    impl FileProviderHandler for StaticHandler {
        async fn serve(&self, file_id: &str, range: Option<&str>) -> ProxyResponse {
            if file_id != "known" {
                return ProxyResponse::NotFound;
            }
            let total = self.data.len() as u64;
            let range = range.and_then(|h| parse_range(h, total));
            match range {
                Some(r) if !r.fits_within(total) => ProxyResponse::RangeInvalid { total_size: total },
                Some(r) => {
                    let slice = self.data[r.start as usize..=r.end as usize].to_vec();
                    ProxyResponse::Data {
                        status: 206,
                        content_type: "application/octet-stream".to_string(),
                        content_length: slice.len() as u64,
                        content_range: Some(format!("bytes {}-{}/{}", r.start, r.end, total)),
                        body: Box::pin(stream::iter(vec![Ok(Bytes::from(slice))])),
                    }
                }
                None => ProxyResponse::Data {
                    status: 200,
                    content_type: "application/octet-stream".to_string(),
                    content_length: total,
                    content_range: None,
                    body: Box::pin(stream::iter(vec![Ok(Bytes::from(self.data.clone()))])),
                },
            }
        }
    }

    #[tokio::test]
    async fn serves_a_ranged_request() {
        let server = FileProviderServer::bind().await.unwrap();
        let handler = Arc::new(StaticHandler {
            data: (0u8..100).collect(),
        });
        let _guard = server.register("s1", handler);

        let client = reqwest::Client::new();
        let url = format!("http://{}/?state=s1&file=known", server.endpoint());
        let response = client.get(url).header("Range", "bytes=10-19").send().await.unwrap();

        assert_eq!(response.status(), 206);
        assert_eq!(
            response.headers().get("Content-Range").unwrap(),
            "bytes 10-19/100"
        );
        let body = response.bytes().await.unwrap();
        assert_eq!(&body[..], &(10u8..20).collect::<Vec<_>>()[..]);
    }

    #[tokio::test]
    async fn rejects_mismatched_state_with_forbidden() {
        let server = FileProviderServer::bind().await.unwrap();
        let handler = Arc::new(StaticHandler { data: vec![1, 2, 3] });
        let _guard = server.register("known-state", handler);

        let url = format!("http://{}/?state=wrong&file=known", server.endpoint());
        let response = reqwest::get(url).await.unwrap();
        assert_eq!(response.status(), 403);
    }

    #[tokio::test]
    async fn unknown_file_id_is_not_found() {
        let server = FileProviderServer::bind().await.unwrap();
        let handler = Arc::new(StaticHandler { data: vec![1, 2, 3] });
        let _guard = server.register("s2", handler);

        let url = format!("http://{}/?state=s2&file=missing", server.endpoint());
        let response = reqwest::get(url).await.unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn out_of_bounds_range_is_rejected() {
        let server = FileProviderServer::bind().await.unwrap();
        let handler = Arc::new(StaticHandler { data: vec![1, 2, 3] });
        let _guard = server.register("s3", handler);

        let client = reqwest::Client::new();
        let url = format!("http://{}/?state=s3&file=known", server.endpoint());
        let response = client.get(url).header("Range", "bytes=10-20").send().await.unwrap();
        assert_eq!(response.status(), 416);
    }
}
