//! Shared response plumbing: every route on every server answers with the
//! same boxed body type so `serve_connection` doesn't need a kind-specific
//! service function.

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{Response, StatusCode};

pub type RespBody = BoxBody<Bytes, std::io::Error>;

pub fn html(status: StatusCode, body: String) -> Response<RespBody> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(
            Full::new(Bytes::from(body))
                .map_err(|e| match e {})
                .boxed(),
        )
        .expect("static response parts are always valid")
}

pub fn empty(status: StatusCode) -> Response<RespBody> {
    Response::builder()
        .status(status)
        .body(Empty::<Bytes>::new().map_err(|e| match e {}).boxed())
        .expect("static response parts are always valid")
}
