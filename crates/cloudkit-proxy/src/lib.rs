//! The streaming proxy for opaque providers: turns a provider's
//! push-style `download_file` into a pull-style HTTP response body.
//!
//! [`cloudkit_server::FileProviderServer`] owns the HTTP plumbing (range
//! parsing, state dispatch, status codes); this crate owns the bounded
//! buffer that bridges a provider's synchronous-feeling callback-driven
//! download and an async `Stream` response body.

pub mod buffer;
pub mod handler;
pub mod sink;

pub use buffer::{ProxyBuffer, ProxyBufferStream};
pub use handler::StreamingProxyHandler;
pub use sink::BufferDownloadSink;
