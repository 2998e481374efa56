//! The loopback HTTP server factory.
//!
//! Two server kinds share the same `hyper`/`hyper-util`/`http-body-util`
//! accept-loop shape: [`AuthorizationServer`] serves OAuth redirect
//! landing pages and multiplexes concurrent auth flows on one socket by
//! `state`; [`FileProviderServer`] hosts the streaming proxy and
//! multiplexes concurrently-downloading providers the same way. Neither
//! type knows about the other's handlers; `cloudkit-auth` registers with
//! the former, `cloudkit-providers`/`cloudkit-proxy` with the latter.

pub mod authorization;
pub mod file_provider;
mod response;

pub use authorization::{AuthorizationHandler, AuthorizationServer};
pub use file_provider::{parse_range, FileProviderHandler, FileProviderServer, ProxyBody, ProxyResponse};
