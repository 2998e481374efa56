//! Concrete [`cloudkit_core::ports::CloudProvider`] adapters.
//!
//! - [`onedrive`] - Microsoft Graph via OAuth2 + PKCE.
//! - [`mega`] - the opaque-provider / streaming-proxy pattern: no direct
//!   HTTP request for a download, a relayed URL instead.
//! - [`testutil`] - a minimal credential-string double for tests elsewhere
//!   in the workspace that need a `CloudProvider` without real network
//!   calls.

pub mod mega;
pub mod onedrive;
pub mod testutil;
