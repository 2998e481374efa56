//! Port definitions (hexagonal architecture interfaces)
//!
//! - [`CloudProvider`] - the per-backend adapter contract
//! - [`DownloadSink`]/[`ByteRange`] - streaming transfer callbacks
//! - [`SupportedOps`] - the capability bitset an adapter reports

pub mod cloud_provider;
pub mod supported_ops;
pub mod transfer;

pub use cloud_provider::{AuthConsent, CloudProvider, GeneralData};
pub use supported_ops::SupportedOps;
pub use transfer::{BufferSink, ByteRange, DownloadSink, UploadProgress};
