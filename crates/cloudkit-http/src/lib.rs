//! One-shot HTTP exchanges with progress, cooperative cancellation and
//! proactive 429 rate limiting.
//!
//! [`HttpEngine`] is the shared, immutable collaborator every provider
//! adapter drives through `cloudkit-engine`: it builds and sends exactly
//! one HTTP exchange per call, reports (total, current) progress for
//! uploads and downloads, and aborts cooperatively via a
//! `tokio_util::sync::CancellationToken` rather than polling an abort
//! predicate per tick (the async-native equivalent of spec's "abort
//! predicate polled per transfer tick").

pub mod engine;
pub mod rate_limit;
pub mod status;

pub use engine::{HttpEngine, HttpRequestSpec, HttpResponse, ProgressCallback};
pub use rate_limit::{AdaptiveRateLimiter, RateLimitConfig};
