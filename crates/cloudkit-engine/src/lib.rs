//! The generic async request engine: single-flight
//! re-authorization retry, a concurrency cap, cooperative per-request
//! cancellation, and a shutdown drain across every in-flight request.

pub mod engine;

pub use engine::RequestEngine;
