//! Core domain types and port traits for the cloud-storage client engine.
//!
//! This crate contains the hexagonal architecture core:
//! - **Domain types** - `Item`, `Token`, `PageData`, `CloudError` and the
//!   validated newtypes wrapping provider identifiers and paths.
//! - **Port definitions** - the `CloudProvider` trait every adapter
//!   implements, plus the small callback traits used for streaming
//!   transfers.
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external
//! dependencies beyond validation. Ports define trait interfaces that
//! adapter crates (`cloudkit-providers`) implement, driven by the engine
//! (`cloudkit-engine`) and exposed to callers via the facade
//! (`cloudkit-facade`).

pub mod domain;
pub mod ports;
