//! The auth state machine: holds tokens, drives the OAuth2
//! code/refresh exchange through a [`cloudkit_core::ports::CloudProvider`],
//! and coalesces concurrent 401s onto a single in-flight refresh.

pub mod credential;
pub mod machine;
mod pages;
pub mod state;

pub use machine::{AuthMachine, ConsentCallback};
pub use state::AuthState;
