//! The auth state machine's states.

use cloudkit_core::domain::CloudError;

/// `Unauthenticated → AwaitingCode → Exchanging → Authenticated → Refreshing
/// → Authenticated | Failed`. `Refreshing` is also reachable directly from
/// `Unauthenticated` when a refresh token survived from a previous session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    AwaitingCode,
    Exchanging,
    Authenticated,
    Refreshing,
    Failed(CloudError),
}
