//! Sync layer: the remote triage store and its HTTP client.

mod form;
mod store;

#[cfg(feature = "http")]
pub mod http;

pub use form::UpsertForm;
pub use store::{RemoteStore, UNREACHABLE_MESSAGE, UpsertOutcome};

#[cfg(feature = "http")]
pub use http::{DEFAULT_BACKEND_URL, HttpRemoteStore, SyncError};
