//! Collaborator contracts shared by the network access layer.
//!
//! The access crate never reaches into global application state. Everything
//! it consumes from the surrounding app (secret storage, reachability, the
//! logout action) is described here as a trait and injected at construction.

pub mod connectivity;
pub mod errors;
pub mod secrets;
pub mod session;

pub use connectivity::{ConnectivityFlag, ConnectivityProvider};
pub use errors::{Error, Result};
pub use secrets::{InMemorySecretStore, SecretStore};
pub use session::{SessionListener, SessionSignal};
