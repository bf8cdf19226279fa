//! Client side of the Crowdship session protocol.
//!
//! - [`api::AuthClient`] -- wraps every API call so a `401` triggers at most
//!   one silent refresh and one retry, with concurrent refreshes coalesced.
//! - [`coordinator::SessionCoordinator`] -- the session-timeout state
//!   machine (`Active` → `WarningShown` → `LoggedOut`) driven by a warning
//!   timer and a hard-logout timer.

pub mod api;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod transport;
pub mod types;

pub use api::AuthClient;
pub use coordinator::{SessionBackend, SessionCoordinator, SessionState, TimeoutPolicy};
pub use credentials::{CredentialStore, Credentials, MemoryCredentialStore};
pub use error::ClientError;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
