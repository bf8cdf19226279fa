//! Domain primitives shared by the Crowdship auth crates.
//!
//! Nothing in here performs I/O: the error taxonomy, id/timestamp aliases,
//! role names, hashing helpers, secret generation and identity rules are
//! consumed by `crowdship-db`, `crowdship-api` and `crowdship-client` alike.

pub mod attempts;
pub mod error;
pub mod hashing;
pub mod identity;
pub mod otp;
pub mod roles;
pub mod sessions;
pub mod types;
