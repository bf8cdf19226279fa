//! Row types and insert DTOs, one module per table family.

pub mod attempt;
pub mod otp;
pub mod reset;
pub mod session;
pub mod user;
