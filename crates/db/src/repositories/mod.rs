//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that accept
//! `&PgPool` as the first argument. Every state transition that must not race
//! (session rotation, OTP and reset-token consumption) is a single
//! conditional `UPDATE ... RETURNING`.

pub mod attempt_repo;
pub mod otp_repo;
pub mod reset_token_repo;
pub mod session_repo;
pub mod user_repo;

pub use attempt_repo::AttemptRepo;
pub use otp_repo::OtpRepo;
pub use reset_token_repo::ResetTokenRepo;
pub use session_repo::SessionRepo;
pub use user_repo::UserRepo;
