//! Delivery channels for auth notices.

pub mod email;
pub mod log;
pub mod memory;
