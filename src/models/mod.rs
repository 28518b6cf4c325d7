//! Domain models for sessions, chunk uploads, and transfer outcomes.

pub mod chunk;
pub mod session;
pub mod transfer;
