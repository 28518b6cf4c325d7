#![forbid(unsafe_code)]

pub mod assembler;
pub mod checksum;
pub mod config;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod sanitize;
pub mod transfer;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
