#![forbid(unsafe_code)]

//! Time-synchronized flash-sale checkout client.

pub mod auth;
pub mod clock;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod pipeline;
pub mod reserve;
pub mod session;
pub mod timing;
pub mod transport;
pub mod wire;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
