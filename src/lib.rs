//! Training job lifecycle manager.
//!
//! Accepts training-job submissions from authenticated callers, persists
//! them, hands each one to a work queue, and tracks status reported back
//! by the execution side.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod queue;

pub use config::Config;
pub use error::{JobError, Result};
