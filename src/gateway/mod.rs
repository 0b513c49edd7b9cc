//! Chat-completions front end: one coordination turn per request, streamed
//! back as chunks with stage progress in `custom_content.stages`.

pub mod auth;
mod handler;
mod server;
pub mod streaming;
pub mod types;

pub use server::{build_app, run_gateway, run_gateway_with_listener};

use crate::config::Config;
use std::sync::Arc;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}
