#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod agents;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod prompts;
pub mod stage;

pub use config::Config;
pub use coordinator::{Coordinator, FinalReply};
pub use error::CoordinatorError;
