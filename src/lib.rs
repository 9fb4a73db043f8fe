//! Client for long-running story video generation jobs.
//!
//! A [`TaskClient`] submits one [`GenerationRequest`] to the job API, polls
//! the task on a fixed interval until it succeeds, fails, times out or is
//! cancelled, and publishes every step as a [`ClientSession`] on a watch
//! channel for whatever UI is listening.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod tasks;

pub use auth::{NoAuth, StaticToken, TokenProvider};
pub use config::{load_config, ClientConfig, ResultSource};
pub use error::{ApiError, ConfigError, GenerationError};
pub use tasks::session::{ClientSession, GenerationResult, Phase};
pub use tasks::state::TaskState;
pub use tasks::{GenerationRequest, TaskClient, UserId, Voice};
