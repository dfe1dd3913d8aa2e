//! Generator-driven code execution: a reply's `main` fragment runs in a
//! persistent embedded Rhai context and the structured result is fed back,
//! round after round, until the task is done.

pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod execution;
pub mod llm;
pub mod printer;
pub mod role;
pub mod task;
pub mod telemetry;
pub mod utils;

pub use error::{Error, Result};
