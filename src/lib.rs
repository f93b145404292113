//! runwatch - runs a command, watches its output and turns it into batched
//! notifications for chat and webhook destinations.
//!
//! The pipeline is: child process → [`sanitize`] → filter and [`redaction`]
//! → [`notification::Aggregator`] → [`notification::Dispatcher`] → one
//! [`core::Destination`] client per enabled target.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod events;
pub mod formatting;
pub mod matching;
pub mod notification;
pub mod outputs;
pub mod redaction;
pub mod runner;
pub mod sanitize;
pub mod task_manager;
pub mod utils;

// Re-export core types for convenience
pub use core::*;
