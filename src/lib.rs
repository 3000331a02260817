//! Declarative HTTP load generation.
//!
//! A configuration file declares a map of named scenarios (executor, rate,
//! time unit, duration, VU bounds) and a target URL. [`TestRun`] replays
//! every scenario concurrently, each iteration performing one GET, and
//! returns a [`metrics::Summary`].

pub mod action;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod runner;
pub mod telemetry;

pub use action::{Action, HttpGetAction};
pub use config::Config;
pub use error::{IterationError, LoadgenError};
pub use runner::TestRun;
