//! jobtrack CLI - library half of the `jobtrack` binary
//!
//! - `simulate`: drive seeded fake jobs through a real tracker
//! - `list` / `clear`: inspect and prune the persisted task file
//! - `watch` (feature `http`): follow one remote job until it ends

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod commands;
pub mod config;
pub mod simulate;

pub use config::JobtrackConfig;
pub use simulate::{generate_plans, JobPlan, SimulateOptions, SimulationSummary};

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "jobtrack=info";

/// Install the global subscriber, logging to stderr
///
/// Does nothing if a subscriber is already installed.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing already initialised");
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
