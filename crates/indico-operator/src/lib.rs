//! Indico Operator - command line front end
//!
//! Wires the library crates into a binary:
//! - `validate` checks a scenario file's configuration and readiness
//! - `render` runs one pass and prints the resulting service topology
//! - `simulate` races several replicas over one shared store

pub mod logging;
pub mod scenario;
pub mod simulation;

pub use logging::{init_logging, LogFormat};
pub use scenario::{Scenario, Validation, DEFAULT_REPLICA};
pub use simulation::{run_simulator, SimulatorConfig, SimulatorReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
