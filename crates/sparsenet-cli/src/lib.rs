//! sparsenet CLI crate
//!
//! Commands (see [commands]):
//! - init: write a commented example configuration.
//! - run: load a TOML [`SimulationConfig`](sparsenet_engine::SimulationConfig), run it,
//!   export the trajectory and optionally the final connectivity.
//! - sweep: the same configuration over many seeds in parallel, one trajectory
//!   per seed plus a `summary.json`.
//! - stats: summary statistics of an exported trajectory as JSON.
//!
//! The binary (src/main.rs) wires up logging and argument parsing and calls
//! [`SparsenetCli::execute`]; the library surface exists for integration tests.

pub mod commands;
pub mod config;
pub mod error;

pub use commands::SparsenetCli;
