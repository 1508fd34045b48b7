//! A request/response latency harness: a server that runs one of a fixed set
//! of introspection commands per connection and aggregates timing, and a
//! client that drives it with batches of concurrent connections.

pub mod action;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod server;
pub mod stats;

pub use action::{Action, Catalog, CommandSpec};
pub use client::{BatchReport, Exchange, Launcher};
pub use config::Config;
pub use executor::{CommandExecutor, RunningCommand, SystemExecutor};
pub use server::{RunState, Server, ServerHandle};
pub use stats::{Aggregator, Summary};
