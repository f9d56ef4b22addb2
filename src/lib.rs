//! Rivet: Interactive Rhai Scripting Sessions
//!
//! A scripting session runtime: dependency resolution into a loading scope, context
//! generations built on top of it, a single-flight execution serializer, and output capture
//! with a session transcript and environment snapshots.

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod report;
pub mod resolver;
pub mod session;
pub mod watch;
