//! devkit-host library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does devkit-host do? (for beginners)
//!
//! The *host* is the developer or lab machine that drives a remote test
//! device.  Most host operations are a single request to the device, but
//! watching a package's execution state is not: the device has no push
//! channel, so the host polls it and turns the answers into change events.
//!
//! The host library:
//!
//! 1. Runs one background poll loop per watched package
//!    ([`application::monitor::ExecutionStateMonitor`]), started by the first
//!    subscriber and stopped by the last.
//! 2. Keeps short network drops invisible to observers while reporting a
//!    broken channel exactly once.
//! 3. Provides ready-made observers (channel, logging, recording), a scripted
//!    device for tests and demos, and TOML configuration.

/// Application layer: the execution-state monitor and its registry.
pub mod application;

/// Infrastructure layer: device adapters, observers, and configuration storage.
pub mod infrastructure;
