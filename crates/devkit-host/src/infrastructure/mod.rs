//! Infrastructure layer for the host application.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `devkit_core`, but MUST NOT be imported by the `application` or domain
//! layers.
//!
//! # Sub-modules
//!
//! - **`remote`** – Implementations of `RemoteQueryPort`.  The scripted port
//!   replays a fixed sequence of answers and is used by tests and by the
//!   `watch` command's simulated device.
//!
//! - **`observers`** – Ready-made `StateObserver`s: forward to a Tokio
//!   channel, write a log record, or record in memory.
//!
//! - **`storage`** – TOML configuration persistence.

pub mod observers;
pub mod remote;
pub mod storage;
