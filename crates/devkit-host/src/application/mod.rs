//! Application layer use cases for the host.
//!
//! # Sub-modules
//!
//! - **`monitor`** – Polls one remote entity's execution state on a
//!   dedicated worker thread and fans out change events to observers.  The
//!   device query is reached through the [`monitor::RemoteQueryPort`] trait,
//!   which is injected at construction time.
//!
//! - **`registry`** – Hands out one monitor per entity handle so that callers
//!   watching the same package share a single poll loop, while different
//!   packages stay fully independent.

pub mod monitor;
pub mod registry;
