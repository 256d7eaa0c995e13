//! # devkit-core
//!
//! Shared library for the devkit host tools containing the device path
//! grammar and the execution-state domain types.
//!
//! This crate is used by the host application and by anything else that
//! needs to build remote paths or reason about remote package state.
//! It has zero dependencies on OS APIs, threads, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! The host side drives a remote test device (a "devkit") over a narrow
//! command/query channel.  Almost every remote operation takes a path on the
//! device's virtual filesystem, and several long-running operations need to
//! know what state a remote package is in.
//!
//! This crate (`devkit-core`) is the shared foundation.  It defines:
//!
//! - **`domain::path`** – How device paths are written.  A device path is
//!   rooted at an *origin* token (`xd:` or `{PackageFamilyName}:`) and uses
//!   backslash separators.  The module validates, splits and combines such
//!   paths without ever touching the device.
//!
//! - **`domain::execution`** – The lifecycle phases a remote package moves
//!   through (`Constrained`, `Running`, `Suspended`, ...), the event emitted
//!   when that phase changes, and the error type returned by a state query.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `devkit_core::DevicePath` instead of `devkit_core::domain::path::DevicePath`.
pub use domain::execution::{
    EntityHandle, ExecutionState, ParseStateError, QueryError, StateChangeEvent,
};
pub use domain::path::{DevicePath, Origin, PathContext, PathError};
