//! Domain entities for the devkit host tools.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain** (or "entities" layer).  Domain code:
//!
//! - Contains the core rules of the application.
//! - Has **no** imports from OS APIs, network libraries, or threading code.
//! - Can be compiled and tested on any platform without a device attached.
//!
//! Code in outer layers (the monitor, the CLI, device adapters) depends on the
//! domain, but the domain never depends on them.

/// Execution states, state-change events and query errors.
pub mod execution;

/// Device path grammar.
///
/// See [`path::DevicePath`] for the main type.
pub mod path;
