//! Device query adapters.
//!
//! The real device adapter lives outside this crate and is selected per
//! device SDK version.  This module carries the in-process implementations.

pub mod scripted;

pub use scripted::{parse_script, ScriptError, ScriptStep, ScriptedQueryPort};
