//! Persistent storage adapters for the host.
//!
//! - **`config`** – Reads and writes the TOML configuration file from the
//!   platform-appropriate location.

pub mod config;
