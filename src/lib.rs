//! tpch-runner - TPC-H power tests and answer validation across database backends.
//!
//! This library exposes the core modules for use by the binary and integration tests.

pub mod artifact;
pub mod cli;
pub mod commands;
pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod tpch;
