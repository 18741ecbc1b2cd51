//! Integration tests for tpch-runner.
//!
//! Everything runs against SQLite files in temporary directories. Tests that
//! need a PostgreSQL or MySQL server are skipped unless `TPCH_TEST_PG_URL` or
//! `TPCH_TEST_MYSQL_URL` is set.

pub mod commands_test;
pub mod common;
pub mod compare_test;
pub mod connection_test;
#[cfg(feature = "duckdb")]
pub mod duckdb_test;
pub mod runner_test;
pub mod store_test;
