//! Command handlers, one module per command group.

pub mod db;
pub mod generate;
pub mod power;
pub mod results;
pub mod run;
