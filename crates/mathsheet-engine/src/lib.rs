//! mathsheet_engine - Worksheet expression engine + Rhai integration.

pub(crate) mod builtins;
pub mod engine;
pub mod units;
