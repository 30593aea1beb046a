//! Tables, checkpointed fetching and merging for hydropower site data.
//!
//! This crate turns a location set and an indicator source into a
//! per-indicator CSV table, resuming from a checkpoint when one exists, and
//! joins the per-indicator tables into the final labeled dataset.

pub mod checkpoint;
pub mod error;
pub mod fetch_loop;
pub mod merge;
pub mod table;

pub use error::{DataError, Result};
