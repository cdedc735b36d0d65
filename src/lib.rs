//! Household energy schedule optimizer.
//!
//! Devices are simulated tick by tick over electrical and thermal grids while
//! a search algorithm looks for the schedule with the lowest cost.

pub mod cli;
pub mod commodity;
pub mod config;
pub mod devices;
pub mod error;
/// File output.
pub mod io {
    pub mod export;
}
pub mod scenario;
/// Evaluation, grids, search and ranking.
pub mod sim;

pub use error::{Error, Result};
