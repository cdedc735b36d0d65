/// Search algorithms and their executor.
pub mod algorithm;
/// Simulation clock for timestep management.
pub mod clock;
pub mod container;
/// Solution slicing per part.
pub mod distributor;
pub mod evaluator;
pub mod fitness;
/// Electrical and thermal energy grids.
pub mod grid;
pub mod kpi;
pub mod logger;
pub mod meter;
pub mod ranking;
/// Per-device schedules of a finished optimization.
pub mod schedule;
pub mod signals;
pub mod solver;
pub mod state_map;
