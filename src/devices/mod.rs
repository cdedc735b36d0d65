//! Device models implementing the problem-part contract.

/// Residential base-load profile generator.
pub mod baseload;
/// Stationary battery storage model.
pub mod battery;
/// Combined heat and power unit.
pub mod chp;
/// Electric vehicle charger model.
pub mod ev_charger;
pub mod hot_water_demand;
/// Hot water storage tank.
pub mod hot_water_tank;
/// Photovoltaic generation model.
pub mod solar;
pub mod types;

// Re-export the main types for convenience
pub use baseload::BaseLoad;
pub use battery::{Battery, BatteryMode};
pub use chp::Chp;
pub use ev_charger::{EvCharger, EvSession, EvSessionRanges};
pub use hot_water_demand::HotWaterDemand;
pub use hot_water_tank::HotWaterTank;
pub use solar::PvSystem;
pub use types::{DeviceId, PartBase, ProblemPart, StepInput, day_fraction, gaussian_noise};
