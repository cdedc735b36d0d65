//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::commodity::{AncillaryCommodity, Commodity};
use crate::devices::BatteryMode;
use crate::sim::algorithm::{GeneticParams, RandomSearch};
use crate::sim::ranking::RankingConfig;
use crate::sim::signals::{LimitWindow, PriceWindow};

/// Top-level scenario configuration parsed from TOML.
///
/// Load from TOML with [`ScenarioConfig::from_toml_file`] or use one of the
/// [`ScenarioConfig::PRESETS`] via [`ScenarioConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Time window, step size and solver settings.
    pub optimization: OptimizationConfig,
    /// How the final candidate set is ranked.
    pub ranking: RankingConfig,
    /// Search algorithms, run in order.
    pub algorithms: Vec<AlgorithmConfig>,
    /// Energy cost fitness parameters.
    pub fitness: FitnessConfig,
    /// Devices taking part in the optimization.
    pub devices: Vec<DeviceConfig>,
    /// Grid topologies referring to devices by name.
    pub grid: GridsConfig,
    /// Price signals per ancillary commodity.
    pub prices: Vec<PriceConfig>,
    /// Power limits per ancillary commodity.
    pub limits: Vec<LimitConfig>,
}

/// Time window and solver settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizationConfig {
    /// First simulated tick (seconds).
    pub reference_time: u64,
    /// Last tick at which schedules may change (seconds).
    pub horizon: u64,
    /// Seconds between two simulated steps (must be > 0).
    pub step_size: u64,
    /// Ticks before this are simulated but not billed.
    pub optimization_start: u64,
    /// Pool containers for parallel evaluation.
    pub multithreaded: bool,
    /// Master random seed for devices and algorithms.
    pub seed: u64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            reference_time: 0,
            horizon: 86_400 - 900,
            step_size: 900,
            optimization_start: 0,
            multithreaded: true,
            seed: 42,
        }
    }
}

/// One configured search algorithm.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    Genetic(GeneticParams),
    Random(RandomSearch),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitnessConfig {
    /// Cost per kWh outside a power limit.
    pub limit_penalty_per_kwh: f64,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            limit_penalty_per_kwh: 1.0,
        }
    }
}

/// A named device and its model parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Name used by grid relations.
    pub name: String,
    /// Explicit id; derived from the device's position when absent.
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(flatten)]
    pub kind: DeviceKind,
}

/// Supported device models with their parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceKind {
    BaseLoad(BaseLoadConfig),
    PvSystem(PvConfig),
    Battery(BatteryConfig),
    EvCharger(EvConfig),
    Chp(ChpConfig),
    HotWaterTank(TankConfig),
    HotWaterDemand(HotWaterDemandConfig),
}

impl DeviceKind {
    /// Model name as used in scenario files.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::BaseLoad(_) => "base_load",
            DeviceKind::PvSystem(_) => "pv_system",
            DeviceKind::Battery(_) => "battery",
            DeviceKind::EvCharger(_) => "ev_charger",
            DeviceKind::Chp(_) => "chp",
            DeviceKind::HotWaterTank(_) => "hot_water_tank",
            DeviceKind::HotWaterDemand(_) => "hot_water_demand",
        }
    }
}

/// Baseload device parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaseLoadConfig {
    /// Baseline consumption (W).
    pub base_w: f64,
    /// Sinusoidal amplitude (W).
    pub amp_w: f64,
    /// Phase offset (radians).
    pub phase_rad: f64,
    /// Gaussian noise standard deviation (W).
    pub noise_std_w: f64,
    /// cos(phi), within (0, 1].
    pub power_factor: f64,
    /// Exclude the load from simulation.
    pub completely_static: bool,
}

impl Default for BaseLoadConfig {
    fn default() -> Self {
        Self {
            base_w: 600.0,
            amp_w: 300.0,
            phase_rad: 1.2,
            noise_std_w: 40.0,
            power_factor: 0.95,
            completely_static: false,
        }
    }
}

/// PV system parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PvConfig {
    /// Peak generation (W).
    pub peak_w: f64,
    /// Sunrise, seconds of the day (inclusive).
    pub sunrise_s: u64,
    /// Sunset, seconds of the day (exclusive).
    pub sunset_s: u64,
    /// Noise as a fraction of output.
    pub noise_std: f64,
}

impl Default for PvConfig {
    fn default() -> Self {
        Self {
            peak_w: 5_000.0,
            sunrise_s: 6 * 3600,
            sunset_s: 18 * 3600,
            noise_std: 0.05,
        }
    }
}

/// Battery storage parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    pub mode: BatteryMode,
    /// Total energy capacity (Wh).
    pub capacity_wh: f64,
    /// Initial state of charge (0.0–1.0).
    pub initial_soc: f64,
    pub max_charge_w: f64,
    pub max_discharge_w: f64,
    pub eta_charge: f64,
    pub eta_discharge: f64,
    /// Cost per kWh ending below the initial charge.
    pub penalty_per_kwh: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            mode: BatteryMode::Scheduled,
            capacity_wh: 10_000.0,
            initial_soc: 0.5,
            max_charge_w: 5_000.0,
            max_discharge_w: 5_000.0,
            eta_charge: 0.95,
            eta_discharge: 0.95,
            penalty_per_kwh: 0.30,
        }
    }
}

/// EV charger parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvConfig {
    pub max_charge_w: f64,
    pub demand_wh_min: f64,
    pub demand_wh_max: f64,
    /// Minimum dwell duration (steps).
    pub dwell_steps_min: usize,
    /// Maximum dwell duration (steps).
    pub dwell_steps_max: usize,
    /// Cost per kWh missing at departure.
    pub penalty_per_kwh: f64,
}

impl Default for EvConfig {
    fn default() -> Self {
        Self {
            max_charge_w: 7_200.0,
            demand_wh_min: 4_000.0,
            demand_wh_max: 14_000.0,
            dwell_steps_min: 12,
            dwell_steps_max: 40,
            penalty_per_kwh: 1.0,
        }
    }
}

/// CHP parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChpConfig {
    pub electrical_w: f64,
    pub thermal_w: f64,
    pub gas_w: f64,
    pub on_below_c: f64,
    pub off_above_c: f64,
    pub max_temp_c: f64,
    pub start_cost: f64,
}

impl Default for ChpConfig {
    fn default() -> Self {
        Self {
            electrical_w: 1_000.0,
            thermal_w: 2_500.0,
            gas_w: 4_000.0,
            on_below_c: 55.0,
            off_above_c: 70.0,
            max_temp_c: 80.0,
            start_cost: 0.05,
        }
    }
}

/// Hot water tank parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TankConfig {
    pub volume_l: f64,
    pub initial_temp_c: f64,
    pub ambient_temp_c: f64,
    pub loss_w_per_k: f64,
    pub min_temp_c: f64,
    pub penalty_per_kelvin_hour: f64,
}

impl Default for TankConfig {
    fn default() -> Self {
        Self {
            volume_l: 300.0,
            initial_temp_c: 60.0,
            ambient_temp_c: 20.0,
            loss_w_per_k: 2.0,
            min_temp_c: 45.0,
            penalty_per_kelvin_hour: 0.10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HotWaterDemandConfig {
    /// Heat drawn per day (Wh).
    pub daily_energy_wh: f64,
}

impl Default for HotWaterDemandConfig {
    fn default() -> Self {
        Self {
            daily_energy_wh: 6_000.0,
        }
    }
}

/// Electrical and thermal topologies; an absent grid is not built.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridsConfig {
    pub electrical: Option<GridConfig>,
    pub thermal: Option<GridConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub meters: Vec<MeterConfig>,
    pub relations: Vec<RelationConfig>,
    /// Use the single-meter fast path where it applies (electrical only).
    pub fast_path: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            meters: Vec::new(),
            relations: Vec::new(),
            fast_path: true,
        }
    }
}

/// A meter and the special device types attached to it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeterConfig {
    pub name: String,
    pub pv: Vec<String>,
    pub chp: Vec<String>,
    pub battery: Vec<String>,
}

/// Relation between an active device and a passive device or meter.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationConfig {
    pub active: String,
    pub passive: String,
    /// Commodity flowing from active to passive.
    pub commodity: Commodity,
    /// Commodity flowing back; defaults to `commodity`.
    #[serde(default)]
    pub back: Option<Commodity>,
}

/// Piecewise-constant price for one ancillary commodity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceConfig {
    pub commodity: AncillaryCommodity,
    /// Price per kWh outside every window.
    pub default: f64,
    #[serde(default)]
    pub windows: Vec<PriceWindow>,
}

/// Power limits for one ancillary commodity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitConfig {
    pub commodity: AncillaryCommodity,
    #[serde(default)]
    pub windows: Vec<LimitWindow>,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"optimization.step_size"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn relation(active: &str, passive: &str, commodity: Commodity) -> RelationConfig {
    RelationConfig {
        active: active.to_string(),
        passive: passive.to_string(),
        commodity,
        back: None,
    }
}

fn device(name: &str, kind: DeviceKind) -> DeviceConfig {
    DeviceConfig {
        name: name.to_string(),
        id: None,
        kind,
    }
}

/// Day and evening tariff with a cheaper feed-in for export.
fn household_prices() -> Vec<PriceConfig> {
    vec![
        PriceConfig {
            commodity: AncillaryCommodity::ActivePowerExternal,
            default: 0.28,
            windows: vec![PriceWindow {
                start: 17 * 3600,
                end: 21 * 3600,
                price: 0.42,
            }],
        },
        PriceConfig {
            commodity: AncillaryCommodity::PvActivePowerFeedIn,
            default: 0.08,
            windows: Vec::new(),
        },
        PriceConfig {
            commodity: AncillaryCommodity::BatteryActivePowerFeedIn,
            default: 0.08,
            windows: Vec::new(),
        },
    ]
}

impl ScenarioConfig {
    /// Available preset names.
    pub const PRESETS: &[&str] = &["household", "chp_household"];

    /// Base load, PV, battery and EV charger behind one electrical meter.
    pub fn household() -> Self {
        let electrical = GridConfig {
            meters: vec![MeterConfig {
                name: "house".to_string(),
                pv: vec!["pv".to_string()],
                battery: vec!["battery".to_string()],
                ..MeterConfig::default()
            }],
            relations: vec![
                relation("base_load", "house", Commodity::ActivePower),
                relation("base_load", "house", Commodity::ReactivePower),
                relation("pv", "house", Commodity::ActivePower),
                relation("battery", "house", Commodity::ActivePower),
                relation("ev", "house", Commodity::ActivePower),
            ],
            fast_path: true,
        };
        Self {
            optimization: OptimizationConfig::default(),
            ranking: RankingConfig::default(),
            algorithms: vec![AlgorithmConfig::Genetic(GeneticParams::default())],
            fitness: FitnessConfig::default(),
            devices: vec![
                device("base_load", DeviceKind::BaseLoad(BaseLoadConfig::default())),
                device("pv", DeviceKind::PvSystem(PvConfig::default())),
                device("battery", DeviceKind::Battery(BatteryConfig::default())),
                device("ev", DeviceKind::EvCharger(EvConfig::default())),
            ],
            grid: GridsConfig {
                electrical: Some(electrical),
                thermal: None,
            },
            prices: household_prices(),
            limits: vec![LimitConfig {
                commodity: AncillaryCommodity::ActivePowerExternal,
                windows: vec![LimitWindow {
                    start: 0,
                    end: 86_400,
                    lower: -8_000.0,
                    upper: 11_000.0,
                }],
            }],
        }
    }

    /// The household preset plus a CHP heating a hot water tank.
    pub fn chp_household() -> Self {
        let mut cfg = Self::household();
        cfg.devices.extend([
            device("chp", DeviceKind::Chp(ChpConfig::default())),
            device("tank", DeviceKind::HotWaterTank(TankConfig::default())),
            device(
                "hot_water",
                DeviceKind::HotWaterDemand(HotWaterDemandConfig::default()),
            ),
        ]);
        if let Some(electrical) = cfg.grid.electrical.as_mut() {
            electrical
                .relations
                .push(relation("chp", "house", Commodity::ActivePower));
            if let Some(meter) = electrical.meters.first_mut() {
                meter.chp.push("chp".to_string());
            }
        }
        cfg.grid.thermal = Some(GridConfig {
            meters: vec![MeterConfig {
                name: "gas".to_string(),
                ..MeterConfig::default()
            }],
            relations: vec![
                relation("chp", "tank", Commodity::HeatingHotWaterPower),
                relation("hot_water", "tank", Commodity::DomesticHotWaterPower),
                relation("chp", "gas", Commodity::NaturalGasPower),
            ],
            fast_path: false,
        });
        cfg.prices.extend([
            PriceConfig {
                commodity: AncillaryCommodity::NaturalGasPowerExternal,
                default: 0.09,
                windows: Vec::new(),
            },
            PriceConfig {
                commodity: AncillaryCommodity::ChpActivePowerFeedIn,
                default: 0.10,
                windows: Vec::new(),
            },
        ]);
        cfg
    }

    /// Replaces the master seed and every algorithm's seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.optimization.seed = seed;
        for algorithm in &mut self.algorithms {
            match algorithm {
                AlgorithmConfig::Genetic(params) => params.seed = seed,
                AlgorithmConfig::Random(random) => random.seed = seed,
            }
        }
        self
    }

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "household" => Ok(Self::household()),
            "chp_household" => Ok(Self::chp_household()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let o = &self.optimization;

        if o.step_size == 0 {
            errors.push(ConfigError::new("optimization.step_size", "must be > 0"));
        }
        if o.horizon < o.reference_time {
            errors.push(ConfigError::new(
                "optimization.horizon",
                "must be >= optimization.reference_time",
            ));
        }
        if self.algorithms.is_empty() {
            errors.push(ConfigError::new("algorithms", "at least one algorithm is required"));
        }
        if self.devices.is_empty() {
            errors.push(ConfigError::new("devices", "at least one device is required"));
        }

        let mut names: Vec<&str> = Vec::new();
        for (i, d) in self.devices.iter().enumerate() {
            if names.contains(&d.name.as_str()) {
                errors.push(ConfigError::new(
                    format!("devices[{i}].name"),
                    format!("duplicate device name \"{}\"", d.name),
                ));
            }
            names.push(&d.name);
            validate_device(i, &d.kind, &mut errors);
        }

        for (grid_name, grid) in [
            ("electrical", &self.grid.electrical),
            ("thermal", &self.grid.thermal),
        ] {
            let Some(grid) = grid else { continue };
            let meters: Vec<&str> = grid.meters.iter().map(|m| m.name.as_str()).collect();
            for (i, r) in grid.relations.iter().enumerate() {
                if !names.contains(&r.active.as_str()) {
                    errors.push(ConfigError::new(
                        format!("grid.{grid_name}.relations[{i}].active"),
                        format!("unknown device \"{}\"", r.active),
                    ));
                }
                if !names.contains(&r.passive.as_str()) && !meters.contains(&r.passive.as_str()) {
                    errors.push(ConfigError::new(
                        format!("grid.{grid_name}.relations[{i}].passive"),
                        format!("unknown device or meter \"{}\"", r.passive),
                    ));
                }
            }
            for (i, m) in grid.meters.iter().enumerate() {
                if names.contains(&m.name.as_str()) {
                    errors.push(ConfigError::new(
                        format!("grid.{grid_name}.meters[{i}].name"),
                        format!("meter \"{}\" shadows a device", m.name),
                    ));
                }
                for attached in m.pv.iter().chain(&m.chp).chain(&m.battery) {
                    if !names.contains(&attached.as_str()) {
                        errors.push(ConfigError::new(
                            format!("grid.{grid_name}.meters[{i}]"),
                            format!("unknown device \"{attached}\""),
                        ));
                    }
                }
            }
        }

        for (i, p) in self.prices.iter().enumerate() {
            if !p.default.is_finite() {
                errors.push(ConfigError::new(format!("prices[{i}].default"), "must be finite"));
            }
            for (j, w) in p.windows.iter().enumerate() {
                validate_window(format!("prices[{i}].windows[{j}]"), w.start, w.end, &mut errors);
                if !w.price.is_finite() {
                    errors.push(ConfigError::new(
                        format!("prices[{i}].windows[{j}].price"),
                        "must be finite",
                    ));
                }
            }
        }
        for (i, l) in self.limits.iter().enumerate() {
            for (j, w) in l.windows.iter().enumerate() {
                let path = format!("limits[{i}].windows[{j}]");
                validate_window(path.clone(), w.start, w.end, &mut errors);
                // infinite bounds mean unbounded, NaN is never allowed
                if !(w.lower <= w.upper) {
                    errors.push(ConfigError::new(path, "lower must be <= upper"));
                }
            }
        }

        errors
    }
}

fn validate_window(path: String, start: u64, end: u64, errors: &mut Vec<ConfigError>) {
    if start >= end {
        errors.push(ConfigError::new(path, "start must be < end"));
    }
}

fn validate_device(i: usize, kind: &DeviceKind, errors: &mut Vec<ConfigError>) {
    let field = |name: &str| format!("devices[{i}].{name}");
    match kind {
        DeviceKind::BaseLoad(c) => {
            if !(c.power_factor > 0.0 && c.power_factor <= 1.0) {
                errors.push(ConfigError::new(field("power_factor"), "must be in (0.0, 1.0]"));
            }
        }
        DeviceKind::PvSystem(c) => {
            if c.sunrise_s >= c.sunset_s || c.sunset_s > 86_400 {
                errors.push(ConfigError::new(
                    field("sunrise_s"),
                    "must be < sunset_s, and sunset_s <= 86400",
                ));
            }
        }
        DeviceKind::Battery(c) => {
            if !(c.capacity_wh > 0.0 && c.capacity_wh.is_finite()) {
                errors.push(ConfigError::new(field("capacity_wh"), "must be > 0"));
            }
            if !(0.0..=1.0).contains(&c.initial_soc) {
                errors.push(ConfigError::new(field("initial_soc"), "must be in [0.0, 1.0]"));
            }
            if !(c.max_charge_w >= 0.0 && c.max_discharge_w >= 0.0) {
                errors.push(ConfigError::new(field("max_charge_w"), "power limits must be >= 0"));
            }
            for (name, eta) in [("eta_charge", c.eta_charge), ("eta_discharge", c.eta_discharge)] {
                if !(eta > 0.0 && eta <= 1.0) {
                    errors.push(ConfigError::new(field(name), "must be in (0.0, 1.0]"));
                }
            }
        }
        DeviceKind::EvCharger(c) => {
            if !(c.max_charge_w > 0.0 && c.max_charge_w.is_finite()) {
                errors.push(ConfigError::new(field("max_charge_w"), "must be > 0"));
            }
            if !(c.demand_wh_min >= 0.0 && c.demand_wh_min <= c.demand_wh_max) {
                errors.push(ConfigError::new(
                    field("demand_wh_min"),
                    "must be >= 0 and <= demand_wh_max",
                ));
            }
            if c.dwell_steps_min == 0 || c.dwell_steps_min > c.dwell_steps_max {
                errors.push(ConfigError::new(
                    field("dwell_steps_min"),
                    "must be > 0 and <= dwell_steps_max",
                ));
            }
        }
        DeviceKind::Chp(c) => {
            if !(c.on_below_c < c.off_above_c && c.off_above_c <= c.max_temp_c) {
                errors.push(ConfigError::new(
                    field("on_below_c"),
                    "must satisfy on_below_c < off_above_c <= max_temp_c",
                ));
            }
        }
        DeviceKind::HotWaterTank(c) => {
            if !(c.volume_l > 0.0 && c.volume_l.is_finite()) {
                errors.push(ConfigError::new(field("volume_l"), "must be > 0"));
            }
        }
        DeviceKind::HotWaterDemand(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let e = err.unwrap_err();
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn chp_preset_adds_thermal_grid() {
        let cfg = ScenarioConfig::chp_household();
        assert!(cfg.grid.thermal.is_some());
        assert_eq!(cfg.devices.len(), ScenarioConfig::household().devices.len() + 3);
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[optimization]
horizon = 3600
step_size = 900
seed = 99

[ranking]
strategy = "weighted_sum"
weights = [1.0]

[[algorithms]]
kind = "genetic"
population_size = 10
generations = 5

[[algorithms]]
kind = "random"
samples = 20

[[devices]]
name = "load"
kind = "base_load"
base_w = 400.0

[[devices]]
name = "pv"
id = "00000000-0000-0000-0000-000000000002"
kind = "pv_system"
peak_w = 3000.0

[[devices]]
name = "battery"
kind = "battery"
mode = "self_consumption"

[grid.electrical]
fast_path = false

[[grid.electrical.meters]]
name = "house"
pv = ["pv"]
battery = ["battery"]

[[grid.electrical.relations]]
active = "load"
passive = "house"
commodity = "ACTIVEPOWER"

[[grid.electrical.relations]]
active = "pv"
passive = "house"
commodity = "ACTIVEPOWER"

[[prices]]
commodity = "ACTIVEPOWEREXTERNAL"
default = 0.3

[[prices.windows]]
start = 0
end = 1800
price = 0.5

[[limits]]
commodity = "ACTIVEPOWEREXTERNAL"

[[limits.windows]]
start = 0
end = 3600
upper = 5000.0
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let Ok(cfg) = cfg else { return };
        assert_eq!(cfg.optimization.seed, 99);
        assert_eq!(cfg.optimization.reference_time, 0);
        assert_eq!(cfg.algorithms.len(), 2);
        assert_eq!(cfg.devices[1].id, Some(Uuid::from_u128(2)));
        assert!(matches!(
            &cfg.devices[2].kind,
            DeviceKind::Battery(b) if b.mode == BatteryMode::SelfConsumption
        ));
        assert_eq!(cfg.limits[0].windows[0].lower, f64::NEG_INFINITY);
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[optimization]
step_size = 900
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_catches_zero_step() {
        let mut cfg = ScenarioConfig::household();
        cfg.optimization.step_size = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "optimization.step_size"));
    }

    #[test]
    fn validation_catches_empty_signal_windows() {
        let toml = r#"
[optimization]
horizon = 3600
step_size = 900

[[algorithms]]
kind = "random"

[[devices]]
name = "load"
kind = "base_load"

[[prices]]
commodity = "ACTIVEPOWEREXTERNAL"
default = 0.3

[[prices.windows]]
start = 900
end = 900
price = 0.5

[[limits]]
commodity = "ACTIVEPOWEREXTERNAL"

[[limits.windows]]
start = 1800
end = 900
upper = 5000.0
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "TOML should parse: {:?}", cfg.err());
        let Ok(cfg) = cfg else { return };
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "prices[0].windows[0]"), "{errors:?}");
        assert!(errors.iter().any(|e| e.field == "limits[0].windows[0]"), "{errors:?}");
        assert!(crate::scenario::Scenario::build(&cfg).is_err());
    }

    #[test]
    fn validation_catches_nan_device_parameters() {
        let toml = r#"
[optimization]
horizon = 3600
step_size = 900

[[algorithms]]
kind = "random"

[[devices]]
name = "battery"
kind = "battery"
capacity_wh = nan

[[devices]]
name = "tank"
kind = "hot_water_tank"
volume_l = nan

[[devices]]
name = "ev"
kind = "ev_charger"
max_charge_w = nan
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "TOML should parse: {:?}", cfg.err());
        let Ok(cfg) = cfg else { return };
        let errors = cfg.validate();
        for field in [
            "devices[0].capacity_wh",
            "devices[1].volume_l",
            "devices[2].max_charge_w",
        ] {
            assert!(errors.iter().any(|e| e.field == field), "{field}: {errors:?}");
        }
        assert!(crate::scenario::Scenario::build(&cfg).is_err());
    }

    #[test]
    fn validation_catches_nan_battery_limits_and_chp_bounds() {
        let mut cfg = ScenarioConfig::chp_household();
        for d in &mut cfg.devices {
            match &mut d.kind {
                DeviceKind::Battery(b) => b.max_discharge_w = f64::NAN,
                DeviceKind::Chp(c) => c.max_temp_c = f64::NAN,
                _ => {}
            }
        }
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field.ends_with("max_charge_w")), "{errors:?}");
        assert!(errors.iter().any(|e| e.field.ends_with("on_below_c")), "{errors:?}");
    }

    #[test]
    fn validation_catches_invalid_soc() {
        let mut cfg = ScenarioConfig::household();
        for d in &mut cfg.devices {
            if let DeviceKind::Battery(b) = &mut d.kind {
                b.initial_soc = 1.5;
            }
        }
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field.ends_with("initial_soc")));
    }

    #[test]
    fn validation_catches_unknown_relation_device() {
        let mut cfg = ScenarioConfig::household();
        if let Some(grid) = cfg.grid.electrical.as_mut() {
            grid.relations.push(relation("heat_pump", "house", Commodity::ActivePower));
        }
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.message.contains("heat_pump")));
    }

    #[test]
    fn validation_catches_duplicate_names() {
        let mut cfg = ScenarioConfig::household();
        cfg.devices.push(device("pv", DeviceKind::PvSystem(PvConfig::default())));
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
    }

    #[test]
    fn seed_override_reaches_algorithms() {
        let cfg = ScenarioConfig::household().with_seed(1234);
        assert_eq!(cfg.optimization.seed, 1234);
        assert!(matches!(&cfg.algorithms[0], AlgorithmConfig::Genetic(p) if p.seed == 1234));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = ScenarioConfig::from_toml_str("[optimization]\nseed = 7\n");
        let Ok(cfg) = cfg else {
            panic!("partial TOML should parse");
        };
        assert_eq!(cfg.optimization.seed, 7);
        assert_eq!(cfg.optimization.step_size, 900);
        assert!(cfg.devices.is_empty());
    }
}
