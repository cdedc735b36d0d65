//! Price and power-limit signals keyed by ancillary commodity.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::commodity::AncillaryCommodity;

/// A constant value over the tick window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceWindow {
    /// Start tick (inclusive).
    pub start: u64,
    /// End tick (exclusive).
    pub end: u64,
    /// Price per kWh while the window is active.
    pub price: f64,
}

impl PriceWindow {
    /// Returns `true` when `tick` falls within the window.
    pub fn is_active(&self, tick: u64) -> bool {
        tick >= self.start && tick < self.end
    }
}

/// Piecewise-constant price per kWh.
///
/// Later windows take precedence over earlier ones; ticks outside every
/// window use the default price.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSignal {
    default_price: f64,
    windows: Vec<PriceWindow>,
}

impl PriceSignal {
    /// Creates a flat signal.
    pub fn flat(price: f64) -> Self {
        Self {
            default_price: price,
            windows: Vec::new(),
        }
    }

    /// Creates a signal with `windows` over a default price.
    ///
    /// A window with `start >= end` covers no tick and is never applied.
    pub fn with_windows(default_price: f64, windows: Vec<PriceWindow>) -> Self {
        Self {
            default_price,
            windows,
        }
    }

    /// Price at `tick`.
    pub fn price_at(&self, tick: u64) -> f64 {
        self.windows
            .iter()
            .rev()
            .find(|w| w.is_active(tick))
            .map_or(self.default_price, |w| w.price)
    }
}

/// Allowed power range `[lower, upper]` over the tick window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitWindow {
    pub start: u64,
    pub end: u64,
    #[serde(default = "neg_infinity")]
    pub lower: f64,
    #[serde(default = "infinity")]
    pub upper: f64,
}

fn neg_infinity() -> f64 {
    f64::NEG_INFINITY
}

fn infinity() -> f64 {
    f64::INFINITY
}

/// Power limits over time. Unbounded outside every window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerLimitSignal {
    windows: Vec<LimitWindow>,
}

impl PowerLimitSignal {
    /// Creates a signal from limit windows.
    pub fn new(windows: Vec<LimitWindow>) -> Self {
        Self { windows }
    }

    /// `(lower, upper)` limits at `tick`.
    pub fn limits_at(&self, tick: u64) -> (f64, f64) {
        self.windows
            .iter()
            .rev()
            .find(|w| tick >= w.start && tick < w.end)
            .map_or((f64::NEG_INFINITY, f64::INFINITY), |w| (w.lower, w.upper))
    }

    /// Amount by which `power` leaves the allowed range at `tick`, always
    /// non-negative.
    pub fn violation_at(&self, tick: u64, power: f64) -> f64 {
        let (lower, upper) = self.limits_at(tick);
        if power > upper {
            power - upper
        } else if power < lower {
            lower - power
        } else {
            0.0
        }
    }
}

/// Price signals by ancillary commodity.
pub type PriceSignals = BTreeMap<AncillaryCommodity, PriceSignal>;

/// Power-limit signals by ancillary commodity.
pub type LimitSignals = BTreeMap<AncillaryCommodity, PowerLimitSignal>;
