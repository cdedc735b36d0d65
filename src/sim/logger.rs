//! Explicit collector for detailed evaluations.
//!
//! The evaluator feeds an [`EvaluationLogger`] when one is handed in; the
//! caller owns it and turns it into an [`EvaluationLog`] with
//! [`EvaluationLogger::finish`].

use crate::devices::ProblemPart;
use crate::sim::meter::AncillaryMeterState;
use crate::sim::schedule::DeviceSchedule;
use crate::sim::state_map::LimitedCommodityStateMap;

/// Ancillary meter state at one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSample {
    pub tick: u64,
    pub state: AncillaryMeterState,
}

/// Everything collected during one detailed evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationLog {
    pub predicted_state: Vec<MeterSample>,
    pub schedules: Vec<DeviceSchedule>,
}

/// Records the meter state and part outputs of every tick.
#[derive(Debug, Default)]
pub struct EvaluationLogger {
    predicted_state: Vec<MeterSample>,
    /// Indexed by dense id; `None` for skipped parts.
    schedules: Vec<Option<DeviceSchedule>>,
}

impl EvaluationLogger {
    /// Creates an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards earlier records and prepares one schedule per non-static
    /// part.
    pub fn begin(&mut self, parts: &[Box<dyn ProblemPart>]) {
        self.predicted_state.clear();
        self.schedules = parts
            .iter()
            .map(|p| {
                (!p.is_completely_static()).then(|| {
                    DeviceSchedule::new(p.device_id(), p.device_kind(), p.output_commodities())
                })
            })
            .collect();
    }

    /// Records this tick's meter state.
    pub fn record_meter(&mut self, tick: u64, state: &AncillaryMeterState) {
        self.predicted_state.push(MeterSample {
            tick,
            state: state.clone(),
        });
    }

    /// Records the output of the part with `dense_id` at `tick`.
    pub fn record_output(&mut self, dense_id: usize, tick: u64, output: &LimitedCommodityStateMap) {
        let Some(Some(schedule)) = self.schedules.get_mut(dense_id) else {
            return;
        };
        schedule.ticks.push(tick);
        for series in &mut schedule.series {
            series.power.push(output.power(series.commodity));
            series.temperature.push(output.temperature(series.commodity));
        }
    }

    /// Records the terminal cost of the part with `dense_id`.
    pub fn record_cervisia(&mut self, dense_id: usize, cervisia: f64) {
        if let Some(Some(schedule)) = self.schedules.get_mut(dense_id) {
            schedule.cervisia = cervisia;
        }
    }

    /// Consumes the logger.
    pub fn finish(self) -> EvaluationLog {
        EvaluationLog {
            predicted_state: self.predicted_state,
            schedules: self.schedules.into_iter().flatten().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commodity::{AncillaryCommodity, Commodity};
    use crate::devices::{BaseLoad, DeviceId};

    #[test]
    fn records_outputs_and_skips_static_parts() {
        let parts: Vec<Box<dyn ProblemPart>> = vec![
            Box::new(BaseLoad::new(DeviceId::from_u128(1), 0, 900, 300.0, 1)),
            Box::new(BaseLoad::new(DeviceId::from_u128(2), 0, 900, 300.0, 1).completely_static(true)),
        ];
        let mut logger = EvaluationLogger::new();
        logger.begin(&parts);

        let mut meter = AncillaryMeterState::new();
        meter.set_power(AncillaryCommodity::ActivePowerExternal, 300.0);
        let mut output = LimitedCommodityStateMap::new(parts[0].output_commodities());
        output.set_power(Commodity::ActivePower, 300.0);
        for tick in [0, 900] {
            logger.record_meter(tick, &meter);
            logger.record_output(0, tick, &output);
            logger.record_output(1, tick, &output);
        }
        logger.record_cervisia(0, 1.5);

        let log = logger.finish();
        assert_eq!(log.predicted_state.len(), 2);
        assert_eq!(log.predicted_state[1].tick, 900);
        assert_eq!(log.schedules.len(), 1);
        assert_eq!(log.schedules[0].ticks, vec![0, 900]);
        assert_eq!(log.schedules[0].power(Commodity::ActivePower), Some(&[300.0, 300.0][..]));
        assert_eq!(log.schedules[0].cervisia, 1.5);
    }

    #[test]
    fn begin_discards_earlier_records() {
        let parts: Vec<Box<dyn ProblemPart>> =
            vec![Box::new(BaseLoad::new(DeviceId::from_u128(1), 0, 900, 300.0, 1))];
        let mut logger = EvaluationLogger::new();
        logger.begin(&parts);
        logger.record_meter(0, &AncillaryMeterState::new());
        logger.begin(&parts);
        assert!(logger.finish().predicted_state.is_empty());
    }
}
