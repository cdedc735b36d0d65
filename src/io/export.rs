//! CSV export of the optimized load profile and device schedules.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::commodity::AncillaryCommodity;
use crate::devices::DeviceId;
use crate::sim::meter::AncillaryCommodityLoadProfile;
use crate::sim::schedule::DeviceSchedule;

/// Exports the load profile to a CSV file at the given path.
///
/// One row per tick: the tick followed by every ancillary commodity in W.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_profile_csv(profile: &AncillaryCommodityLoadProfile, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_profile_csv(profile, io::BufWriter::new(file))
}

/// Writes the load profile as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_profile_csv(profile: &AncillaryCommodityLoadProfile, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let mut header = vec!["tick".to_string()];
    header.extend(AncillaryCommodity::ALL.iter().map(|c| c.name().to_lowercase()));
    wtr.write_record(&header)?;

    for (index, tick) in profile.ticks().enumerate() {
        let mut row = vec![tick.to_string()];
        row.extend(
            AncillaryCommodity::ALL
                .iter()
                .map(|&c| format!("{:.4}", profile.power_at_index(c, index))),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports device schedules in long format to a CSV file.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_schedules_csv(
    schedules: &[DeviceSchedule],
    names: &BTreeMap<DeviceId, String>,
    path: &Path,
) -> io::Result<()> {
    let file = File::create(path)?;
    write_schedules_csv(schedules, names, io::BufWriter::new(file))
}

/// Writes device schedules as CSV, one row per device, tick and commodity.
///
/// Devices missing from `names` are written under their id. Temperature
/// cells stay empty where a device reports none.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_schedules_csv(
    schedules: &[DeviceSchedule],
    names: &BTreeMap<DeviceId, String>,
    writer: impl Write,
) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(["device", "kind", "tick", "commodity", "power_w", "temperature_c"])?;

    for schedule in schedules {
        let name = names
            .get(&schedule.device_id)
            .cloned()
            .unwrap_or_else(|| schedule.device_id.to_string());
        for (i, tick) in schedule.ticks.iter().enumerate() {
            for series in &schedule.series {
                let power = series.power.get(i).copied().unwrap_or(0.0);
                let temperature = series
                    .temperature
                    .get(i)
                    .copied()
                    .flatten()
                    .map(|t| format!("{t:.2}"))
                    .unwrap_or_default();
                let tick = tick.to_string();
                let power = format!("{power:.4}");
                wtr.write_record([
                    name.as_str(),
                    schedule.device_kind,
                    tick.as_str(),
                    series.commodity.name(),
                    power.as_str(),
                    temperature.as_str(),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commodity::Commodity;
    use crate::sim::meter::AncillaryMeterState;

    fn profile() -> AncillaryCommodityLoadProfile {
        let mut p = AncillaryCommodityLoadProfile::new(0, 900);
        for (i, w) in [100.0, -50.0].into_iter().enumerate() {
            let mut s = AncillaryMeterState::new();
            s.set_power(AncillaryCommodity::ActivePowerExternal, w);
            p.set_state_at(i as u64 * 900, &s);
        }
        p.end_sequential(1800);
        p
    }

    #[test]
    fn profile_csv_has_header_and_rows() {
        let mut buf = Vec::new();
        write_profile_csv(&profile(), &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("tick,activepowerexternal,"));
        assert_eq!(lines[0].split(',').count(), 1 + AncillaryCommodity::COUNT);
        assert!(lines[2].starts_with("900,-50.0000,"));
    }

    #[test]
    fn schedule_csv_is_deterministic() {
        let id = DeviceId::from_u128(3);
        let mut s = DeviceSchedule::new(id, "HotWaterTank", &[Commodity::HeatingHotWaterPower]);
        s.ticks = vec![0, 900];
        s.series[0].power = vec![0.0, 0.0];
        s.series[0].temperature = vec![Some(60.0), None];
        let names = BTreeMap::from([(id, "tank".to_string())]);

        let mut a = Vec::new();
        let mut b = Vec::new();
        write_schedules_csv(std::slice::from_ref(&s), &names, &mut a).unwrap();
        write_schedules_csv(std::slice::from_ref(&s), &names, &mut b).unwrap();
        assert_eq!(a, b);

        let out = String::from_utf8(a).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "tank,HotWaterTank,0,HEATINGHOTWATERPOWER,0.0000,60.00");
        assert_eq!(lines[2], "tank,HotWaterTank,900,HEATINGHOTWATERPOWER,0.0000,");
    }
}
