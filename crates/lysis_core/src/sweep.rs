//! Exhaustive payoff matrix over pairs of single-stage strategies.

use crate::contest::Contest;
use crate::error::{Result, SimulationError};
use crate::integrator::TimeGrid;
use crate::recorder::{PayoffRecord, RecordSink};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive range of lysogeny percentages, `start..=stop` by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PercentRange {
    pub start: u32,
    pub stop: u32,
    pub step: u32,
}

impl Default for PercentRange {
    fn default() -> Self {
        Self {
            start: 1,
            stop: 99,
            step: 1,
        }
    }
}

impl PercentRange {
    pub fn validate(&self) -> Result<()> {
        if self.step == 0 {
            return Err(SimulationError::InvalidSettings(
                "percent step must be at least 1".to_string(),
            ));
        }
        if self.start > self.stop || self.stop > 100 {
            return Err(SimulationError::InvalidSettings(format!(
                "percent range {self} must satisfy start <= stop <= 100"
            )));
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + Clone {
        (self.start..=self.stop).step_by(self.step.max(1) as usize)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for PercentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.stop, self.step)
    }
}

impl FromStr for PercentRange {
    type Err = SimulationError;

    /// Parses `start:stop` or `start:stop:step`.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || SimulationError::InvalidSettings(format!("expected start:stop[:step], got {s:?}"));
        let parts = s
            .split(':')
            .map(|part| part.trim().parse::<u32>().map_err(|_| bad()))
            .collect::<Result<Vec<_>>>()?;
        let range = match parts.as_slice() {
            [start, stop] => Self {
                start: *start,
                stop: *stop,
                step: 1,
            },
            [start, stop, step] => Self {
                start: *start,
                stop: *stop,
                step: *step,
            },
            _ => return Err(bad()),
        };
        range.validate()?;
        Ok(range)
    }
}

/// What to do with a cell or round that produced no usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordPolicy {
    /// Keep the record with a `nan` payoff and log a warning.
    Flag,
    Skip,
    /// Stop the run and return the error.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub f1: PercentRange,
    pub f2: PercentRange,
    pub time: TimeGrid,
    pub on_undefined_payoff: RecordPolicy,
    pub on_integration_failure: RecordPolicy,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            f1: PercentRange::default(),
            f2: PercentRange::default(),
            time: TimeGrid::linspace(0.0, 50.0, 51000),
            on_undefined_payoff: RecordPolicy::Flag,
            on_integration_failure: RecordPolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub cells: usize,
    pub written: usize,
    pub flagged: usize,
    pub skipped: usize,
}

pub struct GridSweep<C> {
    contest: C,
    settings: SweepSettings,
}

impl<C: Contest<f64>> GridSweep<C> {
    pub fn new(contest: C, settings: SweepSettings) -> Result<Self> {
        settings.f1.validate()?;
        settings.f2.validate()?;
        Ok(Self { contest, settings })
    }

    pub fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    /// `(f1, f2)` percent pairs, `f1` outer and `f2` inner, both ascending.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let inner = self.settings.f2.iter();
        self.settings
            .f1
            .iter()
            .flat_map(move |f1| inner.clone().map(move |f2| (f1, f2)))
    }

    pub fn run<S: RecordSink<PayoffRecord>>(&mut self, sink: &mut S) -> Result<SweepSummary> {
        let rows = self.settings.f1.len();
        let columns = self.settings.f2.len();
        info!("payoff matrix: {rows} x {columns} cells");

        let cells: Vec<(u32, u32)> = self.cells().collect();
        let mut summary = SweepSummary::default();
        let mut current_row = None;

        for (f1, f2) in cells {
            if current_row != Some(f1) {
                current_row = Some(f1);
                info!("f1 = {f1}% ({} of {rows} rows done)", summary.cells / columns.max(1));
            }
            summary.cells += 1;

            let payoff = match self.evaluate(f1, f2) {
                Ok(value) => Some(value),
                Err(err) => {
                    let policy = if err.is_integration_failure() {
                        self.settings.on_integration_failure
                    } else if matches!(err, SimulationError::UndefinedPayoff { .. }) {
                        self.settings.on_undefined_payoff
                    } else {
                        RecordPolicy::Abort
                    };
                    match policy {
                        RecordPolicy::Abort => return Err(err),
                        RecordPolicy::Skip => {
                            warn!("skipping cell f1 = {f1}%, f2 = {f2}%: {err}");
                            summary.skipped += 1;
                            continue;
                        }
                        RecordPolicy::Flag => {
                            warn!("flagging cell f1 = {f1}%, f2 = {f2}%: {err}");
                            summary.flagged += 1;
                            None
                        }
                    }
                }
            };

            debug!("f1 = {f1}%, f2 = {f2}%: payoff {payoff:?}");
            sink.record(&PayoffRecord {
                f1_percent: f1,
                f2_percent: f2,
                payoff,
            })?;
            summary.written += 1;
        }

        info!(
            "payoff matrix done: {} written, {} flagged, {} skipped",
            summary.written, summary.flagged, summary.skipped
        );
        Ok(summary)
    }

    fn evaluate(&mut self, f1: u32, f2: u32) -> Result<f64> {
        let outcome = self
            .contest
            .play(f64::from(f1) / 100.0, f64::from(f2) / 100.0)?;
        outcome.payoff()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payoff::LysogenOutcome;
    use std::collections::HashMap;

    fn mirror(f1: f64, f2: f64) -> Result<LysogenOutcome> {
        Ok(LysogenOutcome::new(f1, f2))
    }

    fn assert_err_contains<T: fmt::Debug>(result: Result<T>, needle: &str) {
        match result {
            Ok(value) => panic!("expected error containing {needle:?}, got {value:?}"),
            Err(err) => assert!(
                err.to_string().contains(needle),
                "error {err} does not contain {needle:?}"
            ),
        }
    }

    #[test]
    fn default_sweep_covers_every_pair() {
        let mut sweep = GridSweep::new(mirror, SweepSettings::default()).unwrap();
        let mut records: Vec<PayoffRecord> = Vec::new();
        let summary = sweep.run(&mut records).unwrap();

        assert_eq!(records.len(), 9801);
        assert_eq!(summary.cells, 9801);
        assert_eq!(summary.written, 9801);

        let mut first_column = HashMap::new();
        let mut second_column = HashMap::new();
        for record in &records {
            *first_column.entry(record.f1_percent).or_insert(0) += 1;
            *second_column.entry(record.f2_percent).or_insert(0) += 1;
        }
        for percent in 1..=99 {
            assert_eq!(first_column[&percent], 99);
            assert_eq!(second_column[&percent], 99);
        }
    }

    #[test]
    fn cells_are_row_major() {
        let settings = SweepSettings {
            f1: "10:12".parse().unwrap(),
            f2: "40:41".parse().unwrap(),
            ..SweepSettings::default()
        };
        let sweep = GridSweep::new(mirror, settings).unwrap();
        let cells: Vec<_> = sweep.cells().collect();
        assert_eq!(
            cells,
            vec![(10, 40), (10, 41), (11, 40), (11, 41), (12, 40), (12, 41)]
        );
    }

    #[test]
    fn payoff_follows_lysogen_totals() {
        let settings = SweepSettings {
            f1: "30:30".parse().unwrap(),
            f2: "10:10".parse().unwrap(),
            ..SweepSettings::default()
        };
        let mut sweep = GridSweep::new(mirror, settings).unwrap();
        let mut records = Vec::new();
        sweep.run(&mut records).unwrap();
        let payoff = records[0].payoff.unwrap();
        assert!((payoff - 0.5).abs() < 1e-12);
    }

    fn extinct(_: f64, _: f64) -> Result<LysogenOutcome> {
        Ok(LysogenOutcome::new(0.0, 0.0))
    }

    fn one_by_two() -> SweepSettings {
        SweepSettings {
            f1: "5:5".parse().unwrap(),
            f2: "5:6".parse().unwrap(),
            ..SweepSettings::default()
        }
    }

    #[test]
    fn undefined_payoff_is_flagged_by_default() {
        let mut sweep = GridSweep::new(extinct, one_by_two()).unwrap();
        let mut records = Vec::new();
        let summary = sweep.run(&mut records).unwrap();
        assert_eq!(summary.flagged, 2);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.payoff.is_none()));
    }

    #[test]
    fn undefined_payoff_can_be_skipped_or_abort() {
        let mut settings = one_by_two();
        settings.on_undefined_payoff = RecordPolicy::Skip;
        let mut records = Vec::new();
        let summary = GridSweep::new(extinct, settings)
            .unwrap()
            .run(&mut records)
            .unwrap();
        assert_eq!(summary.skipped, 2);
        assert!(records.is_empty());

        settings.on_undefined_payoff = RecordPolicy::Abort;
        let result = GridSweep::new(extinct, settings)
            .unwrap()
            .run(&mut Vec::<PayoffRecord>::new());
        assert_err_contains(result, "payoff undefined");
    }

    #[test]
    fn integration_failure_aborts_by_default() {
        let diverge =
            |_: f64, _: f64| -> Result<LysogenOutcome> { Err(SimulationError::IntegrationDivergence { t: 3.5 }) };
        let mut sweep = GridSweep::new(diverge, one_by_two()).unwrap();
        assert_err_contains(sweep.run(&mut Vec::<PayoffRecord>::new()), "diverged at t = 3.5");
    }

    #[test]
    fn percent_range_parsing() {
        assert_eq!(
            "2:20:3".parse::<PercentRange>().unwrap(),
            PercentRange {
                start: 2,
                stop: 20,
                step: 3
            }
        );
        assert_eq!("2:20:3".parse::<PercentRange>().unwrap().len(), 7);
        assert_err_contains("7".parse::<PercentRange>(), "start:stop");
        assert_err_contains("9:3".parse::<PercentRange>(), "start <= stop");
        assert_err_contains("1:9:0".parse::<PercentRange>(), "step");
        assert_err_contains("a:9".parse::<PercentRange>(), "start:stop");
    }
}
