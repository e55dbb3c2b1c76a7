//! Adaptive integration of a flow onto a dense grid of sample times.
//!
//! The driver advances with whichever [`AdaptiveStepper`] is active, accepts or
//! rejects trial steps against the scaled error norm, and fills every sample
//! the accepted step covers by cubic Hermite interpolation. In
//! [`Method::Auto`] the explicit Tsit5 stepper hands over to Rosenbrock23 once
//! its stiffness estimate keeps exceeding the explicit stability limit, and
//! takes over again when the problem relaxes.

use crate::error::{Result, SimulationError};
use crate::solvers::{AdaptiveStepper, Rk4, Rosenbrock23, StepEstimate, Tolerance, Tsit5};
use crate::traits::{DynamicalSystem, OdeSystem, Steppable};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Tsit5 with automatic switching to Rosenbrock23 on stiffness.
    #[default]
    Auto,
    Tsit5,
    Rosenbrock23,
    /// Classic fixed-step RK4 along the sample grid.
    Rk4,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub method: Method,
    pub rtol: f64,
    pub atol: f64,
    pub max_steps: usize,
    pub initial_step: Option<f64>,
    pub max_step: Option<f64>,
    /// RK4 steps taken between consecutive samples.
    pub rk4_substeps: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            method: Method::Auto,
            rtol: 1e-8,
            atol: 1e-12,
            max_steps: 2_000_000,
            initial_step: None,
            max_step: None,
            rk4_substeps: 4,
        }
    }
}

impl IntegratorSettings {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SimulationError::InvalidSettings(msg.to_string()));
        if !(self.rtol.is_finite() && self.rtol >= 0.0) {
            return invalid("rtol must be finite and non-negative");
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return invalid("atol must be finite and non-negative");
        }
        if self.rtol == 0.0 && self.atol == 0.0 {
            return invalid("rtol and atol cannot both be zero");
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be greater than zero");
        }
        if matches!(self.initial_step, Some(h) if !(h.is_finite() && h > 0.0)) {
            return invalid("initial_step must be positive");
        }
        if matches!(self.max_step, Some(h) if !(h.is_finite() && h > 0.0)) {
            return invalid("max_step must be positive");
        }
        if self.rk4_substeps == 0 {
            return invalid("rk4_substeps must be at least 1");
        }
        Ok(())
    }

    fn tolerance(&self) -> Tolerance {
        Tolerance {
            rtol: self.rtol,
            atol: self.atol,
        }
    }
}

/// Evenly spaced sample times `start, ..., end` (both ends included).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    pub start: f64,
    pub end: f64,
    pub samples: usize,
}

impl TimeGrid {
    pub fn linspace(start: f64, end: f64, samples: usize) -> Self {
        Self {
            start,
            end,
            samples,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.start.is_finite() && self.end.is_finite()) {
            return Err(SimulationError::InvalidTimeGrid(
                "bounds must be finite".to_string(),
            ));
        }
        if self.end <= self.start {
            return Err(SimulationError::InvalidTimeGrid(format!(
                "end ({}) must be greater than start ({})",
                self.end, self.start
            )));
        }
        if self.samples < 2 {
            return Err(SimulationError::InvalidTimeGrid(format!(
                "at least 2 samples are required, got {}",
                self.samples
            )));
        }
        Ok(())
    }

    pub fn spacing(&self) -> f64 {
        (self.end - self.start) / (self.samples - 1) as f64
    }

    /// The `index`-th sample time; the last index maps exactly onto `end`.
    pub fn time(&self, index: usize) -> f64 {
        if index + 1 >= self.samples {
            self.end
        } else {
            self.start + index as f64 * self.spacing()
        }
    }

    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

/// Bookkeeping for one integration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub accepted: usize,
    pub rejected: usize,
    /// Explicit/implicit hand-overs performed by [`Method::Auto`].
    pub switches: usize,
}

/// States sampled on a [`TimeGrid`], stored row-major.
#[derive(Debug, Clone)]
pub struct Trajectory {
    dimension: usize,
    times: Vec<f64>,
    states: Vec<f64>,
    pub stats: StepStats,
}

impl Trajectory {
    fn with_capacity(dimension: usize, samples: usize) -> Self {
        Self {
            dimension,
            times: Vec::with_capacity(samples),
            states: Vec::with_capacity(samples * dimension),
            stats: StepStats::default(),
        }
    }

    fn push(&mut self, t: f64, state: &[f64]) {
        self.times.push(t);
        self.states.extend_from_slice(state);
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn state(&self, index: usize) -> &[f64] {
        let start = index * self.dimension;
        &self.states[start..start + self.dimension]
    }

    pub fn final_state(&self) -> &[f64] {
        self.state(self.len() - 1)
    }

    /// One compartment over time.
    pub fn column(&self, component: usize) -> impl Iterator<Item = f64> + '_ {
        self.states
            .chunks_exact(self.dimension)
            .map(move |row| row[component])
    }

    pub fn rows(&self) -> impl Iterator<Item = (f64, &[f64])> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.states.chunks_exact(self.dimension))
    }
}

/// Integrates `system` from `y0` at `grid.start` and samples it at every grid time.
pub fn integrate<S: OdeSystem>(
    system: &S,
    y0: &[f64],
    grid: &TimeGrid,
    settings: &IntegratorSettings,
) -> Result<Trajectory> {
    settings.validate()?;
    grid.validate()?;
    let dim = DynamicalSystem::<f64>::dimension(system);
    if y0.len() != dim {
        return Err(SimulationError::DimensionMismatch {
            expected: dim,
            actual: y0.len(),
        });
    }
    if !all_finite(y0) {
        return Err(SimulationError::IntegrationDivergence { t: grid.start });
    }

    let trajectory = match settings.method {
        Method::Rk4 => integrate_fixed(system, y0, grid, settings)?,
        _ => integrate_adaptive(system, y0, grid, settings)?,
    };
    debug!(
        "integrated {} samples over [{}, {}] with {:?}: {} accepted, {} rejected, {} switches",
        trajectory.len(),
        grid.start,
        grid.end,
        settings.method,
        trajectory.stats.accepted,
        trajectory.stats.rejected,
        trajectory.stats.switches
    );
    Ok(trajectory)
}

fn integrate_fixed<S: DynamicalSystem<f64>>(
    system: &S,
    y0: &[f64],
    grid: &TimeGrid,
    settings: &IntegratorSettings,
) -> Result<Trajectory> {
    let dim = y0.len();
    let mut trajectory = Trajectory::with_capacity(dim, grid.samples);
    let mut solver = Rk4::new(dim);
    let mut state = y0.to_vec();
    let mut t = grid.start;
    trajectory.push(t, &state);

    for index in 1..grid.samples {
        let target = grid.time(index);
        let dt = (target - t) / settings.rk4_substeps as f64;
        for _ in 0..settings.rk4_substeps {
            solver.step(system, &mut t, &mut state, dt);
            trajectory.stats.accepted += 1;
        }
        if trajectory.stats.accepted > settings.max_steps {
            return Err(SimulationError::MaxStepsExceeded {
                t,
                steps: settings.max_steps,
            });
        }
        if !all_finite(&state) {
            return Err(SimulationError::IntegrationDivergence { t });
        }
        t = target;
        trajectory.push(t, &state);
    }

    Ok(trajectory)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Regime {
    Explicit,
    Implicit,
}

// Tsit5's real-axis stability boundary is about 3.5.
const EXPLICIT_STABILITY_LIMIT: f64 = 3.0;
const RELAXED_LIMIT: f64 = 1.5;
const STIFF_STEPS_TO_SWITCH: u32 = 15;
const RELAXED_STEPS_TO_SWITCH: u32 = 25;
const MISSES_TO_RESET: u32 = 6;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

/// Hysteresis counter deciding when `Method::Auto` changes stepper.
#[derive(Debug, Default)]
struct StiffnessMonitor {
    enabled: bool,
    hits: u32,
    misses: u32,
}

impl StiffnessMonitor {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    fn observe(&mut self, regime: Regime, estimate: &StepEstimate) -> Regime {
        if !self.enabled {
            return regime;
        }
        let (hit, needed, next) = match regime {
            Regime::Explicit => (
                estimate.stiffness > EXPLICIT_STABILITY_LIMIT,
                STIFF_STEPS_TO_SWITCH,
                Regime::Implicit,
            ),
            Regime::Implicit => (
                estimate.stiffness < RELAXED_LIMIT,
                RELAXED_STEPS_TO_SWITCH,
                Regime::Explicit,
            ),
        };
        if hit {
            self.hits += 1;
            self.misses = 0;
            if self.hits >= needed {
                self.hits = 0;
                return next;
            }
        } else {
            self.misses += 1;
            if self.misses >= MISSES_TO_RESET {
                self.hits = 0;
                self.misses = 0;
            }
        }
        regime
    }
}

fn integrate_adaptive<S: OdeSystem>(
    system: &S,
    y0: &[f64],
    grid: &TimeGrid,
    settings: &IntegratorSettings,
) -> Result<Trajectory> {
    let dim = y0.len();
    let tol = settings.tolerance();
    let mut trajectory = Trajectory::with_capacity(dim, grid.samples);

    let mut explicit = Tsit5::new(dim);
    let mut implicit = Rosenbrock23::new(dim);
    let mut regime = match settings.method {
        Method::Rosenbrock23 => Regime::Implicit,
        _ => Regime::Explicit,
    };
    let mut monitor = StiffnessMonitor::new(settings.method == Method::Auto);

    let mut t = grid.start;
    let mut y = y0.to_vec();
    let mut f = vec![0.0; dim];
    DynamicalSystem::<f64>::apply(system, t, &y, &mut f);
    if !all_finite(&f) {
        return Err(SimulationError::IntegrationDivergence { t });
    }
    trajectory.push(t, &y);

    let mut y_new = vec![0.0; dim];
    let mut f_new = vec![0.0; dim];
    let mut interpolated = vec![0.0; dim];

    let span = grid.end - grid.start;
    let max_step = settings.max_step.unwrap_or(span);
    let mut h = match settings.initial_step {
        Some(h) => h,
        None => initial_step(system, t, &y, &f, &tol, explicit.error_order(), span),
    };
    let mut next_sample = 1usize;
    let mut last_failure_diverged = false;

    while next_sample < grid.samples {
        let stats = &mut trajectory.stats;
        if stats.accepted + stats.rejected >= settings.max_steps {
            return Err(SimulationError::MaxStepsExceeded {
                t,
                steps: settings.max_steps,
            });
        }

        let remaining = grid.end - t;
        h = h.min(max_step).min(remaining);
        let min_step = 16.0 * f64::EPSILON * t.abs().max(span);
        if h < min_step {
            return Err(if last_failure_diverged {
                SimulationError::IntegrationDivergence { t }
            } else {
                SimulationError::StepSizeUnderflow { t, h }
            });
        }

        let (estimate, order) = match regime {
            Regime::Explicit => (
                explicit.attempt(system, t, &y, &f, h, &tol, &mut y_new, &mut f_new),
                explicit.error_order(),
            ),
            Regime::Implicit => (
                implicit.attempt(system, t, &y, &f, h, &tol, &mut y_new, &mut f_new),
                implicit.error_order(),
            ),
        };

        let finite = estimate.error.is_finite() && all_finite(&y_new) && all_finite(&f_new);
        if !finite || estimate.error > 1.0 {
            stats.rejected += 1;
            last_failure_diverged = !finite;
            h *= if finite {
                step_factor(estimate.error, order).min(1.0)
            } else {
                MIN_FACTOR
            };
            trace!("rejected step at t = {t} (error {:.3e})", estimate.error);
            continue;
        }
        last_failure_diverged = false;

        let t_new = if h >= remaining { grid.end } else { t + h };
        while next_sample < grid.samples && grid.time(next_sample) <= t_new {
            let ts = grid.time(next_sample);
            if ts == t_new {
                trajectory.push(ts, &y_new);
            } else {
                let theta = (ts - t) / (t_new - t);
                hermite(theta, t_new - t, &y, &f, &y_new, &f_new, &mut interpolated);
                trajectory.push(ts, &interpolated);
            }
            next_sample += 1;
        }

        let stats = &mut trajectory.stats;
        stats.accepted += 1;
        std::mem::swap(&mut y, &mut y_new);
        std::mem::swap(&mut f, &mut f_new);
        t = t_new;

        let next_regime = monitor.observe(regime, &estimate);
        if next_regime != regime {
            stats.switches += 1;
            debug!("switching {regime:?} -> {next_regime:?} at t = {t}");
            regime = next_regime;
        }

        h *= step_factor(estimate.error, order);
    }

    Ok(trajectory)
}

fn step_factor(error: f64, order: u32) -> f64 {
    if error == 0.0 {
        return MAX_FACTOR;
    }
    let exponent = -1.0 / f64::from(order + 1);
    (SAFETY * error.powf(exponent)).clamp(MIN_FACTOR, MAX_FACTOR)
}

/// Starting step size estimate after Hairer, Nørsett & Wanner (II.4).
fn initial_step<S: DynamicalSystem<f64>>(
    system: &S,
    t: f64,
    y: &[f64],
    f: &[f64],
    tol: &Tolerance,
    order: u32,
    span: f64,
) -> f64 {
    let zeros = vec![0.0; y.len()];
    let d0 = tol.scaled_norm(y, y, &zeros);
    let d1 = tol.scaled_norm(f, y, &zeros);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    }
    .min(span);

    let y1: Vec<f64> = y.iter().zip(f).map(|(yi, fi)| yi + h0 * fi).collect();
    let mut f1 = vec![0.0; y.len()];
    system.apply(t + h0, &y1, &mut f1);
    let diff: Vec<f64> = f1.iter().zip(f).map(|(a, b)| a - b).collect();
    let d2 = tol.scaled_norm(&diff, y, &zeros) / h0;

    let h1 = if d1.max(d2) <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / f64::from(order + 1))
    };
    let h = (100.0 * h0).min(h1).min(span);
    if h.is_finite() && h > 0.0 {
        h
    } else {
        1e-6_f64.min(span)
    }
}

/// Cubic Hermite interpolant on a step of length `h` at fraction `theta`.
fn hermite(
    theta: f64,
    h: f64,
    y0: &[f64],
    f0: &[f64],
    y1: &[f64],
    f1: &[f64],
    out: &mut [f64],
) {
    let tm1 = theta - 1.0;
    for i in 0..out.len() {
        let dy = y1[i] - y0[i];
        out[i] = (1.0 - theta) * y0[i]
            + theta * y1[i]
            + theta * tm1 * ((1.0 - 2.0 * theta) * dy + tm1 * h * f0[i] + theta * h * f1[i]);
    }
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}
