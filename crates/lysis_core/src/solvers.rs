use crate::autodiff::{jacobian, time_derivative};
use crate::traits::{DynamicalSystem, OdeSystem, Steppable};
use nalgebra::{DMatrix, DVector};

/// Mixed absolute/relative tolerance used to scale local error estimates.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Tolerance {
    /// RMS norm of `err` with per-component scale `atol + rtol * max(|y0|, |y1|)`.
    pub fn scaled_norm(&self, err: &[f64], y0: &[f64], y1: &[f64]) -> f64 {
        if err.is_empty() {
            return 0.0;
        }
        let sum: f64 = err
            .iter()
            .zip(y0.iter().zip(y1))
            .map(|(e, (a, b))| {
                let scale = self.atol + self.rtol * a.abs().max(b.abs());
                (e / scale).powi(2)
            })
            .sum();
        (sum / err.len() as f64).sqrt()
    }
}

/// What an adaptive stepper reports about a trial step.
#[derive(Debug, Clone, Copy)]
pub struct StepEstimate {
    /// Scaled local error; the step is acceptable when this is `<= 1`.
    pub error: f64,
    /// Estimate of `h * |λ_max|` for the step, used for stiffness detection.
    pub stiffness: f64,
}

/// A solver that proposes a step from `(t, y)` and estimates its own error.
pub trait AdaptiveStepper {
    /// Order of the embedded lower-order solution; drives step-size control.
    fn error_order(&self) -> u32;

    /// Attempts a step of size `h`. `f0` must hold `f(t, y)`.
    /// On return `y_new` holds the candidate state and `f_new` holds `f(t + h, y_new)`.
    #[allow(clippy::too_many_arguments)]
    fn attempt<S: OdeSystem>(
        &mut self,
        system: &S,
        t: f64,
        y: &[f64],
        f0: &[f64],
        h: f64,
        tol: &Tolerance,
        y_new: &mut [f64],
        f_new: &mut [f64],
    ) -> StepEstimate;
}

/// Classic Runge-Kutta 4th Order Solver
pub struct Rk4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: Vec<f64>,
}

impl Rk4 {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            tmp: vec![0.0; dim],
        }
    }
}

impl Steppable for Rk4 {
    fn step(&mut self, system: &impl DynamicalSystem<f64>, t: &mut f64, state: &mut [f64], dt: f64) {
        let t0 = *t;
        let half = 0.5 * dt;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * self.k1[i];
        }
        system.apply(t0 + half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * self.k2[i];
        }
        system.apply(t0 + half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        let sixth = dt / 6.0;
        for i in 0..state.len() {
            state[i] += sixth * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

// Tsitouras 5(4) tableau.
const C2: f64 = 0.161;
const C3: f64 = 0.327;
const C4: f64 = 0.9;
const C5: f64 = 0.980_025_540_904_509_7;

const A21: f64 = 0.161;
const A31: f64 = -0.008_480_655_492_356_989;
const A32: f64 = 0.335_480_655_492_357;
const A41: f64 = 2.898;
const A42: f64 = -6.359_447_987_781_783;
const A43: f64 = 4.361_447_987_781_783;
const A51: f64 = 5.325_864_858_437_957;
const A52: f64 = -11.748_883_564_062_828;
const A53: f64 = 7.495_539_342_889_693;
const A54: f64 = -0.092_495_066_360_301_95;
const A61: f64 = 5.861_455_442_946_42;
const A62: f64 = -12.920_969_317_847_11;
const A63: f64 = 8.159_367_898_576_159;
const A64: f64 = -0.071_584_973_281_401;
const A65: f64 = -0.028_268_579_490_546_63;

// 5th order weights (equal to the 7th stage row, FSAL).
const B1: f64 = 0.096_460_766_818_065_23;
const B2: f64 = 0.01;
const B3: f64 = 0.479_889_650_414_499_6;
const B4: f64 = 1.379_008_574_103_742;
const B5: f64 = -3.290_069_515_436_099;
const B6: f64 = 2.324_710_524_099_774;

// b - b_hat, the embedded error weights.
const E1: f64 = -0.001_780_011_052_225_777_14;
const E2: f64 = -0.000_816_434_459_656_746_9;
const E3: f64 = 0.007_880_878_010_261_995;
const E4: f64 = -0.144_711_007_173_262_9;
const E5: f64 = 0.582_357_165_452_555_2;
const E6: f64 = -0.458_082_105_929_186_97;
const E7: f64 = 0.015_151_515_151_515_152;

/// Tsitouras 5/4 Solver with embedded error estimate and FSAL.
pub struct Tsit5 {
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    k5: Vec<f64>,
    k6: Vec<f64>,
    tmp: Vec<f64>,
    err: Vec<f64>,
}

impl Tsit5 {
    pub fn new(dim: usize) -> Self {
        Self {
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            k5: vec![0.0; dim],
            k6: vec![0.0; dim],
            tmp: vec![0.0; dim],
            err: vec![0.0; dim],
        }
    }
}

impl AdaptiveStepper for Tsit5 {
    fn error_order(&self) -> u32 {
        4
    }

    fn attempt<S: OdeSystem>(
        &mut self,
        system: &S,
        t: f64,
        y: &[f64],
        k1: &[f64],
        h: f64,
        tol: &Tolerance,
        y_new: &mut [f64],
        k7: &mut [f64],
    ) -> StepEstimate {
        let n = y.len();

        for i in 0..n {
            self.tmp[i] = y[i] + h * A21 * k1[i];
        }
        system.apply(t + C2 * h, &self.tmp, &mut self.k2);

        for i in 0..n {
            self.tmp[i] = y[i] + h * (A31 * k1[i] + A32 * self.k2[i]);
        }
        system.apply(t + C3 * h, &self.tmp, &mut self.k3);

        for i in 0..n {
            self.tmp[i] = y[i] + h * (A41 * k1[i] + A42 * self.k2[i] + A43 * self.k3[i]);
        }
        system.apply(t + C4 * h, &self.tmp, &mut self.k4);

        for i in 0..n {
            self.tmp[i] = y[i]
                + h * (A51 * k1[i] + A52 * self.k2[i] + A53 * self.k3[i] + A54 * self.k4[i]);
        }
        system.apply(t + C5 * h, &self.tmp, &mut self.k5);

        for i in 0..n {
            self.tmp[i] = y[i]
                + h * (A61 * k1[i]
                    + A62 * self.k2[i]
                    + A63 * self.k3[i]
                    + A64 * self.k4[i]
                    + A65 * self.k5[i]);
        }
        system.apply(t + h, &self.tmp, &mut self.k6);

        for i in 0..n {
            y_new[i] = y[i]
                + h * (B1 * k1[i]
                    + B2 * self.k2[i]
                    + B3 * self.k3[i]
                    + B4 * self.k4[i]
                    + B5 * self.k5[i]
                    + B6 * self.k6[i]);
        }
        system.apply(t + h, y_new, k7);

        for i in 0..n {
            self.err[i] = h
                * (E1 * k1[i]
                    + E2 * self.k2[i]
                    + E3 * self.k3[i]
                    + E4 * self.k4[i]
                    + E5 * self.k5[i]
                    + E6 * self.k6[i]
                    + E7 * k7[i]);
        }
        let error = tol.scaled_norm(&self.err, y, y_new);

        // Stages 6 and 7 both sit at t + h, so their slope difference over
        // their state difference estimates the dominant eigenvalue.
        let slope_gap: f64 = k7
            .iter()
            .zip(&self.k6)
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();
        let state_gap: f64 = y_new
            .iter()
            .zip(&self.tmp)
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();
        let stiffness = if state_gap > 0.0 {
            h * slope_gap / state_gap
        } else {
            0.0
        };

        StepEstimate { error, stiffness }
    }
}

/// Linearly implicit Rosenbrock 2(3) method (Shampine & Reichelt),
/// L-stable, with the Jacobian taken from dual-number evaluation.
pub struct Rosenbrock23 {
    dt: Vec<f64>,
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    f1: Vec<f64>,
    tmp: Vec<f64>,
    err: Vec<f64>,
}

const ROS_D: f64 = 0.292_893_218_813_452_5; // 1 / (2 + sqrt(2))
const ROS_E32: f64 = 7.414_213_562_373_095; // 6 + sqrt(2)

impl Rosenbrock23 {
    pub fn new(dim: usize) -> Self {
        Self {
            dt: vec![0.0; dim],
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            f1: vec![0.0; dim],
            tmp: vec![0.0; dim],
            err: vec![0.0; dim],
        }
    }
}

fn rejected() -> StepEstimate {
    StepEstimate {
        error: f64::INFINITY,
        stiffness: f64::INFINITY,
    }
}

impl AdaptiveStepper for Rosenbrock23 {
    fn error_order(&self) -> u32 {
        2
    }

    fn attempt<S: OdeSystem>(
        &mut self,
        system: &S,
        t: f64,
        y: &[f64],
        f0: &[f64],
        h: f64,
        tol: &Tolerance,
        y_new: &mut [f64],
        f_new: &mut [f64],
    ) -> StepEstimate {
        let n = y.len();
        let jac = jacobian(system, t, y);
        time_derivative(system, t, y, &mut self.dt);

        let hd = h * ROS_D;
        let w = DMatrix::<f64>::identity(n, n) - &jac * hd;
        let lu = w.lu();

        let solve = |rhs: &[f64], out: &mut [f64]| -> bool {
            match lu.solve(&DVector::from_column_slice(rhs)) {
                Some(sol) if sol.iter().all(|v| v.is_finite()) => {
                    out.copy_from_slice(sol.as_slice());
                    true
                }
                _ => false,
            }
        };

        // k1 = W \ (f0 + h d T)
        for i in 0..n {
            self.tmp[i] = f0[i] + hd * self.dt[i];
        }
        if !solve(&self.tmp, &mut self.k1) {
            return rejected();
        }

        // f1 = f(t + h/2, y + h/2 k1); k2 = W \ (f1 - k1) + k1
        for i in 0..n {
            self.tmp[i] = y[i] + 0.5 * h * self.k1[i];
        }
        system.apply(t + 0.5 * h, &self.tmp, &mut self.f1);
        for i in 0..n {
            self.tmp[i] = self.f1[i] - self.k1[i];
        }
        if !solve(&self.tmp, &mut self.k2) {
            return rejected();
        }
        for i in 0..n {
            self.k2[i] += self.k1[i];
            y_new[i] = y[i] + h * self.k2[i];
        }
        system.apply(t + h, y_new, f_new);

        // k3 = W \ (f2 - e32 (k2 - f1) - 2 (k1 - f0) + h d T)
        for i in 0..n {
            self.tmp[i] = f_new[i]
                - ROS_E32 * (self.k2[i] - self.f1[i])
                - 2.0 * (self.k1[i] - f0[i])
                + hd * self.dt[i];
        }
        if !solve(&self.tmp, &mut self.k3) {
            return rejected();
        }

        for i in 0..n {
            self.err[i] = h / 6.0 * (self.k1[i] - 2.0 * self.k2[i] + self.k3[i]);
        }
        let error = tol.scaled_norm(&self.err, y, y_new);

        // Row-sum norm bounds the spectral radius from above.
        let jac_norm = jac
            .row_iter()
            .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max);

        StepEstimate {
            error,
            stiffness: h * jac_norm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Scalar;

    struct Decay {
        rate: f64,
    }

    impl<T: Scalar> DynamicalSystem<T> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
            out[0] = -T::from_f64(self.rate) * x[0];
        }
    }

    fn loose() -> Tolerance {
        Tolerance {
            rtol: 1e-6,
            atol: 1e-9,
        }
    }

    #[test]
    fn rk4_step_tracks_exponential_decay() {
        let system = Decay { rate: 0.5 };
        let mut solver = Rk4::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        for _ in 0..100 {
            solver.step(&system, &mut t, &mut state, 0.1);
        }
        assert!((t - 10.0).abs() < 1e-12);
        assert!((state[0] - (-5.0_f64).exp()).abs() < 1e-7);
    }

    #[test]
    fn tsit5_single_step_is_accurate_and_reports_small_error() {
        let system = Decay { rate: 1.0 };
        let mut solver = Tsit5::new(1);
        let y = [1.0];
        let f0 = [-1.0];
        let mut y_new = [0.0];
        let mut f_new = [0.0];
        let est = solver.attempt(&system, 0.0, &y, &f0, 0.1, &loose(), &mut y_new, &mut f_new);
        assert!((y_new[0] - (-0.1_f64).exp()).abs() < 1e-8);
        assert!((f_new[0] + y_new[0]).abs() < 1e-15);
        assert!(est.error < 1.0);
        // h * |λ| = 0.1 for a linear problem.
        assert!((est.stiffness - 0.1).abs() < 1e-6);
    }

    #[test]
    fn tsit5_flags_large_steps_on_fast_modes() {
        let system = Decay { rate: 1000.0 };
        let mut solver = Tsit5::new(1);
        let y = [1.0];
        let f0 = [-1000.0];
        let mut y_new = [0.0];
        let mut f_new = [0.0];
        let est = solver.attempt(&system, 0.0, &y, &f0, 0.01, &loose(), &mut y_new, &mut f_new);
        assert!(est.error > 1.0);
        assert!(est.stiffness > 3.0);
    }

    #[test]
    fn rosenbrock_stays_stable_on_stiff_decay() {
        let system = Decay { rate: 1000.0 };
        let mut solver = Rosenbrock23::new(1);
        let y = [1.0];
        let f0 = [-1000.0];
        let mut y_new = [0.0];
        let mut f_new = [0.0];
        let est = solver.attempt(&system, 0.0, &y, &f0, 0.1, &loose(), &mut y_new, &mut f_new);
        assert!(y_new[0].abs() < 1.0);
        assert!((est.stiffness - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rosenbrock_single_step_is_second_order_accurate() {
        let system = Decay { rate: 1.0 };
        let mut solver = Rosenbrock23::new(1);
        let y = [1.0];
        let f0 = [-1.0];
        let mut y_new = [0.0];
        let mut f_new = [0.0];
        solver.attempt(&system, 0.0, &y, &f0, 0.01, &loose(), &mut y_new, &mut f_new);
        assert!((y_new[0] - (-0.01_f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn scaled_norm_is_rms_of_scaled_components() {
        let tol = Tolerance { rtol: 0.0, atol: 1.0 };
        let norm = tol.scaled_norm(&[3.0, 4.0], &[0.0, 0.0], &[0.0, 0.0]);
        assert!((norm - (12.5_f64).sqrt()).abs() < 1e-15);
    }
}
