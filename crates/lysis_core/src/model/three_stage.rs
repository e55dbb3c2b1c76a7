//! Three-stage infection ladder per lineage, used by the MOI search.
//!
//! Layout: `B0, B11, B12, B13, B21, B22, B23, L1, L2, P1, P2`. A cell infected
//! by lineage `i` sits on stage `k` of that lineage's ladder; another
//! adsorption by the same phage moves it one stage up, so the stage doubles as
//! the multiplicity of infection. Every stage resolves at rate `3d` with its
//! own lysogeny fraction `f_ik`.

use super::{check_fraction, CompetitionModel, InitialConditions, RateConstants};
use crate::error::Result;
use crate::traits::{DynamicalSystem, Scalar};

pub const DIMENSION: usize = 11;
pub const STAGES: usize = 3;

pub const SUSCEPTIBLE: usize = 0;
pub const LADDER: [[usize; STAGES]; 2] = [[1, 2, 3], [4, 5, 6]];
pub const LYSOGEN: [usize; 2] = [7, 8];
pub const PHAGE: [usize; 2] = [9, 10];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreeStageModel {
    pub rates: RateConstants,
    pub fractions: [[f64; STAGES]; 2],
}

impl CompetitionModel for ThreeStageModel {
    type Strategy = [f64; STAGES];

    fn new(rates: RateConstants, first: [f64; STAGES], second: [f64; STAGES]) -> Result<Self> {
        rates.validate()?;
        for &value in first.iter().chain(second.iter()) {
            check_fraction(value)?;
        }
        Ok(Self {
            rates,
            fractions: [first, second],
        })
    }

    fn lysogen_indices(&self) -> [usize; 2] {
        LYSOGEN
    }

    fn initial_state(&self, initial: &InitialConditions) -> Vec<f64> {
        let mut state = vec![0.0; DIMENSION];
        state[SUSCEPTIBLE] = initial.bacteria;
        for lineage in 0..2 {
            state[LYSOGEN[lineage]] = initial.lysogens;
            state[PHAGE[lineage]] = initial.phage;
        }
        state
    }
}

impl<T: Scalar> DynamicalSystem<T> for ThreeStageModel {
    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let a = T::from_f64(self.rates.adsorption);
        let b = T::from_f64(self.rates.burst_size);
        let g = T::from_f64(self.rates.growth_rate);
        let exit = T::from_f64(STAGES as f64 * self.rates.lysis_rate);

        let b0 = x[SUSCEPTIBLE];
        let total = x[..PHAGE[0]].iter().fold(T::zero(), |acc, &v| acc + v);
        let room = T::one() - total;

        out[SUSCEPTIBLE] = g * b0 * room - a * b0 * (x[PHAGE[0]] + x[PHAGE[1]]);

        for lineage in 0..2 {
            let phage = x[PHAGE[lineage]];
            let mut lysogenic = T::zero();
            let mut lytic = T::zero();
            let mut inflow = a * b0 * phage;

            for (stage, &idx) in LADDER[lineage].iter().enumerate() {
                let cell = x[idx];
                let f = T::from_f64(self.fractions[lineage][stage]);
                let promoted = if stage + 1 < STAGES {
                    a * cell * phage
                } else {
                    T::zero()
                };
                out[idx] = inflow - promoted - exit * cell;
                inflow = promoted;
                lysogenic = lysogenic + f * cell;
                lytic = lytic + (T::one() - f) * cell;
            }

            out[LYSOGEN[lineage]] = g * x[LYSOGEN[lineage]] * room + exit * lysogenic;
            out[PHAGE[lineage]] = b * exit * lytic - a * phage * total;
        }
    }
}
