//! One latent stage per lineage: `B0, B1, B2, L1, L2, P1, P2`.

use super::{check_fraction, CompetitionModel, InitialConditions, RateConstants};
use crate::error::Result;
use crate::traits::{DynamicalSystem, Scalar};

pub const DIMENSION: usize = 7;

pub const SUSCEPTIBLE: usize = 0;
pub const INFECTED: [usize; 2] = [1, 2];
pub const LYSOGEN: [usize; 2] = [3, 4];
pub const PHAGE: [usize; 2] = [5, 6];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingleStageModel {
    pub rates: RateConstants,
    /// Lysogeny fraction `f_i` of each lineage.
    pub fractions: [f64; 2],
}

impl CompetitionModel for SingleStageModel {
    type Strategy = f64;

    fn new(rates: RateConstants, first: f64, second: f64) -> Result<Self> {
        rates.validate()?;
        Ok(Self {
            rates,
            fractions: [check_fraction(first)?, check_fraction(second)?],
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

impl<T: Scalar> DynamicalSystem<T> for SingleStageModel {
    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let a = T::from_f64(self.rates.adsorption);
        let b = T::from_f64(self.rates.burst_size);
        let g = T::from_f64(self.rates.growth_rate);
        let d = T::from_f64(self.rates.lysis_rate);

        let b0 = x[SUSCEPTIBLE];
        let total = b0 + x[INFECTED[0]] + x[INFECTED[1]] + x[LYSOGEN[0]] + x[LYSOGEN[1]];
        let room = T::one() - total;
        let phage_total = x[PHAGE[0]] + x[PHAGE[1]];

        out[SUSCEPTIBLE] = g * b0 * room - a * b0 * phage_total;
        for lineage in 0..2 {
            let f = T::from_f64(self.fractions[lineage]);
            let infected = x[INFECTED[lineage]];
            let phage = x[PHAGE[lineage]];
            let resolved = d * infected;

            out[INFECTED[lineage]] = a * b0 * phage - resolved;
            out[LYSOGEN[lineage]] = g * x[LYSOGEN[lineage]] * room + f * resolved;
            out[PHAGE[lineage]] = b * (T::one() - f) * resolved - a * phage * total;
        }
    }
}
