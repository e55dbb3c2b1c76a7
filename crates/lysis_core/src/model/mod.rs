//! Phage/bacteria competition models.
//!
//! Two phage lineages compete for one susceptible host population. Infected
//! hosts resolve either lysogenically (becoming a lysogen of that lineage) or
//! lytically (releasing a burst of free phage). The lysogeny fractions are the
//! strategies under study; everything else is fixed by [`RateConstants`].

pub mod single_stage;
pub mod three_stage;

pub use single_stage::SingleStageModel;
pub use three_stage::ThreeStageModel;

use crate::error::{Result, SimulationError};
use crate::integrator::Trajectory;
use crate::payoff::LysogenOutcome;
use crate::traits::OdeSystem;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConstants {
    /// Adsorption rate `a`.
    pub adsorption: f64,
    /// Phage released per lytic event, `b`.
    pub burst_size: f64,
    /// Logistic growth rate of every bacterial class, `g`.
    pub growth_rate: f64,
    /// Rate at which infected cells resolve, `d`.
    pub lysis_rate: f64,
}

impl Default for RateConstants {
    fn default() -> Self {
        Self {
            adsorption: 20.0,
            burst_size: 100.0,
            growth_rate: 1.0,
            lysis_rate: 1.0,
        }
    }
}

impl RateConstants {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("adsorption", self.adsorption),
            ("burst_size", self.burst_size),
            ("growth_rate", self.growth_rate),
            ("lysis_rate", self.lysis_rate),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SimulationError::InvalidSettings(format!(
                    "rate constant {name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Starting densities shared by both lineages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialConditions {
    pub bacteria: f64,
    pub phage: f64,
    pub lysogens: f64,
}

impl Default for InitialConditions {
    fn default() -> Self {
        Self {
            bacteria: 1e-3,
            phage: 1e-7,
            lysogens: 0.0,
        }
    }
}

impl InitialConditions {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("bacteria", self.bacteria),
            ("phage", self.phage),
            ("lysogens", self.lysogens),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SimulationError::InvalidSettings(format!(
                    "initial {name} density must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Rejects lysogeny fractions outside `[0, 1]`.
pub fn check_fraction(value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SimulationError::InvalidSettings(format!(
            "lysogeny fraction must lie in [0, 1], got {value}"
        )))
    }
}

/// A two-lineage model whose lineages are parameterized by a strategy each.
pub trait CompetitionModel: OdeSystem + Sized {
    type Strategy: Copy + std::fmt::Debug;

    fn new(rates: RateConstants, first: Self::Strategy, second: Self::Strategy) -> Result<Self>;

    /// Indices of the lineage-1 and lineage-2 lysogen compartments.
    fn lysogen_indices(&self) -> [usize; 2];

    fn initial_state(&self, initial: &InitialConditions) -> Vec<f64>;

    fn final_lysogens(&self, trajectory: &Trajectory) -> LysogenOutcome {
        let [l1, l2] = self.lysogen_indices();
        let last = trajectory.final_state();
        LysogenOutcome {
            first: last[l1],
            second: last[l2],
        }
    }
}
