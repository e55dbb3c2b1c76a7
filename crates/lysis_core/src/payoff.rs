use crate::error::{Result, SimulationError};

/// Final lysogen totals of the two lineages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LysogenOutcome {
    pub first: f64,
    pub second: f64,
}

impl LysogenOutcome {
    pub fn new(first: f64, second: f64) -> Self {
        Self { first, second }
    }

    /// Normalized advantage of the first lineage, `(L1 - L2) / (L1 + L2)`.
    pub fn payoff(&self) -> Result<f64> {
        payoff(self.first, self.second)
    }

    pub fn swapped(&self) -> Self {
        Self::new(self.second, self.first)
    }
}

pub fn payoff(l1: f64, l2: f64) -> Result<f64> {
    let total = l1 + l2;
    if total == 0.0 || !total.is_finite() || l1.is_nan() || l2.is_nan() {
        return Err(SimulationError::UndefinedPayoff { l1, l2 });
    }
    Ok((l1 - l2) / total)
}
