//! One head-to-head competition between two strategies.

use crate::error::Result;
use crate::integrator::{integrate, IntegratorSettings, TimeGrid};
use crate::model::{CompetitionModel, InitialConditions, RateConstants};
use crate::payoff::LysogenOutcome;
use log::trace;
use std::marker::PhantomData;

/// Plays `first` against `second` and reports the final lysogen totals.
///
/// Drivers are generic over this trait, so enumeration order and record
/// handling can be exercised without integrating anything.
pub trait Contest<S> {
    fn play(&mut self, first: S, second: S) -> Result<LysogenOutcome>;
}

impl<S, F> Contest<S> for F
where
    F: FnMut(S, S) -> Result<LysogenOutcome>,
{
    fn play(&mut self, first: S, second: S) -> Result<LysogenOutcome> {
        self(first, second)
    }
}

/// Integrates model `M` for each pairing.
#[derive(Debug, Clone)]
pub struct OdeContest<M> {
    pub rates: RateConstants,
    pub initial: InitialConditions,
    pub time: TimeGrid,
    pub integrator: IntegratorSettings,
    model: PhantomData<M>,
}

impl<M: CompetitionModel> OdeContest<M> {
    pub fn new(
        rates: RateConstants,
        initial: InitialConditions,
        time: TimeGrid,
        integrator: IntegratorSettings,
    ) -> Result<Self> {
        rates.validate()?;
        initial.validate()?;
        time.validate()?;
        integrator.validate()?;
        Ok(Self {
            rates,
            initial,
            time,
            integrator,
            model: PhantomData,
        })
    }
}

impl<M: CompetitionModel> Contest<M::Strategy> for OdeContest<M> {
    fn play(&mut self, first: M::Strategy, second: M::Strategy) -> Result<LysogenOutcome> {
        let model = M::new(self.rates, first, second)?;
        let y0 = model.initial_state(&self.initial);
        let trajectory = integrate(&model, &y0, &self.time, &self.integrator)?;
        trace!(
            "{first:?} vs {second:?}: {} accepted, {} rejected, {} switches",
            trajectory.stats.accepted,
            trajectory.stats.rejected,
            trajectory.stats.switches
        );
        Ok(model.final_lysogens(&trajectory))
    }
}
