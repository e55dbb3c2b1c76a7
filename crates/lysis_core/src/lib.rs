//! Numerical experiments on phage/bacteria competition.
//!
//! The crate integrates lysogeny-versus-lysis competition models and drives
//! them through two experiments: an exhaustive payoff matrix over single-stage
//! strategies and a randomized competitive search over three-stage
//! (multiplicity-dependent) strategies. A stochastic lattice automaton offers a
//! spatial counterpart.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (flows), `Steppable` (fixed-step solvers).
//! - **Solvers / Integrator**: Tsit5, Rosenbrock23 with dual-number Jacobians, automatic stiffness switching, dense output onto sample grids.
//! - **Models**: the single-stage and three-stage competition systems, generic over the scalar type.
//! - **Drivers**: `GridSweep` (payoff matrix), `CompetitiveSearch` (MOI search), `LatticeSimulation`.
//! - **Recorder**: line-oriented output sinks.
pub mod autodiff;
pub mod config;
pub mod contest;
pub mod error;
pub mod grid;
pub mod integrator;
pub mod lattice;
pub mod model;
pub mod payoff;
pub mod random;
pub mod recorder;
pub mod search;
pub mod solvers;
pub mod sweep;
pub mod traits;

pub use error::{Result, SimulationError};
