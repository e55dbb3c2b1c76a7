use crate::autodiff::Dual;
use num_traits::{NumOps, One, Zero};
use std::fmt::Debug;
use std::ops::Neg;

/// A trait for types that can be used as scalars in our population models.
/// Implemented by `f64` for plain evaluation and by [`Dual`] for exact Jacobians.
pub trait Scalar: Copy + Debug + Zero + One + NumOps + Neg<Output = Self> + 'static {
    /// Lifts a constant into the scalar type.
    fn from_f64(value: f64) -> Self;

    /// The real part of the scalar.
    fn value(self) -> f64;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn value(self) -> f64 {
        self
    }
}

/// Represents an autonomous or time-dependent flow `dx/dt = f(t, x)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// x: current state
    /// t: current time
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A flow that can be evaluated both on `f64` and on dual numbers,
/// which is what the implicit stepper needs to build its Jacobian.
pub trait OdeSystem: DynamicalSystem<f64> + DynamicalSystem<Dual> {}

impl<S> OdeSystem for S where S: DynamicalSystem<f64> + DynamicalSystem<Dual> {}

/// A trait for fixed-step solvers that can step a system forward.
pub trait Steppable {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    fn step(&mut self, system: &impl DynamicalSystem<f64>, t: &mut f64, state: &mut [f64], dt: f64);
}
