use crate::traits::{DynamicalSystem, Scalar};
use nalgebra::DMatrix;
use num_traits::{One, Zero};
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Rem for Dual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // Piecewise identity in self; the jump points are ignored.
        Self::new(self.val % rhs.val, self.eps)
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Scalar for Dual {
    fn from_f64(value: f64) -> Self {
        Self::constant(value)
    }

    fn value(self) -> f64 {
        self.val
    }
}

/// Jacobian `∂f/∂x` at `(t, x)`, one dual sweep per column.
pub fn jacobian<S: DynamicalSystem<Dual>>(system: &S, t: f64, x: &[f64]) -> DMatrix<f64> {
    let n = x.len();
    let mut jac = DMatrix::zeros(n, n);
    let mut dual_x = vec![Dual::zero(); n];
    let mut dual_out = vec![Dual::zero(); n];
    let t_dual = Dual::constant(t);

    for j in 0..n {
        for (i, slot) in dual_x.iter_mut().enumerate() {
            *slot = Dual::new(x[i], if i == j { 1.0 } else { 0.0 });
        }
        system.apply(t_dual, &dual_x, &mut dual_out);
        for (i, value) in dual_out.iter().enumerate() {
            jac[(i, j)] = value.eps;
        }
    }

    jac
}

/// Explicit time derivative `∂f/∂t` at `(t, x)`. Zero for autonomous flows.
pub fn time_derivative<S: DynamicalSystem<Dual>>(system: &S, t: f64, x: &[f64], out: &mut [f64]) {
    let dual_x: Vec<Dual> = x.iter().map(|&v| Dual::constant(v)).collect();
    let mut dual_out = vec![Dual::zero(); x.len()];
    system.apply(Dual::new(t, 1.0), &dual_x, &mut dual_out);
    for (slot, value) in out.iter_mut().zip(&dual_out) {
        *slot = value.eps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rotation {
        omega: f64,
    }

    impl<T: Scalar> DynamicalSystem<T> for Rotation {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, t: T, x: &[T], out: &mut [T]) {
            let w = T::from_f64(self.omega);
            out[0] = -w * x[1] * x[0];
            out[1] = w * x[0] + t * t;
        }
    }

    #[test]
    fn dual_arithmetic_follows_product_and_quotient_rules() {
        let x = Dual::new(3.0, 1.0);
        let y = Dual::constant(2.0);
        let prod = x * x * y;
        assert_eq!(prod.val, 18.0);
        assert_eq!(prod.eps, 12.0);

        let quot = y / x;
        assert!((quot.val - 2.0 / 3.0).abs() < 1e-15);
        assert!((quot.eps + 2.0 / 9.0).abs() < 1e-15);
    }

    #[test]
    fn jacobian_matches_hand_derivative() {
        let system = Rotation { omega: 2.0 };
        let jac = jacobian(&system, 0.5, &[1.5, -0.5]);
        // f0 = -w x1 x0, f1 = w x0 + t^2
        assert!((jac[(0, 0)] - 1.0).abs() < 1e-14);
        assert!((jac[(0, 1)] + 3.0).abs() < 1e-14);
        assert!((jac[(1, 0)] - 2.0).abs() < 1e-14);
        assert_eq!(jac[(1, 1)], 0.0);
    }

    #[test]
    fn time_derivative_picks_up_explicit_time_dependence() {
        let system = Rotation { omega: 2.0 };
        let mut dt = [0.0; 2];
        time_derivative(&system, 0.5, &[1.5, -0.5], &mut dt);
        assert_eq!(dt[0], 0.0);
        assert!((dt[1] - 1.0).abs() < 1e-14);
    }
}
