use edgerefine_core::Real;
use serde::{Deserialize, Serialize};

/// Default Tukey cutoff, in units of the residual scale.
pub const TUKEY_DEFAULT_C: Real = 4.365;

/// Robust loss kernels applied to scalar residuals.
///
/// `rho` follows the convention `rho(s)` with `s = r^2`, `rho(s) ≈ s` near
/// zero and `rho'(0) = 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustKernel {
    /// No robustness, pure L2 (quadratic).
    #[default]
    None,
    /// Tukey biweight with cutoff `c`; residuals beyond `c` have no influence.
    Tukey { c: Real },
}

impl RobustKernel {
    /// Return `rho(r^2)` and the IRLS weight `rho'(r^2)` for a squared residual.
    pub fn rho_and_weight(self, r2: Real) -> (Real, Real) {
        match self {
            RobustKernel::None => (r2, 1.0),
            RobustKernel::Tukey { c } => {
                let c2 = c * c;
                if r2 >= c2 {
                    (c2 / 3.0, 0.0)
                } else {
                    let t = 1.0 - r2 / c2;
                    (c2 / 3.0 * (1.0 - t * t * t), t * t)
                }
            }
        }
    }

    /// Scale taking a residual `r` to `sign(r) * sqrt(rho(r^2))`.
    ///
    /// Summing the squares of scaled residuals yields `sum(rho)`.
    pub fn residual_scale(self, r: Real) -> Real {
        let r2 = r * r;
        if r2 <= Real::EPSILON {
            return 1.0;
        }
        let (rho, _) = self.rho_and_weight(r2);
        rho.sqrt() / r.abs()
    }

    /// Derivative of the scaled residual with respect to `r`:
    /// `rho'(r^2) * |r| / sqrt(rho(r^2))`. Zero past the Tukey cutoff.
    pub fn jacobian_scale(self, r: Real) -> Real {
        let r2 = r * r;
        if r2 <= Real::EPSILON {
            return 1.0;
        }
        let (rho, w) = self.rho_and_weight(r2);
        if rho <= 0.0 {
            return 0.0;
        }
        w * r.abs() / rho.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Real, b: Real, tol: Real) {
        assert!(
            (a - b).abs() <= tol,
            "values differ: {} vs {} (tol={})",
            a,
            b,
            tol
        );
    }

    #[test]
    fn tukey_matches_l2_near_zero() {
        let kernel = RobustKernel::Tukey { c: 4.365 };
        let r2 = 1e-4;
        let (rho, w) = kernel.rho_and_weight(r2);
        approx_eq(rho, r2, 1e-8);
        approx_eq(w, 1.0, 1e-4);
        approx_eq(kernel.residual_scale(1e-2), 1.0, 1e-4);
        approx_eq(kernel.jacobian_scale(1e-2), 1.0, 1e-4);
    }

    #[test]
    fn tukey_saturates_beyond_cutoff() {
        let c = 3.0;
        let kernel = RobustKernel::Tukey { c };
        let (rho, w) = kernel.rho_and_weight(100.0);
        approx_eq(rho, c * c / 3.0, 1e-12);
        approx_eq(w, 0.0, 1e-12);
        approx_eq(kernel.jacobian_scale(10.0), 0.0, 1e-12);
        let (rho_edge, _) = kernel.rho_and_weight(c * c - 1e-9);
        approx_eq(rho_edge, c * c / 3.0, 1e-6);
    }

    #[test]
    fn jacobian_scale_matches_finite_difference() {
        let kernel = RobustKernel::Tukey { c: 4.365 };
        let scaled = |r: Real| r * kernel.residual_scale(r);
        for r in [-3.0, -0.7, 0.4, 1.9, 3.5] {
            let h = 1e-6;
            let fd = (scaled(r + h) - scaled(r - h)) / (2.0 * h);
            approx_eq(kernel.jacobian_scale(r), fd, 1e-5);
        }
    }

    fn irls_constant_fit(y: &[Real], kernel: RobustKernel, iters: usize) -> Real {
        let mut x = y.iter().copied().sum::<Real>() / (y.len() as Real);
        for _ in 0..iters {
            let mut num = 0.0;
            let mut den = 0.0;
            for &yi in y {
                let r = x - yi;
                let (_, w) = kernel.rho_and_weight(r * r);
                num += w * yi;
                den += w;
            }
            if den > 0.0 {
                x = num / den;
            }
        }
        x
    }

    #[test]
    fn tukey_irls_rejects_outliers() {
        let mut y = vec![0.9, 1.0, 1.1, 0.95, 1.05];
        y.push(9.0);
        y.push(-5.0);

        let inlier_mean = y[..5].iter().copied().sum::<Real>() / 5.0;
        let x_none = irls_constant_fit(&y, RobustKernel::None, 10);
        let x_tukey = irls_constant_fit(&y, RobustKernel::Tukey { c: 2.0 }, 20);

        let err_none = (x_none - inlier_mean).abs();
        let err_tukey = (x_tukey - inlier_mean).abs();
        assert!(
            err_tukey < 1e-6 && err_tukey < err_none,
            "Tukey should ignore outliers: err_none {}, err_tukey {}",
            err_none,
            err_tukey
        );
    }
}
