/// Per-step ODE integrators for the hysteresis equation.
///
/// Every variant advances the same physics — dM/dt from
/// [`Coefficients::dmdt`] — and differs only in order of accuracy and in
/// whether an implicit Newton-Raphson correction runs. Each step is a pure
/// function of (previous state, new input, coefficients): no variant keeps
/// private state, so switching schemes mid-stream is always safe.
///
/// Cost per sample is fixed for all variants. The implicit ones use a hard
/// iteration count (2 or 4), never an error-driven loop, to keep worst-case
/// time per audio callback bounded.

use crate::hysteresis::Coefficients;

/// Integration scheme selector.
///
/// - `Rk2` / `Rk4`: explicit Runge-Kutta, cheapest / most accurate explicit.
/// - `Nr2` / `Nr4`: damped-trapezoidal implicit step solved by 2 or 4
///   Newton-Raphson iterations; best behaved near hard saturation knees.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SolverKind {
    Rk2,
    Rk4,
    Nr2,
    #[default]
    Nr4,
}

/// Snapshot of the model state entering a step.
#[derive(Clone, Copy, Default)]
pub struct State {
    /// Magnetization
    pub m: f64,
    /// Input field
    pub h: f64,
    /// Input field derivative
    pub h_d: f64,
}

/// Advance the magnetization one time step.
pub fn advance(kind: SolverKind, state: &State, h: f64, h_d: f64, c: &Coefficients) -> f64 {
    match kind {
        SolverKind::Rk2 => rk2(state, h, h_d, c),
        SolverKind::Rk4 => rk4(state, h, h_d, c),
        SolverKind::Nr2 => newton(2, state, h, h_d, c),
        SolverKind::Nr4 => newton(4, state, h, h_d, c),
    }
}

/// Explicit midpoint (2nd order). Input and derivative are interpolated
/// linearly to the half step.
fn rk2(state: &State, h: f64, h_d: f64, c: &Coefficients) -> f64 {
    let h_mid = 0.5 * (h + state.h);
    let h_d_mid = 0.5 * (h_d + state.h_d);

    let k1 = c.t * c.dmdt(state.m, state.h, state.h_d);
    let k2 = c.t * c.dmdt(state.m + 0.5 * k1, h_mid, h_d_mid);
    state.m + k2
}

/// Classic 4-stage Runge-Kutta (4th order).
fn rk4(state: &State, h: f64, h_d: f64, c: &Coefficients) -> f64 {
    let h_mid = 0.5 * (h + state.h);
    let h_d_mid = 0.5 * (h_d + state.h_d);

    let k1 = c.t * c.dmdt(state.m, state.h, state.h_d);
    let k2 = c.t * c.dmdt(state.m + 0.5 * k1, h_mid, h_d_mid);
    let k3 = c.t * c.dmdt(state.m + 0.5 * k2, h_mid, h_d_mid);
    let k4 = c.t * c.dmdt(state.m + k3, h, h_d);
    state.m + (k1 + 2.0 * k2 + 2.0 * k3 + k4) / 6.0
}

/// Implicit damped-trapezoidal step:
///
///   M = M_prev + T_alpha * (f(M) + f(M_prev))
///
/// solved for M by `iterations` Newton-Raphson corrections on the residual
/// g(M) = M - M_prev - T_alpha * (f(M) + f_prev), with g'(M) from the
/// analytic Jacobian. The previous magnetization seeds the iteration —
/// per-sample steps are small enough that a fixed count converges.
fn newton(iterations: u32, state: &State, h: f64, h_d: f64, c: &Coefficients) -> f64 {
    let f_prev = c.dmdt(state.m, state.h, state.h_d);

    let mut m = state.m;
    for _ in 0..iterations {
        let (f, f_jac) = c.dmdt_and_jacobian(m, h, h_d);
        let residual = m - state.m - c.t_alpha * (f + f_prev);
        let slope = 1.0 - c.t_alpha * f_jac;
        m -= residual / slope;
    }
    m
}
