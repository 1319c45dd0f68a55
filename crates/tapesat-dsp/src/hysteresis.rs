/// Magnetic hysteresis model — Jiles-Atherton differential equation.
///
/// Models tape magnetization M as a first-order stiff nonlinear ODE of the
/// instantaneous input field H and its time derivative:
///
///   dM/dt = H' * (f1 + f2) / f3
///
///   f1 = (1-c) * delta_M * (M_an - M) / ((1-c) * delta * k - alpha * (M_an - M))
///   f2 = c * (M_s/a) * L'(Q)
///   f3 = 1 - c * alpha * (M_s/a) * L'(Q)
///
/// where M_an = M_s * L(Q) is the anhysteretic magnetization, L is the
/// Langevin function, Q = (H + alpha*M) / a, delta tracks the sign of H',
/// and delta_M gates irreversible wall motion to the half-loop being
/// traversed. The three control values map onto the physical parameters:
///
///   saturation -> M_s (saturation magnetization)
///   drive      -> a   (anhysteretic shape / effective field scale)
///   width      -> c   (reversibility, i.e. loop width)
///
/// The equation is stiff near the saturation knees, so the step is advanced
/// by a selectable integrator (see [`crate::solver`]); the implicit variants
/// run a fixed-count Newton-Raphson correction using the analytic dM
/// derivative computed here.

use crate::SampleProcessor;
use crate::solver::{SolverKind, State, advance};

/// Inter-domain mean-field coupling. Fixed; not exposed as a control.
const ALPHA: f64 = 1.6e-3;

/// State clamp bound for the standard coefficient mapping. One bad step must
/// never leave the model emitting non-finite samples, so anything past this
/// is treated as divergence.
const UPPER_LIM: f64 = 20.0;

/// Clamp bound for the vintage mapping, whose magnetization scale is ~5e4
/// larger.
const UPPER_LIM_VINTAGE: f64 = 1.0e6;

/// Derived physical coefficients, recomputed by [`Hysteresis::cook`] and on
/// sample-rate changes. Everything the per-step math needs, with the shared
/// products precomputed once per block instead of once per sub-sample.
#[derive(Clone, Copy)]
pub struct Coefficients {
    /// Saturation magnetization
    pub m_s: f64,
    /// Anhysteretic shape parameter (effective field scale)
    pub a: f64,
    /// Pinning-loss coefficient
    pub k: f64,
    /// Reversibility (loop width)
    pub c: f64,
    /// Mean-field coupling
    pub alpha: f64,
    // Precomputed products
    nc: f64,
    m_s_oa: f64,
    m_s_oa_talpha: f64,
    m_s_oa_tc: f64,
    m_s_oa_tc_talpha: f64,
    /// Time step at the (oversampled) operating rate
    pub t: f64,
    /// Damped trapezoidal weight for the implicit solvers: T / 1.9.
    /// Slightly under the true trapezoidal T/2 — trades a little accuracy
    /// for a stability margin near the saturation knees.
    pub t_alpha: f64,
    /// Divergence clamp for the magnetization state
    pub upper_lim: f64,
}

impl Coefficients {
    fn new(sample_rate: f64) -> Self {
        let mut coeffs = Self {
            m_s: 1.0,
            a: 1.0,
            k: 0.47875,
            c: 0.7,
            alpha: ALPHA,
            nc: 0.0,
            m_s_oa: 0.0,
            m_s_oa_talpha: 0.0,
            m_s_oa_tc: 0.0,
            m_s_oa_tc_talpha: 0.0,
            t: 1.0 / sample_rate,
            t_alpha: 1.0 / (sample_rate * 1.9),
            upper_lim: UPPER_LIM,
        };
        coeffs.cook(0.5, 0.5, 0.5, false);
        coeffs
    }

    /// Map the three bounded control values onto the physical parameters.
    ///
    /// Inputs are clamped to [0, 1] here — the model has no error channel,
    /// and out-of-range controls must degrade to the nearest valid setting.
    /// `vintage` selects an alternate mapping with a much hotter drive curve
    /// and a far stiffer loop (the original hardware-emulation tuning).
    fn cook(&mut self, drive: f64, width: f64, sat: f64, vintage: bool) {
        let drive = drive.clamp(0.0, 1.0);
        let width = width.clamp(0.0, 1.0);
        let sat = sat.clamp(0.0, 1.0);

        self.m_s = 0.5 + 1.5 * (1.0 - sat);
        self.a = self.m_s / (0.01 + 6.0 * drive);
        self.c = (1.0 - width).sqrt() - 0.01;
        self.k = 0.47875;
        self.upper_lim = UPPER_LIM;

        if vintage {
            self.k = 27.0e3;
            self.c = 1.7e-1;
            self.m_s *= 50_000.0;
            self.a = self.m_s / (5.0 + 12.0 * (1.0 - drive));
            self.upper_lim = UPPER_LIM_VINTAGE;
        }

        self.nc = 1.0 - self.c;
        self.m_s_oa = self.m_s / self.a;
        self.m_s_oa_talpha = self.alpha * self.m_s_oa;
        self.m_s_oa_tc = self.c * self.m_s_oa;
        self.m_s_oa_tc_talpha = self.alpha * self.m_s_oa_tc;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.t = 1.0 / sample_rate;
        self.t_alpha = self.t / 1.9;
    }

    /// dM/dt for the current coefficients at magnetization `m`, field `h`,
    /// field derivative `h_d`. Pure function of its arguments — no state is
    /// cached between calls, so every solver variant sees the same physics.
    pub fn dmdt(&self, m: f64, h: f64, h_d: f64) -> f64 {
        let q = (h + self.alpha * m) / self.a;
        let m_diff = self.m_s * langevin(q) - m;
        let delta = if h_d >= 0.0 { 1.0 } else { -1.0 };
        // Irreversible wall motion only acts when the field pushes the
        // magnetization toward the anhysteretic curve.
        let delta_m = if delta * m_diff >= 0.0 { 1.0 } else { 0.0 };
        let l_prime = langevin_d(q);

        let f1_denom = self.nc * delta * self.k - self.alpha * m_diff;
        let f1 = self.nc * delta_m * m_diff / f1_denom;
        let f2 = self.m_s_oa_tc * l_prime;
        let f3 = 1.0 - self.m_s_oa_tc_talpha * l_prime;

        h_d * (f1 + f2) / f3
    }

    /// dM/dt together with its analytic partial derivative with respect to M,
    /// for the Newton-Raphson correction of the implicit solvers. Shares the
    /// intermediate terms with [`Coefficients::dmdt`] so one call costs about
    /// as much as the plain evaluation.
    pub fn dmdt_and_jacobian(&self, m: f64, h: f64, h_d: f64) -> (f64, f64) {
        let q = (h + self.alpha * m) / self.a;
        let m_diff = self.m_s * langevin(q) - m;
        let delta = if h_d >= 0.0 { 1.0 } else { -1.0 };
        let delta_m = if delta * m_diff >= 0.0 { 1.0 } else { 0.0 };
        let l_prime = langevin_d(q);
        let l_prime2 = langevin_d2(q);

        let kap = self.nc * delta_m;
        let f1_denom = self.nc * delta * self.k - self.alpha * m_diff;
        let f1 = kap * m_diff / f1_denom;
        let f2 = self.m_s_oa_tc * l_prime;
        let f3 = 1.0 - self.m_s_oa_tc_talpha * l_prime;
        let dmdt = h_d * (f1 + f2) / f3;

        // dQ/dM = alpha / a; chain everything through it.
        let m_diff_p = self.m_s_oa_talpha * l_prime - 1.0;
        let f1_p = kap * (m_diff_p / f1_denom
            + m_diff * self.alpha * m_diff_p / (f1_denom * f1_denom));
        let f2_p = self.m_s_oa_tc * l_prime2 * (self.alpha / self.a);
        let f3_p = -self.m_s_oa_tc_talpha * l_prime2 * (self.alpha / self.a);
        let dmdt_p = h_d * ((f1_p + f2_p) * f3 - (f1 + f2) * f3_p) / (f3 * f3);

        (dmdt, dmdt_p)
    }
}

/// Langevin function L(x) = coth(x) - 1/x, with its Taylor limit x/3 near
/// zero where the closed form cancels catastrophically.
fn langevin(x: f64) -> f64 {
    if x.abs() > 1e-4 {
        1.0 / x.tanh() - 1.0 / x
    } else {
        x / 3.0
    }
}

/// First derivative of the Langevin function.
fn langevin_d(x: f64) -> f64 {
    if x.abs() > 1e-4 {
        let coth = 1.0 / x.tanh();
        1.0 / (x * x) - coth * coth + 1.0
    } else {
        1.0 / 3.0
    }
}

/// Second derivative of the Langevin function.
fn langevin_d2(x: f64) -> f64 {
    if x.abs() > 1e-3 {
        let coth = 1.0 / x.tanh();
        2.0 * coth * (coth * coth - 1.0) - 2.0 / (x * x * x)
    } else {
        -2.0 * x / 15.0
    }
}

/// Per-sample hysteresis processor.
///
/// Owns the magnetization state and the derived coefficients; the numerical
/// step itself is delegated to the selected [`SolverKind`]. Runs at the
/// oversampled rate when wrapped in [`crate::oversampler::Oversampler`].
pub struct Hysteresis {
    solver: SolverKind,
    coeffs: Coefficients,
    /// Magnetization from the previous step
    m_n1: f64,
    /// Input field from the previous step
    h_n1: f64,
    /// Field derivative from the previous step
    h_d_n1: f64,
}

impl Hysteresis {
    /// Create a model running at `sample_rate` (the oversampled rate when
    /// used inside an oversampling wrapper). Coefficients start at the
    /// mid-position of all three controls.
    pub fn new(sample_rate: f64) -> Self {
        Self {
            solver: SolverKind::Nr4,
            coeffs: Coefficients::new(sample_rate),
            m_n1: 0.0,
            h_n1: 0.0,
            h_d_n1: 0.0,
        }
    }

    /// Zero the magnetization state. Coefficients are untouched.
    pub fn reset(&mut self) {
        self.m_n1 = 0.0;
        self.h_n1 = 0.0;
        self.h_d_n1 = 0.0;
    }

    /// Store a new operating rate and recompute the time step. Callers
    /// wrapping the model in an oversampler must pass the oversampled rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.coeffs.set_sample_rate(sample_rate);
    }

    /// Switch the integration scheme. Takes effect on the next `process`
    /// call; the magnetization state carries over unchanged.
    pub fn set_solver(&mut self, solver: SolverKind) {
        self.solver = solver;
    }

    pub fn solver(&self) -> SolverKind {
        self.solver
    }

    /// Recompute the physical coefficients from the three control values.
    /// O(1) and cheap relative to `process` — call at least once per block.
    pub fn cook(&mut self, drive: f64, width: f64, sat: f64, vintage: bool) {
        self.coeffs.cook(drive, width, sat, vintage);
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coeffs
    }

    /// Advance the magnetization one step for input field `h`.
    ///
    /// The field derivative is estimated with the bilinear rule
    /// `H' = (2/T)(H - H_prev) - H'_prev`. A non-finite solve falls back to
    /// the demagnetized state and runaway values are clamped, so the output
    /// is finite for any finite input.
    pub fn process(&mut self, h: f64) -> f64 {
        let h_d = (2.0 / self.coeffs.t) * (h - self.h_n1) - self.h_d_n1;

        let state = State {
            m: self.m_n1,
            h: self.h_n1,
            h_d: self.h_d_n1,
        };
        let mut m = advance(self.solver, &state, h, h_d, &self.coeffs);

        if !m.is_finite() {
            m = 0.0;
        } else {
            m = m.clamp(-self.coeffs.upper_lim, self.coeffs.upper_lim);
        }

        self.m_n1 = m;
        self.h_n1 = h;
        self.h_d_n1 = h_d;
        m
    }
}

impl SampleProcessor for Hysteresis {
    fn process(&mut self, sample: f64) -> f64 {
        Hysteresis::process(self, sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const SR: f64 = 48000.0 * 4.0;

    fn run_sine(hyst: &mut Hysteresis, freq: f64, amp: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| hyst.process(amp * (2.0 * PI * freq * i as f64 / SR).sin()))
            .collect()
    }

    #[test]
    fn test_output_finite_for_all_solvers() {
        for solver in [SolverKind::Rk2, SolverKind::Rk4, SolverKind::Nr2, SolverKind::Nr4] {
            let mut hyst = Hysteresis::new(SR);
            hyst.set_solver(solver);
            hyst.cook(1.0, 0.0, 1.0, false);

            // xorshift64 fuzz: inputs in [-1, 1], hostile control churn
            let mut rng: u64 = 0x243F_6A88_85A3_08D3;
            let mut next = || {
                rng ^= rng << 13;
                rng ^= rng >> 7;
                rng ^= rng << 17;
                (rng >> 11) as f64 / (1u64 << 53) as f64
            };
            for i in 0..20_000 {
                if i % 512 == 0 {
                    hyst.cook(next(), next(), next(), false);
                }
                let x = 2.0 * next() - 1.0;
                let y = hyst.process(x);
                assert!(
                    y.is_finite() && y.abs() <= UPPER_LIM,
                    "{solver:?} diverged at sample {i}: {y}"
                );
            }
        }
    }

    #[test]
    fn test_vintage_mapping_finite() {
        let mut hyst = Hysteresis::new(SR);
        hyst.cook(0.8, 0.5, 0.5, true);
        for i in 0..10_000 {
            let x = (2.0 * PI * 220.0 * i as f64 / SR).sin();
            let y = hyst.process(x);
            assert!(y.is_finite(), "vintage mode diverged at {i}: {y}");
        }
    }

    #[test]
    fn test_reset_returns_to_quiescence() {
        let mut hyst = Hysteresis::new(SR);
        hyst.cook(0.9, 0.3, 0.2, false);
        run_sine(&mut hyst, 1000.0, 1.0, 4096);

        hyst.reset();
        // Zero input after reset must stay at the zero-state fixed point.
        for _ in 0..1024 {
            let y = hyst.process(0.0);
            assert!(y.abs() < 1e-9, "state not quiescent after reset: {y}");
        }
    }

    #[test]
    fn test_solver_consistency_low_amplitude() {
        // For a gentle signal every integrator must land on the same
        // physics. Within a family the trajectories track tightly; across
        // families the implicit T/1.9 damping weight biases the step by a
        // few 1e-3 relative to the explicit trajectory, so the cross-family
        // bound is correspondingly looser.
        let freq = 100.0;
        let n = 2048;
        let run = |solver: SolverKind| {
            let mut hyst = Hysteresis::new(SR);
            hyst.set_solver(solver);
            hyst.cook(0.5, 0.5, 0.5, false);
            run_sine(&mut hyst, freq, 0.1, n)
        };

        let rk4 = run(SolverKind::Rk4);
        let rk2 = run(SolverKind::Rk2);
        let nr4 = run(SolverKind::Nr4);
        let nr2 = run(SolverKind::Nr2);

        for i in 0..n {
            assert_abs_diff_eq!(rk2[i], rk4[i], epsilon = 2e-3);
            assert_abs_diff_eq!(nr2[i], nr4[i], epsilon = 1e-9);
            assert_abs_diff_eq!(nr4[i], rk4[i], epsilon = 1e-2);
        }
    }

    #[test]
    fn test_saturation_produces_harmonics() {
        let mut hyst = Hysteresis::new(SR);
        hyst.cook(1.0, 0.5, 1.0, false);

        let freq = 440.0;
        let n = (SR * 0.1) as usize;
        let out = run_sine(&mut hyst, freq, 1.0, n);

        let start = n / 2;
        let h1 = dft_magnitude(&out[start..], freq, SR);
        let h3 = dft_magnitude(&out[start..], 3.0 * freq, SR);

        assert!(h1 > 1e-3, "fundamental missing: {h1:.2e}");
        assert!(
            h3 > h1 * 1e-3,
            "hard drive should generate odd harmonics: h1={h1:.2e} h3={h3:.2e}"
        );
    }

    #[test]
    fn test_loop_memory() {
        // Hysteresis means the state after a field excursion differs from
        // the state before it, even once the input returns to zero.
        let mut hyst = Hysteresis::new(SR);
        hyst.cook(0.8, 0.2, 0.5, false);

        // Half-cycle push up and back to zero
        let n = (SR / 100.0) as usize;
        let mut last = 0.0;
        for i in 0..n {
            last = hyst.process((PI * i as f64 / n as f64).sin());
        }
        assert!(
            last.abs() > 1e-4,
            "remanent magnetization expected after excursion, got {last}"
        );
    }

    #[test]
    fn test_cook_clamps_controls() {
        let mut hyst = Hysteresis::new(SR);
        hyst.cook(5.0, -3.0, 7.0, false);
        let c = *hyst.coefficients();
        assert!(c.m_s > 0.0 && c.a > 0.0 && c.t > 0.0);

        for i in 0..4096 {
            let y = hyst.process((2.0 * PI * 500.0 * i as f64 / SR).sin());
            assert!(y.is_finite());
        }
    }

    #[test]
    fn test_langevin_taylor_matches_closed_form() {
        // Just above each switchover the closed form must agree with the
        // small-x limit the other branch would return at the same point.
        // Tolerances cover the closed form's cancellation error there.
        let x = 1.2e-4;
        assert_abs_diff_eq!(langevin(x), x / 3.0, epsilon = 1e-10);
        assert_abs_diff_eq!(langevin_d(x), 1.0 / 3.0, epsilon = 1e-6);
        let x = 1.2e-3;
        assert_abs_diff_eq!(langevin_d2(x), -2.0 * x / 15.0, epsilon = 1e-5);
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let coeffs = Coefficients::new(SR);
        let (h, h_d) = (0.3, 1000.0);
        for m in [-0.8, -0.1, 0.0, 0.2, 0.9] {
            let (_, jac) = coeffs.dmdt_and_jacobian(m, h, h_d);
            let eps = 1e-7;
            let fd = (coeffs.dmdt(m + eps, h, h_d) - coeffs.dmdt(m - eps, h, h_d)) / (2.0 * eps);
            assert_abs_diff_eq!(jac, fd, epsilon = fd.abs().max(1.0) * 1e-4);
        }
    }

    fn dft_magnitude(signal: &[f64], freq: f64, sr: f64) -> f64 {
        let n = signal.len() as f64;
        let mut re = 0.0;
        let mut im = 0.0;
        for (i, &s) in signal.iter().enumerate() {
            let phase = 2.0 * PI * freq * i as f64 / sr;
            re += s * phase.cos();
            im -= s * phase.sin();
        }
        ((re / n).powi(2) + (im / n).powi(2)).sqrt()
    }
}
