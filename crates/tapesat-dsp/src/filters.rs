/// Shared filter primitives for the tape saturation signal chain.
///
/// All filters: construct, `process(sample) -> sample`, `reset()`.
/// Coefficients are expressed in normalized frequency (cycles per sample)
/// so they must be recomputed whenever the operating sample rate changes.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Biquad response shape (Audio EQ Cookbook formulas).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// Biquad filter — Direct Form II Transposed.
///
/// General-purpose second-order IIR filter. Starts as a unity pass-through;
/// call [`Biquad::set_parameters`] to give it a response.
#[derive(Clone)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    s1: f64,
    s2: f64,
}

impl Biquad {
    pub fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            s1: 0.0,
            s2: 0.0,
        }
    }

    /// Recompute coefficients without touching filter state.
    ///
    /// `cutoff_norm` is the cutoff in cycles per sample (cutoff_hz / sample_rate),
    /// valid in (0, 0.5). `gain` is a plain linear output scale.
    pub fn set_parameters(&mut self, kind: FilterKind, cutoff_norm: f64, q: f64, gain: f64) {
        let w0 = 2.0 * PI * cutoff_norm;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let (b0, b1, b2) = match kind {
            FilterKind::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterKind::Highpass => {
                let b1 = -(1.0 + cos_w0);
                (-b1 / 2.0, b1, -b1 / 2.0)
            }
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        self.b0 = gain * b0 / a0;
        self.b1 = gain * b1 / a0;
        self.b2 = gain * b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process one sample (Direct Form II Transposed).
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.s1;
        self.s1 = self.b1 * x - self.a1 * y + self.s2;
        self.s2 = self.b2 * x - self.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

/// Cutoff for the output DC blocker. Well below the audio band so the
/// highpass never eats musical low end, high enough to drain the offset an
/// asymmetric hysteresis loop injects within tens of milliseconds.
const DC_CUTOFF_HZ: f64 = 30.0;

/// DC blocker — biquad highpass at 30 Hz, Butterworth Q.
pub struct DcBlocker {
    hpf: Biquad,
}

impl DcBlocker {
    pub fn new(sample_rate: f64) -> Self {
        let mut hpf = Biquad::new();
        hpf.set_parameters(
            FilterKind::Highpass,
            DC_CUTOFF_HZ / sample_rate,
            FRAC_1_SQRT_2,
            1.0,
        );
        Self { hpf }
    }

    /// Recompute the normalized cutoff for a new base sample rate.
    /// Filter state is kept; the response moves on the next sample.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.hpf.set_parameters(
            FilterKind::Highpass,
            DC_CUTOFF_HZ / sample_rate,
            FRAC_1_SQRT_2,
            1.0,
        );
    }

    pub fn process(&mut self, x: f64) -> f64 {
        self.hpf.process(x)
    }

    pub fn reset(&mut self) {
        self.hpf.reset();
    }
}

/// Final safety limiter — tanh soft clip, output strictly inside (-1, 1).
#[inline]
pub fn soft_limit(x: f64) -> f64 {
    x.tanh()
}
