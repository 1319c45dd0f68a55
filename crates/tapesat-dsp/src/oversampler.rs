/// Fixed-ratio oversampling wrapper for anti-aliased nonlinear processing.
///
/// The hysteresis nonlinearity generates harmonics above the base-rate
/// Nyquist; running it at N× and lowpass filtering before decimation keeps
/// that energy from folding back into the audible band. The ratio is a
/// compile-time constant — a fixed compute multiplier in exchange for a
/// deterministic per-callback budget.
///
/// Signal path per base-rate sample:
///
///   zero-stuff to N sub-samples (×N gain) -> AA lowpass -> inner processor
///   -> AA lowpass -> keep the last sub-sample (decimation)
///
/// Both anti-aliasing cascades are 4th-order Butterworth (two RBJ biquads)
/// with the cutoff tied to the *base* rate but realized at the oversampled
/// rate, so the coefficients must be recomputed — not reused — whenever the
/// base rate changes. Stale coefficients either under-attenuate (audible
/// aliasing) or over-ring.

use crate::SampleProcessor;
use crate::filters::{Biquad, FilterKind};

/// Q pair for a 4th-order Butterworth cascade.
const AA_Q: [f64; 2] = [0.541_196_100, 1.306_562_965];

/// Anti-aliasing cutoff as a fraction of the base sample rate (0.9 of the
/// base Nyquist, leaving a transition band before the fold-over point).
const AA_CUTOFF_FRACTION: f64 = 0.45;

/// N× oversampler around an inner per-sample processor.
pub struct Oversampler<const N: usize, P> {
    inner: P,
    up: [Biquad; 2],
    down: [Biquad; 2],
}

impl<const N: usize, P: SampleProcessor> Oversampler<N, P> {
    /// Wrap `inner`, with anti-aliasing filters designed for `base_rate`.
    /// The inner processor's own rate is the caller's business — it must be
    /// run at `base_rate * N`.
    pub fn new(inner: P, base_rate: f64) -> Self {
        let mut os = Self {
            inner,
            up: [Biquad::new(), Biquad::new()],
            down: [Biquad::new(), Biquad::new()],
        };
        os.reset(base_rate);
        os
    }

    /// Recompute anti-aliasing coefficients for a new base rate and clear
    /// the filter delay lines. Does not touch the inner processor.
    pub fn reset(&mut self, base_rate: f64) {
        let os_rate = base_rate * N as f64;
        let cutoff_norm = AA_CUTOFF_FRACTION * base_rate / os_rate;
        for (section, q) in self.up.iter_mut().zip(AA_Q) {
            section.reset();
            section.set_parameters(FilterKind::Lowpass, cutoff_norm, q, 1.0);
        }
        for (section, q) in self.down.iter_mut().zip(AA_Q) {
            section.reset();
            section.set_parameters(FilterKind::Lowpass, cutoff_norm, q, 1.0);
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    /// Process one base-rate sample through the oversampled inner processor.
    pub fn process(&mut self, x: f64) -> f64 {
        let mut y = 0.0;
        for i in 0..N {
            // Zero-stuffing: the energy lands in the first sub-sample,
            // scaled by N to keep unity passband gain after filtering.
            let mut s = if i == 0 { x * N as f64 } else { 0.0 };
            for section in &mut self.up {
                s = section.process(s);
            }

            let mut d = self.inner.process(s);

            for section in &mut self.down {
                d = section.process(d);
            }
            // Every sub-sample feeds the filter state; only the last one
            // survives decimation.
            y = d;
        }
        y
    }
}
