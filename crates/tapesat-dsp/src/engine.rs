/// Tape saturation engine — the full per-sample pipeline.
///
/// Signal flow per base-rate sample:
///
///   input (clamped to [-1, 1])
///     -> Oversampler (hysteresis ODE at 4x via the selected solver)
///     -> DC blocker (30 Hz highpass)
///     -> tanh soft limiter
///     -> output
///
/// The host delivers sample-rate changes asynchronously; the engine only
/// sets a dirty flag there and applies the recomputation at the top of the
/// next `process` call, so solver state is never mutated off the audio
/// thread. Controls are re-cooked every call — recomputation is O(1) and
/// far cheaper than the oversampled solve.

use crate::SampleProcessor;
use crate::filters::{DcBlocker, soft_limit};
use crate::hysteresis::Hysteresis;
use crate::oversampler::Oversampler;
use crate::solver::SolverKind;

/// Oversampling ratio. Fixed at compile time: 4x pushes the hysteresis
/// harmonics that matter well above the base-rate Nyquist at a deterministic
/// per-callback cost.
pub const OS_RATIO: usize = 4;

/// Full tape saturation pipeline with lazily applied sample-rate changes.
pub struct TapeEngine {
    oversample: Oversampler<OS_RATIO, Hysteresis>,
    dc_blocker: DcBlocker,
    sample_rate: f64,
    needs_sr_update: bool,
    drive: f64,
    width: f64,
    saturation: f64,
    vintage: bool,
}

impl TapeEngine {
    /// Create an engine for the given base sample rate. Controls start at
    /// their mid positions; the solver defaults to NR4.
    pub fn new(sample_rate: f64) -> Self {
        let mut hysteresis = Hysteresis::new(sample_rate * OS_RATIO as f64);
        hysteresis.set_solver(SolverKind::Nr4);

        Self {
            oversample: Oversampler::new(hysteresis, sample_rate),
            dc_blocker: DcBlocker::new(sample_rate),
            sample_rate,
            needs_sr_update: false,
            drive: 0.5,
            width: 0.5,
            saturation: 0.5,
            vintage: false,
        }
    }

    /// Set the three control values from the host-facing knobs. `bias` is
    /// the user-facing control; the model works in loop width = 1 - bias.
    /// Values outside [0, 1] are clamped downstream in `cook`.
    pub fn set_controls(&mut self, drive: f64, bias: f64, saturation: f64) {
        self.drive = drive;
        self.width = 1.0 - bias;
        self.saturation = saturation;
    }

    /// Select the alternate "vintage" coefficient mapping (hotter drive
    /// curve, stiffer loop).
    pub fn set_vintage(&mut self, vintage: bool) {
        self.vintage = vintage;
    }

    /// Switch the hysteresis integration scheme. Effective next sample.
    pub fn set_solver(&mut self, solver: SolverKind) {
        self.oversample.inner_mut().set_solver(solver);
    }

    pub fn solver(&self) -> SolverKind {
        self.oversample.inner().solver()
    }

    /// Store a new base sample rate. Applied lazily on the next `process`.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.needs_sr_update = true;
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Clear all pipeline state: magnetization, anti-aliasing delay lines,
    /// DC blocker history. Coefficients and controls are untouched.
    pub fn reset(&mut self) {
        self.oversample.inner_mut().reset();
        self.oversample.reset(self.sample_rate);
        self.dc_blocker.reset();
    }

    /// Synchronous part of a sample-rate change, run on the audio thread at
    /// the top of the next `process`. A rate change invalidates the solver
    /// time step and every filter coefficient, and the carried state belongs
    /// to the old rate, so the state is cleared too.
    fn apply_sample_rate(&mut self) {
        let inner = self.oversample.inner_mut();
        inner.set_sample_rate(self.sample_rate * OS_RATIO as f64);
        inner.reset();
        self.oversample.reset(self.sample_rate);
        self.dc_blocker.set_sample_rate(self.sample_rate);
        self.dc_blocker.reset();
        self.needs_sr_update = false;
    }
}

impl SampleProcessor for TapeEngine {
    fn process(&mut self, sample: f64) -> f64 {
        if self.needs_sr_update {
            self.apply_sample_rate();
        }

        self.oversample
            .inner_mut()
            .cook(self.drive, self.width, self.saturation, self.vintage);

        let x = sample.clamp(-1.0, 1.0);
        let y = self.oversample.process(x);
        soft_limit(self.dc_blocker.process(y))
    }

    fn on_sample_rate_change(&mut self) {
        self.needs_sr_update = true;
    }
}
