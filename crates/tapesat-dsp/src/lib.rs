//! Tape saturation DSP library — magnetic hysteresis signal chain.
//!
//! Pure DSP math with no audio framework dependencies. The core is a
//! Jiles-Atherton hysteresis ODE advanced per sample by a selectable
//! fixed-cost solver, run under a fixed-ratio oversampler, followed by a
//! DC blocker and a tanh safety limiter. See [`engine::TapeEngine`] for
//! the assembled pipeline.

pub mod engine;
pub mod filters;
pub mod hysteresis;
pub mod oversampler;
pub mod solver;

pub use engine::{OS_RATIO, TapeEngine};
pub use solver::SolverKind;

/// Per-sample processing capability — one scaled sample in, one out.
///
/// Implementors never fail: numerical trouble is handled by internal
/// clamping, and every call returns a finite value. Hosts deliver rate
/// changes through `on_sample_rate_change`; implementors with derived
/// coefficients mark them stale there and recompute inside the next
/// `process` call on the audio thread.
pub trait SampleProcessor {
    fn process(&mut self, sample: f64) -> f64;

    fn on_sample_rate_change(&mut self) {}
}
