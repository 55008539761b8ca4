//! Per-port generator state for the RT path.

// IMPORTANT: Do not call assert_invariant or any PPT logging in RT paths to avoid locks/allocs.

use std::f32::consts::TAU;

/// Steps of the volume automation per full turn.
pub const VOLUME_STEPS: f32 = 1000.0;

/// Phase accumulators of one output port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortGenerator {
    /// Tone phase in radians, kept in `[0, 2π)`.
    pub accumulator: f32,
    /// Volume automation phase in radians, kept in `[0, 2π)`.
    pub volume_accum: f32,
}

impl PortGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the tone by one frame and return its value in `[-1, 1]`.
    #[inline]
    pub fn next_sample(&mut self, frequency: f32, rate: u32) -> f32 {
        self.accumulator = (self.accumulator + TAU * frequency / rate as f32).rem_euclid(TAU);
        self.accumulator.sin()
    }

    /// Current automation value in `[0, 1]`, then advance one step.
    #[inline]
    pub fn next_volume(&mut self) -> f32 {
        let value = self.volume_accum.sin() / 2.0 + 0.5;
        self.volume_accum += TAU / VOLUME_STEPS;
        if self.volume_accum >= TAU {
            self.volume_accum -= TAU;
        }
        value
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
