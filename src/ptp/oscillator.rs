//! The tunable-oscillator contract a [`super::filters::TrackingController`]
//! drives.

/// A local clock a tracking loop can steer. `clock_rate` sets a
/// continuous rate (frequency) offset; `clock_adjust` applies a one-shot
/// phase step for corrections too large for the rate loop to absorb
/// gracefully.
pub trait TunableOscillator {
    /// Set the rate offset, in units of normalized-ppb × 65536.
    fn clock_rate(&mut self, lsb: i32);

    /// Apply a coarse phase step of `delta_subns` immediately.
    fn clock_adjust(&mut self, delta_subns: i128);
}

/// An oscillator model with no hardware behind it, used by tests and by
/// [`super::filters::ControllerPI`]'s own unit tests to observe what the
/// loop commands without a real clock.
#[derive(Default)]
pub struct RecordingOscillator {
    pub last_rate_lsb: i32,
    pub rate_history: Vec<i32>,
    pub coarse_adjustments: Vec<i128>,
}

impl TunableOscillator for RecordingOscillator {
    fn clock_rate(&mut self, lsb: i32) {
        self.last_rate_lsb = lsb;
        self.rate_history.push(lsb);
    }

    fn clock_adjust(&mut self, delta_subns: i128) {
        self.coarse_adjustments.push(delta_subns);
    }
}

/// Sigma-delta sub-LSB dithering wrapper. `clock_rate` on a real
/// oscillator can only resolve
/// whole LSBs; this wrapper accumulates the fractional remainder and
/// injects an extra LSB once the accumulator crosses a full unit, giving
/// the effective average rate sub-LSB resolution.
pub struct Dither<O: TunableOscillator> {
    inner: O,
    accumulator: i64,
}

impl<O: TunableOscillator> Dither<O> {
    pub fn new(inner: O) -> Self {
        Self { inner, accumulator: 0 }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: TunableOscillator> TunableOscillator for Dither<O> {
    /// `lsb_q16` is the desired rate in units of 1/65536th of an LSB,
    /// giving the dither its sub-LSB resolution.
    fn clock_rate(&mut self, lsb_q16: i32) {
        self.accumulator += lsb_q16 as i64;
        let whole = (self.accumulator >> 16) as i32;
        self.accumulator -= (whole as i64) << 16;
        self.inner.clock_rate(whole);
    }

    fn clock_adjust(&mut self, delta_subns: i128) {
        self.inner.clock_adjust(delta_subns);
    }
}
