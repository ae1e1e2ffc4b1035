//! Cassette-line audio sampling.
//!
//! The machine has no sound chip; the audible output is the cassette line
//! the monitor toggles through the PIO. The buffer resamples that line to
//! the host rate while `exec` runs and hands the accumulated mono samples
//! to the host at call return — push-based, no thread, no callback.

/// Default host sample rate.
pub const SAMPLE_RATE: u32 = 48_000;

/// Mono f32 sample buffer fed from a digital line level.
pub struct AudioBuffer {
    /// CPU clock, Hz.
    clock_hz: u64,
    /// Host sample rate, Hz.
    sample_rate: u32,
    /// Fractional sample accumulator (in units of clock cycles × rate).
    accumulator: u64,
    samples: Vec<f32>,
    level: bool,
}

impl AudioBuffer {
    #[must_use]
    pub fn new(clock_hz: u64, sample_rate: u32) -> Self {
        Self {
            clock_hz,
            sample_rate,
            accumulator: 0,
            samples: Vec::new(),
            level: false,
        }
    }

    /// Advance by elapsed CPU cycles with the line at `level`, producing
    /// however many host-rate samples that interval covers.
    pub fn tick(&mut self, cycles: u32, level: bool) {
        self.level = level;
        self.accumulator += u64::from(cycles) * u64::from(self.sample_rate);
        let amplitude = if level { 0.5 } else { -0.5 };
        while self.accumulator >= self.clock_hz {
            self.accumulator -= self.clock_hz;
            self.samples.push(amplitude);
        }
    }

    /// Drain the accumulated samples.
    pub fn take_samples(&mut self) -> Vec<f32> {
        core::mem::take(&mut self.samples)
    }

    /// Current line level.
    #[must_use]
    pub fn level(&self) -> bool {
        self.level
    }

    pub fn reset(&mut self) {
        self.accumulator = 0;
        self.samples.clear();
        self.level = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_samples_at_host_rate() {
        let mut audio = AudioBuffer::new(2_000_000, 48_000);
        // One emulated second in 20 ms slices.
        for _ in 0..50 {
            audio.tick(40_000, true);
        }
        let samples = audio.take_samples();
        assert_eq!(samples.len(), 48_000);
        assert!(samples.iter().all(|&s| s > 0.0));
    }

    #[test]
    fn take_drains_buffer() {
        let mut audio = AudioBuffer::new(1_000_000, 48_000);
        audio.tick(10_000, false);
        let first = audio.take_samples();
        assert!(!first.is_empty());
        assert!(audio.take_samples().is_empty());
    }

    #[test]
    fn level_maps_to_sign() {
        let mut audio = AudioBuffer::new(1_000_000, 48_000);
        audio.tick(1_000, false);
        assert!(audio.take_samples().iter().all(|&s| s < 0.0));
        audio.tick(1_000, true);
        assert!(audio.take_samples().iter().all(|&s| s > 0.0));
    }
}
