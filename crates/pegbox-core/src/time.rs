//! Time Management
//!
//! Fixed-step simulation support. Hosts feed variable frame times into a
//! [`StepClock`], which releases whole physics steps of a constant size and
//! reports how far the render state sits between the last two steps.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Something advanced in constant increments of simulated time
pub trait FixedUpdate {
    /// Advance by exactly `dt` seconds
    fn fixed_update(&mut self, dt: f32);
}

/// Fixed time step configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedTimeStep {
    /// Fixed timestep in seconds
    pub step: f64,
    /// Maximum number of fixed updates per frame (to prevent spiral of death)
    pub max_updates: u32,
}

impl Default for FixedTimeStep {
    fn default() -> Self {
        Self {
            step: 1.0 / 60.0,
            max_updates: 8,
        }
    }
}

impl FixedTimeStep {
    /// Create a fixed timestep from a frequency in Hz
    pub fn from_hz(hz: f64) -> Self {
        Self {
            step: 1.0 / hz,
            ..Default::default()
        }
    }

    /// Create a fixed timestep from a step duration in seconds
    pub fn from_step(step: f64) -> Self {
        Self {
            step,
            ..Default::default()
        }
    }

    /// Set the maximum number of fixed updates per frame
    pub fn with_max_updates(mut self, max: u32) -> Self {
        self.max_updates = max;
        self
    }
}

/// Accumulator turning frame times into fixed simulation steps
#[derive(Debug, Clone)]
pub struct StepClock {
    config: FixedTimeStep,
    accumulator: f64,
    total_time: f64,
    step_count: u64,
    dropped_time: f64,
    time_scale: f64,
    paused: bool,
}

impl StepClock {
    /// Create a clock that releases steps of `config.step`
    pub fn new(config: FixedTimeStep) -> Self {
        Self {
            config,
            accumulator: 0.0,
            total_time: 0.0,
            step_count: 0,
            dropped_time: 0.0,
            time_scale: 1.0,
            paused: false,
        }
    }

    /// The step configuration
    pub fn config(&self) -> &FixedTimeStep {
        &self.config
    }

    /// Add elapsed frame time; negative or non-finite input is ignored
    pub fn accumulate(&mut self, frame_time: f64) {
        if self.paused || !frame_time.is_finite() || frame_time <= 0.0 {
            return;
        }
        self.accumulator += frame_time.min(0.25) * self.time_scale;
    }

    /// Number of whole steps waiting, capped by `max_updates`
    pub fn pending_steps(&self) -> u32 {
        let updates = (self.accumulator / self.config.step) as u32;
        updates.min(self.config.max_updates)
    }

    /// Accumulate `frame_time` and run every pending step on `target`.
    /// Returns the number of steps taken.
    pub fn advance<T: FixedUpdate + ?Sized>(&mut self, frame_time: f64, target: &mut T) -> u32 {
        self.accumulate(frame_time);

        let steps = self.pending_steps();
        for _ in 0..steps {
            target.fixed_update(self.config.step as f32);
            self.accumulator -= self.config.step;
            self.total_time += self.config.step;
            self.step_count += 1;
        }

        // Anything beyond the per-frame cap is dropped instead of piling up.
        if self.accumulator >= self.config.step {
            let excess = self.accumulator - self.accumulator % self.config.step;
            log::debug!("step clock dropping {excess:.4}s of backlog");
            self.dropped_time += excess;
            self.accumulator -= excess;
        }
        steps
    }

    /// Fraction of a step accumulated but not yet simulated, in `[0, 1]`
    pub fn interpolation(&self) -> f64 {
        (self.accumulator / self.config.step).clamp(0.0, 1.0)
    }

    /// Simulated time in seconds
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Steps taken so far
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Time discarded because a frame needed more than `max_updates` steps
    pub fn dropped_time(&self) -> f64 {
        self.dropped_time
    }

    /// Scale applied to incoming frame time
    pub fn set_time_scale(&mut self, scale: f64) {
        self.time_scale = scale.max(0.0);
    }

    /// Check if the clock is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Stop releasing steps
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume releasing steps
    pub fn resume(&mut self) {
        self.paused = false;
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::new(FixedTimeStep::default())
    }
}

/// Stopwatch for measuring elapsed time
#[derive(Debug, Clone)]
pub struct Stopwatch {
    start: Instant,
    elapsed: Duration,
    running: bool,
}

impl Stopwatch {
    /// Create and start a new stopwatch
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Duration::ZERO,
            running: true,
        }
    }

    /// Stop the stopwatch
    pub fn stop(&mut self) {
        if self.running {
            self.elapsed += self.start.elapsed();
            self.running = false;
        }
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        if self.running {
            self.elapsed + self.start.elapsed()
        } else {
            self.elapsed
        }
    }

    /// Get the elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
