//! Frame timing and delta time.
//!
//! [`Time`] is updated by the runner once per frame and its delta is handed to
//! every per-frame update (particles, water phase, skybox cycle). There is no
//! fixed timestep: integration is keyed to the measured frame delta.
//!
//! [`FpsCounter`] counts whole frames per second for display, and
//! [`FrameLimiter`] sleeps off the remainder of a frame to honour an FPS cap.

use std::time::{Duration, Instant};

/// Frame timing, updated once per frame.
#[derive(Debug, Clone, Copy)]
pub struct Time {
    /// When the app started.
    startup: Instant,
    /// When the current frame started.
    frame_start: Instant,
    /// Duration of the previous frame.
    delta: Duration,
    /// Total time since app startup.
    elapsed: Duration,
    frame_count: u64,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            startup: now,
            frame_start: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Call at the start of each frame to update timing.
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta = now - self.frame_start;
        self.frame_start = now;
        self.elapsed = now - self.startup;
        self.frame_count += 1;
    }

    /// Duration of the previous frame.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Delta time in seconds (f32), the most common way to use it.
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Number of frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Estimated FPS based on the last frame's delta.
    pub fn fps(&self) -> f32 {
        if self.delta.as_secs_f32() > 0.0 {
            1.0 / self.delta.as_secs_f32()
        } else {
            0.0
        }
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts frames and publishes the total once per elapsed second.
#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    frames: u32,
    accumulated: f32,
    fps: u32,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one frame that took `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        self.frames += 1;
        self.accumulated += dt;
        if self.accumulated >= 1.0 {
            self.fps = self.frames;
            self.frames = 0;
            self.accumulated -= 1.0;
        }
    }

    /// Frames counted during the last complete second.
    pub fn fps(&self) -> u32 {
        self.fps
    }
}

/// Sleeps to keep the frame rate at or below a cap.
#[derive(Debug, Clone)]
pub struct FrameLimiter {
    target: Option<Duration>,
    last: Instant,
}

impl FrameLimiter {
    /// `fps_cap == 0` disables limiting.
    pub fn new(fps_cap: u32) -> Self {
        Self {
            target: (fps_cap > 0).then(|| Duration::from_secs_f64(1.0 / fps_cap as f64)),
            last: Instant::now(),
        }
    }

    pub fn target_frame_time(&self) -> Option<Duration> {
        self.target
    }

    /// Block until a full frame interval has passed since the previous call.
    pub fn sync(&mut self) {
        if let Some(target) = self.target {
            let spent = self.last.elapsed();
            if spent < target {
                std::thread::sleep(target - spent);
            }
        }
        self.last = Instant::now();
    }
}
