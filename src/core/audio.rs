use log::debug;

/* ============================== Public API ============================== */

/// Playback control the synchronizer drives. Positions are song seconds.
pub trait AudioBackend {
    fn play(&mut self);
    fn pause(&mut self);
    fn set_position(&mut self, seconds: f64);
    /// Playback speed, 1.0 = normal.
    fn set_speed(&mut self, speed: f64);
    fn position(&self) -> f64;
}

/// Clock-only backend for headless runs and tests. `drift` scales the
/// advertised speed to model a device clock that runs fast or slow.
#[derive(Clone, Debug)]
pub struct SimulatedAudio {
    position: f64,
    speed: f64,
    drift: f64,
    playing: bool,
    speed_changes: u32,
}

impl Default for SimulatedAudio {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SimulatedAudio {
    pub fn new(drift: f64) -> Self {
        let drift = if drift.is_finite() && drift > 0.0 { drift } else { 1.0 };
        Self { position: 0.0, speed: 1.0, drift, playing: false, speed_changes: 0 }
    }

    /// Moves the playhead by `dt` wall seconds.
    pub fn advance(&mut self, dt: f64) {
        if self.playing {
            self.position += dt * self.speed * self.drift;
        }
    }

    #[inline(always)]
    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    #[inline(always)]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    /// Number of `set_speed` calls received.
    pub const fn speed_changes(&self) -> u32 {
        self.speed_changes
    }
}

impl AudioBackend for SimulatedAudio {
    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn set_position(&mut self, seconds: f64) {
        self.position = seconds.max(0.0);
    }

    fn set_speed(&mut self, speed: f64) {
        let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
        debug!("Simulated audio speed {:.3} -> {:.3}", self.speed, speed);
        self.speed = speed;
        self.speed_changes += 1;
    }

    fn position(&self) -> f64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_only_while_playing() {
        let mut audio = SimulatedAudio::new(1.0);
        audio.advance(1.0);
        assert_eq!(audio.position(), 0.0);
        audio.play();
        audio.set_speed(1.5);
        audio.advance(2.0);
        assert!((audio.position() - 3.0).abs() < 1e-12);
        audio.pause();
        audio.advance(2.0);
        assert!((audio.position() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn never_seeks_before_zero() {
        let mut audio = SimulatedAudio::default();
        audio.set_position(-1.25);
        assert_eq!(audio.position(), 0.0);
    }
}
