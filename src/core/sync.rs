use crate::core::audio::AudioBackend;
use log::{debug, info};

pub const DEFAULT_INITIAL_THRESHOLD_S: f64 = 0.015;
pub const DEFAULT_ADJUST_THRESHOLD_S: f64 = 0.005;
pub const DEFAULT_SPEED_STEP: f64 = 0.05;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SyncSettings {
    /// Desync that starts a correction.
    pub initial_threshold_s: f64,
    /// Desync under which a running correction is cancelled.
    pub adjust_threshold_s: f64,
    /// Playback speed change per correction multiplier.
    pub speed_step: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            initial_threshold_s: DEFAULT_INITIAL_THRESHOLD_S,
            adjust_threshold_s: DEFAULT_ADJUST_THRESHOLD_S,
            speed_step: DEFAULT_SPEED_STEP,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Correction {
    start_delta: f64,
    multiplier: i32,
}

/// Keeps song time on the audio clock while steering the audio towards the
/// input clock with small playback speed changes.
#[derive(Clone, Debug)]
pub struct Synchronizer {
    settings: SyncSettings,
    song_speed: f64,
    base: f64,
    offset: f64,
    audio_started: bool,
    correction: Option<Correction>,
    last_delta: f64,
}

impl Synchronizer {
    pub fn new(settings: SyncSettings, song_speed: f64) -> Self {
        let song_speed = if song_speed.is_finite() && song_speed > 0.0 { song_speed } else { 1.0 };
        Self { settings, song_speed, base: 0.0, offset: 0.0, audio_started: false, correction: None, last_delta: 0.0 }
    }

    #[inline(always)]
    pub const fn song_speed(&self) -> f64 {
        self.song_speed
    }

    #[inline(always)]
    pub const fn audio_started(&self) -> bool {
        self.audio_started
    }

    #[inline(always)]
    pub fn is_correcting(&self) -> bool {
        self.correction.is_some()
    }

    /// `input - audio` from the last update after audio start.
    #[inline(always)]
    pub const fn last_delta(&self) -> f64 {
        self.last_delta
    }

    /// Song time on the input clock for monotonic time `now`.
    #[inline(always)]
    pub fn input_time(&self, now: f64) -> f64 {
        (now - self.base) * self.song_speed + self.offset
    }

    /// Restarts both clocks at `time`. A negative time is a pre-roll: the
    /// audio waits at zero until song time reaches it.
    pub fn set_song_time(&mut self, now: f64, time: f64, audio: &mut dyn AudioBackend) {
        self.base = now;
        self.offset = time;
        self.correction = None;
        self.last_delta = 0.0;
        audio.set_speed(self.song_speed);
        if time >= 0.0 {
            audio.set_position(time);
            audio.play();
            self.audio_started = true;
        } else {
            audio.pause();
            audio.set_position(0.0);
            self.audio_started = false;
        }
        info!("Song time set to {time:.3}s (audio started: {}).", self.audio_started);
    }

    /// Returns the song time for `now` and applies any speed correction.
    pub fn update(&mut self, now: f64, audio: &mut dyn AudioBackend) -> f64 {
        let input = self.input_time(now);
        if !self.audio_started {
            if input < 0.0 {
                return input;
            }
            audio.set_position(input.max(0.0));
            audio.play();
            self.audio_started = true;
            info!("Audio started at song time {input:.3}s.");
            return input;
        }

        let audio_time = audio.position();
        let delta = input - audio_time;
        self.last_delta = delta;
        self.correct(delta, audio);
        audio_time
    }

    fn correct(&mut self, delta: f64, audio: &mut dyn AudioBackend) {
        let speed = self.song_speed;
        match self.correction {
            None if delta.abs() < self.settings.initial_threshold_s * speed => return,
            Some(c) if delta.abs() < self.settings.adjust_threshold_s * speed || delta.signum() != c.start_delta.signum() => {
                debug!("Sync correction cancelled at delta {:+.2}ms.", delta * 1000.0);
                self.correction = None;
                audio.set_speed(speed);
                return;
            }
            _ => {}
        }

        let mut multiplier = (delta / self.settings.initial_threshold_s).round() as i32;
        if multiplier == 0 {
            multiplier = if delta < 0.0 { -1 } else { 1 };
        }
        let start_delta = self.correction.map_or(delta, |c| c.start_delta);
        if self.correction.map(|c| c.multiplier) != Some(multiplier) {
            let requested = (speed + self.settings.speed_step * f64::from(multiplier)).max(self.settings.speed_step);
            debug!(
                "Sync correction: delta {:+.2}ms, multiplier {multiplier}, speed {requested:.3}.",
                delta * 1000.0
            );
            audio.set_speed(requested);
        }
        self.correction = Some(Correction { start_delta, multiplier });
    }
}
