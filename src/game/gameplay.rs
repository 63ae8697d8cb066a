use crate::core::audio::AudioBackend;
use crate::core::input::InputEvent;
use crate::core::sync::{SyncSettings, Synchronizer};
use crate::game::chart::ChartContext;
use crate::game::overdrive::OverdriveStyle;
use crate::game::player::Player;
use crate::game::timing_windows::TimingProfile;
use log::{info, warn};
use std::sync::Arc;

pub const DEFAULT_HOPO_FREQUENCY_TICKS: u64 = 170;
pub const DEFAULT_SUSTAIN_END_LENIENCY_S: f64 = 0.05;
pub const DEFAULT_SONG_START_DELAY_S: f64 = 2.0;
// Time kept running after the last judgable moment.
const POST_SONG_SECONDS: f64 = 1.0;

/// Everything a session needs besides the chart.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub song_speed: f64,
    pub hopo_frequency_ticks: u64,
    pub min_sustain_ticks: u64,
    pub sustain_end_leniency_s: f64,
    pub timing: TimingProfile,
    pub overdrive_style: OverdriveStyle,
    pub overdrive_note_grant: i64,
    pub song_start_delay_s: f64,
    pub sync: SyncSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            song_speed: 1.0,
            hopo_frequency_ticks: DEFAULT_HOPO_FREQUENCY_TICKS,
            min_sustain_ticks: 0,
            sustain_end_leniency_s: DEFAULT_SUSTAIN_END_LENIENCY_S,
            timing: TimingProfile::default(),
            overdrive_style: OverdriveStyle::RockBand,
            overdrive_note_grant: 0,
            song_start_delay_s: DEFAULT_SONG_START_DELAY_S,
            sync: SyncSettings::default(),
        }
    }
}

impl EngineSettings {
    #[inline(always)]
    pub fn rate(&self) -> f64 {
        if self.song_speed.is_finite() && self.song_speed > 0.0 { self.song_speed } else { 1.0 }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Playing,
    Finished,
}

fn compute_song_end_time(ctx: &ChartContext, settings: &EngineSettings) -> f64 {
    let timing = settings.timing.normalized();
    let max_window = timing.hit.back_s.max(settings.sustain_end_leniency_s);
    ctx.last_end_seconds() + settings.rate() * max_window + POST_SONG_SECONDS * settings.rate()
}

/// A shared chart played by any number of players against one audio clock.
pub struct Session<A: AudioBackend> {
    ctx: Arc<ChartContext>,
    settings: EngineSettings,
    sync: Synchronizer,
    audio: A,
    players: Vec<Player>,
    song_end_time: f64,
    song_time: f64,
    last_frame: Option<f64>,
    log_timer: f64,
    finished: bool,
}

impl<A: AudioBackend> Session<A> {
    /// One player per entry of `tracks`, each an index into `ctx.tracks`.
    pub fn new(ctx: Arc<ChartContext>, settings: EngineSettings, audio: A, tracks: &[usize]) -> Self {
        let players = tracks
            .iter()
            .enumerate()
            .map(|(id, &track)| Player::new(id, Arc::clone(&ctx), track, &settings))
            .collect();
        let song_end_time = compute_song_end_time(&ctx, &settings);
        info!(
            "Session for '{}': {} player(s), song end at {song_end_time:.2}s, rate {:.2}",
            ctx.name,
            tracks.len(),
            settings.rate()
        );
        Self {
            sync: Synchronizer::new(settings.sync, settings.rate()),
            ctx,
            settings,
            audio,
            players,
            song_end_time,
            song_time: f64::NEG_INFINITY,
            last_frame: None,
            log_timer: 0.0,
            finished: false,
        }
    }

    /// Starts the clocks at monotonic time `now` with the configured pre-roll.
    pub fn start(&mut self, now: f64) {
        let start_delay = (self.settings.song_start_delay_s * self.settings.rate()).max(0.0);
        info!("Starting song with a preroll delay of {start_delay:.2}s");
        self.sync.set_song_time(now, -start_delay, &mut self.audio);
        self.song_time = -start_delay;
        self.last_frame = Some(now);
    }

    /// Song time on the input clock, used to timestamp captured inputs.
    #[inline(always)]
    pub fn input_time(&self, now: f64) -> f64 {
        self.sync.input_time(now)
    }

    /// Steps every player. `inputs[i]` is player `i`'s batch for this frame
    /// and is left empty.
    pub fn update(&mut self, now: f64, inputs: &mut [Vec<InputEvent>]) -> SessionStatus {
        if self.finished {
            return SessionStatus::Finished;
        }
        if inputs.len() != self.players.len() {
            warn!("Got {} input batches for {} players.", inputs.len(), self.players.len());
        }
        let delta_time = self.last_frame.map_or(0.0, |last| (now - last).max(0.0));
        self.last_frame = Some(now);

        let song_time = self.sync.update(now, &mut self.audio).max(self.song_time);
        self.song_time = song_time;

        let mut empty = Vec::new();
        for (i, player) in self.players.iter_mut().enumerate() {
            let batch = inputs.get_mut(i).unwrap_or(&mut empty);
            player.update(song_time, batch);
        }

        if song_time >= self.song_end_time {
            info!("Song end time reached at {song_time:.2}s.");
            self.finished = true;
            return SessionStatus::Finished;
        }

        self.log_timer += delta_time;
        if self.log_timer >= 1.0 {
            info!(
                "Time: {:.2}, Audio: {:.2}, Desync: {:+.2}ms, Players: {}",
                song_time,
                self.audio.position(),
                self.sync.last_delta() * 1000.0,
                self.players.len()
            );
            self.log_timer -= 1.0;
        }
        SessionStatus::Playing
    }

    pub fn context(&self) -> &Arc<ChartContext> {
        &self.ctx
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }

    #[inline(always)]
    pub const fn song_time(&self) -> f64 {
        self.song_time
    }

    #[inline(always)]
    pub const fn song_end_time(&self) -> f64 {
        self.song_end_time
    }
}
