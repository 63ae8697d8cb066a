use crate::core::input::{InputAction, InputEvent, InputState};
use crate::game::chart::{ChartContext, TrackContext};
use crate::game::gameplay::EngineSettings;
use crate::game::judgment::{self, Attempt, Judgment};
use crate::game::overdrive::{MeterChange, OVERDRIVE_PER_PHRASE, OverdriveMeter, OverdriveStyle, PhraseProgress};
use crate::game::phrase::PhraseKind;
use crate::game::playable::{HitStatus, PlayableNote};
use crate::game::queue::{NoteId, QueueKind};
use crate::game::solo::{SoloChange, SoloResult, SoloTracker};
use crate::game::timing::TempoCursor;
use crate::game::timing_windows::TimingProfile;
use crate::game::window::NoteWindows;
use log::{debug, info, trace};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NoteRef {
    pub index: usize,
    pub tick: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    /// A note resolved or changed state: `Hit`, `Sustained`, `Missed` or
    /// `Dropped`, with the combo after the change.
    Note { player: usize, note: NoteRef, status: HitStatus, combo: u32, judgment: Option<Judgment> },
    SustainEnd { player: usize, note: NoteRef, combo: u32 },
    Overhit { player: usize, time: f64 },
    OverdrivePhrase { player: usize, phrase: usize, completed: bool },
    OverdriveActivated { player: usize, value: i64 },
    OverdriveDeactivated { player: usize },
    SoloStarted { player: usize, phrase: usize },
    SoloEnded { player: usize, result: SoloResult },
}

/// One player's judgement state over one track of a shared chart.
pub struct Player {
    id: usize,
    ctx: Arc<ChartContext>,
    track: usize,
    profile: TimingProfile,
    rate: f64,
    sustain_leniency_s: f64,
    overdrive_note_grant: i64,
    windows: NoteWindows,
    input: InputState,
    combo: u32,
    overdrive: OverdriveMeter,
    overdrive_progress: Vec<PhraseProgress>,
    solo: SoloTracker,
    solo_changes: Vec<SoloChange>,
    position: f64,
    tick: u64,
    tempo_cursor: TempoCursor,
    events: Vec<PlayerEvent>,
    last_status_log: f64,
}

impl Player {
    pub fn new(id: usize, ctx: Arc<ChartContext>, track: usize, settings: &EngineSettings) -> Self {
        let rate = if settings.song_speed.is_finite() && settings.song_speed > 0.0 { settings.song_speed } else { 1.0 };
        let profile = settings.timing.normalized().scaled(rate);
        let (overdrive_progress, solo) = {
            let t = &ctx.tracks[track];
            let od = t.phrases(PhraseKind::Overdrive);
            let progress = (0..od.len()).map(|i| PhraseProgress::new(od.note_count(i))).collect();
            (progress, SoloTracker::new(t.phrases(PhraseKind::Solo)))
        };
        let [front_ms, back_ms] = settings.timing.hit_windows_ms();
        info!(
            "Player {id} on {} {:?}: notes={}, hit_window=[{front_ms:.1}ms, {back_ms:.1}ms], rate={rate:.2}",
            ctx.tracks[track].instrument.as_str(),
            ctx.tracks[track].difficulty,
            ctx.tracks[track].len(),
        );
        Self {
            id,
            ctx,
            track,
            profile,
            rate,
            sustain_leniency_s: settings.sustain_end_leniency_s * rate,
            overdrive_note_grant: settings.overdrive_note_grant,
            windows: NoteWindows::new(settings.hopo_frequency_ticks),
            input: InputState::default(),
            combo: 0,
            overdrive: OverdriveMeter::new(settings.overdrive_style),
            overdrive_progress,
            solo,
            solo_changes: Vec::new(),
            position: f64::NEG_INFINITY,
            tick: 0,
            tempo_cursor: TempoCursor::new(),
            events: Vec::with_capacity(16),
            last_status_log: f64::NEG_INFINITY,
        }
    }

    #[inline(always)]
    pub const fn id(&self) -> usize {
        self.id
    }

    #[inline(always)]
    pub const fn combo(&self) -> u32 {
        self.combo
    }

    pub fn track(&self) -> &TrackContext {
        &self.ctx.tracks[self.track]
    }

    pub fn overdrive(&self) -> &OverdriveMeter {
        &self.overdrive
    }

    pub fn solo(&self) -> &SoloTracker {
        &self.solo
    }

    pub fn windows(&self) -> &NoteWindows {
        &self.windows
    }

    pub fn profile(&self) -> &TimingProfile {
        &self.profile
    }

    /// Last song time processed.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn events(&self) -> &[PlayerEvent] {
        &self.events
    }

    pub fn is_note_on_screen(&self, tick: u64) -> bool {
        self.windows.is_note_on_screen(tick)
    }

    pub fn on_screen(&self) -> impl Iterator<Item = &PlayableNote> {
        self.windows.on_screen()
    }

    /// Every note has been passed and nothing is still sustaining.
    pub fn is_finished(&self) -> bool {
        self.windows.next_hittable() == self.track().len()
            && self.windows.hittable().is_empty()
            && self.windows.sustaining().is_empty()
    }

    /// Runs one frame: the batch is drained in order, each input judged at
    /// its own timestamp, then the windows advance to `song_time`, sustains
    /// are checked and the overdrive offset is committed.
    pub fn update(&mut self, song_time: f64, batch: &mut Vec<InputEvent>) -> &[PlayerEvent] {
        self.events.clear();
        for event in batch.drain(..) {
            let time = event.time.max(self.position);
            self.advance(time);
            self.handle(event.action, time);
        }
        let time = song_time.max(self.position);
        self.advance(time);
        self.update_sustains(time);
        if self.overdrive.commit() == Some(MeterChange::Deactivated) {
            info!("Player {}: overdrive ran out at tick {}.", self.id, self.tick);
            self.events.push(PlayerEvent::OverdriveDeactivated { player: self.id });
        }

        if time - self.last_status_log >= 1.0 {
            info!(
                "Player {}: Time: {:.2}, Tick: {}, Combo: {}, Overdrive: {:.1}%, Hittable: {}, Viewable: {}",
                self.id,
                time,
                self.tick,
                self.combo,
                self.overdrive.fraction() * 100.0,
                self.windows.hittable().len(),
                self.windows.viewable().len()
            );
            self.last_status_log = time;
        }
        &self.events
    }

    fn advance(&mut self, time: f64) {
        self.position = time;
        let ctx = Arc::clone(&self.ctx);
        let track = &ctx.tracks[self.track];

        self.windows.fill(track, time, &self.profile);
        while let Some((id, boundary)) = self.windows.front_boundary(track, self.profile.hit.back_s, self.combo > 0) {
            if time <= boundary {
                break;
            }
            self.miss_front(id);
        }
        self.windows.expire_viewable(time, self.profile.view.behind_s);

        self.tick = ctx.sync.tick_at(time, &mut self.tempo_cursor);
        self.solo.update(self.tick, track.phrases(PhraseKind::Solo), &mut self.solo_changes);
        for change in self.solo_changes.drain(..) {
            self.events.push(match change {
                SoloChange::Started { phrase } => PlayerEvent::SoloStarted { player: self.id, phrase },
                SoloChange::Ended(result) => PlayerEvent::SoloEnded { player: self.id, result },
            });
        }
        let grid = match self.overdrive.style() {
            OverdriveStyle::GuitarHero => &ctx.measure_grid,
            OverdriveStyle::RockBand => &ctx.beat_grid,
        };
        self.overdrive.drain_to(self.tick, grid);
    }

    #[cold]
    fn miswired(&self, action: InputAction) -> ! {
        panic!(
            "{action:?} delivered to player {} on a {} track; inputs are miswired",
            self.id,
            self.track().instrument.as_str()
        )
    }

    fn check_wiring(&self, action: InputAction) {
        if !action.fits(self.track().instrument) {
            self.miswired(action);
        }
    }

    fn handle(&mut self, action: InputAction, time: f64) {
        self.check_wiring(action);
        if action == InputAction::Overdrive {
            self.activate_overdrive();
            return;
        }
        self.input.apply(action);
        if let Some(attempt) = Attempt::from_action(action) {
            self.attempt(attempt, time);
        }
    }

    fn activate_overdrive(&mut self) {
        if self.overdrive.try_activate(self.tick) {
            info!("Player {}: overdrive activated at tick {}.", self.id, self.tick);
            self.events.push(PlayerEvent::OverdriveActivated { player: self.id, value: self.overdrive.value() });
        } else {
            debug!(
                "Player {}: overdrive activation ignored (value={}, active={}).",
                self.id,
                self.overdrive.value(),
                self.overdrive.is_active()
            );
        }
    }

    /// Idle: scan the hittable queue from the front, skipping notes the input
    /// does not fit, until a note takes it or reports it was not attempted.
    /// In combo only the front note is tested.
    fn attempt(&mut self, attempt: Attempt, time: f64) {
        let ctx = Arc::clone(&self.ctx);
        let track = &ctx.tracks[self.track];
        let in_combo = self.combo > 0;
        let candidates = if in_combo { self.windows.hittable().len().min(1) } else { self.windows.hittable().len() };

        let mut landed = false;
        let mut accepted = None;
        for pos in 0..candidates {
            let Some(&id) = self.windows.hittable().get(pos) else {
                break;
            };
            let index = self.windows.note(id).index;
            let status =
                judgment::judge(self.windows.note_mut(id), &track.notes[index], attempt, &self.input, in_combo, time);
            trace!("Player {}: {attempt:?} at {time:.4}s on note {index} -> {status:?}", self.id);
            match status {
                HitStatus::Hit | HitStatus::Sustained => {
                    accepted = Some((pos, id));
                    break;
                }
                HitStatus::Partial | HitStatus::Idle => {
                    landed = true;
                    break;
                }
                HitStatus::Missed | HitStatus::Dropped => {}
            }
        }

        match accepted {
            Some((pos, id)) => {
                for _ in 0..pos {
                    if let Some(&skipped) = self.windows.hittable().peek() {
                        self.miss_front(skipped);
                    }
                }
                self.accept(id, time);
            }
            None if !landed && attempt.is_strike() => {
                debug!("Player {}: overhit at {time:.4}s ({attempt:?}).", self.id);
                self.events.push(PlayerEvent::Overhit { player: self.id, time });
            }
            None => {}
        }
    }

    fn note_ref(note: &PlayableNote) -> NoteRef {
        NoteRef { index: note.index, tick: note.tick() }
    }

    fn accept(&mut self, id: NoteId, time: f64) {
        let (note_ref, status, overdrive, solo, seconds) = {
            let note = self.windows.note(id);
            (Self::note_ref(note), note.status, note.overdrive, note.solo, note.position.seconds)
        };
        self.combo += 1;
        if status == HitStatus::Sustained {
            self.windows.enqueue_sustaining(id);
        }
        self.windows.detach(id, QueueKind::Hittable);
        self.windows.detach(id, QueueKind::Viewable);

        if let Some(phrase) = solo {
            self.solo.record_hit(phrase);
        }
        if let Some(phrase) = overdrive {
            if self.overdrive_note_grant > 0 {
                self.overdrive.grant(self.overdrive_note_grant);
            }
            self.record_overdrive_note(phrase, true);
        }

        let judgment = Judgment { time_error_ms: judgment::time_error_ms(time, seconds, self.rate), status };
        debug!(
            "Player {}: note {} @tick {} {status:?} ({:+.1}ms), combo {}",
            self.id, note_ref.index, note_ref.tick, judgment.time_error_ms, self.combo
        );
        self.events.push(PlayerEvent::Note {
            player: self.id,
            note: note_ref,
            status,
            combo: self.combo,
            judgment: Some(judgment),
        });
    }

    /// Natural expiry or a skipped note: the front of the hittable queue
    /// becomes `Missed` and combo resets.
    fn miss_front(&mut self, id: NoteId) {
        let (note_ref, overdrive) = {
            let note = self.windows.note_mut(id);
            note.miss();
            (Self::note_ref(note), note.overdrive)
        };
        self.windows.detach(id, QueueKind::Hittable);
        if self.combo > 0 {
            debug!("Player {}: combo of {} broken at tick {}.", self.id, self.combo, note_ref.tick);
        }
        self.combo = 0;
        if let Some(phrase) = overdrive {
            self.record_overdrive_note(phrase, false);
        }
        self.events.push(PlayerEvent::Note {
            player: self.id,
            note: note_ref,
            status: HitStatus::Missed,
            combo: 0,
            judgment: None,
        });
    }

    fn record_overdrive_note(&mut self, phrase: usize, hit: bool) {
        let Some(progress) = self.overdrive_progress.get_mut(phrase) else {
            return;
        };
        if let Some(completed) = progress.record(hit) {
            if completed {
                self.overdrive.grant(OVERDRIVE_PER_PHRASE);
            }
            info!(
                "Player {}: overdrive phrase {phrase} {}.",
                self.id,
                if completed { "completed" } else { "failed" }
            );
            self.events.push(PlayerEvent::OverdrivePhrase { player: self.id, phrase, completed });
        }
    }

    fn update_sustains(&mut self, time: f64) {
        let ctx = Arc::clone(&self.ctx);
        let track = &ctx.tracks[self.track];
        let mut i = 0;
        while let Some(&id) = self.windows.sustaining().get(i) {
            let note = self.windows.note_mut(id);
            let index = note.index;
            let update = judgment::update_sustain(note, &track.notes[index], &self.input, time, self.sustain_leniency_s);
            let note_ref = Self::note_ref(note);
            let status = note.status;

            if update.dropped {
                debug!("Player {}: sustain at tick {} dropped, combo {} lost.", self.id, note_ref.tick, self.combo);
                self.combo = 0;
                self.events.push(PlayerEvent::Note {
                    player: self.id,
                    note: note_ref,
                    status: HitStatus::Dropped,
                    combo: 0,
                    judgment: None,
                });
            }
            if update.finished {
                if status == HitStatus::Hit {
                    self.events.push(PlayerEvent::SustainEnd { player: self.id, note: note_ref, combo: self.combo });
                }
                self.windows.detach(id, QueueKind::Sustaining);
            } else {
                i += 1;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn overdrive_mut(&mut self) -> &mut OverdriveMeter {
        &mut self.overdrive
    }
}
