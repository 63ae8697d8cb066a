//! Autoplay: the input stream a flawless player would produce for a track.
use crate::core::input::{InputAction, InputEvent, InputSource};
use crate::game::chart::ChartContext;
use crate::game::note::{LaneMask, NoteData, PRO_STRINGS, StringMode};
use crate::game::phrase::PhraseKind;
use crate::game::playable::{HitType, classify, fretted_mask};
use log::debug;

/// Longest hold for a key that has no sustain.
const KEY_TAP_SECONDS: f64 = 0.05;
/// Delay after an overdrive phrase ends before activating.
const ACTIVATION_DELAY_SECONDS: f64 = 0.05;

struct Emitter {
    events: Vec<InputEvent>,
}

impl Emitter {
    #[inline(always)]
    fn push(&mut self, time: f64, action: InputAction) {
        self.events.push(InputEvent::new(time, action, InputSource::Bot));
    }
}

/// Time-ordered inputs hitting every note of `ctx.tracks[track]`. With
/// `activate_overdrive`, overdrive is triggered after every second
/// overdrive phrase.
pub fn perfect_inputs(ctx: &ChartContext, track: usize, hopo_frequency: u64, activate_overdrive: bool) -> Vec<InputEvent> {
    let t = &ctx.tracks[track];
    let mut out = Emitter { events: Vec::with_capacity(t.len() * 3) };
    let mut frets = LaneMask::EMPTY;
    let mut strings = [0u8; PRO_STRINGS];

    // Time of the next press on each key lane, filled back to front.
    let mut next_key_press: Vec<[f64; 8]> = vec![[f64::INFINITY; 8]; t.len()];
    let mut upcoming = [f64::INFINITY; 8];
    for (i, note) in t.notes.iter().enumerate().rev() {
        next_key_press[i] = upcoming;
        if let NoteData::Keys(_) = note.data {
            for lane in note.active_mask().iter() {
                upcoming[lane] = t.positions[i].seconds;
            }
        }
    }

    for (i, note) in t.notes.iter().enumerate() {
        let time = t.positions[i].seconds;
        match &note.data {
            NoteData::Fret(fret) => {
                let want = fretted_mask(fret);
                let changed = want != frets;
                for lane in frets.iter().filter(|&l| !want.contains(l)) {
                    out.push(time, InputAction::Fret { lane: lane as u8, pressed: false });
                }
                for lane in want.iter().filter(|&l| !frets.contains(l)) {
                    out.push(time, InputAction::Fret { lane: lane as u8, pressed: true });
                }
                frets = want;
                if needs_strum(classify(t, i, hopo_frequency), changed, i) {
                    out.push(time, InputAction::Strum);
                }
            }
            NoteData::ProGuitar(pro) => {
                let mut changed = false;
                for (string, fret, mode) in pro.fingering() {
                    if mode != StringMode::Muted && strings[string] != fret {
                        strings[string] = fret;
                        changed = true;
                        out.push(time, InputAction::ProFret { string: string as u8, fret });
                    }
                }
                if needs_strum(classify(t, i, hopo_frequency), changed, i) {
                    out.push(time, InputAction::Strum);
                }
            }
            NoteData::Drums(_) => {
                for lane in note.active_mask().iter() {
                    out.push(time, InputAction::Pad { lane: lane as u8 });
                }
            }
            NoteData::Keys(_) => {
                for lane in note.active_mask().iter() {
                    out.push(time, InputAction::Key { lane: lane as u8, pressed: true });
                    let release = if note.lane(lane).is_sustain() {
                        t.lane_ends[i][lane].seconds
                    } else {
                        (time + KEY_TAP_SECONDS).min(next_key_press[i][lane])
                    };
                    out.push(release, InputAction::Key { lane: lane as u8, pressed: false });
                }
            }
        }
    }

    if activate_overdrive {
        let phrases = t.phrases(PhraseKind::Overdrive);
        for index in (1..phrases.len()).step_by(2) {
            if let Some(phrase) = phrases.get(index) {
                let time = ctx.sync.position_at(phrase.end).seconds + ACTIVATION_DELAY_SECONDS;
                out.push(time, InputAction::Overdrive);
            }
        }
    }

    out.events.sort_by(|a, b| a.time.total_cmp(&b.time));
    debug!("Bot generated {} inputs for {} notes.", out.events.len(), t.len());
    out.events
}

/// Strum notes always need a strum. HOPOs and taps take the fret change,
/// except when nothing changed or a HOPO opens the track without combo.
#[inline(always)]
fn needs_strum(hit_type: HitType, changed: bool, index: usize) -> bool {
    match hit_type {
        HitType::Strum | HitType::Strike => true,
        HitType::Hopo => !changed || index == 0,
        HitType::Tap => !changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::PendingInputs;
    use crate::game::gameplay::EngineSettings;
    use crate::game::note::{Instrument, NoteFlags};
    use crate::game::player::{Player, PlayerEvent};
    use crate::game::playable::HitStatus;
    use crate::test_support::TrackBuilder;
    use std::sync::Arc;

    fn play(chart: crate::game::chart::ChartData, overdrive: bool) -> (Player, Vec<PlayerEvent>) {
        let settings = EngineSettings::default();
        let ctx = Arc::new(ChartContext::build(&chart, 0).unwrap());
        let inputs = perfect_inputs(&ctx, 0, settings.hopo_frequency_ticks, overdrive);
        let end = ctx.last_end_seconds() + 0.5;
        let mut player = Player::new(0, Arc::clone(&ctx), 0, &settings);
        let mut pending = PendingInputs::new(inputs);
        let mut batch = Vec::new();
        let mut events = Vec::new();
        let mut time = -0.5;
        while time < end {
            time += 1.0 / 240.0;
            pending.drain_until(time, &mut batch);
            events.extend_from_slice(player.update(time, &mut batch));
        }
        (player, events)
    }

    fn assert_flawless(events: &[PlayerEvent], notes: usize) {
        let mut hits = 0;
        for event in events {
            match event {
                PlayerEvent::Note { status: HitStatus::Hit | HitStatus::Sustained, .. } => hits += 1,
                PlayerEvent::Note { status, note, .. } => panic!("note {note:?} ended {status:?}"),
                PlayerEvent::Overhit { time, .. } => panic!("overhit at {time}"),
                _ => {}
            }
        }
        assert_eq!(hits, notes, "every note should be hit once");
    }

    #[test]
    fn plays_guitar_with_hopos_taps_chords_and_opens() {
        let chart = TrackBuilder::new(Instrument::FiveFret)
            .fret(480, &[(1, 1)])
            .fret(600, &[(2, 1)])
            .fret(960, &[(1, 1), (3, 1)])
            .fret(1_440, &[(0, 480)])
            .fret_flags(2_000, &[(4, 1)], NoteFlags::TAP)
            .fret(2_100, &[(4, 1)])
            .into_chart();
        let (player, events) = play(chart, false);
        assert_flawless(&events, 6);
        assert_eq!(player.combo(), 6);
        assert!(events.iter().any(|e| matches!(e, PlayerEvent::SustainEnd { .. })), "open sustain completes");
    }

    #[test]
    fn plays_drums() {
        let chart = TrackBuilder::new(Instrument::Drums)
            .drum(480, &[1], &[1], &[])
            .drum(720, &[0, 2], &[], &[2])
            .drum(960, &[3], &[], &[])
            .into_chart();
        let (_, events) = play(chart, false);
        assert_flawless(&events, 3);
    }

    #[test]
    fn plays_keys_with_sustains() {
        let chart = TrackBuilder::new(Instrument::Keys)
            .keys(480, &[(0, 480)])
            .keys(600, &[(1, 1)])
            .keys(700, &[(1, 1)])
            .keys(960, &[(0, 1), (2, 1)])
            .into_chart();
        let (_, events) = play(chart, false);
        assert_flawless(&events, 4);
    }

    #[test]
    fn plays_pro_guitar() {
        let chart = TrackBuilder::new(Instrument::ProGuitar)
            .pro(480, &[(0, 3), (1, 5)])
            .pro(600, &[(0, 3), (1, 7)])
            .pro(960, &[(2, u8::MAX), (3, 2)])
            .into_chart();
        let (_, events) = play(chart, false);
        assert_flawless(&events, 3);
    }

    #[test]
    fn activates_overdrive_after_two_phrases() {
        let mut builder = TrackBuilder::new(Instrument::FiveFret);
        for i in 0..12u64 {
            builder = builder.fret(480 + i * 480, &[(1 + (i as usize % 2), 1)]);
        }
        let chart = builder
            .phrase(PhraseKind::Overdrive, 480, 1_000)
            .phrase(PhraseKind::Overdrive, 1_400, 2_000)
            .into_chart();
        let (_, events) = play(chart, true);
        assert_flawless(&events, 12);
        let completed = events.iter().filter(|e| matches!(e, PlayerEvent::OverdrivePhrase { completed: true, .. })).count();
        assert_eq!(completed, 2);
        assert!(events.iter().any(|e| matches!(e, PlayerEvent::OverdriveActivated { .. })));
    }

    #[test]
    fn inputs_are_time_ordered() {
        let chart = TrackBuilder::new(Instrument::Keys).keys(0, &[(0, 960)]).keys(100, &[(1, 1)]).into_chart();
        let ctx = ChartContext::build(&chart, 0).unwrap();
        let inputs = perfect_inputs(&ctx, 0, 170, false);
        assert!(inputs.windows(2).all(|w| w[0].time <= w[1].time));
        assert_eq!(inputs.len(), 4);
    }
}
