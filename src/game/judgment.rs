use crate::core::input::{InputAction, InputState};
use crate::game::note::{ChartNote, FretNote, LaneMask, NoteData, ProGuitarNote, StringMode};
use crate::game::playable::{HitStatus, HitType, PlayableNote, fretted_mask, wrong_family};

/// What an input tries to do to the hittable notes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Attempt {
    Strum,
    /// Any change of the held fret set or a pro string.
    FretChange,
    Pad(usize),
    Key(usize),
}

impl Attempt {
    pub fn from_action(action: InputAction) -> Option<Self> {
        match action {
            InputAction::Strum => Some(Self::Strum),
            InputAction::Fret { .. } | InputAction::ProFret { .. } => Some(Self::FretChange),
            InputAction::Pad { lane } => Some(Self::Pad(usize::from(lane))),
            InputAction::Key { lane, pressed: true } => Some(Self::Key(usize::from(lane))),
            InputAction::Key { pressed: false, .. } | InputAction::Overdrive => None,
        }
    }

    /// Strikes that hit nothing are overhits; fret changes never are.
    #[inline(always)]
    pub const fn is_strike(self) -> bool {
        !matches!(self, Self::FretChange)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Judgment {
    pub time_error_ms: f32,
    pub status: HitStatus,
}

/// Signed offset in real milliseconds; positive is late.
#[inline(always)]
pub fn time_error_ms(time: f64, note_time: f64, rate: f64) -> f32 {
    let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
    (((time - note_time) / rate) * 1000.0) as f32
}

// --- Matching ---

/// Chords need the exact fretted set, single notes need their fret as the
/// highest held fret, open notes need nothing held.
#[inline(always)]
pub fn fret_matches(note: &FretNote, held: LaneMask) -> bool {
    let mask = fretted_mask(note);
    let held = held.without(0);
    match mask.count() {
        0 => held.is_empty(),
        1 => held.highest() == mask.highest(),
        _ => held == mask,
    }
}

#[inline(always)]
pub fn pro_matches(note: &ProGuitarNote, strings: &[u8]) -> bool {
    note.fingering().all(|(string, fret, mode)| mode == StringMode::Muted || strings[string] == fret)
}

#[inline(always)]
fn triggered(attempt: Attempt, hit_type: HitType, in_combo: bool) -> bool {
    match (attempt, hit_type) {
        (Attempt::Strum, _) => true,
        (Attempt::FretChange, HitType::Hopo) => in_combo,
        (Attempt::FretChange, HitType::Tap) => true,
        (Attempt::FretChange, _) => false,
        (attempt, hit_type) => panic!("{attempt:?} cannot be judged against a {hit_type:?} note"),
    }
}

fn judge_fretted(note: &mut PlayableNote, matches: bool, attempt: Attempt, in_combo: bool, time: f64) -> HitStatus {
    if !triggered(attempt, note.hit_type, in_combo) {
        return HitStatus::Idle;
    }
    if matches {
        note.accept_all(time);
        note.status
    } else if attempt == Attempt::Strum {
        HitStatus::Missed
    } else {
        HitStatus::Idle
    }
}

fn judge_lane(note: &mut PlayableNote, lane: usize, sustains: bool, time: f64) -> HitStatus {
    let start = note.position.tick;
    let Some(sub) = note.sub_mut(lane) else {
        return HitStatus::Missed;
    };
    if sub.status != HitStatus::Idle {
        return HitStatus::Missed;
    }
    sub.status = if sustains && sub.is_sustain(start) { HitStatus::Sustained } else { HitStatus::Hit };
    if note.subs.iter().all(|s| s.status.is_accept()) {
        note.settle_accept(time);
    } else {
        note.status = HitStatus::Partial;
    }
    note.status
}

/// Tests one input against one note.
///
/// Returns the note's new status when the input landed on it (`Hit`,
/// `Sustained` or `Partial`), `Missed` when the input was aimed at the note
/// but does not fit it, and `Idle` when it did not attempt the note at all.
/// Only landing inputs mutate the note.
pub fn judge(
    note: &mut PlayableNote,
    chart: &ChartNote,
    attempt: Attempt,
    input: &InputState,
    in_combo: bool,
    time: f64,
) -> HitStatus {
    match (&chart.data, attempt) {
        (NoteData::Fret(fret), Attempt::Strum | Attempt::FretChange) => {
            judge_fretted(note, fret_matches(fret, input.frets), attempt, in_combo, time)
        }
        (NoteData::ProGuitar(pro), Attempt::Strum | Attempt::FretChange) => {
            judge_fretted(note, pro_matches(pro, &input.strings), attempt, in_combo, time)
        }
        (NoteData::Drums(_), Attempt::Pad(lane)) => judge_lane(note, lane, false, time),
        (NoteData::Keys(_), Attempt::Key(lane)) => judge_lane(note, lane, true, time),
        (_, attempt) => panic!("{attempt:?} input routed to a {} note at tick {}", chart.family_name(), chart.tick),
    }
}

// --- Sustains ---

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SustainUpdate {
    /// At least one sub-lane dropped this frame.
    pub dropped: bool,
    /// Every sub-lane is resolved; the note leaves the sustaining queue.
    pub finished: bool,
}

fn sustained_mask(note: &PlayableNote) -> LaneMask {
    note.subs
        .iter()
        .filter(|s| s.status == HitStatus::Sustained)
        .fold(LaneMask::EMPTY, |m, s| m.with(usize::from(s.lane)))
}

/// Fretted sustains are held as a group. Open sustains cannot drop.
fn fret_sustain_held(note: &PlayableNote, held: LaneMask) -> bool {
    let remaining = sustained_mask(note).without(0);
    match remaining.count() {
        0 => true,
        1 => held.highest() == remaining.highest(),
        _ => remaining.is_subset_of(held),
    }
}

fn pro_sustain_held(note: &PlayableNote, pro: &ProGuitarNote, strings: &[u8]) -> bool {
    let remaining = sustained_mask(note);
    pro.fingering()
        .filter(|(string, _, _)| remaining.contains(*string))
        .all(|(string, fret, mode)| mode == StringMode::Muted || strings[string] == fret)
}

/// Advances the sustained sub-lanes of an accepted note by one frame.
///
/// A sub-lane that is not held gets a pending drop. On the next frame it is
/// overruled when held again or once its end has passed, and resolves to
/// `Dropped` otherwise. A release within `leniency_s` of the end completes
/// the lane.
pub fn update_sustain(
    note: &mut PlayableNote,
    chart: &ChartNote,
    input: &InputState,
    time: f64,
    leniency_s: f64,
) -> SustainUpdate {
    let group_held = match &chart.data {
        NoteData::Fret(_) => Some(fret_sustain_held(note, input.frets)),
        NoteData::ProGuitar(pro) => Some(pro_sustain_held(note, pro, &input.strings)),
        NoteData::Keys(_) => None,
        NoteData::Drums(_) => wrong_family(chart, "sustaining"),
    };

    let mut update = SustainUpdate::default();
    for sub in note.subs.iter_mut().filter(|s| s.status == HitStatus::Sustained) {
        let held = group_held.unwrap_or_else(|| input.keys.contains(usize::from(sub.lane)));
        let ended = time >= sub.end.seconds;
        let near_end = time >= sub.end.seconds - leniency_s;
        if held {
            sub.pending_drop = false;
            if ended {
                sub.status = HitStatus::Hit;
            }
        } else if ended || (near_end && !sub.pending_drop) {
            sub.pending_drop = false;
            sub.status = HitStatus::Hit;
        } else if sub.pending_drop {
            sub.status = HitStatus::Dropped;
            update.dropped = true;
        } else {
            sub.pending_drop = true;
        }
    }

    if note.subs.iter().all(|s| s.status.is_terminal()) {
        update.finished = true;
        note.status = if note.subs.iter().any(|s| s.status == HitStatus::Dropped) {
            HitStatus::Dropped
        } else {
            HitStatus::Hit
        };
    }
    update
}
