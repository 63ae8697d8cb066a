use crate::game::chart::TrackContext;
use crate::game::note::{
    ChartNote, Dynamics, FretNote, LaneMask, MAX_LANES, NoteData, NoteFlags, NoteLike, ProGuitarNote,
};
use crate::game::timing::DualPosition;
use smallvec::SmallVec;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HitType {
    Strum,
    Hopo,
    Tap,
    /// Drums and keys: every lane is struck on its own.
    Strike,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HitStatus {
    Idle,
    Partial,
    Hit,
    Sustained,
    Dropped,
    Missed,
}

impl HitStatus {
    #[inline(always)]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Hit | Self::Dropped | Self::Missed)
    }

    #[inline(always)]
    pub const fn is_accept(self) -> bool {
        matches!(self, Self::Hit | Self::Sustained)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SubNote {
    pub lane: u8,
    pub end: DualPosition,
    pub status: HitStatus,
    pub dynamics: Dynamics,
    pub pending_drop: bool,
}

impl SubNote {
    #[inline(always)]
    pub fn is_sustain(&self, start_tick: u64) -> bool {
        self.end.tick > start_tick + 1
    }
}

// --- Classification helpers ---

/// Fretted lanes only; lane 0 is the open lane.
#[inline(always)]
pub fn fretted_mask(note: &FretNote) -> LaneMask {
    note.lanes
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, lane)| lane.is_active())
        .fold(LaneMask::EMPTY, |mask, (i, _)| mask.with(i))
}

#[inline(always)]
pub fn is_open(note: &FretNote) -> bool {
    note.lanes[0].is_active()
}

#[inline(always)]
pub fn is_chorded(note: &FretNote) -> bool {
    fretted_mask(note).count() >= 2
}

/// An open-only note is contained when the previous note also has the open
/// lane; otherwise every fretted lane must be active in the previous note.
pub fn is_contained_in(note: &FretNote, prev: &FretNote) -> bool {
    let mask = fretted_mask(note);
    if mask.is_empty() {
        return is_open(prev);
    }
    mask.is_subset_of(fretted_mask(prev))
}

#[inline(always)]
fn resolve_hit_type(strum: bool, flags: NoteFlags) -> HitType {
    if flags.contains(NoteFlags::TAP) {
        return HitType::Tap;
    }
    if strum ^ flags.contains(NoteFlags::FORCED) { HitType::Strum } else { HitType::Hopo }
}

pub fn classify_fret(note: &FretNote, tick: u64, prev: Option<(&FretNote, u64)>, hopo_frequency: u64) -> HitType {
    let strum = match prev {
        None => true,
        Some((prev, prev_tick)) => {
            is_chorded(note) || !is_contained_in(note, prev) || tick - prev_tick > hopo_frequency
        }
    };
    resolve_hit_type(strum, note.flags)
}

pub fn is_pro_chorded(note: &ProGuitarNote) -> bool {
    note.fingering().count() >= 2
}

/// Every `(string, fret)` pair of the note appears in the previous note.
pub fn is_pro_contained_in(note: &ProGuitarNote, prev: &ProGuitarNote) -> bool {
    note.fingering().all(|(string, fret, _)| {
        let p = prev.strings[string];
        p.lane.is_active() && p.fret == fret
    })
}

pub fn classify_pro(
    note: &ProGuitarNote,
    tick: u64,
    prev: Option<(&ProGuitarNote, u64)>,
    hopo_frequency: u64,
) -> HitType {
    let strum = match prev {
        None => true,
        Some((prev, prev_tick)) => {
            is_pro_chorded(note) || !is_pro_contained_in(note, prev) || tick - prev_tick > hopo_frequency
        }
    };
    resolve_hit_type(strum, note.flags)
}

/// Classifies note `index` of `track` against its predecessor.
pub fn classify(track: &TrackContext, index: usize, hopo_frequency: u64) -> HitType {
    let note = &track.notes[index];
    let prev = index.checked_sub(1).map(|i| &track.notes[i]);
    match &note.data {
        NoteData::Fret(n) => {
            let prev = prev.map(|p| match &p.data {
                NoteData::Fret(pn) => (pn, p.tick),
                _ => wrong_family(p, "fret"),
            });
            classify_fret(n, note.tick, prev, hopo_frequency)
        }
        NoteData::ProGuitar(n) => {
            let prev = prev.map(|p| match &p.data {
                NoteData::ProGuitar(pn) => (pn, p.tick),
                _ => wrong_family(p, "pro guitar"),
            });
            classify_pro(n, note.tick, prev, hopo_frequency)
        }
        NoteData::Drums(_) | NoteData::Keys(_) => HitType::Strike,
    }
}

#[cold]
pub(crate) fn wrong_family(note: &ChartNote, expected: &str) -> ! {
    panic!(
        "note at tick {} is a {} note but the track expects {expected} notes; the track is miswired",
        note.tick,
        note.family_name()
    )
}

/// A chart note prepared for judgement. Owned by one player's arena.
#[derive(Clone, Debug)]
pub struct PlayableNote {
    /// Index into the track's note array.
    pub index: usize,
    pub position: DualPosition,
    pub hit_type: HitType,
    pub flags: NoteFlags,
    pub subs: SmallVec<[SubNote; MAX_LANES]>,
    pub overdrive: Option<usize>,
    pub solo: Option<usize>,
    pub status: HitStatus,
    pub hit_time: Option<f64>,
}

impl PlayableNote {
    pub fn new(track: &TrackContext, index: usize, hopo_frequency: u64) -> Self {
        let note = &track.notes[index];
        if !note.matches(track.instrument) {
            wrong_family(note, track.instrument.as_str());
        }
        let ends = &track.lane_ends[index];
        let subs = (0..note.lane_len())
            .filter(|&lane| note.is_active(lane))
            .map(|lane| SubNote {
                lane: lane as u8,
                end: ends[lane],
                status: HitStatus::Idle,
                dynamics: match &note.data {
                    NoteData::Drums(d) => d.dynamics(lane),
                    _ => Dynamics::Normal,
                },
                pending_drop: false,
            })
            .collect();
        Self {
            index,
            position: track.positions[index],
            hit_type: classify(track, index, hopo_frequency),
            flags: note.flags(),
            subs,
            overdrive: None,
            solo: None,
            status: HitStatus::Idle,
            hit_time: None,
        }
    }

    #[inline(always)]
    pub fn tick(&self) -> u64 {
        self.position.tick
    }

    pub fn longest_end(&self) -> DualPosition {
        self.subs.iter().map(|s| s.end).max_by(|a, b| a.tick.cmp(&b.tick)).unwrap_or(self.position)
    }

    pub fn has_sustain(&self) -> bool {
        self.subs.iter().any(|s| s.is_sustain(self.position.tick))
    }

    pub fn sub_mut(&mut self, lane: usize) -> Option<&mut SubNote> {
        self.subs.iter_mut().find(|s| usize::from(s.lane) == lane)
    }

    pub fn lane_mask(&self) -> LaneMask {
        self.subs.iter().fold(LaneMask::EMPTY, |m, s| m.with(usize::from(s.lane)))
    }

    /// Marks every sub-lane accepted, sustained lanes as `Sustained`, and
    /// sets the note status from them.
    pub fn accept_all(&mut self, time: f64) {
        let start = self.position.tick;
        for sub in &mut self.subs {
            if !sub.status.is_accept() {
                sub.status = if sub.is_sustain(start) { HitStatus::Sustained } else { HitStatus::Hit };
            }
        }
        self.settle_accept(time);
    }

    pub(crate) fn settle_accept(&mut self, time: f64) {
        self.status = if self.subs.iter().any(|s| s.status == HitStatus::Sustained) {
            HitStatus::Sustained
        } else {
            HitStatus::Hit
        };
        self.hit_time = Some(time);
    }

    /// Natural expiry: unresolved sub-lanes and the note become `Missed`.
    pub fn miss(&mut self) {
        for sub in &mut self.subs {
            if !sub.status.is_terminal() {
                sub.status = HitStatus::Missed;
            }
        }
        self.status = HitStatus::Missed;
    }
}

impl NoteLike for PlayableNote {
    #[inline(always)]
    fn tick(&self) -> u64 {
        self.position.tick
    }

    fn longest_sustain(&self) -> u64 {
        self.longest_end().tick - self.position.tick
    }

    fn is_active(&self, lane: usize) -> bool {
        assert!(lane < MAX_LANES, "lane {lane} is outside the lane array");
        self.subs.iter().any(|s| usize::from(s.lane) == lane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::note::Instrument;
    use crate::test_support::{TrackBuilder, fret_chart};
    use crate::game::chart::ChartContext;

    fn single(tick: u64, lane: usize) -> (u64, Vec<(usize, u64)>, NoteFlags) {
        (tick, vec![(lane, 1)], NoteFlags::empty())
    }

    fn hit_types(notes: Vec<(u64, Vec<(usize, u64)>, NoteFlags)>, hopo: u64) -> Vec<HitType> {
        let chart = fret_chart(notes, vec![]);
        let ctx = ChartContext::build(&chart, 0).unwrap();
        let track = &ctx.tracks[0];
        (0..track.len()).map(|i| classify(track, i, hopo)).collect()
    }

    #[test]
    fn same_fret_close_together_is_hopo() {
        let types = hit_types(vec![single(0, 1), single(100, 1)], 150);
        assert_eq!(types, vec![HitType::Strum, HitType::Hopo]);
    }

    #[test]
    fn same_fret_past_threshold_is_strum() {
        let types = hit_types(vec![single(0, 1), single(200, 1)], 150);
        assert_eq!(types, vec![HitType::Strum, HitType::Strum]);
    }

    #[test]
    fn fret_outside_previous_set_is_strum() {
        let types = hit_types(vec![single(0, 1), single(100, 2)], 150);
        assert_eq!(types[1], HitType::Strum);
    }

    #[test]
    fn chords_always_strum_and_force_flips() {
        let chord = (100, vec![(1, 1), (2, 1)], NoteFlags::empty());
        let forced = (200, vec![(2, 1)], NoteFlags::FORCED);
        let tapped = (300, vec![(3, 1)], NoteFlags::TAP | NoteFlags::FORCED);
        let types = hit_types(vec![single(0, 1), chord, forced, tapped], 150);
        assert_eq!(types, vec![HitType::Strum, HitType::Strum, HitType::Strum, HitType::Tap]);
    }

    #[test]
    fn open_note_containment() {
        let types = hit_types(vec![single(0, 0), single(100, 0), single(200, 1), single(300, 0)], 150);
        assert_eq!(types[1], HitType::Hopo, "open after open is contained");
        assert_eq!(types[2], HitType::Strum, "fret after open is not contained");
        assert_eq!(types[3], HitType::Strum, "open after fret is not contained");
    }

    #[test]
    fn sustain_end_round_trips_to_chart_length() {
        let chart = fret_chart(vec![(480, vec![(1, 1), (3, 725)], NoteFlags::empty())], vec![]);
        let ctx = ChartContext::build(&chart, 0).unwrap();
        let track = &ctx.tracks[0];
        let note = PlayableNote::new(track, 0, 150);
        for sub in &note.subs {
            let lane = usize::from(sub.lane);
            assert_eq!(
                sub.end.tick - note.tick(),
                track.notes[0].lane(lane).length,
                "lane {lane} end does not round-trip"
            );
        }
        assert_eq!(note.longest_sustain(), 725);
        assert!(note.has_sustain());
    }

    #[test]
    fn drum_dynamics_are_carried() {
        let chart = TrackBuilder::new(Instrument::Drums).drum(0, &[1, 2], &[2], &[]).into_chart();
        let ctx = ChartContext::build(&chart, 0).unwrap();
        let note = PlayableNote::new(&ctx.tracks[0], 0, 0);
        assert_eq!(note.hit_type, HitType::Strike);
        assert_eq!(note.subs[0].dynamics, Dynamics::Normal);
        assert_eq!(note.subs[1].dynamics, Dynamics::Accent);
    }

    #[test]
    fn pro_guitar_containment_uses_fret_pairs() {
        let chart = TrackBuilder::new(Instrument::ProGuitar)
            .pro(0, &[(2, 5)])
            .pro(100, &[(2, 5)])
            .pro(200, &[(2, 7)])
            .into_chart();
        let ctx = ChartContext::build(&chart, 0).unwrap();
        let track = &ctx.tracks[0];
        let types: Vec<HitType> = (0..3).map(|i| classify(track, i, 150)).collect();
        assert_eq!(types, vec![HitType::Strum, HitType::Hopo, HitType::Strum]);
    }
}
