//! Synthetic chart builders shared by unit tests.
use crate::game::chart::{ChartData, TrackData};
use crate::game::note::{
    ChartNote, Difficulty, DrumNote, FretNote, Instrument, KeysNote, Lane, LaneArray, LaneMask, NoteData,
    NoteFlags, PRO_STRINGS, ProGuitarNote, ProString, StringMode,
};
use crate::game::phrase::{Phrase, PhraseKind};
use crate::game::timing::TempoChange;
use smallvec::smallvec;

pub const RESOLUTION: u32 = 480;
// 120 BPM at 480 ticks per beat.
pub const SECONDS_PER_TICK: f64 = 1.0 / 960.0;

#[inline(always)]
pub fn t(tick: f64) -> f64 {
    tick * SECONDS_PER_TICK
}

pub struct TrackBuilder {
    instrument: Instrument,
    notes: Vec<ChartNote>,
    phrases: Vec<Phrase>,
}

impl TrackBuilder {
    pub fn new(instrument: Instrument) -> Self {
        Self { instrument, notes: Vec::new(), phrases: Vec::new() }
    }

    fn lanes(&self, lanes: &[(usize, u64)]) -> LaneArray {
        let mut arr: LaneArray = smallvec![Lane::OFF; self.instrument.lane_count()];
        for &(lane, length) in lanes {
            arr[lane] = Lane { length };
        }
        arr
    }

    pub fn fret_flags(mut self, tick: u64, lanes: &[(usize, u64)], flags: NoteFlags) -> Self {
        let lanes = self.lanes(lanes);
        self.notes.push(ChartNote { tick, data: NoteData::Fret(FretNote { lanes, flags }) });
        self
    }

    pub fn fret(self, tick: u64, lanes: &[(usize, u64)]) -> Self {
        self.fret_flags(tick, lanes, NoteFlags::empty())
    }

    pub fn drum(mut self, tick: u64, lanes: &[usize], accents: &[usize], ghosts: &[usize]) -> Self {
        let lanes = self.lanes(&lanes.iter().map(|&l| (l, 1)).collect::<Vec<_>>());
        let accents = accents.iter().fold(LaneMask::EMPTY, |m, &l| m.with(l));
        let ghosts = ghosts.iter().fold(LaneMask::EMPTY, |m, &l| m.with(l));
        self.notes.push(ChartNote {
            tick,
            data: NoteData::Drums(DrumNote { lanes, accents, ghosts, flags: NoteFlags::empty() }),
        });
        self
    }

    pub fn keys(mut self, tick: u64, lanes: &[(usize, u64)]) -> Self {
        let lanes = self.lanes(lanes);
        self.notes.push(ChartNote { tick, data: NoteData::Keys(KeysNote { lanes }) });
        self
    }

    /// Pro guitar note with `(string, fret)` pairs; fret `u8::MAX` marks a
    /// muted string.
    pub fn pro(mut self, tick: u64, fingering: &[(usize, u8)]) -> Self {
        let mut strings: smallvec::SmallVec<[ProString; PRO_STRINGS]> =
            smallvec![ProString::default(); PRO_STRINGS];
        for &(string, fret) in fingering {
            strings[string] = if fret == u8::MAX {
                ProString { lane: Lane { length: 1 }, fret: 0, mode: StringMode::Muted }
            } else {
                ProString { lane: Lane { length: 1 }, fret, mode: StringMode::Normal }
            };
        }
        self.notes.push(ChartNote {
            tick,
            data: NoteData::ProGuitar(ProGuitarNote { strings, flags: NoteFlags::empty() }),
        });
        self
    }

    pub fn phrase(mut self, kind: PhraseKind, start: u64, end: u64) -> Self {
        self.phrases.push(Phrase { kind, start, end });
        self
    }

    pub fn into_track(self) -> TrackData {
        TrackData {
            instrument: self.instrument,
            difficulty: Difficulty::Expert,
            notes: self.notes,
            phrases: self.phrases,
        }
    }

    pub fn into_chart(self) -> ChartData {
        chart_with(vec![self.into_track()])
    }
}

pub fn chart_with(tracks: Vec<TrackData>) -> ChartData {
    ChartData {
        name: "synthetic".to_string(),
        resolution: RESOLUTION,
        tempos: vec![TempoChange { tick: 0, bpm: 120.0 }],
        time_signatures: Vec::new(),
        beats: Vec::new(),
        tracks,
    }
}

/// Five-fret chart from `(tick, [(lane, length)], flags)` rows.
pub fn fret_chart(notes: Vec<(u64, Vec<(usize, u64)>, NoteFlags)>, phrases: Vec<Phrase>) -> ChartData {
    let mut builder = TrackBuilder::new(Instrument::FiveFret);
    for (tick, lanes, flags) in notes {
        builder = builder.fret_flags(tick, &lanes, flags);
    }
    for phrase in phrases {
        builder = builder.phrase(phrase.kind, phrase.start, phrase.end);
    }
    builder.into_chart()
}
