use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::str::FromStr;

// Widest family is six-fret guitar: open lane plus six frets.
pub const MAX_LANES: usize = 7;
pub const PRO_STRINGS: usize = 6;

/// Lane slot of a chart note. The length is the sustain in ticks; 0 means
/// the lane is not part of the note and 1 is a plain hit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Lane {
    pub length: u64,
}

impl Lane {
    pub const OFF: Lane = Lane { length: 0 };

    #[inline(always)]
    pub const fn is_active(&self) -> bool {
        self.length > 0
    }

    #[inline(always)]
    pub const fn is_sustain(&self) -> bool {
        self.length > 1
    }
}

pub type LaneArray = SmallVec<[Lane; MAX_LANES]>;

/// Sustains shorter than `min_sustain` collapse to a plain hit.
#[inline(always)]
pub const fn truncate_sustain(length: u64, min_sustain: u64) -> u64 {
    if length == 0 {
        0
    } else if length < min_sustain {
        1
    } else {
        length
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct NoteFlags: u8 {
        const FORCED = 1 << 0;
        const TAP = 1 << 1;
        const FLAM = 1 << 2;
    }
}

/// One bit per lane index.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneMask(pub u16);

impl LaneMask {
    pub const EMPTY: LaneMask = LaneMask(0);

    #[inline(always)]
    pub const fn with(self, lane: usize) -> Self {
        Self(self.0 | (1 << lane))
    }

    #[inline(always)]
    pub const fn without(self, lane: usize) -> Self {
        Self(self.0 & !(1 << lane))
    }

    #[inline(always)]
    pub const fn contains(self, lane: usize) -> bool {
        self.0 & (1 << lane) != 0
    }

    #[inline(always)]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn is_subset_of(self, other: LaneMask) -> bool {
        self.0 & other.0 == self.0
    }

    /// Highest set lane, if any.
    #[inline(always)]
    pub const fn highest(self) -> Option<usize> {
        if self.0 == 0 { None } else { Some(15 - self.0.leading_zeros() as usize) }
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..16).filter(move |&lane| self.contains(lane))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instrument {
    FiveFret,
    SixFret,
    Drums,
    Keys,
    ProGuitar,
}

impl Instrument {
    /// Lane slots per note. Fretted families reserve lane 0 for open notes;
    /// drums put the kick on lane 0.
    pub const fn lane_count(self) -> usize {
        match self {
            Self::FiveFret => 6,
            Self::SixFret => 7,
            Self::Drums => 5,
            Self::Keys => 5,
            Self::ProGuitar => PRO_STRINGS,
        }
    }

    pub const fn is_fretted(self) -> bool {
        matches!(self, Self::FiveFret | Self::SixFret | Self::ProGuitar)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FiveFret => "FiveFret",
            Self::SixFret => "SixFret",
            Self::Drums => "Drums",
            Self::Keys => "Keys",
            Self::ProGuitar => "ProGuitar",
        }
    }
}

impl FromStr for Instrument {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fivefret" | "guitar" => Ok(Self::FiveFret),
            "sixfret" | "ghl" => Ok(Self::SixFret),
            "drums" => Ok(Self::Drums),
            "keys" => Ok(Self::Keys),
            "proguitar" => Ok(Self::ProGuitar),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl FromStr for Difficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            "expert" => Ok(Self::Expert),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dynamics {
    #[default]
    Normal,
    Accent,
    Ghost,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringMode {
    #[default]
    Normal,
    Muted,
    Harmonic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FretNote {
    pub lanes: LaneArray,
    pub flags: NoteFlags,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrumNote {
    pub lanes: LaneArray,
    pub accents: LaneMask,
    pub ghosts: LaneMask,
    pub flags: NoteFlags,
}

impl DrumNote {
    pub fn dynamics(&self, lane: usize) -> Dynamics {
        if self.accents.contains(lane) {
            Dynamics::Accent
        } else if self.ghosts.contains(lane) {
            Dynamics::Ghost
        } else {
            Dynamics::Normal
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeysNote {
    pub lanes: LaneArray,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProString {
    pub lane: Lane,
    pub fret: u8,
    pub mode: StringMode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProGuitarNote {
    pub strings: SmallVec<[ProString; PRO_STRINGS]>,
    pub flags: NoteFlags,
}

impl ProGuitarNote {
    /// Active strings as `(string, fret, mode)`.
    pub fn fingering(&self) -> impl Iterator<Item = (usize, u8, StringMode)> + '_ {
        self.strings
            .iter()
            .enumerate()
            .filter(|(_, s)| s.lane.is_active())
            .map(|(i, s)| (i, s.fret, s.mode))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NoteData {
    Fret(FretNote),
    Drums(DrumNote),
    Keys(KeysNote),
    ProGuitar(ProGuitarNote),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChartNote {
    pub tick: u64,
    pub data: NoteData,
}

/// Shared view over chart and playable notes used by the windowing code.
pub trait NoteLike {
    fn tick(&self) -> u64;
    fn longest_sustain(&self) -> u64;
    /// Panics when `lane` is outside the note's lane array.
    fn is_active(&self, lane: usize) -> bool;
}

impl ChartNote {
    pub fn lane_len(&self) -> usize {
        match &self.data {
            NoteData::Fret(n) => n.lanes.len(),
            NoteData::Drums(n) => n.lanes.len(),
            NoteData::Keys(n) => n.lanes.len(),
            NoteData::ProGuitar(n) => n.strings.len(),
        }
    }

    #[inline(always)]
    pub fn lane(&self, lane: usize) -> Lane {
        match &self.data {
            NoteData::Fret(n) => n.lanes[lane],
            NoteData::Drums(n) => n.lanes[lane],
            NoteData::Keys(n) => n.lanes[lane],
            NoteData::ProGuitar(n) => n.strings[lane].lane,
        }
    }

    pub fn active_mask(&self) -> LaneMask {
        (0..self.lane_len()).filter(|&l| self.lane(l).is_active()).fold(LaneMask::EMPTY, LaneMask::with)
    }

    pub fn flags(&self) -> NoteFlags {
        match &self.data {
            NoteData::Fret(n) => n.flags,
            NoteData::Drums(n) => n.flags,
            NoteData::Keys(_) => NoteFlags::empty(),
            NoteData::ProGuitar(n) => n.flags,
        }
    }

    pub fn family_name(&self) -> &'static str {
        match &self.data {
            NoteData::Fret(_) => "fret",
            NoteData::Drums(_) => "drums",
            NoteData::Keys(_) => "keys",
            NoteData::ProGuitar(_) => "pro guitar",
        }
    }

    /// Whether the payload is the family `instrument` expects.
    pub fn matches(&self, instrument: Instrument) -> bool {
        match (&self.data, instrument) {
            (NoteData::Fret(n), Instrument::FiveFret | Instrument::SixFret) => {
                n.lanes.len() == instrument.lane_count()
            }
            (NoteData::Drums(n), Instrument::Drums) => n.lanes.len() == instrument.lane_count(),
            (NoteData::Keys(n), Instrument::Keys) => n.lanes.len() == instrument.lane_count(),
            (NoteData::ProGuitar(n), Instrument::ProGuitar) => n.strings.len() == PRO_STRINGS,
            _ => false,
        }
    }

    pub fn truncate_sustains(&mut self, min_sustain: u64) {
        let fix = |lane: &mut Lane| lane.length = truncate_sustain(lane.length, min_sustain);
        match &mut self.data {
            NoteData::Fret(n) => n.lanes.iter_mut().for_each(fix),
            NoteData::Drums(n) => n.lanes.iter_mut().for_each(fix),
            NoteData::Keys(n) => n.lanes.iter_mut().for_each(fix),
            NoteData::ProGuitar(n) => n.strings.iter_mut().for_each(|s| fix(&mut s.lane)),
        }
    }
}

impl NoteLike for ChartNote {
    #[inline(always)]
    fn tick(&self) -> u64 {
        self.tick
    }

    fn longest_sustain(&self) -> u64 {
        (0..self.lane_len()).map(|l| self.lane(l).length).max().unwrap_or(0)
    }

    #[inline(always)]
    fn is_active(&self, lane: usize) -> bool {
        self.lane(lane).is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn instrument_and_difficulty_parse_case_insensitively() {
        assert_eq!("fiveFret".parse::<Instrument>(), Ok(Instrument::FiveFret));
        assert_eq!(" Drums ".parse::<Instrument>(), Ok(Instrument::Drums));
        assert_eq!("EXPERT".parse::<Difficulty>(), Ok(Difficulty::Expert));
        assert!("bass".parse::<Instrument>().is_err());
    }

    fn fret(tick: u64, lanes: &[(usize, u64)]) -> ChartNote {
        let mut arr: LaneArray = smallvec![Lane::OFF; Instrument::FiveFret.lane_count()];
        for &(lane, length) in lanes {
            arr[lane] = Lane { length };
        }
        ChartNote { tick, data: NoteData::Fret(FretNote { lanes: arr, flags: NoteFlags::empty() }) }
    }

    #[test]
    fn short_sustains_collapse_to_a_hit() {
        assert_eq!(truncate_sustain(0, 100), 0);
        assert_eq!(truncate_sustain(40, 100), 1);
        assert_eq!(truncate_sustain(100, 100), 100);
        let mut note = fret(0, &[(1, 30), (2, 500)]);
        note.truncate_sustains(120);
        assert_eq!(note.lane(1).length, 1);
        assert_eq!(note.lane(2).length, 500);
    }

    #[test]
    fn note_like_reports_lanes_and_longest_sustain() {
        let note = fret(960, &[(1, 1), (3, 240)]);
        assert_eq!(note.tick(), 960);
        assert_eq!(note.longest_sustain(), 240);
        assert!(note.is_active(3));
        assert!(!note.is_active(2));
        assert_eq!(note.active_mask(), LaneMask::EMPTY.with(1).with(3));
    }

    #[test]
    #[should_panic]
    fn lane_out_of_range_panics() {
        let note = fret(0, &[(1, 1)]);
        let _ = note.is_active(9);
    }

    #[test]
    fn lane_mask_highest() {
        assert_eq!(LaneMask::EMPTY.highest(), None);
        assert_eq!(LaneMask::EMPTY.with(2).with(5).highest(), Some(5));
        assert!(LaneMask(0b0110).is_subset_of(LaneMask(0b1110)));
        assert!(!LaneMask(0b0111).is_subset_of(LaneMask(0b1110)));
    }

    #[test]
    fn family_wiring_check() {
        let note = fret(0, &[(1, 1)]);
        assert!(note.matches(Instrument::FiveFret));
        assert!(!note.matches(Instrument::SixFret));
        assert!(!note.matches(Instrument::Drums));
    }
}
