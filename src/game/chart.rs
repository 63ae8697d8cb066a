use crate::game::note::{
    ChartNote, Difficulty, DrumNote, FretNote, Instrument, KeysNote, Lane, LaneArray, LaneMask,
    MAX_LANES, NoteData, NoteFlags, NoteLike, PRO_STRINGS, ProGuitarNote, ProString, StringMode,
};
use crate::game::phrase::{Phrase, PhraseKind, PhraseList};
use crate::game::timing::{BeatGrid, BeatMarker, DualPosition, SyncTrack, TempoChange, TempoCursor, TimeSignature};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("failed to read chart '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed chart document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("chart resolution must be non-zero")]
    ZeroResolution,
    #[error("tempo change at tick {tick} has invalid BPM {bpm}")]
    InvalidTempo { tick: u64, bpm: f64 },
    #[error("tempo change at tick {tick} does not increase in tick")]
    TempoOrder { tick: u64 },
    #[error("time signature at tick {tick} is invalid")]
    InvalidTimeSignature { tick: u64 },
    #[error("time signature at tick {tick} does not increase in tick")]
    TimeSignatureOrder { tick: u64 },
    #[error("beat marker at tick {tick} is out of order")]
    BeatOrder { tick: u64 },
    #[error("track {track}: note at tick {tick} is duplicated or out of order")]
    NoteOrder { track: usize, tick: u64 },
    #[error("track {track}: note at tick {tick} has no active lane")]
    EmptyNote { track: usize, tick: u64 },
    #[error("track {track}: note at tick {tick} does not belong to a {instrument} track")]
    FamilyMismatch { track: usize, tick: u64, instrument: &'static str },
    #[error("note at tick {tick} has {found} lanes, expected {expected}")]
    LaneCount { tick: u64, expected: usize, found: usize },
    #[error("note at tick {tick} references lane {lane} outside the lane array")]
    LaneOutOfRange { tick: u64, lane: usize },
    #[error("track {track}: {kind:?} phrase [{start}, {end}) is empty or overlaps its predecessor")]
    PhraseOverlap { track: usize, kind: PhraseKind, start: u64, end: u64 },
    #[error("no track for {instrument} {difficulty:?}")]
    MissingTrack { instrument: &'static str, difficulty: Difficulty },
}

// --- SERIALIZABLE MIRROR STRUCTS ---

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct NoteDocument {
    pub tick: u64,
    /// Sustain length per lane slot, 0 for an inactive lane.
    pub lanes: Vec<u64>,
    pub flags: NoteFlags,
    pub accents: Vec<usize>,
    pub ghosts: Vec<usize>,
    pub frets: Vec<u8>,
    pub modes: Vec<StringMode>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TrackDocument {
    pub instrument: Instrument,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub notes: Vec<NoteDocument>,
    #[serde(default)]
    pub phrases: Vec<Phrase>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChartDocument {
    #[serde(default)]
    pub name: String,
    pub resolution: u32,
    #[serde(default)]
    pub tempos: Vec<TempoChange>,
    #[serde(default)]
    pub time_signatures: Vec<TimeSignature>,
    #[serde(default)]
    pub beats: Vec<BeatMarker>,
    pub tracks: Vec<TrackDocument>,
}

fn lane_mask(tick: u64, lanes: &[usize], lane_count: usize) -> Result<LaneMask, ChartError> {
    lanes.iter().try_fold(LaneMask::EMPTY, |mask, &lane| {
        if lane >= lane_count {
            Err(ChartError::LaneOutOfRange { tick, lane })
        } else {
            Ok(mask.with(lane))
        }
    })
}

impl NoteDocument {
    fn into_note(self, instrument: Instrument) -> Result<ChartNote, ChartError> {
        let expected = instrument.lane_count();
        if self.lanes.len() != expected {
            return Err(ChartError::LaneCount { tick: self.tick, expected, found: self.lanes.len() });
        }
        let lanes: LaneArray = self.lanes.iter().map(|&length| Lane { length }).collect();
        let data = match instrument {
            Instrument::FiveFret | Instrument::SixFret => {
                NoteData::Fret(FretNote { lanes, flags: self.flags })
            }
            Instrument::Drums => NoteData::Drums(DrumNote {
                lanes,
                accents: lane_mask(self.tick, &self.accents, expected)?,
                ghosts: lane_mask(self.tick, &self.ghosts, expected)?,
                flags: self.flags,
            }),
            Instrument::Keys => NoteData::Keys(KeysNote { lanes }),
            Instrument::ProGuitar => {
                for len in [self.frets.len(), self.modes.len()] {
                    if len != 0 && len != PRO_STRINGS {
                        return Err(ChartError::LaneCount { tick: self.tick, expected: PRO_STRINGS, found: len });
                    }
                }
                let strings = lanes
                    .iter()
                    .enumerate()
                    .map(|(i, &lane)| ProString {
                        lane,
                        fret: self.frets.get(i).copied().unwrap_or(0),
                        mode: self.modes.get(i).copied().unwrap_or_default(),
                    })
                    .collect();
                NoteData::ProGuitar(ProGuitarNote { strings, flags: self.flags })
            }
        };
        Ok(ChartNote { tick: self.tick, data })
    }
}

#[derive(Clone, Debug)]
pub struct TrackData {
    pub instrument: Instrument,
    pub difficulty: Difficulty,
    pub notes: Vec<ChartNote>,
    pub phrases: Vec<Phrase>,
}

#[derive(Clone, Debug)]
pub struct ChartData {
    pub name: String,
    pub resolution: u32,
    pub tempos: Vec<TempoChange>,
    pub time_signatures: Vec<TimeSignature>,
    pub beats: Vec<BeatMarker>,
    pub tracks: Vec<TrackData>,
}

impl TryFrom<ChartDocument> for ChartData {
    type Error = ChartError;

    fn try_from(doc: ChartDocument) -> Result<Self, Self::Error> {
        let tracks = doc
            .tracks
            .into_iter()
            .map(|track| {
                let instrument = track.instrument;
                let notes = track
                    .notes
                    .into_iter()
                    .map(|n| n.into_note(instrument))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TrackData { instrument, difficulty: track.difficulty, notes, phrases: track.phrases })
            })
            .collect::<Result<Vec<_>, ChartError>>()?;
        Ok(Self {
            name: doc.name,
            resolution: doc.resolution,
            tempos: doc.tempos,
            time_signatures: doc.time_signatures,
            beats: doc.beats,
            tracks,
        })
    }
}

impl ChartData {
    pub fn from_json_str(s: &str) -> Result<Self, ChartError> {
        let doc: ChartDocument = serde_json::from_str(s)?;
        let chart = Self::try_from(doc)?;
        chart.validate()?;
        Ok(chart)
    }

    pub fn load_json(path: &Path) -> Result<Self, ChartError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ChartError::Io { path: path.display().to_string(), source })?;
        let chart = Self::from_json_str(&text)?;
        info!(
            "Loaded chart '{}' from '{}' ({} tracks).",
            chart.name,
            path.display(),
            chart.tracks.len()
        );
        Ok(chart)
    }

    /// Loader-side checks. The engine assumes every chart it receives has
    /// passed these.
    pub fn validate(&self) -> Result<(), ChartError> {
        if self.resolution == 0 {
            return Err(ChartError::ZeroResolution);
        }
        for pair in self.beats.windows(2) {
            if pair[1].tick <= pair[0].tick {
                return Err(ChartError::BeatOrder { tick: pair[1].tick });
            }
        }
        for (t, track) in self.tracks.iter().enumerate() {
            let mut last: Option<u64> = None;
            for note in &track.notes {
                if last.is_some_and(|prev| note.tick <= prev) {
                    return Err(ChartError::NoteOrder { track: t, tick: note.tick });
                }
                if !note.matches(track.instrument) {
                    return Err(ChartError::FamilyMismatch {
                        track: t,
                        tick: note.tick,
                        instrument: track.instrument.as_str(),
                    });
                }
                if note.active_mask().is_empty() {
                    return Err(ChartError::EmptyNote { track: t, tick: note.tick });
                }
                last = Some(note.tick);
            }
            for kind in PhraseKind::ALL {
                let mut phrases: Vec<_> = track.phrases.iter().filter(|p| p.kind == kind).collect();
                phrases.sort_by_key(|p| p.start);
                let mut prev_end: Option<u64> = None;
                for phrase in phrases {
                    if phrase.end <= phrase.start || prev_end.is_some_and(|end| phrase.start < end) {
                        return Err(ChartError::PhraseOverlap {
                            track: t,
                            kind,
                            start: phrase.start,
                            end: phrase.end,
                        });
                    }
                    prev_end = Some(phrase.end);
                }
            }
        }
        Ok(())
    }

    pub fn last_tick(&self) -> u64 {
        self.tracks
            .iter()
            .filter_map(|t| t.notes.last().map(|n| n.tick + n.longest_sustain()))
            .chain(self.tracks.iter().flat_map(|t| t.phrases.iter().map(|p| p.end)))
            .max()
            .unwrap_or(0)
    }
}

/// Read-only per-track data resolved once at load.
#[derive(Clone, Debug)]
pub struct TrackContext {
    pub instrument: Instrument,
    pub difficulty: Difficulty,
    pub notes: Vec<ChartNote>,
    pub positions: Vec<DualPosition>,
    /// Sustain end of every lane slot, indexed like the note's lanes.
    pub lane_ends: Vec<SmallVec<[DualPosition; MAX_LANES]>>,
    phrases: [PhraseList; 5],
    pub last_end: DualPosition,
}

impl TrackContext {
    fn build(sync: &SyncTrack, track: &TrackData, min_sustain: u64) -> Self {
        let mut notes = track.notes.clone();
        for note in &mut notes {
            note.truncate_sustains(min_sustain);
        }

        let mut cursor = TempoCursor::new();
        let positions: Vec<DualPosition> = notes.iter().map(|n| sync.position(n.tick, &mut cursor)).collect();
        let lane_ends = notes
            .iter()
            .map(|n| (0..n.lane_len()).map(|l| sync.position_at(n.tick + n.lane(l).length)).collect())
            .collect::<Vec<SmallVec<[DualPosition; MAX_LANES]>>>();
        let last_end = lane_ends
            .iter()
            .flat_map(|ends| ends.iter().copied())
            .max_by(|a, b| a.tick.cmp(&b.tick))
            .unwrap_or_default();

        let ticks: Vec<u64> = notes.iter().map(|n| n.tick).collect();
        let phrases = PhraseKind::ALL.map(|kind| {
            let mut list: Vec<Phrase> = track.phrases.iter().filter(|p| p.kind == kind).copied().collect();
            list.sort_by_key(|p| p.start);
            PhraseList::new(list, &ticks)
        });

        debug!(
            "Track {} {:?} resolved: notes={}, overdrive_phrases={}, solos={}",
            track.instrument.as_str(),
            track.difficulty,
            notes.len(),
            phrases[PhraseKind::Overdrive.index()].len(),
            phrases[PhraseKind::Solo.index()].len()
        );

        Self {
            instrument: track.instrument,
            difficulty: track.difficulty,
            notes,
            positions,
            lane_ends,
            phrases,
            last_end,
        }
    }

    #[inline(always)]
    pub fn phrases(&self, kind: PhraseKind) -> &PhraseList {
        &self.phrases[kind.index()]
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// End of the longest sustain of note `index`.
    pub fn longest_end(&self, index: usize) -> DualPosition {
        let tick = self.notes[index].tick + self.notes[index].longest_sustain();
        self.lane_ends[index]
            .iter()
            .copied()
            .find(|p| p.tick == tick)
            .unwrap_or(self.positions[index])
    }
}

/// Immutable chart state shared by every player of a session.
#[derive(Clone, Debug)]
pub struct ChartContext {
    pub name: String,
    pub sync: SyncTrack,
    pub beat_grid: BeatGrid,
    pub measure_grid: BeatGrid,
    pub tracks: Vec<TrackContext>,
}

impl ChartContext {
    pub fn build(chart: &ChartData, min_sustain: u64) -> Result<Self, ChartError> {
        chart.validate()?;
        let mut sync = SyncTrack::new(chart.resolution, &chart.tempos, &chart.time_signatures)?;
        if chart.beats.is_empty() {
            sync.generate_beats(chart.last_tick() + u64::from(chart.resolution) * 4);
        } else {
            sync.set_beats(chart.beats.clone());
        }
        let beat_grid = sync.beat_grid();
        let measure_grid = sync.measure_grid();

        let tracks: Vec<TrackContext> =
            chart.tracks.iter().map(|t| TrackContext::build(&sync, t, min_sustain)).collect();

        info!(
            "Chart '{}' processed: tracks={}, tempo_segments={}, beats={}, measures={}",
            chart.name,
            tracks.len(),
            sync.tempo_count(),
            beat_grid.len(),
            measure_grid.len()
        );
        Ok(Self { name: chart.name.clone(), sync, beat_grid, measure_grid, tracks })
    }

    pub fn track_index(&self, instrument: Instrument, difficulty: Difficulty) -> Result<usize, ChartError> {
        self.tracks
            .iter()
            .position(|t| t.instrument == instrument && t.difficulty == difficulty)
            .ok_or(ChartError::MissingTrack { instrument: instrument.as_str(), difficulty })
    }

    pub fn last_end_seconds(&self) -> f64 {
        self.tracks.iter().map(|t| t.last_end.seconds).fold(0.0, f64::max)
    }
}
