use crate::game::chart::ChartError;
use log::{debug, info};
use serde::{Deserialize, Serialize};

// Ticks per quarter note used by most chart formats.
pub const DEFAULT_RESOLUTION: u32 = 480;
pub const DEFAULT_BPM: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub tick: u64,
    pub numerator: u32,
    pub denominator: u32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { tick: 0, numerator: 4, denominator: 4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeatKind {
    Measure,
    Strong,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatMarker {
    pub tick: u64,
    pub kind: BeatKind,
}

/// A chart position carried in both coordinate spaces. The seconds value is
/// derived from the tick once, through the sync track, and never re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DualPosition {
    pub tick: u64,
    pub seconds: f64,
}

/// Caller-held index into the tempo segments.
///
/// Queries through one cursor must be issued in non-decreasing order; call
/// [`TempoCursor::reset`] before going backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TempoCursor {
    index: usize,
}

impl TempoCursor {
    pub const fn new() -> Self {
        Self { index: 0 }
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        self.index = 0;
    }

    #[inline(always)]
    pub const fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    seconds: f64,
    seconds_per_tick: f64,
}

#[derive(Debug, Clone)]
pub struct SyncTrack {
    resolution: u32,
    segments: Vec<TempoSegment>,
    time_signatures: Vec<TimeSignature>,
    beats: Vec<BeatMarker>,
}

impl SyncTrack {
    /// Builds the piecewise-linear tick/second map. Tempo changes must be
    /// strictly increasing in tick with positive BPM. An empty list means a
    /// constant 120 BPM; a first change after tick 0 is extended back to 0.
    pub fn new(
        resolution: u32,
        tempos: &[TempoChange],
        time_signatures: &[TimeSignature],
    ) -> Result<Self, ChartError> {
        if resolution == 0 {
            return Err(ChartError::ZeroResolution);
        }

        let mut changes: Vec<TempoChange> = Vec::with_capacity(tempos.len() + 1);
        for (i, change) in tempos.iter().enumerate() {
            if !change.bpm.is_finite() || change.bpm <= 0.0 {
                return Err(ChartError::InvalidTempo { tick: change.tick, bpm: change.bpm });
            }
            if i > 0 && change.tick <= tempos[i - 1].tick {
                return Err(ChartError::TempoOrder { tick: change.tick });
            }
            changes.push(*change);
        }
        match changes.first() {
            None => changes.push(TempoChange { tick: 0, bpm: DEFAULT_BPM }),
            Some(first) if first.tick > 0 => {
                let bpm = first.bpm;
                changes.insert(0, TempoChange { tick: 0, bpm });
            }
            Some(_) => {}
        }

        let mut segments = Vec::with_capacity(changes.len());
        let mut seconds = 0.0;
        for (i, change) in changes.iter().enumerate() {
            if i > 0 {
                let prev: &TempoSegment = &segments[i - 1];
                seconds = prev.seconds + (change.tick - prev.tick) as f64 * prev.seconds_per_tick;
            }
            segments.push(TempoSegment {
                tick: change.tick,
                seconds,
                seconds_per_tick: 60.0 / (change.bpm * f64::from(resolution)),
            });
        }

        let mut signatures: Vec<TimeSignature> = Vec::with_capacity(time_signatures.len() + 1);
        for (i, ts) in time_signatures.iter().enumerate() {
            if ts.numerator == 0 || ts.denominator == 0 || !ts.denominator.is_power_of_two() {
                return Err(ChartError::InvalidTimeSignature { tick: ts.tick });
            }
            if i > 0 && ts.tick <= time_signatures[i - 1].tick {
                return Err(ChartError::TimeSignatureOrder { tick: ts.tick });
            }
            signatures.push(*ts);
        }
        if signatures.first().is_none_or(|ts| ts.tick > 0) {
            signatures.insert(0, TimeSignature::default());
        }

        debug!(
            "Sync track built: resolution={resolution}, tempo_segments={}, time_signatures={}",
            segments.len(),
            signatures.len()
        );

        Ok(Self { resolution, segments, time_signatures: signatures, beats: Vec::new() })
    }

    #[inline(always)]
    pub const fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn tempo_count(&self) -> usize {
        self.segments.len()
    }

    pub fn time_signatures(&self) -> &[TimeSignature] {
        &self.time_signatures
    }

    pub fn beats(&self) -> &[BeatMarker] {
        &self.beats
    }

    #[inline(always)]
    fn advance_to_tick(&self, tick: u64, cursor: &mut TempoCursor) -> TempoSegment {
        debug_assert!(
            self.segments[cursor.index].tick <= tick,
            "tempo cursor at segment {} (tick {}) queried for earlier tick {tick}; reset the cursor first",
            cursor.index,
            self.segments[cursor.index].tick
        );
        while cursor.index + 1 < self.segments.len() && self.segments[cursor.index + 1].tick <= tick {
            cursor.index += 1;
        }
        self.segments[cursor.index]
    }

    /// Seconds at `tick`, advancing `cursor` through the tempo segments it
    /// passes. Cost is the number of segments advanced.
    #[inline(always)]
    pub fn convert_to_seconds(&self, tick: u64, cursor: &mut TempoCursor) -> f64 {
        let seg = self.advance_to_tick(tick, cursor);
        seg.seconds + (tick - seg.tick) as f64 * seg.seconds_per_tick
    }

    /// Fractional tick at `seconds`, with the same cursor discipline as
    /// [`SyncTrack::convert_to_seconds`]. Times before zero extrapolate the
    /// first tempo and return negative ticks.
    #[inline(always)]
    pub fn convert_to_ticks(&self, seconds: f64, cursor: &mut TempoCursor) -> f64 {
        debug_assert!(
            cursor.index == 0 || self.segments[cursor.index].seconds <= seconds,
            "tempo cursor queried for earlier time {seconds}; reset the cursor first"
        );
        while cursor.index + 1 < self.segments.len() && self.segments[cursor.index + 1].seconds <= seconds {
            cursor.index += 1;
        }
        let seg = self.segments[cursor.index];
        seg.tick as f64 + (seconds - seg.seconds) / seg.seconds_per_tick
    }

    #[inline(always)]
    pub fn position(&self, tick: u64, cursor: &mut TempoCursor) -> DualPosition {
        DualPosition { tick, seconds: self.convert_to_seconds(tick, cursor) }
    }

    /// Cursor-free lookup for out-of-order queries such as sustain ends.
    pub fn position_at(&self, tick: u64) -> DualPosition {
        let idx = self.segments.partition_point(|seg| seg.tick <= tick).saturating_sub(1);
        let seg = self.segments[idx];
        DualPosition { tick, seconds: seg.seconds + (tick - seg.tick) as f64 * seg.seconds_per_tick }
    }

    /// Nearest whole tick at `seconds`, clamped at zero.
    #[inline(always)]
    pub fn tick_at(&self, seconds: f64, cursor: &mut TempoCursor) -> u64 {
        let tick = self.convert_to_ticks(seconds, cursor).round();
        if tick <= 0.0 { 0 } else { tick as u64 }
    }

    #[inline(always)]
    fn ticks_per_beat(&self, denominator: u32) -> u64 {
        u64::from(self.resolution) * 4 / u64::from(denominator)
    }

    pub fn set_beats(&mut self, beats: Vec<BeatMarker>) {
        self.beats = beats;
    }

    /// Fills the beat markers from the time signatures up to `end_tick`.
    /// Compound meters (x/8 with a numerator divisible by three) get a strong
    /// beat every third pulse; all other pulses are strong.
    pub fn generate_beats(&mut self, end_tick: u64) {
        let mut beats = Vec::new();
        for (i, ts) in self.time_signatures.iter().enumerate() {
            let stop = self.time_signatures.get(i + 1).map_or(end_tick, |next| next.tick);
            let step = self.ticks_per_beat(ts.denominator).max(1);
            let compound = ts.denominator == 8 && ts.numerator % 3 == 0;
            let mut tick = ts.tick;
            let mut pulse = 0u32;
            while tick <= stop && (tick < stop || i + 1 == self.time_signatures.len()) {
                let kind = if pulse == 0 {
                    BeatKind::Measure
                } else if !compound || pulse % 3 == 0 {
                    BeatKind::Strong
                } else {
                    BeatKind::Weak
                };
                beats.push(BeatMarker { tick, kind });
                tick += step;
                pulse = (pulse + 1) % ts.numerator;
            }
        }
        info!("Generated {} beat markers up to tick {end_tick}.", beats.len());
        self.beats = beats;
    }

    pub fn beat_grid(&self) -> BeatGrid {
        let ticks = self.beats.iter().filter(|b| b.kind != BeatKind::Weak).map(|b| b.tick).collect();
        BeatGrid::new(ticks, self.ticks_per_beat(4))
    }

    pub fn measure_grid(&self) -> BeatGrid {
        let ticks = self.beats.iter().filter(|b| b.kind == BeatKind::Measure).map(|b| b.tick).collect();
        BeatGrid::new(ticks, self.ticks_per_beat(4) * 4)
    }
}

/// Sorted segment boundaries (beats or measures) for drain lookups. Past
/// the last marker the final segment length repeats.
#[derive(Debug, Clone)]
pub struct BeatGrid {
    ticks: Vec<u64>,
    tail_len: u64,
}

impl BeatGrid {
    pub fn new(mut ticks: Vec<u64>, fallback_len: u64) -> Self {
        ticks.sort_unstable();
        ticks.dedup();
        if ticks.first().is_none_or(|&t| t > 0) {
            ticks.insert(0, 0);
        }
        let tail_len = match ticks.len() {
            0 | 1 => fallback_len.max(1),
            n => (ticks[n - 1] - ticks[n - 2]).max(1),
        };
        Self { ticks, tail_len }
    }

    /// The `[start, end)` segment holding `tick`. `cursor` is an index into
    /// the boundaries and only moves forward.
    pub fn segment_at(&self, tick: u64, cursor: &mut usize) -> (u64, u64) {
        while *cursor + 1 < self.ticks.len() && self.ticks[*cursor + 1] <= tick {
            *cursor += 1;
        }
        if *cursor + 1 < self.ticks.len() {
            return (self.ticks[*cursor], self.ticks[*cursor + 1]);
        }
        let last = self.ticks[self.ticks.len() - 1];
        let start = last + (tick.saturating_sub(last) / self.tail_len) * self.tail_len;
        (start, start + self.tail_len)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tempo_track() -> SyncTrack {
        let tempos = [TempoChange { tick: 0, bpm: 120.0 }, TempoChange { tick: 960, bpm: 240.0 }];
        SyncTrack::new(480, &tempos, &[]).unwrap()
    }

    #[test]
    fn seconds_follow_each_tempo_segment() {
        let track = two_tempo_track();
        let mut cursor = TempoCursor::new();
        assert!((track.convert_to_seconds(480, &mut cursor) - 0.5).abs() < 1e-12);
        assert!((track.convert_to_seconds(960, &mut cursor) - 1.0).abs() < 1e-12);
        assert!((track.convert_to_seconds(1440, &mut cursor) - 1.25).abs() < 1e-12);
        assert_eq!(cursor.index(), 1, "cursor must sit on the second segment");
    }

    #[test]
    fn seconds_are_monotonic_in_tick() {
        let tempos = [
            TempoChange { tick: 0, bpm: 90.0 },
            TempoChange { tick: 700, bpm: 200.0 },
            TempoChange { tick: 1_500, bpm: 60.5 },
            TempoChange { tick: 4_000, bpm: 333.0 },
        ];
        let track = SyncTrack::new(192, &tempos, &[]).unwrap();
        let mut cursor = TempoCursor::new();
        let mut last = f64::NEG_INFINITY;
        for tick in (0..6_000).step_by(7) {
            let s = track.convert_to_seconds(tick, &mut cursor);
            assert!(s >= last, "seconds decreased at tick {tick}: {s} < {last}");
            last = s;
        }
    }

    #[test]
    fn ticks_invert_seconds_across_segments() {
        let track = two_tempo_track();
        let mut to_s = TempoCursor::new();
        let mut to_t = TempoCursor::new();
        for tick in [0u64, 100, 959, 960, 961, 2_000] {
            let s = track.convert_to_seconds(tick, &mut to_s);
            let back = track.convert_to_ticks(s, &mut to_t);
            assert!((back - tick as f64).abs() < 1e-6, "tick {tick} came back as {back}");
        }
    }

    #[test]
    fn cursor_free_lookup_matches_cursor_lookup() {
        let track = two_tempo_track();
        let mut cursor = TempoCursor::new();
        for tick in [0u64, 480, 960, 1_200] {
            assert_eq!(track.position_at(tick), track.position(tick, &mut cursor));
        }
    }

    #[test]
    fn rejects_bad_tempo_maps() {
        assert!(matches!(SyncTrack::new(0, &[], &[]), Err(ChartError::ZeroResolution)));
        let dup = [TempoChange { tick: 0, bpm: 120.0 }, TempoChange { tick: 0, bpm: 130.0 }];
        assert!(matches!(SyncTrack::new(480, &dup, &[]), Err(ChartError::TempoOrder { tick: 0 })));
        let neg = [TempoChange { tick: 0, bpm: -1.0 }];
        assert!(matches!(SyncTrack::new(480, &neg, &[]), Err(ChartError::InvalidTempo { .. })));
    }

    #[test]
    fn late_first_tempo_extends_to_zero() {
        let tempos = [TempoChange { tick: 480, bpm: 60.0 }];
        let track = SyncTrack::new(480, &tempos, &[]).unwrap();
        let mut cursor = TempoCursor::new();
        assert!((track.convert_to_seconds(480, &mut cursor) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn generated_beats_mark_measures() {
        let mut track = SyncTrack::new(480, &[], &[]).unwrap();
        track.generate_beats(480 * 8);
        let beats = track.beats();
        assert_eq!(beats.len(), 9);
        assert_eq!(beats[0].kind, BeatKind::Measure);
        assert_eq!(beats[1].kind, BeatKind::Strong);
        assert_eq!(beats[4], BeatMarker { tick: 1_920, kind: BeatKind::Measure });
    }

    #[test]
    fn compound_meter_uses_weak_pulses() {
        let sigs = [TimeSignature { tick: 0, numerator: 6, denominator: 8 }];
        let mut track = SyncTrack::new(480, &[], &sigs).unwrap();
        track.generate_beats(240 * 6);
        let kinds: Vec<BeatKind> = track.beats().iter().take(6).map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BeatKind::Measure,
                BeatKind::Weak,
                BeatKind::Weak,
                BeatKind::Strong,
                BeatKind::Weak,
                BeatKind::Weak
            ]
        );
    }

    #[test]
    fn grid_extrapolates_past_last_marker() {
        let grid = BeatGrid::new(vec![0, 480, 960], 480);
        let mut cursor = 0;
        assert_eq!(grid.segment_at(10, &mut cursor), (0, 480));
        assert_eq!(grid.segment_at(480, &mut cursor), (480, 960));
        assert_eq!(grid.segment_at(1_500, &mut cursor), (1_440, 1_920));
    }
}
