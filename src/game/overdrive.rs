use crate::game::timing::BeatGrid;
use log::debug;
use std::str::FromStr;

pub const OVERDRIVE_MAX: i64 = 1_000_000;
pub const OVERDRIVE_THRESHOLD: i64 = OVERDRIVE_MAX / 2;
pub const OVERDRIVE_PER_PHRASE: i64 = OVERDRIVE_MAX / 4;
pub const OVERDRIVE_PER_BEAT: i64 = OVERDRIVE_MAX / 32;
pub const OVERDRIVE_PER_MEASURE: i64 = OVERDRIVE_MAX / 8;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OverdriveStyle {
    /// Drains per beat.
    #[default]
    RockBand,
    /// Drains per measure.
    GuitarHero,
}

impl OverdriveStyle {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RockBand => "RockBand",
            Self::GuitarHero => "GuitarHero",
        }
    }

    pub const fn drain_per_segment(self) -> i64 {
        match self {
            Self::RockBand => OVERDRIVE_PER_BEAT,
            Self::GuitarHero => OVERDRIVE_PER_MEASURE,
        }
    }
}

impl FromStr for OverdriveStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rockband" | "rb" => Ok(Self::RockBand),
            "guitarhero" | "gh" => Ok(Self::GuitarHero),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeterChange {
    Activated,
    Deactivated,
}

/// Fixed-point overdrive meter. Grants and drains land in `offset` during a
/// frame; [`OverdriveMeter::commit`] applies them once, clamped.
#[derive(Clone, Debug)]
pub struct OverdriveMeter {
    style: OverdriveStyle,
    value: i64,
    offset: i64,
    active: bool,
    drained_to: u64,
    grid_cursor: usize,
}

impl OverdriveMeter {
    pub fn new(style: OverdriveStyle) -> Self {
        Self { style, value: 0, offset: 0, active: false, drained_to: 0, grid_cursor: 0 }
    }

    #[inline(always)]
    pub const fn style(&self) -> OverdriveStyle {
        self.style
    }

    #[inline(always)]
    pub const fn value(&self) -> i64 {
        self.value
    }

    #[inline(always)]
    pub const fn offset(&self) -> i64 {
        self.offset
    }

    #[inline(always)]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub fn fraction(&self) -> f64 {
        self.value as f64 / OVERDRIVE_MAX as f64
    }

    #[inline(always)]
    pub fn grant(&mut self, amount: i64) {
        self.offset += amount;
    }

    /// Starts draining at `tick` when the committed value reaches the
    /// threshold.
    pub fn try_activate(&mut self, tick: u64) -> bool {
        if self.active || self.value < OVERDRIVE_THRESHOLD {
            return false;
        }
        self.active = true;
        self.drained_to = tick;
        debug!("Overdrive activated at tick {tick} with value {}", self.value);
        true
    }

    /// Drains for the ticks between the last drain and `tick`. Each beat or
    /// measure segment is drained proportionally with floor math on the
    /// segment-relative tick, so a whole segment drains exactly its amount
    /// however it is split across frames.
    pub fn drain_to(&mut self, tick: u64, grid: &BeatGrid) {
        if !self.active || tick <= self.drained_to {
            return;
        }
        let per = self.style.drain_per_segment() as i128;
        let mut from = self.drained_to;
        while from < tick {
            let (start, end) = grid.segment_at(from, &mut self.grid_cursor);
            let to = end.min(tick);
            let len = (end - start) as i128;
            let drained = per * (to - start) as i128 / len - per * (from - start) as i128 / len;
            self.offset -= drained as i64;
            from = to;
        }
        self.drained_to = tick;
    }

    /// Applies the frame's offset and clamps to `[0, OVERDRIVE_MAX]`.
    pub fn commit(&mut self) -> Option<MeterChange> {
        self.value = (self.value + self.offset).clamp(0, OVERDRIVE_MAX);
        self.offset = 0;
        if self.active && self.value == 0 {
            self.active = false;
            debug!("Overdrive deactivated at tick {}", self.drained_to);
            return Some(MeterChange::Deactivated);
        }
        None
    }

    #[cfg(test)]
    pub(crate) fn set_value(&mut self, value: i64) {
        self.value = value;
    }
}

/// Per-phrase note tallies for one player.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PhraseProgress {
    pub total: u32,
    pub hit: u32,
    pub resolved: u32,
    pub failed: bool,
}

impl PhraseProgress {
    pub fn new(total: u32) -> Self {
        Self { total, ..Default::default() }
    }

    /// Records one note of the phrase. Returns `Some(completed)` once every
    /// note of the phrase is resolved.
    pub fn record(&mut self, hit: bool) -> Option<bool> {
        self.resolved += 1;
        if hit {
            self.hit += 1;
        } else {
            self.failed = true;
        }
        (self.resolved == self.total).then_some(!self.failed)
    }
}
