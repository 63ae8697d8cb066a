use crate::game::player::PlayerEvent;
use crate::game::playable::HitStatus;
use crate::game::solo::SoloResult;
use rustc_hash::FxHashMap;
use serde::Serialize;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct TimingStats {
    pub mean_abs_ms: f32,
    pub mean_ms: f32,
    pub stddev_ms: f32,
    pub max_abs_ms: f32,
    pub count: usize,
}

#[inline(always)]
pub fn compute_timing_stats(offsets_ms: &[f32]) -> TimingStats {
    let count = offsets_ms.len();
    if count == 0 {
        return TimingStats::default();
    }
    let mut sum_abs = 0.0_f32;
    let mut sum_signed = 0.0_f32;
    let mut max_abs = 0.0_f32;
    for &e in offsets_ms {
        let a = e.abs();
        sum_abs += a;
        sum_signed += e;
        max_abs = max_abs.max(a);
    }
    let mean_ms = sum_signed / count as f32;
    let mean_abs_ms = sum_abs / count as f32;

    // Sample standard deviation of signed offsets
    let stddev_ms = if count > 1 {
        let sum_diff_sq: f32 = offsets_ms.iter().map(|e| (e - mean_ms) * (e - mean_ms)).sum();
        (sum_diff_sq / (count as f32 - 1.0)).sqrt()
    } else {
        0.0
    };

    TimingStats { mean_abs_ms, mean_ms, stddev_ms, max_abs_ms: max_abs, count }
}

const HIST_BIN_MS: f32 = 1.0;

/// Offsets bucketed into 1ms bins, sorted by bin.
pub fn build_histogram_ms(offsets_ms: &[f32]) -> Vec<(i32, u32)> {
    let mut counts: FxHashMap<i32, u32> = FxHashMap::default();
    for &e in offsets_ms {
        let c = counts.entry((e / HIST_BIN_MS).floor() as i32).or_insert(0);
        *c = c.saturating_add(1);
    }
    let mut bins: Vec<(i32, u32)> = counts.into_iter().collect();
    bins.sort_unstable_by_key(|(bin, _)| *bin);
    bins
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct SoloSummary {
    pub phrase: usize,
    pub notes_hit: u32,
    pub notes_total: u32,
    pub percentage: f64,
}

impl From<SoloResult> for SoloSummary {
    fn from(r: SoloResult) -> Self {
        Self { phrase: r.phrase, notes_hit: r.notes_hit, notes_total: r.notes_total, percentage: r.percentage }
    }
}

/// Tallies for one player, fed from the event stream.
#[derive(Clone, Debug, Default)]
pub struct PlayerStats {
    pub hits: u32,
    pub misses: u32,
    pub drops: u32,
    pub sustains_completed: u32,
    pub overhits: u32,
    pub max_combo: u32,
    pub overdrive_phrases_completed: u32,
    pub overdrive_phrases_failed: u32,
    pub overdrive_activations: u32,
    pub solos: Vec<SoloSummary>,
    offsets_ms: Vec<f32>,
}

impl PlayerStats {
    pub fn record(&mut self, event: &PlayerEvent) {
        match event {
            PlayerEvent::Note { status, combo, judgment, .. } => {
                match status {
                    HitStatus::Hit | HitStatus::Sustained => self.hits += 1,
                    HitStatus::Missed => self.misses += 1,
                    HitStatus::Dropped => self.drops += 1,
                    HitStatus::Idle | HitStatus::Partial => {}
                }
                if let Some(j) = judgment {
                    self.offsets_ms.push(j.time_error_ms);
                }
                self.max_combo = self.max_combo.max(*combo);
            }
            PlayerEvent::SustainEnd { .. } => self.sustains_completed += 1,
            PlayerEvent::Overhit { .. } => self.overhits += 1,
            PlayerEvent::OverdrivePhrase { completed: true, .. } => self.overdrive_phrases_completed += 1,
            PlayerEvent::OverdrivePhrase { completed: false, .. } => self.overdrive_phrases_failed += 1,
            PlayerEvent::OverdriveActivated { .. } => self.overdrive_activations += 1,
            PlayerEvent::SoloEnded { result, .. } => self.solos.push((*result).into()),
            PlayerEvent::OverdriveDeactivated { .. } | PlayerEvent::SoloStarted { .. } => {}
        }
    }

    pub fn offsets_ms(&self) -> &[f32] {
        &self.offsets_ms
    }

    pub fn timing(&self) -> TimingStats {
        compute_timing_stats(&self.offsets_ms)
    }

    pub fn summary(&self, player: usize) -> PlayerSummary {
        let judged = self.hits + self.misses;
        PlayerSummary {
            player,
            hits: self.hits,
            misses: self.misses,
            drops: self.drops,
            sustains_completed: self.sustains_completed,
            overhits: self.overhits,
            max_combo: self.max_combo,
            accuracy: if judged == 0 { 0.0 } else { f64::from(self.hits) / f64::from(judged) },
            overdrive_phrases_completed: self.overdrive_phrases_completed,
            overdrive_phrases_failed: self.overdrive_phrases_failed,
            overdrive_activations: self.overdrive_activations,
            timing: self.timing(),
            solos: self.solos.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerSummary {
    pub player: usize,
    pub hits: u32,
    pub misses: u32,
    pub drops: u32,
    pub sustains_completed: u32,
    pub overhits: u32,
    pub max_combo: u32,
    pub accuracy: f64,
    pub overdrive_phrases_completed: u32,
    pub overdrive_phrases_failed: u32,
    pub overdrive_activations: u32,
    pub timing: TimingStats,
    pub solos: Vec<SoloSummary>,
}
