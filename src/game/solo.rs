use crate::game::phrase::PhraseList;
use log::info;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SoloResult {
    pub phrase: usize,
    pub notes_hit: u32,
    pub notes_total: u32,
    pub percentage: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SoloChange {
    Started { phrase: usize },
    Ended(SoloResult),
}

/// Walks the solo phrases in order: one activation and one deactivation per
/// phrase, never revisiting a finished one.
#[derive(Clone, Debug, Default)]
pub struct SoloTracker {
    index: usize,
    active: bool,
    hits: Vec<u32>,
}

impl SoloTracker {
    pub fn new(phrases: &PhraseList) -> Self {
        Self { index: 0, active: false, hits: vec![0; phrases.len()] }
    }

    #[inline(always)]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[inline(always)]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Counts a hit for `phrase` unless that solo is already finalized.
    pub fn record_hit(&mut self, phrase: usize) {
        if phrase >= self.index
            && let Some(hits) = self.hits.get_mut(phrase)
        {
            *hits += 1;
        }
    }

    pub fn update(&mut self, tick: u64, phrases: &PhraseList, changes: &mut Vec<SoloChange>) {
        while let Some(phrase) = phrases.get(self.index) {
            if !self.active {
                if tick < phrase.start {
                    break;
                }
                self.active = true;
                info!("Solo {} started at tick {tick}.", self.index);
                changes.push(SoloChange::Started { phrase: self.index });
            }
            if tick < phrase.end {
                break;
            }
            self.active = false;
            let notes_total = phrases.note_count(self.index);
            let notes_hit = self.hits[self.index];
            let percentage = if notes_total == 0 { 0.0 } else { f64::from(notes_hit) / f64::from(notes_total) };
            info!("Solo {} ended: {notes_hit}/{notes_total} ({:.1}%).", self.index, percentage * 100.0);
            changes.push(SoloChange::Ended(SoloResult {
                phrase: self.index,
                notes_hit,
                notes_total,
                percentage,
            }));
            self.index += 1;
        }
    }
}
