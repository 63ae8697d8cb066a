use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhraseKind {
    Overdrive,
    Solo,
    BigRockEnding,
    Tremolo,
    Trill,
}

impl PhraseKind {
    pub const ALL: [PhraseKind; 5] =
        [Self::Overdrive, Self::Solo, Self::BigRockEnding, Self::Tremolo, Self::Trill];

    pub const fn index(self) -> usize {
        match self {
            Self::Overdrive => 0,
            Self::Solo => 1,
            Self::BigRockEnding => 2,
            Self::Tremolo => 3,
            Self::Trill => 4,
        }
    }
}

/// A `[start, end)` tick range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    pub kind: PhraseKind,
    pub start: u64,
    pub end: u64,
}

impl Phrase {
    #[inline(always)]
    pub const fn contains(&self, tick: u64) -> bool {
        self.start <= tick && tick < self.end
    }
}

/// Phrases of one kind, in tick order, never overlapping, plus the number
/// of notes each one covers.
#[derive(Clone, Debug, Default)]
pub struct PhraseList {
    pub phrases: Vec<Phrase>,
    pub note_counts: Vec<u32>,
}

impl PhraseList {
    /// `phrases` must already be sorted and non-overlapping; `note_ticks`
    /// must be sorted.
    pub fn new(phrases: Vec<Phrase>, note_ticks: &[u64]) -> Self {
        let mut note_counts = Vec::with_capacity(phrases.len());
        let mut first = 0usize;
        for phrase in &phrases {
            first += note_ticks[first..].partition_point(|&t| t < phrase.start);
            let inside = note_ticks[first..].partition_point(|&t| t < phrase.end);
            note_counts.push(inside as u32);
        }
        Self { phrases, note_counts }
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Phrase> {
        self.phrases.get(index)
    }

    pub fn note_count(&self, index: usize) -> u32 {
        self.note_counts.get(index).copied().unwrap_or(0)
    }
}

/// Forward-only attachment walk. Phrases that end at or before `tick` are
/// consumed; the current phrase is returned when it covers `tick`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PhraseCursor {
    index: usize,
}

impl PhraseCursor {
    pub const fn index(&self) -> usize {
        self.index
    }

    pub fn attach(&mut self, list: &PhraseList, tick: u64) -> Option<usize> {
        while let Some(phrase) = list.get(self.index) {
            if phrase.end <= tick {
                self.index += 1;
                continue;
            }
            return phrase.contains(tick).then_some(self.index);
        }
        None
    }
}
