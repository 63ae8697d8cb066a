use crate::game::chart::TrackContext;
use crate::game::phrase::{PhraseCursor, PhraseKind};
use crate::game::playable::PlayableNote;
use crate::game::queue::{NoteArena, NoteId, QueueKind, SemiQueue};
use crate::game::timing_windows::TimingProfile;
use log::trace;

/// Hittable, viewable and sustaining queues over one player's note arena.
/// Both window cursors walk the track once and never revisit a note.
#[derive(Debug)]
pub struct NoteWindows {
    arena: NoteArena,
    hittable: SemiQueue<NoteId>,
    viewable: SemiQueue<NoteId>,
    sustaining: SemiQueue<NoteId>,
    next_hittable: usize,
    next_viewable: usize,
    overdrive_cursor: PhraseCursor,
    solo_cursor: PhraseCursor,
    hopo_frequency: u64,
}

impl NoteWindows {
    pub fn new(hopo_frequency: u64) -> Self {
        Self {
            arena: NoteArena::with_capacity(64),
            hittable: SemiQueue::with_capacity(16),
            viewable: SemiQueue::with_capacity(64),
            sustaining: SemiQueue::with_capacity(8),
            next_hittable: 0,
            next_viewable: 0,
            overdrive_cursor: PhraseCursor::default(),
            solo_cursor: PhraseCursor::default(),
            hopo_frequency,
        }
    }

    #[inline(always)]
    pub fn arena(&self) -> &NoteArena {
        &self.arena
    }

    #[inline(always)]
    pub fn note(&self, id: NoteId) -> &PlayableNote {
        self.arena.get(id)
    }

    #[inline(always)]
    pub fn note_mut(&mut self, id: NoteId) -> &mut PlayableNote {
        self.arena.get_mut(id)
    }

    pub fn hittable(&self) -> &SemiQueue<NoteId> {
        &self.hittable
    }

    pub fn viewable(&self) -> &SemiQueue<NoteId> {
        &self.viewable
    }

    pub fn sustaining(&self) -> &SemiQueue<NoteId> {
        &self.sustaining
    }

    pub fn next_hittable(&self) -> usize {
        self.next_hittable
    }

    pub fn next_viewable(&self) -> usize {
        self.next_viewable
    }

    pub fn phrase_cursor(&self, kind: PhraseKind) -> Option<usize> {
        match kind {
            PhraseKind::Overdrive => Some(self.overdrive_cursor.index()),
            PhraseKind::Solo => Some(self.solo_cursor.index()),
            _ => None,
        }
    }

    fn queue(&self, kind: QueueKind) -> &SemiQueue<NoteId> {
        match kind {
            QueueKind::Hittable => &self.hittable,
            QueueKind::Viewable => &self.viewable,
            QueueKind::Sustaining => &self.sustaining,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut SemiQueue<NoteId> {
        match kind {
            QueueKind::Hittable => &mut self.hittable,
            QueueKind::Viewable => &mut self.viewable,
            QueueKind::Sustaining => &mut self.sustaining,
        }
    }

    /// Reuses the instance already queued in `other`, or constructs the
    /// playable note and attaches its phrases.
    fn obtain(&mut self, track: &TrackContext, index: usize, other: QueueKind) -> NoteId {
        let tick = track.notes[index].tick;
        let queue = self.queue(other);
        if let Some(pos) = queue.position(|&id| self.arena.get(id).tick() == tick)
            && let Some(&id) = queue.get(pos)
        {
            return id;
        }
        if let Some(id) = self.arena.find_by_tick(tick) {
            return id;
        }

        let mut note = PlayableNote::new(track, index, self.hopo_frequency);
        note.overdrive = self.overdrive_cursor.attach(track.phrases(PhraseKind::Overdrive), tick);
        note.solo = self.solo_cursor.attach(track.phrases(PhraseKind::Solo), tick);
        trace!(
            "Constructed note index={index} tick={tick} type={:?} overdrive={:?} solo={:?}",
            note.hit_type, note.overdrive, note.solo
        );
        self.arena.insert(note)
    }

    /// Pulls every note that is now inside either window.
    pub fn fill(&mut self, track: &TrackContext, time: f64, windows: &TimingProfile) {
        while self.next_viewable < track.len()
            && time + windows.view.ahead_s >= track.positions[self.next_viewable].seconds
        {
            let id = self.obtain(track, self.next_viewable, QueueKind::Hittable);
            self.viewable.enqueue(id);
            self.arena.mark_in(id, QueueKind::Viewable);
            self.next_viewable += 1;
        }
        while self.next_hittable < track.len()
            && time + windows.hit.front_s >= track.positions[self.next_hittable].seconds
        {
            let id = self.obtain(track, self.next_hittable, QueueKind::Viewable);
            self.hittable.enqueue(id);
            self.arena.mark_in(id, QueueKind::Hittable);
            self.next_hittable += 1;
        }
    }

    /// Late boundary of the front hittable note. In combo it shrinks to the
    /// next note's position.
    pub fn front_boundary(&self, track: &TrackContext, back_s: f64, in_combo: bool) -> Option<(NoteId, f64)> {
        let &id = self.hittable.peek()?;
        let note = self.arena.get(id);
        let mut boundary = note.position.seconds + back_s;
        if in_combo && let Some(next) = track.positions.get(note.index + 1) {
            boundary = boundary.min(next.seconds);
        }
        Some((id, boundary))
    }

    /// Drops viewable notes whose longest sustain ended more than
    /// `behind_s` ago. Ends are not ordered like starts, so a long missed
    /// sustain does not hold back the short notes queued after it.
    pub fn expire_viewable(&mut self, time: f64, behind_s: f64) {
        let mut i = 0;
        while let Some(&id) = self.viewable.get(i) {
            if self.arena.is_in(id, QueueKind::Hittable) || time - behind_s <= self.arena.get(id).longest_end().seconds {
                i += 1;
                continue;
            }
            self.viewable.remove_at(i);
            self.arena.mark_out(id, QueueKind::Viewable);
        }
    }

    pub fn enqueue_sustaining(&mut self, id: NoteId) {
        self.sustaining.enqueue(id);
        self.arena.mark_in(id, QueueKind::Sustaining);
    }

    /// Removes `id` from `kind`, front dequeue or indexed removal. Set the
    /// note's final status first: the slot is freed here once it is
    /// terminal and queued nowhere.
    pub fn detach(&mut self, id: NoteId, kind: QueueKind) {
        let queue = self.queue_mut(kind);
        if let Some(pos) = queue.position(|&q| q == id) {
            queue.remove_at(pos);
            self.arena.mark_out(id, kind);
        }
    }

    pub fn is_note_on_screen(&self, tick: u64) -> bool {
        self.arena.find_by_tick(tick).is_some_and(|id| {
            self.arena.is_in(id, QueueKind::Viewable) || self.arena.is_in(id, QueueKind::Sustaining)
        })
    }

    /// Viewable notes followed by held sustains, for renderers.
    pub fn on_screen(&self) -> impl Iterator<Item = &PlayableNote> {
        self.viewable.iter().chain(self.sustaining.iter()).map(|&id| self.arena.get(id))
    }
}
