use crate::game::playable::PlayableNote;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// FIFO with indexed access and removal from the middle.
#[derive(Debug, Clone)]
pub struct SemiQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for SemiQueue<T> {
    fn default() -> Self {
        Self { items: VecDeque::new() }
    }
}

impl<T> SemiQueue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { items: VecDeque::with_capacity(capacity) }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline(always)]
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[inline(always)]
    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    #[inline(always)]
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn position(&self, pred: impl FnMut(&T) -> bool) -> Option<usize> {
        self.items.iter().position(pred)
    }

    /// Dequeues when `index` is the front, otherwise removes in place.
    pub fn remove_at(&mut self, index: usize) -> Option<T> {
        if index == 0 { self.items.pop_front() } else { self.items.remove(index) }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NoteId(u32);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum QueueKind {
    #[default]
    Hittable,
    Viewable,
    Sustaining,
}

impl QueueKind {
    const fn bit(self) -> u8 {
        match self {
            Self::Hittable => 1,
            Self::Viewable => 2,
            Self::Sustaining => 4,
        }
    }
}

#[derive(Debug)]
struct Slot {
    note: Option<PlayableNote>,
    membership: u8,
}

/// Per-player storage for playable notes. Queues hold [`NoteId`]s into it;
/// a slot is recycled once its note is in no queue and terminal.
#[derive(Debug, Default)]
pub struct NoteArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_tick: FxHashMap<u64, NoteId>,
}

impl NoteArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            by_tick: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub fn insert(&mut self, note: PlayableNote) -> NoteId {
        let tick = note.tick();
        let id = match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Slot { note: Some(note), membership: 0 };
                NoteId(i)
            }
            None => {
                self.slots.push(Slot { note: Some(note), membership: 0 });
                NoteId((self.slots.len() - 1) as u32)
            }
        };
        let previous = self.by_tick.insert(tick, id);
        assert!(previous.is_none(), "note at tick {tick} was constructed twice");
        id
    }

    fn slot(&self, id: NoteId) -> &Slot {
        let slot = &self.slots[id.0 as usize];
        assert!(slot.note.is_some(), "stale note id {id:?}");
        slot
    }

    #[inline(always)]
    pub fn get(&self, id: NoteId) -> &PlayableNote {
        match &self.slot(id).note {
            Some(note) => note,
            None => unreachable!(),
        }
    }

    #[inline(always)]
    pub fn get_mut(&mut self, id: NoteId) -> &mut PlayableNote {
        match &mut self.slots[id.0 as usize].note {
            Some(note) => note,
            None => panic!("stale note id {id:?}"),
        }
    }

    pub fn find_by_tick(&self, tick: u64) -> Option<NoteId> {
        self.by_tick.get(&tick).copied()
    }

    pub fn is_in(&self, id: NoteId, queue: QueueKind) -> bool {
        self.slot(id).membership & queue.bit() != 0
    }

    pub fn mark_in(&mut self, id: NoteId, queue: QueueKind) {
        self.slots[id.0 as usize].membership |= queue.bit();
    }

    /// Clears membership of `queue` and frees the slot when the note has
    /// left every queue in a terminal status. Returns whether it was freed.
    pub fn mark_out(&mut self, id: NoteId, queue: QueueKind) -> bool {
        let slot = &mut self.slots[id.0 as usize];
        slot.membership &= !queue.bit();
        let done = slot.membership == 0 && slot.note.as_ref().is_some_and(|n| n.status.is_terminal());
        if done {
            if let Some(note) = slot.note.take() {
                self.by_tick.remove(&note.tick());
            }
            self.free.push(id.0);
        }
        done
    }

    pub fn live(&self) -> usize {
        self.by_tick.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::chart::ChartContext;
    use crate::game::note::NoteFlags;
    use crate::game::playable::HitStatus;
    use crate::test_support::fret_chart;

    #[test]
    fn semi_queue_front_and_middle_removal() {
        let mut q = SemiQueue::default();
        for i in 0..5 {
            q.enqueue(i);
        }
        assert_eq!(q.peek(), Some(&0));
        assert_eq!(q.remove_at(2), Some(2));
        assert_eq!(q.remove_at(0), Some(0));
        assert_eq!(q.position(|&v| v == 4), Some(2));
        assert_eq!(q.iter().copied().collect::<Vec<_>>(), vec![1, 3, 4]);
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn arena_recycles_terminal_notes_out_of_every_queue() {
        let chart = fret_chart(
            vec![(0, vec![(1, 1)], NoteFlags::empty()), (480, vec![(2, 1)], NoteFlags::empty())],
            vec![],
        );
        let ctx = ChartContext::build(&chart, 0).unwrap();
        let track = &ctx.tracks[0];
        let mut arena = NoteArena::with_capacity(4);

        let a = arena.insert(PlayableNote::new(track, 0, 0));
        arena.mark_in(a, QueueKind::Hittable);
        arena.mark_in(a, QueueKind::Viewable);
        assert_eq!(arena.find_by_tick(0), Some(a));

        arena.get_mut(a).status = HitStatus::Missed;
        assert!(!arena.mark_out(a, QueueKind::Hittable), "still viewable");
        assert!(arena.mark_out(a, QueueKind::Viewable));
        assert_eq!(arena.find_by_tick(0), None);

        let b = arena.insert(PlayableNote::new(track, 1, 0));
        assert_eq!(b, a, "freed slot is reused");
        assert_eq!(arena.get(b).tick(), 480);
        assert_eq!(arena.live(), 1);
    }

    #[test]
    fn idle_notes_survive_leaving_a_queue() {
        let chart = fret_chart(vec![(0, vec![(1, 1)], NoteFlags::empty())], vec![]);
        let ctx = ChartContext::build(&chart, 0).unwrap();
        let mut arena = NoteArena::default();
        let id = arena.insert(PlayableNote::new(&ctx.tracks[0], 0, 0));
        arena.mark_in(id, QueueKind::Viewable);
        assert!(!arena.mark_out(id, QueueKind::Viewable));
        assert_eq!(arena.get(id).status, HitStatus::Idle);
    }
}
