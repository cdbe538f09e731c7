//! FIFO free queue threaded through the slot array by index.
//!
//! Each slot owns a `next` link that is only meaningful while the slot is
//! queued. Popping a slot clears its link; pushing a slot that is already
//! queued is refused, which is how a duplicate release is caught before it
//! can corrupt the list.

use crate::id::SlotId;

/// Singly linked FIFO over slot indices `0..capacity`
#[derive(Debug, Clone)]
pub struct FreeList {
    /// Forward link for each slot, `None` for the tail and for checked-out slots
    next: Vec<Option<usize>>,

    /// Whether each slot is currently queued
    queued: Vec<bool>,

    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl FreeList {
    /// Create a list holding every slot in `0..capacity`, in slot order.
    pub fn filled(capacity: usize) -> Self {
        let next = (0..capacity)
            .map(|i| if i + 1 < capacity { Some(i + 1) } else { None })
            .collect();

        Self {
            next,
            queued: vec![true; capacity],
            head: if capacity > 0 { Some(0) } else { None },
            tail: capacity.checked_sub(1),
            len: capacity,
        }
    }

    /// Number of slots the list was built over.
    pub fn capacity(&self) -> usize {
        self.next.len()
    }

    /// Number of queued slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no slot is queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `slot` is currently queued.
    pub fn contains(&self, slot: SlotId) -> bool {
        self.queued.get(slot.index()).copied().unwrap_or(false)
    }

    /// Unlink and return the head of the queue.
    pub fn pop_front(&mut self) -> Option<SlotId> {
        let index = self.head?;

        self.head = self.next[index].take();
        self.queued[index] = false;
        self.len -= 1;
        if self.head.is_none() {
            self.tail = None;
        }

        Some(SlotId::new(index))
    }

    /// Append `slot` to the tail of the queue.
    ///
    /// Returns the slot back if it is out of range or already queued; the
    /// list is left untouched in that case.
    pub fn push_back(&mut self, slot: SlotId) -> Result<(), SlotId> {
        let index = slot.index();
        if index >= self.capacity() || self.queued[index] {
            return Err(slot);
        }

        self.queued[index] = true;
        self.next[index] = None;
        match self.tail {
            Some(tail) => self.next[tail] = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        Ok(())
    }

    /// Walk the queue from head to tail.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }
}

/// Iterator over queued slots, head first
pub struct Iter<'a> {
    list: &'a FreeList,
    cursor: Option<usize>,
}

impl Iterator for Iter<'_> {
    type Item = SlotId;

    fn next(&mut self) -> Option<SlotId> {
        let index = self.cursor?;
        self.cursor = self.list.next[index];
        Some(SlotId::new(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    fn ids(list: &FreeList) -> Vec<usize> {
        list.iter().map(SlotId::index).collect()
    }

    #[test]
    fn test_filled_is_in_slot_order() {
        let list = FreeList::filled(4);
        assert_eq!(list.len(), 4);
        assert_eq!(ids(&list), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_pop_then_push_is_fifo() {
        let mut list = FreeList::filled(3);

        let first = list.pop_front().unwrap();
        let second = list.pop_front().unwrap();
        assert_eq!((first.index(), second.index()), (0, 1));
        assert!(!list.contains(first));

        list.push_back(first).unwrap();
        list.push_back(second).unwrap();
        assert_eq!(ids(&list), vec![2, 0, 1]);
    }

    #[test]
    fn test_drained_list_resets_head_and_tail() {
        let mut list = FreeList::filled(2);
        list.pop_front();
        list.pop_front();

        assert!(list.is_empty());
        assert_eq!(list.pop_front(), None);

        // The first push onto an empty list becomes both head and tail
        list.push_back(SlotId::new(1)).unwrap();
        assert_eq!(ids(&list), vec![1]);
        assert_eq!(list.pop_front(), Some(SlotId::new(1)));
    }

    #[test]
    fn test_duplicate_push_is_refused() {
        let mut list = FreeList::filled(2);
        assert_eq!(list.push_back(SlotId::new(0)), Err(SlotId::new(0)));

        let slot = list.pop_front().unwrap();
        list.push_back(slot).unwrap();
        assert_eq!(list.push_back(slot), Err(slot));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_out_of_range_push_is_refused() {
        let mut list = FreeList::filled(1);
        list.pop_front();
        assert_eq!(list.push_back(SlotId::new(1)), Err(SlotId::new(1)));
        assert!(list.is_empty());
    }

    proptest! {
        #[test]
        fn prop_matches_a_model_queue(
            capacity in 1usize..16,
            ops in proptest::collection::vec(any::<(bool, usize)>(), 0..200),
        ) {
            let mut list = FreeList::filled(capacity);
            let mut model: VecDeque<usize> = (0..capacity).collect();
            let mut out: Vec<usize> = Vec::new();

            for (pop, pick) in ops {
                if pop {
                    let popped = list.pop_front().map(SlotId::index);
                    prop_assert_eq!(popped, model.pop_front());
                    out.extend(popped);
                } else if !out.is_empty() {
                    let slot = out.swap_remove(pick % out.len());
                    prop_assert!(list.push_back(SlotId::new(slot)).is_ok());
                    model.push_back(slot);
                }

                prop_assert!(list.len() <= capacity);
                prop_assert_eq!(list.len(), list.iter().count());
                prop_assert_eq!(ids(&list), model.iter().copied().collect::<Vec<_>>());
            }
        }
    }
}
