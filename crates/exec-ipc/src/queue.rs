//! Fixed-capacity outbound queue (spec §4.A).
//!
//! Construction is the only fallible operation — once the backing storage
//! is reserved, `add`/`remove`/`get` never fail. Callers are expected to
//! check `is_full` before `add`; `add` panics in debug builds if that
//! invariant is violated; the reference design has no blocking path.

use std::collections::VecDeque;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("failed to reserve queue storage")]
    Alloc,
}

pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        let mut items = VecDeque::new();
        items.try_reserve_exact(capacity).map_err(|_| QueueError::Alloc)?;
        Ok(Self { items, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Peek the head item without removing it.
    pub fn get(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.items.front_mut()
    }

    /// Pop the head item.
    pub fn remove(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Enqueue at the tail. Callers must check `is_full` first (§4.F: a
    /// full queue is the caller's cue to drop the connection, not to block).
    pub fn add(&mut self, item: T) {
        exec_utils::safe_assert!(!self.is_full(), "add() called on a full BoundedQueue");
        self.items.push_back(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_and_drains_in_order() {
        let mut q: BoundedQueue<u32> = BoundedQueue::new(2).unwrap();
        assert!(q.is_empty());
        q.add(1);
        q.add(2);
        assert!(q.is_full());
        assert_eq!(q.get(), Some(&1));
        assert_eq!(q.remove(), Some(1));
        assert!(!q.is_full());
        assert_eq!(q.remove(), Some(2));
        assert_eq!(q.remove(), None);
    }
}
