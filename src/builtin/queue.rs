use std::collections::VecDeque;

/// Bounded FIFO with reject-on-full enqueue, used for per-bank request queues.
#[derive(Debug, Default)]
pub struct Queue<T> {
    storage: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn try_enq(&mut self, data: &T) -> bool {
        if self.storage.len() >= self.capacity {
            return false;
        }
        self.storage.push_back(data.clone());
        true
    }

    pub fn try_deq(&mut self) -> Option<T> {
        self.storage.pop_front()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.storage.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.storage.clear();
    }
}
