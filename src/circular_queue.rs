use std::collections::VecDeque;

/// Fixed-capacity sliding window. Items iterate oldest first, pushing into a
/// full queue evicts the oldest item.
#[derive(Debug, Clone, PartialEq)]
pub struct CircularQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> CircularQueue<T> {
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }

        let evicted = if self.is_full() {
            self.items.pop_front()
        } else {
            None
        };

        self.items.push_back(item);

        evicted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    #[inline]
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    #[inline]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'_ T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Contiguous copy of the window, oldest first.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut q = CircularQueue::with_capacity(3);
        assert_eq!(q.push(1), None);
        assert_eq!(q.push(2), None);
        assert_eq!(q.push(3), None);
        assert!(q.is_full());

        assert_eq!(q.push(4), Some(1));
        assert_eq!(q.to_vec(), vec![2, 3, 4]);
        assert_eq!(q.latest(), Some(&4));
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut q = CircularQueue::with_capacity(0);
        assert_eq!(q.push(7), Some(7));
        assert_eq!(q.len(), 0);
    }
}
