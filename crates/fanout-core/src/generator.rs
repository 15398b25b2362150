//! Synthetic item source and batch partitioning.

/// One synthetic item. The value is a pure function of the ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId {
    /// 1-based position in the generated sequence.
    pub ordinal: u64,
    pub value: u64,
}

impl EventId {
    pub fn at(ordinal: u64) -> Self {
        Self {
            ordinal,
            value: ordinal.saturating_mul(2),
        }
    }
}

/// Lazy sequence of `count` items. Clone an unstarted generator to replay it.
#[derive(Debug, Clone)]
pub struct EventGenerator {
    next: u64,
    count: u64,
}

impl EventGenerator {
    pub fn new(count: u64) -> Self {
        Self { next: 1, count }
    }

    pub fn total(&self) -> u64 {
        self.count
    }
}

impl Iterator for EventGenerator {
    type Item = EventId;

    fn next(&mut self) -> Option<EventId> {
        if self.next > self.count {
            return None;
        }
        let id = EventId::at(self.next);
        self.next += 1;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.count.saturating_add(1).saturating_sub(self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for EventGenerator {}

/// Splits a sequence into ordered chunks of at most `size` items.
#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    size: usize,
}

impl Batcher {
    /// `size` of 0 is treated as 1.
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// `ceil(count / size)`.
    pub fn batch_count(&self, count: u64) -> u64 {
        count.div_ceil(self.size as u64)
    }

    pub fn chunks<I: Iterator>(&self, items: I) -> Chunks<I> {
        Chunks {
            inner: items,
            size: self.size,
        }
    }
}

/// Iterator returned by [`Batcher::chunks`].
pub struct Chunks<I> {
    inner: I,
    size: usize,
}

impl<I: Iterator> Iterator for Chunks<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk: Vec<I::Item> = self.inner.by_ref().take(self.size).collect();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}
