use crate::models::{Granularity, HistoryKey, HistoryPoint};

/// Bounded history buffer, unique by key and sorted ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStore {
    capacity: usize,
    points: Vec<HistoryPoint>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            points: Vec::new(),
        }
    }

    /// Rebuilds a store from persisted points, restoring order and uniqueness.
    /// Later duplicates win.
    pub fn from_points(capacity: usize, points: Vec<HistoryPoint>) -> Self {
        let mut store = Self::new(capacity);
        for point in points {
            store.upsert(point.key, point.usd_per_gram);
        }
        store
    }

    /// Replace the sample at `key` or insert it in order, then trim the head.
    pub fn upsert(&mut self, key: HistoryKey, usd_per_gram: f64) {
        let point = HistoryPoint { key, usd_per_gram };
        match self.points.binary_search_by(|p| p.key.cmp(&key)) {
            Ok(idx) => self.points[idx] = point,
            Err(idx) => self.points.insert(idx, point),
        }
        self.trim_to_capacity(self.capacity);
    }

    /// Last `n` samples, oldest first.
    pub fn window(&self, n: usize) -> impl DoubleEndedIterator<Item = &HistoryPoint> + ExactSizeIterator + Clone {
        let start = self.points.len().saturating_sub(n);
        self.points[start..].iter()
    }

    pub fn trim_to_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        if self.points.len() > self.capacity {
            let excess = self.points.len() - self.capacity;
            self.points.drain(..excess);
        }
    }

    /// Drops samples keyed with a different granularity than `granularity`.
    pub fn retain_granularity(&mut self, granularity: &Granularity) -> usize {
        let before = self.points.len();
        self.points.retain(|p| granularity.matches(&p.key));
        before - self.points.len()
    }

    pub fn get(&self, key: &HistoryKey) -> Option<&HistoryPoint> {
        self.points
            .binary_search_by(|p| p.key.cmp(key))
            .ok()
            .map(|idx| &self.points[idx])
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.last()
    }

    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
