use indexmap::IndexMap;

use crate::retriever::ScoredCandidate;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub query: String,
    pub k: usize,
    pub filter: Option<String>,
}

/// Most-recently-used query results. The newest entry sits at the back.
#[derive(Debug)]
pub(crate) struct QueryCache {
    capacity: usize,
    entries: IndexMap<CacheKey, Vec<ScoredCandidate>>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: IndexMap::with_capacity(capacity.min(1024)),
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Vec<ScoredCandidate>> {
        let idx = self.entries.get_index_of(key)?;
        let last = self.entries.len() - 1;
        self.entries.move_index(idx, last);
        self.entries.get_index(last).map(|(_, hits)| hits.clone())
    }

    pub fn insert(&mut self, key: CacheKey, hits: Vec<ScoredCandidate>) {
        if self.capacity == 0 {
            return;
        }
        self.entries.shift_remove(&key);
        self.entries.insert(key, hits);
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
