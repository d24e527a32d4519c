use std::collections::HashSet;
use std::sync::Arc;

/// Bounded pool of short, frequently repeated strings.
///
/// Author and committer identities and encoding labels repeat across most
/// commits of a large history; handing out shared `Arc<str>`s keeps one
/// allocation per distinct value. Once `capacity` entries are pooled, hits
/// are still shared but misses are allocated without being remembered.
#[derive(Debug)]
pub struct StringPool {
    entries: HashSet<Arc<str>>,
    capacity: usize,
    max_len: usize,
    hits: usize,
}

impl StringPool {
    pub fn new(capacity: usize, max_len: usize) -> Self {
        Self {
            entries: HashSet::new(),
            capacity,
            max_len,
            hits: 0,
        }
    }

    /// Return the pooled handle for `value`, pooling it if there is room
    pub fn intern(&mut self, value: &str) -> Arc<str> {
        if let Some(existing) = self.entries.get(value) {
            self.hits += 1;
            return existing.clone();
        }

        let fresh: Arc<str> = Arc::from(value);
        if value.len() <= self.max_len && self.entries.len() < self.capacity {
            self.entries.insert(fresh.clone());
        }
        fresh
    }

    /// Number of pooled strings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups answered from the pool
    pub fn hits(&self) -> usize {
        self.hits
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new(4096, 256)
    }
}
