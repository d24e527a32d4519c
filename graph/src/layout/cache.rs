use std::collections::HashMap;

use revgraph_core::CommitId;

use crate::layout::LayoutRow;

/// Emitted rows, in the order they were laid out.
///
/// Owns the row sequence once the engine hands rows over; look-ups go by
/// insertion index or by commit id.
#[derive(Debug, Default)]
pub struct RowCache {
    rows: Vec<LayoutRow>,
    by_id: HashMap<CommitId, usize>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row; returns its insertion index
    pub fn insert(&mut self, row: LayoutRow) -> usize {
        let index = self.rows.len();
        // first occurrence wins for a duplicated id
        self.by_id.entry(row.node.id).or_insert(index);
        self.rows.push(row);
        index
    }

    pub fn get(&self, index: usize) -> Option<&LayoutRow> {
        self.rows.get(index)
    }

    pub fn find(&self, id: &CommitId) -> Option<&LayoutRow> {
        self.index_of(id).and_then(|index| self.rows.get(index))
    }

    pub fn index_of(&self, id: &CommitId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Rows in `start..end`, clamped to what is stored
    pub fn range(&self, start: usize, end: usize) -> &[LayoutRow] {
        let end = end.min(self.rows.len());
        let start = start.min(end);
        &self.rows[start..end]
    }

    /// Widest row stored
    pub fn max_width(&self) -> usize {
        self.rows.iter().map(LayoutRow::width).max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayoutRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.by_id.clear();
    }
}

impl Extend<LayoutRow> for RowCache {
    fn extend<T: IntoIterator<Item = LayoutRow>>(&mut self, iter: T) {
        for row in iter {
            self.insert(row);
        }
    }
}
