use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::id::CommitId;

/// Kind of symbolic reference; the declaration order is the display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Head,
    Branch,
    Remote,
    Tag,
}

/// A symbolic name resolved to a commit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitRef {
    pub name: String,
    pub target: CommitId,
    pub kind: RefKind,
}

impl GitRef {
    pub fn new(name: impl Into<String>, target: CommitId, kind: RefKind) -> Self {
        Self {
            name: name.into(),
            target,
            kind,
        }
    }

    pub fn is_head(&self) -> bool {
        self.kind == RefKind::Head
    }

    pub fn is_tag(&self) -> bool {
        self.kind == RefKind::Tag
    }

    pub fn is_remote(&self) -> bool {
        self.kind == RefKind::Remote
    }
}

/// Commit id -> refs pointing at it.
///
/// Built once when a stream starts and read-only afterwards; a changed ref
/// set needs a new index and a new stream.
#[derive(Debug, Clone)]
pub struct RefIndex {
    by_target: HashMap<CommitId, Arc<[GitRef]>>,
    head: Option<CommitId>,
    empty: Arc<[GitRef]>,
}

impl RefIndex {
    pub fn new<I>(refs: I) -> Self
    where
        I: IntoIterator<Item = GitRef>,
    {
        let mut grouped: HashMap<CommitId, Vec<GitRef>> = HashMap::new();
        let mut head = None;

        for r in refs {
            if r.is_head() {
                head = Some(r.target);
            }
            grouped.entry(r.target).or_default().push(r);
        }

        let by_target: HashMap<CommitId, Arc<[GitRef]>> = grouped
            .into_iter()
            .map(|(target, mut refs)| {
                refs.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
                refs.dedup();
                (target, Arc::from(refs))
            })
            .collect();

        Self {
            by_target,
            head,
            empty: Arc::from(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Refs pointing at `id`, possibly none
    pub fn refs_for(&self, id: &CommitId) -> Arc<[GitRef]> {
        self.by_target
            .get(id)
            .cloned()
            .unwrap_or_else(|| self.empty.clone())
    }

    /// Target of HEAD, if it was part of the ref set
    pub fn head(&self) -> Option<CommitId> {
        self.head
    }

    /// Number of distinct targets
    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    /// All refs, grouped by target
    pub fn iter(&self) -> impl Iterator<Item = (&CommitId, &[GitRef])> {
        self.by_target.iter().map(|(id, refs)| (id, &refs[..]))
    }
}

impl Default for RefIndex {
    fn default() -> Self {
        Self::empty()
    }
}
