use std::sync::Arc;

use smallvec::{smallvec, SmallVec};

use crate::id::CommitId;
use crate::refs::GitRef;

/// Parent list; most commits have one, merges two
pub type ParentIds = SmallVec<[CommitId; 2]>;

/// Parsed commit metadata.
///
/// Built once by the parser, given its refs once by the ref index, and
/// immutable from then on.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionRecord {
    pub id: CommitId,
    pub tree_id: CommitId,
    pub parent_ids: ParentIds,
    pub author: Arc<str>,
    pub author_email: Arc<str>,
    /// Unix seconds
    pub author_date: i64,
    pub committer: Arc<str>,
    pub committer_email: Arc<str>,
    /// Unix seconds
    pub commit_date: i64,
    /// Declared message encoding, if the commit named one
    pub encoding: Option<Arc<str>>,
    pub subject: String,
    pub body: Option<String>,
    pub refs: Arc<[GitRef]>,
}

impl RevisionRecord {
    /// Check if this is a root commit (no parents)
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// Check if this is a merge commit (multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    pub fn is_artificial(&self) -> bool {
        self.id.is_artificial()
    }

    /// Return a copy with `refs` attached.
    ///
    /// Refs are assigned exactly once, so this consumes the record.
    pub fn with_refs(mut self, refs: Arc<[GitRef]>) -> Self {
        self.refs = refs;
        self
    }

    /// Placeholder row for uncommitted working-tree changes, parented on the index
    pub fn working_tree() -> Self {
        Self::artificial(CommitId::WORKING_TREE, CommitId::INDEX, "Working directory changes")
    }

    /// Placeholder row for staged changes, parented on `head`
    pub fn index(head: CommitId) -> Self {
        Self::artificial(CommitId::INDEX, head, "Commit index")
    }

    fn artificial(id: CommitId, parent: CommitId, subject: &str) -> Self {
        let empty: Arc<str> = Arc::from("");
        Self {
            id,
            tree_id: id,
            parent_ids: smallvec![parent],
            author: empty.clone(),
            author_email: empty.clone(),
            author_date: 0,
            committer: empty.clone(),
            committer_email: empty,
            commit_date: 0,
            encoding: None,
            subject: subject.to_string(),
            body: None,
            refs: Arc::from(Vec::new()),
        }
    }
}
