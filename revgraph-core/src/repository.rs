use anyhow::{Context, Result};
use git2::{BranchType, Repository as Git2Repository, Sort};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver};
use std::thread;
use tracing::debug;

use crate::id::CommitId;
use crate::refs::{GitRef, RefKind};
use crate::wire::WireRecord;

/// On-disk repository feeding a layout stream: its refs and its history in
/// wire format
pub struct RepositorySource {
    path: PathBuf,
    git_repo: Git2Repository,
}

impl RepositorySource {
    /// Open an existing repository
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let git_repo = Git2Repository::open(&path)
            .with_context(|| format!("Failed to open repository at {}", path.display()))?;

        Ok(Self { path, git_repo })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// HEAD, local and remote branches, and tags
    pub fn refs(&self) -> Result<Vec<GitRef>> {
        let mut refs = Vec::new();

        // HEAD
        if let Ok(head) = self.git_repo.head() {
            if let Some(target) = head.target() {
                refs.push(GitRef::new("HEAD", target.into(), RefKind::Head));
            }
        }

        for (branch_type, kind) in [
            (BranchType::Local, RefKind::Branch),
            (BranchType::Remote, RefKind::Remote),
        ] {
            for br in self.git_repo.branches(Some(branch_type))? {
                let (branch, _) = br?;
                if let (Some(name), Some(target)) = (branch.name()?, branch.get().target()) {
                    refs.push(GitRef::new(name, target.into(), kind));
                }
            }
        }

        // Tags, peeled to the commit they name
        let mut tags = Vec::new();
        self.git_repo.tag_foreach(|oid, name| {
            if let Ok(name_str) = std::str::from_utf8(name) {
                if let Some(tag_name) = name_str.strip_prefix("refs/tags/") {
                    tags.push((oid, tag_name.to_string()));
                }
            }
            true
        })?;
        for (oid, name) in tags {
            let target = self
                .git_repo
                .find_object(oid, None)
                .and_then(|obj| obj.peel_to_commit())
                .map(|commit| commit.id())
                .unwrap_or(oid);
            refs.push(GitRef::new(name, target.into(), RefKind::Tag));
        }

        Ok(refs)
    }

    /// Walk HEAD and every branch, children before parents, and write each
    /// commit as a NUL-separated record
    pub fn export_log(&self, limit: Option<usize>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.walk_records(limit, |record| {
            out.extend_from_slice(record);
            true
        })?;
        Ok(out)
    }

    /// Stream the same records as [`export_log`](Self::export_log) from a
    /// background thread.
    ///
    /// At most a handful of encoded records are buffered ahead of the reader.
    /// Dropping the reader stops the walk at its next record.
    pub fn log_reader(&self, limit: Option<usize>) -> Result<LogReader> {
        let (tx, rx) = sync_channel(RECORDS_IN_FLIGHT);
        let path = self.path.clone();

        thread::Builder::new()
            .name("revgraph-export".to_string())
            .spawn(move || {
                let walked = RepositorySource::open(&path).and_then(|source| {
                    source.walk_records(limit, |record| {
                        tx.send(ExportChunk::Record(record.to_vec())).is_ok()
                    })
                });
                let last = match walked {
                    Ok(()) => ExportChunk::Done,
                    Err(e) => {
                        debug!(error = %e, "history export failed");
                        ExportChunk::Failed(io::Error::other(format!("{:#}", e)))
                    }
                };
                // the reader may already be gone
                let _ = tx.send(last);
            })
            .context("Failed to start history export")?;

        Ok(LogReader {
            chunks: rx,
            current: Vec::new(),
            pos: 0,
            done: false,
        })
    }

    /// Encode each walked commit and hand it to `sink`; stops early when
    /// `sink` returns false
    fn walk_records<F>(&self, limit: Option<usize>, mut sink: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let mut revwalk = self.git_repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        if self.git_repo.head().is_ok() {
            revwalk.push_head()?;
        }
        for branch in self.git_repo.branches(None)? {
            let (branch, _) = branch?;
            if let Some(target) = branch.get().target() {
                revwalk.push(target)?;
            }
        }

        let mut record = Vec::new();
        for (count, oid) in revwalk.enumerate() {
            if limit.is_some_and(|limit| count >= limit) {
                break;
            }
            let oid = oid?;
            let commit = self
                .git_repo
                .find_commit(oid)
                .with_context(|| format!("Failed to load commit {}", oid))?;

            let parents: Vec<CommitId> = commit.parent_ids().map(CommitId::from).collect();
            let author = commit.author();
            let committer = commit.committer();

            record.clear();
            WireRecord {
                id: oid.into(),
                tree_id: commit.tree_id().into(),
                parent_ids: &parents,
                author: author.name_bytes(),
                author_email: author.email_bytes(),
                author_date: author.when().seconds(),
                committer: committer.name_bytes(),
                committer_email: committer.email_bytes(),
                commit_date: committer.when().seconds(),
                encoding: commit.message_encoding(),
                message: commit.message_raw_bytes(),
            }
            .write_to(&mut record)?;

            if !sink(&record) {
                debug!(records = count, "history export abandoned by reader");
                break;
            }
        }

        Ok(())
    }
}

/// Encoded records buffered between the export thread and its reader
const RECORDS_IN_FLIGHT: usize = 64;

enum ExportChunk {
    Record(Vec<u8>),
    Done,
    Failed(io::Error),
}

/// Wire-format history produced on a background thread, see
/// [`RepositorySource::log_reader`]
pub struct LogReader {
    chunks: Receiver<ExportChunk>,
    current: Vec<u8>,
    pos: usize,
    done: bool,
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.current.len() {
            if self.done {
                return Ok(0);
            }
            match self.chunks.recv() {
                Ok(ExportChunk::Record(record)) => {
                    self.current = record;
                    self.pos = 0;
                }
                Ok(ExportChunk::Done) => self.done = true,
                Ok(ExportChunk::Failed(e)) => {
                    self.done = true;
                    return Err(e);
                }
                Err(_) => {
                    self.done = true;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "history export stopped without finishing",
                    ));
                }
            }
        }

        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::parser::ChunkParser;
    use git2::{Commit, Oid, Signature};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn create_test_repo() -> Result<(TempDir, Git2Repository)> {
        let dir = TempDir::new()?;
        let repo = Git2Repository::init(dir.path())?;

        let mut config = repo.config()?;
        config.set_str("user.name", "Test User")?;
        config.set_str("user.email", "test@example.com")?;

        Ok((dir, repo))
    }

    fn commit_to_repo(
        repo: &Git2Repository,
        message: &str,
        parents: &[&Commit],
        update_ref: Option<&str>,
    ) -> Result<Oid> {
        let sig = Signature::now("Test User", "test@example.com")?;
        let tree_id = {
            let mut index = repo.index()?;
            index.write_tree()?
        };
        let tree = repo.find_tree(tree_id)?;

        Ok(repo.commit(update_ref, &sig, &sig, message, &tree, parents)?)
    }

    #[test]
    fn exported_log_parses_back() -> Result<()> {
        let (dir, repo) = create_test_repo()?;

        let base_oid = commit_to_repo(&repo, "Base commit", &[], Some("HEAD"))?;
        let base = repo.find_commit(base_oid)?;
        let main_oid = commit_to_repo(&repo, "Main work\n\nWith a body", &[&base], Some("HEAD"))?;
        let main = repo.find_commit(main_oid)?;
        let side_oid = commit_to_repo(&repo, "Side work", &[&base], None)?;
        let side = repo.find_commit(side_oid)?;
        let merge_oid = commit_to_repo(&repo, "Merge", &[&main, &side], Some("HEAD"))?;

        let source = RepositorySource::open(dir.path())?;
        let bytes = source.export_log(None)?;
        let records: Vec<_> = ChunkParser::from_config(Cursor::new(bytes), &GraphConfig::default())?
            .collect::<Result<_, _>>()?;

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].id, CommitId::from(merge_oid));
        assert_eq!(records[0].parent_ids.len(), 2);
        assert_eq!(records[3].id, CommitId::from(base_oid));
        assert!(records[3].is_root());
        assert_eq!(&*records[0].author, "Test User");

        let main_record = records.iter().find(|r| r.id == CommitId::from(main_oid)).unwrap();
        assert_eq!(main_record.subject, "Main work");
        assert_eq!(main_record.body.as_deref(), Some("With a body"));

        Ok(())
    }

    #[test]
    fn limit_truncates_walk() -> Result<()> {
        let (dir, repo) = create_test_repo()?;
        let first = commit_to_repo(&repo, "First", &[], Some("HEAD"))?;
        let first = repo.find_commit(first)?;
        commit_to_repo(&repo, "Second", &[&first], Some("HEAD"))?;

        let source = RepositorySource::open(dir.path())?;
        let bytes = source.export_log(Some(1))?;
        assert_eq!(bytes.iter().filter(|&&b| b == 0).count(), 1);
        Ok(())
    }

    #[test]
    fn log_reader_streams_the_exported_records() -> Result<()> {
        let (dir, repo) = create_test_repo()?;
        let mut parent = repo.find_commit(commit_to_repo(&repo, "Commit 0", &[], Some("HEAD"))?)?;
        // more records than the export buffers ahead of the reader
        for i in 1..100 {
            let message = format!("Commit {}", i);
            let oid = commit_to_repo(&repo, &message, &[&parent], Some("HEAD"))?;
            parent = repo.find_commit(oid)?;
        }

        let source = RepositorySource::open(dir.path())?;
        let exported = source.export_log(None)?;

        let mut streamed = Vec::new();
        let mut chunk = [0u8; 7];
        let mut reader = source.log_reader(None)?;
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            streamed.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(streamed, exported);
        assert_eq!(reader.read(&mut chunk)?, 0);

        let mut limited = Vec::new();
        source.log_reader(Some(3))?.read_to_end(&mut limited)?;
        assert_eq!(limited.iter().filter(|&&b| b == 0).count(), 3);
        Ok(())
    }

    #[test]
    fn dropping_log_reader_early_is_harmless() -> Result<()> {
        let (dir, repo) = create_test_repo()?;
        let mut parent = repo.find_commit(commit_to_repo(&repo, "Commit 0", &[], Some("HEAD"))?)?;
        for i in 1..100 {
            let oid = commit_to_repo(&repo, &format!("Commit {}", i), &[&parent], Some("HEAD"))?;
            parent = repo.find_commit(oid)?;
        }

        let source = RepositorySource::open(dir.path())?;
        let mut reader = source.log_reader(None)?;
        let mut first = [0u8; 40];
        reader.read_exact(&mut first)?;
        assert_eq!(&first[..], parent.id().to_string().as_bytes());
        drop(reader);

        // the repository is still usable while the export thread winds down
        assert_eq!(source.export_log(Some(1))?.iter().filter(|&&b| b == 0).count(), 1);
        Ok(())
    }

    #[test]
    fn log_reader_on_empty_repository() -> Result<()> {
        let (dir, _repo) = create_test_repo()?;
        let source = RepositorySource::open(dir.path())?;
        let mut bytes = Vec::new();
        source.log_reader(None)?.read_to_end(&mut bytes)?;
        assert!(bytes.is_empty());
        Ok(())
    }

    #[test]
    fn lists_head_branches_and_tags() -> Result<()> {
        let (dir, repo) = create_test_repo()?;
        let oid = commit_to_repo(&repo, "Initial", &[], Some("HEAD"))?;
        let commit = repo.find_commit(oid)?;
        repo.branch("feature", &commit, false)?;
        let sig = Signature::now("Test User", "test@example.com")?;
        repo.tag("v1.0", commit.as_object(), &sig, "release", false)?;

        let source = RepositorySource::open(dir.path())?;
        let refs = source.refs()?;
        let id = CommitId::from(oid);

        assert!(refs.iter().any(|r| r.is_head() && r.target == id));
        assert!(refs.iter().any(|r| r.kind == RefKind::Branch && r.name == "feature"));
        assert!(refs.iter().any(|r| r.is_tag() && r.name == "v1.0" && r.target == id));
        Ok(())
    }

    #[test]
    fn empty_repository_has_no_history() -> Result<()> {
        let (dir, _repo) = create_test_repo()?;
        let source = RepositorySource::open(dir.path())?;
        assert!(source.export_log(None)?.is_empty());
        assert!(source.refs()?.is_empty());
        Ok(())
    }
}
