//! One layout pass over one commit stream, run off the caller's thread.
//!
//! [`GraphStream::start`] spawns a single blocking worker that parses,
//! attaches refs, lays out and hands each finished row across a bounded
//! channel. The worker owns its parser, string pool and lane ledger
//! outright, so concurrent passes share nothing mutable.

mod worker;

use std::any::Any;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use revgraph_core::{ConfigError, GitRef, GraphConfig, ParseError, RecordFilter, RefIndex, RevisionRecord};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::core::Edge;
use crate::layout::LayoutRow;

/// A laid-out commit as handed to the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRow {
    pub record: Arc<RevisionRecord>,
    pub layout: LayoutRow,
}

#[derive(Debug)]
pub enum StreamEvent {
    Row(GraphRow),
    /// Always the last event of a pass
    Finished(StreamOutcome),
}

/// Totals for a pass that ran to the end of its input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    /// Records parsed from the input
    pub records: usize,
    /// Rows delivered, placeholder rows included
    pub rows: usize,
    /// Distinct refs attached to laid-out records, in first-seen order
    pub refs_seen: Vec<GitRef>,
    /// Edges still open at end of input, closed by the final prune
    pub dangling: Vec<Edge>,
    /// Layout inconsistencies recovered from
    pub anomalies: usize,
}

#[derive(Debug)]
pub enum StreamOutcome {
    Completed(StreamSummary),
    /// Stopped between records at the consumer's request
    Cancelled { rows: usize },
    Failed(StreamError),
}

impl StreamOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed(_))
    }

    pub fn into_result(self) -> Result<StreamSummary, StreamError> {
        match self {
            StreamOutcome::Completed(summary) => Ok(summary),
            StreamOutcome::Cancelled { .. } => Err(StreamError::Cancelled),
            StreamOutcome::Failed(e) => Err(e),
        }
    }
}

/// Why a pass ended without completing
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Malformed(ParseError),

    #[error("failed to read commit stream: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("layout cancelled")]
    Cancelled,

    #[error("layout worker stopped without reporting: {0}")]
    WorkerLost(String),
}

impl From<ParseError> for StreamError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io(e) => StreamError::Io(e),
            malformed => StreamError::Malformed(malformed),
        }
    }
}

/// Starts layout passes that share a ref index and configuration
#[derive(Debug, Clone)]
pub struct GraphStream {
    refs: Arc<RefIndex>,
    config: GraphConfig,
}

impl GraphStream {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            refs: Arc::new(RefIndex::empty()),
            config,
        }
    }

    /// Attach refs from this index to every record laid out
    pub fn with_refs(mut self, refs: RefIndex) -> Self {
        self.refs = Arc::new(refs);
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn refs(&self) -> &RefIndex {
        &self.refs
    }

    /// Begin laying out `source`.
    ///
    /// Records rejected by `filter` are still laid out; only their rows are
    /// withheld. Must be called from within a tokio runtime.
    pub fn start<R>(&self, source: R, filter: Option<RecordFilter>) -> StreamHandle
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let cancel = Arc::new(AtomicBool::new(false));

        let lost = tx.clone();
        let worker = worker::Worker {
            source: Box::new(source),
            refs: Arc::clone(&self.refs),
            filter,
            config: self.config.clone(),
            cancel: Arc::clone(&cancel),
            events: tx,
        };
        debug!(capacity = self.config.channel_capacity, "starting layout pass");
        let task = tokio::task::spawn_blocking(move || {
            // a panic in a filter or source must still end the pass with a terminal event
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| worker.run())) {
                let reason = panic_message(&*payload);
                warn!(%reason, "layout worker panicked");
                let outcome = StreamOutcome::Failed(StreamError::WorkerLost(reason));
                let _ = lost.blocking_send(StreamEvent::Finished(outcome));
            }
        });

        StreamHandle {
            events: rx,
            cancel,
            task: Some(task),
            runtime: Handle::current(),
        }
    }
}

/// Consumer end of one pass.
///
/// Dropping the handle stops the worker at its next row.
#[derive(Debug)]
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    cancel: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    runtime: Handle,
}

impl StreamHandle {
    /// Ask the worker to stop before its next record.
    ///
    /// Rows already produced are still delivered, followed by
    /// [`StreamOutcome::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Next event, or `None` once the pass is over
    pub async fn next(&mut self) -> Option<StreamEvent> {
        match self.events.recv().await {
            Some(event) => Some(event),
            None => self.lost().await,
        }
    }

    /// Like [`next`](Self::next), for callers outside the runtime
    pub fn blocking_next(&mut self) -> Option<StreamEvent> {
        match self.events.blocking_recv() {
            Some(event) => Some(event),
            None => {
                let task = self.task.take()?;
                worker_lost(self.runtime.block_on(task))
            }
        }
    }

    /// Drain the pass
    pub async fn collect(mut self) -> (Vec<GraphRow>, StreamOutcome) {
        let mut rows = Vec::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Row(row) => rows.push(row),
                StreamEvent::Finished(outcome) => return (rows, outcome),
            }
        }
        let rows_seen = rows.len();
        (
            rows,
            StreamOutcome::Failed(StreamError::WorkerLost(format!(
                "channel closed after {} rows",
                rows_seen
            ))),
        )
    }

    /// The channel closed with no terminal event; report a worker that died
    async fn lost(&mut self) -> Option<StreamEvent> {
        let task = self.task.take()?;
        worker_lost(task.await)
    }
}

fn worker_lost(joined: Result<(), JoinError>) -> Option<StreamEvent> {
    match joined {
        Ok(()) => None,
        Err(e) => Some(StreamEvent::Finished(StreamOutcome::Failed(
            StreamError::WorkerLost(e.to_string()),
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use revgraph_core::{CommitId, MalformedReason, RefKind, WireRecord};
    use std::io::Cursor;

    fn id(byte: &str) -> CommitId {
        byte.repeat(20).parse().unwrap()
    }

    fn write_record(out: &mut Vec<u8>, name: &str, parents: &[&str], author: &str) {
        let parents: Vec<CommitId> = parents.iter().map(|p| id(p)).collect();
        let message = format!("commit {}\n\nbody of {}\n", name, name);
        WireRecord {
            id: id(name),
            tree_id: id("ee"),
            parent_ids: &parents,
            author: author.as_bytes(),
            author_email: format!("{}@example.com", author.to_lowercase()).as_bytes(),
            author_date: 1_700_000_000,
            committer: author.as_bytes(),
            committer_email: b"ci@example.com",
            commit_date: 1_700_000_100,
            encoding: None,
            message: message.as_bytes(),
        }
        .write_to(out)
        .unwrap();
    }

    fn history(records: &[(&str, &[&str])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, parents) in records {
            write_record(&mut out, name, parents, "Alice");
        }
        out
    }

    fn lanes(rows: &[GraphRow]) -> Vec<usize> {
        rows.iter().map(|r| r.layout.node_lane).collect()
    }

    fn summary(outcome: StreamOutcome) -> StreamSummary {
        match outcome {
            StreamOutcome::Completed(summary) => summary,
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn siblings_collapse_onto_shared_parent() {
        let input = history(&[("cc", &["aa"]), ("bb", &["aa"]), ("aa", &[])]);
        let stream = GraphStream::new(GraphConfig::default());

        let (rows, outcome) = stream.start(Cursor::new(input), None).collect().await;

        assert_eq!(lanes(&rows), vec![0, 1, 0]);
        assert_eq!(rows[2].layout.incoming().count(), 2);
        assert_eq!(rows[2].record.subject, "commit aa");
        assert_eq!(rows[2].record.body.as_deref(), Some("body of aa"));
        let summary = summary(outcome);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.rows, 3);
        assert!(summary.dangling.is_empty());
        assert_eq!(summary.anomalies, 0);
    }

    #[tokio::test]
    async fn merge_parents_close_one_edge_each() {
        let input = history(&[("ff", &["aa", "bb"]), ("aa", &["00"]), ("bb", &["00"]), ("00", &[])]);
        let stream = GraphStream::new(GraphConfig::default());

        let (rows, outcome) = stream.start(Cursor::new(input), None).collect().await;

        assert_eq!(rows[0].layout.parent_lanes.as_slice(), &[0, 1]);
        assert_eq!(lanes(&rows), vec![0, 0, 1, 0]);
        assert_eq!(rows[1].layout.incoming().count(), 1);
        assert_eq!(rows[2].layout.incoming().count(), 1);
        assert_eq!(rows[3].layout.incoming().count(), 2);
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn missing_parent_is_pruned_at_end() {
        let input = history(&[("bb", &["aa"])]);
        let stream = GraphStream::new(GraphConfig::default());

        let (rows, outcome) = stream.start(Cursor::new(input), None).collect().await;

        assert_eq!(rows.len(), 1);
        let summary = summary(outcome);
        assert_eq!(summary.dangling.len(), 1);
        assert_eq!(summary.dangling[0].target, id("aa"));
    }

    #[tokio::test]
    async fn malformed_record_ends_the_stream() {
        let mut input = history(&[("cc", &["bb"])]);
        input.extend_from_slice(b"abc123 def456\nAlice\na@example.com\n1\nAlice\na@example.com\n1\n\nbroken\n\0");
        write_record(&mut input, "bb", &[], "Alice");
        let stream = GraphStream::new(GraphConfig::default());

        let (rows, outcome) = stream.start(Cursor::new(input), None).collect().await;

        assert_eq!(rows.len(), 1);
        match outcome {
            StreamOutcome::Failed(StreamError::Malformed(ParseError::MalformedRecord { record, reason })) => {
                assert_eq!(record, 1);
                assert!(matches!(reason, MalformedReason::CommitId(_)));
            }
            other => panic!("expected a malformed record, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn filtered_records_still_occupy_lanes() {
        let mut input = Vec::new();
        write_record(&mut input, "cc", &["aa"], "Alice");
        write_record(&mut input, "bb", &["aa"], "Bob");
        write_record(&mut input, "aa", &[], "Alice");
        let stream = GraphStream::new(GraphConfig::default());

        let filter = RecordFilter::Author("Bob".to_string());
        let (rows, outcome) = stream.start(Cursor::new(input), Some(filter)).collect().await;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.id, id("bb"));
        assert_eq!(rows[0].layout.node_lane, 1);
        assert_eq!(rows[0].layout.row, 1);
        let summary = summary(outcome);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.rows, 1);
    }

    #[tokio::test]
    async fn refs_are_attached_and_reported() {
        let input = history(&[("cc", &["aa"]), ("aa", &[])]);
        let refs = RefIndex::new([
            GitRef::new("main", id("cc"), RefKind::Branch),
            GitRef::new("HEAD", id("cc"), RefKind::Head),
            GitRef::new("v1.0", id("aa"), RefKind::Tag),
        ]);
        let stream = GraphStream::new(GraphConfig::default()).with_refs(refs);

        let (rows, outcome) = stream.start(Cursor::new(input), None).collect().await;

        let names: Vec<&str> = rows[0].record.refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["HEAD", "main"]);
        assert!(rows[1].record.refs[0].is_tag());
        let seen: Vec<String> = summary(outcome).refs_seen.into_iter().map(|r| r.name).collect();
        assert_eq!(seen, vec!["HEAD", "main", "v1.0"]);
    }

    #[tokio::test]
    async fn placeholder_rows_lead_into_head() {
        let input = history(&[("cc", &["bb"]), ("bb", &[])]);
        let refs = RefIndex::new([GitRef::new("HEAD", id("cc"), RefKind::Head)]);
        let config = GraphConfig {
            artificial_commits: true,
            ..GraphConfig::default()
        };
        let stream = GraphStream::new(config).with_refs(refs);

        let (rows, outcome) = stream.start(Cursor::new(input), None).collect().await;

        let ids: Vec<CommitId> = rows.iter().map(|r| r.record.id).collect();
        assert_eq!(ids, vec![CommitId::WORKING_TREE, CommitId::INDEX, id("cc"), id("bb")]);
        assert_eq!(lanes(&rows), vec![0, 0, 0, 0]);
        let summary = summary(outcome);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.rows, 4);
        assert!(summary.dangling.is_empty());
    }

    #[tokio::test]
    async fn cancel_stops_between_records() {
        let mut input = Vec::new();
        for i in (1..=500u32).rev() {
            let name = format!("{:040x}", i);
            let parent = format!("{:040x}", i - 1);
            let parents: Vec<CommitId> = if i > 1 { vec![parent.parse().unwrap()] } else { vec![] };
            WireRecord {
                id: name.parse().unwrap(),
                tree_id: id("ee"),
                parent_ids: &parents,
                author: b"Alice",
                author_email: b"alice@example.com",
                author_date: 0,
                committer: b"Alice",
                committer_email: b"alice@example.com",
                commit_date: 0,
                encoding: None,
                message: b"step\n",
            }
            .write_to(&mut input)
            .unwrap();
        }
        let stream = GraphStream::new(GraphConfig::default());
        let mut handle = stream.start(Cursor::new(input), None);

        assert!(matches!(handle.next().await, Some(StreamEvent::Row(_))));
        handle.cancel();
        assert!(handle.is_cancelled());

        let (rows, outcome) = handle.collect().await;
        match outcome {
            StreamOutcome::Cancelled { rows: delivered } => {
                assert_eq!(delivered, rows.len() + 1);
                assert!(delivered < 10);
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn independent_runs_are_identical() {
        let input = history(&[
            ("ff", &["dd", "ee"]),
            ("ee", &["cc"]),
            ("dd", &["bb", "cc"]),
            ("cc", &["aa"]),
            ("bb", &["aa"]),
            ("aa", &[]),
        ]);
        let stream = GraphStream::new(GraphConfig::default());

        let first = stream.start(Cursor::new(input.clone()), None);
        let second = stream.start(Cursor::new(input), None);
        let (a, _) = first.collect().await;
        let (b, _) = second.collect().await;

        let shape = |rows: &[GraphRow]| -> Vec<(usize, Vec<Edge>)> {
            rows.iter()
                .map(|r| (r.layout.node_lane, r.layout.edges.to_vec()))
                .collect()
        };
        assert_eq!(a.len(), 6);
        assert_eq!(shape(&a[..]), shape(&b[..]));
    }

    #[tokio::test]
    async fn unknown_default_encoding_fails_the_pass() {
        let config = GraphConfig {
            default_encoding: "klingon".to_string(),
            ..GraphConfig::default()
        };
        let stream = GraphStream::new(config);

        let (rows, outcome) = stream.start(Cursor::new(Vec::new()), None).collect().await;

        assert!(rows.is_empty());
        assert!(matches!(outcome, StreamOutcome::Failed(StreamError::Config(_))));
        assert!(matches!(
            StreamOutcome::Cancelled { rows: 0 }.into_result(),
            Err(StreamError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn repeated_commit_reports_its_refs_once() {
        let input = history(&[("cc", &["aa"]), ("cc", &["aa"]), ("aa", &[])]);
        let refs = RefIndex::new([
            GitRef::new("main", id("cc"), RefKind::Branch),
            GitRef::new("v1.0", id("aa"), RefKind::Tag),
        ]);
        let stream = GraphStream::new(GraphConfig::default()).with_refs(refs);

        let (rows, outcome) = stream.start(Cursor::new(input), None).collect().await;

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].record.refs.len(), 1);
        let summary = summary(outcome);
        assert_eq!(summary.anomalies, 1);
        let seen: Vec<String> = summary.refs_seen.into_iter().map(|r| r.name).collect();
        assert_eq!(seen, vec!["main", "v1.0"]);
    }

    #[tokio::test]
    async fn seen_window_comes_from_config() {
        let input = history(&[("cc", &["bb"]), ("bb", &["aa"]), ("aa", &[]), ("cc", &[])]);
        let config = GraphConfig {
            seen_window: Some(1),
            ..GraphConfig::default()
        };

        let (_, bounded) = GraphStream::new(config).start(Cursor::new(input.clone()), None).collect().await;
        let (_, unbounded) = GraphStream::new(GraphConfig::default())
            .start(Cursor::new(input), None)
            .collect()
            .await;

        assert_eq!(summary(bounded).anomalies, 0);
        assert_eq!(summary(unbounded).anomalies, 1);
    }

    /// Input that only arrives when the test hands it over
    struct TrickleSource {
        chunks: std::sync::mpsc::Receiver<Vec<u8>>,
        current: Cursor<Vec<u8>>,
    }

    impl Read for TrickleSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            loop {
                let n = self.current.read(buf)?;
                if n > 0 || buf.is_empty() {
                    return Ok(n);
                }
                match self.chunks.recv() {
                    Ok(chunk) => self.current = Cursor::new(chunk),
                    Err(_) => return Ok(0),
                }
            }
        }
    }

    #[tokio::test]
    async fn rows_flow_before_input_is_exhausted() {
        let (tx, rx) = std::sync::mpsc::channel();
        let source = TrickleSource {
            chunks: rx,
            current: Cursor::new(Vec::new()),
        };
        let stream = GraphStream::new(GraphConfig::default());
        let mut handle = stream.start(source, None);

        tx.send(history(&[("cc", &["bb"])])).unwrap();
        match handle.next().await {
            Some(StreamEvent::Row(row)) => assert_eq!(row.record.id, id("cc")),
            other => panic!("expected the first row early, got {:?}", other),
        }

        tx.send(history(&[("bb", &["aa"]), ("aa", &[])])).unwrap();
        drop(tx);
        let (rows, outcome) = handle.collect().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(summary(outcome).records, 3);
    }

    fn exploding_filter() -> Option<RecordFilter> {
        Some(RecordFilter::custom(|record| {
            if record.id == id("bb") {
                panic!("filter exploded on bb");
            }
            true
        }))
    }

    fn assert_worker_lost(event: Option<StreamEvent>) {
        match event {
            Some(StreamEvent::Finished(StreamOutcome::Failed(StreamError::WorkerLost(reason)))) => {
                assert!(reason.contains("filter exploded"), "reason was {:?}", reason);
            }
            other => panic!("expected a lost worker, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn panicking_worker_still_finishes_the_pass() {
        let input = history(&[("cc", &["bb"]), ("bb", &["aa"]), ("aa", &[])]);
        let stream = GraphStream::new(GraphConfig::default());
        let mut handle = stream.start(Cursor::new(input), exploding_filter());

        let mut rows = 0;
        let last = loop {
            match handle.next().await {
                Some(StreamEvent::Row(_)) => rows += 1,
                other => break other,
            }
        };

        assert_eq!(rows, 1);
        assert_worker_lost(last);
        assert!(handle.next().await.is_none());
    }

    #[test]
    fn blocking_consumer_sees_a_panicking_worker() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let input = history(&[("cc", &["bb"]), ("bb", &["aa"]), ("aa", &[])]);
        let stream = GraphStream::new(GraphConfig::default());
        let mut handle = {
            let _guard = runtime.enter();
            stream.start(Cursor::new(input), exploding_filter())
        };

        let mut events = Vec::new();
        while let Some(event) = handle.blocking_next() {
            events.push(event);
        }

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Row(_)));
        assert_worker_lost(events.pop());
    }
}
