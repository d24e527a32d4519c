use std::collections::HashSet;
use std::io::{BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use revgraph_core::{ChunkParser, GitRef, GraphConfig, RecordFilter, RefIndex, RevisionRecord};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{GraphRow, StreamError, StreamEvent, StreamOutcome, StreamSummary};
use crate::layout::LayoutEngine;

/// How the worker loop should carry on after a row
enum Flow {
    Continue,
    Cancelled,
    /// The consumer hung up
    Closed,
}

/// Everything one pass needs, moved onto the blocking thread
pub(super) struct Worker {
    pub source: Box<dyn Read + Send>,
    pub refs: Arc<RefIndex>,
    pub filter: Option<RecordFilter>,
    pub config: GraphConfig,
    pub cancel: Arc<AtomicBool>,
    pub events: mpsc::Sender<StreamEvent>,
}

struct Pass<'a> {
    engine: LayoutEngine,
    refs: &'a RefIndex,
    filter: Option<&'a RecordFilter>,
    cancel: &'a AtomicBool,
    events: &'a mpsc::Sender<StreamEvent>,
    records: usize,
    rows: usize,
    /// Distinct refs in first-seen order
    refs_seen: Vec<GitRef>,
    refs_known: HashSet<GitRef>,
}

impl Worker {
    pub fn run(self) {
        let Worker {
            source,
            refs,
            filter,
            config,
            cancel,
            events,
        } = self;

        let mut pass = Pass {
            engine: LayoutEngine::with_seen_window(config.seen_window),
            refs: &refs,
            filter: filter.as_ref(),
            cancel: &cancel,
            events: &events,
            records: 0,
            rows: 0,
            refs_seen: Vec::new(),
            refs_known: HashSet::new(),
        };

        let outcome = match pass.drive(source, &config) {
            Ok(Flow::Continue) => {
                let dangling = pass.engine.finish();
                let summary = StreamSummary {
                    records: pass.records,
                    rows: pass.rows,
                    refs_seen: pass.refs_seen,
                    dangling,
                    anomalies: pass.engine.anomalies(),
                };
                info!(
                    records = summary.records,
                    rows = summary.rows,
                    width = pass.engine.max_width(),
                    "layout complete"
                );
                StreamOutcome::Completed(summary)
            }
            Ok(Flow::Cancelled) => {
                debug!(rows = pass.rows, "layout cancelled");
                StreamOutcome::Cancelled { rows: pass.rows }
            }
            Ok(Flow::Closed) => {
                debug!(rows = pass.rows, "consumer went away, stopping");
                return;
            }
            Err(e) => {
                debug!(error = %e, rows = pass.rows, "layout failed");
                StreamOutcome::Failed(e)
            }
        };

        // nobody left to tell if the receiver is gone
        let _ = events.blocking_send(StreamEvent::Finished(outcome));
    }
}

impl Pass<'_> {
    fn drive(&mut self, source: Box<dyn Read + Send>, config: &GraphConfig) -> Result<Flow, StreamError> {
        let mut parser = ChunkParser::from_config(BufReader::new(source), config)?;

        if config.artificial_commits {
            if let Some(head) = self.refs.head() {
                for placeholder in [RevisionRecord::working_tree(), RevisionRecord::index(head)] {
                    match self.lay_out(placeholder, false) {
                        Flow::Continue => {}
                        stop => return Ok(stop),
                    }
                }
            }
        }

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Ok(Flow::Cancelled);
            }
            let Some(record) = parser.next() else {
                break;
            };
            let record = record?;
            self.records += 1;

            match self.lay_out(record, true) {
                Flow::Continue => {}
                stop => return Ok(stop),
            }
        }

        debug!(
            records = self.records,
            pooled = parser.pool().len(),
            pool_hits = parser.pool().hits(),
            "reached end of input"
        );
        Ok(Flow::Continue)
    }

    fn lay_out(&mut self, record: RevisionRecord, filtered: bool) -> Flow {
        let refs = self.refs.refs_for(&record.id);
        for r in refs.iter() {
            if self.refs_known.insert(r.clone()) {
                self.refs_seen.push(r.clone());
            }
        }
        let record = Arc::new(record.with_refs(refs));

        let layout = self.engine.push(Arc::clone(&record));

        if filtered && self.filter.is_some_and(|filter| !filter.matches(&record)) {
            return Flow::Continue;
        }

        if self.events.blocking_send(StreamEvent::Row(GraphRow { record, layout })).is_err() {
            return Flow::Closed;
        }
        self.rows += 1;

        if self.cancel.load(Ordering::Relaxed) {
            Flow::Cancelled
        } else {
            Flow::Continue
        }
    }
}
