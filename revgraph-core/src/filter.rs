use std::fmt;
use std::sync::Arc;

use crate::record::RevisionRecord;

pub type RecordPredicate = Arc<dyn Fn(&RevisionRecord) -> bool + Send + Sync>;

/// Decides which laid-out records are handed to the consumer.
///
/// Records that fail still take part in lane bookkeeping; only their rows
/// are withheld.
#[derive(Clone)]
pub enum RecordFilter {
    /// Substring of the author name or email
    Author(String),
    /// Substring of the subject or body
    Message(String),
    /// Commit date within `since..=until` (unix seconds)
    DateRange { since: i64, until: i64 },
    Custom(RecordPredicate),
    /// Every inner filter must match
    All(Vec<RecordFilter>),
}

impl RecordFilter {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&RevisionRecord) -> bool + Send + Sync + 'static,
    {
        RecordFilter::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, record: &RevisionRecord) -> bool {
        match self {
            RecordFilter::Author(pattern) => {
                record.author.contains(pattern.as_str())
                    || record.author_email.contains(pattern.as_str())
            }
            RecordFilter::Message(pattern) => {
                record.subject.contains(pattern.as_str())
                    || record
                        .body
                        .as_deref()
                        .is_some_and(|body| body.contains(pattern.as_str()))
            }
            RecordFilter::DateRange { since, until } => {
                (*since..=*until).contains(&record.commit_date)
            }
            RecordFilter::Custom(predicate) => predicate(record),
            RecordFilter::All(filters) => filters.iter().all(|f| f.matches(record)),
        }
    }
}

impl fmt::Debug for RecordFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordFilter::Author(p) => f.debug_tuple("Author").field(p).finish(),
            RecordFilter::Message(p) => f.debug_tuple("Message").field(p).finish(),
            RecordFilter::DateRange { since, until } => f
                .debug_struct("DateRange")
                .field("since", since)
                .field("until", until)
                .finish(),
            RecordFilter::Custom(_) => f.write_str("Custom(..)"),
            RecordFilter::All(filters) => f.debug_tuple("All").field(filters).finish(),
        }
    }
}
