pub mod id;
pub mod record;
pub mod refs;
pub mod intern;
pub mod parser;
pub mod wire;
pub mod filter;
pub mod config;
pub mod error;
pub mod repository;

pub use id::{CommitId, HashKind, IdError};
pub use record::{ParentIds, RevisionRecord};
pub use refs::{GitRef, RefIndex, RefKind};
pub use intern::StringPool;
pub use parser::{ChunkParser, RecordDecoder};
pub use wire::{WireRecord, RECORD_SEPARATOR};
pub use filter::{RecordFilter, RecordPredicate};
pub use config::GraphConfig;
pub use error::{ConfigError, MalformedReason, ParseError};
pub use repository::{LogReader, RepositorySource};
