//! Writer for the NUL-separated commit record format read by
//! [`ChunkParser`](crate::parser::ChunkParser).

use std::io::{self, Write};

use crate::id::CommitId;

/// Record separator
pub const RECORD_SEPARATOR: u8 = 0;

/// One commit in wire form, borrowing raw (not yet decoded) text
#[derive(Debug, Clone, Copy)]
pub struct WireRecord<'a> {
    pub id: CommitId,
    pub tree_id: CommitId,
    pub parent_ids: &'a [CommitId],
    pub author: &'a [u8],
    pub author_email: &'a [u8],
    pub author_date: i64,
    pub committer: &'a [u8],
    pub committer_email: &'a [u8],
    pub commit_date: i64,
    /// Label of the encoding `message` and the identities are stored in
    pub encoding: Option<&'a str>,
    pub message: &'a [u8],
}

impl WireRecord<'_> {
    /// Append this record, including its trailing separator
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{} {}", self.id, self.tree_id)?;
        for parent in self.parent_ids {
            write!(out, " {}", parent)?;
        }
        out.write_all(b"\n")?;

        for field in [self.author, self.author_email] {
            out.write_all(field)?;
            out.write_all(b"\n")?;
        }
        writeln!(out, "{}", self.author_date)?;
        for field in [self.committer, self.committer_email] {
            out.write_all(field)?;
            out.write_all(b"\n")?;
        }
        writeln!(out, "{}", self.commit_date)?;
        writeln!(out, "{}", self.encoding.unwrap_or(""))?;

        out.write_all(self.message)?;
        out.write_all(&[RECORD_SEPARATOR])
    }
}
