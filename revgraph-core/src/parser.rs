use std::io::BufRead;
use std::sync::Arc;

use encoding_rs::Encoding;
use tracing::debug;

use crate::config::GraphConfig;
use crate::error::{ConfigError, MalformedReason, ParseError};
use crate::id::{CommitId, HashKind};
use crate::intern::StringPool;
use crate::record::{ParentIds, RevisionRecord};
use crate::refs::GitRef;
use crate::wire::RECORD_SEPARATOR;

/// Names of the newline-terminated fields following the header, in order
const FIELDS: [&str; 7] = [
    "author name",
    "author email",
    "author date",
    "committer name",
    "committer email",
    "commit date",
    "encoding",
];

/// Decodes single raw records into [`RevisionRecord`]s.
///
/// Owns the string pool, so one decoder must never serve two streams.
pub struct RecordDecoder {
    kind: HashKind,
    default_encoding: &'static Encoding,
    pool: StringPool,
    no_refs: Arc<[GitRef]>,
}

impl RecordDecoder {
    pub fn new(kind: HashKind, default_encoding: &'static Encoding, pool: StringPool) -> Self {
        Self {
            kind,
            default_encoding,
            pool,
            no_refs: Arc::from(Vec::new()),
        }
    }

    pub fn from_config(config: &GraphConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.hash_kind,
            config.encoding()?,
            StringPool::new(config.intern_capacity, config.intern_max_len),
        ))
    }

    pub fn pool(&self) -> &StringPool {
        &self.pool
    }

    /// Decode one record; `record` is its position in the stream, used for errors
    pub fn decode(&mut self, raw: &[u8], record: usize) -> Result<RevisionRecord, ParseError> {
        let malformed = |reason| ParseError::MalformedRecord { record, reason };

        let header_end = raw
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| malformed(MalformedReason::UnterminatedHeader))?;
        let (id, tree_id, parent_ids) = self.decode_header(&raw[..header_end]).map_err(malformed)?;

        // 7 fixed fields, then the raw message
        let mut pieces = raw[header_end + 1..].splitn(FIELDS.len() + 1, |&b| b == b'\n');
        let mut fields: [&[u8]; 7] = [&[]; 7];
        for (slot, name) in fields.iter_mut().zip(FIELDS) {
            *slot = pieces
                .next()
                .ok_or_else(|| malformed(MalformedReason::MissingField(name)))?;
        }
        let message = pieces.next().unwrap_or(&[]);

        let author_date = parse_timestamp(fields[2], FIELDS[2]).map_err(malformed)?;
        let commit_date = parse_timestamp(fields[5], FIELDS[5]).map_err(malformed)?;

        let declared = std::str::from_utf8(fields[6])
            .ok()
            .map(str::trim)
            .filter(|label| !label.is_empty());
        let decoder = match declared {
            Some(label) => Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
                debug!(record, label, "unknown encoding, using default");
                self.default_encoding
            }),
            None => self.default_encoding,
        };

        let author = self.decode_pooled(decoder, fields[0]);
        let author_email = self.decode_pooled(decoder, fields[1]);
        let committer = self.decode_pooled(decoder, fields[3]);
        let committer_email = self.decode_pooled(decoder, fields[4]);
        let encoding = declared.map(|label| self.pool.intern(label));

        let (text, _) = decoder.decode_without_bom_handling(message);
        let (subject, body) = split_message(&text);

        Ok(RevisionRecord {
            id,
            tree_id,
            parent_ids,
            author,
            author_email,
            author_date,
            committer,
            committer_email,
            commit_date,
            encoding,
            subject,
            body,
            refs: self.no_refs.clone(),
        })
    }

    fn decode_header(&self, header: &[u8]) -> Result<(CommitId, CommitId, ParentIds), MalformedReason> {
        let width = self.kind.hex_len();

        let (id_hex, rest) = split_fixed(header, width);
        let id = CommitId::from_hex(id_hex, self.kind).map_err(MalformedReason::CommitId)?;

        let (tree_hex, rest) = split_fixed(rest.trim_ascii_start(), width);
        let tree_id = CommitId::from_hex(tree_hex, self.kind).map_err(MalformedReason::TreeId)?;

        let mut parent_ids = ParentIds::new();
        for token in rest
            .split(|b| b.is_ascii_whitespace())
            .filter(|token| !token.is_empty())
        {
            parent_ids.push(CommitId::from_hex(token, self.kind).map_err(MalformedReason::ParentId)?);
        }

        Ok((id, tree_id, parent_ids))
    }

    fn decode_pooled(&mut self, decoder: &'static Encoding, raw: &[u8]) -> Arc<str> {
        let (text, _) = decoder.decode_without_bom_handling(raw);
        self.pool.intern(text.trim_end_matches('\r'))
    }
}

/// Split at `width`, or hand back everything when shorter so the id
/// parser reports the real length
fn split_fixed(bytes: &[u8], width: usize) -> (&[u8], &[u8]) {
    if bytes.len() < width {
        (bytes, &[])
    } else {
        bytes.split_at(width)
    }
}

fn parse_timestamp(raw: &[u8], field: &'static str) -> Result<i64, MalformedReason> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or(MalformedReason::Timestamp { field })
}

/// First line is the subject; whatever follows the first blank line is the
/// body. Continuation lines of a wrapped first paragraph belong to neither.
fn split_message(message: &str) -> (String, Option<String>) {
    let (first, mut rest) = message.split_once('\n').unwrap_or((message, ""));
    let subject = first.trim_end().to_string();

    let body = loop {
        match rest.split_once('\n') {
            Some((line, tail)) if line.trim().is_empty() => break Some(tail),
            Some((_, tail)) => rest = tail,
            None => break None,
        }
    };
    let body = body
        .map(str::trim)
        .filter(|body| !body.is_empty())
        .map(str::to_string);
    (subject, body)
}

/// Lazily splits a byte stream on NUL separators and decodes each record.
///
/// Stops for good after the first error; no attempt is made to resync on
/// the next separator.
pub struct ChunkParser<R> {
    reader: R,
    decoder: RecordDecoder,
    buf: Vec<u8>,
    records: usize,
    done: bool,
}

impl<R: BufRead> ChunkParser<R> {
    pub fn new(reader: R, decoder: RecordDecoder) -> Self {
        Self {
            reader,
            decoder,
            buf: Vec::with_capacity(1024),
            records: 0,
            done: false,
        }
    }

    pub fn from_config(reader: R, config: &GraphConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(reader, RecordDecoder::from_config(config)?))
    }

    /// Raw records consumed so far
    pub fn records_read(&self) -> usize {
        self.records
    }

    pub fn pool(&self) -> &StringPool {
        self.decoder.pool()
    }

    /// Read the next non-empty chunk into `buf`; false at end of stream
    fn fill_next_chunk(&mut self) -> std::io::Result<bool> {
        loop {
            self.buf.clear();
            if self.reader.read_until(RECORD_SEPARATOR, &mut self.buf)? == 0 {
                return Ok(false);
            }
            if self.buf.last() == Some(&RECORD_SEPARATOR) {
                self.buf.pop();
            }
            if !self.buf.trim_ascii().is_empty() {
                return Ok(true);
            }
        }
    }
}

impl<R: BufRead> Iterator for ChunkParser<R> {
    type Item = Result<RevisionRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.fill_next_chunk() {
            Ok(true) => {}
            Ok(false) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        }

        let index = self.records;
        self.records += 1;

        let raw = std::mem::take(&mut self.buf);
        let result = self.decoder.decode(raw.trim_ascii_start(), index);
        self.buf = raw;

        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}
