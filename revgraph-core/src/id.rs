use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Widest object id we accept (SHA-256)
const MAX_ID_BYTES: usize = 32;

/// Object hash algorithm, which fixes the width of every id in a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    #[default]
    Sha1,
    Sha256,
}

impl HashKind {
    pub const fn byte_len(self) -> usize {
        match self {
            HashKind::Sha1 => 20,
            HashKind::Sha256 => 32,
        }
    }

    pub const fn hex_len(self) -> usize {
        self.byte_len() * 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("expected {expected} hex digits, found {found}")]
    Length { expected: usize, found: usize },
    #[error("invalid hex digit in object id")]
    Hex,
}

/// Content-addressed commit identifier.
///
/// Stored inline so rows and edges can copy ids freely. Two reserved
/// values stand for the working tree and the index, which are not real
/// commits but are laid out like them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId {
    bytes: [u8; MAX_ID_BYTES],
    len: u8,
}

const fn sentinel(fill: u8) -> [u8; MAX_ID_BYTES] {
    let mut bytes = [0u8; MAX_ID_BYTES];
    let mut i = 0;
    while i < HashKind::Sha1.byte_len() {
        bytes[i] = fill;
        i += 1;
    }
    bytes
}

impl CommitId {
    /// Uncommitted changes in the working tree (`1111…`)
    pub const WORKING_TREE: CommitId = CommitId {
        bytes: sentinel(0x11),
        len: HashKind::Sha1.byte_len() as u8,
    };

    /// Staged changes in the index (`2222…`)
    pub const INDEX: CommitId = CommitId {
        bytes: sentinel(0x22),
        len: HashKind::Sha1.byte_len() as u8,
    };

    /// Parse exactly `kind.hex_len()` hex digits, either case
    pub fn from_hex(hex: &[u8], kind: HashKind) -> Result<Self, IdError> {
        let expected = kind.hex_len();
        if hex.len() != expected {
            return Err(IdError::Length {
                expected,
                found: hex.len(),
            });
        }

        let mut bytes = [0u8; MAX_ID_BYTES];
        hex::decode_to_slice(hex, &mut bytes[..kind.byte_len()]).map_err(|_| IdError::Hex)?;

        Ok(Self {
            bytes,
            len: kind.byte_len() as u8,
        })
    }

    /// Build from raw digest bytes (20 or 32 of them)
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() != HashKind::Sha1.byte_len() && raw.len() != HashKind::Sha256.byte_len() {
            return None;
        }
        let mut bytes = [0u8; MAX_ID_BYTES];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// True for the working-tree and index placeholders
    pub fn is_artificial(&self) -> bool {
        *self == Self::WORKING_TREE || *self == Self::INDEX
    }

    /// First eight hex digits, for display
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(8);
        s
    }
}

impl From<git2::Oid> for CommitId {
    fn from(oid: git2::Oid) -> Self {
        let raw = oid.as_bytes();
        let mut bytes = [0u8; MAX_ID_BYTES];
        bytes[..raw.len()].copy_from_slice(raw);
        Self {
            bytes,
            len: raw.len() as u8,
        }
    }
}

impl FromStr for CommitId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = if s.len() == HashKind::Sha256.hex_len() {
            HashKind::Sha256
        } else {
            HashKind::Sha1
        };
        Self::from_hex(s.as_bytes(), kind)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.as_bytes() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.short())
    }
}
