//! Handle-independent file identity.
//!
//! A tailer keeps the identity of the file it has open and compares it with
//! a fresh stat of the path to tell rotation from truncation from growth.
//! The comparison is a heuristic: a rename followed by recreation of a file
//! that happens to reuse the same inode looks like truncation or growth.

use std::fs::Metadata;

/// What happened to a path since the last observation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileChange {
    /// A different file now lives at the path
    Rotated,
    /// Same file, smaller than before
    Truncated,
    /// Same file, same or larger size
    Unchanged,
}

/// Device+inode pair plus the last observed size
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileIdentity {
    dev: u64,
    ino: u64,
    size: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
            size: metadata.len(),
        }
    }

    /// Without inodes, the creation time stands in for the file id.
    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        Self {
            dev: 0,
            ino: created,
            size: metadata.len(),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn same_file(&self, other: &FileIdentity) -> bool {
        self.dev == other.dev && self.ino == other.ino
    }

    /// Record a new size for the same file
    pub fn with_size(self, size: u64) -> Self {
        Self { size, ..self }
    }

    /// Compare this (last known) identity with a fresh observation
    pub fn classify(&self, current: &FileIdentity) -> FileChange {
        if !self.same_file(current) {
            FileChange::Rotated
        } else if current.size < self.size {
            FileChange::Truncated
        } else {
            FileChange::Unchanged
        }
    }
}
