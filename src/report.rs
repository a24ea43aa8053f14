//! Outcome of an import.
//!
//! Conditions that do not stop an import (an empty batch, a batch adding citation targets,
//! edge rows with a missing endpoint) are collected as [`Notice`]s on the [`ImportReport`]
//! instead of being raised as errors.

use crate::edges::EdgeKey;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A recoverable condition met during an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// The batch held no rows; nothing changed.
    EmptyBatch,
    /// The batch adds targets to sources the edge store already holds.
    AdditiveTargets { sources: Vec<EdgeKey> },
    /// The batch lists fewer targets than the store holds for these sources. No edge is
    /// removed.
    OmittedTargets { sources: Vec<EdgeKey> },
    /// Edge rows dropped because an endpoint was a placeholder.
    DroppedIncompleteEdges { count: usize },
    /// Document rows skipped because every key column was a placeholder.
    SkippedKeylessRows { count: usize },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::EmptyBatch => f.write_str("empty batch"),
            Notice::AdditiveTargets { sources } => {
                write!(f, "new targets for sources: {}", sources.iter().join(", "))
            }
            Notice::OmittedTargets { sources } => {
                write!(f, "targets omitted for sources: {}", sources.iter().join(", "))
            }
            Notice::DroppedIncompleteEdges { count } => {
                write!(f, "dropped {count} edge rows with a placeholder endpoint")
            }
            Notice::SkippedKeylessRows { count } => {
                write!(f, "skipped {count} rows without a usable key")
            }
        }
    }
}

/// What an import changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Existing rows that gained at least one field.
    pub patched_rows: usize,
    /// Fields that moved from a placeholder to concrete data.
    pub patched_fields: usize,
    /// Rows appended to the store.
    pub appended: usize,
    /// Batch rows folded into another row with the same key.
    pub merged_duplicates: usize,
    pub notices: Vec<Notice>,
}

impl ImportReport {
    /// Report for a batch without rows.
    pub fn empty_batch() -> Self {
        Self {
            notices: vec![Notice::EmptyBatch],
            ..Default::default()
        }
    }

    /// True if the import left the store as it was.
    pub fn is_noop(&self) -> bool {
        self.patched_fields == 0 && self.appended == 0
    }

    pub fn has_notice(&self, predicate: impl Fn(&Notice) -> bool) -> bool {
        self.notices.iter().any(predicate)
    }
}
