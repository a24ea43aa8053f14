//! A library for reconciling partial bibliography records and citation edges.
//!
//! `citnet` maintains a bibliography and its citation graph as they are assembled from
//! heterogeneous sources: hand-parsed reference lists, transcribed citation tables and
//! metadata fetched from remote services. Each source may know only some fields of a
//! document, may repeat a document, and may disagree with what is already known. The crate
//! fuses these observations without losing data and without ever picking a winner between
//! two contradicting values.
//!
//! # Key Features
//!
//! - **Placeholder-aware values**: every cell is concrete text, unknown (`x`) or ambiguous
//!   (`?`), with extra placeholder tokens configurable per import
//! - **Content-derived identity**: a document's key is built from its key columns
//! - **Consistency checks**: overlapping rows are compared field by field, placeholders
//!   excluded, and mismatching rows are handed back verbatim
//! - **Safe merging**: rows sharing a key complete each other; two different values for one
//!   field are a hard error
//! - **Transactional imports**: a failed import leaves the stores untouched, and importing a
//!   batch twice changes nothing the second time
//! - **Append-only citation graph**: edges addressed by row position or by content key, with
//!   additive target sets reported rather than rejected
//! - **Scrub reports** (feature `scrub`, on by default): placeholder counts, repeated values
//!   and near-duplicate detection
//!
//! # Basic Usage
//!
//! ```rust
//! use citnet::{CitationNetwork, FieldValue, Sentinels, Table};
//!
//! let sentinels = Sentinels::default();
//! let mut network = CitationNetwork::with_schema(["ref", "doi", "vol"], ["ref"]).unwrap();
//!
//! // From a parsed bibliography file
//! let parsed = Table::from_text_rows(
//!     ["ref", "doi", "vol"],
//!     [["smith 2000 icarus", "x", "4"], ["jones 1999 jgr", "x", "12"]],
//!     &sentinels,
//! )
//! .unwrap();
//! network.import_documents(&parsed).unwrap();
//!
//! // From a metadata service
//! let fetched = Table::from_text_rows(["ref", "doi"], [["smith 2000 icarus", "10.1/abc"]], &sentinels)
//!     .unwrap();
//! let report = network.import_documents(&fetched).unwrap();
//! assert_eq!(report.patched_fields, 1);
//!
//! // From a transcribed citation list
//! let citations = Table::from_text_rows(["src", "ref"], [["smith 2000 icarus", "jones 1999 jgr"]], &sentinels)
//!     .unwrap();
//! network.import_citations(&citations).unwrap();
//!
//! let smith = network.documents().get("smith 2000 icarus").unwrap();
//! assert_eq!(smith.get("doi"), Some(&FieldValue::concrete("10.1/abc")));
//! assert_eq!(network.citations().len(), 1);
//! ```
//!
//! # Error Handling
//!
//! The library uses a custom [`Result`] type that wraps [`ReconcileError`]. Every error is
//! raised before any mutation, and conflicts carry the key, column and values needed to fix
//! the sources by hand:
//!
//! ```rust
//! use citnet::{merge_rows, FieldValue, ReconcileError, Sentinels, Table};
//!
//! let sentinels = Sentinels::default();
//! let batch = Table::from_text_rows(
//!     ["ref", "vol"],
//!     [["jones 1999 jgr", "12"], ["jones 1999 jgr", "13"]],
//!     &sentinels,
//! )
//! .unwrap();
//!
//! match merge_rows(&batch, &["ref"], &sentinels, &FieldValue::Unknown) {
//!     Err(ReconcileError::ConflictingField { key, column, values }) => {
//!         assert_eq!((key.as_str(), column.as_str()), ("jones 1999 jgr", "vol"));
//!         assert_eq!(values, vec!["12", "13"]);
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```
//!
//! Conditions that do not stop an import, such as an empty batch or a batch adding new
//! citation targets, are reported as [`Notice`]s on the returned [`ImportReport`].
//!
//! # Logging
//!
//! Diagnostics go through the [`log`] facade. The library never installs a logger.
//!
//! # Thread Safety
//!
//! All types are `Send` and `Sync`. Imports take `&mut self` and run to completion, so a
//! store shared between threads needs a lock around it. The scrubber can spread its
//! comparisons over the rayon thread pool through `run_in_parallel`.

use thiserror::Error;

pub mod compare;
pub mod config;
pub mod edges;
pub mod key;
pub mod merge;
pub mod network;
pub mod report;
#[cfg(feature = "scrub")]
pub mod scrub;
pub mod store;
pub mod table;
mod utils;
pub mod value;

// Reexports
pub use compare::{Comparison, GraphComparison, Mismatch, Side, compare_graph, compare_overlap};
pub use config::ImportConfig;
pub use edges::{AddressingMode, Edge, EdgeColumns, EdgeKey, EdgeStore};
pub use key::{add_key_column, derive_key, expand_key, table_keys};
pub use merge::{FieldConflict, find_conflicts, merge_rows};
pub use network::{CitationNetwork, EntryUpdate, Link, NetworkSnapshot};
pub use report::{ImportReport, Notice};
pub use store::RecordStore;
pub use table::{Record, Table};
pub use utils::normalize_whitespace;
pub use value::{FieldValue, Sentinels, classify, is_concrete};

/// A specialized Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors raised by key derivation, comparison, merging and imports.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("Missing key column: {0}")]
    MissingKeyColumn(String),

    #[error("A document store needs at least one key column")]
    NoKeyColumns,

    #[error("Key `{key}` appears in more than one differing {side} row")]
    DuplicateKeyInOverlap { key: String, side: Side },

    #[error("Conflicting values for `{column}` under key `{key}`: {}", .values.join(", "))]
    ConflictingField {
        key: String,
        column: String,
        values: Vec<String>,
    },

    #[error("Batch is inconsistent with the store: {} mismatched fields", .0.mismatches.len())]
    InconsistentImport(Box<Comparison>),

    #[error("Mixed key addressing: {0}")]
    MixedKeyAddressing(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Row has {found} values but the table has {expected} columns")]
    RowWidth { expected: usize, found: usize },

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Invalid link columns: {0}")]
    InvalidLinkColumns(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reconcile_error_display() {
        let error = ReconcileError::ConflictingField {
            key: "jones 1999 jgr".to_string(),
            column: "vol".to_string(),
            values: vec!["12".to_string(), "13".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Conflicting values for `vol` under key `jones 1999 jgr`: 12, 13"
        );

        let error = ReconcileError::DuplicateKeyInOverlap {
            key: "a 1 b".to_string(),
            side: Side::Store,
        };
        assert_eq!(
            error.to_string(),
            "Key `a 1 b` appears in more than one differing store row"
        );
    }

    #[test]
    fn test_types_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CitationNetwork>();
        assert_send_sync::<ReconcileError>();
        assert_send_sync::<Table>();
    }
}
