//! The keyed document store and its importer.
//!
//! A [`RecordStore`] owns the settled document rows. It only grows through
//! [`RecordStore::import`], and an import only ever moves a field from a placeholder to
//! concrete data: settled values are never overwritten and rows are never removed or
//! reordered.
//!
//! An import runs in two phases. The whole batch is first consolidated and checked against
//! the store, and the resulting patches and appends are planned. Only if every check passes
//! is the plan applied, so a failed import leaves the store exactly as it was.
//!
//! # Example
//!
//! ```
//! use citnet::{FieldValue, ImportConfig, RecordStore, Sentinels, Table};
//!
//! let sentinels = Sentinels::default();
//! let mut store = RecordStore::new(["ref", "doi", "vol"], ["ref"]).unwrap();
//!
//! let parsed = Table::from_text_rows(["ref", "doi"], [["smith 2000 icarus", "x"]], &sentinels).unwrap();
//! store.import(&parsed, &ImportConfig::default()).unwrap();
//!
//! let fetched = Table::from_text_rows(["ref", "doi"], [["smith 2000 icarus", "10.1/abc"]], &sentinels).unwrap();
//! let report = store.import(&fetched, &ImportConfig::default()).unwrap();
//!
//! assert_eq!(report.patched_fields, 1);
//! let record = store.get("smith 2000 icarus").unwrap();
//! assert_eq!(record.get("doi"), Some(&FieldValue::concrete("10.1/abc")));
//! ```

use crate::compare::{Comparison, compare_keyed, compare_overlap};
use crate::config::ImportConfig;
use crate::key::{is_keyless, row_key};
use crate::merge::merge_keyed;
use crate::report::{ImportReport, Notice};
use crate::table::{Record, Table};
use crate::utils::normalize_whitespace;
use crate::value::{FieldValue, Sentinels};
use crate::{ReconcileError, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::HashMap;

/// Document rows addressable by position and by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordStore {
    table: Table,
    key_columns: Vec<String>,
    key_index: Vec<usize>,
    keys: Vec<String>,
    index: HashMap<String, usize>,
}

impl RecordStore {
    /// Creates an empty store.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::DuplicateColumn`] if a column repeats
    /// - [`ReconcileError::NoKeyColumns`] if `key_columns` is empty
    /// - [`ReconcileError::MissingKeyColumn`] if a key column is not one of `columns`
    pub fn new<I, S, K, T>(columns: I, key_columns: K) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        K: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::from_table(Table::new(columns)?, key_columns)
    }

    /// Restores a store from settled rows.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::NoKeyColumns`] if `key_columns` is empty
    /// - [`ReconcileError::MissingKeyColumn`] if a key column is missing
    /// - [`ReconcileError::DuplicateKey`] if two rows share a key
    /// - [`ReconcileError::RowWidth`] or [`ReconcileError::DuplicateColumn`] for a malformed
    ///   table
    pub fn from_table<K, T>(table: Table, key_columns: K) -> Result<Self>
    where
        K: IntoIterator<Item = T>,
        T: Into<String>,
    {
        table.validate()?;
        let key_columns: Vec<String> = key_columns.into_iter().map(Into::into).collect();
        if key_columns.is_empty() {
            return Err(ReconcileError::NoKeyColumns);
        }
        let key_index = table.resolve_keys(&key_columns)?;
        let keys: Vec<String> = table.rows().map(|row| row_key(row, &key_index)).collect();
        let mut index = HashMap::with_capacity(keys.len());
        for (position, key) in keys.iter().enumerate() {
            if index.insert(key.clone(), position).is_some() {
                return Err(ReconcileError::DuplicateKey(key.clone()));
            }
        }
        Ok(Self {
            table,
            key_columns,
            key_index,
            keys,
            index,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        self.table.columns()
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Row position of a key. The key is whitespace-normalized first.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(&normalize_whitespace(key)).copied()
    }

    /// The record stored under `key`.
    pub fn get(&self, key: &str) -> Option<Record> {
        self.position(key).and_then(|position| self.table.record(position))
    }

    /// The key of the row at `position`.
    pub fn key_of(&self, position: usize) -> Option<&str> {
        self.keys.get(position).map(String::as_str)
    }

    /// All keys, in row order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Compares a batch with the stored rows without importing it.
    ///
    /// # Errors
    ///
    /// See [`compare_overlap`].
    pub fn compare(&self, batch: &Table, sentinels: &Sentinels) -> Result<Comparison> {
        compare_overlap(&self.table, batch, &self.key_columns, sentinels)
    }

    /// Imports a batch of document rows.
    ///
    /// The batch may hold any subset of the store's columns as long as it holds every key
    /// column; other columns are ignored. Rows sharing a key are merged first, the merged
    /// rows are checked against the store, placeholders of stored rows are completed from
    /// the batch, and rows with new keys are appended with their placeholders written as the
    /// configured fill. Importing the same batch twice changes nothing the second time.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::MissingKeyColumn`] if the batch lacks a key column
    /// - [`ReconcileError::ConflictingField`] if rows sharing a key disagree
    /// - [`ReconcileError::InconsistentImport`] if the batch disagrees with stored data
    ///
    /// On error the store is unchanged.
    pub fn import(&mut self, batch: &Table, config: &ImportConfig) -> Result<ImportReport> {
        let sentinels = config.sentinels();
        if batch.is_empty() {
            info!("Document batch is empty, nothing to import");
            return Ok(ImportReport::empty_batch());
        }

        batch.resolve_keys(&self.key_columns)?;
        let ignored: Vec<&String> = batch
            .columns()
            .iter()
            .filter(|column| !self.table.has_column(column))
            .collect();
        if !ignored.is_empty() {
            debug!("Ignoring columns not in the store: {}", ignored.iter().join(", "));
        }
        let batch = batch.conform(self.table.columns(), config.fill());

        let mut report = ImportReport::default();
        let keyed: Vec<usize> = (0..batch.len())
            .filter(|&row| {
                batch
                    .row(row)
                    .is_some_and(|values| !is_keyless(values, &self.key_index, sentinels))
            })
            .collect();
        let skipped = batch.len() - keyed.len();
        if skipped > 0 {
            warn!("Skipping {skipped} rows whose key columns are all placeholders");
            report.notices.push(Notice::SkippedKeylessRows { count: skipped });
        }
        let batch = batch.select_rows(&keyed);
        let keys: Vec<String> = batch.rows().map(|row| row_key(row, &self.key_index)).collect();

        let merged = merge_keyed(&batch, &keys, &self.key_index, sentinels, config.fill())?;
        report.merged_duplicates = batch.len() - merged.len();
        if report.merged_duplicates > 0 {
            debug!("Merged {} duplicate rows", report.merged_duplicates);
        }
        let merged_keys: Vec<String> = merged
            .rows()
            .map(|row| row_key(row, &self.key_index))
            .collect();

        let stored: Vec<Option<&String>> = self.keys.iter().map(Some).collect();
        let incoming: Vec<Option<&String>> = merged_keys.iter().map(Some).collect();
        let comparison = compare_keyed(
            &self.table,
            &stored,
            &merged,
            &incoming,
            &self.key_columns,
            sentinels,
        )?;
        if !comparison.is_consistent() {
            warn!(
                "Rejecting document batch: {} field mismatches",
                comparison.mismatches.len()
            );
            return Err(ReconcileError::InconsistentImport(Box::new(comparison)));
        }

        let plan = ImportPlan::new(
            &self.table,
            &merged,
            merged_keys,
            |key| self.index.get(key).copied(),
            &self.key_index,
            config,
        );
        let applied = plan.apply(&mut self.table, |key, row| {
            self.index.insert(key.clone(), row);
            self.keys.push(key);
        })?;

        report.patched_rows = applied.patched_rows;
        report.patched_fields = applied.patched_fields;
        report.appended = applied.appended;
        debug!(
            "Imported documents: {} appended, {} rows patched",
            report.appended, report.patched_rows
        );
        Ok(report)
    }
}

/// Counts of what an applied plan changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Applied {
    pub(crate) patched_rows: usize,
    pub(crate) patched_fields: usize,
    pub(crate) appended: usize,
}

/// Patches and appends computed from a checked batch, applied in one step.
///
/// The batch must share the store's column layout.
pub(crate) struct ImportPlan<K> {
    patches: Vec<(usize, usize, FieldValue)>,
    patched_rows: usize,
    appends: Vec<(K, Vec<FieldValue>)>,
}

impl<K> ImportPlan<K> {
    /// Plans the import of `batch`, one row per key. `locate` finds a key's stored row.
    /// Columns listed in `keep` are appended verbatim; other placeholders become the fill.
    pub(crate) fn new(
        store: &Table,
        batch: &Table,
        keys: impl IntoIterator<Item = K>,
        locate: impl Fn(&K) -> Option<usize>,
        keep: &[usize],
        config: &ImportConfig,
    ) -> Self {
        let sentinels = config.sentinels();
        let mut plan = Self {
            patches: Vec::new(),
            patched_rows: 0,
            appends: Vec::new(),
        };

        for (key, incoming) in keys.into_iter().zip(batch.rows()) {
            let Some(position) = locate(&key) else {
                let row = incoming
                    .iter()
                    .enumerate()
                    .map(|(column, value)| {
                        if sentinels.is_special(value) && !keep.contains(&column) {
                            config.fill().clone()
                        } else {
                            value.clone()
                        }
                    })
                    .collect();
                plan.appends.push((key, row));
                continue;
            };
            let Some(stored) = store.row(position) else {
                continue;
            };
            let before = plan.patches.len();
            for (column, (old, new)) in stored.iter().zip(incoming).enumerate() {
                if sentinels.is_special(old) && sentinels.concrete(new).is_some() {
                    plan.patches.push((position, column, new.clone()));
                }
            }
            if plan.patches.len() > before {
                plan.patched_rows += 1;
            }
        }
        plan
    }

    /// Writes the plan into `table`. `on_append` receives each appended key and its row.
    pub(crate) fn apply(
        self,
        table: &mut Table,
        mut on_append: impl FnMut(K, usize),
    ) -> Result<Applied> {
        let start = table.len();
        let (keys, rows): (Vec<K>, Vec<Vec<FieldValue>>) = self.appends.into_iter().unzip();
        table.extend_rows(rows)?;

        let applied = Applied {
            patched_rows: self.patched_rows,
            patched_fields: self.patches.len(),
            appended: keys.len(),
        };
        for (row, column, value) in self.patches {
            table.set(row, column, value);
        }
        for (offset, key) in keys.into_iter().enumerate() {
            on_append(key, start + offset);
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const COLUMNS: [&str; 4] = ["ref", "doi", "vol", "pages"];

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_text_rows(
            columns.iter().copied(),
            rows.iter().map(|row| row.iter().copied()),
            &Sentinels::default(),
        )
        .unwrap()
    }

    fn store_with(rows: &[&[&str]]) -> RecordStore {
        RecordStore::from_table(table(&COLUMNS, rows), ["ref"]).unwrap()
    }

    #[test]
    fn test_unknown_field_is_patched() {
        let mut store = store_with(&[&["smith 2000 icarus", "x", "4", "x"]]);
        let batch = table(&["ref", "doi"], &[&["smith 2000 icarus", "10.1/abc"]]);
        let report = store.import(&batch, &ImportConfig::default()).unwrap();

        assert_eq!(report.patched_rows, 1);
        assert_eq!(report.patched_fields, 1);
        assert_eq!(report.appended, 0);
        assert_eq!(
            store.table().value(0, "doi"),
            Some(&FieldValue::concrete("10.1/abc"))
        );
    }

    #[test]
    fn test_import_is_idempotent() {
        let mut store = store_with(&[&["smith 2000 icarus", "x", "4", "x"]]);
        let batch = table(
            &["ref", "doi", "pages"],
            &[
                &["smith 2000 icarus", "10.1/abc", "x"],
                &["jones 1999 jgr", "x", "1-9"],
                &["jones 1999 jgr", "10.2/j", "?"],
            ],
        );
        let first = store.import(&batch, &ImportConfig::default()).unwrap();
        assert_eq!(first.appended, 1);
        assert_eq!(first.merged_duplicates, 1);
        let once = store.clone();

        let second = store.import(&batch, &ImportConfig::default()).unwrap();
        assert!(second.is_noop());
        assert_eq!(store, once);
    }

    #[test]
    fn test_store_grows_by_distinct_new_keys() {
        let mut store = store_with(&[&["a 1 b", "x", "x", "x"]]);
        let batch = table(
            &["ref", "vol"],
            &[&["c 2 d", "1"], &["e 3 f", "2"], &["c 2 d", "x"], &["a 1 b", "9"]],
        );
        let report = store.import(&batch, &ImportConfig::default()).unwrap();
        assert_eq!(report.appended, 2);
        assert_eq!(store.len(), 3);
        assert_eq!(store.keys(), &["a 1 b", "c 2 d", "e 3 f"]);
        assert_eq!(store.position("e  3 f"), Some(2));
    }

    #[test]
    fn test_settled_values_are_never_overwritten() {
        let mut store = store_with(&[&["a 1 b", "10.1/a", "x", "x"]]);
        let before = store.clone();
        let batch = table(&["ref", "doi", "vol"], &[&["a 1 b", "10.9/z", "3"]]);
        let result = store.import(&batch, &ImportConfig::default());

        let Err(ReconcileError::InconsistentImport(comparison)) = &result else {
            panic!("expected an inconsistent import, got {result:?}");
        };
        assert_eq!(comparison.mismatches.len(), 1);
        assert_eq!(comparison.mismatches[0].column, "doi");
        assert_eq!(store, before);
    }

    #[test]
    fn test_conflicting_duplicates_leave_store_unchanged() {
        let mut store = store_with(&[]);
        let batch = table(&["ref", "vol"], &[&["a 1 b", "1"], &["c 2 d", "x"], &["a 1 b", "2"]]);
        let result = store.import(&batch, &ImportConfig::default());
        assert!(matches!(result, Err(ReconcileError::ConflictingField { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_appended_rows_use_fill() {
        let mut store = store_with(&[]);
        let config = ImportConfig::new().with_fill(FieldValue::concrete("-"));
        let batch = table(&["ref", "vol"], &[&["a x b", "?"]]);
        store.import(&batch, &config).unwrap();

        let record = store.get("a x b").unwrap();
        assert_eq!(record.get("ref"), Some(&FieldValue::concrete("a x b")));
        assert_eq!(record.get("vol"), Some(&FieldValue::concrete("-")));
        assert_eq!(record.get("doi"), Some(&FieldValue::concrete("-")));

        // The fill counts as a placeholder, so later data still lands.
        let later = table(&["ref", "doi"], &[&["a x b", "10.1/a"]]);
        let report = store.import(&later, &config).unwrap();
        assert_eq!(report.patched_fields, 1);
    }

    #[test]
    fn test_keyless_rows_are_skipped() {
        let mut store = RecordStore::new(["fau", "yr", "doi"], ["fau", "yr"]).unwrap();
        let batch = table(&["fau", "yr", "doi"], &[&["x", "?", "10.1/a"], &["smith", "x", "x"]]);
        let report = store.import(&batch, &ImportConfig::default()).unwrap();
        assert_eq!(report.appended, 1);
        assert!(report.has_notice(|n| *n == Notice::SkippedKeylessRows { count: 1 }));
        assert_eq!(store.key_of(0), Some("smith x"));
        assert_eq!(store.table().value(0, "yr"), Some(&FieldValue::Unknown));
    }

    #[rstest]
    #[case(&["vol"])]
    #[case(&["doi", "pages"])]
    fn test_batch_without_key_column(#[case] columns: &[&str]) {
        let mut store = store_with(&[]);
        let row: Vec<&str> = columns.iter().map(|_| "1").collect();
        let batch = table(columns, &[row.as_slice()]);
        assert_eq!(
            store.import(&batch, &ImportConfig::default()),
            Err(ReconcileError::MissingKeyColumn("ref".to_string()))
        );
    }

    #[test]
    fn test_empty_batch() {
        let mut store = store_with(&[&["a 1 b", "x", "x", "x"]]);
        let report = store
            .import(&Table::new(["ref"]).unwrap(), &ImportConfig::default())
            .unwrap();
        assert_eq!(report, ImportReport::empty_batch());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_requires_key_columns() {
        assert_eq!(
            RecordStore::new(["ref", "doi"], Vec::<String>::new()),
            Err(ReconcileError::NoKeyColumns)
        );
        let rows = table(&["ref", "doi"], &[&["a 1 b", "x"]]);
        assert_eq!(
            RecordStore::from_table(rows, Vec::<String>::new()),
            Err(ReconcileError::NoKeyColumns)
        );
    }

    #[rstest]
    #[case("x", ImportConfig::new())]
    #[case("?", ImportConfig::new())]
    #[case("n/a", ImportConfig::new().with_sentinels(Sentinels::new().with_unknown("n/a")))]
    #[case("unclear", ImportConfig::new().with_sentinels(Sentinels::new().with_ambiguous("unclear")))]
    fn test_placeholder_cells_are_patched(#[case] stored: &str, #[case] config: ImportConfig) {
        let mut store = store_with(&[&["a 1 b", stored, "x", "x"]]);
        let batch = table(&["ref", "doi"], &[&["a 1 b", "10.1/a"]]);
        let report = store.import(&batch, &config).unwrap();

        assert_eq!(report.patched_rows, 1);
        assert_eq!(report.patched_fields, 1);
        assert_eq!(store.table().value(0, "doi"), Some(&FieldValue::concrete("10.1/a")));
    }

    #[test]
    fn test_from_table_rejects_duplicate_keys() {
        let rows = table(&COLUMNS, &[&["a 1 b", "x", "x", "x"], &["a  1 b", "x", "2", "x"]]);
        assert_eq!(
            RecordStore::from_table(rows, ["ref"]),
            Err(ReconcileError::DuplicateKey("a 1 b".to_string()))
        );
    }

    #[test]
    fn test_extra_sentinels_apply_per_import() {
        let mut store = store_with(&[&["a 1 b", "n/a", "x", "x"]]);
        let batch = table(&["ref", "doi"], &[&["a 1 b", "10.1/a"]]);

        let strict = store.import(&batch, &ImportConfig::default());
        assert!(matches!(strict, Err(ReconcileError::InconsistentImport(_))));

        let mut config = ImportConfig::new();
        config.add_unknown_token("n/a");
        let report = store.import(&batch, &config).unwrap();
        assert_eq!(report.patched_fields, 1);
    }
}
