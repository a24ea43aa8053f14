//! Consolidation of partial observations that share a key.
//!
//! Rows with a key that appears once pass through untouched. Rows sharing a key are fused
//! column by column from their distinct concrete values:
//!
//! | distinct concrete values | merged cell |
//! |---|---|
//! | none | the caller's fill value |
//! | exactly one | that value |
//! | more than one | [`ReconcileError::ConflictingField`] |
//!
//! Placeholders never compete with data, so one source's `x` is completed by another
//! source's value. Two different values are never resolved heuristically.
//!
//! # Example
//!
//! ```
//! use citnet::{merge_rows, FieldValue, Sentinels, Table};
//!
//! let sentinels = Sentinels::default();
//! let batch = Table::from_text_rows(
//!     ["ref", "vol", "doi"],
//!     [["jones 1999 jgr", "12", "x"], ["jones 1999 jgr", "x", "10.1/j"]],
//!     &sentinels,
//! )
//! .unwrap();
//!
//! let merged = merge_rows(&batch, &["ref"], &sentinels, &FieldValue::Unknown).unwrap();
//! assert_eq!(merged.len(), 1);
//! assert_eq!(merged.value(0, "vol"), Some(&FieldValue::concrete("12")));
//! assert_eq!(merged.value(0, "doi"), Some(&FieldValue::concrete("10.1/j")));
//! ```

use crate::key::{group_by_key, key_token, row_key};
use crate::table::Table;
use crate::value::{FieldValue, Sentinels};
use crate::{ReconcileError, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A column holding more than one distinct concrete value under one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub key: String,
    pub column: String,
    /// The competing values, in order of first appearance.
    pub values: Vec<String>,
}

impl From<FieldConflict> for ReconcileError {
    fn from(conflict: FieldConflict) -> Self {
        ReconcileError::ConflictingField {
            key: conflict.key,
            column: conflict.column,
            values: conflict.values,
        }
    }
}

/// Collapses rows sharing a key into one row per key.
///
/// The output holds the batch's columns in their original order and one row per distinct
/// key, ordered by each key's first appearance. Key columns keep the values of the first
/// row of their group; rows that spell the same key with differently split key columns,
/// such as `van der` + `2000` and `van` + `der 2000`, conflict on the first such column.
///
/// # Errors
///
/// - [`ReconcileError::MissingKeyColumn`] if the batch lacks a key column
/// - [`ReconcileError::ConflictingField`] for the first column where rows sharing a key
///   disagree
pub fn merge_rows(
    batch: &Table,
    key_columns: &[impl AsRef<str>],
    sentinels: &Sentinels,
    fill: &FieldValue,
) -> Result<Table> {
    let key_index = batch.resolve_keys(key_columns)?;
    let keys: Vec<String> = batch.rows().map(|row| row_key(row, &key_index)).collect();
    merge_keyed(batch, &keys, &key_index, sentinels, fill)
}

/// Lists every conflict inside a batch without merging anything.
///
/// Use this to resolve all disagreements out of band before calling [`merge_rows`], which
/// stops at the first one.
///
/// # Errors
///
/// Returns [`ReconcileError::MissingKeyColumn`] if the batch lacks a key column.
pub fn find_conflicts(
    batch: &Table,
    key_columns: &[impl AsRef<str>],
    sentinels: &Sentinels,
) -> Result<Vec<FieldConflict>> {
    let key_index = batch.resolve_keys(key_columns)?;
    let keys: Vec<String> = batch.rows().map(|row| row_key(row, &key_index)).collect();
    let (order, groups) = group_by_key(keys.iter().enumerate());

    let mut conflicts = Vec::new();
    for key in order {
        let rows = &groups[key];
        if rows.len() < 2 {
            continue;
        }
        for (column, name) in batch.columns().iter().enumerate() {
            let resolution = if key_index.contains(&column) {
                resolve_key(batch, rows, column)
            } else {
                resolve(batch, rows, column, sentinels)
            };
            if let Resolution::Conflict(values) = resolution {
                conflicts.push(FieldConflict {
                    key: key.clone(),
                    column: name.clone(),
                    values,
                });
            }
        }
    }
    Ok(conflicts)
}

/// Merge over precomputed keys. Records use their key string, edges their endpoint pair.
pub(crate) fn merge_keyed<K>(
    table: &Table,
    keys: &[K],
    key_index: &[usize],
    sentinels: &Sentinels,
    fill: &FieldValue,
) -> Result<Table>
where
    K: Hash + Eq + fmt::Display,
{
    let (order, groups) = group_by_key(keys.iter().enumerate());
    let mut merged = Table::new(table.columns().iter().cloned())?;

    for key in order {
        let rows = &groups[key];
        let Some(first) = table.row(rows[0]) else {
            continue;
        };
        if rows.len() == 1 {
            merged.push_row(first.to_vec())?;
            continue;
        }

        let mut row = Vec::with_capacity(table.width());
        for (column, name) in table.columns().iter().enumerate() {
            let resolution = if key_index.contains(&column) {
                resolve_key(table, rows, column)
            } else {
                resolve(table, rows, column, sentinels)
            };
            let value = match resolution {
                Resolution::Fill => fill.clone(),
                Resolution::Value(value) => value,
                Resolution::Conflict(values) => {
                    return Err(FieldConflict {
                        key: key.to_string(),
                        column: name.clone(),
                        values,
                    }
                    .into());
                }
            };
            row.push(value);
        }
        merged.push_row(row)?;
    }

    Ok(merged)
}

enum Resolution {
    Fill,
    Value(FieldValue),
    Conflict(Vec<String>),
}

/// Key columns of one group must agree token for token; otherwise the rows only share a
/// key by the way their values were split.
fn resolve_key(table: &Table, rows: &[usize], column: usize) -> Resolution {
    let spellings: Vec<String> = rows
        .iter()
        .filter_map(|&row| table.row(row))
        .map(|row| key_token(&row[column]))
        .unique()
        .collect();
    if spellings.len() > 1 {
        return Resolution::Conflict(spellings);
    }
    match table.row(rows[0]) {
        Some(first) => Resolution::Value(first[column].clone()),
        None => Resolution::Fill,
    }
}

fn resolve(table: &Table, rows: &[usize], column: usize, sentinels: &Sentinels) -> Resolution {
    let values: Vec<&str> = rows
        .iter()
        .filter_map(|&row| table.row(row))
        .filter_map(|row| sentinels.concrete(&row[column]))
        .unique()
        .collect();
    match values.as_slice() {
        [] => Resolution::Fill,
        [value] => Resolution::Value(FieldValue::concrete(*value)),
        _ => Resolution::Conflict(values.iter().map(|v| v.to_string()).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_text_rows(
            columns.iter().copied(),
            rows.iter().map(|row| row.iter().copied()),
            &Sentinels::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_partial_observations_complement() {
        let batch = table(&["ref", "vol"], &[&["jones 1999 jgr", "12"], &["jones 1999 jgr", "x"]]);
        let merged = merge_rows(&batch, &["ref"], &Sentinels::default(), &FieldValue::Unknown)
            .unwrap();
        assert_eq!(merged, table(&["ref", "vol"], &[&["jones 1999 jgr", "12"]]));
    }

    #[test]
    fn test_conflicting_values_raise() {
        let batch = table(&["ref", "vol"], &[&["jones 1999 jgr", "12"], &["jones 1999 jgr", "13"]]);
        let result = merge_rows(&batch, &["ref"], &Sentinels::default(), &FieldValue::Unknown);
        assert_eq!(
            result,
            Err(ReconcileError::ConflictingField {
                key: "jones 1999 jgr".to_string(),
                column: "vol".to_string(),
                values: vec!["12".to_string(), "13".to_string()],
            })
        );
    }

    #[rstest]
    #[case(&["x", "?"], FieldValue::concrete("-"))]
    #[case(&["x", "x"], FieldValue::concrete("-"))]
    #[case(&["?", "12"], FieldValue::concrete("12"))]
    #[case(&["12", "12"], FieldValue::concrete("12"))]
    fn test_column_resolution(#[case] vols: &[&str], #[case] expected: FieldValue) {
        let batch = table(&["ref", "vol"], &[&["a 1 b", vols[0]], &["a 1 b", vols[1]]]);
        let merged = merge_rows(
            &batch,
            &["ref"],
            &Sentinels::default(),
            &FieldValue::concrete("-"),
        )
        .unwrap();
        assert_eq!(merged.value(0, "vol"), Some(&expected));
    }

    #[test]
    fn test_unique_rows_pass_through() {
        let batch = table(
            &["ref", "vol", "doi"],
            &[
                &["a 1 b", "?", "x"],
                &["c 2 d", "4", "x"],
                &["a 1 b", "?", "10.1/a"],
            ],
        );
        let merged = merge_rows(&batch, &["ref"], &Sentinels::default(), &FieldValue::Unknown)
            .unwrap();
        assert_eq!(
            merged,
            table(
                &["ref", "vol", "doi"],
                &[&["a 1 b", "x", "10.1/a"], &["c 2 d", "4", "x"]]
            )
        );
    }

    #[test]
    fn test_multi_column_key_keeps_key_columns() {
        let batch = table(
            &["fau", "yr", "pub", "vol"],
            &[
                &["smith", "2000", "icarus", "x"],
                &["smith", "2000", "icarus", "7"],
            ],
        );
        let merged = merge_rows(
            &batch,
            &["fau", "yr", "pub"],
            &Sentinels::default(),
            &FieldValue::Unknown,
        )
        .unwrap();
        assert_eq!(merged, table(&["fau", "yr", "pub", "vol"], &[&["smith", "2000", "icarus", "7"]]));
    }

    #[test]
    fn test_differently_split_key_columns_conflict() {
        let batch = table(
            &["fau", "yr", "vol"],
            &[&["van der", "2000", "x"], &["van", "der  2000", "4"]],
        );
        let expected = ReconcileError::ConflictingField {
            key: "van der 2000".to_string(),
            column: "fau".to_string(),
            values: vec!["van der".to_string(), "van".to_string()],
        };
        assert_eq!(
            merge_rows(&batch, &["fau", "yr"], &Sentinels::default(), &FieldValue::Unknown),
            Err(expected)
        );

        let conflicts = find_conflicts(&batch, &["fau", "yr"], &Sentinels::default()).unwrap();
        assert_eq!(
            conflicts.iter().map(|c| c.column.as_str()).collect::<Vec<_>>(),
            vec!["fau", "yr"]
        );
    }

    #[test]
    fn test_key_whitespace_is_not_a_conflict() {
        let batch = table(&["ref", "vol"], &[&["a 1 b", "x"], &["a  1 b", "4"]]);
        let merged = merge_rows(&batch, &["ref"], &Sentinels::default(), &FieldValue::Unknown)
            .unwrap();
        assert_eq!(merged, table(&["ref", "vol"], &[&["a 1 b", "4"]]));
    }

    #[test]
    fn test_extra_sentinel_does_not_conflict() {
        let batch = table(&["ref", "pub"], &[&["a 1 b", "n/a"], &["a 1 b", "icarus"]]);
        let sentinels = Sentinels::new().with_unknown("n/a");
        let merged = merge_rows(&batch, &["ref"], &sentinels, &FieldValue::Unknown).unwrap();
        assert_eq!(merged.value(0, "pub"), Some(&FieldValue::concrete("icarus")));
    }

    #[test]
    fn test_find_conflicts_lists_all() {
        let batch = table(
            &["ref", "vol", "pages"],
            &[
                &["a 1 b", "1", "10"],
                &["a 1 b", "2", "11"],
                &["c 2 d", "3", "x"],
                &["c 2 d", "3", "5"],
            ],
        );
        let conflicts = find_conflicts(&batch, &["ref"], &Sentinels::default()).unwrap();
        assert_eq!(
            conflicts.iter().map(|c| c.column.as_str()).collect::<Vec<_>>(),
            vec!["vol", "pages"]
        );
        assert!(conflicts.iter().all(|c| c.key == "a 1 b"));
    }

    #[test]
    fn test_missing_key_column() {
        let batch = table(&["vol"], &[&["1"]]);
        assert_eq!(
            merge_rows(&batch, &["ref"], &Sentinels::default(), &FieldValue::Unknown),
            Err(ReconcileError::MissingKeyColumn("ref".to_string()))
        );
    }
}
