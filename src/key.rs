//! Content-derived record identity.
//!
//! A record's key is built from its designated key columns: every key value is trimmed and
//! its internal whitespace collapsed, then the values are joined with single spaces in the
//! declared key-column order. Placeholders contribute their token (`x`, `?`), never an empty
//! string, so a partially known identity still produces a stable key.
//!
//! ```
//! use citnet::{derive_key, Record};
//!
//! let record = Record::new()
//!     .with("fau", "smith")
//!     .with("yr", "2000")
//!     .with("pub", " icarus ");
//!
//! let key = derive_key(&record, &["fau", "yr", "pub"]).unwrap();
//! assert_eq!(key, "smith 2000 icarus");
//! ```

use crate::table::{Record, Table};
use crate::utils::normalize_whitespace;
use crate::value::{FieldValue, Sentinels, UNKNOWN_TOKEN};
use crate::{ReconcileError, Result};
use itertools::Itertools;
use std::collections::HashMap;
use std::hash::Hash;

/// Derives the key of a record from its key columns.
///
/// # Errors
///
/// Returns [`ReconcileError::MissingKeyColumn`] if the record lacks one of the key columns.
pub fn derive_key(record: &Record, key_columns: &[impl AsRef<str>]) -> Result<String> {
    let values = key_columns
        .iter()
        .map(|column| {
            record
                .get(column.as_ref())
                .ok_or_else(|| ReconcileError::MissingKeyColumn(column.as_ref().to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(join_key(values))
}

/// Derives the key of every row in a table, in row order.
///
/// # Errors
///
/// Returns [`ReconcileError::MissingKeyColumn`] if the table lacks one of the key columns.
pub fn table_keys(table: &Table, key_columns: &[impl AsRef<str>]) -> Result<Vec<String>> {
    let key_index = table.resolve_keys(key_columns)?;
    Ok(table.rows().map(|row| row_key(row, &key_index)).collect())
}

/// Returns a copy of `table` with an extra column holding each row's key.
///
/// Parsers that supply the identity fields separately (author, year, journal, ...) use this
/// to give a batch the single key column a store is keyed on.
///
/// # Errors
///
/// Returns [`ReconcileError::MissingKeyColumn`] for a missing key column and
/// [`ReconcileError::DuplicateColumn`] if `name` already exists.
pub fn add_key_column(table: &Table, key_columns: &[impl AsRef<str>], name: &str) -> Result<Table> {
    let keys = table_keys(table, key_columns)?;
    let mut columns = table.columns().to_vec();
    columns.push(name.to_string());
    let rows = table.rows().zip(keys).map(|(row, key)| {
        let mut row = row.to_vec();
        row.push(FieldValue::concrete(key));
        row
    });
    Table::from_rows(columns, rows)
}

/// Splits a key back into its key columns.
///
/// Only keys whose values are single tokens can be split unambiguously, so this returns
/// `None` unless the key has exactly one whitespace-separated token per key column.
pub fn expand_key(
    key: &str,
    key_columns: &[impl AsRef<str>],
    sentinels: &Sentinels,
) -> Option<Record> {
    let tokens: Vec<&str> = key.split_whitespace().collect();
    if tokens.len() != key_columns.len() {
        return None;
    }
    Some(
        key_columns
            .iter()
            .zip(tokens)
            .map(|(column, token)| (column.as_ref().to_string(), sentinels.classify(token)))
            .collect(),
    )
}

/// Key of one row given the resolved key column indices.
pub(crate) fn row_key(row: &[FieldValue], key_index: &[usize]) -> String {
    join_key(key_index.iter().map(|&i| &row[i]))
}

/// True if every key column of the row is a placeholder.
pub(crate) fn is_keyless(row: &[FieldValue], key_index: &[usize], sentinels: &Sentinels) -> bool {
    key_index.iter().all(|&i| sentinels.is_special(&row[i]))
}

/// Groups row indices by key. Keys are returned in order of first appearance.
pub(crate) fn group_by_key<'a, K, I>(keys: I) -> (Vec<&'a K>, HashMap<&'a K, Vec<usize>>)
where
    K: Hash + Eq + 'a,
    I: IntoIterator<Item = (usize, &'a K)>,
{
    let mut order = Vec::new();
    let mut groups: HashMap<&K, Vec<usize>> = HashMap::new();
    for (row, key) in keys {
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }
    (order, groups)
}

fn join_key<'a>(values: impl IntoIterator<Item = &'a FieldValue>) -> String {
    values.into_iter().map(key_token).join(" ")
}

/// The token a value contributes to a key.
pub(crate) fn key_token(value: &FieldValue) -> String {
    let token = normalize_whitespace(value.as_str());
    if token.is_empty() {
        UNKNOWN_TOKEN.to_string()
    } else {
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(&["smith", "2000", "icarus"], "smith 2000 icarus")]
    #[case(&["smith", "x", "icarus"], "smith x icarus")]
    #[case(&["smith", "?", "icarus"], "smith ? icarus")]
    #[case(&["van  der berg", "2000", "icarus"], "van der berg 2000 icarus")]
    fn test_derive_key(#[case] values: &[&str], #[case] expected: &str) {
        let columns = ["fau", "yr", "pub"];
        let record: Record = columns.iter().copied().zip(values.iter().copied()).collect();
        assert_eq!(derive_key(&record, &columns).unwrap(), expected);
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let record = Record::new().with("ref", "jones 1999 jgr").with("vol", "12");
        let first = derive_key(&record, &["ref"]).unwrap();
        let second = derive_key(&record.clone(), &["ref"]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_key_follows_declared_column_order() {
        let record = Record::new().with("yr", "2000").with("fau", "smith");
        assert_eq!(derive_key(&record, &["fau", "yr"]).unwrap(), "smith 2000");
    }

    #[test]
    fn test_unclassified_empty_value_contributes_token() {
        let record = Record::new()
            .with("fau", FieldValue::concrete(""))
            .with("yr", "2000");
        assert_eq!(derive_key(&record, &["fau", "yr"]).unwrap(), "x 2000");
    }

    #[test]
    fn test_missing_key_column() {
        let record = Record::new().with("fau", "smith");
        assert_eq!(
            derive_key(&record, &["fau", "yr"]),
            Err(ReconcileError::MissingKeyColumn("yr".to_string()))
        );
    }

    #[test]
    fn test_add_key_column() {
        let table = Table::from_text_rows(
            ["fau", "yr", "pub", "doi"],
            [["smith", "2000", "icarus", "x"], ["jones", "1999", "jgr", "10.1/abc"]],
            &Sentinels::default(),
        )
        .unwrap();
        let keyed = add_key_column(&table, &["fau", "yr", "pub"], "ref").unwrap();
        assert_eq!(keyed.columns(), &["fau", "yr", "pub", "doi", "ref"]);
        assert_eq!(
            keyed.value(1, "ref"),
            Some(&FieldValue::concrete("jones 1999 jgr"))
        );
        assert!(add_key_column(&keyed, &["fau"], "ref").is_err());
    }

    #[test]
    fn test_expand_key() {
        let sentinels = Sentinels::default();
        let record = expand_key("smith x icarus", &["fau", "yr", "pub"], &sentinels).unwrap();
        assert_eq!(record.get("fau"), Some(&FieldValue::concrete("smith")));
        assert_eq!(record.get("yr"), Some(&FieldValue::Unknown));
        assert_eq!(expand_key("smith icarus", &["fau", "yr", "pub"], &sentinels), None);
    }

    #[test]
    fn test_table_keys() {
        let table = Table::from_text_rows(
            ["ref", "vol"],
            [["jones  1999 jgr", "12"], ["smith 2000 icarus", "x"]],
            &Sentinels::default(),
        )
        .unwrap();
        assert_eq!(
            table_keys(&table, &["ref"]).unwrap(),
            vec!["jones 1999 jgr", "smith 2000 icarus"]
        );
    }
}
