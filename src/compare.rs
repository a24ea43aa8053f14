//! Consistency checks between a store and an incoming batch.
//!
//! Two rows with the same key agree on a column unless both carry data and the texts
//! differ; a placeholder on either side never counts against consistency. The comparator
//! only reports: it never resolves a mismatch, and the rows involved are returned verbatim
//! so the caller can fix the sources out of band.
//!
//! # Example
//!
//! ```
//! use citnet::{compare_overlap, Sentinels, Table};
//!
//! let sentinels = Sentinels::default();
//! let store = Table::from_text_rows(["ref", "vol"], [["jones 1999 jgr", "12"]], &sentinels).unwrap();
//! let batch = Table::from_text_rows(["ref", "vol"], [["jones 1999 jgr", "13"]], &sentinels).unwrap();
//!
//! let comparison = compare_overlap(&store, &batch, &["ref"], &sentinels).unwrap();
//! assert!(!comparison.is_consistent());
//! assert_eq!(comparison.mismatches[0].column, "vol");
//! ```

use crate::edges::{Edge, EdgeColumns, EdgeKey};
use crate::key::{group_by_key, table_keys};
use crate::table::Table;
use crate::value::{FieldValue, Sentinels};
use crate::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

/// Which side of a comparison a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Store,
    Batch,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Store => f.write_str("store"),
            Side::Batch => f.write_str("batch"),
        }
    }
}

/// A column where both sides carry data and disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub key: String,
    pub column: String,
    pub store_value: FieldValue,
    pub batch_value: FieldValue,
}

/// A key present on both sides, with the row holding it on each side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapPair {
    pub key: String,
    pub store_row: usize,
    pub batch_row: usize,
}

/// Result of comparing the overlapping rows of a store and a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    /// Keys found on both sides, in batch order.
    pub overlap: Vec<OverlapPair>,
    /// Every disagreeing column of every overlapping key.
    pub mismatches: Vec<Mismatch>,
    /// Store rows with at least one mismatch, projected onto the shared columns.
    pub store_rows: Table,
    /// Batch rows with at least one mismatch, projected onto the shared columns.
    pub batch_rows: Table,
}

impl Comparison {
    /// True when no shared column disagrees.
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compares the rows of `store` and `batch` that share a key.
///
/// Only columns present in both tables are compared. Rows repeated verbatim under one key
/// count once.
///
/// # Errors
///
/// - [`ReconcileError::MissingKeyColumn`] if either table lacks a key column
/// - [`ReconcileError::DuplicateKeyInOverlap`] if either side holds differing rows for an
///   overlapping key
pub fn compare_overlap(
    store: &Table,
    batch: &Table,
    key_columns: &[impl AsRef<str>],
    sentinels: &Sentinels,
) -> Result<Comparison> {
    let store_keys: Vec<Option<String>> = table_keys(store, key_columns)?
        .into_iter()
        .map(Some)
        .collect();
    let batch_keys: Vec<Option<String>> = table_keys(batch, key_columns)?
        .into_iter()
        .map(Some)
        .collect();
    compare_keyed(store, &store_keys, batch, &batch_keys, key_columns, sentinels)
}

/// Keyed comparison shared by records and edges. Rows with a `None` key are ignored, and
/// key columns are not compared since equal keys may differ in whitespace.
pub(crate) fn compare_keyed<K>(
    store: &Table,
    store_keys: &[Option<K>],
    batch: &Table,
    batch_keys: &[Option<K>],
    key_columns: &[impl AsRef<str>],
    sentinels: &Sentinels,
) -> Result<Comparison>
where
    K: Hash + Eq + fmt::Display,
{
    let shared: Vec<(usize, usize)> = store
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(s, column)| batch.column_index(column).map(|b| (s, b)))
        .collect();
    let shared_names: Vec<&str> = shared
        .iter()
        .map(|&(s, _)| store.columns()[s].as_str())
        .collect();
    let store_columns: Vec<usize> = shared.iter().map(|&(s, _)| s).collect();
    let batch_columns: Vec<usize> = shared.iter().map(|&(_, b)| b).collect();
    let compared: Vec<usize> = (0..shared.len())
        .filter(|&i| !key_columns.iter().any(|k| k.as_ref() == shared_names[i]))
        .collect();
    let store_compared: Vec<usize> = compared.iter().map(|&i| shared[i].0).collect();
    let batch_compared: Vec<usize> = compared.iter().map(|&i| shared[i].1).collect();

    let (_, store_groups) = group_by_key(present(store_keys));
    let (batch_order, batch_groups) = group_by_key(present(batch_keys));

    let mut comparison = Comparison {
        store_rows: Table::new(shared_names.iter().copied())?,
        batch_rows: Table::new(shared_names.iter().copied())?,
        ..Default::default()
    };

    for key in batch_order {
        let Some(store_group) = store_groups.get(key) else {
            continue;
        };
        let store_row = representative(store, store_group, &store_compared, key, Side::Store)?;
        let batch_row =
            representative(batch, &batch_groups[key], &batch_compared, key, Side::Batch)?;
        let (Some(store_values), Some(batch_values)) = (store.row(store_row), batch.row(batch_row))
        else {
            continue;
        };

        let mut mismatched = false;
        for &i in &compared {
            let (s, b) = shared[i];
            let column = shared_names[i];
            if !sentinels.agree(&store_values[s], &batch_values[b]) {
                mismatched = true;
                comparison.mismatches.push(Mismatch {
                    key: key.to_string(),
                    column: column.to_string(),
                    store_value: store_values[s].clone(),
                    batch_value: batch_values[b].clone(),
                });
            }
        }
        if mismatched {
            comparison
                .store_rows
                .push_row(store_columns.iter().map(|&s| store_values[s].clone()).collect())?;
            comparison
                .batch_rows
                .push_row(batch_columns.iter().map(|&b| batch_values[b].clone()).collect())?;
        }

        comparison.overlap.push(OverlapPair {
            key: key.to_string(),
            store_row,
            batch_row,
        });
    }

    Ok(comparison)
}

fn present<K>(keys: &[Option<K>]) -> impl Iterator<Item = (usize, &K)> {
    keys.iter()
        .enumerate()
        .filter_map(|(row, key)| key.as_ref().map(|key| (row, key)))
}

/// Picks the row standing for `key` on one side, requiring all of its rows to be identical
/// on the compared columns.
fn representative<K: fmt::Display>(
    table: &Table,
    rows: &[usize],
    columns: &[usize],
    key: &K,
    side: Side,
) -> Result<usize> {
    let first = rows[0];
    let Some(first_values) = table.row(first) else {
        return Ok(first);
    };
    let differs = rows[1..].iter().filter_map(|&r| table.row(r)).any(|values| {
        columns
            .iter()
            .any(|&column| values[column] != first_values[column])
    });
    if differs {
        return Err(ReconcileError::DuplicateKeyInOverlap {
            key: key.to_string(),
            side,
        });
    }
    Ok(first)
}

/// How the target sets of shared sources differ between the edge store and a batch.
///
/// These differences are informational: a batch may add targets to a source (the store
/// will hold the union), and a batch that lists fewer targets never deletes recorded edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointComparison {
    /// True when every source present on both sides has the same target set.
    pub target_sets_match: bool,
    /// Sources for which the batch adds targets the store lacks.
    pub additive_sources: Vec<EdgeKey>,
    /// Sources for which the batch lists fewer targets than the store holds.
    pub omitting_sources: Vec<EdgeKey>,
    /// Store edges whose target the batch does not list for a shared source.
    pub store_only: Table,
    /// Batch edges adding a new target to a shared source.
    pub batch_only: Table,
}

/// Result of comparing an edge store with an edge batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphComparison {
    /// Informational target-set differences.
    pub endpoints: EndpointComparison,
    /// Metadata comparison of edges present on both sides. Mismatches here are fatal for
    /// an import.
    pub data: Comparison,
}

impl GraphComparison {
    pub fn is_consistent(&self) -> bool {
        self.data.is_consistent()
    }
}

/// Compares an edge table with an edge batch.
///
/// The batch's endpoint columns are mapped onto the store's before comparing, so a batch
/// labelled `src`/`ref` can be compared with a store labelled `src`/`tgt`. Rows with a
/// placeholder endpoint take no part.
///
/// # Errors
///
/// - [`ReconcileError::MissingKeyColumn`] if an endpoint column is missing
/// - [`ReconcileError::DuplicateKeyInOverlap`] if one side holds differing rows for the same
///   edge
pub fn compare_graph(
    store: &Table,
    store_columns: &EdgeColumns,
    batch: &Table,
    batch_columns: &EdgeColumns,
    sentinels: &Sentinels,
) -> Result<GraphComparison> {
    let batch = batch_columns.align(batch, store_columns)?;
    let store_edges = store_columns.edges(store, sentinels)?;
    let batch_edges = store_columns.edges(&batch, sentinels)?;
    compare_edges(
        store,
        &store_edges,
        &batch,
        &batch_edges,
        &store_columns.names(),
        sentinels,
    )
}

/// Graph comparison over tables that already share endpoint column names.
pub(crate) fn compare_edges(
    store: &Table,
    store_edges: &[Option<Edge>],
    batch: &Table,
    batch_edges: &[Option<Edge>],
    endpoint_columns: &[&str],
    sentinels: &Sentinels,
) -> Result<GraphComparison> {
    let store_targets = targets_by_source(store_edges);
    let batch_targets = targets_by_source(batch_edges);

    let mut additive_sources = Vec::new();
    let mut omitting_sources = Vec::new();
    for (source, batch_set) in &batch_targets {
        let Some(store_set) = store_targets.get(source) else {
            continue;
        };
        if batch_set.difference(store_set).next().is_some() {
            additive_sources.push((*source).clone());
        }
        if store_set.difference(batch_set).next().is_some() {
            omitting_sources.push((*source).clone());
        }
    }

    let store_only = unmatched_rows(store_edges, &batch_targets);
    let batch_only = unmatched_rows(batch_edges, &store_targets);

    let endpoints = EndpointComparison {
        target_sets_match: additive_sources.is_empty() && omitting_sources.is_empty(),
        additive_sources,
        omitting_sources,
        store_only: store.select_rows(&store_only),
        batch_only: batch.select_rows(&batch_only),
    };
    let data = compare_keyed(store, store_edges, batch, batch_edges, endpoint_columns, sentinels)?;

    Ok(GraphComparison { endpoints, data })
}

fn targets_by_source(edges: &[Option<Edge>]) -> BTreeMap<&EdgeKey, BTreeSet<&EdgeKey>> {
    let mut targets: BTreeMap<&EdgeKey, BTreeSet<&EdgeKey>> = BTreeMap::new();
    for edge in edges.iter().flatten() {
        targets.entry(&edge.source).or_default().insert(&edge.target);
    }
    targets
}

/// Rows whose source appears in `other` but whose target does not.
fn unmatched_rows(
    edges: &[Option<Edge>],
    other: &BTreeMap<&EdgeKey, BTreeSet<&EdgeKey>>,
) -> Vec<usize> {
    edges
        .iter()
        .enumerate()
        .filter_map(|(row, edge)| {
            let edge = edge.as_ref()?;
            let targets = other.get(&edge.source)?;
            (!targets.contains(&edge.target)).then_some(row)
        })
        .collect()
}

/// Counts mismatches per column; handy when reporting an inconsistent import.
pub fn mismatch_counts(comparison: &Comparison) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for mismatch in &comparison.mismatches {
        *counts.entry(mismatch.column.as_str()).or_insert(0) += 1;
    }
    counts
}
