//! Citation edges and the append-only edge store.
//!
//! An edge says "source cites target". Its endpoints are [`EdgeKey`]s that address a
//! document either by its row position in the document store or by its content key, and
//! one edge store uses a single [`AddressingMode`] throughout. An edge's identity is its
//! endpoint pair; any other columns of the edge table are metadata, reconciled with the same
//! placeholder rules as document fields.
//!
//! # Example
//!
//! ```
//! use citnet::{EdgeColumns, EdgeKey, EdgeStore, ImportConfig, Sentinels, Table};
//!
//! let mut store = EdgeStore::new(["page"]).unwrap();
//! let batch = Table::from_text_rows(
//!     ["src", "ref", "page"],
//!     [["smith 2000 icarus", "jones 1999 jgr", "4"]],
//!     &Sentinels::default(),
//! )
//! .unwrap();
//!
//! let columns = EdgeColumns::infer(&batch).unwrap();
//! let report = store.import(&batch, &columns, &ImportConfig::default()).unwrap();
//!
//! assert_eq!(report.appended, 1);
//! assert_eq!(
//!     store.targets_of(&EdgeKey::from("smith 2000 icarus")),
//!     vec![&EdgeKey::from("jones 1999 jgr")]
//! );
//! ```

use crate::compare::{GraphComparison, compare_edges, compare_graph};
use crate::config::ImportConfig;
use crate::merge::merge_keyed;
use crate::report::{ImportReport, Notice};
use crate::store::ImportPlan;
use crate::table::Table;
use crate::utils::{normalize_whitespace, parse_position};
use crate::value::{FieldValue, Sentinels};
use crate::{ReconcileError, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Column label of the citing document.
pub const SOURCE_COLUMN: &str = "src";
/// Column label of the cited document.
pub const TARGET_COLUMN: &str = "tgt";
/// Column label of a document key in a manually transcribed citation list.
pub const REF_COLUMN: &str = "ref";

/// How an edge endpoint addresses a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressingMode {
    /// By row position in the document store.
    Positional,
    /// By the document's content key.
    Content,
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressingMode::Positional => f.write_str("positional"),
            AddressingMode::Content => f.write_str("content"),
        }
    }
}

/// One endpoint of a citation edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKey {
    /// Row position of a document.
    Positional(usize),
    /// Content key of a document.
    Content(String),
}

impl EdgeKey {
    /// Reads an endpoint token. Plain digits address a row position; anything else is a
    /// content key, whitespace-normalized like derived keys.
    pub fn parse(token: &str) -> Self {
        match parse_position(token) {
            Some(position) => EdgeKey::Positional(position),
            None => EdgeKey::Content(normalize_whitespace(token)),
        }
    }

    /// Reads an endpoint from a cell; placeholders yield `None`.
    pub fn from_value(value: &FieldValue, sentinels: &Sentinels) -> Option<Self> {
        sentinels.concrete(value).map(Self::parse)
    }

    pub fn mode(&self) -> AddressingMode {
        match self {
            EdgeKey::Positional(_) => AddressingMode::Positional,
            EdgeKey::Content(_) => AddressingMode::Content,
        }
    }

    /// The cell value written into an edge table.
    pub fn to_field_value(&self) -> FieldValue {
        FieldValue::concrete(self.to_string())
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKey::Positional(position) => write!(f, "{position}"),
            EdgeKey::Content(key) => f.write_str(key),
        }
    }
}

impl From<usize> for EdgeKey {
    fn from(position: usize) -> Self {
        EdgeKey::Positional(position)
    }
}

impl From<&str> for EdgeKey {
    fn from(token: &str) -> Self {
        EdgeKey::parse(token)
    }
}

/// A directed citation: `source` cites `target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: EdgeKey,
    pub target: EdgeKey,
}

impl Edge {
    pub fn new(source: impl Into<EdgeKey>, target: impl Into<EdgeKey>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Reads the edge of one row; `None` if either endpoint is a placeholder.
    pub(crate) fn from_row(
        row: &[FieldValue],
        endpoints: &[usize],
        sentinels: &Sentinels,
    ) -> Option<Self> {
        Some(Self {
            source: EdgeKey::from_value(&row[endpoints[0]], sentinels)?,
            target: EdgeKey::from_value(&row[endpoints[1]], sentinels)?,
        })
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// The column labels holding an edge table's endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeColumns {
    pub source: String,
    pub target: String,
}

impl Default for EdgeColumns {
    fn default() -> Self {
        Self::new(SOURCE_COLUMN, TARGET_COLUMN)
    }
}

impl EdgeColumns {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Picks the endpoint columns of a batch from its labels.
    ///
    /// | labels present | source | target |
    /// |---|---|---|
    /// | `src`, `tgt` | `src` | `tgt` |
    /// | `src`, `ref` | `src` | `ref` |
    /// | `ref`, `tgt` | `ref` | `tgt` |
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidLinkColumns`] if fewer than two of the labels exist.
    pub fn infer(table: &Table) -> Result<Self> {
        let has = |label| table.has_column(label);
        let (source, target) = match (has(SOURCE_COLUMN), has(TARGET_COLUMN), has(REF_COLUMN)) {
            (true, true, _) => (SOURCE_COLUMN, TARGET_COLUMN),
            (true, false, true) => (SOURCE_COLUMN, REF_COLUMN),
            (false, true, true) => (REF_COLUMN, TARGET_COLUMN),
            _ => {
                return Err(ReconcileError::InvalidLinkColumns(format!(
                    "expected two of `{SOURCE_COLUMN}`, `{TARGET_COLUMN}`, `{REF_COLUMN}` but found [{}]",
                    table.columns().iter().join(", ")
                )));
            }
        };
        Ok(Self::new(source, target))
    }

    /// Renames this table's endpoint columns to the labels of `to`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MissingKeyColumn`] if an endpoint column is missing.
    pub fn align(&self, table: &Table, to: &EdgeColumns) -> Result<Table> {
        table.resolve_keys(&self.names())?;
        if self == to {
            return Ok(table.clone());
        }
        table.renamed(&[
            (self.source.as_str(), to.source.as_str()),
            (self.target.as_str(), to.target.as_str()),
        ])
    }

    /// The edge of every row, `None` where an endpoint is a placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MissingKeyColumn`] if an endpoint column is missing.
    pub fn edges(&self, table: &Table, sentinels: &Sentinels) -> Result<Vec<Option<Edge>>> {
        let endpoints = table.resolve_keys(&self.names())?;
        Ok(table
            .rows()
            .map(|row| Edge::from_row(row, &endpoints, sentinels))
            .collect())
    }

    pub(crate) fn names(&self) -> [&str; 2] {
        [self.source.as_str(), self.target.as_str()]
    }
}

/// Returns the single addressing mode of a set of edges, if any edge exists.
fn uniform_mode<'a>(edges: impl IntoIterator<Item = &'a Edge>) -> Result<Option<AddressingMode>> {
    let mut mode: Option<(AddressingMode, &EdgeKey)> = None;
    for endpoint in edges
        .into_iter()
        .flat_map(|edge| [&edge.source, &edge.target])
    {
        match mode {
            None => mode = Some((endpoint.mode(), endpoint)),
            Some((expected, first)) if expected != endpoint.mode() => {
                return Err(ReconcileError::MixedKeyAddressing(format!(
                    "`{first}` is {expected} but `{endpoint}` is {}",
                    endpoint.mode()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(mode.map(|(mode, _)| mode))
}

/// An append-only set of citation edges with optional metadata columns.
///
/// The endpoints sit in the columns named by the store's [`EdgeColumns`], at any position
/// in the table. Every row has two concrete endpoints, and no endpoint pair appears twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeStore {
    table: Table,
    columns: EdgeColumns,
    mode: Option<AddressingMode>,
    edges: Vec<Edge>,
    index: HashMap<Edge, usize>,
}

impl EdgeStore {
    /// Creates an empty store labelled `src`/`tgt` with the given metadata columns.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::DuplicateColumn`] if a metadata column repeats or reuses an
    /// endpoint label.
    pub fn new<I, S>(metadata: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = EdgeColumns::default();
        let labels = [columns.source.clone(), columns.target.clone()]
            .into_iter()
            .chain(metadata.into_iter().map(Into::into));
        Ok(Self {
            table: Table::new(labels)?,
            columns,
            mode: None,
            edges: Vec::new(),
            index: HashMap::new(),
        })
    }

    /// Restores a store from a settled edge table.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::MissingKeyColumn`] if an endpoint column is missing
    /// - [`ReconcileError::UnknownEndpoint`] if a row has a placeholder endpoint
    /// - [`ReconcileError::DuplicateKey`] if an edge appears twice
    /// - [`ReconcileError::MixedKeyAddressing`] if endpoints mix positions and content keys
    pub fn from_table(table: Table, columns: EdgeColumns, sentinels: &Sentinels) -> Result<Self> {
        table.validate()?;
        let mut edges = Vec::with_capacity(table.len());
        let mut index = HashMap::with_capacity(table.len());
        for (row, edge) in columns.edges(&table, sentinels)?.into_iter().enumerate() {
            let edge = edge
                .ok_or_else(|| ReconcileError::UnknownEndpoint(format!("edge row {row}")))?;
            if index.insert(edge.clone(), row).is_some() {
                return Err(ReconcileError::DuplicateKey(edge.to_string()));
            }
            edges.push(edge);
        }
        let mode = uniform_mode(&edges)?;
        Ok(Self {
            table,
            columns,
            mode,
            edges,
            index,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn columns(&self) -> &EdgeColumns {
        &self.columns
    }

    /// The addressing mode of the stored edges; `None` while the store is empty.
    pub fn mode(&self) -> Option<AddressingMode> {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// All edges, in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn contains(&self, edge: &Edge) -> bool {
        self.index.contains_key(edge)
    }

    /// Row position of an edge.
    pub fn position(&self, edge: &Edge) -> Option<usize> {
        self.index.get(edge).copied()
    }

    /// Documents cited by `source`, in insertion order.
    pub fn targets_of(&self, source: &EdgeKey) -> Vec<&EdgeKey> {
        self.edges
            .iter()
            .filter(|edge| edge.source == *source)
            .map(|edge| &edge.target)
            .collect()
    }

    /// Documents citing `target`, in insertion order.
    pub fn sources_of(&self, target: &EdgeKey) -> Vec<&EdgeKey> {
        self.edges
            .iter()
            .filter(|edge| edge.target == *target)
            .map(|edge| &edge.source)
            .collect()
    }

    /// Compares a batch with the stored edges without importing it.
    pub fn compare(
        &self,
        batch: &Table,
        batch_columns: &EdgeColumns,
        sentinels: &Sentinels,
    ) -> Result<GraphComparison> {
        compare_graph(&self.table, &self.columns, batch, batch_columns, sentinels)
    }

    /// Imports a batch of edges.
    ///
    /// Rows with a placeholder endpoint are dropped. Duplicate edges in the batch are merged,
    /// metadata of edges already stored is completed where the store holds placeholders, and
    /// new edges are appended. A batch that adds targets to a known source is accepted and
    /// reported; no stored edge is ever removed.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::MissingKeyColumn`] if an endpoint column is missing
    /// - [`ReconcileError::MixedKeyAddressing`] if the batch mixes positions and content keys,
    ///   or uses a different mode than the stored edges
    /// - [`ReconcileError::ConflictingField`] if duplicate batch edges disagree on metadata
    /// - [`ReconcileError::InconsistentImport`] if a batch edge disagrees with the stored one
    ///
    /// On error the store is unchanged.
    pub fn import(
        &mut self,
        batch: &Table,
        batch_columns: &EdgeColumns,
        config: &ImportConfig,
    ) -> Result<ImportReport> {
        let sentinels = config.sentinels();
        if batch.is_empty() {
            info!("Edge batch is empty, nothing to import");
            return Ok(ImportReport::empty_batch());
        }

        let batch = batch_columns.align(batch, &self.columns)?;
        batch.resolve_keys(&self.columns.names())?;
        let ignored: Vec<&String> = batch
            .columns()
            .iter()
            .filter(|column| !self.table.has_column(column))
            .collect();
        if !ignored.is_empty() {
            debug!("Ignoring edge columns not in the store: {}", ignored.iter().join(", "));
        }
        let batch = batch.conform(self.table.columns(), config.fill());

        let mut report = ImportReport::default();
        let mut complete = Vec::with_capacity(batch.len());
        let mut batch_edges = Vec::with_capacity(batch.len());
        for (row, edge) in self.columns.edges(&batch, sentinels)?.into_iter().enumerate() {
            if let Some(edge) = edge {
                complete.push(row);
                batch_edges.push(edge);
            }
        }
        let dropped = batch.len() - complete.len();
        if dropped > 0 {
            warn!("Dropping {dropped} edge rows with a placeholder endpoint");
            report
                .notices
                .push(Notice::DroppedIncompleteEdges { count: dropped });
        }
        let batch = batch.select_rows(&complete);

        let batch_mode = uniform_mode(&batch_edges)?;
        if let (Some(stored), Some(incoming)) = (self.mode, batch_mode) {
            if stored != incoming {
                warn!("Rejecting {incoming} edge batch for a {stored} edge store");
                return Err(ReconcileError::MixedKeyAddressing(format!(
                    "store uses {stored} endpoints but the batch uses {incoming} endpoints"
                )));
            }
        }

        let endpoints = batch.resolve_keys(&self.columns.names())?;
        let merged = merge_keyed(&batch, &batch_edges, &endpoints, sentinels, config.fill())?;
        report.merged_duplicates = batch.len() - merged.len();
        if report.merged_duplicates > 0 {
            debug!("Merged {} duplicate edges", report.merged_duplicates);
        }
        let merged_edges: Vec<Option<Edge>> = self.columns.edges(&merged, sentinels)?;

        let stored_edges: Vec<Option<Edge>> = self.edges.iter().cloned().map(Some).collect();
        let comparison = compare_edges(
            &self.table,
            &stored_edges,
            &merged,
            &merged_edges,
            &self.columns.names(),
            sentinels,
        )?;
        if !comparison.is_consistent() {
            warn!(
                "Rejecting edge batch: {} metadata mismatches",
                comparison.data.mismatches.len()
            );
            return Err(ReconcileError::InconsistentImport(Box::new(comparison.data)));
        }
        let endpoints_report = comparison.endpoints;
        if !endpoints_report.additive_sources.is_empty() {
            info!(
                "Edge batch adds targets for {} existing sources",
                endpoints_report.additive_sources.len()
            );
            report.notices.push(Notice::AdditiveTargets {
                sources: endpoints_report.additive_sources,
            });
        }
        if !endpoints_report.omitting_sources.is_empty() {
            debug!(
                "Edge batch omits stored targets for {} sources",
                endpoints_report.omitting_sources.len()
            );
            report.notices.push(Notice::OmittedTargets {
                sources: endpoints_report.omitting_sources,
            });
        }

        let plan = ImportPlan::new(
            &self.table,
            &merged,
            merged_edges.into_iter().flatten(),
            |edge| self.index.get(edge).copied(),
            &endpoints,
            config,
        );
        let applied = plan.apply(&mut self.table, |edge, row| {
            self.index.insert(edge.clone(), row);
            self.edges.push(edge);
        })?;
        if self.mode.is_none() {
            self.mode = batch_mode;
        }

        report.patched_rows = applied.patched_rows;
        report.patched_fields = applied.patched_fields;
        report.appended = applied.appended;
        debug!(
            "Imported edges: {} appended, {} rows patched",
            report.appended, report.patched_rows
        );
        Ok(report)
    }
}
