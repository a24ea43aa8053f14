//! The citation network aggregate.
//!
//! [`CitationNetwork`] owns the document store and the edge store and is the single place
//! both are mutated. It carries a default [`ImportConfig`] used by every import made
//! through it.
//!
//! Imports are synchronous and take `&mut self`, so one network has one writer at a time.
//! Share it across threads behind a lock.
//!
//! # Example
//!
//! ```
//! use citnet::{CitationNetwork, EdgeKey, Link, Record, Sentinels, Table};
//!
//! let sentinels = Sentinels::default();
//! let mut network = CitationNetwork::with_schema(["ref", "doi"], ["ref"]).unwrap();
//!
//! let documents = Table::from_text_rows(
//!     ["ref", "doi"],
//!     [["smith 2000 icarus", "x"], ["jones 1999 jgr", "10.1/j"]],
//!     &sentinels,
//! )
//! .unwrap();
//! network.import_documents(&documents).unwrap();
//!
//! // A record fetched for a reference found in document 0.
//! let fetched = Record::new().with("ref", "brown 2005 nature").with("doi", "10.3/b");
//! let update = network
//!     .update_entry(&fetched, Some(Link::CitedBy(EdgeKey::Positional(0))))
//!     .unwrap();
//!
//! assert_eq!(update.position, 2);
//! assert_eq!(network.citations().len(), 1);
//! assert_eq!(network.orphans(), vec![1]);
//! ```

use crate::config::ImportConfig;
use crate::edges::{AddressingMode, Edge, EdgeColumns, EdgeKey, EdgeStore};
use crate::key::derive_key;
use crate::report::ImportReport;
use crate::store::RecordStore;
use crate::table::{Record, Table};
use crate::{ReconcileError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Direction of the citation attached by [`CitationNetwork::update_entry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Link {
    /// The given document cites the entry.
    CitedBy(EdgeKey),
    /// The entry cites the given document.
    Cites(EdgeKey),
}

/// Outcome of [`CitationNetwork::update_entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryUpdate {
    /// Row position of the entry in the document store.
    pub position: usize,
    pub document: ImportReport,
    /// Present when a link was requested.
    pub citation: Option<ImportReport>,
}

/// Whole-network state for persistence adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub documents: Table,
    pub key_columns: Vec<String>,
    pub citations: Table,
    pub citation_columns: EdgeColumns,
}

/// A bibliography and its citation graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationNetwork {
    documents: RecordStore,
    citations: EdgeStore,
    config: ImportConfig,
}

impl CitationNetwork {
    pub fn new(documents: RecordStore, citations: EdgeStore) -> Self {
        Self {
            documents,
            citations,
            config: ImportConfig::default(),
        }
    }

    /// Creates an empty network whose edges carry no metadata columns.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::new`].
    pub fn with_schema<I, S, K, T>(columns: I, key_columns: K) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        K: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Ok(Self::new(
            RecordStore::new(columns, key_columns)?,
            EdgeStore::new(Vec::<String>::new())?,
        ))
    }

    /// Sets the configuration used by imports made through the network.
    #[must_use]
    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn documents(&self) -> &RecordStore {
        &self.documents
    }

    pub fn citations(&self) -> &EdgeStore {
        &self.citations
    }

    /// Imports document rows. See [`RecordStore::import`].
    pub fn import_documents(&mut self, batch: &Table) -> Result<ImportReport> {
        self.documents.import(batch, &self.config)
    }

    /// Imports citation rows, reading the endpoint columns from the batch labels.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::InvalidLinkColumns`] if the labels name no endpoint pair, and the
    /// errors of [`EdgeStore::import`].
    pub fn import_citations(&mut self, batch: &Table) -> Result<ImportReport> {
        let columns = EdgeColumns::infer(batch)?;
        self.import_citations_with(batch, &columns)
    }

    /// Imports citation rows whose endpoints are in the given columns.
    pub fn import_citations_with(
        &mut self,
        batch: &Table,
        columns: &EdgeColumns,
    ) -> Result<ImportReport> {
        self.citations.import(batch, columns, &self.config)
    }

    /// Imports one document and optionally links it to a document already in the store.
    ///
    /// This is the entry point for metadata-fetch clients: the fetched record is merged
    /// into the store like a one-row batch, then the citation between the entry and the
    /// originating document is added in the edge store's addressing mode. Columns the
    /// store does not know are ignored.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::MissingKeyColumn`] if the record lacks a key column
    /// - [`ReconcileError::UnknownEndpoint`] if the linked document is not in the store, or
    ///   the record has no usable key while a link was requested
    /// - the errors of [`RecordStore::import`]
    ///
    /// Nothing changes if the linked document cannot be found.
    pub fn update_entry(&mut self, record: &Record, link: Option<Link>) -> Result<EntryUpdate> {
        let key = derive_key(record, self.documents.key_columns())?;
        let origin = match &link {
            Some(Link::CitedBy(other) | Link::Cites(other)) => Some(self.locate(other)?),
            None => None,
        };

        let mut record = record.clone();
        record.retain_columns(|column| self.documents.table().has_column(column));
        let batch = Table::from_records(
            self.documents.columns().iter().cloned(),
            [&record],
            self.config.fill(),
        )?;
        let document = self.import_documents(&batch)?;
        let position = self
            .documents
            .position(&key)
            .ok_or_else(|| ReconcileError::UnknownEndpoint(key.clone()))?;

        let citation = match (link, origin) {
            (Some(link), Some(origin)) => {
                let mode = self.citations.mode().unwrap_or(AddressingMode::Content);
                let entry = self.endpoint(position, mode)?;
                let other = self.endpoint(origin, mode)?;
                let edge = match link {
                    Link::CitedBy(_) => Edge {
                        source: other,
                        target: entry,
                    },
                    Link::Cites(_) => Edge {
                        source: entry,
                        target: other,
                    },
                };
                debug!("Linking entry `{key}`: {edge}");
                Some(self.import_edge(&edge)?)
            }
            _ => None,
        };

        Ok(EntryUpdate {
            position,
            document,
            citation,
        })
    }

    /// Positions of documents that no edge touches.
    pub fn orphans(&self) -> Vec<usize> {
        let linked: HashSet<usize> = self
            .citations
            .edges()
            .iter()
            .flat_map(|edge| [&edge.source, &edge.target])
            .filter_map(|endpoint| self.locate(endpoint).ok())
            .collect();
        (0..self.documents.len())
            .filter(|position| !linked.contains(position))
            .collect()
    }

    /// Copies the network's state for persistence.
    pub fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            documents: self.documents.table().clone(),
            key_columns: self.documents.key_columns().to_vec(),
            citations: self.citations.table().clone(),
            citation_columns: self.citations.columns().clone(),
        }
    }

    /// Restores a network from a snapshot, re-checking every store invariant.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::from_table`] and [`EdgeStore::from_table`].
    pub fn from_snapshot(snapshot: NetworkSnapshot, config: ImportConfig) -> Result<Self> {
        let documents = RecordStore::from_table(snapshot.documents, snapshot.key_columns)?;
        let citations = EdgeStore::from_table(
            snapshot.citations,
            snapshot.citation_columns,
            config.sentinels(),
        )?;
        Ok(Self::new(documents, citations).with_config(config))
    }

    /// Row position of the document an endpoint refers to.
    fn locate(&self, endpoint: &EdgeKey) -> Result<usize> {
        let position = match endpoint {
            EdgeKey::Positional(position) => {
                Some(*position).filter(|&position| position < self.documents.len())
            }
            EdgeKey::Content(key) => self.documents.position(key),
        };
        position.ok_or_else(|| ReconcileError::UnknownEndpoint(endpoint.to_string()))
    }

    fn endpoint(&self, position: usize, mode: AddressingMode) -> Result<EdgeKey> {
        match mode {
            AddressingMode::Positional => Ok(EdgeKey::Positional(position)),
            AddressingMode::Content => self
                .documents
                .key_of(position)
                .map(|key| EdgeKey::Content(key.to_string()))
                .ok_or_else(|| ReconcileError::UnknownEndpoint(position.to_string())),
        }
    }

    fn import_edge(&mut self, edge: &Edge) -> Result<ImportReport> {
        let columns = self.citations.columns().clone();
        let batch = Table::from_rows(
            [columns.source.clone(), columns.target.clone()],
            [vec![edge.source.to_field_value(), edge.target.to_field_value()]],
        )?;
        self.import_citations_with(&batch, &columns)
    }
}
