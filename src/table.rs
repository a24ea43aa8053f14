//! Column-schema tables and ordered records.
//!
//! A [`Table`] is the unit every reconciliation operation works on: the settled rows of a
//! store, an import batch handed over by a parser, or the consolidated output of
//! [`merge_rows`](crate::merge_rows). Every row holds exactly one [`FieldValue`] per column.
//!
//! A [`Record`] is an ordered column → value map for a single document, used where rows
//! arrive one at a time (for example from a metadata-fetch client).
//!
//! # Example
//!
//! ```
//! use citnet::{FieldValue, Sentinels, Table};
//!
//! let table = Table::from_text_rows(
//!     ["ref", "vol"],
//!     [["jones 1999 jgr", "12"], ["smith 2000 icarus", "x"]],
//!     &Sentinels::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(table.len(), 2);
//! assert_eq!(table.value(1, "vol"), Some(&FieldValue::Unknown));
//! ```

use crate::value::{FieldValue, Sentinels};
use crate::{ReconcileError, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Rows of field values sharing one ordered column schema.
///
/// Deserializing checks the same shape rules as the constructors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<FieldValue>>,
}

/// Unchecked wire form of a [`Table`].
#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<FieldValue>>,
}

impl TryFrom<RawTable> for Table {
    type Error = ReconcileError;

    fn try_from(raw: RawTable) -> Result<Self> {
        let table = Table {
            columns: raw.columns,
            rows: raw.rows,
        };
        table.validate()?;
        Ok(table)
    }
}

impl Table {
    /// Creates an empty table with the given columns.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::DuplicateColumn`] if a column name repeats.
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        check_columns(&columns)?;
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Creates a table from already classified rows.
    pub fn from_rows<I, S, R>(columns: I, rows: R) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        R: IntoIterator<Item = Vec<FieldValue>>,
    {
        let mut table = Self::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Creates a table from raw text cells, classifying each one against `sentinels`.
    ///
    /// This is the shape text-format parsers hand over: ordered columns and one text cell per
    /// column for every record.
    pub fn from_text_rows<I, S, R, V, T>(columns: I, rows: R, sentinels: &Sentinels) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        R: IntoIterator<Item = V>,
        V: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut table = Self::new(columns)?;
        for row in rows {
            let row = row
                .into_iter()
                .map(|cell| sentinels.classify(cell.as_ref()))
                .collect();
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Creates a table from records, writing `fill` into columns a record does not mention.
    pub fn from_records<'a, I, S, R>(columns: I, records: R, fill: &FieldValue) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        R: IntoIterator<Item = &'a Record>,
    {
        let mut table = Self::new(columns)?;
        for record in records {
            table.push_record(record, fill)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::RowWidth`] if the row does not have one value per column.
    pub fn push_row(&mut self, row: Vec<FieldValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ReconcileError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Appends a record, writing `fill` into columns the record does not mention.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::UnknownColumn`] if the record names a column the table lacks.
    pub fn push_record(&mut self, record: &Record, fill: &FieldValue) -> Result<()> {
        let mut row = vec![fill.clone(); self.columns.len()];
        for (column, value) in record.iter() {
            let index = self
                .column_index(column)
                .ok_or_else(|| ReconcileError::UnknownColumn(column.to_string()))?;
            row[index] = value.clone();
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn row(&self, index: usize) -> Option<&[FieldValue]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[FieldValue]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Copies one row out as a [`Record`].
    pub fn record(&self, index: usize) -> Option<Record> {
        self.row(index).map(|row| {
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect()
        })
    }

    /// The value of `column` in row `index`.
    pub fn value(&self, index: usize, column: &str) -> Option<&FieldValue> {
        let column = self.column_index(column)?;
        self.rows.get(index).map(|row| &row[column])
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, column: &str) -> Option<impl Iterator<Item = &FieldValue>> {
        let column = self.column_index(column)?;
        Some(self.rows.iter().map(move |row| &row[column]))
    }

    /// Projects the table onto `columns`, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::UnknownColumn`] if a column is missing.
    pub fn select(&self, columns: &[impl AsRef<str>]) -> Result<Table> {
        let indices = columns
            .iter()
            .map(|c| {
                self.column_index(c.as_ref())
                    .ok_or_else(|| ReconcileError::UnknownColumn(c.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        let selected = Table::new(columns.iter().map(|c| c.as_ref().to_string()))?;
        Ok(Table {
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
            ..selected
        })
    }

    /// Copies the rows at `indices`, in the order given. Out-of-range indices are skipped.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Renames columns. All renames apply at once, so two columns may swap names.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::UnknownColumn`] if a source column is missing and
    /// [`ReconcileError::DuplicateColumn`] if the renamed schema repeats a name.
    pub fn renamed(&self, renames: &[(&str, &str)]) -> Result<Table> {
        for (from, _) in renames {
            if !self.has_column(from) {
                return Err(ReconcileError::UnknownColumn(from.to_string()));
            }
        }
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                renames
                    .iter()
                    .find(|(from, _)| from == column)
                    .map_or_else(|| column.clone(), |(_, to)| to.to_string())
            })
            .collect();
        check_columns(&columns)?;
        Ok(Table {
            columns,
            rows: self.rows.clone(),
        })
    }

    /// Resolves key column names to indices.
    pub(crate) fn resolve_keys(&self, key_columns: &[impl AsRef<str>]) -> Result<Vec<usize>> {
        key_columns
            .iter()
            .map(|c| {
                self.column_index(c.as_ref())
                    .ok_or_else(|| ReconcileError::MissingKeyColumn(c.as_ref().to_string()))
            })
            .collect()
    }

    /// Reshapes the table onto `columns`: shared columns are copied, the others hold `fill`,
    /// and columns not listed are dropped.
    pub(crate) fn conform(&self, columns: &[String], fill: &FieldValue) -> Table {
        let sources: Vec<Option<usize>> = columns.iter().map(|c| self.column_index(c)).collect();
        Table {
            columns: columns.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| {
                    sources
                        .iter()
                        .map(|source| source.map_or_else(|| fill.clone(), |i| row[i].clone()))
                        .collect()
                })
                .collect(),
        }
    }

    /// Appends all rows or none of them.
    pub(crate) fn extend_rows(&mut self, rows: Vec<Vec<FieldValue>>) -> Result<()> {
        if let Some(row) = rows.iter().find(|row| row.len() != self.columns.len()) {
            return Err(ReconcileError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.extend(rows);
        Ok(())
    }

    pub(crate) fn set(&mut self, row: usize, column: usize, value: FieldValue) {
        self.rows[row][column] = value;
    }

    /// Checks that column names are unique and that every row has one value per column.
    pub(crate) fn validate(&self) -> Result<()> {
        check_columns(&self.columns)?;
        match self.rows.iter().find(|row| row.len() != self.columns.len()) {
            Some(row) => Err(ReconcileError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            }),
            None => Ok(()),
        }
    }
}

fn check_columns(columns: &[String]) -> Result<()> {
    match columns.iter().duplicates().next() {
        Some(column) => Err(ReconcileError::DuplicateColumn(column.clone())),
        None => Ok(()),
    }
}

/// An ordered column → value map describing one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field and returns the record, for building records inline.
    ///
    /// ```
    /// use citnet::{FieldValue, Record};
    ///
    /// let record = Record::new().with("ref", "smith 2000 icarus").with("doi", "x");
    /// assert_eq!(record.get("doi"), Some(&FieldValue::Unknown));
    /// ```
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a field, replacing any previous value for the column.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Drops every field whose column fails the predicate.
    pub fn retain_columns(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.fields.retain(|(c, _)| keep(c));
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.set(column, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Table {
        Table::from_text_rows(
            ["ref", "vol", "doi"],
            [
                ["jones 1999 jgr", "12", "x"],
                ["smith 2000 icarus", "?", "10.1/abc"],
            ],
            &Sentinels::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = Table::new(["ref", "vol", "ref"]);
        assert_eq!(result, Err(ReconcileError::DuplicateColumn("ref".to_string())));
    }

    #[test]
    fn test_row_width_checked() {
        let mut table = Table::new(["ref", "vol"]).unwrap();
        let result = table.push_row(vec![FieldValue::concrete("a")]);
        assert_eq!(
            result,
            Err(ReconcileError::RowWidth {
                expected: 2,
                found: 1
            })
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_deserialize_checks_shape() {
        let ragged = r#"{"columns":["ref","doi","vol"],"rows":[["a 1 b"]]}"#;
        let error = serde_json::from_str::<Table>(ragged).unwrap_err();
        assert!(error.to_string().contains("Row has 1 values but the table has 3 columns"));

        let repeated = r#"{"columns":["ref","ref"],"rows":[]}"#;
        assert!(serde_json::from_str::<Table>(repeated).is_err());

        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(serde_json::from_str::<Table>(&json).unwrap(), sample());
    }

    #[test]
    fn test_text_rows_are_classified() {
        let table = sample();
        assert_eq!(table.value(0, "vol"), Some(&FieldValue::concrete("12")));
        assert_eq!(table.value(0, "doi"), Some(&FieldValue::Unknown));
        assert_eq!(table.value(1, "vol"), Some(&FieldValue::Ambiguous));
        assert_eq!(table.value(2, "vol"), None);
        assert_eq!(table.value(0, "pages"), None);
    }

    #[test]
    fn test_push_record_fills_missing_columns() {
        let mut table = Table::new(["ref", "vol", "doi"]).unwrap();
        let record = Record::new().with("doi", "10.1/abc").with("ref", "a 1 b");
        table.push_record(&record, &FieldValue::Unknown).unwrap();
        assert_eq!(
            table.row(0).unwrap(),
            &[
                FieldValue::concrete("a 1 b"),
                FieldValue::Unknown,
                FieldValue::concrete("10.1/abc"),
            ]
        );

        let stray = Record::new().with("pages", "1-2");
        assert_eq!(
            table.push_record(&stray, &FieldValue::Unknown),
            Err(ReconcileError::UnknownColumn("pages".to_string()))
        );
    }

    #[test]
    fn test_select_and_rename() {
        let table = sample();
        let selected = table.select(&["doi", "ref"]).unwrap();
        assert_eq!(selected.columns(), &["doi", "ref"]);
        assert_eq!(selected.value(1, "doi"), Some(&FieldValue::concrete("10.1/abc")));
        assert!(table.select(&["pages"]).is_err());

        let renamed = table.renamed(&[("ref", "vol"), ("vol", "ref")]).unwrap();
        assert_eq!(renamed.columns(), &["vol", "ref", "doi"]);

        assert_eq!(
            table.renamed(&[("vol", "ref")]),
            Err(ReconcileError::DuplicateColumn("ref".to_string()))
        );
    }

    #[test]
    fn test_conform_fills_and_drops() {
        let table = sample();
        let columns = vec!["doi".to_string(), "pages".to_string(), "ref".to_string()];
        let conformed = table.conform(&columns, &FieldValue::Ambiguous);
        assert_eq!(conformed.columns(), columns.as_slice());
        assert_eq!(
            conformed.row(1).unwrap(),
            &[
                FieldValue::concrete("10.1/abc"),
                FieldValue::Ambiguous,
                FieldValue::concrete("smith 2000 icarus"),
            ]
        );
    }

    #[test]
    fn test_extend_rows_is_all_or_nothing() {
        let mut table = sample();
        let rows = vec![
            vec![FieldValue::Unknown; 3],
            vec![FieldValue::Unknown; 2],
        ];
        assert!(table.extend_rows(rows).is_err());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_record_roundtrip_through_table() {
        let table = sample();
        let record = table.record(1).unwrap();
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["ref", "vol", "doi"]);
        assert_eq!(record.get("doi"), Some(&FieldValue::concrete("10.1/abc")));
    }

    #[test]
    fn test_record_set_replaces() {
        let mut record = Record::new().with("vol", "12");
        record.set("vol", "13");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("vol"), Some(&FieldValue::concrete("13")));
    }
}
