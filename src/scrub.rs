//! Data-quality reports over a table.
//!
//! Reconciliation refuses to guess, so dirty source data surfaces as conflicts and
//! mismatches. The helpers here help find the dirt before an import does:
//!
//! - [`report_specials`] counts placeholders per column
//! - [`duplicated_values`] finds one concrete value under several rows, such as one DOI
//!   attached to two different keys
//! - [`Scrubber::similar_values`] finds near-identical values, such as journal names that
//!   differ by a typo
//! - [`is_transposition`] tells whether two values differ by one swapped pair of
//!   neighbouring characters
//!
//! # Example
//!
//! ```
//! use citnet::scrub::{ScrubConfig, Scrubber};
//! use citnet::{Sentinels, Table};
//!
//! let table = Table::from_text_rows(
//!     ["ref", "pub"],
//!     [
//!         ["a 1 b", "journal of geophysical research"],
//!         ["c 2 d", "journal of geophysical reserach"],
//!         ["e 3 f", "icarus"],
//!     ],
//!     &Sentinels::default(),
//! )
//! .unwrap();
//!
//! let scrubber = Scrubber::new().with_config(ScrubConfig {
//!     similarity_threshold: 0.95,
//!     ..Default::default()
//! });
//! let pairs = scrubber.similar_values(&table, "pub").unwrap();
//! assert_eq!(pairs.len(), 1);
//! assert!(citnet::scrub::is_transposition(&pairs[0].first, &pairs[0].second));
//! ```

use crate::table::Table;
use crate::value::{FieldValue, Sentinels};
use crate::{ReconcileError, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strsim::{jaro_winkler, levenshtein, osa_distance};

const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.9;

/// Configuration for [`Scrubber`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScrubConfig {
    /// Minimum Jaro-Winkler similarity for two values to be reported.
    pub similarity_threshold: f64,
    /// Whether to compare value pairs on the rayon thread pool.
    pub run_in_parallel: bool,
    /// Tokens that never count as values.
    pub sentinels: Sentinels,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            run_in_parallel: false,
            sentinels: Sentinels::default(),
        }
    }
}

/// Placeholder counts of one column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialCounts {
    pub column: String,
    pub unknown: usize,
    pub ambiguous: usize,
    /// Concrete text equal to a registered placeholder token.
    pub placeholder: usize,
    pub concrete: usize,
}

impl SpecialCounts {
    /// Cells without data.
    pub fn special(&self) -> usize {
        self.unknown + self.ambiguous + self.placeholder
    }
}

/// Counts placeholders and data in every column.
pub fn report_specials(table: &Table, sentinels: &Sentinels) -> Vec<SpecialCounts> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let mut counts = SpecialCounts {
                column: column.clone(),
                ..Default::default()
            };
            for row in table.rows() {
                match &row[index] {
                    FieldValue::Unknown => counts.unknown += 1,
                    FieldValue::Ambiguous => counts.ambiguous += 1,
                    value if sentinels.is_special(value) => counts.placeholder += 1,
                    _ => counts.concrete += 1,
                }
            }
            counts
        })
        .collect()
}

/// A concrete value found in more than one row of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicatedValue {
    pub value: String,
    pub rows: Vec<usize>,
}

/// Finds concrete values repeated within a column. Placeholders are never reported.
///
/// # Errors
///
/// Returns [`ReconcileError::UnknownColumn`] if the column does not exist.
pub fn duplicated_values(
    table: &Table,
    column: &str,
    sentinels: &Sentinels,
) -> Result<Vec<DuplicatedValue>> {
    let values = table
        .column_values(column)
        .ok_or_else(|| ReconcileError::UnknownColumn(column.to_string()))?;
    let groups = values
        .enumerate()
        .filter_map(|(row, value)| sentinels.concrete(value).map(|text| (text, row)))
        .into_group_map();
    Ok(groups
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(value, rows)| DuplicatedValue {
            value: value.to_string(),
            rows,
        })
        .sorted_by_key(|duplicate| duplicate.rows[0])
        .collect())
}

/// Two distinct values of one column that look alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPair {
    pub first: String,
    pub second: String,
    /// Jaro-Winkler similarity in `[0, 1]`.
    pub similarity: f64,
}

/// Finds near-duplicate values.
#[derive(Debug, Clone, Default)]
pub struct Scrubber {
    config: ScrubConfig,
}

impl Scrubber {
    /// Creates a scrubber with a 0.9 threshold, running sequentially.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: ScrubConfig) -> Self {
        self.config = config;
        self
    }

    /// Lists pairs of distinct concrete values in `column` whose similarity reaches the
    /// threshold, most similar first. Identical values are not reported; see
    /// [`duplicated_values`] for those.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::UnknownColumn`] if the column does not exist.
    pub fn similar_values(&self, table: &Table, column: &str) -> Result<Vec<SimilarPair>> {
        let values: Vec<&str> = table
            .column_values(column)
            .ok_or_else(|| ReconcileError::UnknownColumn(column.to_string()))?
            .filter_map(|value| self.config.sentinels.concrete(value))
            .unique()
            .collect();

        let values = &values;
        let pairs_from = move |i: usize| {
            (i + 1..values.len()).filter_map(move |j| self.compare(values[i], values[j]))
        };

        let mut pairs: Vec<SimilarPair> = if self.config.run_in_parallel {
            use rayon::prelude::*;

            (0..values.len())
                .into_par_iter()
                .flat_map_iter(pairs_from)
                .collect()
        } else {
            (0..values.len()).flat_map(pairs_from).collect()
        };

        pairs.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(pairs)
    }

    fn compare(&self, first: &str, second: &str) -> Option<SimilarPair> {
        let similarity = jaro_winkler(first, second);
        (similarity >= self.config.similarity_threshold).then(|| SimilarPair {
            first: first.to_string(),
            second: second.to_string(),
            similarity,
        })
    }
}

/// True if `b` is `a` with exactly one pair of neighbouring characters swapped.
pub fn is_transposition(a: &str, b: &str) -> bool {
    osa_distance(a, b) == 1 && levenshtein(a, b) == 2
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
    fn test_report_specials() {
        let table = table(
            &["ref", "doi"],
            &[&["a 1 b", "x"], &["c 2 d", "?"], &["e 3 f", "n/a"], &["g 4 h", "10.1/g"]],
        );
        let sentinels = Sentinels::new().with_unknown("n/a");
        let report = report_specials(&table, &sentinels);
        assert_eq!(
            report[1],
            SpecialCounts {
                column: "doi".to_string(),
                unknown: 1,
                ambiguous: 1,
                placeholder: 1,
                concrete: 1,
            }
        );
        assert_eq!(report[1].special(), 3);
        assert_eq!(report[0].concrete, 4);
    }

    #[test]
    fn test_duplicated_values() {
        let table = table(
            &["ref", "doi"],
            &[
                &["a 1 b", "10.1/a"],
                &["c 2 d", "x"],
                &["e 3 f", "10.1/a"],
                &["g 4 h", "x"],
            ],
        );
        let duplicates = duplicated_values(&table, "doi", &Sentinels::default()).unwrap();
        assert_eq!(
            duplicates,
            vec![DuplicatedValue {
                value: "10.1/a".to_string(),
                rows: vec![0, 2],
            }]
        );
        assert!(duplicated_values(&table, "pages", &Sentinels::default()).is_err());
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_similar_values(#[case] run_in_parallel: bool) {
        let table = table(
            &["pub"],
            &[
                &["journal of geophysical research"],
                &["icarus"],
                &["journal of geophysical research"],
                &["journal of geophysical researc"],
                &["x"],
                &["nature"],
            ],
        );
        let scrubber = Scrubber::new().with_config(ScrubConfig {
            run_in_parallel,
            ..Default::default()
        });
        let pairs = scrubber.similar_values(&table, "pub").unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].first, "journal of geophysical research");
        assert_eq!(pairs[0].second, "journal of geophysical researc");
        assert!(pairs[0].similarity > 0.9);
    }

    #[rstest]
    #[case("icarus", "icaurs", true)]
    #[case("smith", "msith", true)]
    #[case("smith", "smith", false)]
    #[case("smith", "smiht", true)]
    #[case("smith", "smyth", false)]
    #[case("smith", "htims", false)]
    #[case("abc", "abcd", false)]
    fn test_is_transposition(#[case] a: &str, #[case] b: &str, #[case] expected: bool) {
        assert_eq!(is_transposition(a, b), expected);
    }
}
