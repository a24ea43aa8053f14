//! Field values and the sentinel tokens that stand in for missing data.
//!
//! Every cell of a [`Table`](crate::Table) is a [`FieldValue`]. A value is either
//! concrete text supplied by a source, or one of two placeholders:
//!
//! - `x` ([`FieldValue::Unknown`]): nobody has supplied this field yet
//! - `?` ([`FieldValue::Ambiguous`]): some source mentioned the field but its value is
//!   contested or could not be parsed
//!
//! Callers can register extra placeholder tokens through [`Sentinels`]. All comparisons and
//! merges ask the sentinel set whether a value carries data, so a token such as `n/a` can be
//! treated as missing for one import without rewriting the stored text.
//!
//! # Example
//!
//! ```
//! use citnet::{FieldValue, Sentinels};
//!
//! let sentinels = Sentinels::new().with_unknown("n/a");
//!
//! assert_eq!(sentinels.classify("x"), FieldValue::Unknown);
//! assert_eq!(sentinels.classify("?"), FieldValue::Ambiguous);
//! assert_eq!(sentinels.classify("n/a"), FieldValue::Unknown);
//! assert_eq!(sentinels.classify("10.1/abc"), FieldValue::concrete("10.1/abc"));
//! ```

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token written for a field with no data yet.
pub const UNKNOWN_TOKEN: &str = "x";
/// Token written for a field whose data is contested or unparsed.
pub const AMBIGUOUS_TOKEN: &str = "?";

/// A single cell value.
///
/// Two non-concrete values are never "equal data": they only mean that neither side knows
/// anything. Use [`Sentinels::agree`] to compare values the way the reconciliation engine does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldValue {
    /// Text supplied by a source.
    Concrete(CompactString),
    /// No data yet (`x`).
    #[default]
    Unknown,
    /// Data exists but is contested or unparsed (`?`).
    Ambiguous,
}

impl FieldValue {
    /// Creates a concrete value without classifying it.
    ///
    /// Prefer [`Sentinels::classify`] for text coming from a parser.
    pub fn concrete(text: impl Into<CompactString>) -> Self {
        FieldValue::Concrete(text.into())
    }

    /// The text form of the value; placeholders render as their tokens.
    pub fn as_str(&self) -> &str {
        match self {
            FieldValue::Concrete(text) => text.as_str(),
            FieldValue::Unknown => UNKNOWN_TOKEN,
            FieldValue::Ambiguous => AMBIGUOUS_TOKEN,
        }
    }

    /// True for concrete text that is not one of the built-in tokens.
    pub fn is_concrete(&self) -> bool {
        is_concrete(self)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for FieldValue {
    fn from(token: &str) -> Self {
        Sentinels::default().classify(token)
    }
}

impl From<String> for FieldValue {
    fn from(token: String) -> Self {
        FieldValue::from(token.as_str())
    }
}

impl From<FieldValue> for String {
    fn from(value: FieldValue) -> Self {
        value.as_str().to_string()
    }
}

/// The set of tokens treated as "no data" for one operation.
///
/// The default set holds `x` (unknown) and `?` (ambiguous). Extra tokens are added per call
/// site; they never remove the built-in ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinels {
    unknown: Vec<CompactString>,
    ambiguous: Vec<CompactString>,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            unknown: vec![UNKNOWN_TOKEN.into()],
            ambiguous: vec![AMBIGUOUS_TOKEN.into()],
        }
    }
}

impl Sentinels {
    /// Creates the default sentinel set (`x` and `?`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token that classifies as [`FieldValue::Unknown`].
    #[must_use]
    pub fn with_unknown(mut self, token: &str) -> Self {
        self.add_unknown(token);
        self
    }

    /// Adds a token that classifies as [`FieldValue::Ambiguous`].
    #[must_use]
    pub fn with_ambiguous(mut self, token: &str) -> Self {
        self.add_ambiguous(token);
        self
    }

    pub(crate) fn add_unknown(&mut self, token: &str) {
        let token = token.trim();
        if !token.is_empty() && !self.is_special_token(token) {
            self.unknown.push(token.into());
        }
    }

    pub(crate) fn add_ambiguous(&mut self, token: &str) {
        let token = token.trim();
        if !token.is_empty() && !self.is_special_token(token) {
            self.ambiguous.push(token.into());
        }
    }

    /// Classifies raw text. Blank text counts as unknown.
    pub fn classify(&self, token: &str) -> FieldValue {
        let token = token.trim();
        if token.is_empty() || self.unknown.iter().any(|t| t.as_str() == token) {
            FieldValue::Unknown
        } else if self.ambiguous.iter().any(|t| t.as_str() == token) {
            FieldValue::Ambiguous
        } else {
            FieldValue::Concrete(token.into())
        }
    }

    /// True if the text equals one of the registered tokens.
    pub fn is_special_token(&self, token: &str) -> bool {
        self.unknown
            .iter()
            .chain(self.ambiguous.iter())
            .any(|t| t.as_str() == token)
    }

    /// True if the value carries no data under this sentinel set.
    pub fn is_special(&self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Concrete(text) => self.is_special_token(text.as_str()),
            FieldValue::Unknown | FieldValue::Ambiguous => true,
        }
    }

    /// Returns the text of a value that carries data under this sentinel set.
    pub fn concrete<'a>(&self, value: &'a FieldValue) -> Option<&'a str> {
        match value {
            FieldValue::Concrete(text) if !self.is_special_token(text.as_str()) => {
                Some(text.as_str())
            }
            _ => None,
        }
    }

    /// Two values agree unless both carry data and the texts differ.
    pub fn agree(&self, a: &FieldValue, b: &FieldValue) -> bool {
        match (self.concrete(a), self.concrete(b)) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Classifies a raw token against a sentinel set.
pub fn classify(token: &str, sentinels: &Sentinels) -> FieldValue {
    sentinels.classify(token)
}

/// True if the value is concrete under the default sentinel set.
pub fn is_concrete(value: &FieldValue) -> bool {
    match value {
        FieldValue::Concrete(text) => {
            text.as_str() != UNKNOWN_TOKEN && text.as_str() != AMBIGUOUS_TOKEN
        }
        FieldValue::Unknown | FieldValue::Ambiguous => false,
    }
}
