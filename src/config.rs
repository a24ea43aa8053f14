//! Per-import configuration.
//!
//! Every import takes an [`ImportConfig`] naming the placeholder tokens that count as "no
//! data" and the value written into cells an import leaves empty.
//!
//! ```
//! use citnet::{FieldValue, ImportConfig};
//!
//! let mut config = ImportConfig::new().with_fill(FieldValue::concrete("n/a"));
//! config.add_ambiguous_token("unclear");
//!
//! // A concrete fill is itself a placeholder from then on.
//! assert!(config.sentinels().is_special_token("n/a"));
//! assert!(config.sentinels().is_special_token("unclear"));
//! ```

use crate::value::{FieldValue, Sentinels};

/// Configuration for document and citation imports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportConfig {
    /// Tokens treated as missing or contested data
    sentinels: Sentinels,
    /// Value written into columns an import has no data for
    fill: FieldValue,
}

impl ImportConfig {
    /// Creates a configuration with the default `x`/`?` tokens and an unknown fill.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the sentinel set. A concrete fill stays registered.
    #[must_use]
    pub fn with_sentinels(mut self, sentinels: Sentinels) -> Self {
        self.sentinels = sentinels;
        self.register_fill();
        self
    }

    /// Sets the fill value.
    #[must_use]
    pub fn with_fill(mut self, fill: FieldValue) -> Self {
        self.fill = fill;
        self.register_fill();
        self
    }

    /// Registers an extra token meaning "no data yet".
    pub fn add_unknown_token(&mut self, token: &str) -> &mut Self {
        self.sentinels.add_unknown(token);
        self
    }

    /// Registers an extra token meaning "contested or unparsed".
    pub fn add_ambiguous_token(&mut self, token: &str) -> &mut Self {
        self.sentinels.add_ambiguous(token);
        self
    }

    pub fn sentinels(&self) -> &Sentinels {
        &self.sentinels
    }

    pub fn fill(&self) -> &FieldValue {
        &self.fill
    }

    fn register_fill(&mut self) {
        if let FieldValue::Concrete(text) = &self.fill {
            self.sentinels.add_unknown(text.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = ImportConfig::default();
        assert_eq!(config.fill(), &FieldValue::Unknown);
        assert_eq!(config.sentinels(), &Sentinels::default());
    }

    #[test]
    fn test_concrete_fill_survives_sentinel_swap() {
        let config = ImportConfig::new()
            .with_fill(FieldValue::concrete("-"))
            .with_sentinels(Sentinels::new().with_ambiguous("??"));
        assert!(config.sentinels().is_special_token("-"));
        assert!(config.sentinels().is_special_token("??"));
        assert!(config.sentinels().is_special(config.fill()));
    }

    #[test]
    fn test_setters_chain() {
        let mut config = ImportConfig::new();
        config.add_unknown_token("n/a").add_unknown_token("none");
        assert_eq!(config.sentinels().classify("none"), FieldValue::Unknown);
        assert_eq!(config.sentinels().classify("n/a"), FieldValue::Unknown);
    }
}
