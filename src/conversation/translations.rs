//! Per-owner translation sets (language code -> text).
//!
//! A character's system prompt is stored once per language. A missing
//! translation for a language the client must render is a data defect and is
//! reported as [`DataIntegrityError`], never papered over with a fallback.

use crate::collections::OrderedKeyedList;

use super::errors::DataIntegrityError;

#[derive(Debug, Clone)]
pub struct TranslationSet {
    owner: String,
    entries: OrderedKeyedList<String, String>,
}

impl TranslationSet {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            entries: OrderedKeyedList::new(),
        }
    }

    /// Build from `(language, text)` pairs. Later duplicates are ignored.
    pub fn from_pairs<I, L, T>(owner: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        let mut set = Self::new(owner);
        set.entries
            .push_end_many(pairs.into_iter().map(|(l, t)| (l.into(), t.into())));
        set
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Insert a translation. Returns `false` if the language already exists.
    pub fn insert(&mut self, language: impl Into<String>, text: impl Into<String>) -> bool {
        self.entries.push_end(language.into(), text.into())
    }

    pub fn get(&self, language: &str) -> Option<&str> {
        self.entries.get(&language.to_string()).map(String::as_str)
    }

    /// The translation for `language`, or an integrity error.
    pub fn require(&self, language: &str) -> Result<&str, DataIntegrityError> {
        self.get(language)
            .ok_or_else(|| DataIntegrityError::MissingTranslation {
                owner: self.owner.clone(),
                language: language.to_string(),
            })
    }

    pub fn languages(&self) -> Vec<String> {
        self.entries.ids()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_present_and_missing() {
        let set = TranslationSet::from_pairs(
            "socrates",
            [("en", "You are Socrates."), ("fr", "Tu es Socrate.")],
        );
        assert_eq!(set.require("fr").unwrap(), "Tu es Socrate.");
        assert_eq!(
            set.require("de").unwrap_err(),
            DataIntegrityError::MissingTranslation {
                owner: "socrates".to_string(),
                language: "de".to_string(),
            }
        );
    }

    #[test]
    fn test_insert_keeps_first_translation() {
        let mut set = TranslationSet::new("plato");
        assert!(set.insert("en", "first"));
        assert!(!set.insert("en", "second"));
        assert_eq!(set.get("en"), Some("first"));
        assert_eq!(set.languages(), vec!["en"]);
        assert_eq!(set.len(), 1);
    }
}
