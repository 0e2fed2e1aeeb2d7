//! The base spellchecker seam.
//!
//! The overlay sits on top of a conventional affix/dictionary spellchecker.
//! That engine is deliberately abstract here: the checking algorithm only
//! needs the five operations of [`BaseChecker`], and the engine is assumed
//! not to be thread-safe, so every call goes through the owning
//! [`LanguageChecker`](crate::checker::LanguageChecker)'s mutex.

use hashbrown::{HashMap, HashSet};

pub mod hunspell;

pub use self::hunspell::HunspellChecker;

/// A single-language affix/dictionary spellchecker.
///
/// All methods take `&mut self`: implementations are allowed to keep
/// per-call scratch state and must be externally serialised.
pub trait BaseChecker: Send {
    /// Whether `word` is correctly spelled.
    fn spell(&mut self, word: &str) -> bool;

    /// Corrections for `word`, best first, in the engine's native order.
    fn suggest(&mut self, word: &str) -> Vec<String>;

    /// Adds `word` to the runtime dictionary.
    fn add(&mut self, word: &str);

    /// Removes `word` from the runtime dictionary.
    fn remove(&mut self, word: &str);

    /// Morphological stems of `word`; empty when the engine has none.
    fn stem(&mut self, word: &str) -> Vec<String>;
}

/// A plain word-list checker.
///
/// Knows exactly the words it was given, suggests from a fixed mapping and
/// stems nothing. Used by the test suites, and useful as a stand-in where no
/// Hunspell dictionary is available.
#[derive(Debug, Default)]
pub struct WordList {
    words: HashSet<String>,
    suggestions: HashMap<String, Vec<String>>,
}

impl WordList {
    pub fn new<I, S>(words: I) -> WordList
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WordList {
            words: words.into_iter().map(Into::into).collect(),
            suggestions: HashMap::new(),
        }
    }

    /// Registers the corrections to return for a misspelled word.
    pub fn with_suggestions<I, S>(mut self, word: &str, suggestions: I) -> WordList
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions.insert(
            word.to_owned(),
            suggestions.into_iter().map(Into::into).collect(),
        );
        self
    }
}

impl BaseChecker for WordList {
    fn spell(&mut self, word: &str) -> bool {
        self.words.contains(word)
    }

    fn suggest(&mut self, word: &str) -> Vec<String> {
        self.suggestions.get(word).cloned().unwrap_or_default()
    }

    fn add(&mut self, word: &str) {
        self.words.insert(word.to_owned());
    }

    fn remove(&mut self, word: &str) {
        self.words.remove(word);
    }

    fn stem(&mut self, _word: &str) -> Vec<String> {
        Vec::new()
    }
}
