//! Hunspell-dictionary backed checker.
//!
//! Loads a conventional `NAME.aff`/`NAME.dic` pair and answers spelling
//! queries through the compiled dictionary. Runtime `add`/`remove` are kept
//! in session word sets layered over the compiled dictionary, matching how
//! Hunspell treats its runtime dictionary mutations.

use std::path::Path;

use hashbrown::HashSet;
use spellbook::Dictionary;
use thiserror::Error;

use super::BaseChecker;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("read dictionary file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse dictionary: {0}")]
    Parse(String),
}

pub struct HunspellChecker {
    dictionary: Dictionary,
    added: HashSet<String>,
    removed: HashSet<String>,
}

impl HunspellChecker {
    /// Opens the affix/dictionary pair at the given paths.
    pub fn open(affix: &Path, dictionary: &Path) -> Result<HunspellChecker, DictionaryError> {
        let aff = std::fs::read_to_string(affix)?;
        let dic = std::fs::read_to_string(dictionary)?;

        Self::from_contents(&aff, &dic)
    }

    /// Builds a checker from in-memory affix and dictionary contents.
    pub fn from_contents(aff: &str, dic: &str) -> Result<HunspellChecker, DictionaryError> {
        let dictionary =
            Dictionary::new(aff, dic).map_err(|err| DictionaryError::Parse(err.to_string()))?;

        Ok(HunspellChecker {
            dictionary,
            added: HashSet::new(),
            removed: HashSet::new(),
        })
    }
}

impl BaseChecker for HunspellChecker {
    fn spell(&mut self, word: &str) -> bool {
        if self.removed.contains(word) {
            return false;
        }

        self.added.contains(word) || self.dictionary.check(word)
    }

    fn suggest(&mut self, word: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.dictionary.suggest(word, &mut out);
        out
    }

    fn add(&mut self, word: &str) {
        self.removed.remove(word);
        self.added.insert(word.to_owned());
    }

    fn remove(&mut self, word: &str) {
        self.added.remove(word);
        self.removed.insert(word.to_owned());
    }

    fn stem(&mut self, _word: &str) -> Vec<String> {
        // The compiled dictionary does not expose morphological analysis.
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A minimal but well-formed dictionary: two stems, one suffix rule.
    const TEST_AFF: &str = "SET UTF-8\n\nSFX A Y 1\nSFX A 0 ar .\n";
    const TEST_DIC: &str = "2\nbil/A\nhus\n";

    #[test]
    fn checks_against_compiled_dictionary() {
        let mut checker = HunspellChecker::from_contents(TEST_AFF, TEST_DIC).unwrap();

        assert!(checker.spell("bil"));
        assert!(checker.spell("bilar"));
        assert!(checker.spell("hus"));
        assert!(!checker.spell("cykel"));
    }

    #[test]
    fn session_words_overlay_the_dictionary() {
        let mut checker = HunspellChecker::from_contents(TEST_AFF, TEST_DIC).unwrap();

        checker.add("cykel");
        assert!(checker.spell("cykel"));

        checker.remove("cykel");
        assert!(!checker.spell("cykel"));

        // Removal shadows the compiled dictionary too.
        checker.remove("hus");
        assert!(!checker.spell("hus"));

        checker.add("hus");
        assert!(checker.spell("hus"));
    }
}
