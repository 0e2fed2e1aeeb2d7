//! Per-language overlay checking.
//!
//! A [`LanguageChecker`] owns the base spellchecker for one language together
//! with the two in-memory phrase indexes: `valid` maps every known-good
//! surface form (canonical texts and corrected forms) to its phrase, and
//! `mistake` maps every known-bad surface form (expanded common mistakes and
//! mistaken forms) to the phrase that explains it. Checking a text walks the
//! phrase sequences first, then hands the residue to the base checker.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;
use tokio::sync::AcquireError;

use crate::expand::expand;
use crate::phrases::{Phrases, MAX_PHRASE_WORDS};
use crate::pool::BufferPool;
use crate::speller::BaseChecker;
use crate::tokenizer::Tokenize;

/// Residue buffers kept per language.
const RESIDUE_POOL_SIZE: usize = 10;

/// How hard a correction should be surfaced to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryLevel {
    #[default]
    Error,
    Suggestion,
}

impl EntryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryLevel::Error => "error",
            EntryLevel::Suggestion => "suggestion",
        }
    }

    /// Parses a stored level, falling back to `Error` for anything unknown.
    pub fn parse(value: &str) -> EntryLevel {
        match value {
            "suggestion" => EntryLevel::Suggestion,
            _ => EntryLevel::Error,
        }
    }
}

/// An editorial dictionary entry projected into memory.
///
/// `common_mistakes` holds templates when the phrase is handed to
/// [`LanguageChecker::add_phrase`] and the expanded literal set once stored.
#[derive(Debug, Clone, Default)]
pub struct Phrase {
    pub text: String,
    pub description: String,
    pub common_mistakes: Vec<String>,
    pub level: EntryLevel,
    pub forms: HashMap<String, String>,
}

/// A single suggested correction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// One misspelled word or phrase in a checked text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisspelledEntry {
    pub text: String,
    pub level: EntryLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Suggestion>,
}

/// The result of checking one text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misspelled {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<MisspelledEntry>,
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("acquire residue buffer: {0}")]
    Buffer(#[from] AcquireError),
}

#[derive(Default)]
struct PhraseIndex {
    valid: HashMap<SmolStr, Arc<Phrase>>,
    mistake: HashMap<SmolStr, Arc<Phrase>>,
}

/// The per-language checking unit: base checker plus the two phrase indexes.
///
/// The index lock and the base-checker mutex are independent: readers walk
/// the indexes concurrently, while base-checker calls serialise one at a time
/// per language.
pub struct LanguageChecker {
    language: String,
    index: RwLock<PhraseIndex>,
    checker: Mutex<Box<dyn BaseChecker>>,
    buffers: BufferPool,
}

impl LanguageChecker {
    pub fn new(language: impl Into<String>, checker: Box<dyn BaseChecker>) -> LanguageChecker {
        LanguageChecker {
            language: language.into(),
            index: RwLock::new(PhraseIndex::default()),
            checker: Mutex::new(checker),
            buffers: BufferPool::new(RESIDUE_POOL_SIZE),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Inserts or replaces the phrase stored at `phrase.text`.
    ///
    /// Mistake templates are expanded here; a template that fails to expand
    /// was authored in error and is dropped without blocking the others. When
    /// a phrase with the same canonical text already exists, every key derived
    /// from the old phrase is removed first so no stale mistakes or forms
    /// survive the update.
    pub fn add_phrase(&self, mut phrase: Phrase) {
        let mut expanded = Vec::new();

        for template in &phrase.common_mistakes {
            match expand(template) {
                Ok(mut literals) => expanded.append(&mut literals),
                Err(err) => {
                    log::debug!(
                        "{}: dropping mistake template {:?} of {:?}: {}",
                        self.language,
                        template,
                        phrase.text,
                        err
                    );
                }
            }
        }

        phrase.common_mistakes = expanded;
        let phrase = Arc::new(phrase);

        let mut index = write_lock(&self.index);
        let mut checker = lock(&self.checker);

        if let Some(old) = index.valid.get(phrase.text.as_str()).cloned() {
            for mistake in &old.common_mistakes {
                index.mistake.remove(mistake.as_str());
            }

            for (form, correct) in &old.forms {
                index.valid.remove(correct.as_str());
                checker.remove(correct);
                index.mistake.remove(form.as_str());
            }
        }

        index
            .valid
            .insert(SmolStr::new(&phrase.text), Arc::clone(&phrase));
        checker.add(&phrase.text);

        for mistake in &phrase.common_mistakes {
            index
                .mistake
                .insert(SmolStr::new(mistake), Arc::clone(&phrase));
        }

        for (form, correct) in &phrase.forms {
            index.valid.insert(SmolStr::new(correct), Arc::clone(&phrase));
            checker.add(correct);
            index.mistake.insert(SmolStr::new(form), Arc::clone(&phrase));
        }
    }

    /// Removes the phrase stored at `text` and every key derived from it.
    /// A no-op when nothing is stored there.
    pub fn remove_phrase(&self, text: &str) {
        let mut index = write_lock(&self.index);

        let Some(phrase) = index.valid.get(text).cloned() else {
            return;
        };

        let mut checker = lock(&self.checker);

        checker.remove(text);
        index.valid.remove(text);

        for mistake in &phrase.common_mistakes {
            index.mistake.remove(mistake.as_str());
        }

        for (form, correct) in &phrase.forms {
            index.valid.remove(correct.as_str());
            checker.remove(correct);
            index.mistake.remove(form.as_str());
        }
    }

    /// Checks a text against the overlay and then the base checker.
    ///
    /// Phrases matched by the overlay, good or bad, are cut out of the text
    /// before the remainder is segmented into words for the base checker, so
    /// the two passes never report the same surface twice.
    pub async fn check(&self, text: &str, with_suggestions: bool) -> Result<Misspelled, CheckError> {
        let mut result = Misspelled::default();

        if text.is_empty() {
            return Ok(result);
        }

        let mut replacements: Vec<String> = Vec::new();

        {
            let index = read_lock(&self.index);

            for sequence in Phrases::new(text, MAX_PHRASE_WORDS) {
                // A valid phrase must not reach the base checker, but keep
                // going: the same surface may also be indexed as somebody
                // else's mistake.
                if index.valid.contains_key(sequence.as_str()) {
                    replacements.push(sequence.clone());
                }

                let Some(phrase) = index.mistake.get(sequence.as_str()) else {
                    continue;
                };

                // Act only once per matched surface.
                if result.entries.iter().any(|e| e.text == sequence) {
                    continue;
                }

                let mut entry = MisspelledEntry {
                    text: sequence.clone(),
                    level: phrase.level,
                    suggestions: Vec::new(),
                };

                if with_suggestions {
                    if phrase.common_mistakes.iter().any(|m| *m == sequence) {
                        entry.suggestions.push(Suggestion {
                            text: phrase.text.clone(),
                            description: phrase.description.clone(),
                        });
                    }

                    if let Some(correct) = phrase.forms.get(sequence.as_str()) {
                        entry.suggestions.push(Suggestion {
                            text: correct.clone(),
                            description: phrase.description.clone(),
                        });
                    }
                }

                result.entries.push(entry);
                replacements.push(sequence);
            }
        }

        if replacements.is_empty() {
            self.check_residue(text, with_suggestions, &mut result);
            return Ok(result);
        }

        let mut residue = self.buffers.acquire().await?;
        strip_matches(text, &replacements, &mut residue);
        self.check_residue(&residue, with_suggestions, &mut result);

        Ok(result)
    }

    /// Suggestions for a single word or phrase.
    ///
    /// Overlay matches come first; the base checker is consulted only for
    /// single words it considers misspelled.
    pub fn suggestions(&self, text: &str) -> Vec<Suggestion> {
        let mut suggestions = Vec::new();

        {
            let index = read_lock(&self.index);

            if let Some(phrase) = index.mistake.get(text) {
                if phrase.common_mistakes.iter().any(|m| m == text) {
                    suggestions.push(Suggestion {
                        text: phrase.text.clone(),
                        description: phrase.description.clone(),
                    });
                }

                if let Some(correct) = phrase.forms.get(text) {
                    suggestions.push(Suggestion {
                        text: correct.clone(),
                        description: phrase.description.clone(),
                    });
                }
            }
        }

        // Don't bother running the base checker for phrases, single words only.
        if !text.contains(' ') && !self.base_spell(text) {
            for text in self.base_suggest(text) {
                suggestions.push(Suggestion {
                    text,
                    description: String::new(),
                });
            }
        }

        suggestions
    }

    fn check_residue(&self, residue: &str, with_suggestions: bool, result: &mut Misspelled) {
        let mut seen: HashSet<&str> = HashSet::new();

        for token in residue.words() {
            let word = token.text;

            if !seen.insert(word) {
                continue;
            }

            if self.base_spell(word) {
                continue;
            }

            let suggestions = if with_suggestions {
                self.base_suggest(word)
                    .into_iter()
                    .map(|text| Suggestion {
                        text,
                        description: String::new(),
                    })
                    .collect()
            } else {
                Vec::new()
            };

            result.entries.push(MisspelledEntry {
                text: word.to_owned(),
                level: EntryLevel::Error,
                suggestions,
            });
        }
    }

    fn base_spell(&self, word: &str) -> bool {
        lock(&self.checker).spell(word)
    }

    fn base_suggest(&self, word: &str) -> Vec<String> {
        lock(&self.checker).suggest(word)
    }
}

/// Copies `text` into `out` with every occurrence of every needle deleted.
/// Needles are tried in order at each position; matches do not overlap.
fn strip_matches(text: &str, needles: &[String], out: &mut String) {
    out.clear();

    let mut rest = text;

    'next: while let Some(ch) = rest.chars().next() {
        for needle in needles {
            if !needle.is_empty() && rest.starts_with(needle.as_str()) {
                rest = &rest[needle.len()..];
                continue 'next;
            }
        }

        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
}

// The phrase indexes hold plain maps of immutable phrases; a writer panic
// cannot leave them half-updated in a way later readers could misread.
fn read_lock(lock: &RwLock<PhraseIndex>) -> RwLockReadGuard<'_, PhraseIndex> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock(lock: &RwLock<PhraseIndex>) -> RwLockWriteGuard<'_, PhraseIndex> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock<'a>(mutex: &'a Mutex<Box<dyn BaseChecker>>) -> MutexGuard<'a, Box<dyn BaseChecker>> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speller::WordList;

    fn swedish_checker() -> LanguageChecker {
        let words = WordList::new([
            "han", "ska", "eller", "kan", "inte", "bestämma", "sig", "för", "om", "två",
            "Kanske", "blir", "det", "något", "mitt", "emellan",
        ])
        .with_suggestions("emmellan", ["emellan", "mellan"]);

        LanguageChecker::new("sv-se", Box::new(words))
    }

    fn entry_texts(result: &Misspelled) -> Vec<&str> {
        result.entries.iter().map(|e| e.text.as_str()).collect()
    }

    #[tokio::test]
    async fn cross_referencing_phrases_suggest_each_other() {
        let checker = swedish_checker();

        checker.add_phrase(Phrase {
            text: "fly".into(),
            common_mistakes: vec!["rymma".into()],
            description: "Vi flyr nödsituationer, rymmer från plats".into(),
            level: EntryLevel::Suggestion,
            ..Phrase::default()
        });

        checker.add_phrase(Phrase {
            text: "rymma".into(),
            common_mistakes: vec!["fly".into()],
            description: "Vi flyr nödsituationer, rymmer från plats".into(),
            level: EntryLevel::Suggestion,
            ..Phrase::default()
        });

        let result = checker
            .check("han ska fly eller rymma", true)
            .await
            .unwrap();

        assert_eq!(entry_texts(&result), vec!["fly", "rymma"]);

        for entry in &result.entries {
            assert_eq!(entry.level, EntryLevel::Suggestion);
            assert_eq!(entry.suggestions.len(), 1, "{entry:?}");
        }
        assert_eq!(result.entries[0].suggestions[0].text, "rymma");
        assert_eq!(result.entries[1].suggestions[0].text, "fly");
    }

    #[tokio::test]
    async fn templated_multi_word_mistake_matches() {
        let checker = swedish_checker();

        checker.add_phrase(Phrase {
            text: "Muammar Gaddafi".into(),
            common_mistakes: vec![
                "{Mohammar|Mohammer|Muammar|Muhammar|Muhammer} \
                 {Gadaffi|Ghadaffi|Ghadafi|Kadhaffi|Kadhafi|Khadaffi}"
                    .into(),
            ],
            level: EntryLevel::Error,
            ..Phrase::default()
        });

        let result = checker.check("Mohammar Khadaffi kan", false).await.unwrap();

        assert_eq!(entry_texts(&result), vec!["Mohammar Khadaffi"]);
        assert_eq!(result.entries[0].level, EntryLevel::Error);
        assert!(result.entries[0].suggestions.is_empty());
    }

    #[tokio::test]
    async fn residue_words_fall_through_to_base_checker() {
        let checker = swedish_checker();

        let result = checker
            .check("Kanske blir det något mitt emmellan.", true)
            .await
            .unwrap();

        assert_eq!(entry_texts(&result), vec!["emmellan"]);
        assert_eq!(result.entries[0].level, EntryLevel::Error);
        assert_eq!(result.entries[0].suggestions[0].text, "emellan");
    }

    #[tokio::test]
    async fn empty_text_is_clean() {
        let checker = swedish_checker();
        let result = checker.check("", true).await.unwrap();
        assert!(result.entries.is_empty());
    }

    #[tokio::test]
    async fn canonical_text_is_never_reported() {
        let checker = swedish_checker();

        checker.add_phrase(Phrase {
            text: "presskonferens".into(),
            common_mistakes: vec!["pressträff".into()],
            ..Phrase::default()
        });

        let result = checker.check("en presskonferens idag", false).await.unwrap();
        assert!(
            !entry_texts(&result).contains(&"presskonferens"),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn forms_map_to_their_corrections() {
        let checker = swedish_checker();

        checker.add_phrase(Phrase {
            text: "fotboll".into(),
            description: "en boll för fötter".into(),
            forms: [("fottbollar".to_string(), "fotbollar".to_string())]
                .into_iter()
                .collect(),
            ..Phrase::default()
        });

        let result = checker.check("två fottbollar", true).await.unwrap();

        assert_eq!(entry_texts(&result), vec!["fottbollar"]);
        assert_eq!(result.entries[0].suggestions.len(), 1);
        assert_eq!(result.entries[0].suggestions[0].text, "fotbollar");
        assert_eq!(
            result.entries[0].suggestions[0].description,
            "en boll för fötter"
        );

        // The corrected form is valid and silently accepted.
        let result = checker.check("två fotbollar", true).await.unwrap();
        assert!(result.entries.is_empty());
    }

    #[tokio::test]
    async fn replacing_a_phrase_drops_stale_keys() {
        let checker = swedish_checker();

        checker.add_phrase(Phrase {
            text: "fly".into(),
            common_mistakes: vec!["rymma".into(), "avvika".into()],
            level: EntryLevel::Suggestion,
            ..Phrase::default()
        });

        checker.add_phrase(Phrase {
            text: "fly".into(),
            common_mistakes: vec!["rymma".into()],
            level: EntryLevel::Suggestion,
            ..Phrase::default()
        });

        let result = checker.check("han ska avvika", false).await.unwrap();
        assert_eq!(entry_texts(&result), vec!["avvika"]);
        // "avvika" is flagged by the base checker, not the overlay.
        assert_eq!(result.entries[0].level, EntryLevel::Error);

        let result = checker.check("han ska rymma", false).await.unwrap();
        assert_eq!(result.entries[0].level, EntryLevel::Suggestion);
    }

    #[tokio::test]
    async fn remove_phrase_restores_previous_behaviour() {
        let checker = swedish_checker();

        let phrase = Phrase {
            text: "korvgrillning".into(),
            common_mistakes: vec!["korvgrilning".into()],
            forms: [("korvgrilningar".to_string(), "korvgrillningar".to_string())]
                .into_iter()
                .collect(),
            ..Phrase::default()
        };

        checker.add_phrase(phrase);

        let result = checker.check("korvgrillning", false).await.unwrap();
        assert!(result.entries.is_empty());
        let result = checker.check("korvgrillningar", false).await.unwrap();
        assert!(result.entries.is_empty());

        checker.remove_phrase("korvgrillning");

        // Every derived key behaves as if the phrase was never added: the
        // canonical text and the corrected form are unknown words again, and
        // the mistakes are plain base-checker misses.
        let result = checker
            .check("korvgrillning korvgrillningar korvgrilning korvgrilningar", false)
            .await
            .unwrap();
        assert_eq!(result.entries.len(), 4);
        for entry in &result.entries {
            assert_eq!(entry.level, EntryLevel::Error);
            assert!(entry.suggestions.is_empty());
        }

        assert!(checker.suggestions("korvgrilning").is_empty());
    }

    #[tokio::test]
    async fn malformed_templates_are_dropped_not_fatal() {
        let checker = swedish_checker();

        checker.add_phrase(Phrase {
            text: "fly".into(),
            common_mistakes: vec!["rymma {".into(), "avvika".into()],
            ..Phrase::default()
        });

        let result = checker.check("han ska avvika", false).await.unwrap();
        assert_eq!(entry_texts(&result), vec!["avvika"]);

        // The malformed template contributed nothing.
        let result = checker.check("rymma {", false).await.unwrap();
        assert_eq!(entry_texts(&result), vec!["rymma"]);
    }

    #[tokio::test]
    async fn repeated_words_are_reported_once() {
        let checker = swedish_checker();

        let result = checker.check("glass glass glass", false).await.unwrap();
        assert_eq!(entry_texts(&result), vec!["glass"]);
    }

    #[test]
    fn suggestions_prefer_the_overlay() {
        let checker = swedish_checker();

        checker.add_phrase(Phrase {
            text: "fly".into(),
            common_mistakes: vec!["rymma".into()],
            description: "hellre fly än illa fäkta".into(),
            level: EntryLevel::Suggestion,
            ..Phrase::default()
        });

        let suggestions = checker.suggestions("rymma");
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].text, "fly");
        assert_eq!(suggestions[0].description, "hellre fly än illa fäkta");

        // The canonical text itself never suggests itself.
        assert!(checker.suggestions("fly").is_empty());

        // Single misspelled words fall through to the base checker.
        let suggestions = checker.suggestions("emmellan");
        assert_eq!(suggestions[0].text, "emellan");
        assert_eq!(suggestions[1].text, "mellan");

        // Phrases are not sent to the base checker.
        assert!(checker.suggestions("helt okänd fras").is_empty());
    }

    #[test]
    fn strip_matches_deletes_every_occurrence() {
        let mut out = String::new();

        strip_matches(
            "Mohammar Khadaffi kan",
            &["Mohammar Khadaffi".to_string()],
            &mut out,
        );
        assert_eq!(out, " kan");

        strip_matches("a b a b c", &["a b".to_string()], &mut out);
        assert_eq!(out, "  c");

        strip_matches("oberörd", &[], &mut out);
        assert_eq!(out, "oberörd");
    }
}
