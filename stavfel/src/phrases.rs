//! Sliding-window enumeration of candidate word sequences.
//!
//! The overlay indexes multi-word phrases, so checking a text means looking up
//! every contiguous word n-gram, not just every word. [`Phrases`] runs a
//! window over the token stream and yields each sequence exactly when its last
//! word has been read, separators preserved.

use std::collections::VecDeque;

use crate::tokenizer::{Token, TokenKind, Tokenize, Tokens};

/// Longest phrase, in words, the overlay will match.
pub const MAX_PHRASE_WORDS: usize = 3;

/// The window keeps this many tokens per word slot, leaving room for the
/// separator tokens interleaved between words.
const TOKENS_PER_WORD: usize = 4;

/// Lazily yields every contiguous word sequence of at most `max_words` words.
///
/// Each time a word token is read, the sequences ending at that word are
/// yielded: the word alone first, then extending leftward one word at a time.
/// Concatenation preserves the separators between the words.
///
/// The iterator is finite and single-use; a consumer cancels simply by
/// dropping it.
pub struct Phrases<'a> {
    tokens: Tokens<'a>,
    window: VecDeque<Token<'a>>,
    max_words: usize,
    pending: VecDeque<String>,
}

impl<'a> Phrases<'a> {
    pub fn new(text: &'a str, max_words: usize) -> Phrases<'a> {
        Phrases {
            tokens: text.tokens(),
            window: VecDeque::with_capacity(max_words * TOKENS_PER_WORD),
            max_words,
            pending: VecDeque::new(),
        }
    }

    /// Queue up all sequences that end at the newest token, shortest first.
    fn collect_sequences(&mut self) {
        let starts: Vec<usize> = self
            .window
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, t)| t.kind == TokenKind::Letter)
            .map(|(i, _)| i)
            .take(self.max_words)
            .collect();

        for &start in &starts {
            let sequence: String = self.window.iter().skip(start).map(|t| t.text).collect();
            self.pending.push_back(sequence);
        }
    }
}

impl<'a> Iterator for Phrases<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(sequence) = self.pending.pop_front() {
                return Some(sequence);
            }

            let token = self.tokens.next()?;

            if self.window.len() == self.max_words * TOKENS_PER_WORD {
                self.window.pop_front();
            }
            self.window.push_back(token);

            if token.kind == TokenKind::Letter {
                self.collect_sequences();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenize;

    fn all(text: &str) -> Vec<String> {
        Phrases::new(text, MAX_PHRASE_WORDS).collect()
    }

    #[test]
    fn yields_every_ending_word_shortest_first() {
        assert_eq!(
            all("han ska fly"),
            vec![
                "han",
                "ska",
                "han ska",
                "fly",
                "ska fly",
                "han ska fly",
            ]
        );
    }

    #[test]
    fn separators_are_preserved() {
        let got = all("Mohammar Khadaffi, kan");
        assert!(got.contains(&"Mohammar Khadaffi".to_string()));
        assert!(got.contains(&"Khadaffi, kan".to_string()));
        assert!(got.contains(&"Mohammar Khadaffi, kan".to_string()));
    }

    #[test]
    fn never_more_than_max_words() {
        for sequence in all("en två tre fyra fem sex sju") {
            let words = sequence.as_str().words().count();
            assert!(words <= MAX_PHRASE_WORDS, "{sequence:?} has {words} words");
        }
    }

    #[test]
    fn window_slides_past_old_words() {
        let got = all("en två tre fyra");
        // The last word still extends to the full three-word tail.
        assert_eq!(got.last().map(String::as_str), Some("två tre fyra"));
        assert!(got.contains(&"fyra".to_string()));
        assert!(!got.contains(&"en två tre fyra".to_string()));
    }

    #[test]
    fn punctuation_only_yields_nothing() {
        assert!(all("... 1234 !?").is_empty());
        assert!(all("").is_empty());
    }

    #[test]
    fn leading_separators_are_not_included() {
        assert_eq!(all("  hej"), vec!["hej"]);
    }
}
