//! Word segmentation for overlay matching.
//!
//! The overlay works on alternating runs of letter and non-letter characters.
//! Digits and punctuation count as separators, so `"3rd"` segments as
//! `["3", "rd"]` and only `"rd"` is a word token.

/// Classification of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A maximal run of alphabetic characters.
    Letter,
    /// Everything between two letter runs: whitespace, punctuation, digits.
    Other,
}

impl TokenKind {
    #[inline(always)]
    fn of(ch: char) -> TokenKind {
        if ch.is_alphabetic() {
            TokenKind::Letter
        } else {
            TokenKind::Other
        }
    }
}

/// A slice of the input together with its classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub kind: TokenKind,
}

impl<'a> Token<'a> {
    /// Whether this token is a word.
    #[inline(always)]
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Letter
    }
}

/// Iterator over the tokens of a string, in order, without gaps.
///
/// Concatenating the yielded token texts reproduces the input exactly.
pub struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let first = self.rest.chars().next()?;
        let kind = TokenKind::of(first);

        let end = self
            .rest
            .char_indices()
            .find(|&(_, ch)| TokenKind::of(ch) != kind)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());

        let token = Token {
            text: &self.rest[..end],
            kind,
        };
        self.rest = &self.rest[end..];

        Some(token)
    }
}

/// Iterator over only the word tokens of a string.
pub type Words<'a> = std::iter::Filter<Tokens<'a>, fn(&Token<'a>) -> bool>;

pub trait Tokenize {
    fn tokens(&self) -> Tokens<'_>;
    fn words(&self) -> Words<'_>;
}

impl Tokenize for str {
    fn tokens(&self) -> Tokens<'_> {
        Tokens { rest: self }
    }

    fn words(&self) -> Words<'_> {
        fn is_word(token: &Token<'_>) -> bool {
            token.is_word()
        }

        self.tokens().filter(is_word as fn(&Token<'_>) -> bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<(&str, TokenKind)> {
        input.tokens().map(|t| (t.text, t.kind)).collect()
    }

    #[test]
    fn alternating_runs() {
        assert_eq!(
            texts("han ska fly!"),
            vec![
                ("han", TokenKind::Letter),
                (" ", TokenKind::Other),
                ("ska", TokenKind::Letter),
                (" ", TokenKind::Other),
                ("fly", TokenKind::Letter),
                ("!", TokenKind::Other),
            ]
        );
    }

    #[test]
    fn digits_are_separators() {
        assert_eq!(
            texts("3rd of May"),
            vec![
                ("3", TokenKind::Other),
                ("rd", TokenKind::Letter),
                (" ", TokenKind::Other),
                ("of", TokenKind::Letter),
                (" ", TokenKind::Other),
                ("May", TokenKind::Letter),
            ]
        );
    }

    #[test]
    fn non_ascii_letters() {
        assert_eq!(
            "något mitt emellan".words().map(|t| t.text).collect::<Vec<_>>(),
            vec!["något", "mitt", "emellan"]
        );
    }

    #[test]
    fn roundtrip_is_lossless() {
        let input = "  Kanske, blir det – något (mitt) emellan?\n";
        let rebuilt: String = input.tokens().map(|t| t.text).collect();
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn empty_input() {
        assert_eq!("".tokens().count(), 0);
    }
}
