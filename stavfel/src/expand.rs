//! Brace-alternation template expansion.
//!
//! A mistake template like `"{Mohammar|Muammar} {Gadaffi|Khadaffi}"` stands
//! for the full cross product of its alternatives. [`expand`] turns a template
//! into that list of literal strings.

use thiserror::Error;

/// A template that cannot be expanded.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExpandError {
    #[error("nested brace at offset {0}")]
    NestedBrace(usize),

    #[error("unexpected closing brace at offset {0}")]
    UnexpectedClose(usize),

    #[error("unclosed brace at offset {0}")]
    UnclosedBrace(usize),
}

/// Expands a template with `{a|b}` alternation groups into all permutations.
///
/// A group contributes one of its `|`-separated options at its position; the
/// empty group `{}` contributes the empty string. Output order is row-major:
/// `"{A|B} {1|2}"` expands to `["A 1", "A 2", "B 1", "B 2"]`. A template
/// without braces yields itself, and the empty template yields `[""]`.
///
/// Nested and unbalanced braces are rejected with the byte offset of the
/// offending character.
pub fn expand(input: &str) -> Result<Vec<String>, ExpandError> {
    let mut parts: Vec<Vec<String>> = Vec::new();
    let mut buffer = String::new();
    let mut open_brace: Option<usize> = None;

    for (i, ch) in input.char_indices() {
        match ch {
            '{' => {
                if open_brace.is_some() {
                    return Err(ExpandError::NestedBrace(i));
                }

                // Flush the static text accumulated so far.
                if !buffer.is_empty() {
                    parts.push(vec![std::mem::take(&mut buffer)]);
                }

                open_brace = Some(i);
            }
            '}' => {
                if open_brace.is_none() {
                    return Err(ExpandError::UnexpectedClose(i));
                }

                // Flush the alternatives. Splitting the empty group gives a
                // single empty option, which is what we want for "{}".
                parts.push(buffer.split('|').map(str::to_owned).collect());
                buffer.clear();

                open_brace = None;
            }
            _ => buffer.push(ch),
        }
    }

    if let Some(offset) = open_brace {
        return Err(ExpandError::UnclosedBrace(offset));
    }

    if !buffer.is_empty() {
        parts.push(vec![buffer]);
    }

    if parts.is_empty() {
        return Ok(vec![String::new()]);
    }

    let mut results = vec![String::new()];

    for part in &parts {
        let mut next = Vec::with_capacity(results.len() * part.len());

        for prefix in &results {
            for option in part {
                let mut combined = String::with_capacity(prefix.len() + option.len());
                combined.push_str(prefix);
                combined.push_str(option);
                next.push(combined);
            }
        }

        results = next;
    }

    Ok(results)
}
