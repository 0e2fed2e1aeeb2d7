/*! Overlay-first multilingual spellchecking.

A conventional affix/dictionary spellchecker answers "is this word spelled
correctly". This library layers a curated overlay on top of it: per language,
a live index of editorial phrases, inflected forms, and common-mistake
patterns. Text is matched against the overlay first, multi-word phrases
included, and only the residue is handed to the base checker.

The overlay is backed by a PostgreSQL table and kept consistent across
running instances through `LISTEN`/`NOTIFY`; see [`store`] and [`sync`]. The
RPC surface lives in [`service`], and the per-language checking unit in
[`checker`].

```no_run
use stavfel::checker::{LanguageChecker, Phrase};
use stavfel::speller::WordList;

# async fn example() {
let checker = LanguageChecker::new("sv-se", Box::new(WordList::new(["han", "ska"])));

checker.add_phrase(Phrase {
    text: "fly".into(),
    common_mistakes: vec!["rymma".into()],
    ..Phrase::default()
});

let result = checker.check("han ska rymma", true).await.unwrap();
assert_eq!(result.entries[0].text, "rymma");
# }
```
*/

pub mod checker;
pub mod dicts;
pub mod expand;
pub mod phrases;
pub mod service;
pub mod speller;
pub mod store;
pub mod sync;
pub mod tokenizer;

pub(crate) mod pool;
