//! Discovery of bundled Hunspell dictionaries.
//!
//! A dictionary directory holds `NAME.aff`/`NAME.dic` pairs, one per
//! language, named the Hunspell way (`sv_SE.dic`). Each discovered pair
//! becomes a supported language under its normalised code (`sv-se`).

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("list dictionary directory {dir:?}: {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One discovered dictionary pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryPaths {
    /// Normalised language code, e.g. `sv-se`.
    pub language: String,
    pub affix: PathBuf,
    pub dictionary: PathBuf,
}

/// Maps a dictionary file name to a language code: lowercased, with the
/// first underscore turned into a dash (`sv_SE` becomes `sv-se`).
pub fn normalize_language(name: &str) -> String {
    name.to_lowercase().replacen('_', "-", 1)
}

/// Scans `dir` for dictionary pairs, sorted by language code.
///
/// A `.dic` file without its sibling `.aff` is skipped with a warning; an
/// empty result is left for the caller to treat as fatal.
pub fn discover(dir: &Path) -> Result<Vec<DictionaryPaths>, DiscoverError> {
    let entries = std::fs::read_dir(dir).map_err(|source| DiscoverError::ReadDir {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut found = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|source| DiscoverError::ReadDir {
            dir: dir.to_path_buf(),
            source,
        })?;

        let dictionary = entry.path();

        if dictionary.extension().map_or(true, |ext| ext != "dic") {
            continue;
        }

        let Some(stem) = dictionary.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let affix = dictionary.with_extension("aff");

        if !affix.is_file() {
            log::warn!("skipping {dictionary:?}: no matching .aff file");
            continue;
        }

        found.push(DictionaryPaths {
            language: normalize_language(stem),
            affix,
            dictionary,
        });
    }

    found.sort_by(|a, b| a.language.cmp(&b.language));

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes_are_normalised() {
        assert_eq!(normalize_language("sv_SE"), "sv-se");
        assert_eq!(normalize_language("en_US"), "en-us");
        assert_eq!(normalize_language("nb"), "nb");
        // Only the first underscore separates language from region.
        assert_eq!(normalize_language("x_y_z"), "x-y_z");
    }

    #[test]
    fn discovers_complete_pairs_only() {
        let dir = tempfile::tempdir().unwrap();

        std::fs::write(dir.path().join("sv_SE.aff"), "SET UTF-8\n").unwrap();
        std::fs::write(dir.path().join("sv_SE.dic"), "1\nhej\n").unwrap();
        std::fs::write(dir.path().join("da_DK.dic"), "1\nhej\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a dictionary").unwrap();

        let found = discover(dir.path()).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].language, "sv-se");
        assert!(found[0].affix.ends_with("sv_SE.aff"));
        assert!(found[0].dictionary.ends_with("sv_SE.dic"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(discover(Path::new("/nonexistent/dictionaries")).is_err());
    }
}
