//! Dictionary store.
//!
//! Holds the normalized source text to translated text mapping. Loaded once
//! at startup and read-only afterwards, so it is shared between the frame
//! thread and discovery workers without locking.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::normalize::normalize;

/// Outcome of a successful [`Dictionary::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Entries were read from disk.
    Loaded { entries: usize, files: usize },
    /// Nothing exists at the configured path. Text passes through untranslated.
    Missing,
}

/// Dictionary together with how it was obtained.
#[derive(Debug)]
pub struct DictionaryLoad {
    pub dictionary: Dictionary,
    pub status: LoadStatus,
}

/// Normalized source text to translated text.
#[derive(Debug, Default, Clone)]
pub struct Dictionary {
    entries: HashMap<String, String>,
    /// Normalized forms of every translated value.
    translated: HashSet<String>,
}

impl Dictionary {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dictionary from raw pairs.
    ///
    /// Keys are normalized, empty values are skipped and the first non-empty
    /// value for a key wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut dictionary = Self::new();
        for (key, value) in pairs {
            dictionary.insert(key.as_ref(), value.into());
        }
        dictionary
    }

    fn insert(&mut self, raw_key: &str, value: String) -> bool {
        if value.is_empty() {
            return false;
        }
        let key = normalize(raw_key);
        if key.is_empty() || self.entries.contains_key(&key) {
            return false;
        }
        self.translated.insert(normalize(&value));
        self.entries.insert(key, value);
        true
    }

    /// Loads the dictionary from a JSON file or a directory of JSON files.
    ///
    /// A missing path yields an empty dictionary with [`LoadStatus::Missing`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DictionaryLoad, LoadError> {
        let path = path.as_ref();
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(DictionaryLoad {
                    dictionary: Self::new(),
                    status: LoadStatus::Missing,
                });
            }
            Err(source) => {
                return Err(LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut dictionary = Self::new();
        if !metadata.is_dir() {
            let added = dictionary.merge_file(path)?;
            debug!("Loaded {} entries from {}", added, path.display());
            let status = LoadStatus::Loaded {
                entries: dictionary.len(),
                files: 1,
            };
            return Ok(DictionaryLoad { dictionary, status });
        }

        // One bad file in a directory must not discard the others.
        let mut loaded = 0;
        for file in json_files_in(path)? {
            match dictionary.merge_file(&file) {
                Ok(added) => {
                    debug!("Loaded {} entries from {}", added, file.display());
                    loaded += 1;
                }
                Err(e) => warn!("Skipping {}", e),
            }
        }

        let status = LoadStatus::Loaded {
            entries: dictionary.len(),
            files: loaded,
        };
        Ok(DictionaryLoad { dictionary, status })
    }

    /// Loads the dictionary, degrading to an empty one on any failure.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(DictionaryLoad {
                dictionary,
                status: LoadStatus::Loaded { entries, files },
            }) => {
                info!(
                    "Loaded {} translations from {} file(s) at {}",
                    entries,
                    files,
                    path.display()
                );
                dictionary
            }
            Ok(DictionaryLoad { dictionary, .. }) => {
                warn!(
                    "Translation dictionary not found at {}; text will pass through untranslated",
                    path.display()
                );
                dictionary
            }
            Err(e) => {
                warn!("{}; text will pass through untranslated", e);
                Self::new()
            }
        }
    }

    fn merge_file(&mut self, file: &Path) -> Result<usize, LoadError> {
        let content = fs::read_to_string(file).map_err(|source| LoadError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        // Tooling sometimes writes a BOM.
        let content = content.strip_prefix('\u{FEFF}').unwrap_or(&content);
        let raw: indexed::Pairs =
            serde_json::from_str(content).map_err(|source| LoadError::Corrupt {
                path: file.to_path_buf(),
                source,
            })?;

        let mut added = 0;
        for (key, value) in raw.0 {
            if self.insert(&key, value) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Looks up the translation for `source`, normalizing it first.
    pub fn lookup(&self, source: &str) -> Option<&str> {
        let key = normalize(source);
        self.lookup_normalized(&key)
    }

    /// Looks up an already normalized key.
    #[inline]
    pub fn lookup_normalized(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        self.entries.get(key).map(String::as_str)
    }

    /// Returns true when `text` is one of the translated values.
    #[inline]
    pub fn is_translation(&self, normalized: &str) -> bool {
        self.translated.contains(normalized)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn json_files_in(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

mod indexed {
    //! Order-preserving JSON object reader, so "first value wins" follows the
    //! order of the file rather than hash order.

    use std::fmt;

    use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};

    pub struct Pairs(pub Vec<(String, String)>);

    impl<'de> Deserialize<'de> for Pairs {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct PairsVisitor;

            impl<'de> Visitor<'de> for PairsVisitor {
                type Value = Pairs;

                fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    f.write_str("an object mapping source text to translated text")
                }

                fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Pairs, A::Error> {
                    let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                    while let Some((key, value)) = map.next_entry::<String, Option<String>>()? {
                        pairs.push((key, value.unwrap_or_default()));
                    }
                    Ok(Pairs(pairs))
                }
            }

            deserializer.deserialize_map(PairsVisitor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).expect("Failed to write test file");
        path
    }

    #[test]
    fn test_lookup_normalizes_input() {
        let dict = Dictionary::from_pairs([("Hello world", "Привет, мир")]);
        assert_eq!(dict.lookup("Hello world"), Some("Привет, мир"));
        assert_eq!(dict.lookup("  Hello   world \n"), Some("Привет, мир"));
        assert_eq!(dict.lookup("Hello\u{00A0}world"), Some("Привет, мир"));
    }

    #[test]
    fn test_keys_normalized_at_load() {
        let dict = Dictionary::from_pairs([("Loading.....  ", "Загрузка...")]);
        assert_eq!(dict.lookup("Loading..."), Some("Загрузка..."));
    }

    #[test]
    fn test_lookup_absent_and_empty() {
        let dict = Dictionary::from_pairs([("Hello", "Привет")]);
        assert_eq!(dict.lookup("Goodbye"), None);
        assert_eq!(dict.lookup(""), None);
        assert_eq!(dict.lookup("   "), None);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_empty_values_skipped_and_first_wins() {
        let dict = Dictionary::from_pairs([
            ("Start", ""),
            ("Start", "Начать"),
            ("Start ", "Старт"),
        ]);
        assert_eq!(dict.lookup("Start"), Some("Начать"));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_is_translation() {
        let dict = Dictionary::from_pairs([("Hello", "Привет")]);
        assert!(dict.is_translation("Привет"));
        assert!(!dict.is_translation("Hello"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let loaded = Dictionary::load(dir.path().join("nope.json")).expect("Missing is not an error");
        assert_eq!(loaded.status, LoadStatus::Missing);
        assert!(loaded.dictionary.is_empty());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write(dir.path(), "ru.json", "{ \"Hello\": ");
        match Dictionary::load(&path) {
            Err(LoadError::Corrupt { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected corrupt error, got {:?}", other.map(|l| l.status)),
        }
        assert!(Dictionary::load_or_empty(&path).is_empty());
    }

    #[test]
    fn test_load_file_with_bom_and_nulls() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write(
            dir.path(),
            "ru.json",
            "\u{FEFF}{\"Hello\": \"Привет\", \"Later\": null, \"Exit\": \"Выход\"}",
        );
        let loaded = Dictionary::load(&path).expect("Failed to load");
        assert_eq!(loaded.status, LoadStatus::Loaded { entries: 2, files: 1 });
        assert_eq!(loaded.dictionary.lookup("Exit"), Some("Выход"));
        assert_eq!(loaded.dictionary.lookup("Later"), None);
    }

    #[test]
    fn test_load_directory_in_name_order() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        write(dir.path(), "b_menu.json", "{\"Start\": \"Старт\", \"Quit\": \"Выйти\"}");
        write(dir.path(), "a_core.json", "{\"Start\": \"Начать\"}");
        write(dir.path(), "notes.txt", "not json");

        let loaded = Dictionary::load(dir.path()).expect("Failed to load directory");
        assert_eq!(loaded.status, LoadStatus::Loaded { entries: 2, files: 2 });
        assert_eq!(loaded.dictionary.lookup("Start"), Some("Начать"));
        assert_eq!(loaded.dictionary.lookup("Quit"), Some("Выйти"));
    }

    #[test]
    fn test_load_directory_skips_corrupt_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        write(dir.path(), "a_broken.json", "{ \"Start\": ");
        write(dir.path(), "b_menu.json", "{\"Quit\": \"Выйти\"}");

        let loaded = Dictionary::load(dir.path()).expect("A corrupt file must not fail the directory");
        assert_eq!(loaded.status, LoadStatus::Loaded { entries: 1, files: 1 });
        assert_eq!(loaded.dictionary.lookup("Quit"), Some("Выйти"));
        assert_eq!(loaded.dictionary.lookup("Start"), None);
    }
}
