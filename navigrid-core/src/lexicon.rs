//! The sign lexicon: a learned, persisted map from sign phrases to landmarks.
//!
//! Phrases are stored normalized (lowercase, trimmed). The map only grows:
//! the first landmark written for a phrase is kept for the rest of the run,
//! and insertion order is preserved both in memory and on disk because the
//! detection matcher scans entries in that order.

use crate::landmark::{LandmarkId, LandmarkRegistry};
use crate::store::{JsonFile, Loaded, PersistError};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// Built-in phrases used when the registry declares no `signs`.
pub const DEFAULT_SIGNS: &[(&str, &str)] = &[
    ("045", "room_045"),
    ("040", "room_040"),
    ("025", "room_025"),
    ("010", "room_010"),
    ("active learning", "room_045"),
    ("stair", "stairs"),
    ("stairs", "stairs"),
    ("125", "125"),
    ("130", "130"),
    ("135", "135"),
    ("140", "140"),
    ("main hall", "main_hall"),
    ("exit", "exit"),
];

/// Lowercase and trim a phrase.
pub fn normalize(phrase: &str) -> String {
    phrase.trim().to_lowercase()
}

/// Seed phrases for a building: the registry's declared signs, or the
/// built-in set when it declares none.
pub fn default_signs(registry: &LandmarkRegistry) -> Vec<(String, LandmarkId)> {
    let declared = registry.declared_signs();
    if declared.is_empty() {
        DEFAULT_SIGNS
            .iter()
            .map(|(phrase, id)| (phrase.to_string(), LandmarkId::from(*id)))
            .collect()
    } else {
        declared.to_vec()
    }
}

/// Ordered phrase map. Serializes as a flat JSON object in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
struct PhraseMap {
    entries: Vec<(String, LandmarkId)>,
    index: HashMap<String, usize>,
}

impl PhraseMap {
    /// Insert a normalized phrase unless it is empty or already present.
    fn insert(&mut self, phrase: String, id: LandmarkId) -> bool {
        if phrase.is_empty() || self.index.contains_key(&phrase) {
            return false;
        }
        self.index.insert(phrase.clone(), self.entries.len());
        self.entries.push((phrase, id));
        true
    }

    fn from_pairs(pairs: impl IntoIterator<Item = (String, LandmarkId)>) -> Self {
        let mut map = Self::default();
        for (phrase, id) in pairs {
            map.insert(normalize(&phrase), id);
        }
        map
    }
}

impl Serialize for PhraseMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (phrase, id) in &self.entries {
            map.serialize_entry(phrase, id)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PhraseMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PhraseMapVisitor;

        impl<'de> Visitor<'de> for PhraseMapVisitor {
            type Value = PhraseMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping sign phrases to landmark ids")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PhraseMap, A::Error> {
                let mut map = PhraseMap::default();
                while let Some((phrase, id)) = access.next_entry::<String, LandmarkId>()? {
                    map.insert(normalize(&phrase), id);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(PhraseMapVisitor)
    }
}

/// The persisted sign lexicon.
#[derive(Debug)]
pub struct SignLexicon {
    phrases: PhraseMap,
    file: JsonFile,
}

impl SignLexicon {
    /// Load the lexicon from `path`.
    ///
    /// A missing file is seeded from `defaults` and written immediately. A
    /// file that does not parse is moved to `{path}.corrupt` and replaced the
    /// same way. Only a failure to read or to move a bad file aside is fatal;
    /// a failure to write the seeded defaults is logged and the in-memory
    /// lexicon is still returned.
    pub async fn load(
        path: impl Into<PathBuf>,
        defaults: Vec<(String, LandmarkId)>,
    ) -> Result<Self, PersistError> {
        let file = JsonFile::new(path);

        let phrases = match file.read_or_quarantine::<PhraseMap>().await? {
            Loaded::Found(phrases) => {
                info!(
                    path = %file.path().display(),
                    phrases = phrases.entries.len(),
                    "loaded sign lexicon"
                );
                return Ok(Self { phrases, file });
            }
            Loaded::Absent | Loaded::Quarantined { .. } => PhraseMap::from_pairs(defaults),
        };

        let lexicon = Self { phrases, file };
        match lexicon.save().await {
            Ok(()) => info!(
                path = %lexicon.file.path().display(),
                phrases = lexicon.len(),
                "seeded sign lexicon"
            ),
            Err(e) => warn!(error = %e, "could not write seeded sign lexicon"),
        }
        Ok(lexicon)
    }

    /// A lexicon that is never read back; writes still go to `path`.
    pub fn with_entries(
        path: impl Into<PathBuf>,
        entries: impl IntoIterator<Item = (String, LandmarkId)>,
    ) -> Self {
        Self {
            phrases: PhraseMap::from_pairs(entries),
            file: JsonFile::new(path),
        }
    }

    /// Learn `phrase` for `landmark`.
    ///
    /// Returns `Ok(false)` when the normalized phrase is empty or already
    /// known. On a persist failure the entry stays in memory and the error is
    /// returned.
    pub async fn insert(
        &mut self,
        phrase: &str,
        landmark: &LandmarkId,
    ) -> Result<bool, PersistError> {
        let key = normalize(phrase);
        if !self.phrases.insert(key.clone(), landmark.clone()) {
            return Ok(false);
        }
        info!(phrase = %key, landmark = %landmark, "learned sign");
        self.save().await?;
        Ok(true)
    }

    /// Rewrite the whole file.
    pub async fn save(&self) -> Result<(), PersistError> {
        self.file.write(&self.phrases).await
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[(String, LandmarkId)] {
        &self.phrases.entries
    }

    pub fn get(&self, phrase: &str) -> Option<&LandmarkId> {
        self.phrases
            .index
            .get(&normalize(phrase))
            .map(|&i| &self.phrases.entries[i].1)
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.get(phrase).is_some()
    }

    pub fn len(&self) -> usize {
        self.phrases.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.entries.is_empty()
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }
}
