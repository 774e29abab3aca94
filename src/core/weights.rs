use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_IMPORTANT_KEYS: &[&str] = &["Author", "Creator", "Producer"];
pub const DEFAULT_RARE_KEYS: &[&str] = &["Language", "ModifyDate", "PDFVersion"];

const IMPORTANT_WEIGHT: u32 = 2;
const RARE_WEIGHT: u32 = 3;
const BASE_WEIGHT: u32 = 1;

/// Weighting policy applied to matching keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingSystem {
    Equal,
    ImportantKeys,
    RareKeys,
    Custom,
}

impl WeightingSystem {
    pub const ALL: [WeightingSystem; 4] = [
        WeightingSystem::Equal,
        WeightingSystem::ImportantKeys,
        WeightingSystem::RareKeys,
        WeightingSystem::Custom,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            WeightingSystem::Equal => "equal",
            WeightingSystem::ImportantKeys => "important_keys",
            WeightingSystem::RareKeys => "rare_keys",
            WeightingSystem::Custom => "custom",
        }
    }
}

impl fmt::Display for WeightingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for WeightingSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WeightingSystem::ALL
            .into_iter()
            .find(|system| system.id() == s.trim())
            .ok_or_else(|| format!("unknown weighting system '{}'", s))
    }
}

/// A set of key names. Entries without a group prefix (`Author`) match any
/// group (`PDF:Author`, `XMP:Author`); prefixed entries match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    exact: BTreeSet<String>,
    fields: BTreeSet<String>,
}

impl KeySet {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = KeySet::default();
        for entry in entries {
            let entry = entry.into();
            if entry.contains(':') {
                set.exact.insert(entry);
            } else {
                set.fields.insert(entry);
            }
        }
        set
    }

    pub fn contains(&self, key: &str) -> bool {
        if self.exact.contains(key) {
            return true;
        }
        let field = key.rsplit_once(':').map_or(key, |(_, field)| field);
        self.fields.contains(field)
    }
}

/// The important/rare key sets backing the built-in policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySets {
    pub important: KeySet,
    pub rare: KeySet,
}

impl Default for KeySets {
    fn default() -> Self {
        Self {
            important: KeySet::new(DEFAULT_IMPORTANT_KEYS.iter().copied()),
            rare: KeySet::new(DEFAULT_RARE_KEYS.iter().copied()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WeightParseError {
    #[error("entry {position} ('{entry}') is missing a ':' between key and weight")]
    MissingColon { position: usize, entry: String },

    #[error("entry {position} ('{entry}') has an empty key")]
    EmptyKey { position: usize, entry: String },

    #[error("entry {position} ('{entry}'): key '{key}' has an empty group or field name")]
    MalformedKey {
        position: usize,
        entry: String,
        key: String,
    },

    #[error("entry {position} ('{entry}'): weight '{weight}' is not a positive integer")]
    InvalidWeight {
        position: usize,
        entry: String,
        weight: String,
    },
}

/// User-supplied key → weight mapping, parsed from `key:weight,key:weight`.
/// The weight follows the last colon of an entry, so group-qualified keys
/// such as `PDF:Author:3` are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomWeights(BTreeMap<String, u32>);

impl CustomWeights {
    /// Weight for a metadata key. An exact entry wins over an entry naming
    /// only the field part (`Author` for `PDF:Author`).
    pub fn get(&self, key: &str) -> Option<u32> {
        self.0.get(key).copied().or_else(|| {
            key.rsplit_once(':')
                .and_then(|(_, field)| self.0.get(field).copied())
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromStr for CustomWeights {
    type Err = WeightParseError;

    /// Either every entry parses or nothing is returned.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut weights = BTreeMap::new();
        if input.trim().is_empty() {
            return Ok(CustomWeights(weights));
        }

        for (index, raw) in input.split(',').enumerate() {
            let position = index + 1;
            let entry = raw.trim();
            let Some((key, weight)) = entry.rsplit_once(':') else {
                return Err(WeightParseError::MissingColon {
                    position,
                    entry: entry.to_string(),
                });
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(WeightParseError::EmptyKey {
                    position,
                    entry: entry.to_string(),
                });
            }
            if key.split(':').any(|part| part.trim().is_empty()) {
                return Err(WeightParseError::MalformedKey {
                    position,
                    entry: entry.to_string(),
                    key: key.to_string(),
                });
            }

            let weight_text = weight.trim();
            let weight = match weight_text.parse::<u32>() {
                Ok(w) if w > 0 => w,
                _ => {
                    return Err(WeightParseError::InvalidWeight {
                        position,
                        entry: entry.to_string(),
                        weight: weight_text.to_string(),
                    });
                }
            };

            weights.insert(key.to_string(), weight);
        }

        Ok(CustomWeights(weights))
    }
}

/// Everything a weight depends on besides the policy and the key.
#[derive(Debug, Clone, Default)]
pub struct Weights {
    pub key_sets: KeySets,
    pub custom: CustomWeights,
}

impl Weights {
    pub fn new(key_sets: KeySets, custom: CustomWeights) -> Self {
        Self { key_sets, custom }
    }

    /// Weight contributed by one matching key. Always at least 1.
    pub fn weight(&self, system: WeightingSystem, key: &str) -> u32 {
        match system {
            WeightingSystem::Equal => BASE_WEIGHT,
            WeightingSystem::ImportantKeys if self.key_sets.important.contains(key) => {
                IMPORTANT_WEIGHT
            }
            WeightingSystem::RareKeys if self.key_sets.rare.contains(key) => RARE_WEIGHT,
            WeightingSystem::ImportantKeys | WeightingSystem::RareKeys => BASE_WEIGHT,
            WeightingSystem::Custom => self.custom.get(key).unwrap_or(BASE_WEIGHT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_custom_weights() {
        let weights: CustomWeights = "Author:3,Title:2".parse().unwrap();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights.get("Author"), Some(3));
        assert_eq!(weights.get("Title"), Some(2));
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let weights: CustomWeights = " Author : 4 , Title:1 ".parse().unwrap();
        assert_eq!(weights.get("Author"), Some(4));
        assert_eq!(weights.get("Title"), Some(1));
    }

    #[test]
    fn test_parse_group_qualified_key() {
        let weights: CustomWeights = "PDF:Author:4".parse().unwrap();
        assert_eq!(weights.get("PDF:Author"), Some(4));
        assert_eq!(weights.get("XMP:Author"), None);
    }

    #[test]
    fn test_field_entry_matches_any_group() {
        let weights: CustomWeights = "Author:3,XMP:Author:7".parse().unwrap();
        assert_eq!(weights.get("PDF:Author"), Some(3));
        assert_eq!(weights.get("XMP:Author"), Some(7));
        assert_eq!(weights.get("Author"), Some(3));
    }

    #[test]
    fn test_parse_rejects_partial_input() {
        let err = "Author:3,BadEntry".parse::<CustomWeights>().unwrap_err();
        assert_eq!(
            err,
            WeightParseError::MissingColon {
                position: 2,
                entry: "BadEntry".to_string()
            }
        );
        assert!(err.to_string().contains("entry 2"));
    }

    #[test]
    fn test_parse_rejects_bad_weights() {
        for input in ["Author:x", "Author:0", "Author:-2", "Author:", "Author:1.5"] {
            let err = input.parse::<CustomWeights>().unwrap_err();
            assert!(
                matches!(err, WeightParseError::InvalidWeight { position: 1, .. }),
                "{}",
                input
            );
        }
        assert!(matches!(
            ":3".parse::<CustomWeights>(),
            Err(WeightParseError::EmptyKey { .. })
        ));
        assert!(matches!(
            "Author:3,".parse::<CustomWeights>(),
            Err(WeightParseError::MissingColon { position: 2, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_empty_key_parts() {
        for input in ["Author::3", ":Author:3", "PDF::Author:3", "Title:1,XMP: :2"] {
            let err = input.parse::<CustomWeights>().unwrap_err();
            assert!(
                matches!(err, WeightParseError::MalformedKey { .. }),
                "{}",
                input
            );
        }
        let err = "Title:1,Author::3".parse::<CustomWeights>().unwrap_err();
        assert_eq!(
            err,
            WeightParseError::MalformedKey {
                position: 2,
                entry: "Author::3".to_string(),
                key: "Author:".to_string(),
            }
        );
    }

    #[test]
    fn test_blank_input_is_empty() {
        assert!("".parse::<CustomWeights>().unwrap().is_empty());
        assert!("   ".parse::<CustomWeights>().unwrap().is_empty());
    }

    #[test]
    fn test_key_set_matching() {
        let set = KeySet::new(["Author", "XMP:Subject"]);
        assert!(set.contains("Author"));
        assert!(set.contains("PDF:Author"));
        assert!(set.contains("XMP:Subject"));
        assert!(!set.contains("PDF:Subject"));
        assert!(!set.contains("PDF:AuthorName"));
    }

    #[test]
    fn test_weights_per_system() {
        let custom: CustomWeights = "Title:5".parse().unwrap();
        let weights = Weights::new(KeySets::default(), custom);

        assert_eq!(weights.weight(WeightingSystem::Equal, "PDF:Author"), 1);
        assert_eq!(weights.weight(WeightingSystem::ImportantKeys, "PDF:Author"), 2);
        assert_eq!(weights.weight(WeightingSystem::ImportantKeys, "PDF:Title"), 1);
        assert_eq!(weights.weight(WeightingSystem::RareKeys, "PDF:PDFVersion"), 3);
        assert_eq!(weights.weight(WeightingSystem::RareKeys, "PDF:Author"), 1);
        assert_eq!(weights.weight(WeightingSystem::Custom, "PDF:Title"), 5);
        assert_eq!(weights.weight(WeightingSystem::Custom, "PDF:Author"), 1);
    }

    #[test]
    fn test_every_weight_is_at_least_one() {
        let weights = Weights::default();
        for system in WeightingSystem::ALL {
            for key in ["PDF:Author", "XMP:Language", "File:FileName", ""] {
                assert!(weights.weight(system, key) >= 1);
            }
        }
    }

    #[test]
    fn test_system_ids_round_trip() {
        for system in WeightingSystem::ALL {
            assert_eq!(system.id().parse::<WeightingSystem>().unwrap(), system);
        }
        assert!("weighted".parse::<WeightingSystem>().is_err());
    }
}
