//! Named vibration patterns
//!
//! Patterns are keyed by id and carry the descriptive tags shown in the
//! phone-side pattern picker. The catalog always contains the built-in
//! `default` pattern, which is the fallback for unknown ids.

use crate::codec::{VibrationWaveform, NO_REPEAT};
use crate::error::DecodeError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Id of the fallback pattern
pub const DEFAULT_PATTERN_ID: &str = "default";

/// Segment length shared by the built-in patterns
const SEGMENT_MS: u64 = 10;

const DEFAULT_AMPLITUDES: [u8; 92] = [
    0, 0, 0, 0, 0, 4, 8, 17, 32, 61, 57, 29, 14, 7, 4, 30, 55, 101, 185, 252, 153, 85, 47, 26, 12,
    6, 13, 25, 48, 67, 37, 19, 9, 5, 20, 43, 78, 143, 247, 196, 110, 61, 34, 18, 5, 10, 19, 36, 66,
    50, 25, 13, 6, 12, 35, 64, 117, 214, 235, 133, 74, 41, 23, 8, 8, 15, 29, 56, 62, 32, 16, 8, 4,
    24, 48, 88, 161, 255, 174, 97, 54, 30, 15, 5, 11, 21, 41, 68, 44, 22, 11, 5,
];

const HEARTBEAT_AMPLITUDES: [u8; 51] = [
    0, 7, 29, 28, 110, 251, 217, 151, 246, 229, 160, 236, 211, 99, 31, 31, 18, 30, 2, 0, 0, 0, 0,
    0, 0, 0, 0, 70, 53, 70, 253, 175, 159, 255, 187, 185, 236, 93, 82, 6, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0,
];

/// The waveform used when a channel has no pattern of its own
pub fn default_waveform() -> VibrationWaveform {
    uniform_waveform(&DEFAULT_AMPLITUDES)
}

fn uniform_waveform(amplitudes: &[u8]) -> VibrationWaveform {
    // Same-length sequences with no repeat always validate
    VibrationWaveform::new(
        vec![SEGMENT_MS; amplitudes.len()],
        amplitudes.to_vec(),
        NO_REPEAT,
    )
    .unwrap_or_default()
}

/// A waveform plus the descriptive tags used to pick it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VibrationPattern {
    pub id: String,
    #[serde(flatten)]
    pub waveform: VibrationWaveform,
    #[serde(default, rename = "sensationTags")]
    pub sensation_tags: Vec<String>,
    #[serde(default, rename = "emotionTags")]
    pub emotion_tags: Vec<String>,
    #[serde(default)]
    pub metaphors: Vec<String>,
    #[serde(default, rename = "usageExamples")]
    pub usage_examples: Vec<String>,
    #[serde(default, rename = "imagePath", skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl VibrationPattern {
    pub fn new(id: impl Into<String>, waveform: VibrationWaveform) -> Self {
        Self {
            id: id.into(),
            waveform,
            sensation_tags: Vec::new(),
            emotion_tags: Vec::new(),
            metaphors: Vec::new(),
            usage_examples: Vec::new(),
            image_path: None,
        }
    }
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Pattern catalog keyed by pattern id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternCatalog {
    patterns: BTreeMap<String, VibrationPattern>,
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PatternCatalog {
    /// Catalog holding the built-in `default` and `VIB001` patterns
    pub fn builtin() -> Self {
        let mut catalog = Self {
            patterns: BTreeMap::new(),
        };
        catalog.insert(VibrationPattern::new(DEFAULT_PATTERN_ID, default_waveform()));
        catalog.insert(VibrationPattern {
            id: "VIB001".to_string(),
            waveform: uniform_waveform(&HEARTBEAT_AMPLITUDES),
            sensation_tags: tags(&["simple", "discontinuous", "soft", "grainy", "short"]),
            emotion_tags: tags(&[
                "comfortable",
                "calm",
                "natural",
                "familiar",
                "pleasant",
                "boring",
                "predictable",
            ]),
            metaphors: tags(&["heartbeat", "pulsing", "tapping", "poking"]),
            usage_examples: tags(&[
                "confirmation",
                "get ready",
                "milestone",
                "reminder",
                "battery low",
                "incoming msg",
                "pause",
                "resume",
            ]),
            image_path: None,
        });
        catalog
    }

    /// Insert or replace a pattern, returning the previous one with the same id
    pub fn insert(&mut self, pattern: VibrationPattern) -> Option<VibrationPattern> {
        self.patterns.insert(pattern.id.clone(), pattern)
    }

    pub fn get(&self, id: &str) -> Option<&VibrationPattern> {
        self.patterns.get(id)
    }

    /// Resolve a pattern id, falling back to the `default` pattern
    pub fn get_or_default(&self, id: Option<&str>) -> VibrationWaveform {
        id.and_then(|id| self.get(id))
            .or_else(|| self.get(DEFAULT_PATTERN_ID))
            .map(|pattern| pattern.waveform.clone())
            .unwrap_or_else(default_waveform)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &VibrationPattern> {
        self.patterns.values()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Load a pattern export on top of the built-in patterns.
    ///
    /// Records that fail validation are skipped; the second element of the
    /// returned tuple is the number skipped. Only a document that is not a
    /// JSON array is an error.
    pub fn from_json(json: &str) -> Result<(Self, usize), DecodeError> {
        let records: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let mut catalog = Self::builtin();
        let mut skipped = 0;

        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<VibrationPattern>(record) {
                Ok(pattern) => {
                    catalog.insert(pattern);
                }
                Err(e) => {
                    warn!("Skipping pattern record {index}: {e}");
                    skipped += 1;
                }
            }
        }

        Ok((catalog, skipped))
    }

    /// Export every pattern in the export format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let patterns: Vec<&VibrationPattern> = self.patterns.values().collect();
        serde_json::to_string_pretty(&patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_patterns() {
        let catalog = PatternCatalog::builtin();
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["VIB001", "default"]);

        let default = catalog.get(DEFAULT_PATTERN_ID).unwrap();
        assert_eq!(default.waveform.len(), 92);
        assert_eq!(default.waveform.total_duration_ms(), 920);

        let heartbeat = catalog.get("VIB001").unwrap();
        assert_eq!(heartbeat.waveform.len(), 51);
        assert_eq!(heartbeat.waveform.amplitudes()[33], 255);
        assert!(heartbeat.metaphors.contains(&"heartbeat".to_string()));
    }

    #[test]
    fn test_get_or_default_falls_back() {
        let catalog = PatternCatalog::builtin();
        assert_eq!(catalog.get_or_default(Some("VIB999")), default_waveform());
        assert_eq!(catalog.get_or_default(None), default_waveform());
        assert_eq!(
            catalog.get_or_default(Some("VIB001")).len(),
            HEARTBEAT_AMPLITUDES.len()
        );
    }

    #[test]
    fn test_from_json_skips_invalid_records() {
        let json = r#"[
            {"id": "VIB002", "timings": [0, 50, 50], "amplitudes": [0, 255, 0],
             "sensationTags": ["sharp"], "imagePath": "vib002.png"},
            {"id": "VIB003", "timings": [10, 10], "amplitudes": [300, 0]},
            {"id": "VIB004", "timings": [10], "amplitudes": []}
        ]"#;
        let (catalog, skipped) = PatternCatalog::from_json(json).unwrap();
        assert_eq!(skipped, 2);
        assert_eq!(catalog.len(), 3);

        let pattern = catalog.get("VIB002").unwrap();
        assert_eq!(pattern.sensation_tags, vec!["sharp".to_string()]);
        assert_eq!(pattern.image_path.as_deref(), Some("vib002.png"));
        assert_eq!(pattern.waveform.repeat(), NO_REPEAT);
    }

    #[test]
    fn test_from_json_rejects_non_array() {
        assert!(PatternCatalog::from_json(r#"{"id": "VIB001"}"#).is_err());
    }

    #[test]
    fn test_export_reloads() {
        let catalog = PatternCatalog::builtin();
        let json = catalog.to_json().unwrap();
        let (reloaded, skipped) = PatternCatalog::from_json(&json).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(reloaded, catalog);
    }
}
