//! JSON taxonomy files.
//!
//! ```json
//! {
//!   "channel_order": "bgr",
//!   "classes": [
//!     { "name": "Shadow",    "color": "#000000",     "id": 2 },
//!     { "name": "CCA",       "color": [255, 0, 255], "id": 1 },
//!     { "name": "Unclassed", "color": "00ff00",      "id": 0 }
//!   ],
//!   "fallback": { "sentinel": 2, "max_distance": null }
//! }
//! ```
//!
//! Class order in the file is the scan order used for nearest matching.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TableError};
use crate::taxonomy::{ChannelOrder, ClassEntry, ClassId, ColorKey, Fallback, ForwardTable};

/// A color written either as a hex string or as three numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Hex(String),
    Channels([u8; 3]),
}

impl ColorSpec {
    pub fn to_key(&self) -> std::result::Result<ColorKey, TableError> {
        match self {
            ColorSpec::Hex(s) => ColorKey::parse_hex(s),
            ColorSpec::Channels(c) => Ok(ColorKey(*c)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassConfig {
    pub name: String,
    pub color: ColorSpec,
    pub id: ClassId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub sentinel: ClassId,
    #[serde(default)]
    pub max_distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    #[serde(default)]
    pub channel_order: ChannelOrder,
    pub classes: Vec<ClassConfig>,
    /// Omitted: sentinel is the class of the all-zero color, no threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfig>,
}

impl TaxonomyConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn into_table(self) -> Result<ForwardTable> {
        let entries = self
            .classes
            .into_iter()
            .map(|c| -> std::result::Result<ClassEntry, TableError> {
                Ok(ClassEntry::new(c.name, c.color.to_key()?, c.id))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let table = match self.fallback {
            Some(f) => ForwardTable::new(
                self.channel_order,
                entries,
                Fallback {
                    sentinel: f.sentinel,
                    max_distance: f.max_distance,
                },
            )?,
            None => ForwardTable::with_default_fallback(self.channel_order, entries)?,
        };
        Ok(table)
    }

    pub fn from_table(table: &ForwardTable) -> Self {
        let fallback = table.fallback();
        Self {
            channel_order: table.channel_order(),
            classes: table
                .entries()
                .iter()
                .map(|e| ClassConfig {
                    name: e.name.clone(),
                    color: ColorSpec::Hex(e.color.to_hex()),
                    id: e.id,
                })
                .collect(),
            fallback: Some(FallbackConfig {
                sentinel: fallback.sentinel,
                max_distance: fallback.max_distance,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::taxonomy::named_taxonomy;

    const CCA_JSON: &str = r##"{
        "channel_order": "bgr",
        "classes": [
            { "name": "Shadow", "color": "#000000", "id": 2 },
            { "name": "CCA", "color": [255, 0, 255], "id": 1 },
            { "name": "Unclassed", "color": "00ff00", "id": 0 }
        ],
        "fallback": { "sentinel": 2, "max_distance": null }
    }"##;

    #[test]
    fn test_parse_matches_builtin() {
        let table = TaxonomyConfig::from_json_str(CCA_JSON)
            .unwrap()
            .into_table()
            .unwrap();
        let builtin = named_taxonomy("cca").unwrap();
        assert_eq!(table.entries(), builtin.entries());
        assert_eq!(table.fallback(), builtin.fallback());
        assert_eq!(table.channel_order(), ChannelOrder::Bgr);
    }

    #[test]
    fn test_defaults() {
        let json = r##"{ "classes": [
            { "name": "bg", "color": "#000000", "id": 0 },
            { "name": "road", "color": "#808080", "id": 1 }
        ] }"##;
        let table = TaxonomyConfig::from_json_str(json)
            .unwrap()
            .into_table()
            .unwrap();
        assert_eq!(table.channel_order(), ChannelOrder::Rgb);
        assert_eq!(table.fallback(), Fallback::nearest(0));
    }

    #[test]
    fn test_missing_zero_color_without_fallback() {
        let json = r##"{ "classes": [ { "name": "a", "color": "#010101", "id": 0 } ] }"##;
        let err = TaxonomyConfig::from_json_str(json)
            .unwrap()
            .into_table()
            .unwrap_err();
        assert!(matches!(err, Error::Table(TableError::MissingDefaultSentinel)));
    }

    #[test]
    fn test_threshold_from_file() {
        let json = r##"{ "classes": [
            { "name": "bg", "color": [0, 0, 0], "id": 0 },
            { "name": "fg", "color": [255, 255, 255], "id": 1 }
        ], "fallback": { "sentinel": 0, "max_distance": 30.5 } }"##;
        let table = TaxonomyConfig::from_json_str(json)
            .unwrap()
            .into_table()
            .unwrap();
        assert_eq!(table.fallback(), Fallback::within(0, 30.5));
    }

    #[test]
    fn test_bad_color_and_bad_json() {
        let json = r##"{ "classes": [ { "name": "a", "color": "#xyz", "id": 0 } ] }"##;
        let err = TaxonomyConfig::from_json_str(json)
            .unwrap()
            .into_table()
            .unwrap_err();
        assert!(matches!(err, Error::Table(TableError::InvalidColor { .. })));

        assert!(matches!(
            TaxonomyConfig::from_json_str("{ not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_from_table_round_trip() {
        let builtin = named_taxonomy("cca").unwrap();
        let json = TaxonomyConfig::from_table(&builtin).to_json_pretty().unwrap();
        let table = TaxonomyConfig::from_json_str(&json)
            .unwrap()
            .into_table()
            .unwrap();
        assert_eq!(table.entries(), builtin.entries());
        assert_eq!(table.fallback(), builtin.fallback());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(&path, CCA_JSON).unwrap();
        let config = TaxonomyConfig::from_path(&path).unwrap();
        assert_eq!(config.classes.len(), 3);
        assert!(matches!(
            TaxonomyConfig::from_path(&dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
