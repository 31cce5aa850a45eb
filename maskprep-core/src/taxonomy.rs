//! Class taxonomies: which mask colors mean which class ids.
//!
//! A [`ForwardTable`] maps exact colors to class ids and carries the
//! fallback used for colors that match nothing. Its entries keep insertion
//! order, which is also the order the nearest-color search scans them in,
//! so the first entry wins a distance tie. The [`ReverseTable`] is derived
//! from it and is therefore always consistent with it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::error::{Error, TableError};

/// Small integer naming a segmentation class. Label images are 8-bit.
pub type ClassId = u8;

/// Order of the three channels inside a [`ColorKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Reorder an RGB triple into this order. The mapping is its own inverse.
    pub fn to_order(self, rgb: [u8; 3]) -> [u8; 3] {
        match self {
            ChannelOrder::Rgb => rgb,
            ChannelOrder::Bgr => [rgb[2], rgb[1], rgb[0]],
        }
    }

    /// Reorder a triple in this order back into RGB.
    pub fn to_rgb(self, channels: [u8; 3]) -> [u8; 3] {
        self.to_order(channels)
    }
}

/// An exact 3-channel color, in the channel order of its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColorKey(pub [u8; 3]);

impl ColorKey {
    pub const fn new(c0: u8, c1: u8, c2: u8) -> Self {
        Self([c0, c1, c2])
    }

    /// Parse a hex color string like "#FF20AB" or "FF20AB".
    ///
    /// Digits are taken in the order written; no channel swapping happens.
    pub fn parse_hex(s: &str) -> Result<Self, TableError> {
        let invalid = |reason: &str| TableError::InvalidColor {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let digits = s.strip_prefix('#').unwrap_or(s);
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(invalid("expected 6 hex digits"));
        }
        let mut channels = [0u8; 3];
        for (i, channel) in channels.iter_mut().enumerate() {
            *channel = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|_| invalid("not a hex number"))?;
        }
        Ok(Self(channels))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }

    pub fn is_zero(self) -> bool {
        self.0 == [0, 0, 0]
    }

    /// Squared Euclidean distance, exact in integers.
    pub fn distance_squared(self, other: ColorKey) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(&a, &b)| {
                let d = a as i32 - b as i32;
                (d * d) as u32
            })
            .sum()
    }

    pub fn distance(self, other: ColorKey) -> f64 {
        (self.distance_squared(other) as f64).sqrt()
    }
}

impl fmt::Display for ColorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0[0], self.0[1], self.0[2])
    }
}

/// One recognized color.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassEntry {
    pub name: String,
    pub color: ColorKey,
    pub id: ClassId,
}

impl ClassEntry {
    pub fn new(name: impl Into<String>, color: ColorKey, id: ClassId) -> Self {
        Self {
            name: name.into(),
            color,
            id,
        }
    }
}

/// What to return for a color that matches no entry exactly.
///
/// Without `max_distance` the nearest entry always wins. With it, a pixel
/// whose nearest entry is farther than `max_distance` gets `sentinel`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fallback {
    pub sentinel: ClassId,
    pub max_distance: Option<f64>,
}

impl Fallback {
    pub const fn nearest(sentinel: ClassId) -> Self {
        Self {
            sentinel,
            max_distance: None,
        }
    }

    pub const fn within(sentinel: ClassId, max_distance: f64) -> Self {
        Self {
            sentinel,
            max_distance: Some(max_distance),
        }
    }
}

/// Immutable color -> class mapping.
#[derive(Debug, Clone)]
pub struct ForwardTable {
    order: ChannelOrder,
    entries: Vec<ClassEntry>,
    index: HashMap<ColorKey, ClassId>,
    fallback: Fallback,
}

impl ForwardTable {
    /// Build and validate a table. Entry order is kept as given.
    pub fn new(
        order: ChannelOrder,
        entries: Vec<ClassEntry>,
        fallback: Fallback,
    ) -> Result<Self, TableError> {
        validate_entries(&entries)?;

        if !entries.iter().any(|e| e.id == fallback.sentinel) {
            return Err(TableError::UnknownSentinel {
                id: fallback.sentinel,
            });
        }
        if let Some(value) = fallback.max_distance {
            if !value.is_finite() || value < 0.0 {
                return Err(TableError::InvalidMaxDistance { value });
            }
        }

        Ok(Self::assemble(order, entries, fallback))
    }

    /// Build a table whose sentinel is the class of the all-zero color,
    /// with unconditional nearest matching.
    pub fn with_default_fallback(
        order: ChannelOrder,
        entries: Vec<ClassEntry>,
    ) -> Result<Self, TableError> {
        validate_entries(&entries)?;
        let sentinel = default_sentinel(&entries).ok_or(TableError::MissingDefaultSentinel)?;
        Self::new(order, entries, Fallback::nearest(sentinel))
    }

    fn assemble(order: ChannelOrder, entries: Vec<ClassEntry>, fallback: Fallback) -> Self {
        let index = entries.iter().map(|e| (e.color, e.id)).collect();
        Self {
            order,
            entries,
            index,
            fallback,
        }
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    /// Entries in scan order.
    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }

    pub fn fallback(&self) -> Fallback {
        self.fallback
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact lookup only.
    pub fn get(&self, color: ColorKey) -> Option<ClassId> {
        self.index.get(&color).copied()
    }

    pub fn class_name(&self, id: ClassId) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.as_str())
    }

    pub fn reverse(&self) -> ReverseTable {
        self.entries.iter().map(|e| (e.id, e.color)).collect()
    }
}

/// Class id -> canonical color.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseTable {
    colors: BTreeMap<ClassId, ColorKey>,
}

impl ReverseTable {
    pub fn get(&self, id: ClassId) -> Option<ColorKey> {
        self.colors.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassId, ColorKey)> + '_ {
        self.colors.iter().map(|(&id, &color)| (id, color))
    }
}

impl FromIterator<(ClassId, ColorKey)> for ReverseTable {
    fn from_iter<I: IntoIterator<Item = (ClassId, ColorKey)>>(iter: I) -> Self {
        Self {
            colors: iter.into_iter().collect(),
        }
    }
}

fn default_sentinel(entries: &[ClassEntry]) -> Option<ClassId> {
    entries.iter().find(|e| e.color.is_zero()).map(|e| e.id)
}

/// Colors unique, ids unique and dense in `[0, N)`.
fn validate_entries(entries: &[ClassEntry]) -> Result<(), TableError> {
    if entries.is_empty() {
        return Err(TableError::Empty);
    }
    let count = entries.len();
    if count > ClassId::MAX as usize + 1 {
        return Err(TableError::TooManyClasses { count });
    }

    let mut colors = HashSet::with_capacity(count);
    let mut ids = HashSet::with_capacity(count);
    for entry in entries {
        if !colors.insert(entry.color) {
            return Err(TableError::DuplicateColor { color: entry.color });
        }
        if entry.id as usize >= count {
            return Err(TableError::ClassIdOutOfRange {
                id: entry.id,
                count,
            });
        }
        if !ids.insert(entry.id) {
            return Err(TableError::DuplicateClassId { id: entry.id });
        }
    }
    // N distinct ids below N cover the whole range.
    Ok(())
}

// Shadow / CCA / Unclassed masks, written in BGR.
const CCA_ENTRIES: [(&str, [u8; 3], ClassId); 3] = [
    ("Shadow", [0, 0, 0], 2),
    ("CCA", [255, 0, 255], 1),
    ("Unclassed", [0, 255, 0], 0),
];

fn cca_taxonomy() -> ForwardTable {
    let entries = CCA_ENTRIES
        .iter()
        .map(|&(name, color, id)| ClassEntry::new(name, ColorKey(color), id))
        .collect();
    ForwardTable::assemble(ChannelOrder::Bgr, entries, Fallback::nearest(2))
}

pub fn named_taxonomy(name: &str) -> Option<ForwardTable> {
    match name.to_lowercase().as_str() {
        "cca" => Some(cca_taxonomy()),
        _ => None,
    }
}

pub fn all_taxonomy_names() -> &'static [&'static str] {
    &["cca"]
}

/// Like [`named_taxonomy`], but an unknown name is an error listing the
/// built-in names.
pub fn resolve_taxonomy(name: &str) -> crate::error::Result<ForwardTable> {
    named_taxonomy(name).ok_or_else(|| Error::UnknownTaxonomy {
        name: name.to_string(),
        available: all_taxonomy_names().join(", "),
    })
}
