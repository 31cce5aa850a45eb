//! Error types shared across the crate.

use std::path::PathBuf;
use thiserror::Error;

use crate::taxonomy::{ClassId, ColorKey};

/// Problems found while building a class table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("class table has no entries")]
    Empty,

    #[error("class table has {count} entries, at most 256 fit in an 8-bit label image")]
    TooManyClasses { count: usize },

    #[error("color {color} appears more than once")]
    DuplicateColor { color: ColorKey },

    #[error("class id {id} is assigned to more than one color")]
    DuplicateClassId { id: ClassId },

    #[error("class id {id} is out of range for a table with {count} classes")]
    ClassIdOutOfRange { id: ClassId, count: usize },

    #[error("sentinel class {id} is not one of the table's classes")]
    UnknownSentinel { id: ClassId },

    #[error("table has no all-zero color to use as the default sentinel")]
    MissingDefaultSentinel,

    #[error("maximum match distance must be finite and non-negative, got {value}")]
    InvalidMaxDistance { value: f64 },

    #[error("invalid color '{value}': {reason}")]
    InvalidColor { value: String, reason: String },
}

/// Failure while turning a class array back into colors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertError {
    /// Reported as `x = col, y = row`.
    #[error("unrecognized class id {id} at position x = {col}, y = {row}")]
    UnrecognizedClassId { row: usize, col: usize, id: ClassId },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("unknown taxonomy '{name}', available: {available}")]
    UnknownTaxonomy { name: String, available: String },

    #[error("{path:?} is not an 8-bit grayscale label image (found {color_type})")]
    NotALabelImage { path: PathBuf, color_type: String },

    #[error("image {path:?} is too large ({width}x{height})")]
    ImageTooLarge { path: PathBuf, width: usize, height: usize },

    #[error("{path:?}: {reason}")]
    InvalidVideo { path: PathBuf, reason: String },

    #[error("invalid sampling option: {0}")]
    InvalidSampling(String),

    #[cfg(feature = "video")]
    #[error("video decoding failed: {0}")]
    Video(#[from] ffmpeg_next::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
