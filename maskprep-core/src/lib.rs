pub mod classify;
pub mod config;
pub mod error;
pub mod mask_io;
pub mod orientation;
pub mod sampling;
pub mod taxonomy;

#[cfg(feature = "video")]
pub mod video;

pub use classify::{
    classify, image_from_class_array, image_to_class_array, image_to_class_array_with_summary,
    Match, MatchSummary,
};
pub use error::{ConvertError, Error, Result, TableError};
pub use taxonomy::{ChannelOrder, ClassEntry, ClassId, ColorKey, Fallback, ForwardTable, ReverseTable};
