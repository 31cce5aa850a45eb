//! EXIF orientation correction for decoded masks.
//!
//! Masks exported from phones or some annotation tools carry an EXIF
//! orientation tag. The pixels must be rotated into display orientation
//! before classification, or the label image will not line up with the
//! photo it annotates.

use image::DynamicImage;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// The eight EXIF orientation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    pub fn from_exif(value: u32) -> Option<Self> {
        match value {
            1 => Some(Orientation::Normal),
            2 => Some(Orientation::FlipHorizontal),
            3 => Some(Orientation::Rotate180),
            4 => Some(Orientation::FlipVertical),
            5 => Some(Orientation::Transpose),
            6 => Some(Orientation::Rotate90),
            7 => Some(Orientation::Transverse),
            8 => Some(Orientation::Rotate270),
            _ => None,
        }
    }

    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Orientation::Normal => img,
            Orientation::FlipHorizontal => img.fliph(),
            Orientation::Rotate180 => img.rotate180(),
            Orientation::FlipVertical => img.flipv(),
            Orientation::Transpose => img.rotate90().fliph(),
            Orientation::Rotate90 => img.rotate90(),
            Orientation::Transverse => img.rotate270().fliph(),
            Orientation::Rotate270 => img.rotate270(),
        }
    }
}

/// Read the orientation tag of an image file, if it has one.
pub fn read_orientation(path: &Path) -> Option<Orientation> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    Orientation::from_exif(field.value.get_uint(0)?)
}

/// Rotate/flip `img` according to the EXIF tag in `path`; unchanged if absent.
pub fn correct_orientation(img: DynamicImage, path: &Path) -> DynamicImage {
    match read_orientation(path) {
        Some(orientation) => {
            log::debug!("{}: applying EXIF orientation {:?}", path.display(), orientation);
            orientation.apply(img)
        }
        None => img,
    }
}
