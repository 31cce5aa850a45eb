//! Loading and saving color masks and label images.
//!
//! The image crate always decodes to RGB; masks are converted into the
//! channel order of the taxonomy at load time and back to RGB at save time,
//! so tables can be written in whichever order their colors were picked in.

use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};
use ndarray::Array2;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::orientation::correct_orientation;
use crate::taxonomy::{ChannelOrder, ClassId, ColorKey};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];

pub const LABEL_SUFFIX: &str = "_intLabels";
pub const COLOR_MASK_SUFFIX: &str = "_colorMask";

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn is_label_file(path: &Path) -> bool {
    file_stem(path).ends_with(LABEL_SUFFIX)
}

/// Outputs of either conversion direction.
pub fn is_generated_file(path: &Path) -> bool {
    let stem = file_stem(path);
    stem.ends_with(LABEL_SUFFIX) || stem.ends_with(COLOR_MASK_SUFFIX)
}

/// `masks/a.png` -> `a_intLabels.png`
pub fn label_file_name(input: &Path) -> String {
    format!("{}{}.png", file_stem(input), LABEL_SUFFIX)
}

/// `out/a_intLabels.png` -> `a_colorMask.png`
pub fn color_mask_file_name(input: &Path) -> String {
    let stem = file_stem(input);
    let base = stem.strip_suffix(LABEL_SUFFIX).unwrap_or(&stem);
    format!("{}{}.png", base, COLOR_MASK_SUFFIX)
}

/// Convert a decoded RGB image to a `rows x cols` grid in `order`.
pub fn color_grid_from_rgb(img: &RgbImage, order: ChannelOrder) -> Array2<ColorKey> {
    let (width, height) = img.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
        ColorKey(order.to_order(img.get_pixel(col as u32, row as u32).0))
    })
}

pub fn color_grid_to_rgb(grid: &Array2<ColorKey>, order: ChannelOrder) -> RgbImage {
    let (rows, cols) = grid.dim();
    RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
        Rgb(order.to_rgb(grid[[y as usize, x as usize]].0))
    })
}

pub fn class_grid_to_gray(classes: &Array2<ClassId>) -> GrayImage {
    let (rows, cols) = classes.dim();
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([classes[[y as usize, x as usize]]])
    })
}

pub fn class_grid_from_gray(img: &GrayImage) -> Array2<ClassId> {
    let (width, height) = img.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
        img.get_pixel(col as u32, row as u32).0[0]
    })
}

fn check_dimensions(path: &Path, width: usize, height: usize) -> Result<()> {
    if width > u32::MAX as usize || height > u32::MAX as usize {
        return Err(Error::ImageTooLarge {
            path: path.to_path_buf(),
            width,
            height,
        });
    }
    Ok(())
}

/// Decode a color mask, honoring EXIF orientation, into `order`.
pub fn load_color_mask(path: &Path, order: ChannelOrder) -> Result<Array2<ColorKey>> {
    let img = image::open(path)?;
    let img = correct_orientation(img, path);
    let (width, height) = img.dimensions();
    log::debug!("{}: {}x{} {:?}", path.display(), width, height, img.color());
    Ok(color_grid_from_rgb(&img.to_rgb8(), order))
}

pub fn save_color_mask(grid: &Array2<ColorKey>, order: ChannelOrder, path: &Path) -> Result<()> {
    let (rows, cols) = grid.dim();
    check_dimensions(path, cols, rows)?;
    color_grid_to_rgb(grid, order).save(path)?;
    Ok(())
}

/// Load a label image. Only 8-bit single-channel images are accepted, as
/// any other format would not hold class ids verbatim.
pub fn load_class_array(path: &Path) -> Result<Array2<ClassId>> {
    match image::open(path)? {
        DynamicImage::ImageLuma8(gray) => Ok(class_grid_from_gray(&gray)),
        other => Err(Error::NotALabelImage {
            path: path.to_path_buf(),
            color_type: format!("{:?}", other.color()),
        }),
    }
}

/// Write class ids as an 8-bit grayscale PNG.
pub fn save_class_array(classes: &Array2<ClassId>, path: &Path) -> Result<()> {
    let (rows, cols) = classes.dim();
    check_dimensions(path, cols, rows)?;
    class_grid_to_gray(classes).save(path)?;
    Ok(())
}

/// Image files directly inside `dir`, sorted by name.
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_file_names() {
        assert_eq!(label_file_name(Path::new("colormasks/img_01.png")), "img_01_intLabels.png");
        assert_eq!(label_file_name(Path::new("scan.jpeg")), "scan_intLabels.png");
        assert_eq!(
            color_mask_file_name(Path::new("out/img_01_intLabels.png")),
            "img_01_colorMask.png"
        );
        assert_eq!(color_mask_file_name(Path::new("other.png")), "other_colorMask.png");
    }

    #[test]
    fn test_generated_files() {
        assert!(is_label_file(Path::new("out/a_intLabels.png")));
        assert!(!is_label_file(Path::new("out/a_colorMask.png")));
        assert!(is_generated_file(Path::new("out/a_colorMask.png")));
        assert!(!is_generated_file(Path::new("colormasks/a.png")));
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a.PNG")));
        assert!(is_image_file(Path::new("a.jpg")));
        assert!(!is_image_file(Path::new("a.txt")));
        assert!(!is_image_file(Path::new("noext")));
    }

    #[test]
    fn test_bgr_normalization() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([1, 2, 3]));
        let grid = color_grid_from_rgb(&img, ChannelOrder::Bgr);
        assert_eq!(grid.dim(), (1, 2));
        assert_eq!(grid[[0, 0]], ColorKey::new(0, 0, 255));
        assert_eq!(grid[[0, 1]], ColorKey::new(3, 2, 1));
        assert_eq!(color_grid_to_rgb(&grid, ChannelOrder::Bgr), img);
    }

    #[test]
    fn test_grid_layout_is_rows_by_cols() {
        let classes = array![[0u8, 1, 2], [3, 4, 5]];
        let gray = class_grid_to_gray(&classes);
        assert_eq!(gray.dimensions(), (3, 2));
        assert_eq!(gray.get_pixel(2, 1).0[0], 5);
        assert_eq!(class_grid_from_gray(&gray), classes);
    }

    #[test]
    fn test_label_png_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a_intLabels.png");
        let classes = array![[0u8, 1], [2, 0]];
        save_class_array(&classes, &path).unwrap();
        assert_eq!(load_class_array(&path).unwrap(), classes);
    }

    #[test]
    fn test_color_mask_is_not_a_label_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let grid = array![[ColorKey::new(0, 255, 0)]];
        save_color_mask(&grid, ChannelOrder::Rgb, &path).unwrap();
        assert!(matches!(
            load_class_array(&path),
            Err(Error::NotALabelImage { .. })
        ));
        assert_eq!(load_color_mask(&path, ChannelOrder::Rgb).unwrap(), grid);
    }

    #[test]
    fn test_list_image_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let grid = array![[ColorKey::new(0, 0, 0)]];
        save_color_mask(&grid, ChannelOrder::Rgb, &dir.path().join("b.png")).unwrap();
        save_color_mask(&grid, ChannelOrder::Rgb, &dir.path().join("a.png")).unwrap();
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();
        let files = list_image_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }
}
