//! Pixel classification: color mask <-> class array.
//!
//! Forward direction is total. A pixel that is not one of the table's
//! colors goes to the nearest table color by Euclidean distance, scanning
//! entries in table order and keeping the first one on ties. The reverse
//! direction fails on the first class id the reverse table does not know.

use ndarray::Array2;

use crate::error::ConvertError;
use crate::taxonomy::{ClassId, ColorKey, ForwardTable, ReverseTable};

/// How a single pixel was resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Match {
    Exact(ClassId),
    Nearest { id: ClassId, distance: f64 },
    /// Nearest entry was beyond the table's `max_distance`.
    Rejected { sentinel: ClassId, distance: f64 },
}

impl Match {
    pub fn class_id(self) -> ClassId {
        match self {
            Match::Exact(id) | Match::Nearest { id, .. } => id,
            Match::Rejected { sentinel, .. } => sentinel,
        }
    }
}

impl ForwardTable {
    pub fn lookup(&self, pixel: ColorKey) -> Match {
        if let Some(id) = self.get(pixel) {
            return Match::Exact(id);
        }

        let fallback = self.fallback();
        let mut best: Option<(u32, ClassId)> = None;
        for entry in self.entries() {
            let d2 = pixel.distance_squared(entry.color);
            // Strict comparison keeps the earliest entry on a tie.
            if best.map_or(true, |(best_d2, _)| d2 < best_d2) {
                best = Some((d2, entry.id));
            }
        }

        match best {
            Some((d2, id)) => {
                let distance = (d2 as f64).sqrt();
                match fallback.max_distance {
                    Some(max) if distance > max => Match::Rejected {
                        sentinel: fallback.sentinel,
                        distance,
                    },
                    _ => Match::Nearest { id, distance },
                }
            }
            // Unreachable for a validated table.
            None => Match::Rejected {
                sentinel: fallback.sentinel,
                distance: f64::INFINITY,
            },
        }
    }
}

pub fn classify(pixel: ColorKey, table: &ForwardTable) -> ClassId {
    table.lookup(pixel).class_id()
}

/// Pixel counts by how they were classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub exact: usize,
    pub nearest: usize,
    pub rejected: usize,
}

impl MatchSummary {
    pub fn total(&self) -> usize {
        self.exact + self.nearest + self.rejected
    }

    fn record(&mut self, m: Match) {
        match m {
            Match::Exact(_) => self.exact += 1,
            Match::Nearest { .. } => self.nearest += 1,
            Match::Rejected { .. } => self.rejected += 1,
        }
    }
}

/// Classify every pixel of a `rows x cols` color grid.
pub fn image_to_class_array(mask: &Array2<ColorKey>, table: &ForwardTable) -> Array2<ClassId> {
    mask.map(|&pixel| classify(pixel, table))
}

pub fn image_to_class_array_with_summary(
    mask: &Array2<ColorKey>,
    table: &ForwardTable,
) -> (Array2<ClassId>, MatchSummary) {
    let mut summary = MatchSummary::default();
    let classes = mask.map(|&pixel| {
        let m = table.lookup(pixel);
        summary.record(m);
        m.class_id()
    });
    (classes, summary)
}

/// Map every class id back to its color.
///
/// Cells are visited row by row; the first unknown id aborts the whole
/// conversion and no partial image is returned.
pub fn image_from_class_array(
    classes: &Array2<ClassId>,
    reverse: &ReverseTable,
) -> Result<Array2<ColorKey>, ConvertError> {
    let mut colors = Array2::from_elem(classes.raw_dim(), ColorKey::default());
    for ((row, col), &id) in classes.indexed_iter() {
        colors[[row, col]] = reverse
            .get(id)
            .ok_or(ConvertError::UnrecognizedClassId { row, col, id })?;
    }
    Ok(colors)
}
