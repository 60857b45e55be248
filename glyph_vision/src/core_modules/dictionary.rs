// THEORY:
// The `dictionary` module wraps the one resource the whole engine is built
// around: the matrix W of pre-rendered glyph bitmaps, one column per glyph,
// over the same flattened pixel space the cell extractor produces. The
// dictionary is strictly read-only to the solvers; a single instance can be
// shared across any number of concurrent conversions.
//
// The resource also carries the facts that belong to it rather than to the
// engine: the pixel geometry of one cell, and the character-code offset that
// maps a column index back to an output character. Keeping those here means no
// cell size or code point is ever hardcoded inside a solver.

use nalgebra::DMatrix;

use crate::core_modules::cell_extractor::normalize_columns;
use crate::error::ConversionError;

/// The read-only glyph dictionary: a column-normalized matrix of glyph
/// intensity patterns plus the metadata needed to interpret it.
#[derive(Debug, Clone)]
pub struct GlyphDictionary {
    weights: DMatrix<f64>,
    cell_width: u32,
    cell_height: u32,
    glyph_chars: Vec<char>,
}

impl GlyphDictionary {
    /// Wraps a glyph matrix whose rows span one `cell_width` x `cell_height`
    /// cell and whose columns are glyph intensity patterns.
    ///
    /// Columns are scaled to unit length here (an all-zero glyph stays zero),
    /// so callers may pass raw bitmap intensities. Column `i` maps to the
    /// character with code `first_glyph_code + i`.
    pub fn new(
        weights: DMatrix<f64>,
        cell_width: u32,
        cell_height: u32,
        first_glyph_code: u32,
    ) -> Result<Self, ConversionError> {
        let expected = (cell_width * cell_height) as usize;
        if weights.nrows() != expected {
            return Err(ConversionError::DictionaryShape {
                actual: weights.nrows(),
                expected,
                cell_width,
                cell_height,
            });
        }

        let glyph_chars = (0..weights.ncols())
            .map(|index| {
                let code = first_glyph_code + index as u32;
                char::from_u32(code).ok_or(ConversionError::InvalidGlyphCode { index, code })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut weights = weights;
        normalize_columns(&mut weights);

        Ok(Self {
            weights,
            cell_width,
            cell_height,
            glyph_chars,
        })
    }

    /// Builds a dictionary from per-glyph intensity bitmaps, each flattened
    /// row-major to `cell_width * cell_height` samples.
    pub fn from_bitmaps(
        bitmaps: &[Vec<f64>],
        cell_width: u32,
        cell_height: u32,
        first_glyph_code: u32,
    ) -> Result<Self, ConversionError> {
        let expected = (cell_width * cell_height) as usize;
        if let Some(bitmap) = bitmaps.iter().find(|bitmap| bitmap.len() != expected) {
            return Err(ConversionError::DictionaryShape {
                actual: bitmap.len(),
                expected,
                cell_width,
                cell_height,
            });
        }
        let weights = DMatrix::from_fn(expected, bitmaps.len(), |i, j| bitmaps[j][i]);
        Self::new(weights, cell_width, cell_height, first_glyph_code)
    }

    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }

    /// Number of glyphs in the alphabet, which is also the row count of H.
    pub fn glyph_count(&self) -> usize {
        self.glyph_chars.len()
    }

    pub fn cell_width(&self) -> u32 {
        self.cell_width
    }

    pub fn cell_height(&self) -> u32 {
        self.cell_height
    }

    /// The output character for a dictionary column.
    ///
    /// Panics if `index >= glyph_count()`; the selector only ever passes
    /// indices it found in H, whose row count equals the glyph count.
    pub fn glyph_char(&self, index: usize) -> char {
        self.glyph_chars[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_columns_and_keeps_zero_glyphs() {
        let raw = DMatrix::from_fn(4, 2, |i, j| if j == 0 { (i + 1) as f64 } else { 0.0 });
        let dictionary = GlyphDictionary::new(raw, 2, 2, 65).expect("valid dictionary");
        assert!((dictionary.weights().column(0).norm() - 1.0).abs() < 1e-12);
        assert_eq!(dictionary.weights().column(1).norm(), 0.0);
    }

    #[test]
    fn maps_columns_through_the_code_offset() {
        let dictionary =
            GlyphDictionary::new(DMatrix::from_element(4, 3, 1.0), 2, 2, 65).expect("valid");
        assert_eq!(dictionary.glyph_count(), 3);
        assert_eq!(dictionary.glyph_char(0), 'A');
        assert_eq!(dictionary.glyph_char(2), 'C');
    }

    #[test]
    fn rejects_mismatched_cell_geometry() {
        let result = GlyphDictionary::new(DMatrix::from_element(5, 1, 1.0), 2, 2, 65);
        assert!(matches!(
            result,
            Err(ConversionError::DictionaryShape { actual: 5, expected: 4, .. })
        ));
    }

    #[test]
    fn rejects_codes_outside_unicode() {
        // 0xD800 is a surrogate, not a scalar value.
        let result = GlyphDictionary::new(DMatrix::from_element(4, 1, 1.0), 2, 2, 0xD800);
        assert!(matches!(
            result,
            Err(ConversionError::InvalidGlyphCode { index: 0, code: 0xD800 })
        ));
    }

    #[test]
    fn builds_from_flattened_bitmaps() {
        let bitmaps = vec![vec![1.0, 0.0, 0.0, 1.0], vec![0.0, 1.0, 1.0, 0.0]];
        let dictionary = GlyphDictionary::from_bitmaps(&bitmaps, 2, 2, 97).expect("valid");
        assert_eq!(dictionary.glyph_count(), 2);
        assert_eq!(dictionary.glyph_char(1), 'b');
        let expected = 1.0 / 2.0_f64.sqrt();
        assert!((dictionary.weights()[(0, 0)] - expected).abs() < 1e-12);
        assert_eq!(dictionary.weights()[(1, 0)], 0.0);
    }

    #[test]
    fn rejects_short_bitmaps() {
        let bitmaps = vec![vec![1.0; 3]];
        assert!(matches!(
            GlyphDictionary::from_bitmaps(&bitmaps, 2, 2, 65),
            Err(ConversionError::DictionaryShape { actual: 3, expected: 4, .. })
        ));
    }
}
