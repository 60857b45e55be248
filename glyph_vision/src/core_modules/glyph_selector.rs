// THEORY:
// The `glyph_selector` collapses the activation matrix into the final artifact.
// It is a stateless utility: one pass over H, one decision per column. For each
// output cell it takes the dictionary column with the strongest activation and
// keeps it only if that activation clears the caller's threshold; everything
// else becomes a space.
//
// The running maximum starts at 0.0 with a strict less-than comparison. That
// zero floor is a deliberate compatibility decision: a column whose activations
// are all negative (reachable only in projection mode) resolves to index 0 with
// a maximum of 0.0 and is therefore never selected over the implicit blank.

use nalgebra::DMatrix;

use crate::core_modules::cell_extractor::GridDimensions;
use crate::core_modules::character_grid::CharacterGrid;
use crate::core_modules::dictionary::GlyphDictionary;

pub mod glyph_selector {
    use super::*;

    /// Maps each column of H to a character: the argmax glyph if its
    /// activation reaches `threshold`, a space otherwise. Ties keep the lowest
    /// row index.
    pub fn select_glyphs(
        activations: &DMatrix<f64>,
        dictionary: &GlyphDictionary,
        dimensions: GridDimensions,
        threshold: f64,
    ) -> CharacterGrid {
        let mut cells = Vec::with_capacity(activations.ncols());

        for k in 0..activations.ncols() {
            let mut max = 0.0;
            let mut max_index = 0;
            for j in 0..activations.nrows() {
                if max < activations[(j, k)] {
                    max = activations[(j, k)];
                    max_index = j;
                }
            }

            cells.push(if max >= threshold {
                dictionary.glyph_char(max_index)
            } else {
                ' '
            });
        }

        CharacterGrid::from_cells(dimensions.columns, dimensions.rows, cells)
    }
}
