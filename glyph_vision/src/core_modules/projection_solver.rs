use nalgebra::DMatrix;

use crate::core_modules::dictionary::GlyphDictionary;
use crate::error::ConversionError;

/// Singular values at or below this tolerance are treated as zero when the
/// dictionary is inverted.
const SINGULAR_VALUE_EPSILON: f64 = 1e-10;

/// One-shot least-squares projection of the cell matrix onto the dictionary:
/// `H = pinv(W) * V` through the Moore-Penrose pseudoinverse.
///
/// There is no iteration and no non-negativity constraint, so activations may
/// come out negative. Deterministic for a fixed image and dictionary.
pub fn solve(
    dictionary: &GlyphDictionary,
    cells: &DMatrix<f64>,
) -> Result<DMatrix<f64>, ConversionError> {
    let pseudoinverse = dictionary
        .weights()
        .clone()
        .pseudo_inverse(SINGULAR_VALUE_EPSILON)
        .map_err(ConversionError::PseudoInverse)?;
    Ok(pseudoinverse * cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_glyph_dictionary() -> GlyphDictionary {
        // One diagonal glyph on a 2x2 cell.
        GlyphDictionary::from_bitmaps(&[vec![1.0, 0.0, 0.0, 1.0]], 2, 2, 65).expect("valid")
    }

    #[test]
    fn recovers_full_activation_for_an_exact_match() {
        let dictionary = single_glyph_dictionary();
        // The observed cell is exactly the normalized glyph column.
        let cells = dictionary.weights().clone();
        let h = solve(&dictionary, &cells).expect("projection succeeds");
        assert_eq!(h.shape(), (1, 1));
        assert!((h[(0, 0)] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn is_deterministic() {
        let dictionary = single_glyph_dictionary();
        let cells = DMatrix::from_fn(4, 3, |i, j| ((i + 2 * j) % 3) as f64);
        let mut normalized = cells.clone();
        crate::core_modules::cell_extractor::normalize_columns(&mut normalized);
        let first = solve(&dictionary, &normalized).expect("projection succeeds");
        let second = solve(&dictionary, &normalized).expect("projection succeeds");
        assert_eq!(first, second);
    }

    #[test]
    fn zero_dictionary_yields_zero_activations() {
        let dictionary =
            GlyphDictionary::from_bitmaps(&[vec![0.0; 4]], 2, 2, 88).expect("valid");
        let cells = DMatrix::from_element(4, 2, 0.5);
        let h = solve(&dictionary, &cells).expect("projection succeeds");
        assert_eq!(h.shape(), (1, 2));
        assert_eq!(h.norm(), 0.0);
    }
}
