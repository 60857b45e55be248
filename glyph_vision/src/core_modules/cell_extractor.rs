// THEORY:
// The `cell_extractor` module performs the crucial first transformation of a
// conversion: slicing the raw image into a grid of fixed-size cells and turning
// every cell into one column of the dense cell-intensity matrix V. This slicing
// operation is the bridge between the raster image and the matrix-factorization
// paradigm the solvers operate in.
//
// Key architectural principles:
// 1.  **Nearest-cell coverage**: The output grid is sized by *rounding* the
//     image dimensions to cell units, never by flooring or ceiling. A cell that
//     hangs over the image edge is kept and zero-padded, so edge content is
//     represented instead of cropped away.
// 2.  **Ink orientation**: Matrix entries are `255 - red`, so a dark pixel
//     (more "ink") contributes a large value. This matches the dictionary,
//     whose glyph bitmaps also store ink as large values.
// 3.  **Unit columns**: Every column is scaled to Euclidean unit length so that
//     activation magnitudes are comparable across cells and against the
//     caller's threshold. A completely blank cell stays the zero vector; it
//     must never be "normalized" into NaN.

use image::{DynamicImage, GenericImageView};
use nalgebra::DMatrix;

/// The dimensions of the output character grid, measured in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDimensions {
    /// Number of character columns (horizontal cell count).
    pub columns: usize,
    /// Number of character rows (vertical cell count).
    pub rows: usize,
}

impl GridDimensions {
    /// Nearest-integer cell counts for an image sliced into
    /// `cell_width` x `cell_height` pixel cells.
    pub fn for_image(image: &DynamicImage, cell_width: u32, cell_height: u32) -> Self {
        Self {
            columns: (f64::from(image.width()) / f64::from(cell_width)).round() as usize,
            rows: (f64::from(image.height()) / f64::from(cell_height)).round() as usize,
        }
    }

    /// Total number of cells, which is also the column count of V.
    pub fn cell_count(&self) -> usize {
        self.columns * self.rows
    }
}

/// The cell-intensity matrix V together with the grid it was sliced on.
///
/// Rows are flattened pixel positions within one cell (`row * cell_width + col`),
/// columns are output cells in row-major order (`y * columns + x`). Immutable
/// once built.
pub struct CellGrid {
    dimensions: GridDimensions,
    intensities: DMatrix<f64>,
}

impl CellGrid {
    /// Slices `image` into cells and builds the normalized intensity matrix.
    ///
    /// Pixels outside the image bounds contribute zero intensity, so cells that
    /// only partially cover the image are zero-padded rather than skipped.
    pub fn from_image(image: &DynamicImage, cell_width: u32, cell_height: u32) -> Self {
        let dimensions = GridDimensions::for_image(image, cell_width, cell_height);
        let pixel_count = (cell_width * cell_height) as usize;
        let mut intensities = DMatrix::zeros(pixel_count, dimensions.cell_count());

        for y in 0..dimensions.rows {
            for x in 0..dimensions.columns {
                let cell_column = y * dimensions.columns + x;
                for j in 0..cell_height {
                    for i in 0..cell_width {
                        let pixel_x = x as u32 * cell_width + i;
                        let pixel_y = y as u32 * cell_height + j;
                        if pixel_x < image.width() && pixel_y < image.height() {
                            let ink = 255.0 - f64::from(image.get_pixel(pixel_x, pixel_y).0[0]);
                            intensities[((j * cell_width + i) as usize, cell_column)] = ink;
                        }
                    }
                }
            }
        }

        normalize_columns(&mut intensities);

        Self {
            dimensions,
            intensities,
        }
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    pub fn intensities(&self) -> &DMatrix<f64> {
        &self.intensities
    }

    /// Consumes the grid, handing the matrix to a solver without a copy.
    pub fn into_intensities(self) -> DMatrix<f64> {
        self.intensities
    }
}

/// Scales every column to Euclidean unit length, leaving zero columns zero.
pub(crate) fn normalize_columns(matrix: &mut DMatrix<f64>) {
    for mut column in matrix.column_iter_mut() {
        let norm = column.norm();
        if norm > 0.0 {
            column /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn white_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        ))
    }

    #[test]
    fn grid_dimensions_round_to_nearest_cell() {
        // 17/8 = 2.125 rounds down, 28/8 = 3.5 rounds up.
        let dims = GridDimensions::for_image(&white_image(17, 28), 8, 8);
        assert_eq!(dims.columns, 2);
        assert_eq!(dims.rows, 4);
        assert_eq!(dims.cell_count(), 8);
    }

    #[test]
    fn columns_have_unit_norm_or_stay_zero() {
        let mut raster = RgbaImage::from_pixel(16, 8, Rgba([255, 255, 255, 255]));
        // Ink only the left cell; the right cell stays blank.
        for y in 0..8 {
            for x in 0..4 {
                raster.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let grid = CellGrid::from_image(&DynamicImage::ImageRgba8(raster), 8, 8);
        let v = grid.intensities();
        assert_eq!(v.shape(), (64, 2));
        assert!((v.column(0).norm() - 1.0).abs() < 1e-12);
        assert_eq!(v.column(1).norm(), 0.0);
    }

    #[test]
    fn overhanging_cells_are_zero_padded() {
        // 12 pixels wide with 8-pixel cells rounds to 2 columns; the second
        // cell covers x = 8..16 but only x = 8..12 exists in the image.
        let mut raster = RgbaImage::from_pixel(12, 8, Rgba([255, 255, 255, 255]));
        for y in 0..8 {
            for x in 8..12 {
                raster.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let grid = CellGrid::from_image(&DynamicImage::ImageRgba8(raster), 8, 8);
        let v = grid.intensities();
        assert_eq!(grid.dimensions().columns, 2);
        // Padded positions (cell-local x >= 4) carry exactly zero.
        for j in 0..8usize {
            for i in 4..8usize {
                assert_eq!(v[(j * 8 + i, 1)], 0.0);
            }
        }
        assert!((v.column(1).norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn intensity_is_inverted_red_channel() {
        let raster = RgbaImage::from_pixel(8, 8, Rgba([55, 0, 0, 255]));
        let grid = CellGrid::from_image(&DynamicImage::ImageRgba8(raster), 8, 8);
        // Every pixel holds 255 - 55 = 200 before normalization, so the
        // normalized column is uniform with value 1/sqrt(64).
        let expected = 1.0 / 8.0;
        for i in 0..64 {
            assert!((grid.intensities()[(i, 0)] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn blank_image_produces_all_zero_columns() {
        let grid = CellGrid::from_image(&white_image(16, 16), 8, 8);
        assert_eq!(grid.intensities().shape(), (64, 4));
        assert_eq!(grid.intensities().norm(), 0.0);
    }
}
