// THEORY:
// The `pipeline` module is the final, top-level API for the entire conversion
// engine. It encapsulates the full stack - cell extraction, the two solving
// strategies and glyph selection - behind a single, easy-to-use interface. Its
// purpose is to provide a clean entry point for turning an image plus a glyph
// dictionary into a character grid.
//
// The pipeline owns no mutable state across conversions: the dictionary is
// read-only, every conversion builds its own matrices, and one pipeline may
// serve concurrent conversion requests.

use image::DynamicImage;

use crate::core_modules::cell_extractor::CellGrid;
use crate::core_modules::glyph_selector::glyph_selector;
use crate::core_modules::{divergence_solver, projection_solver};

// Re-export key data structures for the public API.
pub use crate::core_modules::cell_extractor::GridDimensions;
pub use crate::core_modules::character_grid::CharacterGrid;
pub use crate::core_modules::dictionary::GlyphDictionary;
pub use crate::core_modules::divergence_solver::DivergenceOptions;
pub use crate::error::ConversionError;

/// Selects how cell intensities are turned into glyph activations.
#[derive(Debug, Clone)]
pub enum SolverStrategy {
    /// One-shot least-squares projection through the dictionary
    /// pseudoinverse. Deterministic; activations may be negative.
    Projection,
    /// Iterative multiplicative-update factorization under a beta-divergence.
    Divergence(DivergenceOptions),
}

/// The main, top-level struct for the conversion engine.
pub struct ConversionPipeline {
    dictionary: GlyphDictionary,
}

impl ConversionPipeline {
    pub fn new(dictionary: GlyphDictionary) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &GlyphDictionary {
        &self.dictionary
    }

    /// Converts `image` with the direct projection solver.
    ///
    /// `threshold` is the minimum activation a glyph needs to beat a blank
    /// cell, in `[0.0, 1.0]`.
    pub fn convert_via_projection(
        &self,
        image: &DynamicImage,
        threshold: f64,
    ) -> Result<CharacterGrid, ConversionError> {
        validate_threshold(threshold)?;

        let cell_grid = self.extract_cells(image);
        let dimensions = cell_grid.dimensions();
        let activations = projection_solver::solve(&self.dictionary, cell_grid.intensities())?;

        Ok(glyph_selector::select_glyphs(
            &activations,
            &self.dictionary,
            dimensions,
            threshold,
        ))
    }

    /// Converts `image` with the iterative divergence solver.
    ///
    /// `report_progress` receives non-decreasing percentages and always a
    /// final 100 once the iteration loop has completed.
    pub async fn convert_via_divergence<F>(
        &self,
        image: &DynamicImage,
        options: &DivergenceOptions,
        threshold: f64,
        report_progress: F,
    ) -> Result<CharacterGrid, ConversionError>
    where
        F: FnMut(u32),
    {
        validate_threshold(threshold)?;
        options.validate()?;

        let cell_grid = self.extract_cells(image);
        let dimensions = cell_grid.dimensions();
        let activations = divergence_solver::solve(
            &self.dictionary,
            cell_grid.into_intensities(),
            options,
            report_progress,
        )
        .await?;

        Ok(glyph_selector::select_glyphs(
            &activations,
            &self.dictionary,
            dimensions,
            threshold,
        ))
    }

    /// Dispatches on the configured strategy. Projection mode never touches
    /// the progress callback.
    pub async fn convert<F>(
        &self,
        image: &DynamicImage,
        strategy: &SolverStrategy,
        threshold: f64,
        report_progress: F,
    ) -> Result<CharacterGrid, ConversionError>
    where
        F: FnMut(u32),
    {
        match strategy {
            SolverStrategy::Projection => self.convert_via_projection(image, threshold),
            SolverStrategy::Divergence(options) => {
                self.convert_via_divergence(image, options, threshold, report_progress)
                    .await
            }
        }
    }

    fn extract_cells(&self, image: &DynamicImage) -> CellGrid {
        let cell_grid = CellGrid::from_image(
            image,
            self.dictionary.cell_width(),
            self.dictionary.cell_height(),
        );
        let dimensions = cell_grid.dimensions();
        log::debug!(
            "sliced {}x{} image into {}x{} cells",
            image.width(),
            image.height(),
            dimensions.columns,
            dimensions.rows
        );
        cell_grid
    }
}

fn validate_threshold(threshold: f64) -> Result<(), ConversionError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConversionError::ThresholdOutOfRange(threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use nalgebra::DMatrix;

    fn pipeline() -> ConversionPipeline {
        let dictionary =
            GlyphDictionary::new(DMatrix::from_element(4, 1, 1.0), 2, 2, 65).expect("valid");
        ConversionPipeline::new(dictionary)
    }

    fn white_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])))
    }

    #[test]
    fn projection_rejects_out_of_range_thresholds() {
        for threshold in [-0.1, 1.1, f64::NAN] {
            assert!(matches!(
                pipeline().convert_via_projection(&white_image(), threshold),
                Err(ConversionError::ThresholdOutOfRange(_))
            ));
        }
    }

    #[tokio::test]
    async fn divergence_rejects_bad_parameters_before_solving() {
        let options = DivergenceOptions {
            iteration_count: 0,
            ..DivergenceOptions::default()
        };
        assert!(matches!(
            pipeline()
                .convert_via_divergence(&white_image(), &options, 0.0, |_| {})
                .await,
            Err(ConversionError::ZeroIterationCount)
        ));
        assert!(matches!(
            pipeline()
                .convert_via_divergence(&white_image(), &DivergenceOptions::default(), 2.0, |_| {})
                .await,
            Err(ConversionError::ThresholdOutOfRange(_))
        ));
    }

    #[tokio::test]
    async fn strategy_dispatch_matches_the_direct_calls() {
        let pipeline = pipeline();
        let direct = pipeline
            .convert_via_projection(&white_image(), 0.5)
            .expect("projection succeeds");
        let dispatched = pipeline
            .convert(&white_image(), &SolverStrategy::Projection, 0.5, |_| {})
            .await
            .expect("dispatch succeeds");
        assert_eq!(direct, dispatched);
    }
}
