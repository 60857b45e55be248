use thiserror::Error;

/// Fatal failures of a single conversion request.
///
/// Nothing in the engine is retried and no partial result survives an error:
/// a conversion either returns a complete character grid or one of these.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The activation threshold must lie in `[0.0, 1.0]`.
    #[error("threshold {0} is outside the valid range [0.0, 1.0]")]
    ThresholdOutOfRange(f64),

    /// The iterative solver needs at least one multiplicative update.
    #[error("iteration count must be at least 1")]
    ZeroIterationCount,

    /// The row fan-out needs at least one worker.
    #[error("degree of parallelism must be at least 1")]
    ZeroParallelism,

    /// The dictionary matrix does not match the advertised cell geometry.
    #[error(
        "dictionary matrix has {actual} rows but a {cell_width}x{cell_height} cell has {expected} pixels"
    )]
    DictionaryShape {
        actual: usize,
        expected: usize,
        cell_width: u32,
        cell_height: u32,
    },

    /// The character-code offset maps a dictionary column outside Unicode.
    #[error("glyph index {index} maps to invalid character code {code}")]
    InvalidGlyphCode { index: usize, code: u32 },

    /// SVD of the dictionary matrix did not converge.
    #[error("pseudoinverse of the dictionary matrix failed: {0}")]
    PseudoInverse(&'static str),

    /// A row-update worker went away mid-iteration (task panic or closed channel).
    #[error("activation update worker terminated unexpectedly")]
    WorkerFailure,
}
