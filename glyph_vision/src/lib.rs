// THEORY:
// This file is the main entry point for the `glyph_vision` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (like the `glyph_cli` front end).
//
// The primary goal is to export the `ConversionPipeline` and its associated data
// structures (`GlyphDictionary`, `DivergenceOptions`, `CharacterGrid`, etc.) as
// the clean, high-level interface for the entire conversion engine. The internal
// numerical modules (`core_modules`) stay reachable for callers that want to
// drive the solvers directly, but the pipeline is the intended surface.

pub mod core_modules;
pub mod error;
pub mod pipeline;
