use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use glyph_vision::pipeline::{
    CharacterGrid, ConversionPipeline, DivergenceOptions, GlyphDictionary, SolverStrategy,
};

mod font8x8;
use font8x8::{FIRST_GLYPH_CODE, GLYPH_BITMAPS, GLYPH_HEIGHT, GLYPH_WIDTH};

/// Render a raster image as monospaced glyph art.
#[derive(Parser)]
#[command(name = "glyph_cli", version)]
struct Args {
    /// Path of the image to convert.
    input: PathBuf,

    /// Solve by pseudoinverse projection instead of iterative factorization.
    #[arg(short, long)]
    projection: bool,

    /// Beta-divergence parameter: 0 is Itakura-Saito, 1 is Kullback-Leibler,
    /// 2 is squared Euclidean. Ignored with --projection.
    #[arg(short, long, default_value_t = 2.0)]
    beta: f64,

    /// Minimum activation a glyph needs to beat a blank cell, from 0.0 to 1.0.
    #[arg(short, long, default_value_t = 0.0, value_parser = parse_threshold)]
    threshold: f64,

    /// Number of multiplicative updates. Ignored with --projection.
    #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u16).range(1..))]
    iterations: u16,

    /// Worker tasks used for row updates; defaults to the core count.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Output HTML file.
    #[arg(short, long, default_value = "output.html")]
    output: PathBuf,
}

fn parse_threshold(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(String::from("possible values are from 0.0 to 1.0"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_log()?;

    // --- 1. Dictionary & Pipeline Setup ---
    let dictionary = build_dictionary().context("glyph dictionary construction failed")?;
    let pipeline = ConversionPipeline::new(dictionary);

    // --- 2. Image Decoding ---
    let image = image::open(&args.input)
        .with_context(|| format!("cannot open file {}", args.input.display()))?;

    // --- 3. Conversion ---
    let strategy = if args.projection {
        SolverStrategy::Projection
    } else {
        SolverStrategy::Divergence(DivergenceOptions {
            beta: args.beta,
            iteration_count: args.iterations,
            parallelism: args.jobs.unwrap_or_else(num_cpus::get),
        })
    };

    println!("Converting image...");
    let grid = pipeline
        .convert(&image, &strategy, args.threshold, |progress| {
            println!("{progress}%");
        })
        .await
        .context("cannot convert the specified image")?;

    // --- 4. Output Serialization ---
    println!("Saving result to {}...", args.output.display());
    write_html(&args.output, &grid)
        .with_context(|| format!("cannot write {}", args.output.display()))?;
    println!("Done!");

    Ok(())
}

/// Expands the packed bitmap rows into per-glyph intensity vectors and wraps
/// them in the engine's dictionary resource.
fn build_dictionary() -> Result<GlyphDictionary, glyph_vision::error::ConversionError> {
    let bitmaps: Vec<Vec<f64>> = GLYPH_BITMAPS
        .iter()
        .map(|rows| {
            let mut intensities = Vec::with_capacity((GLYPH_WIDTH * GLYPH_HEIGHT) as usize);
            for &row in rows {
                for bit in 0..GLYPH_WIDTH {
                    intensities.push(if row >> bit & 1 == 1 { 1.0 } else { 0.0 });
                }
            }
            intensities
        })
        .collect();

    GlyphDictionary::from_bitmaps(&bitmaps, GLYPH_WIDTH, GLYPH_HEIGHT, FIRST_GLYPH_CODE)
}

fn write_html(path: &Path, grid: &CharacterGrid) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "<font face=\"courier\"><pre>")?;
    for line in grid.lines() {
        writeln!(writer, "{line}")?;
    }
    write!(writer, "</pre></font>")?;
    writer.flush()
}

fn init_log() -> anyhow::Result<()> {
    use log4rs::append::console::ConsoleAppender;
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {l} {t} {m}{n}",
        )))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(log::LevelFilter::Warn))?;
    log4rs::init_config(config)?;
    Ok(())
}
