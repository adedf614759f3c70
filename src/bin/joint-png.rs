//! Join the CT and MR arrays of a preprocessed dataset into side-by-side PNGs.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dicom_pairs::{Joiner, ProcessingConfig};
use tracing::{Level, info};

/// Join numpy images into side-by-side PNGs
#[derive(Debug, Parser)]
#[command(name = "joint-png", version)]
struct App {
    /// Directory to parse
    #[arg(default_value = "out")]
    input: PathBuf,

    /// Directory to place PNGs into
    #[arg(default_value = "png_out")]
    output: PathBuf,

    /// Print every written file
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let App {
        input,
        output,
        verbose,
    } = App::parse();

    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = ProcessingConfig::default();
    let written = Joiner::new(&config)
        .run(&input, &output)
        .with_context(|| format!("Could not join the arrays in {}", input.display()))?;

    info!("{written} images saved to {}", output.display());
    Ok(())
}
