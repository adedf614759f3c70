//! Parse the Gold Atlas DICOM directories into a paired CT/MR `.npy` dataset.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dicom_pairs::{PatientCohort, Pipeline, ProcessingConfig, ProgressEvent, ProgressSink};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{Level, debug, info, warn};

/// Parse DICOM directories into numpy format
#[derive(Debug, Parser)]
#[command(name = "dicom-pairs", version)]
struct App {
    /// Parent directory for all patient folders
    source: PathBuf,

    /// Directory to write all outputs to
    #[arg(default_value = "out")]
    out: PathBuf,

    /// TOML file with `train`, `val`, `test`, `reversed` and `dropped`
    /// patient lists (default is the built-in Gold Atlas cohort)
    #[arg(long = "cohort", value_name = "FILE")]
    cohort: Option<PathBuf>,

    /// Leave a site of the built-in cohort out (1, 2 or 3), may be repeated
    #[arg(
        long = "no-site",
        value_name = "SITE",
        conflicts_with = "cohort",
        value_parser = clap::value_parser!(u8).range(1..=3)
    )]
    no_site: Vec<u8>,

    /// Print more information about each processed pair
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

/// Renders pipeline events as log lines and one progress bar per split.
#[derive(Default)]
struct Reporter {
    bar: Option<ProgressBar>,
}

impl Reporter {
    fn log(&self, f: impl FnOnce()) {
        match &self.bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

impl ProgressSink for Reporter {
    fn on_event(&mut self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::SplitStarted {
                split,
                patients,
                locations,
            } => {
                self.finish();
                info!("Saving {split}: {patients} patients, {locations} locations");
                let bar = ProgressBar::new(patients as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                self.bar = Some(bar);
            }
            ProgressEvent::Reversed { patient } => {
                self.log(|| info!("Reversing order for {patient}"));
            }
            ProgressEvent::PatientStarted { patient, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_message(patient.to_string());
                }
            }
            ProgressEvent::PatientDropped { patient } => {
                self.log(|| info!("Dropping {patient}"));
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
            }
            ProgressEvent::PairSkipped { patient, location } => {
                self.log(|| warn!("File found for {patient} at {location}"));
            }
            ProgressEvent::PairWritten { patient, location } => {
                self.log(|| debug!("Saved {patient} at {location}"));
            }
            ProgressEvent::PatientFinished { .. } => {
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
            }
        }
    }
}

fn main() -> Result<()> {
    let App {
        source,
        out,
        cohort,
        no_site,
        verbose,
    } = App::parse();

    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let cohort = match cohort {
        Some(path) => PatientCohort::load(&path)
            .with_context(|| format!("Invalid cohort file {}", path.display()))?,
        None => {
            let sites: Vec<usize> = (1..=3u8)
                .filter(|site| !no_site.contains(site))
                .map(usize::from)
                .collect();
            PatientCohort::gold_atlas(&sites).context("Invalid built-in cohort")?
        }
    };
    info!("Cohort: {cohort}");

    if !out.exists() {
        info!("No output directory {}. Creating it...", out.display());
    }

    let config = ProcessingConfig::default();
    let mut reporter = Reporter::default();
    info!("Parsing directories...");
    let summary = Pipeline::new(&cohort, &config)
        .run(&source, &out, &mut reporter)
        .with_context(|| format!("Could not build the dataset from {}", source.display()))?;
    reporter.finish();

    info!(
        "Done! {} pairs written, {} already present, {} patients dropped",
        summary.written, summary.skipped, summary.dropped
    );
    Ok(())
}
