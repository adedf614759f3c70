//! Writes the processed pairs of an index into a split directory.

use crate::cohort::PatientCohort;
use crate::enums::{Modality, Split};
use crate::index::{Location, SeriesIndex};
use crate::slice::{DicomPixelSource, PixelSource, SliceError, SliceProcessor};

use std::fs;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("no {missing} file for patient {patient} at location {location}")]
    IncompletePair {
        patient: String,
        location: Location,
        missing: Modality,
    },

    #[error("could not create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Slice(#[from] SliceError),
}

/// What happened while building the dataset, in the order it happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressEvent<'a> {
    /// A split was indexed and is about to be written.
    SplitStarted {
        split: Split,
        patients: usize,
        locations: usize,
    },
    /// The CT order of a patient was reversed to follow MR.
    Reversed { patient: &'a str },
    PatientStarted {
        patient: &'a str,
        locations: usize,
    },
    /// Patient is on the drop list; nothing is written for it.
    PatientDropped { patient: &'a str },
    /// Both output files of a pair already exist.
    PairSkipped {
        patient: &'a str,
        location: Location,
    },
    PairWritten {
        patient: &'a str,
        location: Location,
    },
    PatientFinished { patient: &'a str },
}

/// Receives [`ProgressEvent`]s. Implemented for any `FnMut(ProgressEvent)`.
pub trait ProgressSink {
    fn on_event(&mut self, event: ProgressEvent<'_>);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent<'_>),
{
    fn on_event(&mut self, event: ProgressEvent<'_>) {
        self(event)
    }
}

/// Counts of a materialization run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub written: usize,
    pub skipped: usize,
    pub dropped: usize,
}

impl AddAssign for Summary {
    fn add_assign(&mut self, other: Self) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.dropped += other.dropped;
    }
}

/// `{split_dir}/{modality}/{patient}_{location}.npy`
pub fn output_path(
    split_dir: &Path,
    modality: Modality,
    patient: &str,
    location: Location,
) -> PathBuf {
    split_dir
        .join(modality.as_str())
        .join(format!("{patient}_{location}.npy"))
}

/// Create `{out}/{split}/{modality}` for every split and modality.
///
/// Returns whether `out` itself had to be created.
pub fn create_output_dirs(out: &Path) -> Result<bool, MaterializeError> {
    let created = !out.exists();
    for split in Split::ALL {
        for modality in Modality::ALL {
            let path = out.join(split.dir_name()).join(modality.as_str());
            fs::create_dir_all(&path)
                .map_err(|source| MaterializeError::CreateDir { path, source })?;
        }
    }
    Ok(created)
}

pub struct Materializer<'a, S = DicomPixelSource> {
    cohort: &'a PatientCohort,
    processor: SliceProcessor<'a, S>,
}

impl<'a, S: PixelSource> Materializer<'a, S> {
    pub fn new(cohort: &'a PatientCohort, processor: SliceProcessor<'a, S>) -> Self {
        Self { cohort, processor }
    }

    /// Process every pair of `index` into `split_dir`, patients and
    /// locations in ascending order.
    ///
    /// Dropped patients are skipped, as are pairs whose two output files
    /// already exist. Any other failure stops the run.
    pub fn materialize(
        &self,
        split_dir: &Path,
        index: &SeriesIndex,
        sink: &mut impl ProgressSink,
    ) -> Result<Summary, MaterializeError> {
        let mut summary = Summary::default();

        for (patient, locations) in index.patients() {
            if self.cohort.is_dropped(patient) {
                sink.on_event(ProgressEvent::PatientDropped { patient });
                summary.dropped += 1;
                continue;
            }
            sink.on_event(ProgressEvent::PatientStarted {
                patient,
                locations: locations.len(),
            });

            for (&location, record) in locations {
                let ct_out = output_path(split_dir, Modality::CT, patient, location);
                let mr_out = output_path(split_dir, Modality::MR, patient, location);
                if ct_out.exists() && mr_out.exists() {
                    sink.on_event(ProgressEvent::PairSkipped { patient, location });
                    summary.skipped += 1;
                    continue;
                }

                let source = |missing| {
                    record
                        .get(missing)
                        .ok_or_else(|| MaterializeError::IncompletePair {
                            patient: patient.to_owned(),
                            location,
                            missing,
                        })
                };
                let pair = self
                    .processor
                    .process(source(Modality::CT)?, source(Modality::MR)?)?;
                pair.ct.save(&ct_out)?;
                pair.mr.save(&mr_out)?;

                sink.on_event(ProgressEvent::PairWritten { patient, location });
                summary.written += 1;
            }

            sink.on_event(ProgressEvent::PatientFinished { patient });
        }

        Ok(summary)
    }
}
