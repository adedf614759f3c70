//! The full preprocessing pass: index every split, then write every split.

use crate::cohort::PatientCohort;
use crate::config::ProcessingConfig;
use crate::enums::Split;
use crate::index::{IndexError, SeriesIndex, build_index};
use crate::materializer::{
    MaterializeError, Materializer, ProgressEvent, ProgressSink, Summary, create_output_dirs,
};
use crate::reconcile::reconcile;
use crate::slice::{DicomPixelSource, PixelSource, SliceProcessor};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),
}

/// Index the patients of one split and line their CT up with MR.
pub fn index_split(
    cohort: &PatientCohort,
    source: &Path,
    split: Split,
    sink: &mut impl ProgressSink,
) -> Result<SeriesIndex, IndexError> {
    let mut index = build_index(&cohort.split_paths(source, split))?;
    for patient in reconcile(&mut index, cohort) {
        sink.on_event(ProgressEvent::Reversed { patient: &patient });
    }
    Ok(index)
}

pub struct Pipeline<'a, S = DicomPixelSource> {
    cohort: &'a PatientCohort,
    config: &'a ProcessingConfig,
    source: S,
}

impl<'a> Pipeline<'a> {
    pub fn new(cohort: &'a PatientCohort, config: &'a ProcessingConfig) -> Self {
        Self::with_source(cohort, config, DicomPixelSource)
    }
}

impl<'a, S: PixelSource> Pipeline<'a, S> {
    pub fn with_source(cohort: &'a PatientCohort, config: &'a ProcessingConfig, source: S) -> Self {
        Self {
            cohort,
            config,
            source,
        }
    }

    /// Build `{out}/{train,val,test}/{CT,MR}/*.npy` from the patient
    /// directories under `source`.
    ///
    /// All three splits are indexed before the first slice is decoded, so a
    /// duplicate anywhere in the cohort stops the run before it writes.
    pub fn run(
        self,
        source: &Path,
        out: &Path,
        sink: &mut impl ProgressSink,
    ) -> Result<Summary, PipelineError> {
        create_output_dirs(out)?;

        let indices = Split::ALL
            .into_iter()
            .map(|split| Ok((split, index_split(self.cohort, source, split, sink)?)))
            .collect::<Result<Vec<_>, IndexError>>()?;

        let materializer = Materializer::new(
            self.cohort,
            SliceProcessor::with_source(self.config, self.source),
        );
        let mut summary = Summary::default();
        for (split, index) in &indices {
            sink.on_event(ProgressEvent::SplitStarted {
                split: *split,
                patients: index.len(),
                locations: index.location_count(),
            });
            summary += materializer.materialize(&out.join(split.dir_name()), index, sink)?;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_patient_directory_is_an_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let cohort =
            PatientCohort::new(vec!["ghost".to_string()], vec![], vec![], vec![], vec![]).unwrap();
        let config = ProcessingConfig::default();

        let err = Pipeline::new(&cohort, &config)
            .run(dir.path(), &dir.path().join("out"), &mut |_: ProgressEvent<'_>| {})
            .unwrap_err();
        match err {
            PipelineError::Index(IndexError::Io { path, .. }) => {
                assert_eq!(path, dir.path().join("ghost"));
            }
            PipelineError::Index(other) => panic!("unexpected index error: {other}"),
            PipelineError::Materialize(other) => panic!("unexpected write error: {other}"),
        }
    }
}
