//! # DICOM-pairs library
//!
//! This crate turns per-patient CT and MR DICOM studies into a paired slice
//! dataset for image-to-image learning.
//!
//! Each patient directory is scanned for the CT series registered onto MR
//! (series description containing `CTtoMR`) and the T2-weighted MR series.
//! CT slices are matched to MR slices by location: the numeric segment of
//! the CT file name, and the Instance Number of the MR file. For patients
//! whose CT was stored in the opposite direction, the CT order is reversed
//! before matching.
//!
//! Every matched pair is processed the same way:
//!  - CT is converted to Hounsfield units through its rescale slope and
//!    intercept
//!  - both slices are resampled to 512 x 512
//!  - a body mask is derived from CT (threshold at -500 HU, closing with a
//!    disk, table rows cleared)
//!  - both slices are min-max normalized and then masked
//!
//! The output is one `(1, 512, 512)` `f32` `.npy` file per slice:
//! `{out}/{train,val,test}/{CT,MR}/{patient}_{location}.npy`.
//! DICOM files are assumed to have the following attributes:
//!   - No multiframe (always the first frame is used)
//!   - One CT and one MR file per location and patient
//!
//! # Examples
//!
//! ## Preprocessing the Gold Atlas cohort
//!
//! ```no_run
//! # use dicom_pairs::{PatientCohort, Pipeline, ProcessingConfig, ProgressEvent};
//! # use std::path::Path;
//! let cohort = PatientCohort::gold_atlas(&[1, 2, 3]).expect("cohort splits should be disjoint");
//! let config = ProcessingConfig::default();
//! let summary = Pipeline::new(&cohort, &config)
//!     .run(Path::new("gold_atlas"), Path::new("out"), &mut |event: ProgressEvent<'_>| {
//!         println!("{event:?}")
//!     })
//!     .expect("should have written the dataset");
//! println!("{} pairs written", summary.written);
//! ```
//!
//! ## Previewing the result
//!
//! ```no_run
//! # use dicom_pairs::{Joiner, ProcessingConfig};
//! # use std::path::Path;
//! let config = ProcessingConfig::default();
//! Joiner::new(&config)
//!     .run(Path::new("out"), Path::new("png_out"))
//!     .expect("every CT slice should have an MR partner");
//! ```

pub mod cohort;
pub mod config;
pub mod enums;
pub mod index;
mod interpolator;
pub mod joiner;
pub mod materializer;
pub mod morphology;
pub mod pipeline;
pub mod reconcile;
pub mod slice;

pub use cohort::{CohortError, CohortFile, PatientCohort};
pub use config::ProcessingConfig;
pub use enums::{Modality, Split};
pub use index::{IndexError, Location, LocationMap, ModalityRecord, SeriesIndex, build_index};
pub use joiner::{JoinError, Joiner};
pub use materializer::{
    MaterializeError, Materializer, ProgressEvent, ProgressSink, Summary, create_output_dirs,
    output_path,
};
pub use pipeline::{Pipeline, PipelineError, index_split};
pub use reconcile::reconcile;
pub use slice::{
    BodyMask, DicomPixelSource, PixelSource, Rescale, SliceArray, SliceError, SlicePair,
    SliceProcessor,
};
