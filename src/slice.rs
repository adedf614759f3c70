use crate::config::ProcessingConfig;
use crate::enums::Modality;
use crate::interpolator::Interpolator;
use crate::morphology::{binary_closing, disk};

use dicom::object::open_file;
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, ArrayView2, Axis, Ix4, Zip, s};
use ndarray_npy::{ReadNpyError, WriteNpyError, read_npy, write_npy};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("could not open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: dicom::object::ReadError,
    },

    #[error("could not decode pixel data of {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: dicom::pixeldata::Error,
    },

    #[error("{}: unreadable {attribute}", path.display())]
    Metadata {
        path: PathBuf,
        attribute: &'static str,
    },

    #[error("could not resample slice: {0}")]
    Resample(#[from] ndarray::ShapeError),

    #[error("mask of shape {mask:?} does not fit slice of shape {slice:?}")]
    ShapeMismatch {
        mask: (usize, usize),
        slice: (usize, usize),
    },

    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: WriteNpyError,
    },

    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: ReadNpyError,
    },
}

/// Linear modality transform from stored values to physical units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rescale {
    pub slope: f64,
    pub intercept: f64,
}

impl Default for Rescale {
    fn default() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
        }
    }
}

impl Rescale {
    #[inline]
    pub fn apply(&self, value: f32) -> f32 {
        (value as f64 * self.slope + self.intercept) as f32
    }
}

/// Decodes the first frame of a DICOM file into intensities.
pub trait PixelSource {
    /// CT slices come back in Hounsfield units, MR slices as stored.
    fn decode(&self, path: &Path, modality: Modality) -> Result<Array2<f32>, SliceError>;
}

/// [`PixelSource`] backed by the dicom-rs pixel data decoders.
#[derive(Clone, Copy, Debug, Default)]
pub struct DicomPixelSource;

impl DicomPixelSource {
    fn read_rescale(
        object: &dicom::object::DefaultDicomObject,
        path: &Path,
    ) -> Result<Rescale, SliceError> {
        let field = |tag, attribute, default| match object.element(tag) {
            Ok(element) => element.to_float64().map_err(|_| SliceError::Metadata {
                path: path.to_owned(),
                attribute,
            }),
            Err(_) => Ok(default),
        };
        Ok(Rescale {
            slope: field(tags::RESCALE_SLOPE, "RescaleSlope", 1.0)?,
            intercept: field(tags::RESCALE_INTERCEPT, "RescaleIntercept", 0.0)?,
        })
    }
}

impl PixelSource for DicomPixelSource {
    fn decode(&self, path: &Path, modality: Modality) -> Result<Array2<f32>, SliceError> {
        let object = open_file(path).map_err(|source| SliceError::Open {
            path: path.to_owned(),
            source,
        })?;
        let decode_error = |source| SliceError::Decode {
            path: path.to_owned(),
            source,
        };

        let pixel_data = object.decode_pixel_data().map_err(decode_error)?;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let frames = pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map_err(decode_error)?
            .into_dimensionality::<Ix4>()
            .map_err(|_| SliceError::Metadata {
                path: path.to_owned(),
                attribute: "PixelData",
            })?;
        let mut image = frames.slice_move(s![0, .., .., 0]);

        if modality == Modality::CT {
            let rescale = Self::read_rescale(&object, path)?;
            debug!("{}: {:?}", path.display(), rescale);
            image.mapv_inplace(|v| rescale.apply(v));
        }
        Ok(image)
    }
}

/// Single channel intensity image of shape `(1, H, W)`.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceArray(Array3<f32>);

impl SliceArray {
    /// Add the leading channel axis to a decoded image.
    pub fn from_pixels(pixels: Array2<f32>) -> Self {
        Self(pixels.insert_axis(Axis(0)))
    }

    pub fn from_array(array: Array3<f32>) -> Self {
        Self(array)
    }

    pub fn array(&self) -> &Array3<f32> {
        &self.0
    }

    pub fn into_array(self) -> Array3<f32> {
        self.0
    }

    /// The only channel.
    pub fn pixels(&self) -> ArrayView2<'_, f32> {
        self.0.index_axis(Axis(0), 0)
    }

    /// Spatial shape `(H, W)`.
    pub fn dim(&self) -> (usize, usize) {
        let (_, h, w) = self.0.dim();
        (h, w)
    }

    /// Bilinear resample to `resolution` x `resolution`, if not already there.
    pub fn resampled(self, resolution: usize) -> Result<Self, SliceError> {
        if self.dim() == (resolution, resolution) {
            return Ok(self);
        }
        let pixels = Interpolator::resize(&self.pixels(), resolution, resolution)?;
        Ok(Self::from_pixels(pixels))
    }

    /// Shift to a zero minimum and scale to a unit maximum. A constant slice
    /// becomes all zeros.
    pub fn normalize(&mut self) {
        let min = self.0.fold(f32::INFINITY, |acc, &v| acc.min(v));
        if !min.is_finite() {
            return;
        }
        self.0.mapv_inplace(|v| v - min);
        let max = self.0.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        if max != 0.0 {
            self.0.mapv_inplace(|v| v / max);
        }
    }

    /// Zero every pixel outside `mask`.
    pub fn apply_mask(&mut self, mask: &BodyMask) -> Result<(), SliceError> {
        if mask.dim() != self.dim() {
            return Err(SliceError::ShapeMismatch {
                mask: mask.dim(),
                slice: self.dim(),
            });
        }
        Zip::from(self.0.index_axis_mut(Axis(0), 0))
            .and(&mask.0)
            .for_each(|v, &inside| {
                if !inside {
                    *v = 0.0;
                }
            });
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), SliceError> {
        write_npy(path, &self.0).map_err(|source| SliceError::Write {
            path: path.to_owned(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SliceError> {
        read_npy::<_, Array3<f32>>(path)
            .map(Self)
            .map_err(|source| SliceError::Read {
                path: path.to_owned(),
                source,
            })
    }
}

/// Region of the body on a CT slice. Pixels outside are background in both
/// modalities of a pair.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyMask(Array2<bool>);

impl BodyMask {
    /// Threshold the CT slice, close small gaps, then clear everything from
    /// the table cutoff row down.
    pub fn from_ct(ct: &SliceArray, config: &ProcessingConfig) -> Self {
        let threshold = config.hounsfield_threshold;
        let foreground: Array2<u8> = ct.pixels().mapv(|v| u8::from(v > threshold));

        let mut closed = binary_closing(foreground.view(), disk(config.closing_radius).view());
        if config.table_cutoff_row < closed.nrows() {
            closed.slice_mut(s![config.table_cutoff_row.., ..]).fill(0);
        }

        Self(closed.mapv(|v| v != 0))
    }

    pub fn dim(&self) -> (usize, usize) {
        self.0.dim()
    }

    pub fn array(&self) -> &Array2<bool> {
        &self.0
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&inside| inside).count()
    }
}

/// The CT and MR slices of one patient location.
#[derive(Clone, Debug, PartialEq)]
pub struct SlicePair {
    pub ct: SliceArray,
    pub mr: SliceArray,
}

impl SlicePair {
    pub fn get(&self, modality: Modality) -> &SliceArray {
        match modality {
            Modality::CT => &self.ct,
            Modality::MR => &self.mr,
        }
    }
}

/// Turns a matched CT/MR file pair into normalized, masked slices.
pub struct SliceProcessor<'a, S = DicomPixelSource> {
    config: &'a ProcessingConfig,
    source: S,
}

impl<'a> SliceProcessor<'a> {
    pub fn new(config: &'a ProcessingConfig) -> Self {
        Self::with_source(config, DicomPixelSource)
    }
}

impl<'a, S: PixelSource> SliceProcessor<'a, S> {
    pub fn with_source(config: &'a ProcessingConfig, source: S) -> Self {
        Self { config, source }
    }

    /// Decode a single file into a slice at the target resolution.
    pub fn load(&self, path: &Path, modality: Modality) -> Result<SliceArray, SliceError> {
        let pixels = self.source.decode(path, modality)?;
        SliceArray::from_pixels(pixels).resampled(self.config.target_resolution)
    }

    /// Decode, resample, normalize and mask both slices of a location.
    pub fn process(&self, ct_path: &Path, mr_path: &Path) -> Result<SlicePair, SliceError> {
        let mut ct = self.load(ct_path, Modality::CT)?;
        let mask = BodyMask::from_ct(&ct, self.config);
        debug!("{}: body mask covers {} pixels", ct_path.display(), mask.count());
        ct.normalize();
        ct.apply_mask(&mask)?;

        let mut mr = self.load(mr_path, Modality::MR)?;
        mr.normalize();
        mr.apply_mask(&mask)?;

        Ok(SlicePair { ct, mr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Air everywhere, soft tissue inside a centered disk.
    fn disk_phantom(size: usize, radius: f32) -> Array2<f32> {
        let c = (size as f32 - 1.0) / 2.0;
        Array2::from_shape_fn((size, size), |(y, x)| {
            let (dy, dx) = (y as f32 - c, x as f32 - c);
            if dy * dy + dx * dx <= radius * radius {
                40.0
            } else {
                -1000.0
            }
        })
    }

    #[test]
    fn rescale_maps_stored_values() {
        let rescale = Rescale {
            slope: 1.0,
            intercept: -1024.0,
        };
        assert_eq!(rescale.apply(1024.0), 0.0);
        assert_eq!(Rescale::default().apply(7.0), 7.0);
    }

    #[test]
    fn constant_slice_normalizes_to_zero() {
        let mut slice = SliceArray::from_pixels(Array2::from_elem((4, 4), 123.0));
        slice.normalize();
        assert!(slice.array().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn normalize_spans_unit_range() {
        let mut slice = SliceArray::from_pixels(ndarray::array![[-10.0, 0.0], [10.0, 30.0]]);
        slice.normalize();
        assert_eq!(
            slice.into_array(),
            ndarray::array![[[0.0, 0.25], [0.5, 1.0]]]
        );
    }

    #[test]
    fn body_mask_is_the_disk_above_the_table() {
        let config = ProcessingConfig::default();
        let ct = SliceArray::from_pixels(disk_phantom(512, 150.0));
        let mask = BodyMask::from_ct(&ct, &config);

        assert_eq!(mask.dim(), (512, 512));
        // center and disk edge are inside
        assert!(mask.array()[[255, 255]]);
        assert!(mask.array()[[255, 110]]);
        // corners are air
        assert!(!mask.array()[[5, 5]]);
        assert!(!mask.array()[[255, 5]]);
        // the disk reaches row 405, rows from the cutoff down stay clear
        assert!(mask.array()[[400, 255]]);
        assert!(
            mask.array()
                .slice(s![config.table_cutoff_row.., ..])
                .iter()
                .all(|&inside| !inside)
        );
    }

    #[test]
    fn table_rows_are_cleared_even_when_dense() {
        let config = ProcessingConfig::default();
        let ct = SliceArray::from_pixels(Array2::from_elem((512, 512), 100.0));
        let mask = BodyMask::from_ct(&ct, &config);
        assert!(mask.array()[[config.table_cutoff_row - 1, 0]]);
        assert!(!mask.array()[[config.table_cutoff_row, 0]]);
        assert_eq!(mask.count(), config.table_cutoff_row * 512);
    }

    #[test]
    fn masking_happens_after_normalization() {
        let mut slice = SliceArray::from_pixels(ndarray::array![[1.0, 2.0], [3.0, 5.0]]);
        let mask = BodyMask(ndarray::array![[true, false], [false, true]]);
        slice.normalize();
        slice.apply_mask(&mask).unwrap();
        assert_eq!(
            slice.into_array(),
            ndarray::array![[[0.0, 0.0], [0.0, 1.0]]]
        );
    }

    #[test]
    fn mismatched_mask_is_an_error() {
        let mut slice = SliceArray::from_pixels(Array2::zeros((2, 2)));
        let mask = BodyMask(Array2::from_elem((3, 3), true));
        assert!(matches!(
            slice.apply_mask(&mask),
            Err(SliceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn small_slices_are_resampled_to_target() {
        let slice = SliceArray::from_pixels(Array2::from_elem((64, 64), 2.0));
        let resampled = slice.resampled(512).unwrap();
        assert_eq!(resampled.array().dim(), (1, 512, 512));
    }

    struct Phantom;

    impl PixelSource for Phantom {
        fn decode(&self, _path: &Path, modality: Modality) -> Result<Array2<f32>, SliceError> {
            Ok(match modality {
                Modality::CT => disk_phantom(128, 40.0),
                Modality::MR => Array2::from_shape_fn((128, 128), |(y, x)| (y + x) as f32),
            })
        }
    }

    #[test]
    fn processed_pair_is_masked_and_normalized() {
        let config = ProcessingConfig::default();
        let processor = SliceProcessor::with_source(&config, Phantom);
        let pair = processor
            .process(Path::new("ct.dcm"), Path::new("mr.dcm"))
            .unwrap();

        for modality in Modality::ALL {
            let slice = pair.get(modality);
            assert_eq!(slice.array().dim(), (1, 512, 512));
            assert!(slice.array().iter().all(|&v| (0.0..=1.0).contains(&v)));
            // air in the corner is masked out
            assert_eq!(slice.array()[[0, 0, 0]], 0.0);
            assert_eq!(slice.array()[[0, 500, 255]], 0.0);
        }
        assert!(pair.mr.array()[[0, 255, 255]] > 0.0);
        assert!(pair.ct.array()[[0, 255, 255]] > 0.0);
    }

    #[test]
    fn slice_survives_npy_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p_1.npy");
        let slice = SliceArray::from_pixels(Array2::from_shape_fn((512, 512), |(y, _)| {
            y as f32 / 511.0
        }));
        slice.save(&path).unwrap();

        let loaded = SliceArray::load(&path).unwrap();
        assert_eq!(loaded.array().dim(), (1, 512, 512));
        assert!(loaded.array().iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(loaded, slice);
    }
}
