//! Side-by-side PNG previews of the pairs written by the preprocessor.

use crate::config::ProcessingConfig;
use crate::enums::{Modality, Split};
use crate::interpolator::Interpolator;
use crate::slice::{SliceArray, SliceError};

use image::{GrayImage, ImageError, Luma};
use ndarray::{Array2, ArrayView2, s};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("no MR partner {} for {}", mr.display(), ct.display())]
    MissingPair {
        ct: PathBuf,
        mr: PathBuf,
    },

    #[error("could not access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not write {}: {source}", path.display())]
    Image {
        path: PathBuf,
        source: ImageError,
    },

    #[error(transparent)]
    Slice(#[from] SliceError),
}

pub struct Joiner<'a> {
    config: &'a ProcessingConfig,
}

impl<'a> Joiner<'a> {
    pub fn new(config: &'a ProcessingConfig) -> Self {
        Self { config }
    }

    #[inline]
    fn normalize_to_u8(value: f32) -> u8 {
        (value * 255.0).clamp(0.0, 255.0) as u8
    }

    /// Both slices at preview resolution, CT on the left, MR on the right.
    pub fn join_pair(&self, ct: &SliceArray, mr: &SliceArray) -> Result<Array2<f32>, JoinError> {
        let res = self.config.preview_resolution;
        let resize = |slice: &SliceArray| {
            Interpolator::resize(&slice.pixels(), res, res).map_err(SliceError::from)
        };
        let mut joined = Array2::<f32>::zeros((res, 2 * res));
        joined.slice_mut(s![.., ..res]).assign(&resize(ct)?);
        joined.slice_mut(s![.., res..]).assign(&resize(mr)?);
        Ok(joined)
    }

    fn slice_to_image(slice: &ArrayView2<'_, f32>) -> GrayImage {
        let (height, width) = slice.dim();
        GrayImage::from_fn(width as u32, height as u32, |x, y| {
            Luma([Self::normalize_to_u8(slice[[y as usize, x as usize]])])
        })
    }

    /// Join every `CT`/`MR` pair of one split into `{output}/{split}/{stem}.png`.
    ///
    /// Returns the number of images written.
    pub fn join_split(
        &self,
        input: &Path,
        output: &Path,
        split: Split,
    ) -> Result<usize, JoinError> {
        let ct_dir = input.join(split.dir_name()).join(Modality::CT.as_str());
        let mr_dir = input.join(split.dir_name()).join(Modality::MR.as_str());
        let out_dir = output.join(split.dir_name());
        fs::create_dir_all(&out_dir).map_err(|source| JoinError::Io {
            path: out_dir.clone(),
            source,
        })?;

        let mut written = 0;
        for ct_path in npy_files(&ct_dir)? {
            let Some(name) = ct_path.file_name() else {
                continue;
            };
            let mr_path = mr_dir.join(name);
            if !mr_path.is_file() {
                return Err(JoinError::MissingPair {
                    ct: ct_path,
                    mr: mr_path,
                });
            }

            let joined =
                self.join_pair(&SliceArray::load(&ct_path)?, &SliceArray::load(&mr_path)?)?;
            let mut png_path = out_dir.join(name);
            png_path.set_extension("png");

            Self::slice_to_image(&joined.view())
                .save(&png_path)
                .map_err(|source| JoinError::Image {
                    path: png_path.clone(),
                    source,
                })?;
            debug!("Wrote {}", png_path.display());
            written += 1;
        }
        Ok(written)
    }

    /// Join every split. Returns the number of images written.
    pub fn run(&self, input: &Path, output: &Path) -> Result<usize, JoinError> {
        Split::ALL
            .into_iter()
            .map(|split| self.join_split(input, output, split))
            .sum()
    }
}

fn npy_files(dir: &Path) -> Result<Vec<PathBuf>, JoinError> {
    let io_error = |source: std::io::Error| JoinError::Io {
        path: dir.to_owned(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        paths.push(entry.map_err(io_error)?.path());
    }
    paths.retain(|path| {
        path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("npy")
    });
    paths.sort();
    Ok(paths)
}
