use ndarray::{Array2, ArrayView2, ShapeError};
use rayon::prelude::*;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Resize `slice` to `height` x `width` with bilinear interpolation.
    ///
    /// Pixel centers are aligned (half-pixel offset), sampling is clamped to
    /// the edges of the source.
    pub(crate) fn resize(
        slice: &ArrayView2<f32>,
        height: usize,
        width: usize,
    ) -> Result<Array2<f32>, ShapeError> {
        let (slice_height, slice_width) = slice.dim();
        if (slice_height, slice_width) == (height, width) {
            return Ok(slice.to_owned());
        }
        if slice_height == 0 || slice_width == 0 {
            return Ok(Array2::zeros((height, width)));
        }

        let pixel_data: Vec<f32> = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..width).map(move |x| {
                    let norm_x = (x as f32 + 0.5) / width as f32;
                    let norm_y = (y as f32 + 0.5) / height as f32;

                    let src_x = norm_x * slice_width as f32 - 0.5;
                    let src_y = norm_y * slice_height as f32 - 0.5;

                    let src_x = src_x.max(0.0).min((slice_width - 1) as f32);
                    let src_y = src_y.max(0.0).min((slice_height - 1) as f32);

                    Self::bilinear_interpolate(slice, src_y, src_x)
                })
            })
            .collect();

        Array2::from_shape_vec((height, width), pixel_data)
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn same_size_is_a_copy() {
        let slice = array![[1.0f32, 2.0], [3.0, 4.0]];
        assert_eq!(Interpolator::resize(&slice.view(), 2, 2).unwrap(), slice);
    }

    #[test]
    fn empty_source_gives_a_blank_target() {
        let slice = Array2::<f32>::zeros((0, 3));
        assert_eq!(
            Interpolator::resize(&slice.view(), 2, 5).unwrap(),
            Array2::<f32>::zeros((2, 5))
        );
        let degenerate = Interpolator::resize(&array![[1.0f32, 2.0]].view(), 3, 0).unwrap();
        assert_eq!(degenerate.dim(), (3, 0));
    }

    #[test]
    fn constant_image_stays_constant() {
        let slice = Array2::from_elem((5, 7), 3.5f32);
        let resized = Interpolator::resize(&slice.view(), 16, 16).unwrap();
        assert_eq!(resized.dim(), (16, 16));
        assert!(resized.iter().all(|&v| (v - 3.5).abs() < 1e-6));
    }

    #[test]
    fn upsampling_stays_within_source_range() {
        let slice = array![[0.0f32, 10.0], [20.0, 30.0]];
        let resized = Interpolator::resize(&slice.view(), 4, 4).unwrap();
        assert_eq!(resized[[0, 0]], 0.0);
        assert_eq!(resized[[3, 3]], 30.0);
        assert!(resized.iter().all(|&v| (0.0..=30.0).contains(&v)));
        // half-pixel alignment: second column sits a quarter of the way to the right
        assert!((resized[[0, 1]] - 2.5).abs() < 1e-5);
    }

    #[test]
    fn downsampling_a_gradient_keeps_it_monotonic() {
        let slice = Array2::from_shape_fn((8, 8), |(_, x)| x as f32);
        let resized = Interpolator::resize(&slice.view(), 4, 4).unwrap();
        let row: Vec<f32> = resized.row(0).to_vec();
        assert!(row.windows(2).all(|w| w[0] < w[1]));
    }
}
