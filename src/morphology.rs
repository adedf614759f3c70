//! Binary morphology over `0`/`1` label images.
//!
//! A footprint is split into horizontal runs, one or more per footprint row.
//! Each run becomes a sliding window over per-row prefix sums, and the
//! window images are then shifted vertically and combined into the result.
//! Pixels outside the image never take part: dilation sees them as
//! background, erosion as foreground.

use ndarray::{Array2, ArrayView2, Zip, s};
use std::collections::HashMap;

/// Horizontal run of a footprint: row offset, first and last column offset.
type Run = (isize, isize, isize);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Combine {
    Any,
    All,
}

/// Disk footprint of the given radius: `(2r+1) x (2r+1)`, set where
/// `dy² + dx² <= r²`.
pub fn disk(radius: usize) -> Array2<u8> {
    let r = radius as isize;
    let size = 2 * radius + 1;
    Array2::from_shape_fn((size, size), |(y, x)| {
        let (dy, dx) = (y as isize - r, x as isize - r);
        u8::from(dy * dy + dx * dx <= r * r)
    })
}

/// `out[q] = max over o in footprint of in[q - o]`
pub fn binary_dilation(input: ArrayView2<u8>, footprint: ArrayView2<u8>) -> Array2<u8> {
    let reflected: Vec<Run> = row_runs(footprint)
        .into_iter()
        .map(|(dy, first, last)| (-dy, -last, -first))
        .collect();
    filter(input, &reflected, Combine::Any)
}

/// `out[q] = min over o in footprint of in[q + o]`
pub fn binary_erosion(input: ArrayView2<u8>, footprint: ArrayView2<u8>) -> Array2<u8> {
    filter(input, &row_runs(footprint), Combine::All)
}

/// Dilation followed by erosion: fills gaps smaller than the footprint.
pub fn binary_closing(input: ArrayView2<u8>, footprint: ArrayView2<u8>) -> Array2<u8> {
    let dilated = binary_dilation(input, footprint);
    binary_erosion(dilated.view(), footprint)
}

/// Runs of active elements, relative to the footprint center.
fn row_runs(footprint: ArrayView2<u8>) -> Vec<Run> {
    let (fr, fc) = footprint.dim();
    let (center_r, center_c) = ((fr / 2) as isize, (fc / 2) as isize);
    let mut runs = Vec::new();

    for (r, row) in footprint.rows().into_iter().enumerate() {
        let mut start = None;
        for c in 0..=fc {
            let active = c < fc && row[c] != 0;
            match (active, start) {
                (true, None) => start = Some(c),
                (false, Some(first)) => {
                    runs.push((
                        r as isize - center_r,
                        first as isize - center_c,
                        c as isize - 1 - center_c,
                    ));
                    start = None;
                }
                _ => {}
            }
        }
    }
    runs
}

fn filter(input: ArrayView2<u8>, runs: &[Run], combine: Combine) -> Array2<u8> {
    let (rows, cols) = input.dim();

    // prefix[[y, x]]: foreground pixels of row y left of column x
    let mut prefix = Array2::<u32>::zeros((rows, cols + 1));
    for (y, row) in input.rows().into_iter().enumerate() {
        let mut acc = 0;
        for (x, &v) in row.iter().enumerate() {
            acc += u32::from(v != 0);
            prefix[[y, x + 1]] = acc;
        }
    }

    let mut result = match combine {
        Combine::Any => Array2::<u8>::zeros((rows, cols)),
        Combine::All => Array2::<u8>::ones((rows, cols)),
    };
    let mut windows: HashMap<(isize, isize), Array2<u8>> = HashMap::new();

    for &(dy, first, last) in runs {
        let window = windows
            .entry((first, last))
            .or_insert_with(|| row_window(&prefix, first, last, combine));

        let (src_r, dst_r, h) = shift_range(-dy, rows);
        if h == 0 {
            continue;
        }
        let dst = result.slice_mut(s![dst_r..dst_r + h, ..]);
        let src = window.slice(s![src_r..src_r + h, ..]);
        match combine {
            Combine::Any => Zip::from(dst).and(src).for_each(|d, &v| *d |= v),
            Combine::All => Zip::from(dst).and(src).for_each(|d, &v| *d &= v),
        }
    }
    result
}

/// Combine each pixel with the in-bounds pixels from `first` to `last`
/// columns away on the same row.
fn row_window(prefix: &Array2<u32>, first: isize, last: isize, combine: Combine) -> Array2<u8> {
    let rows = prefix.nrows();
    let cols = prefix.ncols() - 1;
    let bound = |x: isize| x.clamp(0, cols as isize) as usize;

    Array2::from_shape_fn((rows, cols), |(y, x)| {
        let lo = bound(x as isize + first);
        let hi = bound(x as isize + last + 1);
        let len = hi.saturating_sub(lo);
        let count = if len == 0 {
            0
        } else {
            (prefix[[y, hi]] - prefix[[y, lo]]) as usize
        };
        match combine {
            Combine::Any => u8::from(count > 0),
            Combine::All => u8::from(count == len),
        }
    })
}

/// Source start, destination start and length of a shift by `offset`.
#[inline]
fn shift_range(offset: isize, size: usize) -> (usize, usize, usize) {
    if offset.unsigned_abs() >= size {
        return (0, 0, 0);
    }
    let n = size as isize;
    if offset >= 0 {
        (0, offset as usize, (n - offset) as usize)
    } else {
        ((-offset) as usize, 0, (n + offset) as usize)
    }
}
