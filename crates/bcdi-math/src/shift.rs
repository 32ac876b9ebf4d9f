//! Circular shifts and centre-of-mass helpers on 3D voxel grids.
//!
//! `roll` follows numpy: `roll(a, s)[(i + s) mod n] = a[i]`.

use ndarray::Array3;

/// Reduce a signed shift onto `[0, n)`.
#[inline]
fn wrap(shift: isize, n: usize) -> usize {
    shift.rem_euclid(n as isize) as usize
}

/// Circularly shift `src` into `dst` (same shape).
pub fn roll_into<T: Clone>(src: &Array3<T>, dst: &mut Array3<T>, shift: [isize; 3]) {
    let (nx, ny, nz) = src.dim();
    let (sx, sy, sz) = (wrap(shift[0], nx), wrap(shift[1], ny), wrap(shift[2], nz));
    for ((i, j, k), v) in src.indexed_iter() {
        dst[[(i + sx) % nx, (j + sy) % ny, (k + sz) % nz]] = v.clone();
    }
}

/// Circularly shifted copy of `src`.
pub fn roll<T: Clone>(src: &Array3<T>, shift: [isize; 3]) -> Array3<T> {
    let mut dst = src.clone();
    roll_into(src, &mut dst, shift);
    dst
}

/// In-place circular shift, using `scratch` as the staging buffer.
pub fn roll_inplace<T: Clone>(data: &mut Array3<T>, scratch: &mut Array3<T>, shift: [isize; 3]) {
    if shift.iter().all(|&s| s == 0) {
        return;
    }
    roll_into(data, scratch, shift);
    data.assign(scratch);
}

/// Shift that moves the zero-frequency voxel to the centre. `numpy.fft.fftshift`.
pub fn fftshift_amount(shape: &[usize]) -> [isize; 3] {
    [
        (shape[0] / 2) as isize,
        (shape[1] / 2) as isize,
        (shape[2] / 2) as isize,
    ]
}

pub fn fftshift<T: Clone>(src: &Array3<T>) -> Array3<T> {
    roll(src, fftshift_amount(src.shape()))
}

pub fn ifftshift<T: Clone>(src: &Array3<T>) -> Array3<T> {
    let s = fftshift_amount(src.shape());
    roll(src, [-s[0], -s[1], -s[2]])
}

/// Weighted centre of mass in voxel-index coordinates.
///
/// Returns `None` when the total weight is zero or not finite.
pub fn center_of_mass(weights: &Array3<f64>) -> Option<[f64; 3]> {
    let mut total = 0.0;
    let mut moment = [0.0; 3];
    for ((i, j, k), &w) in weights.indexed_iter() {
        total += w;
        moment[0] += w * i as f64;
        moment[1] += w * j as f64;
        moment[2] += w * k as f64;
    }
    if total == 0.0 || !total.is_finite() {
        return None;
    }
    Some([moment[0] / total, moment[1] / total, moment[2] / total])
}

/// Shift that brings a centre of mass onto `target`, rounded per axis.
pub fn shift_to(com: [f64; 3], target: [f64; 3]) -> [isize; 3] {
    [
        (target[0] - com[0]).round() as isize,
        (target[1] - com[1]).round() as isize,
        (target[2] - com[2]).round() as isize,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll_matches_numpy_convention() {
        let a = Array3::from_shape_fn((4, 1, 1), |(i, _, _)| i as i32);
        let r = roll(&a, [1, 0, 0]);
        assert_eq!(r.iter().copied().collect::<Vec<_>>(), vec![3, 0, 1, 2]);
        let r = roll(&a, [-1, 0, 0]);
        assert_eq!(r.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_roll_large_shift_wraps() {
        let a = Array3::from_shape_fn((3, 2, 5), |(i, j, k)| i * 100 + j * 10 + k);
        assert_eq!(roll(&a, [7, -4, 11]), roll(&a, [1, 0, 1]));
    }

    #[test]
    fn test_fftshift_inverse() {
        let a = Array3::from_shape_fn((5, 4, 3), |(i, j, k)| i * 100 + j * 10 + k);
        assert_eq!(ifftshift(&fftshift(&a)), a);
    }

    #[test]
    fn test_fftshift_moves_origin_to_center() {
        let mut a = Array3::from_elem((4, 5, 6), false);
        a[[0, 0, 0]] = true;
        let s = fftshift(&a);
        assert!(s[[2, 2, 3]]);
    }

    #[test]
    fn test_roll_inplace_matches_roll() {
        let a = Array3::from_shape_fn((3, 4, 5), |(i, j, k)| (i + 2 * j + 3 * k) as f64);
        let mut b = a.clone();
        let mut scratch = Array3::zeros((3, 4, 5));
        roll_inplace(&mut b, &mut scratch, [1, -2, 3]);
        assert_eq!(b, roll(&a, [1, -2, 3]));
    }

    #[test]
    fn test_center_of_mass_single_voxel() {
        let mut w = Array3::zeros((5, 5, 5));
        w[[1, 2, 3]] = 2.5;
        assert_eq!(center_of_mass(&w), Some([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_center_of_mass_empty() {
        let w = Array3::zeros((3, 3, 3));
        assert_eq!(center_of_mass(&w), None);
    }

    #[test]
    fn test_shift_to_rounds() {
        assert_eq!(shift_to([1.4, 2.6, 0.0], [4.0, 4.0, 0.0]), [3, 1, 0]);
    }
}
