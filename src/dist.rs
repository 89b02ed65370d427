// Copyright (c) 2026, the hevla contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Block cost kernels over raw 8-bit sample slices.
//!
//! `org` points at the top-left sample of the block inside a larger surface
//! with stride `org_stride`; `pred` likewise. All block sizes are square
//! powers of two in 4..=64.

/// Sum of absolute differences.
pub fn get_sad(
  org: &[u8], org_stride: usize, pred: &[u8], pred_stride: usize, size: usize,
) -> u32 {
  let mut sum = 0u32;

  for y in 0..size {
    let row_org = &org[y * org_stride..y * org_stride + size];
    let row_pred = &pred[y * pred_stride..y * pred_stride + size];
    sum += row_org
      .iter()
      .zip(row_pred)
      .map(|(&a, &b)| (i32::from(a) - i32::from(b)).unsigned_abs())
      .sum::<u32>();
  }

  sum
}

#[inline(always)]
fn butterfly(a: i32, b: i32) -> (i32, i32) {
  ((a + b), (a - b))
}

#[inline(always)]
#[allow(clippy::identity_op, clippy::erasing_op)]
fn hadamard4_1d(data: &mut [i32], n: usize, stride0: usize, stride1: usize) {
  for i in 0..n {
    let sub: &mut [i32] = &mut data[i * stride0..];
    let (a0, a1) = butterfly(sub[0 * stride1], sub[1 * stride1]);
    let (a2, a3) = butterfly(sub[2 * stride1], sub[3 * stride1]);
    let (b0, b2) = butterfly(a0, a2);
    let (b1, b3) = butterfly(a1, a3);
    sub[0 * stride1] = b0;
    sub[1 * stride1] = b1;
    sub[2 * stride1] = b2;
    sub[3 * stride1] = b3;
  }
}

#[inline(always)]
#[allow(clippy::identity_op, clippy::erasing_op)]
fn hadamard8_1d(data: &mut [i32], n: usize, stride0: usize, stride1: usize) {
  for i in 0..n {
    let sub: &mut [i32] = &mut data[i * stride0..];

    let (a0, a1) = butterfly(sub[0 * stride1], sub[1 * stride1]);
    let (a2, a3) = butterfly(sub[2 * stride1], sub[3 * stride1]);
    let (a4, a5) = butterfly(sub[4 * stride1], sub[5 * stride1]);
    let (a6, a7) = butterfly(sub[6 * stride1], sub[7 * stride1]);

    let (b0, b2) = butterfly(a0, a2);
    let (b1, b3) = butterfly(a1, a3);
    let (b4, b6) = butterfly(a4, a6);
    let (b5, b7) = butterfly(a5, a7);

    let (c0, c4) = butterfly(b0, b4);
    let (c1, c5) = butterfly(b1, b5);
    let (c2, c6) = butterfly(b2, b6);
    let (c3, c7) = butterfly(b3, b7);

    sub[0 * stride1] = c0;
    sub[1 * stride1] = c1;
    sub[2 * stride1] = c2;
    sub[3 * stride1] = c3;
    sub[4 * stride1] = c4;
    sub[5 * stride1] = c5;
    sub[6 * stride1] = c6;
    sub[7 * stride1] = c7;
  }
}

#[inline(always)]
fn hadamard2d(data: &mut [i32], n: usize) {
  let func = if n == 4 { hadamard4_1d } else { hadamard8_1d };
  /* Vertical transform. */
  func(data, n, 1, n);
  /* Horizontal transform. */
  func(data, n, n, 1);
}

/// Sum of absolute transformed differences.
///
/// Uses a 4x4 Hadamard transform for 4x4 blocks and tiles everything larger
/// with 8x8 transforms, normalizing each transform by its size. This is the
/// construction the larger Hadamard cost kernels bottom out in.
pub fn get_satd(
  org: &[u8], org_stride: usize, pred: &[u8], pred_stride: usize, size: usize,
) -> u32 {
  debug_assert!(size.is_power_of_two() && (4..=64).contains(&size));
  let tx = size.min(8);

  let mut sum = 0u64;

  for chunk_y in (0..size).step_by(tx) {
    for chunk_x in (0..size).step_by(tx) {
      let buf: &mut [i32] = &mut [0; 8 * 8][..tx * tx];

      for y in 0..tx {
        let o = (chunk_y + y) * org_stride + chunk_x;
        let p = (chunk_y + y) * pred_stride + chunk_x;
        for x in 0..tx {
          buf[y * tx + x] = i32::from(org[o + x]) - i32::from(pred[p + x]);
        }
      }

      hadamard2d(buf, tx);

      let tile: u64 = buf.iter().map(|a| a.unsigned_abs() as u64).sum();
      // Normalize per transform so tiled sizes stay comparable
      let ln = tx.trailing_zeros();
      sum += (tile + (1 << ln >> 1)) >> ln;
    }
  }

  sum as u32
}

#[cfg(test)]
pub mod test {
  use super::*;

  // Two surfaces with different strides; org holds a vertical ramp of 2
  // per row, pred is flat zero, so the block difference is exactly 2 * row.
  fn setup_surfaces() -> (Vec<u8>, usize, Vec<u8>, usize) {
    let (w, h) = (128, 96);
    let (org_stride, pred_stride) = (w + 16, w + 48);

    let mut org = vec![0u8; org_stride * h];
    let pred = vec![0u8; pred_stride * h];

    for i in 0..h {
      for j in 0..w {
        org[i * org_stride + j] = (2 * i) as u8;
      }
    }

    (org, org_stride, pred, pred_stride)
  }

  // Regression and validation test for SAD computation
  #[test]
  fn get_sad_same() {
    // sum of 2*i over the block is size^2 * (size - 1)
    let blocks: &[(usize, u32)] =
      &[(4, 48), (8, 448), (16, 3840), (32, 31744), (64, 258048)];

    let (org, org_stride, pred, pred_stride) = setup_surfaces();

    for &(size, expected) in blocks {
      assert_eq!(expected, get_sad(&org, org_stride, &pred, pred_stride, size));
    }
  }

  #[test]
  fn get_sad_zero_on_identical_blocks() {
    let (org, org_stride, ..) = setup_surfaces();
    let o = &org[8 * org_stride + 8..];
    assert_eq!(0, get_sad(o, org_stride, o, org_stride, 64));
  }

  #[test]
  fn get_satd_zero_on_identical_blocks() {
    let (org, org_stride, ..) = setup_surfaces();
    let o = &org[16 * org_stride + 4..];
    for size in [4, 8, 16, 32, 64] {
      assert_eq!(0, get_satd(o, org_stride, o, org_stride, size));
    }
  }

  // A constant difference only hits the DC coefficient: |d| * n^2 for an
  // n-point 2-D Hadamard, normalized by n.
  #[test]
  fn get_satd_dc_only_difference() {
    let org = vec![130u8; 64 * 64];
    let pred = vec![120u8; 64 * 64];
    assert_eq!(10 * 4, get_satd(&org, 64, &pred, 64, 4));
    assert_eq!(10 * 8, get_satd(&org, 64, &pred, 64, 8));
    // 16x16 tiles four 8x8 transforms
    assert_eq!(10 * 8 * 4, get_satd(&org, 64, &pred, 64, 16));
    assert_eq!(10 * 8 * 64, get_satd(&org, 64, &pred, 64, 64));
  }

  // Tiling invariant of the construction: any size above 8 is exactly the
  // sum of its 8x8 transform tiles.
  #[test]
  fn get_satd_tiles_the_8x8_transform() {
    use rand::{Rng, SeedableRng};
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0x5eed);
    let org: Vec<u8> = (0..32 * 32).map(|_| rng.gen()).collect();
    let pred: Vec<u8> = (0..32 * 32).map(|_| rng.gen()).collect();

    let whole = get_satd(&org, 32, &pred, 32, 16);
    let mut tiles = 0;
    for cy in (0..16).step_by(8) {
      for cx in (0..16).step_by(8) {
        let o = cy * 32 + cx;
        tiles += get_satd(&org[o..], 32, &pred[o..], 32, 8);
      }
    }
    assert_eq!(whole, tiles);
  }

  // Regression vectors for the vertical ramp, derived by hand from the
  // unnormalized Hadamard of a linear sequence (sum of |coeffs| is 56 for
  // an 8-point ramp of step 1; each 8x8 tile at row offset r adds a DC term
  // of 128 * r).
  #[test]
  fn get_satd_same() {
    let blocks: &[(usize, u32)] =
      &[(4, 24), (8, 112), (16, 704), (32, 4864), (64, 35840)];

    let (org, org_stride, pred, pred_stride) = setup_surfaces();

    for &(size, expected) in blocks {
      assert_eq!(
        expected,
        get_satd(&org, org_stride, &pred, pred_stride, size)
      );
    }
  }
}
