// Copyright (c) 2026, the hevla contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! HEVC luma intra prediction for the analysis passes.
//!
//! Reference samples for an NxN block live in a flat array of `4N + 1`
//! samples: the left column bottom-to-top in `[0, 2N)`, the top-left corner
//! at `2N`, and the top row left-to-right in `(2N, 4N]`.

/// Planar mode.
pub const MODE_PLANAR: u8 = 0;
/// DC mode.
pub const MODE_DC: u8 = 1;
/// Pure horizontal angular mode.
pub const MODE_HOR: u8 = 10;
/// Pure vertical angular mode.
pub const MODE_VER: u8 = 26;
/// Marker for "no mode" in output candidate lists.
pub const MODE_INVALID: u8 = 255;
/// Total number of intra modes.
pub const NUM_MODES: usize = 35;

/// Fill value when no neighbor sample is available, half the 8-bit range.
const DEFAULT_SAMPLE: u8 = 128;

/// Largest transform the analysis predicts.
const MAX_TRANS_SIZE: usize = 64;

/// Reference array length for the largest transform.
pub const MAX_REF_SAMPLES: usize = 4 * MAX_TRANS_SIZE + 1;

/// Prediction displacement per row for modes 2..=34.
#[rustfmt::skip]
const ANG_TABLE: [i32; 33] = [
   32,  26,  21,  17,  13,   9,   5,   2,   0,
   -2,  -5,  -9, -13, -17, -21, -26, -32, -26,
  -21, -17, -13,  -9,  -5,  -2,   0,   2,   5,
    9,  13,  17,  21,  26,  32,
];

/// 8192 / |angle| for the negative-angle modes, used to project main
/// reference extensions onto the side reference.
const fn inv_angle(ang: i32) -> i32 {
  match ang {
    -2 => 4096,
    -5 => 1638,
    -9 => 910,
    -13 => 630,
    -17 => 482,
    -21 => 390,
    -26 => 315,
    -32 => 256,
    _ => 0,
  }
}

/// Causal neighbor availability for one block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NbrAvail {
  pub left: bool,
  pub top: bool,
  pub top_left: bool,
  pub top_right: bool,
  pub bottom_left: bool,
}

impl NbrAvail {
  pub fn all() -> Self {
    NbrAvail {
      left: true,
      top: true,
      top_left: true,
      top_right: true,
      bottom_left: true,
    }
  }

  fn any(self) -> bool {
    self.left || self.top || self.top_left || self.top_right
      || self.bottom_left
  }
}

/// Builds the reference sample array for the block at `(x, y)` in a surface
/// of stride `stride`, substituting unavailable segments by the standard
/// scan-and-replicate rule. `(x, y)` index the slice directly; callers
/// guarantee that every sample an available flag points at is in bounds.
pub fn ref_substitution(
  src: &[u8], stride: usize, x: usize, y: usize, nt: usize, avail: NbrAvail,
  refs: &mut [u8],
) {
  debug_assert!(refs.len() >= 4 * nt + 1);

  if !avail.any() {
    refs[..4 * nt + 1].fill(DEFAULT_SAMPLE);
    return;
  }

  let mut have = [false; MAX_REF_SAMPLES];

  // left column, bottom to top: refs[i] = src(x - 1, y + 2nt - 1 - i)
  if avail.bottom_left {
    for i in 0..nt {
      refs[i] = src[(y + 2 * nt - 1 - i) * stride + x - 1];
      have[i] = true;
    }
  }
  if avail.left {
    for i in nt..2 * nt {
      refs[i] = src[(y + 2 * nt - 1 - i) * stride + x - 1];
      have[i] = true;
    }
  }
  if avail.top_left {
    refs[2 * nt] = src[(y - 1) * stride + x - 1];
    have[2 * nt] = true;
  }
  if avail.top {
    for j in 0..nt {
      refs[2 * nt + 1 + j] = src[(y - 1) * stride + x + j];
      have[2 * nt + 1 + j] = true;
    }
  }
  if avail.top_right {
    for j in nt..2 * nt {
      refs[2 * nt + 1 + j] = src[(y - 1) * stride + x + j];
      have[2 * nt + 1 + j] = true;
    }
  }

  // substitute: seed index 0 from the first available sample, then
  // propagate forward
  if !have[0] {
    if let Some(first) = (0..=4 * nt).find(|&i| have[i]) {
      refs[0] = refs[first];
      have[0] = true;
    }
  }
  for i in 1..=4 * nt {
    if !have[i] {
      refs[i] = refs[i - 1];
    }
  }
}

/// The standard smoothing filter applied to the reference array before
/// prediction for selected modes and sizes.
pub fn ref_filtering(refs: &[u8], nt: usize, out: &mut [u8]) {
  let n = 4 * nt;
  out[0] = refs[0];
  out[n] = refs[n];
  for i in 1..n {
    out[i] = ((u32::from(refs[i - 1])
      + 2 * u32::from(refs[i])
      + u32::from(refs[i + 1])
      + 2)
      >> 2) as u8;
  }
}

/// Whether a mode predicts from the filtered reference array at a given
/// transform size.
pub fn use_filtered_refs(mode: u8, nt: usize) -> bool {
  if nt == 4 || mode == MODE_DC {
    return false;
  }
  if mode == MODE_PLANAR {
    return nt >= 8;
  }
  let m = i32::from(mode);
  let dist =
    (m - i32::from(MODE_HOR)).abs().min((m - i32::from(MODE_VER)).abs());
  let thresh = match nt {
    8 => 7,
    16 => 1,
    _ => 0,
  };
  dist > thresh
}

#[inline]
fn left_at(refs: &[u8], nt: usize, i: usize) -> u8 {
  // left column indexed top to bottom
  refs[2 * nt - 1 - i]
}

#[inline]
fn top_at(refs: &[u8], nt: usize, i: usize) -> u8 {
  refs[2 * nt + 1 + i]
}

fn predict_planar(refs: &[u8], nt: usize, dst: &mut [u8]) {
  let shift = nt.trailing_zeros() + 1;
  let top_right = u32::from(top_at(refs, nt, nt));
  let bottom_left = u32::from(left_at(refs, nt, nt));
  for y in 0..nt {
    let left = u32::from(left_at(refs, nt, y));
    for x in 0..nt {
      let top = u32::from(top_at(refs, nt, x));
      let v = (nt as u32 - 1 - x as u32) * left
        + (x as u32 + 1) * top_right
        + (nt as u32 - 1 - y as u32) * top
        + (y as u32 + 1) * bottom_left
        + nt as u32;
      dst[y * nt + x] = (v >> shift) as u8;
    }
  }
}

fn predict_dc(refs: &[u8], nt: usize, dst: &mut [u8]) {
  let shift = nt.trailing_zeros() + 1;
  let mut acc = nt as u32;
  for i in 0..nt {
    acc += u32::from(left_at(refs, nt, i)) + u32::from(top_at(refs, nt, i));
  }
  let dc = (acc >> shift) as u8;
  dst[..nt * nt].fill(dc);

  // boundary smoothing on the first row and column for small transforms
  if nt < 32 {
    let dc = u32::from(dc);
    dst[0] = ((u32::from(left_at(refs, nt, 0))
      + 2 * dc
      + u32::from(top_at(refs, nt, 0))
      + 2)
      >> 2) as u8;
    for x in 1..nt {
      dst[x] = ((u32::from(top_at(refs, nt, x)) + 3 * dc + 2) >> 2) as u8;
    }
    for y in 1..nt {
      dst[y * nt] =
        ((u32::from(left_at(refs, nt, y)) + 3 * dc + 2) >> 2) as u8;
    }
  }
}

fn predict_angular(mode: u8, refs: &[u8], nt: usize, dst: &mut [u8]) {
  let ang = ANG_TABLE[usize::from(mode) - 2];
  let vertical = mode >= 18;

  // main reference with room for the negative extension
  let mut buf = [0u8; 3 * MAX_TRANS_SIZE + 1];
  let off = nt as i32;

  let main_at = |i: usize| {
    if vertical {
      top_at(refs, nt, i)
    } else {
      left_at(refs, nt, i)
    }
  };
  let side_at = |i: usize| {
    if vertical {
      left_at(refs, nt, i)
    } else {
      top_at(refs, nt, i)
    }
  };

  buf[off as usize] = refs[2 * nt];
  for i in 0..2 * nt {
    buf[off as usize + 1 + i] = main_at(i);
  }
  if ang < 0 {
    let last = (nt as i32 * ang) >> 5;
    let inv = inv_angle(ang);
    let mut acc = 128i32;
    let mut x = -1i32;
    while x >= last {
      acc += inv;
      let idx = (acc >> 8) - 1;
      buf[(off + x) as usize] =
        side_at(idx.clamp(0, 2 * nt as i32 - 1) as usize);
      x -= 1;
    }
  }

  for y in 0..nt {
    let pos = (y as i32 + 1) * ang;
    let idx = pos >> 5;
    let fact = pos & 31;
    for x in 0..nt {
      let i = (off + x as i32 + idx + 1) as usize;
      let v = if fact == 0 {
        buf[i]
      } else {
        (((32 - fact) * i32::from(buf[i])
          + fact * i32::from(buf[i + 1])
          + 16)
          >> 5) as u8
      };
      if vertical {
        dst[y * nt + x] = v;
      } else {
        dst[x * nt + y] = v;
      }
    }
  }

  // edge smoothing for the pure horizontal and vertical modes
  if nt < 32 && (mode == MODE_VER || mode == MODE_HOR) {
    let corner = i32::from(refs[2 * nt]);
    if mode == MODE_VER {
      let base = i32::from(top_at(refs, nt, 0));
      for y in 0..nt {
        let d = (i32::from(left_at(refs, nt, y)) - corner) >> 1;
        dst[y * nt] = (base + d).clamp(0, 255) as u8;
      }
    } else {
      let base = i32::from(left_at(refs, nt, 0));
      for x in 0..nt {
        let d = (i32::from(top_at(refs, nt, x)) - corner) >> 1;
        dst[x] = (base + d).clamp(0, 255) as u8;
      }
    }
  }
}

/// Predicts an NxN block into `dst` (stride `nt`) from prepared reference
/// samples.
pub fn predict_intra(mode: u8, refs: &[u8], nt: usize, dst: &mut [u8]) {
  debug_assert!(usize::from(mode) < NUM_MODES);
  debug_assert!(refs.len() >= 4 * nt + 1);
  debug_assert!(dst.len() >= nt * nt);
  match mode {
    MODE_PLANAR => predict_planar(refs, nt, dst),
    MODE_DC => predict_dc(refs, nt, dst),
    _ => predict_angular(mode, refs, nt, dst),
  }
}
