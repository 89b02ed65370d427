// Copyright (c) 2026, the hevla contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Multi-resolution pyramid construction.
//!
//! Each coarse layer halves the one above it with a 7-tap Lanczos-like
//! decimation filter. Coarse layers are stored with replicate padding so the
//! filter and the intra reference fetches never special-case the picture
//! boundary.

use v_frame::plane::Plane;

use crate::config::{AnalysisConfig, MAX_CTB_SIZE, NUM_LAYERS};
use crate::kernels::KernelTable;

/// Q8 7-tap decimation filter. The taps sum to 256 so flat areas pass
/// through unchanged.
const SCALE_TAPS: [i32; 7] = [-18, 0, 80, 132, 80, 0, -18];
const SCALE_TAP_Q: i32 = 8;

/// Replicate padding carried on the left/top of every layer.
const LAYER_PAD: usize = 16;
/// Extra right/bottom padding so a full 16-aligned processing region plus
/// filter context always exists.
const LAYER_PAD_TRAIL: usize = LAYER_PAD + 4;

const fn ceil16(x: usize) -> usize {
  (x + 15) & !15
}

const fn ceil8(x: usize) -> usize {
  (x + 7) & !7
}

/// One padded 8-bit surface of the pyramid.
///
/// `width`/`height` are the processing dimensions every pass iterates over;
/// `valid_w`/`valid_h` bound the real picture content inside them. Samples
/// between the two, and the surrounding padding, replicate the content edge.
pub struct LayerPlane {
  data: Vec<u8>,
  pub stride: usize,
  pub width: usize,
  pub height: usize,
  pub valid_w: usize,
  pub valid_h: usize,
  pub pad_left: usize,
  pub pad_top: usize,
}

impl LayerPlane {
  pub fn new(
    width: usize, height: usize, valid_w: usize, valid_h: usize,
    pad_left: usize, pad_top: usize, pad_right: usize, pad_bottom: usize,
  ) -> Self {
    debug_assert!(valid_w <= width && valid_h <= height);
    let stride = pad_left + width + pad_right;
    let rows = pad_top + height + pad_bottom;
    LayerPlane {
      data: vec![0; stride * rows],
      stride,
      width,
      height,
      valid_w,
      valid_h,
      pad_left,
      pad_top,
    }
  }

  /// Index of sample `(x, y)` in layer coordinates into [`Self::data`].
  #[inline]
  pub fn idx(&self, x: usize, y: usize) -> usize {
    (y + self.pad_top) * self.stride + self.pad_left + x
  }

  #[inline]
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  #[inline]
  pub fn p(&self, x: usize, y: usize) -> u8 {
    self.data[self.idx(x, y)]
  }

  #[inline]
  pub fn row(&self, y: usize) -> &[u8] {
    let base = self.idx(0, y);
    &self.data[base..base + self.width]
  }

  /// Copies decimated content into row `y` starting at column 0.
  pub fn write_row(&mut self, y: usize, src: &[u8]) {
    debug_assert!(src.len() <= self.width);
    let base = self.idx(0, y);
    self.data[base..base + src.len()].copy_from_slice(src);
  }

  /// Replicates the valid content into the processing remainder and the
  /// padding ring. Runs once per layer after all its rows are written.
  pub fn pad_boundary(&mut self) {
    for y in 0..self.valid_h {
      let base = self.idx(0, y);
      let left = self.data[base];
      let right = self.data[base + self.valid_w - 1];
      self.data[base - self.pad_left..base].fill(left);
      let row_end = (y + self.pad_top + 1) * self.stride;
      self.data[base + self.valid_w..row_end].fill(right);
    }
    // whole padded rows above and below
    let top = self.pad_top * self.stride;
    for y in 0..self.pad_top {
      self.data.copy_within(top..top + self.stride, y * self.stride);
    }
    let bottom = (self.pad_top + self.valid_h - 1) * self.stride;
    let rows = self.data.len() / self.stride;
    for y in self.pad_top + self.valid_h..rows {
      self.data.copy_within(bottom..bottom + self.stride, y * self.stride);
    }
  }
}

/// Decimates one tile by 2 in both directions. `origin` indexes the tile's
/// top-left sample in `src`; three samples of context must be readable on
/// every side. Writes `wd/2 x ht/2` output samples.
pub(crate) fn scale_filter_tile(
  src: &[u8], src_stride: usize, origin: usize, dst: &mut [u8],
  dst_stride: usize, wd: usize, ht: usize,
) {
  debug_assert!(wd % 2 == 0 && ht % 2 == 0);
  debug_assert!(wd <= MAX_CTB_SIZE && ht <= MAX_CTB_SIZE);
  debug_assert!(origin >= 3 * src_stride + 3);

  let half_wd = wd >> 1;
  let scratch_rows = ht + 5;
  let mut scratch = [0u8; (MAX_CTB_SIZE / 2) * (MAX_CTB_SIZE + 5)];

  // horizontal pass over the rows the vertical pass will read
  for si in 0..scratch_rows {
    // scratch row si holds source row si - 3
    let row = origin - 3 * src_stride + si * src_stride;
    for j in (0..wd).step_by(2) {
      let p = row + j;
      let tmp = SCALE_TAPS[3] * i32::from(src[p])
        + SCALE_TAPS[2] * (i32::from(src[p - 1]) + i32::from(src[p + 1]))
        + SCALE_TAPS[1] * (i32::from(src[p - 2]) + i32::from(src[p + 2]))
        + SCALE_TAPS[0] * (i32::from(src[p - 3]) + i32::from(src[p + 3]));
      scratch[si * half_wd + (j >> 1)] =
        ((tmp + (1 << (SCALE_TAP_Q - 1))) >> SCALE_TAP_Q).clamp(0, 255) as u8;
    }
  }

  // vertical pass
  for i in (0..ht).step_by(2) {
    let c = (3 + i) * half_wd;
    for j in 0..half_wd {
      let tmp = SCALE_TAPS[3] * i32::from(scratch[c + j])
        + SCALE_TAPS[2]
          * (i32::from(scratch[c + j - half_wd])
            + i32::from(scratch[c + j + half_wd]))
        + SCALE_TAPS[1]
          * (i32::from(scratch[c + j - 2 * half_wd])
            + i32::from(scratch[c + j + 2 * half_wd]))
        + SCALE_TAPS[0]
          * (i32::from(scratch[c + j - 3 * half_wd])
            + i32::from(scratch[c + j + 3 * half_wd]));
      dst[(i >> 1) * dst_stride + j] =
        ((tmp + (1 << (SCALE_TAP_Q - 1))) >> SCALE_TAP_Q).clamp(0, 255) as u8;
    }
  }
}

/// Decimates one block row of `src` into `out`, a buffer of
/// `block_ht / 2` rows with stride `src.width / 2`. Workers call this on
/// shared immutable layers and hand the buffer to the collector.
pub(crate) fn scale_block_row(
  src: &LayerPlane, ht_offset: usize, block_ht: usize, k: &KernelTable,
  out: &mut [u8],
) {
  let out_stride = src.width >> 1;
  let bh = block_ht.min(src.height - ht_offset);
  for wd_offset in (0..src.width).step_by(MAX_CTB_SIZE) {
    let bw = MAX_CTB_SIZE.min(src.width - wd_offset);
    (k.scale_tile)(
      src.data(),
      src.stride,
      src.idx(wd_offset, ht_offset),
      &mut out[wd_offset >> 1..],
      out_stride,
      bw,
      bh,
    );
  }
}

/// The full decomposition pyramid: layer 0 is the (aligned) input picture,
/// each following layer is half the size of the previous one.
pub struct Pyramid {
  pub layers: Vec<LayerPlane>,
}

impl Pyramid {
  pub fn new(cfg: &AnalysisConfig) -> Self {
    // the input layer aligns to the minimum CU size, coarse layers to 16
    let mut w = ceil8(cfg.width);
    let mut h = ceil8(cfg.height);
    let mut layers = Vec::with_capacity(NUM_LAYERS);
    layers.push(LayerPlane::new(
      w, h, w, h, LAYER_PAD, LAYER_PAD, LAYER_PAD_TRAIL, LAYER_PAD_TRAIL,
    ));
    for _ in 1..NUM_LAYERS {
      let (vw, vh) = (w >> 1, h >> 1);
      w = ceil16(vw);
      h = ceil16(vh);
      layers.push(LayerPlane::new(
        w, h, vw, vh, LAYER_PAD, LAYER_PAD, LAYER_PAD_TRAIL, LAYER_PAD_TRAIL,
      ));
    }
    log::debug!(
      "pyramid layers: {:?}",
      layers.iter().map(|l| (l.width, l.height)).collect::<Vec<_>>()
    );
    Pyramid { layers }
  }

  /// Number of 8x8 processing blocks per row/column of a coarse layer.
  pub fn layer_block_size(layer: usize) -> usize {
    MAX_CTB_SIZE >> layer
  }

  /// Copies a picture into layer 0, replicating the last row/column into
  /// the alignment remainder and the padding ring.
  pub fn load_frame(&mut self, src: &Plane<u8>, width: usize, height: usize) {
    let l0 = &mut self.layers[0];
    debug_assert!(width <= l0.width && height <= l0.height);
    let stride = src.cfg.stride;
    let data = src.data_origin();
    for y in 0..height.min(src.cfg.height) {
      let base = l0.idx(0, y);
      let row = &data[y * stride..y * stride + width.min(src.cfg.width)];
      l0.data[base..base + row.len()].copy_from_slice(row);
      // alignment remainder replicates the last sample
      let last = row[row.len() - 1];
      l0.data[base + row.len()..base + l0.width].fill(last);
    }
    // alignment rows replicate the last content row
    for y in height.min(src.cfg.height)..l0.height {
      let from = l0.idx(0, y - 1);
      let to = l0.idx(0, y);
      l0.data.copy_within(from..from + l0.width, to);
    }
    l0.pad_boundary();
  }
}

#[cfg(test)]
pub mod test {
  use super::*;

  fn ramp_layer(w: usize, h: usize) -> LayerPlane {
    let mut l =
      LayerPlane::new(w, h, w, h, LAYER_PAD, LAYER_PAD, LAYER_PAD_TRAIL,
        LAYER_PAD_TRAIL);
    for y in 0..h {
      let base = l.idx(0, y);
      for x in 0..w {
        l.data[base + x] = x as u8;
      }
    }
    l.pad_boundary();
    l
  }

  #[test]
  fn flat_input_decimates_flat() {
    let mut l = LayerPlane::new(64, 64, 64, 64, 16, 16, 20, 20);
    l.data.fill(111);
    let mut out = vec![0u8; 32 * 32];
    scale_filter_tile(l.data(), l.stride, l.idx(0, 0), &mut out, 32, 64, 64);
    assert!(out.iter().all(|&p| p == 111));
  }

  #[test]
  fn horizontal_ramp_decimates_to_even_samples() {
    // a linear ramp is invariant under the filter: output col j is 2j
    let l = ramp_layer(64, 64);
    let mut out = vec![0u8; 32 * 32];
    scale_filter_tile(l.data(), l.stride, l.idx(0, 0), &mut out, 32, 64, 64);
    for y in 0..32 {
      // boundary replication bends the first and last columns, skip them
      for x in 2..30 {
        assert_eq!(out[y * 32 + x], 2 * x as u8, "col {}", x);
      }
    }
  }

  #[test]
  fn scale_block_row_covers_the_full_width() {
    let l = ramp_layer(128, 64);
    let mut out = vec![0u8; 32 * 64];
    scale_block_row(&l, 0, 64, &KernelTable::detect(), &mut out);
    for x in 2..62 {
      assert_eq!(out[x], 2 * x as u8);
    }
  }

  #[test]
  fn pyramid_dimensions_align_to_sixteen() {
    let cfg =
      AnalysisConfig { width: 640, height: 480, ..Default::default() };
    let p = Pyramid::new(&cfg);
    assert_eq!((p.layers[0].width, p.layers[0].height), (640, 480));
    assert_eq!((p.layers[1].width, p.layers[1].height), (320, 240));
    assert_eq!((p.layers[1].valid_w, p.layers[1].valid_h), (320, 240));
    // 120 rounds up to the next multiple of 16
    assert_eq!((p.layers[2].width, p.layers[2].height), (160, 128));
    assert_eq!((p.layers[2].valid_w, p.layers[2].valid_h), (160, 120));
  }

  #[test]
  fn pad_boundary_replicates_edges() {
    let l = ramp_layer(32, 16);
    // left pad mirrors column 0, right pad mirrors the last column
    assert_eq!(l.data[l.idx(0, 4) - 3], 0);
    assert_eq!(l.data[l.idx(31, 4) + 5], 31);
    // rows above and below replicate the content edge rows
    assert_eq!(l.data[l.idx(7, 0) - 2 * l.stride], 7);
    assert_eq!(l.data[l.idx(7, 15) + 3 * l.stride], 7);
  }
}
