// Copyright (c) 2026, the hevla contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Kernel capability table.
//!
//! The compute-heavy inner loops (SAD, SATD, the decimation filter) are
//! reached through plain function pointers collected in a [`KernelTable`].
//! The table is built once at analyzer construction and passed by shared
//! reference everywhere, so a platform-specific build can swap in tuned
//! kernels without touching any call site.

use crate::dist;
use crate::pyramid;

/// Block distortion kernel: `(org, org_stride, pred, pred_stride, size)`.
pub type DistFn =
  fn(org: &[u8], org_stride: usize, pred: &[u8], pred_stride: usize, size: usize) -> u32;

/// 2x decimation of one tile inside a bordered scratch surface:
/// `(src, src_stride, origin, dst, dst_stride, wd, ht)`. `origin` indexes the
/// tile's top-left sample; three samples of context must be readable on every
/// side of the tile.
pub type ScaleTileFn = fn(
  src: &[u8],
  src_stride: usize,
  origin: usize,
  dst: &mut [u8],
  dst_stride: usize,
  wd: usize,
  ht: usize,
);

/// The resolved kernel set for this process.
#[derive(Clone, Copy)]
pub struct KernelTable {
  pub sad: DistFn,
  pub satd: DistFn,
  pub scale_tile: ScaleTileFn,
}

impl KernelTable {
  /// Detects the best kernel set for the running CPU. Only the portable
  /// Rust kernels exist today, so detection is trivial.
  pub fn detect() -> Self {
    KernelTable {
      sad: dist::get_sad,
      satd: dist::get_satd,
      scale_tile: pyramid::scale_filter_tile,
    }
  }
}

impl std::fmt::Debug for KernelTable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("KernelTable").finish_non_exhaustive()
  }
}

impl Default for KernelTable {
  fn default() -> Self {
    KernelTable::detect()
  }
}

#[cfg(test)]
pub mod test {
  use super::*;

  #[test]
  fn detected_table_dispatches_to_the_portable_kernels() {
    let k = KernelTable::detect();
    let org = vec![9u8; 16 * 16];
    let pred = vec![5u8; 16 * 16];
    assert_eq!((k.sad)(&org, 16, &pred, 16, 8), 4 * 64);
    assert_eq!((k.satd)(&org, 16, &pred, 16, 8), 4 * 8);
  }
}
