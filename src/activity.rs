// Copyright (c) 2026, the hevla contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Block-activity QP modulation.
//!
//! A block whose SATD activity sits above the frame average can hide more
//! quantization noise, so its quantizer scale is raised; flat blocks get a
//! lower one. The offset is derived in the log2 domain from the squared
//! SATD measure and mapped through a quarter-QP-step factor table.

use crate::config::RcQuantTables;
use crate::early_decision::Measure;

/// Q format of the activity factors.
pub const ACT_FACTOR_SHIFT: u32 = 10;

/// Unity activity factor, returned whenever modulation is bypassed.
pub const ACT_FACTOR_UNITY: i32 = 1 << ACT_FACTOR_SHIFT;

const MIN_QP_MOD_OFFSET: i32 = -10;
const MAX_QP_MOD_OFFSET: i32 = 8;

/// `2^(offset / 6)` in Q10 for offsets -10..=8, one QP step per six entries.
const ACT_FACTOR_BY_OFFSET: [i32; 19] = [
  323, 362, 406, 456, 512, 575, 645, 724, 813, 912, 1024, 1149, 1290, 1448,
  1625, 1825, 2048, 2299, 2580,
];

/// Low-precision `log2` from the float bit pattern, exact on powers of two
/// and within 0.009 everywhere else. The callers only feed it into a coarse
/// QP offset, which tolerates far more error than that.
pub(crate) fn fast_log2(val: f32) -> f32 {
  let x = val.to_bits() as i32;
  let log_2 = (((x >> 23) & 255) - 128) as f32;
  let x = (x & !(255 << 23)) + (127 << 23);
  let mant = f32::from_bits(x as u32);
  log_2 + ((-1.0 / 3.0) * mant + 2.0) * mant - 2.0 / 3.0
}

/// Result of modulating the frame quantizer for one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QpMod {
  pub qp: i32,
  /// Activity factor applied to the frame qscale, Q10.
  pub act_factor: i32,
  /// Modulated quantizer scale, clipped to the rate-control bounds.
  pub qscale: i32,
}

/// Modulates the frame qscale by the activity of one block. `cu_satd` is the
/// accumulated SATD measure of the block at its layer, `frame_log_avg` the
/// frame-wide average of `log2(1 + satd^2)` for the same measure class.
///
/// Blocks without a valid measure, and frames whose average activity rounds
/// to zero, pass the frame qscale through unmodulated.
pub fn cu_level_qp_mod(
  frame_qscale: i32, cu_satd: Measure, frame_log_avg: f64, strength: f32,
  rc: &RcQuantTables,
) -> QpMod {
  let mut act_factor = ACT_FACTOR_UNITY;
  let qscale = match cu_satd.value() {
    Some(satd) if frame_log_avg as i32 != 0 => {
      let sq_satd = satd as f32 * satd as f32;
      let log2_sq_satd = fast_log2(1.0 + sq_satd);
      let qp_offset = (strength * (log2_sq_satd - frame_log_avg as f32)) as i32;
      let qp_offset = qp_offset.clamp(MIN_QP_MOD_OFFSET, MAX_QP_MOD_OFFSET);
      act_factor = ACT_FACTOR_BY_OFFSET
        [(qp_offset - MIN_QP_MOD_OFFSET) as usize];
      let scaled = frame_qscale as i64 * act_factor as i64
        + (1 << (ACT_FACTOR_SHIFT - 1));
      (scaled >> ACT_FACTOR_SHIFT) as i32
    }
    _ => frame_qscale,
  };
  let qscale = qscale.clamp(rc.min_qscale, rc.max_qscale);
  let qp = rc.qscale_to_qp[qscale as usize].clamp(rc.min_qp, rc.max_qp);
  QpMod { qp, act_factor, qscale }
}
