// Copyright (c) 2026, the hevla contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Frame-level activity statistics over the layer-1 early decision.
//!
//! After the coarse layers finish, the per-4x4 SATD measures are floored at
//! an estimated noise level and folded into per-8x8/16x16/32x32 sums and
//! medians. The frame-wide log-domain averages derived here drive the
//! per-block QP modulation of the full-resolution pass.

use crate::activity::fast_log2;
use crate::early_decision::{CtbLevel1Stats, EdAccum, EdBlock, Measure};

/// 4x4 SATD values at or above this never count as noise.
const NOISE_HIST_BINS: usize = 64;

/// Default noise floor when too few blocks fall inside the histogram.
const NOISE_FLOOR_DEFAULT: i32 = 16;

/// Share of the frame's 4x4 blocks averaged for the noise floor, percent.
const NOISE_MIN_BLKS_PCT: i64 = 2;

/// Frame-wide activity averages in the `log2(1 + satd^2)` domain, one entry
/// per measure variant (sum first, then the medians).
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
  pub noise_floor_4x4: i32,
  pub log_avg_8x8: [f64; 2],
  pub log_avg_16x16: [f64; 3],
  pub log_avg_32x32: [f64; 3],
  pub sum_best_satd: i64,
  pub sum_sq_best_satd: i64,
}

/// Median of one sorted set; `vals` is copied and sorted here.
fn set_median(vals: &[i32]) -> i32 {
  let mut buf = [0i32; 64];
  let buf = &mut buf[..vals.len()];
  buf.copy_from_slice(vals);
  buf.sort_unstable();
  buf[vals.len() / 2]
}

struct LogAvgAccum {
  sum_sq: f64,
  blks: i64,
}

impl LogAvgAccum {
  fn new() -> Self {
    LogAvgAccum { sum_sq: 0.0, blks: 0 }
  }

  fn add(&mut self, satd: i32) {
    self.sum_sq += satd as f64 * satd as f64;
    self.blks += 1;
  }

  fn log_avg(&self) -> f64 {
    if self.blks == 0 {
      return 0.0;
    }
    f64::from(fast_log2((1.0 + self.sum_sq / self.blks as f64) as f32))
  }
}

/// Estimates the frame noise floor as the average of the lowest roughly one
/// percent of 4x4 SATDs, bounded by the histogram range.
fn noise_floor_4x4(blocks: &[EdBlock], min_blks: i64) -> i32 {
  let mut hist = [0i64; NOISE_HIST_BINS];
  for b in blocks {
    if let Some(satd) = b.satd_4x4.value() {
      if (satd as usize) < NOISE_HIST_BINS {
        hist[satd as usize] += 1;
      }
    }
  }
  let mut total = 0i64;
  let mut acc = 0i64;
  for (satd, &n) in hist.iter().enumerate() {
    if total > min_blks {
      break;
    }
    total += n;
    acc += satd as i64 * n;
  }
  if total < min_blks {
    NOISE_FLOOR_DEFAULT
  } else {
    ((acc + (total >> 1)) / total) as i32
  }
}

/// Finalizes the layer-1 measures for one frame.
///
/// `blocks` holds the whole layer-1 frame, CTB by CTB in z-scan order, with
/// one `CtbLevel1Stats` per CTB; `valid_w`/`valid_h` are the layer-1 picture
/// dimensions before block alignment. Floors every 4x4 SATD at the noise
/// estimate, fills the per-CTB sum and median measures, and returns the
/// frame-wide log-domain averages.
pub fn finalize_layer1(
  blocks: &mut [EdBlock], stats: &mut [CtbLevel1Stats], valid_w: usize,
  valid_h: usize, acc: EdAccum,
) -> FrameStats {
  const BLOCKS_PER_CTB: usize = 64;
  debug_assert_eq!(blocks.len(), stats.len() * BLOCKS_PER_CTB);

  let min_blks =
    NOISE_MIN_BLKS_PCT * ((valid_w >> 1) * (valid_h >> 1)) as i64 / 100;
  let floor = noise_floor_4x4(blocks, min_blks);

  let mut acc_8x8 = [LogAvgAccum::new(), LogAvgAccum::new()];
  let mut acc_16x16 =
    [LogAvgAccum::new(), LogAvgAccum::new(), LogAvgAccum::new()];
  let mut acc_32x32 =
    [LogAvgAccum::new(), LogAvgAccum::new(), LogAvgAccum::new()];

  for (ctb, st) in blocks.chunks_mut(BLOCKS_PER_CTB).zip(stats.iter_mut()) {
    let mut satd_4x4 = [-1i32; 64];
    let mut satd_8x8 = [-1i32; 16];
    let mut satd_16x16 = [0i32; 4];
    let mut satd_32x32 = 0i32;
    let mut quad_valid = [true; 4];

    for i in 0..4 {
      for j in 0..4 {
        let mut sum = 0i32;
        let mut valid = 0;
        for k in 0..4 {
          let b = &mut ctb[i * 16 + j * 4 + k];
          if let Some(satd) = b.satd_4x4.value() {
            let satd = satd.max(floor);
            b.satd_4x4 = Measure::Value(satd);
            sum += satd;
            valid += 1;
            satd_4x4[i * 16 + j * 4 + k] = satd;
          }
        }
        debug_assert!(valid == 0 || valid == 4);
        let sum = if valid == 0 { -1 } else { sum };
        satd_8x8[i * 4 + j] = sum;
        satd_16x16[i] += sum;
        satd_32x32 += sum;
        st.sum_4x4_satd[i * 4 + j] =
          if sum < 0 { Measure::Invalid } else { Measure::Value(sum) };
      }
    }

    for i in 0..4 {
      for j in 0..4 {
        let sum = satd_8x8[i * 4 + j];
        let med = set_median(&satd_4x4[i * 16 + j * 4..i * 16 + j * 4 + 4]);
        st.min_4x4_satd[i * 4 + j] = med;
        if sum >= 0 {
          st.satd_8x8[i * 4 + j] = [Measure::Value(sum), Measure::Value(med)];
          acc_8x8[0].add(sum);
          acc_8x8[1].add(med);
        } else {
          st.satd_8x8[i * 4 + j] = [Measure::Invalid; 2];
          quad_valid[i] = false;
        }
      }

      if quad_valid[i] {
        let vals = [
          satd_16x16[i],
          set_median(&satd_8x8[i * 4..i * 4 + 4]),
          set_median(&satd_4x4[i * 16..i * 16 + 16]),
        ];
        st.satd_16x16[i] = vals.map(Measure::Value);
        for (a, v) in acc_16x16.iter_mut().zip(vals) {
          a.add(v);
        }
      } else {
        st.satd_16x16[i] = [Measure::Invalid; 3];
      }
    }

    if quad_valid == [true; 4] {
      let vals = [
        set_median(&satd_16x16),
        set_median(&satd_8x8),
        set_median(&satd_4x4[..64]),
        satd_32x32,
      ];
      st.satd_32x32 = vals.map(Measure::Value);
      for (a, v) in acc_32x32.iter_mut().zip(vals[..3].iter()) {
        a.add(*v);
      }
    } else {
      st.satd_32x32 = [Measure::Invalid; 4];
    }
  }

  FrameStats {
    noise_floor_4x4: floor,
    log_avg_8x8: [acc_8x8[0].log_avg(), acc_8x8[1].log_avg()],
    log_avg_16x16: [
      acc_16x16[0].log_avg(),
      acc_16x16[1].log_avg(),
      acc_16x16[2].log_avg(),
    ],
    log_avg_32x32: [
      acc_32x32[0].log_avg(),
      acc_32x32[1].log_avg(),
      acc_32x32[2].log_avg(),
    ],
    sum_best_satd: acc.sum_best_satd,
    sum_sq_best_satd: acc.sum_sq_best_satd,
  }
}

#[cfg(test)]
pub mod test {
  use super::*;

  fn ctb_with_satd(f: impl Fn(usize) -> i32) -> Vec<EdBlock> {
    (0..64)
      .map(|i| EdBlock {
        satd_4x4: Measure::Value(f(i)),
        ..Default::default()
      })
      .collect()
  }

  #[test]
  fn set_median_picks_the_upper_middle() {
    assert_eq!(set_median(&[5, 10, 2, 7]), 7);
    assert_eq!(set_median(&[1, 1, 1, 9]), 1);
  }

  #[test]
  fn flat_frame_floors_at_the_default() {
    // all satds land in bin zero, far more than the 1% budget, so the floor
    // is the accumulated average of that bin
    let mut blocks = ctb_with_satd(|_| 0);
    let mut stats = vec![CtbLevel1Stats::default()];
    let fs =
      finalize_layer1(&mut blocks, &mut stats, 32, 32, EdAccum::default());
    assert_eq!(fs.noise_floor_4x4, 0);
    // every measure is valid and floored at zero stays as-is
    assert_eq!(stats[0].satd_8x8[0][0], Measure::Value(0));
    assert_eq!(stats[0].satd_32x32[3], Measure::Value(0));
  }

  #[test]
  fn sparse_histogram_falls_back_to_default_floor() {
    // all satds out of histogram range: no bin fills, fallback floor
    let mut blocks = ctb_with_satd(|_| 1000);
    let mut stats = vec![CtbLevel1Stats::default()];
    let fs =
      finalize_layer1(&mut blocks, &mut stats, 32, 32, EdAccum::default());
    assert_eq!(fs.noise_floor_4x4, NOISE_FLOOR_DEFAULT);
  }

  #[test]
  fn noise_floor_clamps_small_measures() {
    let mut blocks = ctb_with_satd(|i| if i == 0 { 1 } else { 1000 });
    let mut stats = vec![CtbLevel1Stats::default()];
    finalize_layer1(&mut blocks, &mut stats, 32, 32, EdAccum::default());
    assert_eq!(blocks[0].satd_4x4, Measure::Value(NOISE_FLOOR_DEFAULT));
    assert_eq!(blocks[1].satd_4x4, Measure::Value(1000));
  }

  #[test]
  fn sums_and_medians_aggregate_up_the_quad_tree() {
    // satd == z-scan index, no flooring interference at the high end
    let mut blocks = ctb_with_satd(|i| 100 + i as i32);
    let mut stats = vec![CtbLevel1Stats::default()];
    let fs =
      finalize_layer1(&mut blocks, &mut stats, 32, 32, EdAccum::default());
    let st = &stats[0];
    // first 8x8 sums blocks 100..=103
    assert_eq!(st.satd_8x8[0][0], Measure::Value(406));
    assert_eq!(st.satd_8x8[0][1], Measure::Value(102));
    // first 16x16 sums blocks 100..=115
    assert_eq!(st.satd_16x16[0][0], Measure::Value(1720));
    // whole ctb
    assert_eq!(st.satd_32x32[3], Measure::Value(64 * 100 + 2016));
    assert!(fs.log_avg_8x8[0] > fs.log_avg_8x8[1]);
    assert!(fs.log_avg_32x32[0] > 0.0);
  }

  #[test]
  fn unevaluated_blocks_invalidate_their_parents() {
    let mut blocks = ctb_with_satd(|i| 100 + i as i32);
    // knock out the last 8x8 quad (z-scan 60..64)
    for b in &mut blocks[60..64] {
      b.satd_4x4 = Measure::Invalid;
    }
    let mut stats = vec![CtbLevel1Stats::default()];
    finalize_layer1(&mut blocks, &mut stats, 32, 32, EdAccum::default());
    let st = &stats[0];
    assert_eq!(st.satd_8x8[15], [Measure::Invalid; 2]);
    assert_eq!(st.satd_16x16[3], [Measure::Invalid; 3]);
    assert_eq!(st.satd_32x32, [Measure::Invalid; 4]);
    // the untouched quads keep their measures
    assert!(st.satd_16x16[0].iter().all(|m| m.is_value()));
  }
}
