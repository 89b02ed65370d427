// Copyright (c) 2026, the hevla contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Look-ahead pre-analysis for an HEVC-class video encoder.
//!
//! The analysis runs ahead of the encode loop and produces, for every coding
//! tree block of a frame, a CU quad-tree of split decisions, up to three
//! intra mode candidates per CU and TU arrangement, and per-block activity
//! factors for perceptual QP modulation. It works over a three-layer
//! resolution pyramid:
//!
//! * the input picture is decimated twice with a 7-tap filter
//!   ([`pyramid`]),
//! * both coarse layers run an early intra decision that picks a mode per
//!   4x4 block and merges flat 8x8 groups ([`early_decision`]),
//! * the layer-1 measures are floored at a frame noise estimate and folded
//!   into frame-wide activity averages ([`stats`]),
//! * full resolution then brackets each CTB between the coarse-merge CU
//!   size and its children, refining modes around the coarse hints
//!   ([`bracketing`]), with QP modulation from [`activity`].
//!
//! All passes decompose into independent block rows scheduled over a worker
//! pool; results are deterministic for any thread count.
//!
//! The entry point is [`Analyzer`]. Costs are open-loop (prediction from
//! source samples, SAD/SATD distortion, MPM-weighted mode bits) and are
//! meant to seed the encoder's RDO, not replace it.

pub mod activity;
pub mod bracketing;
pub mod config;
pub mod dist;
pub mod early_decision;
pub mod kernels;
pub mod predict;
pub mod pyramid;
pub mod stats;

mod scheduler;

pub use crate::activity::{cu_level_qp_mod, QpMod, ACT_FACTOR_UNITY};
pub use crate::bracketing::{
  BracketAccum, CtbAnalysis, Intra16Analysis, Intra32Analysis, Intra8Analysis,
};
pub use crate::config::{
  AnalysisConfig, InvalidConfig, QualityPreset, RcQuantTables, SliceType,
};
pub use crate::early_decision::{IntraInterHint, Measure};
pub use crate::stats::FrameStats;

use v_frame::plane::Plane;

use crate::bracketing::BracketParams;
use crate::config::{MAX_CTB_SIZE, NUM_LAYERS};
use crate::early_decision::EdParams;
use crate::kernels::KernelTable;
use crate::pyramid::Pyramid;
use crate::scheduler::RowScheduler;

/// Everything the pre-analysis decides about one frame.
#[derive(Debug)]
pub struct FrameAnalysis {
  /// Per-CTB decisions in raster order.
  pub ctbs: Vec<CtbAnalysis>,
  /// CTB grid width.
  pub ctbs_w: usize,
  /// CTB grid height.
  pub ctbs_h: usize,
  /// Frame-wide activity averages from the coarse layers.
  pub stats: FrameStats,
  /// Frame totals of the bracketing pass.
  pub accum: BracketAccum,
}

impl FrameAnalysis {
  /// The analysis of the CTB at grid position `(cx, cy)`.
  #[inline]
  pub fn ctb(&self, cx: usize, cy: usize) -> &CtbAnalysis {
    &self.ctbs[cy * self.ctbs_w + cx]
  }

  /// Average activity factor of the frame, Q10. Unity means the QP
  /// modulation leaves the frame quantizer untouched on average.
  pub fn avg_act_factor(&self) -> i32 {
    let blocks = (self.ctbs.len() * 16) as i64;
    if blocks == 0 {
      ACT_FACTOR_UNITY
    } else {
      ((self.accum.act_factor + blocks / 2) / blocks) as i32
    }
  }
}

/// The pre-analysis pipeline for one stream. Holds two ping-pong pyramid
/// buffer sets and the worker pool configuration; call [`Analyzer::analyze`]
/// once per frame. Consecutive frames alternate between the two sets, so the
/// previous frame's pyramid surfaces stay intact while the next frame runs;
/// the returned [`FrameAnalysis`] owns all of its outputs.
pub struct Analyzer {
  cfg: AnalysisConfig,
  kernels: KernelTable,
  slots: [Pyramid; 2],
  ping_pong: usize,
  sched: RowScheduler,
}

impl Analyzer {
  /// # Errors
  ///
  /// Returns [`InvalidConfig`] when the configuration is malformed.
  pub fn new(cfg: AnalysisConfig) -> Result<Self, InvalidConfig> {
    cfg.validate()?;
    let slots = [Pyramid::new(&cfg), Pyramid::new(&cfg)];
    let sched = RowScheduler::new(cfg.num_threads);
    Ok(Analyzer {
      cfg,
      kernels: KernelTable::detect(),
      slots,
      ping_pong: 0,
      sched,
    })
  }

  #[inline]
  pub fn config(&self) -> &AnalysisConfig {
    &self.cfg
  }

  /// Runs the full pre-analysis over one luma plane.
  pub fn analyze(&mut self, frame: &Plane<u8>) -> FrameAnalysis {
    let slot = self.ping_pong;
    self.ping_pong ^= 1;
    let pyramid = &mut self.slots[slot];

    pyramid.load_frame(frame, self.cfg.width, self.cfg.height);
    for l in 1..NUM_LAYERS {
      let (done, rest) = pyramid.layers.split_at_mut(l);
      self.sched.scale_layer(&done[l - 1], &mut rest[0], &self.kernels);
    }

    let ed2 = self.sched.ed_layer(
      &EdParams {
        lambda: self.cfg.layer_lambda(2),
        quality: self.cfg.quality,
        layer: 2,
      },
      &pyramid.layers[2],
      &self.kernels,
    );
    let mut ed1 = self.sched.ed_layer(
      &EdParams {
        lambda: self.cfg.layer_lambda(1),
        quality: self.cfg.quality,
        layer: 1,
      },
      &pyramid.layers[1],
      &self.kernels,
    );

    let l1 = &pyramid.layers[1];
    let stats = stats::finalize_layer1(
      &mut ed1.blocks,
      &mut ed1.stats,
      l1.valid_w,
      l1.valid_h,
      ed1.acc,
    );

    let params = BracketParams::new(&self.cfg);
    let plane = &pyramid.layers[0];
    let (ctbs, accum) = self.sched.bracket_frame(
      &params,
      plane,
      &ed1.blocks,
      &ed2.blocks,
      &ed1.stats,
      &stats,
      &self.kernels,
    );

    let ctbs_w = plane.width.div_ceil(MAX_CTB_SIZE);
    let ctbs_h = plane.height.div_ceil(MAX_CTB_SIZE);
    log::debug!(
      "frame analysis: {}x{} ctbs, satd cost {}, noise floor {}",
      ctbs_w,
      ctbs_h,
      accum.satd_cost,
      stats.noise_floor_4x4
    );

    FrameAnalysis { ctbs, ctbs_w, ctbs_h, stats, accum }
  }
}

#[cfg(test)]
pub mod test {
  use super::*;

  fn plane_with(w: usize, h: usize, f: impl Fn(usize, usize) -> u8) -> Plane<u8> {
    let f = &f;
    let data: Vec<u8> =
      (0..h).flat_map(|y| (0..w).map(move |x| f(x, y))).collect();
    Plane::from_slice(&data, w)
  }

  fn cfg_128(num_threads: usize) -> AnalysisConfig {
    AnalysisConfig {
      width: 128,
      height: 128,
      num_threads,
      ..Default::default()
    }
  }

  #[test]
  fn new_rejects_invalid_config() {
    let cfg = AnalysisConfig { width: 30, ..Default::default() };
    assert!(matches!(Analyzer::new(cfg), Err(InvalidConfig::InvalidWidth(30))));
  }

  #[test]
  fn flat_frame_merges_every_ctb() {
    let mut an = Analyzer::new(cfg_128(1)).ok().unwrap();
    let frame = plane_with(128, 128, |_, _| 100);
    let fa = an.analyze(&frame);
    assert_eq!((fa.ctbs_w, fa.ctbs_h), (2, 2));
    assert_eq!(fa.ctbs.len(), 4);
    for ctb in &fa.ctbs {
      assert!(!ctb.split_flag);
      assert!(ctb.best_modes_64x64[0] <= 1);
    }
    // a flat frame carries no activity worth modulating
    assert_eq!(fa.avg_act_factor(), ACT_FACTOR_UNITY);
  }

  #[test]
  fn textured_frame_produces_costs_and_stats() {
    let mut an = Analyzer::new(cfg_128(2)).ok().unwrap();
    let frame = plane_with(128, 128, |x, y| {
      ((x * 31) ^ (y * 17)).wrapping_mul(7) as u8
    });
    let fa = an.analyze(&frame);
    assert!(fa.accum.satd_cost > 0);
    assert!(fa.accum.mode_bits_cost > 0);
    assert!(fa.stats.log_avg_8x8[0] > 0.0);
    assert!(fa.stats.sum_best_satd > 0);
    // every ctb produced per-8x8 costs
    for ctb in &fa.ctbs {
      assert!(ctb.cost_8x8.iter().all(|&c| c < crate::config::MAX_INTRA_COST));
    }
  }

  #[test]
  fn analysis_is_thread_count_invariant() {
    let frame = plane_with(128, 128, |x, y| ((x * 3 + y * 13) % 251) as u8);
    let mut a = Analyzer::new(cfg_128(1)).ok().unwrap();
    let mut b = Analyzer::new(cfg_128(4)).ok().unwrap();
    let fa = a.analyze(&frame);
    let fb = b.analyze(&frame);
    assert_eq!(fa.accum.satd_cost, fb.accum.satd_cost);
    assert_eq!(fa.accum.satd_by_modqp_q10, fb.accum.satd_by_modqp_q10);
    for (x, y) in fa.ctbs.iter().zip(&fb.ctbs) {
      assert_eq!(x.cost_64x64, y.cost_64x64);
      assert_eq!(x.split_flag, y.split_flag);
      assert_eq!(x.act_factor_8, y.act_factor_8);
    }
  }

  #[test]
  fn frames_alternate_between_independent_slots() {
    let mut an = Analyzer::new(cfg_128(1)).ok().unwrap();
    let textured = plane_with(128, 128, |x, y| ((x * 3 + y * 13) % 251) as u8);
    let flat = plane_with(128, 128, |_, _| 100);
    let first = an.analyze(&textured);
    let other = an.analyze(&flat);
    let again = an.analyze(&textured);
    // the flat frame in the other slot leaves the textured results intact
    assert!(!other.ctbs[0].split_flag);
    assert_eq!(first.accum.satd_cost, again.accum.satd_cost);
    assert_eq!(first.stats.sum_best_satd, again.stats.sum_best_satd);
    for (x, y) in first.ctbs.iter().zip(&again.ctbs) {
      assert_eq!(x.cost_64x64, y.cost_64x64);
      assert_eq!(x.cost_8x8, y.cost_8x8);
      assert_eq!(x.split_flag, y.split_flag);
    }
  }

  #[test]
  fn non_aligned_dimensions_round_up_to_the_ctb_grid() {
    let cfg = AnalysisConfig {
      width: 130,
      height: 70,
      ..Default::default()
    };
    let mut an = Analyzer::new(cfg).ok().unwrap();
    let frame = plane_with(130, 70, |x, y| ((x + 2 * y) % 256) as u8);
    let fa = an.analyze(&frame);
    assert_eq!((fa.ctbs_w, fa.ctbs_h), (3, 2));
    assert_eq!(fa.ctbs.len(), 6);
  }
}
