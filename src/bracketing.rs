// Copyright (c) 2026, the hevla contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Full-resolution recursive CU bracketing.
//!
//! Walks every CTB in z-scan order of its 8x8 blocks. The coarse-layer merge
//! flags pick the largest CU size worth trying; that parent CU and its four
//! children are then evaluated around the coarse mode hints, and the cheaper
//! bracket wins. The output is, per CTB, a quad-tree of split flags, up to
//! three candidate modes per CU and TU arrangement, and the activity factors
//! for QP modulation.

use itertools::izip;

use crate::activity::{cu_level_qp_mod, ACT_FACTOR_UNITY};
use crate::config::{
  rate_cost, AnalysisConfig, QualityPreset, RcQuantTables, SliceType,
  LAMBDA_Q_SHIFT, MAX_CTB_SIZE, MAX_INTRA_COST, NUM_BEST_MODES,
};
use crate::early_decision::{CtbLevel1Stats, EdBlock, IntraInterHint, Measure};
use crate::kernels::KernelTable;
use crate::predict::{
  predict_intra, ref_filtering, ref_substitution, use_filtered_refs,
  NbrAvail, MODE_DC, MODE_INVALID, MODE_PLANAR, MODE_VER,
};
use crate::pyramid::LayerPlane;
use crate::stats::FrameStats;

/// Lambda-weighted bias granted to the parent CU when compared against the
/// summed cost of its four children.
const CHILD_BIAS: u32 = 12;

/// Combined Q shift of the SATD-over-modulated-qscale accumulator: the
/// quotient of a plain SATD and a Q3 qscale, normalized to Q10.
const SATD_BY_MODQP_SHIFT: u32 = 13;

/// X coordinate, in 8x8 units, of each z-scan position inside a CTB.
#[rustfmt::skip]
const CU_POS_X: [u8; 64] = [
  0, 1, 0, 1, 2, 3, 2, 3, 0, 1, 0, 1, 2, 3, 2, 3, 4, 5, 4, 5, 6, 7,
  6, 7, 4, 5, 4, 5, 6, 7, 6, 7, 0, 1, 0, 1, 2, 3, 2, 3, 0, 1, 0, 1,
  2, 3, 2, 3, 4, 5, 4, 5, 6, 7, 6, 7, 4, 5, 4, 5, 6, 7, 6, 7,
];

/// Y coordinate, in 8x8 units, of each z-scan position inside a CTB.
#[rustfmt::skip]
const CU_POS_Y: [u8; 64] = [
  0, 0, 1, 1, 0, 0, 1, 1, 2, 2, 3, 3, 2, 2, 3, 3, 0, 0, 1, 1, 0, 0,
  1, 1, 2, 2, 3, 3, 2, 2, 3, 3, 4, 4, 5, 5, 4, 4, 5, 5, 6, 6, 7, 7,
  6, 6, 7, 7, 4, 4, 5, 5, 4, 4, 5, 5, 6, 6, 7, 7, 6, 6, 7, 7,
];

/// Arena offsets of the CU quad-tree levels: one 64x64, four 32x32, sixteen
/// 16x16, sixty-four 8x8 and 256 4x4 nodes. The children of node `p` at
/// level `l` are nodes `4p..4p + 4` at level `l + 1`.
const LEVEL_OFFSETS: [usize; 5] = [0, 1, 5, 21, 85];

const NUM_CU_NODES: usize = 341;

/// One candidate CU in the bracketing quad-tree.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CuNode {
  pub best_mode: u8,
  pub best_cost: i32,
  pub best_satd: i32,
  pub mode_bits_cost: u16,
  pub modes_1tu: [u8; NUM_BEST_MODES],
  pub costs_1tu: [i32; NUM_BEST_MODES],
  pub modes_4tu: [u8; NUM_BEST_MODES],
  pub costs_4tu: [i32; NUM_BEST_MODES],
}

impl Default for CuNode {
  fn default() -> Self {
    CuNode {
      best_mode: MODE_DC,
      best_cost: MAX_INTRA_COST,
      best_satd: 0,
      mode_bits_cost: 0,
      modes_1tu: [MODE_DC; NUM_BEST_MODES],
      costs_1tu: [MAX_INTRA_COST; NUM_BEST_MODES],
      modes_4tu: [MODE_DC; NUM_BEST_MODES],
      costs_4tu: [MAX_INTRA_COST; NUM_BEST_MODES],
    }
  }
}

/// Flat arena for the per-CTB CU quad-tree, indexed by `(level, z position)`
/// instead of child pointers.
pub(crate) struct CuArena {
  nodes: Vec<CuNode>,
}

impl CuArena {
  pub fn new() -> Self {
    CuArena { nodes: vec![CuNode::default(); NUM_CU_NODES] }
  }

  pub fn reset(&mut self) {
    self.nodes.fill(CuNode::default());
  }

  #[inline]
  fn idx(level: usize, pos: usize) -> usize {
    debug_assert!(
      pos < LEVEL_OFFSETS.get(level + 1).map_or(256, |o| o - LEVEL_OFFSETS[level])
    );
    LEVEL_OFFSETS[level] + pos
  }

  #[inline]
  pub fn at(&self, level: usize, pos: usize) -> &CuNode {
    &self.nodes[Self::idx(level, pos)]
  }

  #[inline]
  pub fn at_mut(&mut self, level: usize, pos: usize) -> &mut CuNode {
    &mut self.nodes[Self::idx(level, pos)]
  }
}

/// Decode-order availability map at 4x4 granularity, with a one-unit border
/// for the row above and column left of the CTB and headroom to the right
/// for above-right lookups.
pub(crate) struct NbrMap {
  m: [[u8; 33]; 18],
}

impl NbrMap {
  /// Builds the map for one CTB. `units_w`/`units_h` are the picture
  /// dimensions in 4x4 units; everything inside the CTB starts uncoded.
  pub fn for_ctb(
    ctb_x: usize, ctb_y: usize, units_w: usize, units_h: usize,
  ) -> Self {
    let mut m = [[0u8; 33]; 18];
    let base_x = ctb_x * 16;
    let base_y = ctb_y * 16;
    if ctb_y > 0 {
      for c in 1..33 {
        if base_x + c - 1 < units_w {
          m[0][c] = 1;
        }
      }
    }
    if ctb_x > 0 {
      for r in 1..17 {
        if base_y + r - 1 < units_h {
          m[r][0] = 1;
        }
      }
    }
    if ctb_x > 0 && ctb_y > 0 {
      m[0][0] = 1;
    }
    NbrMap { m }
  }

  #[inline]
  fn get(&self, ux: isize, uy: isize) -> bool {
    let (r, c) = (uy + 1, ux + 1);
    if !(0..18).contains(&r) || !(0..33).contains(&c) {
      return false;
    }
    self.m[r as usize][c as usize] != 0
  }

  /// Marks or clears a square of `size` 4x4 units at CTB-relative `(ux, uy)`.
  pub fn set(&mut self, ux: usize, uy: usize, size: usize, coded: bool) {
    for r in uy..uy + size {
      for c in ux..ux + size {
        self.m[r + 1][c + 1] = u8::from(coded);
      }
    }
  }

  /// Neighbor availability of a square of `size` units at `(ux, uy)`.
  pub fn flags(&self, ux: usize, uy: usize, size: usize) -> NbrAvail {
    let (x, y, n) = (ux as isize, uy as isize, size as isize);
    NbrAvail {
      left: self.get(x - 1, y),
      top: self.get(x, y - 1),
      top_left: self.get(x - 1, y - 1),
      top_right: self.get(x + n, y - 1),
      bottom_left: self.get(x - 1, y + n),
    }
  }
}

/// Finalized intra mode map of the CTB at 4x4 granularity, bordered so the
/// left and top lookups of edge blocks stay in range. Entries start invalid;
/// the MPM derivation treats invalid neighbors as unavailable.
pub(crate) struct ModeMap {
  m: [[u8; 18]; 18],
}

impl ModeMap {
  pub fn new() -> Self {
    ModeMap { m: [[MODE_INVALID; 18]; 18] }
  }

  /// Writes the final mode of a CU at `(x0, y0)` 8x8 units into the map.
  pub fn update(&mut self, x0: u8, y0: u8, size: u8, mode: u8) {
    let x = 2 * x0 as usize + 1;
    let y = 2 * y0 as usize + 1;
    let s = (size >> 2) as usize;
    for row in y..y + s {
      for col in x..x + s {
        self.m[row][col] = mode;
      }
    }
  }

  /// Left and above modes of a CU at `(x0, y0)` 8x8 units, as the MPM
  /// derivation reads them.
  fn left_top(&self, x0: u8, y0: u8) -> (u8, u8) {
    let x = 2 * x0 as usize;
    let y = 2 * y0 as usize + 1;
    (self.m[y][x], self.m[y - 1][x + 1])
  }
}

/// MPM-weighted rate of every intra mode: the two most probable modes cost
/// 1.5 bits, the third 2.5, everything else 5.5.
struct ModeBits {
  cost: [i32; 35],
  bits: [u16; 35],
  cands: [u8; 3],
}

/// Derives the three most probable modes from the coded neighbors and prices
/// all 35 modes accordingly. Neighbors carrying an invalid mode are treated
/// as unavailable, and the above neighbor degrades to DC on the CTB top row
/// since the map does not persist across CTB rows.
fn populate_mode_bits_cost(
  top_mode: u8, left_mode: u8, top_avail: bool, left_avail: bool, cu_pos_y: u8,
  lambda: u32,
) -> ModeBits {
  let one = rate_cost(4, lambda);
  let two = rate_cost(6, lambda);
  let five = rate_cost(12, lambda);

  let top_avail = top_avail && top_mode < 35;
  let left_avail = left_avail && left_mode < 35;

  let cand_top = if !top_avail || cu_pos_y == 0 { MODE_DC } else { top_mode };
  let cand_left = if !left_avail { MODE_DC } else { left_mode };

  let cands: [u8; 3] = if cand_left == cand_top {
    if cand_left < 2 {
      [MODE_PLANAR, MODE_DC, MODE_VER]
    } else {
      let m = cand_left as u32;
      [cand_left, (2 + (m + 29) % 32) as u8, (2 + (m - 1) % 32) as u8]
    }
  } else {
    let (first, second) =
      if !left_avail { (cand_top, cand_left) } else { (cand_left, cand_top) };
    let third = if cand_left != MODE_PLANAR && cand_top != MODE_PLANAR {
      MODE_PLANAR
    } else if cand_left != MODE_DC && cand_top != MODE_DC {
      MODE_DC
    } else {
      MODE_VER
    };
    [first, second, third]
  };

  let mut mb = ModeBits { cost: [five; 35], bits: [5; 35], cands };
  mb.cost[cands[0] as usize] = one;
  mb.cost[cands[1] as usize] = two;
  mb.cost[cands[2] as usize] = two;
  mb.bits[cands[0] as usize] = 2;
  mb.bits[cands[1] as usize] = 3;
  mb.bits[cands[2] as usize] = 3;
  mb
}

/// Parameters of the full-resolution bracketing pass, fixed per frame.
#[derive(Clone, Debug)]
pub(crate) struct BracketParams {
  pub sad_lambda: u32,
  pub satd_lambda: u32,
  pub quality: QualityPreset,
  pub slice_type: SliceType,
  pub frame_qscale: i32,
  pub mod_strength: f32,
  pub rc: RcQuantTables,
  /// SATD costing in the step-2 angular search; SAD on fast presets.
  pub use_satd: bool,
  /// Single-step refinement around the best 4x4 angular mode.
  pub level1_refine: bool,
  pub enable_1cu_4tu: bool,
  pub enable_4cu_16tu: bool,
}

impl BracketParams {
  pub fn new(cfg: &AnalysisConfig) -> Self {
    let four_tu = cfg.quality.four_tu_eval();
    BracketParams {
      sad_lambda: cfg.lambda,
      // the SATD lambda runs sqrt(1.9) hotter than the SAD lambda
      satd_lambda: ((cfg.lambda as u64 * 353) >> 8) as u32,
      quality: cfg.quality,
      slice_type: cfg.slice_type,
      frame_qscale: cfg.frame_qscale,
      mod_strength: cfg.mod_strength,
      rc: cfg.rc.clone(),
      use_satd: cfg.quality <= QualityPreset::Medium,
      level1_refine: cfg.quality != QualityPreset::ExtremeSpeed,
      enable_1cu_4tu: four_tu,
      enable_4cu_16tu: four_tu,
    }
  }

  #[inline]
  fn child_bias(&self) -> i32 {
    ((self.satd_lambda as u64 * CHILD_BIAS as u64) >> LAMBDA_Q_SHIFT) as i32
  }
}

/// Per-8x8 analysis handed to the encode loop.
#[derive(Clone, Copy, Debug)]
pub struct Intra8Analysis {
  pub valid_cu: bool,
  /// The four-PU split beat the single 8x8 PU; the NxN modes apply.
  pub enable_nxn: bool,
  pub best_modes_8x8_tu: [u8; NUM_BEST_MODES + 1],
  pub best_modes_4x4_tu: [u8; NUM_BEST_MODES + 1],
  /// Per-4x4 candidate lists when NxN is enabled, 255-terminated.
  pub modes_4x4: [[u8; NUM_BEST_MODES + 1]; 4],
}

impl Default for Intra8Analysis {
  fn default() -> Self {
    Intra8Analysis {
      valid_cu: false,
      enable_nxn: false,
      best_modes_8x8_tu: [MODE_INVALID; NUM_BEST_MODES + 1],
      best_modes_4x4_tu: [MODE_INVALID; NUM_BEST_MODES + 1],
      modes_4x4: [[MODE_INVALID; NUM_BEST_MODES + 1]; 4],
    }
  }
}

/// Per-16x16 analysis.
#[derive(Clone, Copy, Debug)]
pub struct Intra16Analysis {
  pub valid_cu: bool,
  pub split_flag: bool,
  pub merge_flag: bool,
  pub best_modes_16x16_tu: [u8; NUM_BEST_MODES + 1],
  pub best_modes_8x8_tu: [u8; NUM_BEST_MODES + 1],
  pub intra8: [Intra8Analysis; 4],
}

impl Default for Intra16Analysis {
  fn default() -> Self {
    Intra16Analysis {
      valid_cu: false,
      split_flag: false,
      merge_flag: false,
      best_modes_16x16_tu: [MODE_INVALID; NUM_BEST_MODES + 1],
      best_modes_8x8_tu: [MODE_INVALID; NUM_BEST_MODES + 1],
      intra8: [Intra8Analysis::default(); 4],
    }
  }
}

/// Per-32x32 analysis.
#[derive(Clone, Copy, Debug)]
pub struct Intra32Analysis {
  pub valid_cu: bool,
  pub split_flag: bool,
  pub merge_flag: bool,
  pub best_modes_32x32_tu: [u8; NUM_BEST_MODES + 1],
  pub best_modes_16x16_tu: [u8; NUM_BEST_MODES + 1],
  pub intra16: [Intra16Analysis; 4],
}

impl Default for Intra32Analysis {
  fn default() -> Self {
    Intra32Analysis {
      valid_cu: false,
      split_flag: false,
      merge_flag: false,
      best_modes_32x32_tu: [MODE_INVALID; NUM_BEST_MODES + 1],
      best_modes_16x16_tu: [MODE_INVALID; NUM_BEST_MODES + 1],
      intra16: [Intra16Analysis::default(); 4],
    }
  }
}

/// Everything the bracketing pass decides about one CTB.
#[derive(Clone, Debug)]
pub struct CtbAnalysis {
  /// False when the whole CTB codes as a single 64x64 CU.
  pub split_flag: bool,
  /// Candidate modes of the 64x64 CU, 255-terminated.
  pub best_modes_64x64: [u8; NUM_BEST_MODES + 1],
  pub cost_64x64: i32,
  /// 32x32 costs in z order.
  pub cost_32x32: [i32; 4],
  /// 16x16 costs in raster order within the CTB.
  pub cost_16x16: [i32; 16],
  /// 8x8 costs in raster order within the CTB.
  pub cost_8x8: [i32; 64],
  pub intra32: [Intra32Analysis; 4],
  /// Accumulated SATD of the winning CU bracket.
  pub acc_satd: i32,
  /// Accumulated MPM mode bits of the winning CU bracket.
  pub acc_mpm_bits: i64,
  /// Activity factors (Q10) per measure variant for QP modulation.
  pub act_factor_64: [i32; 4],
  pub act_factor_32: [[i32; 3]; 4],
  pub act_factor_16: [[i32; 2]; 16],
  pub act_factor_8: [i32; 16],
  /// Coarse-layer 8x8 SAD measures passed through for motion estimation.
  pub best_sad_8x8_l1_ipe: [Measure; 16],
  pub best_sad_cost_8x8_l1_ipe: [Measure; 16],
}

impl Default for CtbAnalysis {
  fn default() -> Self {
    CtbAnalysis {
      split_flag: true,
      best_modes_64x64: [MODE_PLANAR, MODE_DC, MODE_INVALID, MODE_INVALID],
      cost_64x64: MAX_INTRA_COST,
      cost_32x32: [MAX_INTRA_COST; 4],
      cost_16x16: [MAX_INTRA_COST; 16],
      cost_8x8: [MAX_INTRA_COST; 64],
      intra32: [Intra32Analysis::default(); 4],
      acc_satd: 0,
      acc_mpm_bits: 0,
      act_factor_64: [ACT_FACTOR_UNITY; 4],
      act_factor_32: [[ACT_FACTOR_UNITY; 3]; 4],
      act_factor_16: [[ACT_FACTOR_UNITY; 2]; 16],
      act_factor_8: [ACT_FACTOR_UNITY; 16],
      best_sad_8x8_l1_ipe: [Measure::Invalid; 16],
      best_sad_cost_8x8_l1_ipe: [Measure::Invalid; 16],
    }
  }
}

/// Frame-level accumulators fed by every CTB of the bracketing pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct BracketAccum {
  pub satd_cost: i64,
  pub satd_by_modqp_q10: i64,
  pub mode_bits_cost: i64,
  pub satd: i64,
  pub act_factor: i64,
}

/// Result of one CU evaluation: the three cheapest modes plus the winner's
/// cost split into SATD and mode bits.
#[derive(Clone, Copy, Debug)]
struct EvalOut {
  modes: [u8; NUM_BEST_MODES],
  costs: [i32; NUM_BEST_MODES],
  best_mode: u8,
  best_cost: i32,
  best_satd: i32,
  mode_bits_cost: u16,
}

const REF_STRIDE: usize = 4 * MAX_CTB_SIZE + 1;

/// Scratch shared by the CU evaluations of one CTB.
struct CtbScratch {
  map: ModeMap,
  nbr: NbrMap,
  refs: [[u8; REF_STRIDE]; 4],
  refs_filt: [[u8; REF_STRIDE]; 4],
  pred: [u8; 32 * 32],
}

impl CtbScratch {
  fn new(ctb_x: usize, ctb_y: usize, units_w: usize, units_h: usize) -> Self {
    CtbScratch {
      map: ModeMap::new(),
      nbr: NbrMap::for_ctb(ctb_x, ctb_y, units_w, units_h),
      refs: [[0; REF_STRIDE]; 4],
      refs_filt: [[0; REF_STRIDE]; 4],
      pred: [0; 32 * 32],
    }
  }
}

/// The bracketing state of one CTB.
struct CtbBracket<'a> {
  p: &'a BracketParams,
  plane: &'a LayerPlane,
  k: &'a KernelTable,
  /// CTB origin in 8x8 units of the picture.
  ctb_x8: usize,
  ctb_y8: usize,
  scratch: CtbScratch,
  arena: CuArena,
}

impl<'a> CtbBracket<'a> {
  /// Absolute sample offset of a CU at `(x0, y0)` 8x8 units of this CTB.
  #[inline]
  fn cu_origin(&self, x0: u8, y0: u8) -> usize {
    let x = (self.ctb_x8 + x0 as usize) * 8 + self.plane.pad_left;
    let y = (self.ctb_y8 + y0 as usize) * 8 + self.plane.pad_top;
    y * self.plane.stride + x
  }

  /// Builds the reference arrays of every TU of a CU, marking each TU coded
  /// as it goes so later TUs see the earlier ones.
  fn build_tu_refs(&mut self, x0: u8, y0: u8, trans: usize, num_tu: usize) {
    let plane = self.plane;
    let data = plane.data();
    let base_x8 = self.ctb_x8;
    let base_y8 = self.ctb_y8;
    let cu_ux = 2 * x0 as usize;
    let cu_uy = 2 * y0 as usize;
    let tu_units = trans >> 2;
    let CtbScratch { nbr, refs, refs_filt, .. } = &mut self.scratch;
    for ty in 0..num_tu {
      for tx in 0..num_tu {
        let n = ty * num_tu + tx;
        let ux = cu_ux + tx * tu_units;
        let uy = cu_uy + ty * tu_units;
        let avail = nbr.flags(ux, uy, tu_units);
        let ax = base_x8 * 8 + ux * 4 + plane.pad_left;
        let ay = base_y8 * 8 + uy * 4 + plane.pad_top;
        ref_substitution(
          data,
          plane.stride,
          ax,
          ay,
          trans,
          avail,
          &mut refs[n][..4 * trans + 1],
        );
        ref_filtering(
          &refs[n][..4 * trans + 1],
          trans,
          &mut refs_filt[n][..4 * trans + 1],
        );
        nbr.set(ux, uy, tu_units, true);
      }
    }
  }

  /// Distortion of one mode accumulated across the TUs of the CU.
  /// `force_satd` applies the step-1 SATD costing regardless of preset.
  fn mode_tu_cost(
    &mut self, x0: u8, y0: u8, trans: usize, num_tu: usize, mode: u8,
    force_satd: bool,
  ) -> i32 {
    let origin = self.cu_origin(x0, y0);
    let plane = self.plane;
    let data = plane.data();
    let stride = plane.stride;
    let filtered = use_filtered_refs(mode, trans);
    let dist =
      if force_satd || self.p.use_satd { self.k.satd } else { self.k.sad };
    let CtbScratch { refs, refs_filt, pred, .. } = &mut self.scratch;
    let mut cost = 0i32;
    for ty in 0..num_tu {
      for tx in 0..num_tu {
        let n = ty * num_tu + tx;
        let r = if filtered {
          &refs_filt[n][..4 * trans + 1]
        } else {
          &refs[n][..4 * trans + 1]
        };
        predict_intra(mode, r, trans, &mut pred[..trans * trans]);
        let org = &data[origin + ty * trans * stride + tx * trans..];
        cost += dist(org, stride, &pred[..trans * trans], trans, trans) as i32;
      }
    }
    cost
  }

  /// Two-stage mode evaluation of one CU: a step-2 angular search seeded
  /// either from a coarse-layer hint or from the winning child modes, then
  /// an SATD pass over planar, DC and the single-step bracket of the best
  /// angular mode.
  fn mode_eval_filtering(
    &mut self, x0: u8, y0: u8, cu_size: u8, hint: u8, child_modes: [u8; 4],
    step2_bypass: bool, tu_eq_cu: bool,
  ) -> EvalOut {
    let trans =
      if tu_eq_cu { cu_size as usize } else { (cu_size >> 1) as usize };
    let num_tu = if tu_eq_cu { 1 } else { 2 };

    let cu_avail =
      self.scratch.nbr.flags(2 * x0 as usize, 2 * y0 as usize, trans >> 2);
    let (left_mode, top_mode) = self.scratch.map.left_top(x0, y0);
    let mb = populate_mode_bits_cost(
      top_mode,
      left_mode,
      cu_avail.top,
      cu_avail.left,
      y0,
      self.p.satd_lambda,
    );

    self.build_tu_refs(x0, y0, trans, num_tu);

    // step-2 angular candidates plus the two leading MPMs, deduplicated,
    // non-angular entries dropped
    let mut temp = [0u8; 6];
    let mut n_temp = 0;
    if !step2_bypass {
      debug_assert!((2..=34).contains(&hint));
      if self.p.quality.bracket_mode_spread() && hint >= 4 {
        temp[n_temp] = hint - 2;
        n_temp += 1;
      }
      temp[n_temp] = hint;
      n_temp += 1;
      if self.p.quality.bracket_mode_spread() && hint <= 32 {
        temp[n_temp] = hint + 2;
        n_temp += 1;
      }
    } else {
      temp[..4].copy_from_slice(&child_modes);
      n_temp = 4;
    }
    temp[n_temp] = mb.cands[0];
    temp[n_temp + 1] = mb.cands[1];
    n_temp += 2;

    let mut step2 = [0u8; 7];
    let mut n_step2 = 0;
    for &m in &temp[..n_temp] {
      if m > 1 && !step2[..n_step2].contains(&m) {
        step2[n_step2] = m;
        n_step2 += 1;
      }
    }
    if n_step2 == 0 {
      step2[0] = MODE_VER;
      n_step2 = 1;
    }

    let mut best_amode = step2[0];
    let mut best_acost = MAX_INTRA_COST;
    for i in 0..n_step2 {
      let mode = step2[i];
      debug_assert!((2..=34).contains(&mode));
      let cost = mb.cost[mode as usize]
        + self.mode_tu_cost(x0, y0, trans, num_tu, mode, false);
      if cost < best_acost || (cost == best_acost && mode < best_amode) {
        best_amode = mode;
        best_acost = cost;
      }
    }

    // step-1 bracket around the angular winner, with planar and DC
    let mut eval = [0u8; 5];
    let mut n_eval = 0;
    eval[n_eval] = MODE_PLANAR;
    n_eval += 1;
    eval[n_eval] = MODE_DC;
    n_eval += 1;
    if best_amode != 2 {
      eval[n_eval] = best_amode - 1;
      n_eval += 1;
    }
    eval[n_eval] = best_amode;
    n_eval += 1;
    if best_amode != 34 {
      eval[n_eval] = best_amode + 1;
      n_eval += 1;
    }

    let mut costs = [MAX_INTRA_COST; 5];
    for i in 0..n_eval {
      let mode = eval[i];
      costs[i] = mb.cost[mode as usize]
        + self.mode_tu_cost(x0, y0, trans, num_tu, mode, true);
    }

    let mut order = [0usize, 1, 2, 3, 4];
    for i in 0..n_eval.saturating_sub(1) {
      for j in i + 1..n_eval {
        if costs[i] > costs[j] {
          costs.swap(i, j);
          order.swap(i, j);
        }
      }
    }

    let best_mode = eval[order[0]];
    let mut out = EvalOut {
      modes: [MODE_DC; NUM_BEST_MODES],
      costs: [MAX_INTRA_COST; NUM_BEST_MODES],
      best_mode,
      best_cost: costs[0],
      best_satd: costs[0] - mb.cost[best_mode as usize],
      mode_bits_cost: mb.bits[best_mode as usize],
    };
    for i in 0..NUM_BEST_MODES.min(n_eval) {
      out.costs[i] = costs[i];
      out.modes[i] = eval[order[i]];
    }
    out
  }

  /// Mode decision of a single 4x4 PU: a full angular scan at step four,
  /// refinement at step two, and an SATD ordering of the refined bracket
  /// against planar and DC.
  fn pu_calc_4x4(
    &self, origin: usize, refs: &[u8; 17], mb: &ModeBits,
  ) -> EvalOut {
    const SCAN: [u8; 9] = [26, 2, 6, 10, 14, 18, 22, 30, 34];
    let stride = self.plane.stride;
    let data = self.plane.data();
    let mut pred = [0u8; 16];

    let mut best_amode = SCAN[0];
    let mut best_acost = MAX_INTRA_COST;
    for &mode in &SCAN {
      predict_intra(mode, refs, 4, &mut pred);
      let cost = (self.k.sad)(&data[origin..], stride, &pred, 4, 4) as i32
        + mb.cost[mode as usize];
      if cost < best_acost {
        best_amode = mode;
        best_acost = cost;
      }
    }
    for mode in [best_amode.wrapping_sub(2), best_amode + 2] {
      if !(2..=34).contains(&mode) {
        continue;
      }
      predict_intra(mode, refs, 4, &mut pred);
      let cost = (self.k.sad)(&data[origin..], stride, &pred, 4, 4) as i32
        + mb.cost[mode as usize];
      if cost < best_acost {
        best_amode = mode;
        best_acost = cost;
      }
    }

    let mut eval = [0u8; 5];
    let mut n_eval = 0;
    if self.p.level1_refine {
      if best_amode != 2 {
        eval[n_eval] = best_amode - 1;
        n_eval += 1;
      }
      eval[n_eval] = best_amode;
      n_eval += 1;
    }
    eval[n_eval] = MODE_PLANAR;
    n_eval += 1;
    eval[n_eval] = MODE_DC;
    n_eval += 1;
    if self.p.level1_refine && best_amode != 34 {
      eval[n_eval] = best_amode + 1;
      n_eval += 1;
    }

    let mut costs = [MAX_INTRA_COST; 5];
    for i in 0..n_eval {
      let mode = eval[i];
      predict_intra(mode, refs, 4, &mut pred);
      let dist = if self.p.use_satd {
        (self.k.satd)(&data[origin..], stride, &pred, 4, 4)
      } else {
        (self.k.sad)(&data[origin..], stride, &pred, 4, 4)
      };
      costs[i] = dist as i32 + mb.cost[mode as usize];
    }

    let mut order = [0usize, 1, 2, 3, 4];
    for i in 0..n_eval.saturating_sub(1) {
      for j in i + 1..n_eval {
        if costs[i] > costs[j] {
          costs.swap(i, j);
          order.swap(i, j);
        }
      }
    }

    let best_mode = eval[order[0]];
    let mut out = EvalOut {
      modes: [MODE_DC; NUM_BEST_MODES],
      costs: [MAX_INTRA_COST; NUM_BEST_MODES],
      best_mode,
      best_cost: costs[0],
      best_satd: costs[0] - mb.cost[best_mode as usize],
      mode_bits_cost: mb.bits[best_mode as usize],
    };
    for i in 0..NUM_BEST_MODES.min(n_eval) {
      out.costs[i] = costs[i];
      out.modes[i] = eval[order[i]];
    }
    out
  }

  /// Evaluates the four 4x4 PUs of an 8x8 CU at z-scan position `blk` into
  /// the level-4 arena nodes, updating the neighbor and mode maps PU by PU.
  fn pu_calc_8x8(&mut self, blk: usize) {
    let x0 = CU_POS_X[blk];
    let y0 = CU_POS_Y[blk];
    for i in 0..2usize {
      for j in 0..2usize {
        let n = i * 2 + j;
        let ux = 2 * x0 as usize + j;
        let uy = 2 * y0 as usize + i;
        let avail = self.scratch.nbr.flags(ux, uy, 1);
        let xa = 2 * x0 as usize + j;
        let ya = 2 * y0 as usize + 1 + i;
        let left_mode = self.scratch.map.m[ya][xa];
        let top_mode = self.scratch.map.m[ya - 1][xa + 1];
        let mb = populate_mode_bits_cost(
          top_mode,
          left_mode,
          avail.top,
          avail.left,
          y0,
          self.p.sad_lambda,
        );

        let ax = self.ctb_x8 * 8 + ux * 4 + self.plane.pad_left;
        let ay = self.ctb_y8 * 8 + uy * 4 + self.plane.pad_top;
        let mut refs = [0u8; 17];
        ref_substitution(
          self.plane.data(),
          self.plane.stride,
          ax,
          ay,
          4,
          avail,
          &mut refs,
        );
        let origin = ay * self.plane.stride + ax;
        let r = self.pu_calc_4x4(origin, &refs, &mb);

        self.scratch.nbr.set(ux, uy, 1, true);
        self.scratch.map.m[ya][xa + 1] = r.best_mode;

        let node = self.arena.at_mut(4, 4 * blk + n);
        node.best_mode = r.best_mode;
        node.best_cost = r.best_cost;
        node.best_satd = r.best_satd;
        node.mode_bits_cost = r.mode_bits_cost;
        node.modes_1tu = r.modes;
        node.costs_1tu = r.costs;
        node.modes_4tu = r.modes;
        node.costs_4tu = r.costs;
      }
    }
  }

  /// Runs one CU evaluation pair (1TU, and 4TU when the preset pays for it),
  /// stores the result in the arena node and the mode map, and returns the
  /// cheaper of the two TU arrangements.
  #[allow(clippy::too_many_arguments)]
  fn eval_cu(
    &mut self, level: usize, pos: usize, blk: usize, hint: u8,
    child_modes: [u8; 4], step2_bypass: bool, four_tu: bool,
  ) -> i32 {
    let x0 = CU_POS_X[blk];
    let y0 = CU_POS_Y[blk];
    let size = (MAX_CTB_SIZE >> level) as u8;
    let one = self
      .mode_eval_filtering(x0, y0, size, hint, child_modes, step2_bypass, true);
    let four = if four_tu {
      self.mode_eval_filtering(
        x0,
        y0,
        size,
        hint,
        child_modes,
        step2_bypass,
        false,
      )
    } else {
      one
    };

    let best = if four.costs[0] > one.costs[0] { &one } else { &four };
    let best_cost = one.costs[0].min(four.costs[0]);
    let best_mode = best.best_mode;
    let best_satd = best.best_satd;
    let bits = best.mode_bits_cost;

    let node = self.arena.at_mut(level, pos);
    node.modes_1tu = one.modes;
    node.costs_1tu = one.costs;
    node.modes_4tu = four.modes;
    node.costs_4tu = four.costs;
    node.best_mode = best_mode;
    node.best_cost = best_cost;
    node.best_satd = best_satd;
    node.mode_bits_cost = bits;

    self.scratch.map.update(x0, y0, size, best_mode);
    best_cost
  }

  /// QP modulation of one winning CU against the frame activity average.
  fn qp_mod(&self, satd: Measure, log_avg: f64) -> i32 {
    let m = cu_level_qp_mod(
      self.p.frame_qscale,
      satd,
      log_avg,
      self.p.mod_strength,
      &self.p.rc,
    );
    m.qscale.max(1)
  }
}

/// Mode candidate list stored with a merged 64x64: the winner and the
/// adjacent angular modes, or the planar/DC/vertical default.
fn cand_list_64(best_mode: u8) -> [u8; NUM_BEST_MODES + 1] {
  if best_mode > 1 {
    let (lo, hi) = match best_mode {
      2 => (34, 3),
      34 => (2, 33),
      m => (m - 1, m + 1),
    };
    [best_mode, lo, hi, MODE_INVALID]
  } else {
    [MODE_PLANAR, MODE_DC, MODE_VER, MODE_INVALID]
  }
}

#[inline]
fn accumulate_cost(slot: &mut i32, cost: i32) {
  if *slot == MAX_INTRA_COST {
    *slot = cost;
  } else {
    *slot += cost;
  }
}

fn act_factor(p: &BracketParams, satd: Measure, log_avg: f64) -> i32 {
  cu_level_qp_mod(p.frame_qscale, satd, log_avg, p.mod_strength, &p.rc)
    .act_factor
}

fn hint_all_inter(blocks: &[EdBlock]) -> bool {
  blocks.iter().all(|b| b.intra_inter == IntraInterHint::Inter)
}

/// Full bracketing of one CTB: coarse-merge driven CU size decision, mode
/// refinement at every surviving level and the QP-modulation measures.
#[allow(clippy::too_many_arguments)]
pub(crate) fn bracketing_analysis(
  p: &BracketParams, plane: &LayerPlane, ctb_x: usize, ctb_y: usize,
  ed_l1: &[EdBlock], ed_l2: &[EdBlock], l1: &CtbLevel1Stats, fs: &FrameStats,
  k: &KernelTable, acc: &mut BracketAccum,
) -> CtbAnalysis {
  debug_assert_eq!(ed_l1.len(), 64);
  debug_assert_eq!(ed_l2.len(), 16);

  let ctb_wd = (plane.width - ctb_x * MAX_CTB_SIZE).min(MAX_CTB_SIZE);
  let ctb_ht = (plane.height - ctb_y * MAX_CTB_SIZE).min(MAX_CTB_SIZE);
  let num8_x = ctb_wd >> 3;
  let num8_y = ctb_ht >> 3;

  let mut b = CtbBracket {
    p,
    plane,
    k,
    ctb_x8: ctb_x * 8,
    ctb_y8: ctb_y * 8,
    scratch: CtbScratch::new(ctb_x, ctb_y, plane.width >> 2, plane.height >> 2),
    arena: CuArena::new(),
  };

  let mut out = CtbAnalysis {
    best_sad_8x8_l1_ipe: l1.best_sad_8x8_ipe,
    best_sad_cost_8x8_l1_ipe: l1.best_sad_cost_8x8_ipe,
    ..Default::default()
  };

  let bias = p.child_bias();
  let disable_child =
    p.quality.disable_child_cu_decide() && p.slice_type != SliceType::I;
  let skip_inter = p.slice_type != SliceType::I;

  let mut ctb_acc_satd = 0i64;
  let mut ctb_satd_cost = 0i64;
  let mut ctb_satd_by_modqp = 0i64;
  let mut ctb_mode_bits = 0i64;

  let mut merge_64 = true;
  let mut best_32_modes = [MODE_INVALID; 4];
  let mut best_32_costs = [MAX_INTRA_COST; 4];

  let mut blk = 0usize;
  while blk != 64 {
    let pos_x = CU_POS_X[blk] as usize;
    let pos_y = CU_POS_Y[blk] as usize;
    let i32i = blk >> 4;
    let i16i = (blk & 0xF) >> 2;

    if pos_x >= num8_x || pos_y >= num8_y {
      out.intra32[i32i].valid_cu = false;
      out.intra32[i32i].intra16[i16i].valid_cu = false;
      blk += 1;
      merge_64 = false;
      continue;
    }

    let base16 = (pos_x >> 1) + (pos_y >> 1) * 4;
    let base8 = pos_x + pos_y * 8;

    {
      let a32 = &mut out.intra32[i32i];
      a32.valid_cu = true;
      a32.split_flag = true;
      a32.best_modes_32x32_tu =
        [MODE_PLANAR, MODE_DC, MODE_INVALID, MODE_INVALID];
      a32.best_modes_16x16_tu =
        [MODE_PLANAR, MODE_DC, MODE_INVALID, MODE_INVALID];
    }

    let merge_16 =
      num8_x - pos_x >= 2 && num8_y - pos_y >= 2 && ed_l1[blk].merge_success;
    let merge_32 = blk & 15 == 0
      && num8_x - pos_x >= 4
      && num8_y - pos_y >= 4
      && (0..4).all(|i| ed_l1[blk + i * 4].merge_success)
      && ed_l2[blk >> 2].merge_success;

    if merge_32 {
      if skip_inter && hint_all_inter(&ed_l1[blk..blk + 16]) {
        // the coarse stage chose inter for this whole 32x32: stand in DC at
        // maximal cost so the encode loop never picks intra here, and keep
        // the source samples marked as seen
        let a32 = &mut out.intra32[i32i];
        a32.merge_flag = true;
        a32.split_flag = false;
        a32.best_modes_32x32_tu =
          [MODE_DC, MODE_INVALID, MODE_INVALID, MODE_INVALID];
        a32.best_modes_16x16_tu = a32.best_modes_32x32_tu;
        for a16 in &mut a32.intra16 {
          *a16 = Intra16Analysis::default();
        }
        out.cost_32x32[blk >> 4] = MAX_INTRA_COST;
        b.scratch.map.update(CU_POS_X[blk], CU_POS_Y[blk], 32, MODE_DC);
        b.scratch.nbr.set(2 * pos_x, 2 * pos_y, 8, true);
        merge_64 = false;
        blk += 16;
        continue;
      }

      // candidate CU of 32x32: evaluate the four 16x16 children around the
      // layer-1 merge hints, then the parent around the child winners
      let mut child_cost_least = 0i32;
      let mut child_satd = [0i32; 4];
      let mut child_modes = [MODE_DC; 4];

      if !disable_child {
        for j in 0..4 {
          let cblk = blk + j * 4;
          let hint = match ed_l1[cblk].best_merge_mode {
            m if m < 2 => MODE_VER,
            m => m,
          };
          let child_cost = b.eval_cu(
            2,
            (blk >> 2) + j,
            cblk,
            hint,
            [MODE_DC; 4],
            false,
            p.enable_4cu_16tu,
          );
          child_cost_least += child_cost;
          let node = *b.arena.at(2, (blk >> 2) + j);
          child_satd[j] = node.best_satd;
          child_modes[j] = node.best_mode;

          out.cost_16x16[base16 + (j & 1) + 4 * (j >> 1)] = child_cost;

          let a16 = &mut out.intra32[i32i].intra16[j];
          a16.valid_cu = true;
          a16.merge_flag = true;
          a16.best_modes_8x8_tu[..NUM_BEST_MODES]
            .copy_from_slice(&node.modes_4tu);
          a16.best_modes_8x8_tu[NUM_BEST_MODES] = MODE_INVALID;
          a16.best_modes_16x16_tu[..NUM_BEST_MODES]
            .copy_from_slice(&node.modes_1tu);
          a16.best_modes_16x16_tu[NUM_BEST_MODES] = MODE_INVALID;

          // pro-rate the 16x16 cost over its four 8x8 children
          let b8 = base8 + ((j & 1) << 1) + ((j >> 1) << 1) * 8;
          for n in 0..4 {
            out.cost_8x8[b8 + (n & 1) + 8 * (n >> 1)] = (child_cost + 3) >> 2;
            let a8 = &mut a16.intra8[n];
            a8.enable_nxn = false;
            a8.valid_cu = true;
            a8.best_modes_8x8_tu = a16.best_modes_8x8_tu;
            a8.best_modes_4x4_tu = a16.best_modes_8x8_tu;
            a8.modes_4x4 = [[MODE_INVALID; NUM_BEST_MODES + 1]; 4];
          }
        }
        // children seen, re-run the parent over a clean neighbor square
        b.scratch.nbr.set(2 * pos_x, 2 * pos_y, 8, false);
      } else {
        for a16 in &mut out.intra32[i32i].intra16 {
          *a16 = Intra16Analysis::default();
        }
        child_cost_least = MAX_INTRA_COST;
      }

      let parent_cost = b.eval_cu(
        1,
        blk >> 4,
        blk,
        MODE_VER,
        child_modes,
        !disable_child,
        p.enable_1cu_4tu,
      );
      let parent = *b.arena.at(1, blk >> 4);

      out.cost_32x32[blk >> 4] = parent_cost;
      {
        let a32 = &mut out.intra32[i32i];
        a32.merge_flag = true;
        a32.best_modes_16x16_tu[..NUM_BEST_MODES]
          .copy_from_slice(&parent.modes_4tu);
        a32.best_modes_16x16_tu[NUM_BEST_MODES] = MODE_INVALID;
        a32.best_modes_32x32_tu[..NUM_BEST_MODES]
          .copy_from_slice(&parent.modes_1tu);
        a32.best_modes_32x32_tu[NUM_BEST_MODES] = MODE_INVALID;
      }

      if parent_cost <= child_cost_least.saturating_add(bias) {
        // the 32x32 wins
        if p.quality.four_tu_eval() {
          for i in 0..4 {
            let sub = *b.arena.at(2, (blk >> 2) + i);
            let a16 = &mut out.intra32[i32i].intra16[i];
            for a8 in &mut a16.intra8 {
              for list in &mut a8.modes_4x4 {
                list[..NUM_BEST_MODES].copy_from_slice(&sub.modes_4tu);
                list[NUM_BEST_MODES] = MODE_INVALID;
              }
            }
          }
        }

        let a32 = &mut out.intra32[i32i];
        a32.split_flag = false;
        for a16 in &mut a32.intra16 {
          a16.split_flag = false;
        }

        best_32_modes[blk >> 4] = parent.modes_1tu[0];
        best_32_costs[blk >> 4] = parent.costs_1tu[0];

        let qscale = b.qp_mod(l1.satd_16x16[blk >> 4][0], fs.log_avg_16x16[0]);
        ctb_satd_cost += i64::from(parent_cost);
        ctb_acc_satd += i64::from(parent.best_satd);
        ctb_mode_bits += i64::from(parent.mode_bits_cost);
        ctb_satd_by_modqp += (i64::from(parent.best_satd)
          << SATD_BY_MODQP_SHIFT)
          / i64::from(qscale);

        blk += 16;
      } else {
        out.intra32[i32i].split_flag = true;
        let child_base = blk >> 2;
        for j in 0..4 {
          let sub = *b.arena.at(2, child_base + j);
          b.scratch.map.update(CU_POS_X[blk], CU_POS_Y[blk], 16, sub.best_mode);
          out.intra32[i32i].intra16[j].split_flag = false;

          let qscale = b.qp_mod(l1.satd_8x8[blk >> 2][0], fs.log_avg_8x8[0]);
          ctb_satd_by_modqp += (i64::from(child_satd[j])
            << SATD_BY_MODQP_SHIFT)
            / i64::from(qscale);
          ctb_mode_bits += i64::from(sub.mode_bits_cost);
          ctb_acc_satd += i64::from(child_satd[j]);
          blk += 4;
        }
        ctb_satd_cost += i64::from(child_cost_least);
        merge_64 = false;
      }
    } else if merge_16 {
      if skip_inter && hint_all_inter(&ed_l1[blk..blk + 4]) {
        out.intra32[i32i].merge_flag = false;
        let a16 = &mut out.intra32[i32i].intra16[i16i];
        a16.valid_cu = true;
        a16.merge_flag = true;
        a16.split_flag = false;
        a16.best_modes_16x16_tu =
          [MODE_DC, MODE_INVALID, MODE_INVALID, MODE_INVALID];
        a16.best_modes_8x8_tu = a16.best_modes_16x16_tu;
        for a8 in &mut a16.intra8 {
          *a8 = Intra8Analysis::default();
        }
        out.cost_16x16[base16] = MAX_INTRA_COST;
        b.scratch.map.update(CU_POS_X[blk], CU_POS_Y[blk], 16, MODE_DC);
        b.scratch.nbr.set(2 * pos_x, 2 * pos_y, 4, true);
        merge_64 = false;
        blk += 4;
        continue;
      }

      // candidate CU of 16x16 against its four 8x8 children
      let mut child_cost_least = 0i32;
      let mut child_satd = [0i32; 4];
      let mut child_modes = [MODE_DC; 4];

      out.intra32[i32i].split_flag = true;
      out.intra32[i32i].merge_flag = false;
      out.intra32[i32i].intra16[i16i].merge_flag = true;

      if !disable_child {
        for j in 0..4 {
          let cblk = blk + j;
          let hint = match ed_l1[cblk].best_mode {
            m if m < 2 => MODE_VER,
            m => m,
          };
          let child_cost = b.eval_cu(
            3,
            cblk,
            cblk,
            hint,
            [MODE_DC; 4],
            false,
            p.enable_4cu_16tu,
          );
          child_cost_least += child_cost;
          let node = *b.arena.at(3, cblk);
          child_satd[j] = node.best_satd;
          child_modes[j] = node.best_mode;

          out.cost_8x8[base8 + (j & 1) + 8 * (j >> 1)] = child_cost;

          let a8 = &mut out.intra32[i32i].intra16[i16i].intra8[j];
          a8.valid_cu = true;
          a8.enable_nxn = false;
          a8.best_modes_8x8_tu[..NUM_BEST_MODES]
            .copy_from_slice(&node.modes_1tu);
          a8.best_modes_8x8_tu[NUM_BEST_MODES] = MODE_INVALID;
          a8.best_modes_4x4_tu[..NUM_BEST_MODES]
            .copy_from_slice(&node.modes_4tu);
          a8.best_modes_4x4_tu[NUM_BEST_MODES] = MODE_INVALID;
          a8.modes_4x4 = [[MODE_INVALID; NUM_BEST_MODES + 1]; 4];
        }
        b.scratch.nbr.set(2 * pos_x, 2 * pos_y, 4, false);
      } else {
        let a16 = &mut out.intra32[i32i].intra16[i16i];
        for a8 in &mut a16.intra8 {
          *a8 = Intra8Analysis::default();
        }
        child_cost_least = MAX_INTRA_COST;
      }

      let parent_cost = b.eval_cu(
        2,
        blk >> 2,
        blk,
        MODE_VER,
        child_modes,
        !disable_child,
        p.enable_1cu_4tu,
      );
      let parent = *b.arena.at(2, blk >> 2);

      out.cost_16x16[base16] = parent_cost;
      accumulate_cost(&mut out.cost_32x32[blk >> 4], parent_cost);

      {
        let a16 = &mut out.intra32[i32i].intra16[i16i];
        a16.valid_cu = true;
        a16.best_modes_16x16_tu[..NUM_BEST_MODES]
          .copy_from_slice(&parent.modes_1tu);
        a16.best_modes_16x16_tu[NUM_BEST_MODES] = MODE_INVALID;
        a16.best_modes_8x8_tu[..NUM_BEST_MODES]
          .copy_from_slice(&parent.modes_4tu);
        a16.best_modes_8x8_tu[NUM_BEST_MODES] = MODE_INVALID;
      }

      if parent_cost <= child_cost_least.saturating_add(bias) {
        out.intra32[i32i].intra16[i16i].split_flag = false;

        let qscale = b.qp_mod(l1.satd_16x16[blk >> 4][0], fs.log_avg_8x8[0]);
        ctb_satd_cost += i64::from(parent_cost);
        ctb_acc_satd += i64::from(parent.best_satd);
        ctb_satd_by_modqp += (i64::from(parent.best_satd)
          << SATD_BY_MODQP_SHIFT)
          / i64::from(qscale);
        ctb_mode_bits += i64::from(parent.mode_bits_cost);
        blk += 4;
      } else {
        let qscale = b.qp_mod(l1.satd_8x8[blk >> 2][1], fs.log_avg_8x8[1]);
        out.intra32[i32i].intra16[i16i].split_flag = true;
        for j in 0..4 {
          let sub = *b.arena.at(3, blk);
          b.scratch.map.update(CU_POS_X[blk], CU_POS_Y[blk], 8, sub.best_mode);

          if p.quality.four_tu_eval() {
            let a8 = &mut out.intra32[i32i].intra16[i16i].intra8[j];
            for list in &mut a8.modes_4x4 {
              list[..NUM_BEST_MODES].copy_from_slice(&sub.modes_4tu);
              list[NUM_BEST_MODES] = MODE_INVALID;
            }
          }
          ctb_satd_by_modqp += (i64::from(child_satd[j])
            << SATD_BY_MODQP_SHIFT)
            / i64::from(qscale);
          ctb_mode_bits += i64::from(sub.mode_bits_cost);
          ctb_acc_satd += i64::from(child_satd[j]);
          blk += 1;
        }
        ctb_satd_cost += i64::from(child_cost_least);
      }
      merge_64 = false;
    } else {
      // no coarse merge: four 8x8 CUs, each bracketed against its 4x4 PUs
      let qscale = b.qp_mod(l1.satd_8x8[blk >> 2][1], fs.log_avg_8x8[1]);

      merge_64 = false;
      out.intra32[i32i].merge_flag = false;
      {
        let a16 = &mut out.intra32[i32i].intra16[i16i];
        a16.merge_flag = false;
        a16.split_flag = true;
        a16.valid_cu = true;
        a16.best_modes_8x8_tu =
          [MODE_PLANAR, MODE_DC, MODE_INVALID, MODE_INVALID];
        a16.best_modes_16x16_tu =
          [MODE_PLANAR, MODE_DC, MODE_INVALID, MODE_INVALID];
      }

      for i in 0..4 {
        let pos_x = CU_POS_X[blk] as usize;
        let pos_y = CU_POS_Y[blk] as usize;
        if pos_x >= num8_x || pos_y >= num8_y {
          out.intra32[i32i].intra16[i16i].valid_cu = false;
          blk += 1;
          continue;
        }

        if skip_inter && ed_l1[blk].intra_inter == IntraInterHint::Inter {
          let a8 = &mut out.intra32[i32i].intra16[i16i].intra8[i];
          a8.valid_cu = true;
          a8.enable_nxn = false;
          a8.best_modes_8x8_tu =
            [MODE_DC, MODE_INVALID, MODE_INVALID, MODE_INVALID];
          a8.best_modes_4x4_tu = a8.best_modes_8x8_tu;
          out.cost_8x8[pos_x + pos_y * 8] = MAX_INTRA_COST;
          b.scratch.map.update(CU_POS_X[blk], CU_POS_Y[blk], 8, MODE_DC);
          b.scratch.nbr.set(2 * pos_x, 2 * pos_y, 2, true);
          blk += 1;
          continue;
        }

        b.pu_calc_8x8(blk);
        let mut child_cost_least = 0i32;
        let mut child_satd = [0i32; 4];
        let mut child_modes = [MODE_DC; 4];
        for n in 0..4 {
          let sub = *b.arena.at(4, 4 * blk + n);
          child_cost_least += sub.best_cost;
          child_satd[n] = sub.best_satd;
          child_modes[n] = sub.best_mode;
        }

        let parent_cost = if !disable_child {
          b.scratch.nbr.set(2 * pos_x, 2 * pos_y, 2, false);
          b.eval_cu(3, blk, blk, MODE_VER, child_modes, true, p.enable_1cu_4tu)
        } else {
          MAX_INTRA_COST
        };
        let parent = *b.arena.at(3, blk);

        {
          let a8 = &mut out.intra32[i32i].intra16[i16i].intra8[i];
          a8.valid_cu = true;
          a8.enable_nxn = false;
          a8.best_modes_8x8_tu[..NUM_BEST_MODES]
            .copy_from_slice(&parent.modes_1tu);
          a8.best_modes_8x8_tu[NUM_BEST_MODES] = MODE_INVALID;
          a8.best_modes_4x4_tu[..NUM_BEST_MODES]
            .copy_from_slice(&parent.modes_4tu);
          a8.best_modes_4x4_tu[NUM_BEST_MODES] = MODE_INVALID;
        }

        let cost8 = pos_x + pos_y * 8;
        if parent_cost <= child_cost_least.saturating_add(bias) {
          out.cost_8x8[cost8] = parent_cost;
          ctb_satd_cost += i64::from(parent_cost);
          ctb_satd_by_modqp += (i64::from(parent.best_satd)
            << SATD_BY_MODQP_SHIFT)
            / i64::from(qscale);
          ctb_mode_bits += i64::from(parent.mode_bits_cost);
          ctb_acc_satd += i64::from(parent.best_satd);
          accumulate_cost(&mut out.cost_16x16[base16], parent_cost);
          accumulate_cost(&mut out.cost_32x32[blk >> 4], parent_cost);
        } else {
          out.cost_8x8[cost8] = child_cost_least;
          accumulate_cost(&mut out.cost_16x16[base16], child_cost_least);
          accumulate_cost(&mut out.cost_32x32[blk >> 4], child_cost_least);
          ctb_satd_cost += i64::from(child_cost_least);
          for n in 0..4 {
            let sub = *b.arena.at(4, 4 * blk + n);
            ctb_satd_by_modqp += (i64::from(child_satd[n])
              << SATD_BY_MODQP_SHIFT)
              / i64::from(qscale);
            ctb_mode_bits += i64::from(sub.mode_bits_cost);
            ctb_acc_satd += i64::from(child_satd[n]);
          }

          out.intra32[i32i].intra16[i16i].intra8[i].enable_nxn = true;
          // the winning PU modes become the map entries of this 8x8
          let x = 2 * CU_POS_X[blk] as usize + 1;
          let y = 2 * CU_POS_Y[blk] as usize + 1;
          for n in 0..4 {
            let sub = *b.arena.at(4, 4 * blk + n);
            b.scratch.map.m[y + (n >> 1)][x + (n & 1)] = sub.best_mode;
          }
        }

        let a8 = &mut out.intra32[i32i].intra16[i16i].intra8[i];
        for n in 0..4 {
          let sub = *b.arena.at(4, 4 * blk + n);
          a8.modes_4x4[n][..NUM_BEST_MODES].copy_from_slice(&sub.modes_1tu);
          a8.modes_4x4[n][NUM_BEST_MODES] = MODE_INVALID;
        }

        blk += 1;
      }
    }
  }

  // 64x64 merge: all four 32x32 blocks merged and agree on a mode, or a
  // re-evaluation of the whole CTB beats their summed cost
  if merge_64 {
    let act_mode = best_32_modes[0];
    let mut best_mode = act_mode;
    let mut agree =
      best_32_modes.iter().filter(|&&m| m == act_mode).count() == 4;

    out.cost_64x64 = out.cost_32x32.iter().sum();

    if !agree {
      let child_cost_64: i32 = best_32_costs.iter().sum();
      let mut cost = MAX_INTRA_COST;
      let mut best_mode_temp = MODE_PLANAR;
      for &m in &best_32_modes {
        let hint = if m < 2 { MODE_VER } else { m };
        b.scratch.nbr.set(0, 0, 16, false);
        let r =
          b.mode_eval_filtering(0, 0, 64, hint, [MODE_DC; 4], false, false);
        if cost > r.best_cost {
          cost = r.best_cost;
          best_mode_temp = r.best_mode;
          let node = b.arena.at_mut(0, 0);
          node.best_mode = r.best_mode;
          node.best_cost = r.best_cost;
          node.best_satd = r.best_satd;
          node.mode_bits_cost = r.mode_bits_cost;
        }
      }
      if cost < child_cost_64 {
        agree = true;
        best_mode = best_mode_temp;
        out.cost_64x64 = cost;
        let node = *b.arena.at(0, 0);
        ctb_satd_cost = i64::from(cost);
        ctb_mode_bits = i64::from(node.mode_bits_cost);
        ctb_acc_satd = i64::from(node.best_satd);
      }
    }

    if agree {
      out.split_flag = false;
      for a32 in &mut out.intra32 {
        for a16 in &mut a32.intra16 {
          a16.merge_flag = false;
        }
      }
      out.best_modes_64x64 = cand_list_64(best_mode);
      b.scratch.map.update(0, 0, 64, best_mode);
      b.scratch.nbr.set(0, 0, 16, true);

      let qscale = b.qp_mod(l1.satd_32x32[0], fs.log_avg_32x32[0]);
      ctb_satd_by_modqp =
        (ctb_satd_cost << SATD_BY_MODQP_SHIFT) / i64::from(qscale);
    }
  }

  // activity factors for the QP modulation of every CU size, defaulting to
  // unity wherever the CTB is incomplete
  if ctb_wd == MAX_CTB_SIZE && ctb_ht == MAX_CTB_SIZE {
    for (af, &satd, &avg) in izip!(
      &mut out.act_factor_64[..3],
      &l1.satd_32x32[..3],
      &fs.log_avg_32x32
    ) {
      *af = act_factor(p, satd, avg);
    }
    out.act_factor_64[3] =
      act_factor(p, l1.satd_32x32[3], 2.0 + fs.log_avg_16x16[0]);
  }

  let pos32 = (ctb_wd / 16).min(ctb_ht / 16).min(4);
  for i in 0..pos32 {
    for (af, &satd, &avg) in izip!(
      &mut out.act_factor_32[i],
      &l1.satd_16x16[i],
      &fs.log_avg_16x16
    ) {
      *af = act_factor(p, satd, avg);
    }
  }

  let pos16 = (ctb_wd / 4).min(ctb_ht / 4).min(16);
  for i in 0..16 {
    if i < pos16 {
      for v in 0..2 {
        out.act_factor_16[i][v] =
          act_factor(p, l1.satd_8x8[i][v], fs.log_avg_8x8[v]);
      }
    }
    out.act_factor_8[i] = out.act_factor_16[i][1];
    acc.act_factor += i64::from(out.act_factor_8[i]);
  }

  out.acc_satd = ctb_acc_satd as i32;
  out.acc_mpm_bits = ctb_mode_bits;

  acc.satd_cost += ctb_satd_cost;
  acc.satd_by_modqp_q10 += ctb_satd_by_modqp;
  acc.mode_bits_cost += ctb_mode_bits;
  acc.satd += ctb_acc_satd;

  out
}

#[cfg(test)]
pub mod test {
  use super::*;

  fn test_plane(
    w: usize, h: usize, f: impl Fn(usize, usize) -> u8,
  ) -> LayerPlane {
    let mut p = LayerPlane::new(w, h, w, h, 16, 16, 20, 20);
    for y in 0..h {
      let row: Vec<u8> = (0..w).map(|x| f(x, y)).collect();
      p.write_row(y, &row);
    }
    p.pad_boundary();
    p
  }

  fn merged_ed(mode: u8) -> (Vec<EdBlock>, Vec<EdBlock>) {
    let blk = EdBlock {
      best_mode: mode,
      merge_success: true,
      best_merge_mode: mode,
      satd_4x4: Measure::Value(0),
      intra_inter: IntraInterHint::Unknown,
    };
    (vec![blk; 64], vec![blk; 16])
  }

  fn unmerged_ed(mode: u8) -> (Vec<EdBlock>, Vec<EdBlock>) {
    let blk = EdBlock {
      best_mode: mode,
      merge_success: false,
      best_merge_mode: mode,
      satd_4x4: Measure::Value(20),
      intra_inter: IntraInterHint::Unknown,
    };
    (vec![blk; 64], vec![blk; 16])
  }

  fn mark_inter(blocks: &mut [EdBlock]) {
    for b in blocks {
      b.intra_inter = IntraInterHint::Inter;
    }
  }

  fn params() -> BracketParams {
    BracketParams::new(&AnalysisConfig::default())
  }

  #[test]
  fn mpm_list_follows_the_neighbor_modes() {
    let lambda = 4 << LAMBDA_Q_SHIFT;
    // equal angular neighbors bracket the shared mode
    let mb = populate_mode_bits_cost(20, 20, true, true, 1, lambda);
    assert_eq!(mb.cands, [20, 19, 21]);
    assert_eq!(mb.cost[20], rate_cost(4, lambda));
    assert_eq!(mb.cost[19], rate_cost(6, lambda));
    assert_eq!(mb.cost[7], rate_cost(12, lambda));
    assert_eq!(mb.bits[20], 2);
    // nothing available: planar, DC, vertical
    let mb = populate_mode_bits_cost(20, 20, false, false, 1, lambda);
    assert_eq!(mb.cands, [MODE_PLANAR, MODE_DC, MODE_VER]);
    // ctb top row forces the above neighbor to DC
    let mb = populate_mode_bits_cost(20, 10, true, true, 0, lambda);
    assert_eq!(mb.cands, [10, MODE_DC, MODE_PLANAR]);
    // an invalid left neighbor counts as unavailable
    let mb = populate_mode_bits_cost(20, MODE_INVALID, true, true, 1, lambda);
    assert_eq!(mb.cands[0], 20);
    // wrap-around at the angular extremes
    let mb = populate_mode_bits_cost(2, 2, true, true, 1, lambda);
    assert_eq!(mb.cands, [2, 33, 3]);
  }

  #[test]
  fn nbr_map_tracks_coded_blocks() {
    let mut nbr = NbrMap::for_ctb(1, 1, 64, 64);
    // top and left borders come from the neighboring ctbs
    let f = nbr.flags(0, 0, 2);
    assert!(f.left && f.top && f.top_left && f.top_right);
    // interior block sees nothing until something is coded
    let f = nbr.flags(4, 4, 2);
    assert!(!f.left && !f.top);
    nbr.set(2, 4, 2, true);
    assert!(nbr.flags(4, 4, 2).left);
    nbr.set(4, 2, 4, true);
    let f = nbr.flags(4, 4, 2);
    assert!(f.top && f.top_right);
    // the first ctb of the picture has no borders at all
    let nbr = NbrMap::for_ctb(0, 0, 64, 64);
    let f = nbr.flags(0, 0, 2);
    assert!(
      !f.left && !f.top && !f.top_left && !f.top_right && !f.bottom_left
    );
  }

  #[test]
  fn cu_arena_levels_do_not_alias() {
    let mut arena = CuArena::new();
    arena.at_mut(1, 3).best_mode = 7;
    arena.at_mut(2, 15).best_mode = 9;
    arena.at_mut(4, 255).best_mode = 11;
    assert_eq!(arena.at(1, 3).best_mode, 7);
    assert_eq!(arena.at(2, 15).best_mode, 9);
    assert_eq!(arena.at(4, 255).best_mode, 11);
    arena.reset();
    assert_eq!(arena.at(1, 3).best_mode, MODE_DC);
  }

  #[test]
  fn flat_ctb_merges_to_a_single_64x64() {
    let plane = test_plane(64, 64, |_, _| 128);
    let p = params();
    let (l1, l2) = merged_ed(MODE_PLANAR);
    let mut acc = BracketAccum::default();
    let out = bracketing_analysis(
      &p,
      &plane,
      0,
      0,
      &l1,
      &l2,
      &CtbLevel1Stats::default(),
      &FrameStats::default(),
      &KernelTable::detect(),
      &mut acc,
    );
    assert!(!out.split_flag);
    assert!(out.cost_64x64 < MAX_INTRA_COST);
    // flat content codes as planar or DC everywhere
    assert!(out.best_modes_64x64[0] <= 1);
    assert!(out.intra32.iter().all(|a| !a.split_flag));
    // no layer-1 measures were attached, so modulation stays at unity
    assert_eq!(out.act_factor_8, [ACT_FACTOR_UNITY; 16]);
    assert!(acc.satd_cost >= 0);
  }

  #[test]
  fn unmerged_ctb_brackets_every_8x8() {
    let plane = test_plane(64, 64, |x, y| ((x * 7 + y * 13) % 256) as u8);
    let p = params();
    let (l1, l2) = unmerged_ed(18);
    let mut acc = BracketAccum::default();
    let out = bracketing_analysis(
      &p,
      &plane,
      0,
      0,
      &l1,
      &l2,
      &CtbLevel1Stats::default(),
      &FrameStats::default(),
      &KernelTable::detect(),
      &mut acc,
    );
    assert!(out.split_flag);
    for a32 in &out.intra32 {
      assert!(a32.split_flag);
      assert!(!a32.merge_flag);
      for a16 in &a32.intra16 {
        assert!(a16.valid_cu);
        assert!(a16.split_flag);
        for a8 in &a16.intra8 {
          assert!(a8.valid_cu);
          // candidate lists are 255-terminated
          assert_eq!(a8.best_modes_8x8_tu[NUM_BEST_MODES], MODE_INVALID);
          assert_eq!(a8.modes_4x4[0][NUM_BEST_MODES], MODE_INVALID);
          assert!(a8.modes_4x4[0][0] < 35);
        }
      }
    }
    // every 8x8 slot got a real cost
    assert!(out.cost_8x8.iter().all(|&c| c < MAX_INTRA_COST));
    assert!(acc.satd_cost > 0);
    assert!(acc.mode_bits_cost > 0);
  }

  #[test]
  fn vertical_edges_decide_vertical_modes() {
    // strong vertical stripes; the second CTB row has a real reference row
    // above it, so the vertical predictor is exact everywhere
    let plane =
      test_plane(64, 128, |x, _| if (x / 4) % 2 == 0 { 60 } else { 200 });
    let p = params();
    let (l1, l2) = merged_ed(26);
    let mut acc = BracketAccum::default();
    let out = bracketing_analysis(
      &p,
      &plane,
      0,
      1,
      &l1,
      &l2,
      &CtbLevel1Stats::default(),
      &FrameStats::default(),
      &KernelTable::detect(),
      &mut acc,
    );
    if out.split_flag {
      for a32 in out.intra32.iter().filter(|a| a.valid_cu) {
        let m32 = a32.best_modes_32x32_tu[0];
        assert!((24..=28).contains(&m32), "mode {m32}");
      }
    } else {
      let m = out.best_modes_64x64[0];
      assert!((24..=28).contains(&m), "mode {m}");
    }

    // without coarse merges the bracket never rises above 8x8: every level
    // above it stays split and unmerged
    let (l1, l2) = unmerged_ed(26);
    let mut acc = BracketAccum::default();
    let out = bracketing_analysis(
      &p,
      &plane,
      0,
      1,
      &l1,
      &l2,
      &CtbLevel1Stats::default(),
      &FrameStats::default(),
      &KernelTable::detect(),
      &mut acc,
    );
    assert!(out.split_flag);
    for a32 in &out.intra32 {
      assert!(a32.split_flag && !a32.merge_flag);
      for a16 in &a32.intra16 {
        assert!(a16.split_flag && !a16.merge_flag);
        let m = a16.intra8[0].best_modes_8x8_tu[0];
        assert!((24..=28).contains(&m), "mode {m}");
      }
    }
  }

  #[test]
  fn inter_hints_skip_intra_on_non_intra_slices() {
    let plane = test_plane(64, 64, |x, y| ((x * 7 + y * 13) % 256) as u8);
    let cfg = AnalysisConfig {
      slice_type: SliceType::P,
      ..Default::default()
    };
    let p = BracketParams::new(&cfg);
    let (mut l1, l2) = merged_ed(18);
    mark_inter(&mut l1);
    let mut acc = BracketAccum::default();
    let out = bracketing_analysis(
      &p,
      &plane,
      0,
      0,
      &l1,
      &l2,
      &CtbLevel1Stats::default(),
      &FrameStats::default(),
      &KernelTable::detect(),
      &mut acc,
    );
    // every merged 32x32 stands in as DC at maximal cost
    assert!(out.split_flag);
    assert_eq!(out.cost_32x32, [MAX_INTRA_COST; 4]);
    for a32 in &out.intra32 {
      assert!(a32.merge_flag && !a32.split_flag);
      assert_eq!(
        a32.best_modes_32x32_tu,
        [MODE_DC, MODE_INVALID, MODE_INVALID, MODE_INVALID]
      );
    }
    // nothing was measured
    assert_eq!(acc.satd_cost, 0);
    assert_eq!(acc.satd, 0);

    // the same hints on an intra slice change nothing
    let pi = params();
    let mut acc = BracketAccum::default();
    let out = bracketing_analysis(
      &pi,
      &plane,
      0,
      0,
      &l1,
      &l2,
      &CtbLevel1Stats::default(),
      &FrameStats::default(),
      &KernelTable::detect(),
      &mut acc,
    );
    assert!(out.cost_32x32.iter().all(|&c| c < MAX_INTRA_COST));
    assert!(acc.satd_cost > 0);
  }

  #[test]
  fn unmerged_inter_hints_skip_at_8x8_granularity() {
    let plane = test_plane(64, 64, |x, y| ((x * 7 + y * 13) % 256) as u8);
    let cfg = AnalysisConfig {
      slice_type: SliceType::P,
      ..Default::default()
    };
    let p = BracketParams::new(&cfg);
    let (mut l1, l2) = unmerged_ed(18);
    mark_inter(&mut l1);
    let mut acc = BracketAccum::default();
    let out = bracketing_analysis(
      &p,
      &plane,
      0,
      0,
      &l1,
      &l2,
      &CtbLevel1Stats::default(),
      &FrameStats::default(),
      &KernelTable::detect(),
      &mut acc,
    );
    assert_eq!(out.cost_8x8, [MAX_INTRA_COST; 64]);
    for a32 in &out.intra32 {
      for a16 in &a32.intra16 {
        for a8 in &a16.intra8 {
          assert!(a8.valid_cu);
          assert!(!a8.enable_nxn);
          assert_eq!(a8.best_modes_8x8_tu[0], MODE_DC);
          assert_eq!(a8.best_modes_8x8_tu[1], MODE_INVALID);
        }
      }
    }
    assert_eq!(acc.satd, 0);
  }

  #[test]
  fn map_writes_are_idempotent() {
    let mut nbr = NbrMap::for_ctb(1, 1, 64, 64);
    nbr.set(2, 4, 2, true);
    let seen = nbr.flags(4, 4, 2);
    assert!(seen.left);
    nbr.set(2, 4, 2, true);
    assert_eq!(nbr.flags(4, 4, 2), seen);
    nbr.set(2, 4, 2, false);
    nbr.set(2, 4, 2, false);
    assert!(!nbr.flags(4, 4, 2).left);

    let mut map = ModeMap::new();
    map.update(2, 2, 16, 20);
    map.update(2, 2, 16, 20);
    assert_eq!(map.left_top(4, 2), (20, MODE_INVALID));
    // a later decision overwrites cleanly
    map.update(2, 2, 16, 7);
    assert_eq!(map.left_top(4, 2), (7, MODE_INVALID));
  }

  #[test]
  fn partial_ctb_marks_out_of_picture_cus_invalid() {
    // picture narrower than one ctb: right half of the ctb is invalid
    let plane = test_plane(32, 64, |x, y| ((x ^ y) as u8).wrapping_mul(3));
    let p = params();
    let (l1, l2) = unmerged_ed(10);
    let mut acc = BracketAccum::default();
    let out = bracketing_analysis(
      &p,
      &plane,
      0,
      0,
      &l1,
      &l2,
      &CtbLevel1Stats::default(),
      &FrameStats::default(),
      &KernelTable::detect(),
      &mut acc,
    );
    assert!(!out.intra32[1].valid_cu);
    assert!(!out.intra32[3].valid_cu);
    assert!(out.intra32[0].valid_cu);
    // activity factors of the missing quads stay at unity
    assert_eq!(out.act_factor_32[2], [ACT_FACTOR_UNITY; 3]);
    assert_eq!(out.act_factor_64, [ACT_FACTOR_UNITY; 4]);
  }

  #[test]
  fn merged_measures_modulate_the_activity_factors() {
    let plane = test_plane(64, 64, |x, y| ((3 * x + 5 * y) % 251) as u8);
    let p = params();
    let (l1, l2) = merged_ed(MODE_PLANAR);
    let stats = CtbLevel1Stats {
      satd_8x8: [[Measure::Value(4000), Measure::Value(900)]; 16],
      satd_16x16: [[Measure::Value(16000); 3]; 4],
      satd_32x32: [Measure::Value(60000); 4],
      ..Default::default()
    };
    let fs = FrameStats {
      log_avg_8x8: [12.0; 2],
      log_avg_16x16: [16.0; 3],
      log_avg_32x32: [20.0; 3],
      ..Default::default()
    };
    let mut acc = BracketAccum::default();
    let out = bracketing_analysis(
      &p,
      &plane,
      0,
      0,
      &l1,
      &l2,
      &stats,
      &fs,
      &KernelTable::detect(),
      &mut acc,
    );
    // busy blocks against a calmer frame average raise the factor
    assert!(out.act_factor_16[0][0] > ACT_FACTOR_UNITY);
    assert!(out.act_factor_64[0] > ACT_FACTOR_UNITY);
    assert_eq!(out.act_factor_8[0], out.act_factor_16[0][1]);
    assert!(acc.act_factor > 16 * i64::from(ACT_FACTOR_UNITY));
  }
}
