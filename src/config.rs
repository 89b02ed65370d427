// Copyright (c) 2026, the hevla contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use thiserror::Error;

/// Largest coding tree block dimension handled by the analysis.
pub const MAX_CTB_SIZE: usize = 64;

/// Q format of the SATD lambda values.
pub const LAMBDA_Q_SHIFT: u32 = 8;

/// Cost assigned to blocks that were never evaluated. Large enough that a
/// real candidate always wins a comparison, small enough that summing the
/// costs of a CTB worth of blocks cannot overflow an `i64` accumulator.
pub const MAX_INTRA_COST: i32 = 1 << 30;

/// Number of best-mode candidates kept per CU for downstream RDO seeding.
pub const NUM_BEST_MODES: usize = 3;

/// Number of pyramid layers, full resolution included.
pub const NUM_LAYERS: usize = 3;

/// Rate cost of signalling `bits_x2 / 2` bits, weighted by a Q8 lambda and
/// clipped to 30 bits. The doubled-bits input keeps half-bit costs (1.5, 2.5,
/// 5.5 bits) in integer arithmetic.
#[inline]
pub(crate) const fn rate_cost(bits_x2: u32, lambda: u32) -> i32 {
  let cost = (bits_x2 as u64 * lambda as u64) >> (LAMBDA_Q_SHIFT + 1);
  if cost > (1 << 30) {
    1 << 30
  } else {
    cost as i32
  }
}

/// Quality presets, best quality first. Each preset fixes which optional
/// search refinements the analysis runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityPreset {
  HighQuality,
  Quality,
  #[default]
  Medium,
  HighSpeed,
  ExtremeSpeed,
}

impl QualityPreset {
  /// The second, single-step refinement around the best angular mode in the
  /// coarse-layer decision.
  pub(crate) fn ed_fine_refine(self) -> bool {
    self <= QualityPreset::Medium
  }

  /// SATD (instead of SAD) costing of the 8x8 merge candidates.
  pub(crate) fn ed_satd_merge(self) -> bool {
    self <= QualityPreset::Medium
  }

  /// The two-step spread (best angular mode +/- 2) in full-resolution mode
  /// evaluation.
  pub(crate) fn bracket_mode_spread(self) -> bool {
    self <= QualityPreset::Medium
  }

  /// Evaluation of the four-TU partition in addition to the one-TU partition
  /// at full resolution.
  pub(crate) fn four_tu_eval(self) -> bool {
    self <= QualityPreset::Quality
  }

  /// Skips the child-CU TU decision on non-intra slices.
  pub(crate) fn disable_child_cu_decide(self) -> bool {
    self == QualityPreset::ExtremeSpeed
  }
}

/// Slice type of the picture under analysis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SliceType {
  #[default]
  I,
  P,
  B,
}

impl SliceType {
  pub fn is_intra(self) -> bool {
    self == SliceType::I
  }
}

/// Quantizer tables supplied by the rate-control collaborator.
#[derive(Clone, Debug)]
pub struct RcQuantTables {
  /// Maps a quantizer scale to a QP. Indexed by qscale, so the table must
  /// cover `0..=max_qscale`.
  pub qscale_to_qp: Vec<i32>,
  pub min_qscale: i32,
  pub max_qscale: i32,
  pub min_qp: i32,
  pub max_qp: i32,
}

impl RcQuantTables {
  /// Tables for the standard HEVC quantizer, `qscale = 2^((qp - 4) / 6)` in
  /// Q3. Stands in when no rate-control collaborator is attached.
  pub fn hevc_default() -> Self {
    let min_qscale = 1;
    let max_qscale = 1824; // qp 51 in q3
    let qscale_to_qp = (0..=max_qscale)
      .map(|q| {
        if q == 0 {
          0
        } else {
          let qp = (6.0 * (q as f64 / 8.0).log2()).round() as i32 + 4;
          qp.clamp(0, 51)
        }
      })
      .collect();
    RcQuantTables {
      qscale_to_qp,
      min_qscale,
      max_qscale,
      min_qp: 0,
      max_qp: 51,
    }
  }
}

impl Default for RcQuantTables {
  fn default() -> Self {
    RcQuantTables::hevc_default()
  }
}

/// Enumeration of possible invalid configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[non_exhaustive]
pub enum InvalidConfig {
  /// The width is invalid.
  #[error("invalid width {0} (expected >= 64, <= 16384, even)")]
  InvalidWidth(usize),
  /// The height is invalid.
  #[error("invalid height {0} (expected >= 64, <= 16384, even)")]
  InvalidHeight(usize),
  /// The lambda is invalid.
  #[error("invalid lambda {0} (expected > 0)")]
  InvalidLambda(u32),
  /// The worker thread count is invalid.
  #[error("invalid thread count {0} (expected > 0)")]
  InvalidThreadCount(usize),
  /// The frame quantizer scale is outside the rate-control bounds.
  #[error("invalid frame qscale {actual} (expected >= {min}, <= {max})")]
  InvalidFrameQscale {
    /// The actual value.
    actual: i32,
    /// The minimal supported value.
    min: i32,
    /// The maximal supported value.
    max: i32,
  },
  /// The qscale-to-qp table does not cover the configured qscale range.
  #[error("qscale table too short: {len} entries for max qscale {max}")]
  QscaleTableTooShort {
    /// Entries in the table.
    len: usize,
    /// The configured maximal qscale.
    max: i32,
  },
  /// The QP modulation strength is invalid.
  #[error("invalid modulation strength {0} (expected finite, >= 0)")]
  InvalidModStrength(f32),
}

/// Configuration of one analysis instance. Immutable once validated; all
/// mutable working state lives in per-thread scratch objects.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
  /// Picture width in luma samples.
  pub width: usize,
  /// Picture height in luma samples.
  pub height: usize,
  pub quality: QualityPreset,
  pub slice_type: SliceType,
  /// Frame quantizer scale in the rate-control Q3 domain.
  pub frame_qscale: i32,
  /// Open-loop SATD lambda for the full-resolution layer, Q8.
  pub lambda: u32,
  /// Perceptual QP modulation strength. Zero disables modulation.
  pub mod_strength: f32,
  /// Worker threads for the row scheduler.
  pub num_threads: usize,
  pub rc: RcQuantTables,
}

impl Default for AnalysisConfig {
  fn default() -> Self {
    AnalysisConfig {
      width: 640,
      height: 480,
      quality: QualityPreset::default(),
      slice_type: SliceType::default(),
      frame_qscale: 256,
      lambda: 4 << LAMBDA_Q_SHIFT,
      mod_strength: 1.0,
      num_threads: 1,
      rc: RcQuantTables::hevc_default(),
    }
  }
}

impl AnalysisConfig {
  /// # Errors
  ///
  /// Returns `InvalidConfig` if the configuration is malformed. Analysis
  /// entry points require a validated configuration; all later contract
  /// violations are asserted, not reported.
  pub fn validate(&self) -> Result<(), InvalidConfig> {
    if self.width < 64 || self.width > 16384 || self.width % 2 != 0 {
      return Err(InvalidConfig::InvalidWidth(self.width));
    }
    if self.height < 64 || self.height > 16384 || self.height % 2 != 0 {
      return Err(InvalidConfig::InvalidHeight(self.height));
    }
    if self.lambda == 0 {
      return Err(InvalidConfig::InvalidLambda(self.lambda));
    }
    if self.num_threads == 0 {
      return Err(InvalidConfig::InvalidThreadCount(self.num_threads));
    }
    if self.frame_qscale < self.rc.min_qscale
      || self.frame_qscale > self.rc.max_qscale
    {
      return Err(InvalidConfig::InvalidFrameQscale {
        actual: self.frame_qscale,
        min: self.rc.min_qscale,
        max: self.rc.max_qscale,
      });
    }
    if self.rc.qscale_to_qp.len() <= self.rc.max_qscale as usize {
      return Err(InvalidConfig::QscaleTableTooShort {
        len: self.rc.qscale_to_qp.len(),
        max: self.rc.max_qscale,
      });
    }
    if !self.mod_strength.is_finite() || self.mod_strength < 0.0 {
      return Err(InvalidConfig::InvalidModStrength(self.mod_strength));
    }
    Ok(())
  }

  /// SATD lambda for a pyramid layer. The coarse layers run with reduced
  /// lambda, floored at 1.0 in Q8.
  pub(crate) fn layer_lambda(&self, layer: usize) -> u32 {
    let floor = 1 << LAMBDA_Q_SHIFT;
    match layer {
      0 => self.lambda,
      1 => floor.max(self.lambda * 3 / 4),
      _ => floor.max(self.lambda / 2),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn validate_rejects_odd_dimensions() {
    let cfg = AnalysisConfig { width: 641, ..Default::default() };
    assert_eq!(cfg.validate(), Err(InvalidConfig::InvalidWidth(641)));
    let cfg = AnalysisConfig { height: 479, ..Default::default() };
    assert_eq!(cfg.validate(), Err(InvalidConfig::InvalidHeight(479)));
  }

  #[test]
  fn validate_rejects_out_of_range_qscale() {
    let cfg = AnalysisConfig { frame_qscale: 0, ..Default::default() };
    assert!(matches!(
      cfg.validate(),
      Err(InvalidConfig::InvalidFrameQscale { .. })
    ));
  }

  #[test]
  fn validate_accepts_default() {
    assert_eq!(AnalysisConfig::default().validate(), Ok(()));
  }

  #[test]
  fn default_qscale_table_is_monotonic() {
    let rc = RcQuantTables::hevc_default();
    assert!(rc.qscale_to_qp.len() > rc.max_qscale as usize);
    for w in rc.qscale_to_qp.windows(2) {
      assert!(w[0] <= w[1]);
    }
    // q3 qscale of 8 is one qstep, qp 4 by definition
    assert_eq!(rc.qscale_to_qp[8], 4);
  }

  #[test]
  fn rate_cost_halves_bits() {
    let lambda = 4 << LAMBDA_Q_SHIFT;
    // 5.5 bits at lambda 4.0 is 22
    assert_eq!(rate_cost(11, lambda), 22);
    // 1.5 bits at lambda 4.0 is 6
    assert_eq!(rate_cost(3, lambda), 6);
  }
}
