// Copyright (c) 2026, the hevla contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Row-parallel work scheduling.
//!
//! Every pass of the pre-analysis decomposes into independent block rows:
//! workers pull row indices from a channel, compute into owned buffers over
//! the shared immutable input, and send the buffers back tagged with their
//! row. The collector places them by index, so the result is identical for
//! any worker count.

use crossbeam_channel::unbounded;

use crate::bracketing::{
  bracketing_analysis, BracketAccum, BracketParams, CtbAnalysis,
};
use crate::config::MAX_CTB_SIZE;
use crate::early_decision::{
  ed_process_row, CtbLevel1Stats, EdAccum, EdBlock, EdParams,
};
use crate::kernels::KernelTable;
use crate::pyramid::{scale_block_row, LayerPlane};
use crate::stats::FrameStats;

/// Early-decision results of a whole coarse layer, rows concatenated in
/// picture order.
pub(crate) struct EdLayerOutput {
  pub blocks: Vec<EdBlock>,
  pub stats: Vec<CtbLevel1Stats>,
  pub acc: EdAccum,
}

pub(crate) struct RowScheduler {
  num_threads: usize,
}

impl RowScheduler {
  pub fn new(num_threads: usize) -> Self {
    let num_threads = if num_threads == 0 {
      std::thread::available_parallelism().map_or(1, |n| n.get())
    } else {
      num_threads
    };
    RowScheduler { num_threads }
  }

  /// Maps `f` over `0..num_rows` on the worker pool, returning the results
  /// in row order.
  fn run_rows<T, F>(&self, num_rows: usize, f: F) -> Vec<T>
  where
    T: Send,
    F: Fn(usize) -> T + Sync,
  {
    if self.num_threads <= 1 || num_rows <= 1 {
      return (0..num_rows).map(f).collect();
    }

    let mut out: Vec<Option<T>> = (0..num_rows).map(|_| None).collect();
    std::thread::scope(|s| {
      let (job_tx, job_rx) = unbounded::<usize>();
      let (res_tx, res_rx) = unbounded::<(usize, T)>();
      for r in 0..num_rows {
        // the receiver outlives the sends, this cannot fail
        let _ = job_tx.send(r);
      }
      drop(job_tx);

      for _ in 0..self.num_threads.min(num_rows) {
        let job_rx = job_rx.clone();
        let res_tx = res_tx.clone();
        let f = &f;
        s.spawn(move || {
          while let Ok(r) = job_rx.recv() {
            if res_tx.send((r, f(r))).is_err() {
              break;
            }
          }
        });
      }
      drop(res_tx);

      while let Ok((r, v)) = res_rx.recv() {
        out[r] = Some(v);
      }
    });
    out.into_iter().flatten().collect()
  }

  /// Decimates `src` into `dst` block row by block row, then pads the
  /// result. `dst` must be the next pyramid layer of `src`.
  pub fn scale_layer(
    &self, src: &LayerPlane, dst: &mut LayerPlane, k: &KernelTable,
  ) {
    debug_assert!(dst.valid_w == src.width >> 1 && dst.valid_h == src.height >> 1);
    let num_rows = src.height.div_ceil(MAX_CTB_SIZE);
    let out_stride = src.width >> 1;

    let rows = self.run_rows(num_rows, |r| {
      let ht_offset = r * MAX_CTB_SIZE;
      let bh = MAX_CTB_SIZE.min(src.height - ht_offset);
      let mut buf = vec![0u8; (bh >> 1) * out_stride];
      scale_block_row(src, ht_offset, MAX_CTB_SIZE, k, &mut buf);
      buf
    });

    for (r, buf) in rows.iter().enumerate() {
      let y0 = r * (MAX_CTB_SIZE >> 1);
      for (i, row) in buf.chunks_exact(out_stride).enumerate() {
        dst.write_row(y0 + i, row);
      }
    }
    dst.pad_boundary();
  }

  /// Early decision over every CTB row of one coarse layer.
  pub fn ed_layer(
    &self, params: &EdParams, plane: &LayerPlane, k: &KernelTable,
  ) -> EdLayerOutput {
    let bs = MAX_CTB_SIZE >> params.layer;
    let num_rows = plane.height.div_ceil(bs);

    let rows = self.run_rows(num_rows, |r| ed_process_row(params, plane, r, k));

    let mut out = EdLayerOutput {
      blocks: Vec::new(),
      stats: Vec::new(),
      acc: EdAccum::default(),
    };
    for row in rows {
      out.blocks.extend(row.blocks);
      out.stats.extend(row.stats);
      out.acc.sum_best_satd += row.acc.sum_best_satd;
      out.acc.sum_sq_best_satd += row.acc.sum_sq_best_satd;
    }
    out
  }

  /// Full-resolution bracketing over every CTB row. `l1_blocks`/`l2_blocks`
  /// hold the finalized coarse-layer results in the same CTB raster order.
  #[allow(clippy::too_many_arguments)]
  pub fn bracket_frame(
    &self, p: &BracketParams, plane: &LayerPlane, l1_blocks: &[EdBlock],
    l2_blocks: &[EdBlock], l1_stats: &[CtbLevel1Stats], fs: &FrameStats,
    k: &KernelTable,
  ) -> (Vec<CtbAnalysis>, BracketAccum) {
    let ctbs_w = plane.width.div_ceil(MAX_CTB_SIZE);
    let ctbs_h = plane.height.div_ceil(MAX_CTB_SIZE);
    debug_assert_eq!(l1_blocks.len(), ctbs_w * ctbs_h * 64);
    debug_assert_eq!(l2_blocks.len(), ctbs_w * ctbs_h * 16);
    debug_assert_eq!(l1_stats.len(), ctbs_w * ctbs_h);

    let rows = self.run_rows(ctbs_h, |cy| {
      let mut row = Vec::with_capacity(ctbs_w);
      let mut acc = BracketAccum::default();
      for cx in 0..ctbs_w {
        let i = cy * ctbs_w + cx;
        row.push(bracketing_analysis(
          p,
          plane,
          cx,
          cy,
          &l1_blocks[i * 64..(i + 1) * 64],
          &l2_blocks[i * 16..(i + 1) * 16],
          &l1_stats[i],
          fs,
          k,
          &mut acc,
        ));
      }
      (row, acc)
    });

    let mut ctbs = Vec::with_capacity(ctbs_w * ctbs_h);
    let mut acc = BracketAccum::default();
    for (row, a) in rows {
      ctbs.extend(row);
      acc.satd_cost += a.satd_cost;
      acc.satd_by_modqp_q10 += a.satd_by_modqp_q10;
      acc.mode_bits_cost += a.mode_bits_cost;
      acc.satd += a.satd;
      acc.act_factor += a.act_factor;
    }
    (ctbs, acc)
  }
}
