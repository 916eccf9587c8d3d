//! Candidate gating: which (head, observation) pairs may be linked at all.
//!
//! # Gating criterion
//! A pair is a candidate if the frame gap is ≤ `max_frame_gap` and the cost
//! is strictly below the gate limit (normally the strategy's `max_cost`).
//! Pairs failing the gate are simply absent; they are never errors.
//!
//! Costs within one frame are independent, so they are evaluated on the
//! rayon pool when requested. Output order is always (head, observation).

use crate::{
    cost::CostStrategy,
    error::Result,
    track::TrackHead,
    types::Frame,
};
use rayon::prelude::*;

/// One gate-passing pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Index into the active heads
    pub head: usize,
    /// Index into the frame's observations
    pub obs: usize,
    pub cost: f64,
}

fn head_candidates(
    hi: usize,
    head: &TrackHead<'_>,
    frame: &Frame,
    cost: &dyn CostStrategy,
    max_gap: u64,
    limit: f64,
) -> Result<Vec<Candidate>> {
    let dt = head.gap_to(frame.index);
    let mut out = Vec::new();
    if dt == 0 || dt > max_gap {
        return Ok(out);
    }
    for (oi, obs) in frame.observations.iter().enumerate() {
        let c = cost.cost(head.obs, obs, dt)?;
        // NaN never passes
        if c < limit {
            out.push(Candidate {
                head: hi,
                obs: oi,
                cost: c,
            });
        }
    }
    Ok(out)
}

/// Evaluate every (head, observation) pair of `frame` and keep the ones
/// that pass the gate.
pub fn gate_candidates(
    heads: &[TrackHead<'_>],
    frame: &Frame,
    cost: &dyn CostStrategy,
    max_gap: u64,
    limit: f64,
    parallel: bool,
) -> Result<Vec<Candidate>> {
    if heads.is_empty() || frame.is_empty() {
        return Ok(Vec::new());
    }

    let per_head: Vec<Vec<Candidate>> = if parallel {
        heads
            .par_iter()
            .enumerate()
            .map(|(hi, head)| head_candidates(hi, head, frame, cost, max_gap, limit))
            .collect::<Result<_>>()?
    } else {
        heads
            .iter()
            .enumerate()
            .map(|(hi, head)| head_candidates(hi, head, frame, cost, max_gap, limit))
            .collect::<Result<_>>()?
    };

    Ok(per_head.into_iter().flatten().collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
