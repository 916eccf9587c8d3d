//! Linker abstraction: every strategy consumes ordered frames plus a cost
//! strategy and produces a populated [`STracks`].
//!
//! # Contract
//! - every observation ends up in exactly one track
//! - no track holds two observations from the same frame
//! - a link is accepted only if its frame gap is ≤ `max_frame_gap` and its
//!   cost is < `cost.max_cost()`
//! - malformed input fails before any dataset is built
//!
//! Strategies only decide which (head, observation) pairs to link each
//! frame; the shared driver [`run_frames`] handles validation, gating,
//! bookkeeping and progress.

use crate::{
    cost::CostStrategy,
    error::{Error, Result},
    gating::{gate_candidates, Candidate},
    progress::RunControl,
    stracks::STracks,
    track::TrackHead,
    track_manager::{FrameDecision, LinkStats, TrackManager},
    types::Frame,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Gating and bookkeeping parameters shared by every linker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Largest frame gap a link may bridge (1 = consecutive frames only)
    pub max_frame_gap: u64,
    /// Links across a gap > 1 start a child track instead of extending
    pub bridge_edges: bool,
    /// Copy observation attributes into the per-point properties
    pub carry_attributes: bool,
    /// Evaluate intra-frame candidate costs on the rayon pool
    pub parallel: bool,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            max_frame_gap: 1,
            bridge_edges: false,
            carry_attributes: false,
            parallel: true,
        }
    }
}

impl LinkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_gap < 1 {
            return Err(Error::InvalidConfig(
                "max_frame_gap must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

pub trait Linker {
    fn name(&self) -> &'static str;

    fn link(&self, frames: &[Frame], cost: &dyn CostStrategy) -> Result<STracks>;
}

/// Check ordering, coordinate arity and finiteness of a whole run.
/// Returns the common dimensionality, or `None` if there are no observations.
pub fn validate_frames(frames: &[Frame]) -> Result<Option<usize>> {
    let mut dim: Option<usize> = None;
    for (i, frame) in frames.iter().enumerate() {
        if i > 0 && frame.index <= frames[i - 1].index {
            return Err(Error::FrameOrder {
                previous: frames[i - 1].index,
                next: frame.index,
            });
        }
        for obs in &frame.observations {
            if obs.frame != frame.index {
                return Err(Error::FrameMismatch {
                    frame: frame.index,
                    observed: obs.frame,
                });
            }
            if !obs.coords.iter().all(|c| c.is_finite()) {
                return Err(Error::NonFiniteCoordinate { frame: frame.index });
            }
            match dim {
                Some(d) if d != obs.dim() => {
                    return Err(Error::DimensionMismatch {
                        expected: d,
                        got: obs.dim(),
                    })
                }
                Some(_) => {}
                None => {
                    if obs.dim() != 2 && obs.dim() != 3 {
                        return Err(Error::UnsupportedDimension {
                            strategy: "linker",
                            dim: obs.dim(),
                        });
                    }
                    dim = Some(obs.dim());
                }
            }
        }
    }
    Ok(dim)
}

// ---------------------------------------------------------------------------
// Shared driver
// ---------------------------------------------------------------------------

/// Per-frame inputs handed to a strategy.
pub struct FrameContext<'r, 'a> {
    pub frame: &'a Frame,
    pub heads: &'r [TrackHead<'a>],
    /// Gated candidates, ordered by (head index, observation index)
    pub candidates: Vec<Candidate>,
    pub cost: &'r dyn CostStrategy,
}

/// Frame-sequential driver used by every strategy.
///
/// `gate_limit` is the cost bound used to collect candidates; strategies that
/// look at pairs beyond `max_cost` (split/merge detection) pass a larger one
/// and must filter links with [`CostStrategy::accepts`] themselves.
pub(crate) fn run_frames<'a, F>(
    linker: &'static str,
    frames: &'a [Frame],
    cost: &dyn CostStrategy,
    config: &LinkerConfig,
    control: &RunControl,
    gate_limit: f64,
    mut decide: F,
) -> Result<STracks>
where
    F: FnMut(FrameContext<'_, 'a>) -> Result<FrameDecision>,
{
    config.validate()?;
    let max_cost = cost.max_cost();
    if !(max_cost.is_finite() && max_cost >= 0.0) {
        return Err(Error::InvalidConfig(format!(
            "{} max_cost must be finite and non-negative, got {max_cost}",
            cost.name()
        )));
    }
    if !(gate_limit.is_finite() && gate_limit >= 0.0) {
        return Err(Error::InvalidConfig(format!(
            "gate limit must be finite and non-negative, got {gate_limit}"
        )));
    }
    let dim = validate_frames(frames)?;
    if let Some(dim) = dim {
        if !cost.supports_dim(dim) {
            return Err(Error::UnsupportedDimension {
                strategy: cost.name(),
                dim,
            });
        }
    }

    let start = Instant::now();
    let mut manager = TrackManager::new(config.clone(), dim)?;
    control.notify("linking");
    control.step(0, frames.len());

    for (done, frame) in frames.iter().enumerate() {
        control.check_cancelled(frame.index)?;
        manager.expire(frame.index);

        let candidates = gate_candidates(
            manager.heads(),
            frame,
            cost,
            config.max_frame_gap,
            gate_limit,
            config.parallel,
        )?;
        let n_candidates = candidates.len();
        let decision = decide(FrameContext {
            frame,
            heads: manager.heads(),
            candidates,
            cost,
        })?;
        tracing::debug!(
            linker,
            frame = frame.index,
            heads = manager.heads().len(),
            observations = frame.len(),
            candidates = n_candidates,
            links = decision.links.len(),
            "frame linked"
        );
        manager.apply(frame, &decision)?;
        control.step(done + 1, frames.len());
    }

    let stats: LinkStats = manager.stats;
    let tracks = manager.finish();
    tracing::info!(
        linker,
        cost = cost.name(),
        frames = frames.len(),
        points = tracks.len(),
        tracks = tracks.track_count(),
        links = stats.links,
        splits = stats.splits,
        merges = stats.merges,
        elapsed_us = start.elapsed().as_micros() as u64,
        "linking done"
    );
    control.notify("done");
    Ok(tracks)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
