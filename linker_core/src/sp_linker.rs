//! Global shortest-path linker.
//!
//! # Processing steps per frame
//! 1. Gate every (active head, observation) pair
//! 2. Build the sparse bipartite graph from pairs below `max_cost`
//! 3. Partition into connected components (union-find)
//! 4. Solve each component with the Hungarian algorithm, birth and death
//!    both costing `max_cost` (components in parallel)
//! 5. Split/merge post-pass on the pairs below the split/merge threshold
//!    (a quarter of `max_cost` unless configured)
//!
//! Unlike the greedy linker, a near-tie cannot lock in a locally cheap link
//! that forces an expensive one elsewhere: each frame pair is cost-optimal.

use crate::{
    association::{partition_components, solve_with_birth_death, BipartiteGraph},
    cost::CostStrategy,
    error::Result,
    gating::Candidate,
    linker::{run_frames, FrameContext, Linker, LinkerConfig},
    progress::RunControl,
    stracks::STracks,
    track::TrackHead,
    track_manager::FrameDecision,
    types::Frame,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Split/merge detection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitMergeConfig {
    pub enabled: bool,
    /// Threshold for the secondary match; `None` uses
    /// [`Self::DEFAULT_FRACTION`] of the strategy's `max_cost`
    pub max_cost: Option<f64>,
}

impl SplitMergeConfig {
    pub const DEFAULT_FRACTION: f64 = 0.25;
}

impl Default for SplitMergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_cost: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpLinkerConfig {
    #[serde(flatten)]
    pub base: LinkerConfig,
    pub split_merge: SplitMergeConfig,
}

#[derive(Clone, Debug, Default)]
pub struct SpLinker {
    pub config: SpLinkerConfig,
    pub control: RunControl,
}

impl SpLinker {
    pub fn new(config: SpLinkerConfig) -> Self {
        Self {
            config,
            control: RunControl::default(),
        }
    }

    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    fn split_merge_threshold(&self, cost: &dyn CostStrategy) -> Option<f64> {
        let sm = &self.config.split_merge;
        sm.enabled.then(|| {
            sm.max_cost
                .unwrap_or(cost.max_cost() * SplitMergeConfig::DEFAULT_FRACTION)
        })
    }
}

/// Optimal one-to-one links for one frame, ordered by (head, observation).
fn assign(ctx: &FrameContext<'_, '_>, parallel: bool) -> Vec<(usize, usize)> {
    let max_cost = ctx.cost.max_cost();
    let mut graph = BipartiteGraph::new(ctx.heads.len(), ctx.frame.len());
    for c in ctx.candidates.iter().filter(|c| ctx.cost.accepts(c.cost)) {
        graph.add_edge(c.head, c.obs, c.cost);
    }
    if graph.is_empty() {
        return Vec::new();
    }

    let components = partition_components(&graph);
    let mut pairs: Vec<(usize, usize)> = if parallel {
        components
            .par_iter()
            .flat_map_iter(|comp| solve_with_birth_death(comp, max_cost).pairs)
            .collect()
    } else {
        components
            .iter()
            .flat_map(|comp| solve_with_birth_death(comp, max_cost).pairs)
            .collect()
    };
    // Head indices follow track id order.
    pairs.sort_unstable();
    pairs
}

/// Lowest-cost candidate per key, ties broken by the smaller secondary key.
fn best_by<K: Ord + Copy>(
    candidates: &[Candidate],
    threshold: f64,
    key: impl Fn(&Candidate) -> K,
    other: impl Fn(&Candidate) -> usize,
) -> BTreeMap<K, (f64, usize)> {
    let mut best: BTreeMap<K, (f64, usize)> = BTreeMap::new();
    for c in candidates.iter().filter(|c| c.cost < threshold) {
        let entry = best.entry(key(c)).or_insert((c.cost, other(c)));
        if c.cost.total_cmp(&entry.0).then(other(c).cmp(&entry.1)).is_lt() {
            *entry = (c.cost, other(c));
        }
    }
    best
}

/// Derive merge and split events from the frame's links.
///
/// - Merge: an unlinked head whose best observation was linked to another
///   head. The observation becomes a child of both heads.
/// - Split: an unlinked observation whose best head was linked this frame,
///   where that head's two cheapest observations are exactly its linked one
///   and this one. Both become children of the head.
fn split_merge(
    heads: &[TrackHead<'_>],
    n_obs: usize,
    candidates: &[Candidate],
    links: &[(usize, usize)],
    threshold: f64,
) -> (Vec<(usize, Vec<usize>)>, Vec<(usize, Vec<usize>)>) {
    let mut head_link: Vec<Option<usize>> = vec![None; heads.len()];
    let mut obs_link: Vec<Option<usize>> = vec![None; n_obs];
    for &(h, j) in links {
        head_link[h] = Some(j);
        obs_link[j] = Some(h);
    }

    // head index → (cost, obs index); ties on the smaller observation index
    let best_obs = best_by(candidates, threshold, |c| c.head, |c| c.obs);
    // obs index → (cost, head index); head index order is track id order
    let best_head = best_by(candidates, threshold, |c| c.obs, |c| c.head);

    let mut merges: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (&h, &(_, j)) in &best_obs {
        if head_link[h].is_some() {
            continue;
        }
        if let Some(g) = obs_link[j] {
            merges.entry(j).or_insert_with(|| vec![g]).push(h);
        }
    }
    let merged_heads: Vec<usize> = merges.iter().filter_map(|(&j, _)| obs_link[j]).collect();

    // head index → every (cost, obs index) under the threshold
    let mut ranked: BTreeMap<usize, Vec<(f64, usize)>> = BTreeMap::new();
    for c in candidates.iter().filter(|c| c.cost < threshold) {
        ranked.entry(c.head).or_default().push((c.cost, c.obs));
    }
    let cheapest_two = |h: usize| -> Vec<usize> {
        let mut options = ranked.get(&h).cloned().unwrap_or_default();
        options.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        options.into_iter().take(2).map(|(_, j)| j).collect()
    };

    let mut splits: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (&j, &(_, h)) in &best_head {
        if obs_link[j].is_some() || merged_heads.contains(&h) {
            continue;
        }
        let Some(linked) = head_link[h] else {
            continue;
        };
        let top = cheapest_two(h);
        if top.contains(&linked) && top.contains(&j) {
            splits.insert(h, vec![linked, j]);
        }
    }

    let merges = merges
        .into_iter()
        .map(|(j, mut parents)| {
            parents.sort_unstable();
            (j, parents)
        })
        .collect();
    let splits = splits
        .into_iter()
        .map(|(h, mut children)| {
            children.sort_unstable();
            (h, children)
        })
        .collect();
    (merges, splits)
}

impl Linker for SpLinker {
    fn name(&self) -> &'static str {
        "shortest-path"
    }

    fn link(&self, frames: &[Frame], cost: &dyn CostStrategy) -> Result<STracks> {
        let threshold = self.split_merge_threshold(cost);
        let gate_limit = threshold.map_or(cost.max_cost(), |t| t.max(cost.max_cost()));
        let parallel = self.config.base.parallel;

        run_frames(
            self.name(),
            frames,
            cost,
            &self.config.base,
            &self.control,
            gate_limit,
            |ctx| {
                let links = assign(&ctx, parallel);
                let (merges, splits) = match threshold {
                    Some(t) => split_merge(ctx.heads, ctx.frame.len(), &ctx.candidates, &links, t),
                    None => (Vec::new(), Vec::new()),
                };
                if !merges.is_empty() || !splits.is_empty() {
                    tracing::debug!(
                        frame = ctx.frame.index,
                        merges = merges.len(),
                        splits = splits.len(),
                        "topology events"
                    );
                }
                Ok(FrameDecision {
                    links,
                    merges,
                    splits,
                })
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
