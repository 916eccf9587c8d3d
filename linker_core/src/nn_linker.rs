//! Greedy nearest-neighbour linker.
//!
//! Each frame, every gated (head, observation) pair is sorted by cost, then
//! head track id, then observation index, and accepted while both ends are
//! free. Locally optimal, never infers splits or merges.

use crate::{
    association::{greedy_solve, BipartiteGraph},
    cost::CostStrategy,
    error::Result,
    linker::{run_frames, FrameContext, Linker, LinkerConfig},
    progress::RunControl,
    stracks::STracks,
    track_manager::FrameDecision,
    types::Frame,
};

#[derive(Clone, Debug, Default)]
pub struct NnLinker {
    pub config: LinkerConfig,
    pub control: RunControl,
}

impl NnLinker {
    pub fn new(config: LinkerConfig) -> Self {
        Self {
            config,
            control: RunControl::default(),
        }
    }

    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }
}

fn decide(ctx: FrameContext<'_, '_>) -> Result<FrameDecision> {
    let mut graph = BipartiteGraph::new(ctx.heads.len(), ctx.frame.len());
    for c in &ctx.candidates {
        graph.add_edge(c.head, c.obs, c.cost);
    }
    let heads = ctx.heads;
    let assignment = greedy_solve(&graph, |h| heads[h].id);
    Ok(FrameDecision {
        links: assignment.pairs,
        ..Default::default()
    })
}

impl Linker for NnLinker {
    fn name(&self) -> &'static str {
        "nearest-neighbour"
    }

    fn link(&self, frames: &[Frame], cost: &dyn CostStrategy) -> Result<STracks> {
        run_frames(
            self.name(),
            frames,
            cost,
            &self.config,
            &self.control,
            cost.max_cost(),
            decide,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::EuclideanCost;
    use crate::error::Error;
    use crate::progress::{tests::Recorder, ProgressObserver};
    use crate::types::{Observation, TrackId};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn frame(index: u64, coords: &[[f64; 2]]) -> Frame {
        Frame::new(
            index,
            coords
                .iter()
                .map(|c| Observation::new(index, c.to_vec()))
                .collect(),
        )
    }

    #[test]
    fn links_nearest_and_births_the_rest() {
        let frames = vec![
            frame(0, &[[0.0, 0.0]]),
            frame(1, &[[10.0, 10.0], [0.1, 0.1]]),
            frame(2, &[[0.2, 0.2], [10.0, 10.5]]),
        ];
        let tracks = NnLinker::default()
            .link(&frames, &EuclideanCost::new(5.0))
            .unwrap();
        assert_eq!(tracks.track_count(), 2);
        let t0: Vec<Vec<f64>> = tracks
            .track_points(TrackId(0))
            .iter()
            .map(|p| p.coords.clone())
            .collect();
        assert_eq!(t0, vec![vec![0.0, 0.0], vec![0.1, 0.1], vec![0.2, 0.2]]);
        assert_eq!(tracks.track_len(TrackId(1)), 2);
        assert!(tracks.graph().is_empty());
    }

    #[test]
    fn gap_bridging_respects_max_frame_gap() {
        let frames = vec![
            frame(0, &[[0.0, 0.0]]),
            frame(1, &[]),
            frame(2, &[[0.5, 0.0]]),
        ];
        let cost = EuclideanCost::new(5.0);

        let strict = NnLinker::default().link(&frames, &cost).unwrap();
        assert_eq!(strict.track_count(), 2);

        let bridged = NnLinker::new(LinkerConfig {
            max_frame_gap: 2,
            ..Default::default()
        })
        .link(&frames, &cost)
        .unwrap();
        assert_eq!(bridged.track_count(), 1);
        assert!(bridged.graph().is_empty());
    }

    #[test]
    fn bridged_link_starts_child_track() {
        let frames = vec![
            frame(0, &[[0.0, 0.0]]),
            frame(1, &[]),
            frame(2, &[[0.5, 0.0]]),
            frame(3, &[[1.0, 0.0]]),
        ];
        let tracks = NnLinker::new(LinkerConfig {
            max_frame_gap: 2,
            bridge_edges: true,
            ..Default::default()
        })
        .link(&frames, &EuclideanCost::new(5.0))
        .unwrap();
        assert_eq!(tracks.track_count(), 2);
        assert_eq!(tracks.track_len(TrackId(0)), 1);
        assert_eq!(tracks.track_len(TrackId(1)), 2);
        assert_eq!(tracks.parents(TrackId(1)), Some(&BTreeSet::from([TrackId(0)])));
        tracks.validate().unwrap();
    }

    /// Raises the cancel flag once the run reports `at` percent.
    struct CancelAt {
        flag: Arc<AtomicBool>,
        at: u8,
    }

    impl ProgressObserver for CancelAt {
        fn notify(&self, _message: &str) {}
        fn progress(&self, percent: u8) {
            if percent >= self.at {
                self.flag.store(true, Ordering::Relaxed);
            }
        }
    }

    #[test]
    fn cancel_flag_stops_between_frames() {
        let frames: Vec<Frame> = (0..3).map(|f| frame(f, &[[f as f64, 0.0]])).collect();
        let flag = Arc::new(AtomicBool::new(false));
        let observer = Arc::new(CancelAt {
            flag: flag.clone(),
            at: 50,
        });
        let linker = NnLinker::default().with_control(
            RunControl::new()
                .with_observer(observer)
                .with_cancel_flag(flag.clone()),
        );
        let err = linker.link(&frames, &EuclideanCost::default());
        assert!(matches!(err, Err(Error::Cancelled(2))));

        // Raised before the run: nothing is linked.
        let err = linker.link(&frames, &EuclideanCost::default());
        assert!(matches!(err, Err(Error::Cancelled(0))));
    }

    #[test]
    fn reports_progress() {
        let rec = Arc::new(Recorder::default());
        let linker =
            NnLinker::default().with_control(RunControl::new().with_observer(rec.clone()));
        let frames = vec![frame(0, &[[0.0, 0.0]]), frame(1, &[[0.0, 0.0]])];
        linker.link(&frames, &EuclideanCost::default()).unwrap();
        assert_eq!(*rec.percents.lock().unwrap(), vec![0, 50, 100]);
        assert_eq!(*rec.messages.lock().unwrap(), vec!["linking", "done"]);
    }

    #[test]
    fn malformed_input_fails_fast() {
        let frames = vec![frame(3, &[[0.0, 0.0]]), frame(1, &[[0.0, 0.0]])];
        let err = NnLinker::default().link(&frames, &EuclideanCost::default());
        assert!(matches!(err, Err(Error::FrameOrder { .. })));
    }
}
