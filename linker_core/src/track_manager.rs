//! Track bookkeeping shared by every linker: birth, extension, expiry,
//! split/merge children, and the growing output dataset.
//!
//! # Track management policy
//! - **Birth**: every observation not claimed by a head starts a new track
//!   with the next unused integer id.
//! - **Extension**: a linked head appends the observation to its track.
//!   With `bridge_edges`, a link across a gap > 1 frame starts a new track
//!   whose parent is the old one instead.
//! - **Expiry**: a head whose gap to the current frame exceeds
//!   `max_frame_gap` is closed for good.
//! - **Split / merge**: the parent heads are closed and the observation
//!   starts a child track recording every parent in the graph.

use crate::{
    error::Result,
    linker::LinkerConfig,
    stracks::STracks,
    track::TrackHead,
    types::{Frame, Observation, TrackId},
};

/// What one frame's association decided, in head / observation indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDecision {
    /// Accepted (head index, observation index) links
    pub links: Vec<(usize, usize)>,
    /// Observation index → every parent head index (the linked head included)
    pub merges: Vec<(usize, Vec<usize>)>,
    /// Head index → every child observation index (its linked one included)
    pub splits: Vec<(usize, Vec<usize>)>,
}

#[derive(Clone, Debug)]
enum ObsRole {
    Birth,
    Extend(usize),
    Child(Vec<TrackId>),
}

/// Running counters for one linking run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub links: usize,
    pub births: usize,
    pub expired: usize,
    pub splits: usize,
    pub merges: usize,
    pub bridges: usize,
}

pub struct TrackManager<'a> {
    config: LinkerConfig,
    next_id: u64,
    active: Vec<TrackHead<'a>>,
    tracks: STracks,
    pub stats: LinkStats,
}

impl<'a> TrackManager<'a> {
    pub fn new(config: LinkerConfig, dim: Option<usize>) -> Result<Self> {
        let tracks = match dim {
            Some(d) => STracks::with_dim(d)?,
            None => STracks::new(),
        };
        Ok(Self {
            config,
            next_id: 0,
            active: Vec::new(),
            tracks,
            stats: LinkStats::default(),
        })
    }

    fn next_track_id(&mut self) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Heads open for extension, ordered by track id.
    pub fn heads(&self) -> &[TrackHead<'a>] {
        &self.active
    }

    /// Close every head whose gap to `frame` exceeds `max_frame_gap`.
    /// Returns the number of closed heads.
    pub fn expire(&mut self, frame: u64) -> usize {
        let max_gap = self.config.max_frame_gap;
        let before = self.active.len();
        self.active.retain(|h| h.gap_to(frame) <= max_gap);
        let closed = before - self.active.len();
        self.stats.expired += closed;
        closed
    }

    fn record(&mut self, id: TrackId, obs: &Observation) -> Result<()> {
        let row = self.tracks.push_point(id, obs.frame, obs.coords.clone())?;
        if self.config.carry_attributes {
            for (name, &value) in &obs.attributes {
                self.tracks.set_property(row, name, value)?;
            }
        }
        Ok(())
    }

    /// Start a new track at `obs` with the given parents.
    fn spawn(&mut self, obs: &'a Observation, parents: &[TrackId]) -> Result<TrackHead<'a>> {
        let id = self.next_track_id();
        self.record(id, obs)?;
        for &parent in parents {
            self.tracks.add_parent(id, parent)?;
        }
        Ok(TrackHead::new(id, obs))
    }

    /// Apply one frame's decision. Observations are visited in index order so
    /// new track ids are assigned deterministically.
    pub fn apply(&mut self, frame: &'a Frame, decision: &FrameDecision) -> Result<()> {
        let mut roles = vec![ObsRole::Birth; frame.len()];
        let mut closed = vec![false; self.active.len()];

        for &(h, j) in &decision.links {
            roles[j] = ObsRole::Extend(h);
        }
        for (j, parents) in &decision.merges {
            roles[*j] = ObsRole::Child(parents.iter().map(|&h| self.active[h].id).collect());
            for &h in parents {
                closed[h] = true;
            }
            self.stats.merges += 1;
        }
        for (h, children) in &decision.splits {
            closed[*h] = true;
            let parent = self.active[*h].id;
            for &j in children {
                roles[j] = ObsRole::Child(vec![parent]);
            }
            self.stats.splits += 1;
        }

        let mut spawned = Vec::new();
        for (j, role) in roles.into_iter().enumerate() {
            let obs = &frame.observations[j];
            match role {
                ObsRole::Extend(h) => {
                    self.stats.links += 1;
                    let head = &self.active[h];
                    if self.config.bridge_edges && head.gap_to(obs.frame) > 1 {
                        let parent = head.id;
                        closed[h] = true;
                        spawned.push(self.spawn(obs, &[parent])?);
                        self.stats.bridges += 1;
                    } else {
                        let id = head.id;
                        self.record(id, obs)?;
                        self.active[h].advance(obs);
                    }
                }
                ObsRole::Child(parents) => spawned.push(self.spawn(obs, &parents)?),
                ObsRole::Birth => {
                    self.stats.births += 1;
                    spawned.push(self.spawn(obs, &[])?);
                }
            }
        }

        let mut flags = closed.into_iter();
        self.active.retain(|_| !flags.next().unwrap_or(false));
        self.active.extend(spawned);
        Ok(())
    }

    /// Hand over the finished dataset.
    pub fn finish(self) -> STracks {
        self.tracks
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

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
    fn births_then_extension() {
        let f0 = frame(0, &[[0.0, 0.0], [5.0, 5.0]]);
        let f1 = frame(1, &[[0.0, 1.0], [5.0, 6.0]]);
        let mut mgr = TrackManager::new(LinkerConfig::default(), Some(2)).unwrap();
        mgr.apply(&f0, &FrameDecision::default()).unwrap();
        assert_eq!(mgr.heads().len(), 2);

        let decision = FrameDecision {
            links: vec![(0, 1), (1, 0)],
            ..Default::default()
        };
        mgr.apply(&f1, &decision).unwrap();
        assert_eq!(mgr.stats.links, 2);
        assert_eq!(mgr.stats.births, 2);

        let tracks = mgr.finish();
        assert_eq!(tracks.track_count(), 2);
        let t0: Vec<&[f64]> = tracks
            .track_points(TrackId(0))
            .iter()
            .map(|p| p.coords.as_slice())
            .collect();
        assert_eq!(t0, vec![&[0.0, 0.0][..], &[5.0, 6.0][..]]);
    }

    #[test]
    fn heads_expire_after_gap() {
        let cfg = LinkerConfig {
            max_frame_gap: 2,
            ..Default::default()
        };
        let f0 = frame(0, &[[0.0, 0.0]]);
        let mut mgr = TrackManager::new(cfg, Some(2)).unwrap();
        mgr.apply(&f0, &FrameDecision::default()).unwrap();
        assert_eq!(mgr.expire(2), 0);
        assert_eq!(mgr.expire(3), 1);
        assert!(mgr.heads().is_empty());
    }

    #[test]
    fn split_closes_parent_and_spawns_children() {
        let f0 = frame(0, &[[0.0, 0.0]]);
        let f1 = frame(1, &[[1.0, 0.0], [-1.0, 0.0]]);
        let mut mgr = TrackManager::new(LinkerConfig::default(), Some(2)).unwrap();
        mgr.apply(&f0, &FrameDecision::default()).unwrap();
        let decision = FrameDecision {
            links: vec![(0, 0)],
            splits: vec![(0, vec![0, 1])],
            ..Default::default()
        };
        mgr.apply(&f1, &decision).unwrap();
        let ids: Vec<TrackId> = mgr.heads().iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![TrackId(1), TrackId(2)]);

        let tracks = mgr.finish();
        assert_eq!(tracks.children(TrackId(0)), vec![TrackId(1), TrackId(2)]);
        assert_eq!(tracks.track_len(TrackId(0)), 1);
    }

    #[test]
    fn bridging_edge_when_enabled() {
        let cfg = LinkerConfig {
            max_frame_gap: 3,
            bridge_edges: true,
            ..Default::default()
        };
        let f0 = frame(0, &[[0.0, 0.0]]);
        let f2 = frame(2, &[[0.5, 0.0]]);
        let mut mgr = TrackManager::new(cfg, Some(2)).unwrap();
        mgr.apply(&f0, &FrameDecision::default()).unwrap();
        let decision = FrameDecision {
            links: vec![(0, 0)],
            ..Default::default()
        };
        mgr.apply(&f2, &decision).unwrap();
        assert_eq!(mgr.stats.bridges, 1);
        let tracks = mgr.finish();
        assert_eq!(tracks.track_count(), 2);
        assert!(tracks.parents(TrackId(1)).unwrap().contains(&TrackId(0)));
    }

    #[test]
    fn attributes_carried_when_enabled() {
        let cfg = LinkerConfig {
            carry_attributes: true,
            ..Default::default()
        };
        let f0 = Frame::new(0, vec![Observation::new(0, vec![0.0, 0.0]).with_attribute("intensity", 7.0)]);
        let mut mgr = TrackManager::new(cfg, Some(2)).unwrap();
        mgr.apply(&f0, &FrameDecision::default()).unwrap();
        let tracks = mgr.finish();
        assert_eq!(tracks.properties()["intensity"], vec![7.0]);
    }
}
