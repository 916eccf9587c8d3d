//! Linking metrics: accepted links vs. ground-truth links, precision/recall.
//!
//! A link joins two observations. The ground-truth links of a particle are
//! its consecutive detections no more than `max_frame_gap` frames apart, plus
//! one link from a mother's last detection to each daughter's first one.
//! The links of a linked dataset are the consecutive points of each track
//! plus one link per parent → child edge of the graph, joining the child's
//! first point to the parent's last point before it.
//!
//! Observations are matched between the two sides by frame and exact
//! coordinates, which the linkers copy through unchanged.

use crate::{
    error::{Error, Result},
    stracks::{PointRecord, STracks},
    types::Frame,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Particle identity of every observation of a recording.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// Per frame, per observation: the true particle, or `None` for clutter
    pub labels: Vec<Vec<Option<u64>>>,
    /// Daughter particle → mother particle
    #[serde(default)]
    pub lineage: BTreeMap<u64, u64>,
}

type PointKey = (u64, Vec<u64>);
type Link = (PointKey, PointKey);

fn key(frame: u64, coords: &[f64]) -> PointKey {
    (frame, coords.iter().map(|c| c.to_bits()).collect())
}

impl GroundTruth {
    /// Number of distinct particles that were detected at least once.
    pub fn particle_count(&self) -> usize {
        self.labels
            .iter()
            .flatten()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn check_shape(&self, frames: &[Frame]) -> Result<()> {
        for (i, frame) in frames.iter().enumerate() {
            let got = self.labels.get(i).map_or(0, Vec::len);
            if got != frame.len() {
                return Err(Error::TruthMismatch {
                    frame: frame.index,
                    expected: frame.len(),
                    got,
                });
            }
        }
        if let Some(extra) = self.labels.get(frames.len()) {
            return Err(Error::TruthMismatch {
                frame: frames.len() as u64,
                expected: 0,
                got: extra.len(),
            });
        }
        Ok(())
    }

    fn links(&self, frames: &[Frame], max_frame_gap: u64) -> BTreeSet<Link> {
        let mut detections: BTreeMap<u64, Vec<PointKey>> = BTreeMap::new();
        for (frame, labels) in frames.iter().zip(&self.labels) {
            for (obs, label) in frame.observations.iter().zip(labels) {
                if let Some(particle) = label {
                    detections
                        .entry(*particle)
                        .or_default()
                        .push(key(frame.index, &obs.coords));
                }
            }
        }

        let within_gap = |a: &PointKey, b: &PointKey| b.0 - a.0 <= max_frame_gap;
        let mut links = BTreeSet::new();
        for points in detections.values() {
            for w in points.windows(2) {
                if within_gap(&w[0], &w[1]) {
                    links.insert((w[0].clone(), w[1].clone()));
                }
            }
        }
        for (daughter, mother) in &self.lineage {
            let (Some(first), Some(last)) = (
                detections.get(daughter).and_then(|d| d.first()),
                detections.get(mother).and_then(|m| m.last()),
            ) else {
                continue;
            };
            if last.0 < first.0 && within_gap(last, first) {
                links.insert((last.clone(), first.clone()));
            }
        }
        links
    }
}

fn track_links(tracks: &STracks) -> BTreeSet<Link> {
    let point_key = |p: &PointRecord| key(p.frame, &p.coords);
    let mut links = BTreeSet::new();
    for id in tracks.track_ids() {
        let points = tracks.track_points(id);
        for w in points.windows(2) {
            links.insert((point_key(w[0]), point_key(w[1])));
        }
    }
    for (child, parents) in tracks.graph() {
        let child_points = tracks.track_points(*child);
        let Some(&first) = child_points.first() else {
            continue;
        };
        for parent in parents {
            // a split parent keeps extending, so take its point just before the child
            let parent_points = tracks.track_points(*parent);
            if let Some(&last) = parent_points.iter().rev().find(|p| p.frame < first.frame) {
                links.insert((point_key(last), point_key(first)));
            }
        }
    }
    links
}

/// Link-level comparison of one linking run with the ground truth.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkingMetrics {
    /// Accepted links that join two detections of the same particle
    pub true_positives: u64,
    /// Accepted links that are not in the ground truth
    pub false_positives: u64,
    /// Ground-truth links the linker did not produce
    pub missed: u64,
    pub n_tracks: usize,
    pub n_particles: usize,
    /// Parent → child edges in the linked graph
    pub n_topology_edges: usize,
}

impl LinkingMetrics {
    /// Compare `tracks` (the output of linking `frames`) with `truth`.
    pub fn evaluate(
        tracks: &STracks,
        frames: &[Frame],
        truth: &GroundTruth,
        max_frame_gap: u64,
    ) -> Result<Self> {
        truth.check_shape(frames)?;
        let expected = truth.links(frames, max_frame_gap);
        let accepted = track_links(tracks);

        let true_positives = accepted.intersection(&expected).count() as u64;
        let metrics = Self {
            true_positives,
            false_positives: accepted.len() as u64 - true_positives,
            missed: expected.len() as u64 - true_positives,
            n_tracks: tracks.track_count(),
            n_particles: truth.particle_count(),
            n_topology_edges: tracks.graph().values().map(|p| p.len()).sum(),
        };
        tracing::debug!(?metrics, "linking metrics");
        Ok(metrics)
    }

    /// Precision = TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        let denom = (self.true_positives + self.false_positives) as f64;
        if denom == 0.0 { 1.0 } else { self.true_positives as f64 / denom }
    }

    /// Recall = TP / (TP + missed)
    pub fn recall(&self) -> f64 {
        let denom = (self.true_positives + self.missed) as f64;
        if denom == 0.0 { 1.0 } else { self.true_positives as f64 / denom }
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
