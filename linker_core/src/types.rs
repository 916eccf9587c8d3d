//! Fundamental types used across the entire workspace.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Identifier types
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// One detected particle in one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Frame index the particle was detected in
    pub frame: u64,
    /// Spatial coordinates, (y, x) in 2-D or (z, y, x) in 3-D
    pub coords: Vec<f64>,
    /// Detector-supplied scalars (intensity, score, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, f64>,
}

impl Observation {
    pub fn new(frame: u64, coords: Vec<f64>) -> Self {
        Self {
            frame,
            coords,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Number of spatial coordinates.
    pub fn dim(&self) -> usize {
        self.coords.len()
    }
}

// ---------------------------------------------------------------------------
// Frame — the set of observations detected at one frame index
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub index: u64,
    pub observations: Vec<Observation>,
}

impl Frame {
    pub fn new(index: u64, observations: Vec<Observation>) -> Self {
        Self {
            index,
            observations,
        }
    }

    pub fn empty(index: u64) -> Self {
        Self::new(index, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Group a flat list of observations into frames ordered by index.
///
/// Frames with no detections between the first and last index are emitted
/// empty so that frame gaps stay visible to the linkers. Observation order
/// inside a frame is preserved.
pub fn group_into_frames(observations: Vec<Observation>) -> Vec<Frame> {
    let mut by_frame: BTreeMap<u64, Vec<Observation>> = BTreeMap::new();
    for obs in observations {
        by_frame.entry(obs.frame).or_default().push(obs);
    }

    let (first, last) = match (by_frame.keys().next(), by_frame.keys().next_back()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Vec::new(),
    };

    (first..=last)
        .map(|index| Frame::new(index, by_frame.remove(&index).unwrap_or_default()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
