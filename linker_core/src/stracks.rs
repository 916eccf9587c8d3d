//! `STracks`: the track dataset produced by the linkers.
//!
//! Four collections are kept mutually consistent:
//! - `points`     — one record per linked observation (track, frame, coords)
//! - `properties` — per-point scalar columns, parallel to `points`
//! - `graph`      — track → parent tracks (splits and merges)
//! - `features`   — track → named scalar measurements
//!
//! They are only reachable through methods that keep the invariants:
//! no metadata for unknown tracks, at most one point per (track, frame),
//! a fixed dimensionality, and atomic track deletion.

use crate::error::{Error, Result};
use crate::types::TrackId;
use std::collections::{BTreeMap, BTreeSet};

/// One row of the points table.
#[derive(Clone, Debug, PartialEq)]
pub struct PointRecord {
    pub track_id: TrackId,
    pub frame: u64,
    pub coords: Vec<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct STracks {
    points: Vec<PointRecord>,
    properties: BTreeMap<String, Vec<f64>>,
    graph: BTreeMap<TrackId, BTreeSet<TrackId>>,
    features: BTreeMap<TrackId, BTreeMap<String, f64>>,
    /// Feature names measured at least once, even if every track was removed since
    measured: BTreeSet<String>,
    scale: Option<Vec<f64>>,
    dim: Option<usize>,
    /// Frames occupied by each track
    frames: BTreeMap<TrackId, BTreeSet<u64>>,
}

fn check_dim(dim: usize) -> Result<()> {
    if dim == 2 || dim == 3 {
        Ok(())
    } else {
        Err(Error::UnsupportedDimension {
            strategy: "STracks",
            dim,
        })
    }
}

impl STracks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty dataset with a fixed dimensionality (2 or 3).
    pub fn with_dim(dim: usize) -> Result<Self> {
        check_dim(dim)?;
        Ok(Self {
            dim: Some(dim),
            ..Self::default()
        })
    }

    /// Bulk construction from the five persisted collections.
    pub fn from_parts(
        points: Vec<PointRecord>,
        properties: BTreeMap<String, Vec<f64>>,
        graph: BTreeMap<TrackId, BTreeSet<TrackId>>,
        features: BTreeMap<TrackId, BTreeMap<String, f64>>,
        scale: Option<Vec<f64>>,
    ) -> Result<Self> {
        let mut tracks = Self::new();
        if let Some(scale) = scale {
            tracks.set_scale(scale)?;
        }
        for p in points {
            tracks.push_point(p.track_id, p.frame, p.coords)?;
        }
        for (name, values) in properties {
            tracks.add_property(name, values)?;
        }
        for (child, parents) in graph {
            if !tracks.contains_track(child) {
                return Err(Error::UnknownTrack(child));
            }
            if parents.is_empty() {
                tracks.graph.entry(child).or_default();
            }
            for parent in parents {
                tracks.add_parent(child, parent)?;
            }
        }
        for (track, values) in features {
            for (name, value) in values {
                tracks.set_feature(track, &name, value)?;
            }
        }
        Ok(tracks)
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn points(&self) -> &[PointRecord] {
        &self.points
    }

    pub fn properties(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.properties
    }

    pub fn graph(&self) -> &BTreeMap<TrackId, BTreeSet<TrackId>> {
        &self.graph
    }

    pub fn features(&self) -> &BTreeMap<TrackId, BTreeMap<String, f64>> {
        &self.features
    }

    pub fn scale(&self) -> Option<&[f64]> {
        self.scale.as_deref()
    }

    /// Spatial dimensionality, once known.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// Number of point records.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn track_count(&self) -> usize {
        self.frames.len()
    }

    pub fn contains_track(&self, id: TrackId) -> bool {
        self.frames.contains_key(&id)
    }

    /// All track ids, ascending.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.frames.keys().copied().collect()
    }

    /// Points of one track sorted by frame.
    pub fn track_points(&self, id: TrackId) -> Vec<&PointRecord> {
        let mut rows: Vec<&PointRecord> =
            self.points.iter().filter(|p| p.track_id == id).collect();
        rows.sort_by_key(|p| p.frame);
        rows
    }

    /// Number of points of one track.
    pub fn track_len(&self, id: TrackId) -> usize {
        self.frames.get(&id).map_or(0, BTreeSet::len)
    }

    pub fn parents(&self, id: TrackId) -> Option<&BTreeSet<TrackId>> {
        self.graph.get(&id)
    }

    pub fn children(&self, id: TrackId) -> Vec<TrackId> {
        self.graph
            .iter()
            .filter(|(_, parents)| parents.contains(&id))
            .map(|(&child, _)| child)
            .collect()
    }

    pub fn feature(&self, id: TrackId, name: &str) -> Option<f64> {
        self.features.get(&id).and_then(|f| f.get(name)).copied()
    }

    /// True if `name` was measured on this dataset.
    pub fn has_feature(&self, name: &str) -> bool {
        self.measured.contains(name)
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.measured.iter().map(String::as_str)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    fn fix_dim(&mut self, dim: usize) -> Result<()> {
        match self.dim {
            Some(expected) if expected != dim => Err(Error::DimensionMismatch {
                expected,
                got: dim,
            }),
            Some(_) => Ok(()),
            None => {
                check_dim(dim)?;
                self.dim = Some(dim);
                Ok(())
            }
        }
    }

    /// Append a point and return its row index. Existing property columns
    /// receive `NaN` for the new row.
    pub fn push_point(&mut self, track_id: TrackId, frame: u64, coords: Vec<f64>) -> Result<usize> {
        if !coords.iter().all(|c| c.is_finite()) {
            return Err(Error::NonFiniteCoordinate { frame });
        }
        self.fix_dim(coords.len())?;
        if self
            .frames
            .get(&track_id)
            .is_some_and(|frames| frames.contains(&frame))
        {
            return Err(Error::DuplicateFrame {
                track: track_id,
                frame,
            });
        }
        self.frames.entry(track_id).or_default().insert(frame);
        self.points.push(PointRecord {
            track_id,
            frame,
            coords,
        });
        for column in self.properties.values_mut() {
            column.push(f64::NAN);
        }
        Ok(self.points.len() - 1)
    }

    /// Set one property value, creating the column (`NaN`-filled) if needed.
    pub fn set_property(&mut self, row: usize, name: &str, value: f64) -> Result<()> {
        if row >= self.points.len() {
            return Err(Error::InvalidRecord {
                row,
                reason: format!("dataset has {} points", self.points.len()),
            });
        }
        let n = self.points.len();
        let column = self
            .properties
            .entry(name.to_string())
            .or_insert_with(|| vec![f64::NAN; n]);
        column[row] = value;
        Ok(())
    }

    /// Add or replace a whole property column.
    pub fn add_property(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.points.len() {
            return Err(Error::PropertyLength {
                name,
                expected: self.points.len(),
                got: values.len(),
            });
        }
        self.properties.insert(name, values);
        Ok(())
    }

    /// Record `parent` as a predecessor of `child`.
    pub fn add_parent(&mut self, child: TrackId, parent: TrackId) -> Result<()> {
        for id in [child, parent] {
            if !self.contains_track(id) {
                return Err(Error::UnknownTrack(id));
            }
        }
        self.graph.entry(child).or_default().insert(parent);
        Ok(())
    }

    pub fn set_feature(&mut self, track_id: TrackId, name: &str, value: f64) -> Result<()> {
        if !self.contains_track(track_id) {
            return Err(Error::UnknownTrack(track_id));
        }
        self.mark_measured(name);
        self.features
            .entry(track_id)
            .or_default()
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Register a feature as measured without writing values (empty datasets).
    pub fn mark_measured(&mut self, name: &str) {
        if !self.measured.contains(name) {
            self.measured.insert(name.to_string());
        }
    }

    /// Set the physical scale: (frame, y, x) or (frame, z, y, x).
    pub fn set_scale(&mut self, scale: Vec<f64>) -> Result<()> {
        let dim = scale.len().saturating_sub(1);
        match self.dim {
            Some(d) if d != dim => {
                return Err(Error::InvalidScale {
                    len: scale.len(),
                    dim: d,
                })
            }
            Some(_) => {}
            None => {
                check_dim(dim).map_err(|_| Error::InvalidScale {
                    len: scale.len(),
                    dim,
                })?;
                self.dim = Some(dim);
            }
        }
        self.scale = Some(scale);
        Ok(())
    }

    /// Delete one track everywhere. Returns false if it did not exist.
    pub fn remove_track(&mut self, id: TrackId) -> bool {
        self.remove_tracks(&BTreeSet::from([id])) == 1
    }

    /// Delete a set of tracks from points, every property column, the graph
    /// (as child and as parent) and the feature table in one pass.
    /// Returns the number of tracks that existed and were removed.
    pub fn remove_tracks(&mut self, ids: &BTreeSet<TrackId>) -> usize {
        let removed = ids.iter().filter(|id| self.frames.contains_key(id)).count();
        if removed == 0 {
            return 0;
        }

        let keep: Vec<bool> = self
            .points
            .iter()
            .map(|p| !ids.contains(&p.track_id))
            .collect();
        for column in self.properties.values_mut() {
            let mut mask = keep.iter();
            column.retain(|_| *mask.next().unwrap_or(&true));
        }
        self.points.retain(|p| !ids.contains(&p.track_id));

        self.graph.retain(|child, _| !ids.contains(child));
        for parents in self.graph.values_mut() {
            parents.retain(|p| !ids.contains(p));
        }
        self.graph.retain(|_, parents| !parents.is_empty());

        self.features.retain(|track, _| !ids.contains(track));
        self.frames.retain(|track, _| !ids.contains(track));

        removed
    }

    /// Re-check every invariant.
    pub fn validate(&self) -> Result<()> {
        let mut seen: BTreeMap<TrackId, BTreeSet<u64>> = BTreeMap::new();
        for p in &self.points {
            if Some(p.coords.len()) != self.dim {
                return Err(Error::DimensionMismatch {
                    expected: self.dim.unwrap_or(0),
                    got: p.coords.len(),
                });
            }
            if !seen.entry(p.track_id).or_default().insert(p.frame) {
                return Err(Error::DuplicateFrame {
                    track: p.track_id,
                    frame: p.frame,
                });
            }
        }
        for (name, column) in &self.properties {
            if column.len() != self.points.len() {
                return Err(Error::PropertyLength {
                    name: name.clone(),
                    expected: self.points.len(),
                    got: column.len(),
                });
            }
        }
        for (child, parents) in &self.graph {
            for id in std::iter::once(child).chain(parents) {
                if !seen.contains_key(id) {
                    return Err(Error::UnknownTrack(*id));
                }
            }
        }
        if let Some(id) = self.features.keys().find(|id| !seen.contains_key(id)) {
            return Err(Error::UnknownTrack(*id));
        }
        if let (Some(scale), Some(dim)) = (&self.scale, self.dim) {
            if scale.len() != dim + 1 {
                return Err(Error::InvalidScale {
                    len: scale.len(),
                    dim,
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn three_tracks() -> STracks {
        let mut st = STracks::new();
        for f in 0..3 {
            st.push_point(TrackId(0), f, vec![f as f64, 0.0]).unwrap();
        }
        for f in 3..5 {
            st.push_point(TrackId(1), f, vec![f as f64, 1.0]).unwrap();
            st.push_point(TrackId(2), f, vec![f as f64, -1.0]).unwrap();
        }
        st.add_property("intensity", (0..st.len()).map(|i| i as f64).collect())
            .unwrap();
        st.add_parent(TrackId(1), TrackId(0)).unwrap();
        st.add_parent(TrackId(2), TrackId(0)).unwrap();
        for id in st.track_ids() {
            st.set_feature(id, "length", st.track_len(id) as f64).unwrap();
        }
        st
    }

    #[test]
    fn push_rejects_duplicate_frame() {
        let mut st = STracks::new();
        st.push_point(TrackId(0), 1, vec![0.0, 0.0]).unwrap();
        let err = st.push_point(TrackId(0), 1, vec![1.0, 0.0]);
        assert!(matches!(err, Err(Error::DuplicateFrame { frame: 1, .. })));
        // Same frame on another track is fine.
        st.push_point(TrackId(1), 1, vec![1.0, 0.0]).unwrap();
    }

    #[test]
    fn push_rejects_non_finite_coordinates() {
        let mut st = STracks::new();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = st.push_point(TrackId(0), 0, vec![bad, 1.0]);
            assert!(matches!(err, Err(Error::NonFiniteCoordinate { frame: 0 })));
        }
        assert!(st.is_empty());
        assert_eq!(st.dim(), None);
    }

    #[test]
    fn dimensionality_is_fixed() {
        let mut st = STracks::new();
        st.push_point(TrackId(0), 0, vec![0.0, 0.0]).unwrap();
        let err = st.push_point(TrackId(1), 0, vec![0.0, 0.0, 0.0]);
        assert!(matches!(err, Err(Error::DimensionMismatch { expected: 2, got: 3 })));
        assert!(matches!(
            st.set_scale(vec![1.0, 1.0, 1.0, 1.0]),
            Err(Error::InvalidScale { len: 4, dim: 2 })
        ));
        st.set_scale(vec![1.0, 0.5, 0.5]).unwrap();
        assert!(STracks::with_dim(4).is_err());
    }

    #[test]
    fn new_points_pad_properties() {
        let mut st = STracks::new();
        st.push_point(TrackId(0), 0, vec![0.0, 0.0]).unwrap();
        st.set_property(0, "score", 0.9).unwrap();
        st.push_point(TrackId(0), 1, vec![0.0, 0.0]).unwrap();
        let column = &st.properties()["score"];
        assert_eq!(column.len(), 2);
        assert_eq!(column[0], 0.9);
        assert!(column[1].is_nan());
    }

    #[test]
    fn metadata_requires_known_track() {
        let mut st = STracks::new();
        st.push_point(TrackId(0), 0, vec![0.0, 0.0]).unwrap();
        assert!(matches!(
            st.add_parent(TrackId(0), TrackId(9)),
            Err(Error::UnknownTrack(TrackId(9)))
        ));
        assert!(matches!(
            st.set_feature(TrackId(3), "length", 1.0),
            Err(Error::UnknownTrack(TrackId(3)))
        ));
        assert!(matches!(
            st.add_property("x", vec![]),
            Err(Error::PropertyLength { expected: 1, got: 0, .. })
        ));
    }

    #[test]
    fn remove_track_is_atomic() {
        let mut st = three_tracks();
        assert!(st.remove_track(TrackId(0)));

        assert!(st.points().iter().all(|p| p.track_id != TrackId(0)));
        assert_eq!(st.properties()["intensity"].len(), st.len());
        // Children lose their only parent, so they leave the graph.
        assert!(st.graph().is_empty());
        assert!(st.features().get(&TrackId(0)).is_none());
        assert!(st.has_feature("length"));
        st.validate().unwrap();

        assert!(!st.remove_track(TrackId(0)));
    }

    #[test]
    fn remove_child_keeps_parent_rows_aligned() {
        let mut st = three_tracks();
        // Rows: T0 f0..2 (0,1,2), then T1/T2 interleaved (3..7)
        assert!(st.remove_track(TrackId(1)));
        let intensity = &st.properties()["intensity"];
        assert_eq!(intensity, &vec![0.0, 1.0, 2.0, 4.0, 6.0]);
        assert_eq!(st.children(TrackId(0)), vec![TrackId(2)]);
        st.validate().unwrap();
    }

    #[test]
    fn track_points_sorted_by_frame() {
        let mut st = STracks::new();
        st.push_point(TrackId(4), 5, vec![5.0, 0.0]).unwrap();
        st.push_point(TrackId(4), 2, vec![2.0, 0.0]).unwrap();
        let frames: Vec<u64> = st.track_points(TrackId(4)).iter().map(|p| p.frame).collect();
        assert_eq!(frames, vec![2, 5]);
    }

    #[test]
    fn from_parts_validates() {
        let points = vec![PointRecord {
            track_id: TrackId(0),
            frame: 0,
            coords: vec![0.0, 0.0],
        }];
        let graph = BTreeMap::from([(TrackId(0), BTreeSet::from([TrackId(5)]))]);
        let err = STracks::from_parts(points, BTreeMap::new(), graph, BTreeMap::new(), None);
        assert!(matches!(err, Err(Error::UnknownTrack(TrackId(5)))));
    }
}
