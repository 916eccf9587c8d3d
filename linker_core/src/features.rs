//! Per-track scalar features written into the dataset's feature table.
//!
//! - `length`       — number of points
//! - `distance`     — cumulative path length over frame-sorted points
//! - `displacement` — straight-line distance from first to last point
//!
//! Spatial axes are scaled by `scale[1..]` when the dataset carries a scale.

use crate::{error::Result, stracks::STracks, types::TrackId};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

pub trait FeatureMeasure {
    fn name(&self) -> &'static str;

    /// Compute the feature for every track and store it.
    fn measure(&self, tracks: &mut STracks) -> Result<()>;
}

/// Selects a built-in feature by name (config files, CLI).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Length,
    Distance,
    Displacement,
}

impl FeatureKind {
    pub fn measure(self, tracks: &mut STracks) -> Result<()> {
        match self {
            FeatureKind::Length => LengthFeature.measure(tracks),
            FeatureKind::Distance => DistanceFeature.measure(tracks),
            FeatureKind::Displacement => DisplacementFeature.measure(tracks),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureKind::Length => LengthFeature.name(),
            FeatureKind::Distance => DistanceFeature.name(),
            FeatureKind::Displacement => DisplacementFeature.name(),
        }
    }
}

/// Scaled coordinates of a track, frame-sorted.
fn scaled_path(tracks: &STracks, id: TrackId) -> Vec<DVector<f64>> {
    let spatial_scale = tracks.scale().map(|s| DVector::from_column_slice(&s[1..]));
    tracks
        .track_points(id)
        .into_iter()
        .map(|p| {
            let v = DVector::from_column_slice(&p.coords);
            match &spatial_scale {
                Some(s) => v.component_mul(s),
                None => v,
            }
        })
        .collect()
}

fn measure_each(
    tracks: &mut STracks,
    name: &str,
    f: impl Fn(&STracks, TrackId) -> f64,
) -> Result<()> {
    tracks.mark_measured(name);
    for id in tracks.track_ids() {
        let value = f(tracks, id);
        tracks.set_feature(id, name, value)?;
    }
    tracing::debug!(feature = name, tracks = tracks.track_count(), "feature measured");
    Ok(())
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LengthFeature;

impl FeatureMeasure for LengthFeature {
    fn name(&self) -> &'static str {
        "length"
    }

    fn measure(&self, tracks: &mut STracks) -> Result<()> {
        measure_each(tracks, self.name(), |t, id| t.track_len(id) as f64)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DistanceFeature;

impl FeatureMeasure for DistanceFeature {
    fn name(&self) -> &'static str {
        "distance"
    }

    fn measure(&self, tracks: &mut STracks) -> Result<()> {
        measure_each(tracks, self.name(), |t, id| {
            scaled_path(t, id)
                .windows(2)
                .map(|w| (&w[1] - &w[0]).norm())
                .sum()
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DisplacementFeature;

impl FeatureMeasure for DisplacementFeature {
    fn name(&self) -> &'static str {
        "displacement"
    }

    fn measure(&self, tracks: &mut STracks) -> Result<()> {
        measure_each(tracks, self.name(), |t, id| {
            let path = scaled_path(t, id);
            match (path.first(), path.last()) {
                (Some(first), Some(last)) => (last - first).norm(),
                _ => 0.0,
            }
        })
    }
}
