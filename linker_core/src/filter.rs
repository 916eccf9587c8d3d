//! Track filters: remove whole tracks from a dataset.

use crate::{
    error::{Error, Result},
    progress::RunControl,
    stracks::STracks,
};
use std::collections::BTreeSet;

pub trait TrackFilter {
    /// Remove the rejected tracks and return how many were removed.
    fn run(&self, tracks: &mut STracks) -> Result<usize>;
}

/// Keep tracks whose feature value lies in `[min, max]` (inclusive).
#[derive(Clone, Debug)]
pub struct FeatureFilter {
    feature: String,
    min: f64,
    max: f64,
    control: RunControl,
}

impl FeatureFilter {
    pub fn new(feature: impl Into<String>, min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(Error::InvalidRange { min, max });
        }
        Ok(Self {
            feature: feature.into(),
            min,
            max,
            control: RunControl::default(),
        })
    }

    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

impl TrackFilter for FeatureFilter {
    fn run(&self, tracks: &mut STracks) -> Result<usize> {
        if !tracks.has_feature(&self.feature) {
            return Err(Error::UnknownFeature(self.feature.clone()));
        }
        self.control.notify("processing");

        let ids = tracks.track_ids();
        let mut rejected = BTreeSet::new();
        for (i, &id) in ids.iter().enumerate() {
            self.control.step(i, ids.len());
            let keep = tracks
                .feature(id, &self.feature)
                .is_some_and(|v| v >= self.min && v <= self.max);
            if !keep {
                rejected.insert(id);
            }
        }
        let removed = tracks.remove_tracks(&rejected);

        tracing::info!(
            feature = %self.feature,
            min = self.min,
            max = self.max,
            removed,
            kept = tracks.track_count(),
            "feature filter applied"
        );
        self.control.step(ids.len(), ids.len());
        self.control.notify("done");
        Ok(removed)
    }
}
