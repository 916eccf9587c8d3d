//! Pipeline orchestrator: one complete linking run over a recording.
//!
//! # Processing steps
//! 1. Validate the configuration (linker, cost, filter ranges)
//! 2. Build the cost strategy, optionally attached to a caller-owned audit log
//! 3. Link all frames with the selected linker
//! 4. Attach the physical scale, if configured
//! 5. Measure the configured features
//! 6. Apply the feature filters in order
//!
//! Steps 4–6 are also available on their own through [`Pipeline::post_process`]
//! for datasets loaded from disk.

use crate::{
    cost::{AuditLog, CostStrategy, EuclideanCost, RadiusDifferenceCost},
    error::{Error, Result},
    features::FeatureKind,
    filter::{FeatureFilter, TrackFilter},
    linker::{Linker, LinkerConfig},
    nn_linker::NnLinker,
    progress::RunControl,
    sp_linker::{SpLinker, SpLinkerConfig, SplitMergeConfig},
    stracks::STracks,
    types::Frame,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkerKind {
    Nearest,
    #[default]
    ShortestPath,
}

/// Cost strategy selection with its parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostConfig {
    Euclidean {
        max_cost: f64,
    },
    RadiusDifference {
        center: [f64; 2],
        max_cost: f64,
    },
}

impl Default for CostConfig {
    fn default() -> Self {
        CostConfig::Euclidean {
            max_cost: EuclideanCost::DEFAULT_MAX_COST,
        }
    }
}

impl CostConfig {
    pub fn max_cost(&self) -> f64 {
        match *self {
            CostConfig::Euclidean { max_cost } | CostConfig::RadiusDifference { max_cost, .. } => {
                max_cost
            }
        }
    }

    /// Instantiate the strategy. The audit log only applies to the radius cost.
    pub fn build<'a>(&self, audit: Option<&'a AuditLog>) -> Box<dyn CostStrategy + 'a> {
        match *self {
            CostConfig::Euclidean { max_cost } => {
                if audit.is_some() {
                    tracing::warn!("audit log ignored: euclidean cost does not record pairs");
                }
                Box::new(EuclideanCost::new(max_cost))
            }
            CostConfig::RadiusDifference { center, max_cost } => {
                let cost = RadiusDifferenceCost::new(center, max_cost);
                match audit {
                    Some(log) => Box::new(cost.with_audit(log)),
                    None => Box::new(cost),
                }
            }
        }
    }
}

/// Keep tracks whose `feature` lies in `[min, max]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub feature: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub linker: LinkerKind,
    pub cost: CostConfig,
    pub linker_config: LinkerConfig,
    /// Split/merge detection of the shortest-path linker
    pub split_merge: SplitMergeConfig,
    /// Features measured after linking, in order
    pub features: Vec<FeatureKind>,
    /// Filters applied after measuring, in order
    pub filters: Vec<FilterConfig>,
    /// Physical size of one unit per axis, `[t, (z,) y, x]`
    pub scale: Option<Vec<f64>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            linker: LinkerKind::default(),
            cost: CostConfig::default(),
            linker_config: LinkerConfig::default(),
            split_merge: SplitMergeConfig::default(),
            features: vec![FeatureKind::Length],
            filters: Vec::new(),
            scale: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.linker_config.validate()?;
        let max_cost = self.cost.max_cost();
        if !(max_cost.is_finite() && max_cost > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "max_cost must be positive and finite, got {max_cost}"
            )));
        }
        if let Some(threshold) = self.split_merge.max_cost {
            if !(threshold.is_finite() && threshold > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "split/merge threshold must be positive and finite, got {threshold}"
                )));
            }
        }
        for f in &self.filters {
            FeatureFilter::new(f.feature.as_str(), f.min, f.max)?;
        }
        Ok(())
    }

    fn sp_config(&self) -> SpLinkerConfig {
        SpLinkerConfig {
            base: self.linker_config.clone(),
            split_merge: self.split_merge.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Counts and timings of the post-linking stages.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StageReport {
    pub features_measured: Vec<String>,
    /// Tracks removed by each filter, in application order
    pub removed_by_filter: Vec<(String, usize)>,
    pub timing_features_us: u64,
    pub timing_filters_us: u64,
}

#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub tracks: STracks,
    pub linker: &'static str,
    /// Track count straight out of the linker, before filtering
    pub tracks_linked: usize,
    pub stages: StageReport,
    pub timing_link_us: u64,
    pub total_time_us: u64,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Pipeline<'a> {
    pub config: PipelineConfig,
    pub control: RunControl,
    audit: Option<&'a AuditLog>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            control: RunControl::default(),
            audit: None,
        })
    }

    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_audit(mut self, log: &'a AuditLog) -> Self {
        self.audit = Some(log);
        self
    }

    fn linker(&self) -> Box<dyn Linker> {
        match self.config.linker {
            LinkerKind::Nearest => Box::new(
                NnLinker::new(self.config.linker_config.clone()).with_control(self.control.clone()),
            ),
            LinkerKind::ShortestPath => {
                Box::new(SpLinker::new(self.config.sp_config()).with_control(self.control.clone()))
            }
        }
    }

    /// Link `frames`, then scale, measure and filter the result.
    pub fn run(&self, frames: &[Frame]) -> Result<PipelineOutput> {
        let start_total = Instant::now();

        let cost = self.config.cost.build(self.audit);
        let linker = self.linker();
        let t0 = Instant::now();
        let mut tracks = linker.link(frames, cost.as_ref())?;
        let timing_link_us = t0.elapsed().as_micros() as u64;
        let tracks_linked = tracks.track_count();

        let stages = self.post_process(&mut tracks)?;
        let total_time_us = start_total.elapsed().as_micros() as u64;

        tracing::info!(
            linker = linker.name(),
            cost = cost.name(),
            tracks_linked,
            tracks_kept = tracks.track_count(),
            total_time_us,
            "pipeline finished"
        );

        Ok(PipelineOutput {
            tracks,
            linker: linker.name(),
            tracks_linked,
            stages,
            timing_link_us,
            total_time_us,
        })
    }

    /// Scale, measure and filter an already-linked dataset in place.
    pub fn post_process(&self, tracks: &mut STracks) -> Result<StageReport> {
        let mut report = StageReport::default();

        if let Some(scale) = &self.config.scale {
            tracks.set_scale(scale.clone())?;
        }

        let t0 = Instant::now();
        for kind in &self.config.features {
            kind.measure(tracks)?;
            report.features_measured.push(kind.name().to_string());
        }
        report.timing_features_us = t0.elapsed().as_micros() as u64;

        let t0 = Instant::now();
        for f in &self.config.filters {
            let filter = FeatureFilter::new(f.feature.as_str(), f.min, f.max)?
                .with_control(self.control.clone());
            let removed = filter.run(tracks)?;
            report.removed_by_filter.push((f.feature.clone(), removed));
        }
        report.timing_filters_us = t0.elapsed().as_micros() as u64;

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
