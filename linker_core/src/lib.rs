//! `linker_core` — Frame-to-frame particle linking.
//!
//! # Module layout
//! - [`types`]        — Track ids, observations, frames
//! - [`error`]        — Error taxonomy and `Result` alias
//! - [`stracks`]      — `STracks` dataset: points, properties, graph, features
//! - [`cost`]         — Cost strategies and the caller-owned audit log
//! - [`gating`]       — Candidate (head, observation) pairs below `max_cost`
//! - [`association`]  — Bipartite graph, connected components, Hungarian and greedy solvers
//! - [`track`]        — Track heads: the open end of a track during linking
//! - [`track_manager`]— Birth / extension / expiry / split / merge bookkeeping
//! - [`linker`]       — `Linker` trait, shared config and frame loop
//! - [`nn_linker`]    — Greedy nearest-neighbour linker
//! - [`sp_linker`]    — Global shortest-path linker with split/merge detection
//! - [`features`]     — Per-track features (length, distance, displacement)
//! - [`filter`]       — Feature range filter
//! - [`io`]           — `.st.json` persistence
//! - [`progress`]     — Progress observers and cancellation
//! - [`pipeline`]     — Link → scale → measure → filter orchestrator
//! - [`metrics`]      — Link precision/recall against ground truth

pub mod association;
pub mod cost;
pub mod error;
pub mod features;
pub mod filter;
pub mod gating;
pub mod io;
pub mod linker;
pub mod metrics;
pub mod nn_linker;
pub mod pipeline;
pub mod progress;
pub mod sp_linker;
pub mod stracks;
pub mod track;
pub mod track_manager;
pub mod types;

pub use cost::{AuditLog, CostStrategy, EuclideanCost, RadiusDifferenceCost};
pub use error::{Error, Result};
pub use features::{FeatureKind, FeatureMeasure};
pub use filter::{FeatureFilter, TrackFilter};
pub use linker::{Linker, LinkerConfig};
pub use metrics::{GroundTruth, LinkingMetrics};
pub use nn_linker::NnLinker;
pub use pipeline::{CostConfig, FilterConfig, LinkerKind, Pipeline, PipelineConfig, PipelineOutput};
pub use progress::{ProgressObserver, RunControl, TracingObserver};
pub use sp_linker::{SpLinker, SpLinkerConfig, SplitMergeConfig};
pub use stracks::{PointRecord, STracks};
pub use types::{Frame, Observation, TrackId};
