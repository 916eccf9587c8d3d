//! `sim` — Synthetic particle scenarios: trajectories, detection, recorded runs.

pub mod detector;
pub mod particle;
pub mod replay;
pub mod scenarios;

pub use detector::{DetectorConfig, DetectorSim, Recording};
pub use particle::{MotionSpec, Particle};
pub use replay::{load_particles, save_particles};
pub use scenarios::{Scenario, ScenarioKind};
