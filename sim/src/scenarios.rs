//! Scenario definitions.
//!
//! Each scenario is a named configuration of particles and a detector model,
//! with the linking parameters it was designed for. All scenarios are
//! deterministic given the same seed.

use crate::{
    detector::{DetectorConfig, DetectorSim, Recording},
    particle::{MotionSpec, Particle},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// 5 particles, straight lines, perfect detector
    Simple,
    /// 2 particles crossing at an angle
    Crossing,
    /// 8 particles on concentric circles
    Rotating,
    /// 10 drifting particles with 70% detection probability
    Blinking,
    /// 3 cells dividing half way through
    Dividing,
    /// 150 Brownian particles with clutter
    Dense,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub n_frames: u64,
    pub particles: Vec<Particle>,
    pub detector: DetectorConfig,
    /// Euclidean `max_cost` suited to the scenario's displacements
    pub max_cost: f64,
    /// `max_frame_gap` suited to the scenario's detection probability
    pub max_frame_gap: u64,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Simple => Self::simple(seed),
            ScenarioKind::Crossing => Self::crossing(seed),
            ScenarioKind::Rotating => Self::rotating(seed),
            ScenarioKind::Blinking => Self::blinking(seed),
            ScenarioKind::Dividing => Self::dividing(seed),
            ScenarioKind::Dense => Self::dense(seed),
        }
    }

    /// Run the detector over the scenario.
    pub fn record(&self) -> anyhow::Result<Recording> {
        DetectorSim::new(self.detector.clone(), self.seed).record(self)
    }

    // -----------------------------------------------------------------------
    // Simple
    // -----------------------------------------------------------------------
    fn simple(seed: u64) -> Self {
        let particles = vec![
            linear(0, [10., 10.], [1.0, 0.5]),
            linear(1, [80., 20.], [-0.8, 0.6]),
            linear(2, [50., 90.], [0.0, -1.2]),
            linear(3, [20., 60.], [0.7, 0.7]),
            linear(4, [90., 90.], [-1.0, -0.3]),
        ];
        Scenario {
            name: "simple".into(),
            seed,
            n_frames: 30,
            particles,
            detector: DetectorConfig::default(),
            max_cost: 9.0,
            max_frame_gap: 1,
        }
    }

    // -----------------------------------------------------------------------
    // Crossing
    // -----------------------------------------------------------------------
    fn crossing(seed: u64) -> Self {
        let particles = vec![
            linear(0, [30., 30.], [2.0, 2.0]),
            linear(1, [30., 70.], [2.0, -2.0]),
        ];
        Scenario {
            name: "crossing".into(),
            seed,
            n_frames: 20,
            particles,
            detector: DetectorConfig {
                noise_std: 0.05,
                ..Default::default()
            },
            max_cost: 16.0,
            max_frame_gap: 1,
        }
    }

    // -----------------------------------------------------------------------
    // Rotating
    // -----------------------------------------------------------------------
    fn rotating(seed: u64) -> Self {
        let center = [50.0, 50.0];
        let particles = (0..8)
            .map(|i| {
                let angle = i as f64 * std::f64::consts::TAU / 8.0;
                let r = 10.0 + 4.0 * i as f64;
                Particle::new(
                    i as u64,
                    [center[0] + r * angle.sin(), center[1] + r * angle.cos()],
                    MotionSpec::Circular {
                        center,
                        omega: 0.05,
                    },
                )
            })
            .collect();
        Scenario {
            name: "rotating".into(),
            seed,
            n_frames: 40,
            particles,
            detector: DetectorConfig::default(),
            max_cost: 9.0,
            max_frame_gap: 1,
        }
    }

    // -----------------------------------------------------------------------
    // Blinking
    // -----------------------------------------------------------------------
    fn blinking(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
        let particles = (0..10)
            .map(|i| {
                let pos = [10.0 + 8.0 * i as f64, 10.0 + rng.gen::<f64>() * 20.0];
                let velocity = [0.0, 0.5 + rng.gen::<f64>() * 0.5];
                linear(i, pos, velocity)
            })
            .collect();
        Scenario {
            name: "blinking".into(),
            seed,
            n_frames: 50,
            particles,
            detector: DetectorConfig {
                p_detection: 0.7,
                ..Default::default()
            },
            max_cost: 9.0,
            max_frame_gap: 3,
        }
    }

    // -----------------------------------------------------------------------
    // Dividing
    // -----------------------------------------------------------------------
    fn dividing(seed: u64) -> Self {
        let division = 15;
        let mut particles = Vec::new();
        for (i, pos) in [[20., 20.], [50., 70.], [80., 30.]].into_iter().enumerate() {
            let mother = i as u64;
            particles.push(
                Particle::new(mother, pos, MotionSpec::Brownian { sigma: 0.1 })
                    .alive_between(0, Some(division)),
            );
            for (k, side) in [-1.0, 1.0].into_iter().enumerate() {
                let id = 3 + 2 * mother + k as u64;
                particles.push(
                    Particle::new(
                        id,
                        [0.0, side],
                        MotionSpec::Linear {
                            velocity: [0.0, 0.4 * side],
                        },
                    )
                    .daughter_of(mother, division),
                );
            }
        }
        Scenario {
            name: "dividing".into(),
            seed,
            n_frames: 30,
            particles,
            detector: DetectorConfig {
                noise_std: 0.05,
                ..Default::default()
            },
            // daughters land ~1 from the mother: inside the split threshold
            max_cost: 16.0,
            max_frame_gap: 1,
        }
    }

    // -----------------------------------------------------------------------
    // Dense
    // -----------------------------------------------------------------------
    fn dense(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(2));
        let field = [200.0, 200.0];
        let n_frames = 40;
        let particles = (0..150)
            .map(|i| {
                let pos = [rng.gen::<f64>() * field[0], rng.gen::<f64>() * field[1]];
                let appear = rng.gen_range(0..n_frames / 2);
                let end = rng.gen_range(appear + 5..=n_frames);
                Particle::new(i, pos, MotionSpec::Brownian { sigma: 0.5 })
                    .alive_between(appear, Some(end))
            })
            .collect();
        Scenario {
            name: "dense".into(),
            seed,
            n_frames,
            particles,
            detector: DetectorConfig {
                noise_std: 0.1,
                p_detection: 0.95,
                clutter_rate: 3.0,
                field,
                ..Default::default()
            },
            max_cost: 6.0,
            max_frame_gap: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder helpers
// ---------------------------------------------------------------------------

fn linear(id: u64, pos: [f64; 2], velocity: [f64; 2]) -> Particle {
    Particle::new(id, pos, MotionSpec::Linear { velocity })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
