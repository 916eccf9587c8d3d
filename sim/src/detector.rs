//! Detection simulator.
//!
//! Turns particle trajectories into per-frame observations with:
//! - Gaussian localisation noise
//! - Missed detections (1 - P_D)
//! - Poisson clutter, uniform over the field of view
//! - Gaussian intensity jitter, attached as the `intensity` attribute
//!
//! Every observation is labelled with its true particle (`None` for clutter),
//! and observation order inside a frame is shuffled.

use crate::{particle::Particle, scenarios::Scenario};
use linker_core::{
    metrics::GroundTruth,
    types::{Frame, Observation},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Normal, Poisson};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Detector model parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Localisation noise std per axis
    pub noise_std: f64,
    /// Probability a live particle is detected in a frame
    pub p_detection: f64,
    /// Mean number of false detections per frame
    pub clutter_rate: f64,
    /// Field of view `[extent axis 0, extent axis 1]`, origin at zero
    pub field: [f64; 2],
    /// Relative intensity jitter std
    pub intensity_jitter: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            noise_std: 0.1,
            p_detection: 1.0,
            clutter_rate: 0.0,
            field: [100.0, 100.0],
            intensity_jitter: 0.05,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.p_detection),
            "p_detection must lie in [0, 1], got {}",
            self.p_detection
        );
        anyhow::ensure!(self.noise_std >= 0.0, "noise_std must be non-negative");
        anyhow::ensure!(self.clutter_rate >= 0.0, "clutter_rate must be non-negative");
        anyhow::ensure!(
            self.field.iter().all(|e| *e > 0.0),
            "field extents must be positive"
        );
        Ok(())
    }
}

/// Frames produced by a detector run, with their ground truth.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub scenario_name: String,
    pub seed: u64,
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub truth: GroundTruth,
}

impl Recording {
    pub fn observation_count(&self) -> usize {
        self.frames.iter().map(Frame::len).sum()
    }
}

pub struct DetectorSim {
    pub config: DetectorConfig,
    rng: ChaCha8Rng,
}

impl DetectorSim {
    pub fn new(config: DetectorConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Simulate `scenario.n_frames` frames of its particles.
    pub fn record(&mut self, scenario: &Scenario) -> anyhow::Result<Recording> {
        self.config.validate()?;
        let position_noise = Normal::new(0.0, self.config.noise_std)?;
        let intensity_noise = Normal::new(1.0, self.config.intensity_jitter)?;
        let clutter = (self.config.clutter_rate > 0.0)
            .then(|| Poisson::new(self.config.clutter_rate))
            .transpose()?;

        let mut particles: Vec<Particle> = scenario.particles.clone();
        particles.sort_by_key(|p| p.id);
        // daughters spawn relative to the mother's position at division
        let mut last_position: BTreeMap<u64, [f64; 2]> = BTreeMap::new();

        let mut frames = Vec::with_capacity(scenario.n_frames as usize);
        let mut labels = Vec::with_capacity(scenario.n_frames as usize);
        let mut lineage = BTreeMap::new();

        for f in 0..scenario.n_frames {
            let mut detections: Vec<(Observation, Option<u64>)> = Vec::new();

            for particle in particles.iter_mut() {
                if f == particle.appear_at {
                    if let Some(parent) = particle.parent {
                        if let Some(origin) = last_position.get(&parent) {
                            particle.position[0] += origin[0];
                            particle.position[1] += origin[1];
                        }
                        lineage.insert(particle.id, parent);
                    }
                }
                if !particle.is_active(f) {
                    continue;
                }
                last_position.insert(particle.id, particle.position);

                if self.rng.gen::<f64>() < self.config.p_detection {
                    let coords = vec![
                        particle.position[0] + position_noise.sample(&mut self.rng),
                        particle.position[1] + position_noise.sample(&mut self.rng),
                    ];
                    let intensity = particle.intensity * intensity_noise.sample(&mut self.rng);
                    let obs = Observation::new(f, coords).with_attribute("intensity", intensity);
                    detections.push((obs, Some(particle.id)));
                }
                particle.step(&mut self.rng)?;
            }

            if let Some(clutter) = &clutter {
                let n = clutter.sample(&mut self.rng) as usize;
                for _ in 0..n {
                    let coords = vec![
                        self.rng.gen::<f64>() * self.config.field[0],
                        self.rng.gen::<f64>() * self.config.field[1],
                    ];
                    let intensity = 20.0 * intensity_noise.sample(&mut self.rng);
                    let obs = Observation::new(f, coords).with_attribute("intensity", intensity);
                    detections.push((obs, None));
                }
            }

            detections.shuffle(&mut self.rng);
            let (observations, frame_labels): (Vec<_>, Vec<_>) = detections.into_iter().unzip();
            frames.push(Frame::new(f, observations));
            labels.push(frame_labels);
        }

        let recording = Recording {
            scenario_name: scenario.name.clone(),
            seed: scenario.seed,
            frames,
            truth: GroundTruth { labels, lineage },
        };
        tracing::info!(
            scenario = %recording.scenario_name,
            frames = recording.frames.len(),
            observations = recording.observation_count(),
            "simulated detections"
        );
        Ok(recording)
    }
}
