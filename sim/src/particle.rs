//! Particle trajectory models and per-frame propagation.
//!
//! Each particle has a true 2-D position in detector coordinates and a
//! `MotionSpec` describing how it moves from one frame to the next. A
//! particle may be the daughter of another: it then appears at its mother's
//! last position, offset by its own `position`.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// How a particle moves between consecutive frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MotionSpec {
    /// Constant displacement per frame.
    Linear { velocity: [f64; 2] },
    /// Rotation about `center` by `omega` radians per frame.
    Circular { center: [f64; 2], omega: f64 },
    /// Isotropic Gaussian steps with standard deviation `sigma` per axis.
    Brownian { sigma: f64 },
}

/// A simulated particle with ground-truth position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Unique particle ID (used for ground-truth labels)
    pub id: u64,
    /// True position; an offset from the mother's position for daughters
    pub position: [f64; 2],
    pub motion: MotionSpec,
    /// Mean detected intensity
    pub intensity: f64,
    /// First frame the particle exists in
    pub appear_at: u64,
    /// First frame the particle no longer exists in
    pub disappear_at: Option<u64>,
    /// Mother particle, for daughters of a division
    pub parent: Option<u64>,
}

impl Particle {
    pub fn new(id: u64, position: [f64; 2], motion: MotionSpec) -> Self {
        Self {
            id,
            position,
            motion,
            intensity: 100.0,
            appear_at: 0,
            disappear_at: None,
            parent: None,
        }
    }

    pub fn alive_between(mut self, appear_at: u64, disappear_at: Option<u64>) -> Self {
        self.appear_at = appear_at;
        self.disappear_at = disappear_at;
        self
    }

    pub fn daughter_of(mut self, parent: u64, at_frame: u64) -> Self {
        self.parent = Some(parent);
        self.appear_at = at_frame;
        self
    }

    /// True if the particle exists at `frame`.
    pub fn is_active(&self, frame: u64) -> bool {
        frame >= self.appear_at && self.disappear_at.map_or(true, |end| frame < end)
    }

    /// Propagate the true position by one frame.
    pub fn step(&mut self, rng: &mut impl Rng) -> anyhow::Result<()> {
        let p = &mut self.position;
        match self.motion {
            MotionSpec::Linear { velocity } => {
                p[0] += velocity[0];
                p[1] += velocity[1];
            }
            MotionSpec::Circular { center, omega } => {
                let (s, c) = omega.sin_cos();
                let d0 = p[0] - center[0];
                let d1 = p[1] - center[1];
                p[0] = center[0] + c * d0 - s * d1;
                p[1] = center[1] + s * d0 + c * d1;
            }
            MotionSpec::Brownian { sigma } => {
                if sigma > 0.0 {
                    let normal = Normal::new(0.0, sigma)?;
                    p[0] += normal.sample(rng);
                    p[1] += normal.sample(rng);
                }
            }
        }
        Ok(())
    }
}
