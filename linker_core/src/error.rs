//! Error taxonomy shared by every linker_core operation.
//!
//! Domain gating (a cost at or above `max_cost`, a frame gap beyond
//! `max_frame_gap`) is never an error: it simply means "no link".

use crate::types::TrackId;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("frames out of order: frame {next} follows frame {previous}")]
    FrameOrder { previous: u64, next: u64 },

    #[error("observation reports frame {observed} inside frame {frame}")]
    FrameMismatch { frame: u64, observed: u64 },

    #[error("coordinate arity mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("non-finite coordinate in frame {frame}")]
    NonFiniteCoordinate { frame: u64 },

    #[error("{strategy} does not support {dim}-D coordinates")]
    UnsupportedDimension { strategy: &'static str, dim: usize },

    #[error("missing mandatory field `{0}`")]
    MissingField(&'static str),

    #[error("invalid point record {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },

    #[error("track {track} already has a point at frame {frame}")]
    DuplicateFrame { track: TrackId, frame: u64 },

    #[error("unknown track {0}")]
    UnknownTrack(TrackId),

    #[error("feature `{0}` was never measured on this dataset")]
    UnknownFeature(String),

    #[error("invalid range [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },

    #[error("property `{name}` has {got} values for {expected} points")]
    PropertyLength {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("scale of length {len} does not fit {dim}-D points")]
    InvalidScale { len: usize, dim: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("ground truth has {got} labels for {expected} observations in frame {frame}")]
    TruthMismatch {
        frame: u64,
        expected: usize,
        got: usize,
    },

    #[error("linking cancelled before frame {0}")]
    Cancelled(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
