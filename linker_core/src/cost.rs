//! Linking cost strategies.
//!
//! A cost strategy maps a pair of observations (and their frame gap) to a
//! non-negative cost. Every strategy carries a `max_cost` gate: a pair whose
//! cost is at or above it is never linked.
//!
//! # Strategies
//! - [`EuclideanCost`] — squared Euclidean distance, any dimension.
//! - [`RadiusDifferenceCost`] — |r1² − r2²| + Δx² around a fixed centre,
//!   2-D only. Favours particles moving along a circle about the centre.

use crate::error::{Error, Result};
use crate::types::Observation;
use nalgebra::DVector;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Pluggable cost function used by every linker.
pub trait CostStrategy: Send + Sync {
    /// Cost of linking `a` (earlier) to `b` (later), `dt` frames apart.
    fn cost(&self, a: &Observation, b: &Observation, dt: u64) -> Result<f64>;

    /// Gate: costs at or above this value forbid the link.
    fn max_cost(&self) -> f64;

    fn name(&self) -> &'static str;

    /// Whether the strategy can score `dim`-D coordinates at all.
    fn supports_dim(&self, _dim: usize) -> bool {
        true
    }

    /// True if `cost` passes the gate.
    #[inline]
    fn accepts(&self, cost: f64) -> bool {
        cost < self.max_cost()
    }
}

fn check_arity(a: &Observation, b: &Observation) -> Result<usize> {
    if a.dim() != b.dim() {
        return Err(Error::DimensionMismatch {
            expected: a.dim(),
            got: b.dim(),
        });
    }
    Ok(a.dim())
}

// ---------------------------------------------------------------------------
// Euclidean
// ---------------------------------------------------------------------------

/// Squared Euclidean distance between coordinates.
///
/// `max_cost` is expressed in squared length units: a gate of 25 accepts
/// displacements strictly shorter than 5.
#[derive(Clone, Debug)]
pub struct EuclideanCost {
    pub max_cost: f64,
}

impl EuclideanCost {
    pub const DEFAULT_MAX_COST: f64 = 3000.0;

    pub fn new(max_cost: f64) -> Self {
        Self { max_cost }
    }
}

impl Default for EuclideanCost {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_COST)
    }
}

impl CostStrategy for EuclideanCost {
    fn cost(&self, a: &Observation, b: &Observation, _dt: u64) -> Result<f64> {
        check_arity(a, b)?;
        let va = DVector::from_column_slice(&a.coords);
        let vb = DVector::from_column_slice(&b.coords);
        Ok((vb - va).norm_squared())
    }

    fn max_cost(&self) -> f64 {
        self.max_cost
    }

    fn name(&self) -> &'static str {
        "euclidean"
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// One evaluated pair as written to the audit log.
#[derive(Clone, Debug, PartialEq)]
pub struct AuditRow<'a> {
    pub first: &'a Observation,
    pub second: &'a Observation,
    pub r1_sq: f64,
    pub r2_sq: f64,
    pub cost: f64,
}

/// Caller-owned CSV sink for cost evaluations.
///
/// Rows are appended under a mutex so cost evaluations may run in parallel.
/// Write failures never reach the cost computation: the first one is logged
/// and every later append becomes a no-op.
pub struct AuditLog {
    sink: Mutex<Box<dyn Write + Send>>,
    failed: AtomicBool,
}

impl AuditLog {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(writer)),
            failed: AtomicBool::new(false),
        }
    }

    /// Create (truncate) a CSV file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        tracing::info!(path = %path.display(), "opened cost audit log");
        Ok(Self::new(BufWriter::new(file)))
    }

    /// True once a write has failed; the log is then inert.
    pub fn is_degraded(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn record(&self, row: &AuditRow<'_>) {
        if self.is_degraded() {
            return;
        }
        let line = format_row(row);
        let outcome = match self.sink.lock() {
            Ok(mut sink) => sink
                .write_all(line.as_bytes())
                .and_then(|_| sink.flush()),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "audit log mutex poisoned",
            )),
        };
        if let Err(err) = outcome {
            if !self.failed.swap(true, Ordering::Relaxed) {
                tracing::warn!(%err, "cost audit log write failed, disabling log");
            }
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

fn format_row(row: &AuditRow<'_>) -> String {
    let mut fields = Vec::with_capacity(row.first.dim() + row.second.dim() + 5);
    fields.push(row.first.frame.to_string());
    fields.extend(row.first.coords.iter().map(|c| format!("{c:.6}")));
    fields.push(row.second.frame.to_string());
    fields.extend(row.second.coords.iter().map(|c| format!("{c:.6}")));
    fields.push(format!("{:.6}", row.r1_sq));
    fields.push(format!("{:.6}", row.r2_sq));
    fields.push(format!("{:.6}", row.cost));
    let mut line = fields.join(",");
    line.push('\n');
    line
}

// ---------------------------------------------------------------------------
// Radius difference
// ---------------------------------------------------------------------------

/// Difference of squared radii about a fixed centre plus the squared offset
/// along the first axis: `|r1² − r2²| + Δx²`.
#[derive(Clone, Debug)]
pub struct RadiusDifferenceCost<'a> {
    /// Reference centre, same axis order as the coordinates
    pub center: [f64; 2],
    pub max_cost: f64,
    audit: Option<&'a AuditLog>,
}

impl<'a> RadiusDifferenceCost<'a> {
    pub const DEFAULT_MAX_COST: f64 = 100.0;

    pub fn new(center: [f64; 2], max_cost: f64) -> Self {
        Self {
            center,
            max_cost,
            audit: None,
        }
    }

    /// Append every evaluated pair to `log`.
    pub fn with_audit(mut self, log: &'a AuditLog) -> Self {
        self.audit = Some(log);
        self
    }

    fn radius_sq(&self, obs: &Observation) -> f64 {
        let d0 = obs.coords[0] - self.center[0];
        let d1 = obs.coords[1] - self.center[1];
        d0 * d0 + d1 * d1
    }
}

impl CostStrategy for RadiusDifferenceCost<'_> {
    fn cost(&self, a: &Observation, b: &Observation, _dt: u64) -> Result<f64> {
        let dim = check_arity(a, b)?;
        if dim != 2 {
            return Err(Error::UnsupportedDimension {
                strategy: self.name(),
                dim,
            });
        }
        let r1_sq = self.radius_sq(a);
        let r2_sq = self.radius_sq(b);
        let dx = a.coords[0] - b.coords[0];
        let cost = (r1_sq - r2_sq).abs() + dx * dx;

        if let Some(log) = self.audit {
            log.record(&AuditRow {
                first: a,
                second: b,
                r1_sq,
                r2_sq,
                cost,
            });
        }
        Ok(cost)
    }

    fn max_cost(&self) -> f64 {
        self.max_cost
    }

    fn name(&self) -> &'static str {
        "radius-difference"
    }

    fn supports_dim(&self, dim: usize) -> bool {
        dim == 2
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
