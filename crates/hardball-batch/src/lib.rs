//! hardball-batch
//!
//! Many-trajectory simulation:
//! - [`BatchEngine`]: steps every trajectory in lockstep over (N, 3) state
//!   tensors with an active-row mask, trading the per-trajectory spin-drag
//!   refinement for throughput
//! - [`BatchEngine::plan_batches`]: advises whether a workload is worth
//!   batching and how to split it under an optional memory budget
//!
//! The engine advertises availability through [`BatchEngine::is_available`];
//! submitting work to an unavailable engine is a hard
//! [`BatchError::BackendUnavailable`], never a silent fallback. Callers that
//! want a fallback route the batch through
//! `hardball_flight::BatchFlightSimulator` themselves.

use hardball_core::{BallConstants, SimulationMode, SpinState, GRAVITY};
use hardball_aero::{force_from_coefficients, lift_coefficient};
use hardball_flight::BattedBallParams;
use nalgebra::Vector3;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// -------------------------
/// Errors
/// -------------------------

#[derive(Debug, Error)]
pub enum BatchError {
    /// The vectorized backend is disabled or missing on this host.
    #[error("batch backend is not available on this host")]
    BackendUnavailable,
}

/// -------------------------
/// Batch engine
/// -------------------------

/// Outcome metrics for one trajectory of a batch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Peak horizontal distance from the launch point [m]
    pub distance: f64,
    /// Peak height [m]
    pub apex: f64,
    /// Time aloft [s]
    pub hang_time: f64,
    /// Landing point, or state at time expiry [m]
    pub final_position: [f64; 3],
    /// Velocity at landing or time expiry [m/s]
    pub final_velocity: [f64; 3],
}

/// Lockstep integrator over a whole batch of batted balls.
///
/// State lives in (N, 3) tensors; each step updates every still-active row
/// with the same semi-implicit Euler rule the single-trajectory integrator
/// uses. Grounded rows freeze in place until the whole batch finishes.
///
/// The force model is deliberately simplified against the single-trajectory
/// path: drag uses the base Cd without the spin-drag increase, lift keeps the
/// full saturating Cl curve. Carry distances track the reference engine to
/// within a few percent at typical spin rates.
#[derive(Debug)]
pub struct BatchEngine {
    ball: BallConstants,
    mode: SimulationMode,
    available: bool,
}

impl BatchEngine {
    pub fn new(ball: BallConstants, mode: SimulationMode) -> Self {
        Self { ball, mode, available: true }
    }

    /// An engine whose backend is switched off; every submission fails.
    pub fn disabled(ball: BallConstants, mode: SimulationMode) -> Self {
        Self { ball, mode, available: false }
    }

    /// Whether this engine will accept work.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    /// Integrate every trajectory in the batch to landing or time expiry.
    ///
    /// Results come back in submission order.
    pub fn simulate_batch(&self, batch: &[BattedBallParams]) -> Result<Vec<BatchOutcome>, BatchError> {
        if !self.available {
            return Err(BatchError::BackendUnavailable);
        }
        let n = batch.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        log::debug!("batch engine: {n} trajectories at dt = {} s", self.mode.dt());

        let mut position = Array2::<f64>::zeros((n, 3));
        let mut velocity = Array2::<f64>::zeros((n, 3));
        let mut spin_axis = Array2::<f64>::zeros((n, 3));
        let mut spin_rate = Array1::<f64>::zeros(n);
        let mut origin = Array2::<f64>::zeros((n, 2));
        let mut ground = Array1::<f64>::zeros(n);

        let mut max_time: f64 = 0.0;
        for (i, params) in batch.iter().enumerate() {
            let launch = params.launch_angle_deg.to_radians();
            let spray = params.spray_angle_deg.to_radians();
            let speed = params.exit_velocity_ms;
            velocity[[i, 0]] = speed * launch.cos() * spray.cos();
            velocity[[i, 1]] = speed * launch.cos() * spray.sin();
            velocity[[i, 2]] = speed * launch.sin();

            position[[i, 0]] = params.initial_position.x;
            position[[i, 1]] = params.initial_position.y;
            position[[i, 2]] = params.initial_position.z;
            origin[[i, 0]] = params.initial_position.x;
            origin[[i, 1]] = params.initial_position.y;

            let spin = SpinState::new(params.spin.rate_rpm, params.spin.axis);
            spin_axis[[i, 0]] = spin.axis.x;
            spin_axis[[i, 1]] = spin.axis.y;
            spin_axis[[i, 2]] = spin.axis.z;
            spin_rate[i] = spin.rate_rpm;

            ground[i] = params.ground_level;
            max_time = max_time.max(params.max_time);
        }

        let dt = self.mode.dt();
        let mut active = vec![true; n];
        let mut active_count = n;

        let mut distance = vec![0.0_f64; n];
        let mut apex: Vec<f64> = (0..n).map(|i| position[[i, 2]]).collect();
        let mut hang_time = vec![0.0_f64; n];
        let mut final_velocity = vec![[0.0_f64; 3]; n];

        let mut acceleration = Array2::<f64>::zeros((n, 3));
        let mut time = 0.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let step_cap = (max_time / dt).ceil() as usize + 2;
        let mut steps = 0;

        while time < max_time && steps < step_cap && active_count > 0 {
            steps += 1;
            // Per-row force; inactive rows keep a zeroed velocity, so the
            // whole-tensor update below leaves them frozen.
            for i in 0..n {
                if !active[i] {
                    acceleration[[i, 0]] = 0.0;
                    acceleration[[i, 1]] = 0.0;
                    acceleration[[i, 2]] = 0.0;
                    continue;
                }
                let v = Vector3::new(velocity[[i, 0]], velocity[[i, 1]], velocity[[i, 2]]);
                let axis = Vector3::new(spin_axis[[i, 0]], spin_axis[[i, 1]], spin_axis[[i, 2]]);
                let mut force = force_from_coefficients(
                    &v,
                    &axis,
                    spin_rate[i],
                    self.ball.cd_base,
                    lift_coefficient(spin_rate[i]),
                    &self.ball,
                );
                force.z -= self.ball.mass * GRAVITY;
                acceleration[[i, 0]] = force.x / self.ball.mass;
                acceleration[[i, 1]] = force.y / self.ball.mass;
                acceleration[[i, 2]] = force.z / self.ball.mass;
            }

            velocity.scaled_add(dt, &acceleration);
            position.scaled_add(dt, &velocity);
            time += dt;

            for i in 0..n {
                if !active[i] {
                    continue;
                }
                let dx = position[[i, 0]] - origin[[i, 0]];
                let dy = position[[i, 1]] - origin[[i, 1]];
                distance[i] = distance[i].max((dx * dx + dy * dy).sqrt());
                apex[i] = apex[i].max(position[[i, 2]]);
                hang_time[i] = time;

                if position[[i, 2]] <= ground[i] || time >= batch[i].max_time {
                    active[i] = false;
                    active_count -= 1;
                    final_velocity[i] = [velocity[[i, 0]], velocity[[i, 1]], velocity[[i, 2]]];
                    velocity[[i, 0]] = 0.0;
                    velocity[[i, 1]] = 0.0;
                    velocity[[i, 2]] = 0.0;
                }
            }
        }

        // Step cap hit with rows still aloft: report their truncated state
        for i in 0..n {
            if active[i] {
                final_velocity[i] = [velocity[[i, 0]], velocity[[i, 1]], velocity[[i, 2]]];
            }
        }

        Ok((0..n)
            .map(|i| BatchOutcome {
                distance: distance[i],
                apex: apex[i],
                hang_time: hang_time[i],
                final_position: [position[[i, 0]], position[[i, 1]], position[[i, 2]]],
                final_velocity: final_velocity[i],
            })
            .collect())
    }
}

/// -------------------------
/// Batch planning
/// -------------------------

/// Workloads below this size are not worth the batching overhead.
pub const BATCH_THRESHOLD: usize = 50;
/// Cap on a single batch when sizing against a reported memory budget.
pub const MAX_BATCH_SIZE: usize = 5_000;
/// Conservative per-batch cap when no memory budget is reported.
pub const DEFAULT_BATCH_CAP: usize = 10_000;
/// Working-set estimate per in-flight trajectory [MB].
pub const TRAJECTORY_MEMORY_MB: f64 = 0.01;
/// Fraction of the reported memory the planner is willing to spend.
const MEMORY_HEADROOM: f64 = 0.8;

/// Advisor output: how to split a workload, and the footprint of one batch.
///
/// Planning always succeeds; a degenerate workload just comes back with
/// `use_batching == false`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    /// Whether the batch engine is worth engaging at all
    pub use_batching: bool,
    /// Plain-language justification for the recommendation
    pub reason: String,
    /// Trajectories per batch
    pub batch_size: usize,
    /// Number of batches covering the workload
    pub batch_count: usize,
    /// Working-set estimate for one batch [MB]
    pub estimated_memory_mb: f64,
}

impl BatchEngine {
    /// Recommend how to split `total` trajectories into batches.
    ///
    /// Declines when the backend is unavailable or the workload is too small
    /// to amortize the dispatch overhead. With no reported memory budget the
    /// batch size falls back to a conservative cap. Planning always succeeds;
    /// a declining plan carries its reason instead of an error.
    pub fn plan_batches(&self, total: usize, memory_budget_mb: Option<f64>) -> BatchPlan {
        if !self.available {
            return BatchPlan {
                use_batching: false,
                reason: "batch backend is not available on this host".to_string(),
                batch_size: total,
                batch_count: usize::from(total > 0),
                estimated_memory_mb: total as f64 * TRAJECTORY_MEMORY_MB,
            };
        }
        if total < BATCH_THRESHOLD {
            return BatchPlan {
                use_batching: false,
                reason: format!(
                    "{total} trajectories is below the {BATCH_THRESHOLD}-trajectory threshold; \
                     fixed batch overhead would dominate"
                ),
                batch_size: total,
                batch_count: usize::from(total > 0),
                estimated_memory_mb: total as f64 * TRAJECTORY_MEMORY_MB,
            };
        }

        let (batch_size, reason) = match memory_budget_mb {
            Some(budget_mb) => {
                let budget_mb = (budget_mb * MEMORY_HEADROOM).max(0.0);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let memory_cap = ((budget_mb / TRAJECTORY_MEMORY_MB) as usize).max(1);
                let size = total.min(MAX_BATCH_SIZE).min(memory_cap);
                let reason = if size == memory_cap && memory_cap < total.min(MAX_BATCH_SIZE) {
                    format!("batch size limited by the {budget_mb:.1} MB memory budget")
                } else if size == MAX_BATCH_SIZE && total > MAX_BATCH_SIZE {
                    format!("workload split at the {MAX_BATCH_SIZE}-trajectory batch cap")
                } else {
                    "workload fits in a single batch".to_string()
                };
                (size, reason)
            }
            None => {
                let size = total.min(DEFAULT_BATCH_CAP);
                let reason = if total > DEFAULT_BATCH_CAP {
                    format!(
                        "no memory budget reported; split at the conservative \
                         {DEFAULT_BATCH_CAP}-trajectory cap"
                    )
                } else {
                    "workload fits in a single batch".to_string()
                };
                (size, reason)
            }
        };
        let batch_count = (total + batch_size - 1) / batch_size;

        log::debug!("batch plan: {total} trajectories as {batch_count} × {batch_size} ({reason})");
        BatchPlan {
            use_batching: true,
            reason,
            batch_size,
            batch_count,
            estimated_memory_mb: batch_size as f64 * TRAJECTORY_MEMORY_MB,
        }
    }
}

/* ----------------------------------- tests ---------------------------------- */
