//! hardball-flight
//!
//! Fixed-step trajectory integration and the user-facing simulator:
//! - Semi-implicit Euler integrator with allocating and buffer-filling entry
//!   points that produce bitwise-identical trajectories
//! - A reusable trajectory buffer pool for allocation-free hot loops
//! - [`FlightSimulator`]: batted balls and pitches, mode-parameterized time
//!   step, optional coefficient-table fast path
//! - [`BatchFlightSimulator`]: sequential many-trajectory driver with
//!   progress reporting

use hardball_core::{
    BallConstants, SimulationMode, SpinState, CONTACT_HEIGHT, GRAVITY, GROUND_LEVEL,
    MAX_SIMULATION_TIME, PLATE_DISTANCE,
};
use hardball_aero::{aerodynamic_force, force_from_coefficients, CoefficientTable};
use nalgebra::Vector3;

/// -------------------------
/// Integration options
/// -------------------------

/// Knobs for one integration run.
#[derive(Clone, Copy, Debug)]
pub struct IntegrateOpts {
    /// Fixed time step [s]
    pub dt: f64,
    /// Hard ceiling on simulated time [s]
    pub max_time: f64,
    /// Hard ceiling on stored samples (including the initial state)
    pub max_steps: usize,
    /// Height of the ground plane [m]
    pub ground_level: f64,
}

impl Default for IntegrateOpts {
    fn default() -> Self {
        Self {
            dt: SimulationMode::Accurate.dt(),
            max_time: MAX_SIMULATION_TIME,
            max_steps: TrajectoryBufferPool::DEFAULT_MAX_STEPS,
            ground_level: GROUND_LEVEL,
        }
    }
}

impl IntegrateOpts {
    /// Options for a tier, everything else default.
    pub fn for_mode(mode: SimulationMode) -> Self {
        Self { dt: mode.dt(), ..Self::default() }
    }
}

/// Why an integration run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The ball reached the ground plane (last sample may sit at or just
    /// below it; the overshoot is bounded by one step)
    Grounded,
    /// `max_time` elapsed while still airborne
    TimeExpired,
    /// The sample budget ran out; the trajectory is a valid prefix
    StepBudgetExpired,
}

/// Where the integrator gets its (Cd, Cl) pair each step.
#[derive(Clone, Copy, Debug)]
pub enum CoefficientSource<'a> {
    /// Evaluate the closed-form coefficient curves every step
    Exact,
    /// Bilinear lookup in a precomputed grid
    Table(&'a CoefficientTable),
}

impl CoefficientSource<'_> {
    #[inline]
    fn force(&self, velocity: &Vector3<f64>, spin: &SpinState, ball: &BallConstants) -> Vector3<f64> {
        match self {
            CoefficientSource::Exact => aerodynamic_force(velocity, spin, ball),
            CoefficientSource::Table(table) => {
                let (cd, cl) = table.lookup(velocity.norm(), spin.rate_rpm);
                force_from_coefficients(velocity, &spin.axis, spin.rate_rpm, cd, cl, ball)
            }
        }
    }
}

/// -------------------------
/// Trajectory storage
/// -------------------------

/// An integrated flight path: parallel per-sample arrays plus the stop cause.
#[derive(Clone, Debug)]
pub struct Trajectory {
    /// Sample times [s], starting at 0
    pub time: Vec<f64>,
    /// Positions [m]
    pub position: Vec<Vector3<f64>>,
    /// Velocities [m/s]
    pub velocity: Vec<Vector3<f64>>,
    /// Why integration stopped
    pub stop_reason: StopReason,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    fn from_buffers(buffers: &TrajectoryBuffers, count: usize, stop_reason: StopReason) -> Self {
        Self {
            time: buffers.time[..count].to_vec(),
            position: buffers.position[..count].to_vec(),
            velocity: buffers.velocity[..count].to_vec(),
            stop_reason,
        }
    }
}

/// Preallocated per-sample storage for one integration run.
///
/// Capacity is fixed at construction; the integrator reports how many leading
/// entries are valid. Contents beyond that count are stale data from earlier
/// runs.
#[derive(Clone, Debug)]
pub struct TrajectoryBuffers {
    pub time: Vec<f64>,
    pub position: Vec<Vector3<f64>>,
    pub velocity: Vec<Vector3<f64>>,
}

impl TrajectoryBuffers {
    pub fn with_capacity(max_steps: usize) -> Self {
        Self {
            time: vec![0.0; max_steps],
            position: vec![Vector3::zeros(); max_steps],
            velocity: vec![Vector3::zeros(); max_steps],
        }
    }

    pub fn capacity(&self) -> usize {
        self.time.len()
    }
}

/// -------------------------
/// Buffer pool
/// -------------------------

/// Checked-out buffers from a [`TrajectoryBufferPool`].
///
/// Hand the lease back with [`TrajectoryBufferPool::release`]; dropping it
/// instead just frees the buffers, which the pool replaces on the next
/// exhaustion. Fallback leases (pool was empty) have no slot and releasing
/// them is a no-op.
#[derive(Debug)]
pub struct BufferLease {
    slot: Option<usize>,
    buffers: TrajectoryBuffers,
}

impl BufferLease {
    /// Pool slot this lease came from, or `None` for a one-off allocation.
    pub fn slot_id(&self) -> Option<usize> {
        self.slot
    }

    pub fn buffers(&self) -> &TrajectoryBuffers {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut TrajectoryBuffers {
        &mut self.buffers
    }
}

/// Round-robin pool of reusable trajectory buffers.
///
/// `acquire` never blocks: when every slot is checked out it falls back to a
/// one-off allocation so correctness is preserved at reduced throughput.
/// Releasing into an occupied slot drops the incoming buffers, so a stale or
/// duplicate lease cannot corrupt the pool.
#[derive(Debug)]
pub struct TrajectoryBufferPool {
    slots: Vec<Option<TrajectoryBuffers>>,
    max_steps: usize,
    cursor: usize,
}

impl Default for TrajectoryBufferPool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SLOTS, Self::DEFAULT_MAX_STEPS)
    }
}

impl TrajectoryBufferPool {
    pub const DEFAULT_SLOTS: usize = 10;
    /// Samples per buffer; covers 10 s of flight at the 1 ms reference step
    /// with headroom.
    pub const DEFAULT_MAX_STEPS: usize = 15_000;

    pub fn new(slot_count: usize, max_steps: usize) -> Self {
        let slots = (0..slot_count)
            .map(|_| Some(TrajectoryBuffers::with_capacity(max_steps)))
            .collect();
        Self { slots, max_steps, cursor: 0 }
    }

    /// Samples each pooled buffer can hold.
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Slots currently holding an idle buffer.
    pub fn available(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Check out a buffer, preferring the slot after the last one handed out.
    pub fn acquire(&mut self) -> BufferLease {
        let slot_count = self.slots.len();
        for offset in 0..slot_count {
            let idx = (self.cursor + offset) % slot_count;
            if let Some(buffers) = self.slots[idx].take() {
                self.cursor = (idx + 1) % slot_count;
                return BufferLease { slot: Some(idx), buffers };
            }
        }
        log::debug!("trajectory buffer pool exhausted; falling back to a one-off allocation");
        BufferLease { slot: None, buffers: TrajectoryBuffers::with_capacity(self.max_steps) }
    }

    /// Return a lease to its slot. Fallback leases and leases whose slot was
    /// already refilled are dropped silently.
    pub fn release(&mut self, lease: BufferLease) {
        if let Some(idx) = lease.slot {
            if idx < self.slots.len() && self.slots[idx].is_none() {
                self.slots[idx] = Some(lease.buffers);
            }
        }
    }
}

/// -------------------------
/// Integrator
/// -------------------------

/// Integrate a flight path into caller-owned buffers.
///
/// Semi-implicit Euler: each step updates velocity from the net force, then
/// position from the updated velocity. The run ends when the ball crosses the
/// ground plane, `max_time` elapses, or the sample budget (the smaller of
/// `opts.max_steps` and the buffer capacity) runs out. Returns the number of
/// valid samples and the stop cause; a zero budget yields an empty prefix.
pub fn integrate_into(
    initial_position: Vector3<f64>,
    initial_velocity: Vector3<f64>,
    spin: &SpinState,
    ball: &BallConstants,
    opts: &IntegrateOpts,
    coefficients: &CoefficientSource,
    buffers: &mut TrajectoryBuffers,
) -> (usize, StopReason) {
    let budget = opts.max_steps.min(buffers.capacity());
    if budget == 0 {
        return (0, StopReason::StepBudgetExpired);
    }

    let mut position = initial_position;
    let mut velocity = initial_velocity;
    let mut time = 0.0;

    buffers.time[0] = 0.0;
    buffers.position[0] = position;
    buffers.velocity[0] = velocity;
    let mut count = 1;

    let stop_reason = loop {
        if time >= opts.max_time {
            break StopReason::TimeExpired;
        }
        if count >= budget {
            break StopReason::StepBudgetExpired;
        }

        let mut force = coefficients.force(&velocity, spin, ball);
        force.z -= ball.mass * GRAVITY;

        let acceleration = force / ball.mass;
        velocity += acceleration * opts.dt;
        position += velocity * opts.dt;
        time += opts.dt;

        buffers.time[count] = time;
        buffers.position[count] = position;
        buffers.velocity[count] = velocity;
        count += 1;

        if position.z <= opts.ground_level {
            break StopReason::Grounded;
        }
    };

    (count, stop_reason)
}

/// Integrate a flight path into freshly allocated storage.
///
/// Runs the same stepping loop as [`integrate_into`]; for identical inputs the
/// two produce numerically identical samples.
pub fn integrate(
    initial_position: Vector3<f64>,
    initial_velocity: Vector3<f64>,
    spin: &SpinState,
    ball: &BallConstants,
    opts: &IntegrateOpts,
    coefficients: &CoefficientSource,
) -> Trajectory {
    // +2: initial sample plus the step that crosses max_time
    let time_bound = (opts.max_time / opts.dt).ceil() as usize + 2;
    let capacity = opts.max_steps.min(time_bound);
    let mut buffers = TrajectoryBuffers::with_capacity(capacity);
    let (count, stop_reason) =
        integrate_into(initial_position, initial_velocity, spin, ball, opts, coefficients, &mut buffers);
    buffers.time.truncate(count);
    buffers.position.truncate(count);
    buffers.velocity.truncate(count);
    Trajectory {
        time: buffers.time,
        position: buffers.position,
        velocity: buffers.velocity,
        stop_reason,
    }
}

/// -------------------------
/// Simulation inputs & outputs
/// -------------------------

/// Launch conditions for a batted ball.
///
/// Coordinate frame: +x toward the outfield, +y to the batter's left, +z up.
#[derive(Clone, Copy, Debug)]
pub struct BattedBallParams {
    /// Ball speed off the bat [m/s]
    pub exit_velocity_ms: f64,
    /// Vertical launch angle [deg], positive up
    pub launch_angle_deg: f64,
    /// Horizontal spray angle [deg], 0 = straight away, positive pulls +y
    pub spray_angle_deg: f64,
    /// Ball spin off the bat
    pub spin: SpinState,
    /// Contact point [m]
    pub initial_position: Vector3<f64>,
    /// Ceiling on simulated time [s]
    pub max_time: f64,
    /// Ground plane [m]
    pub ground_level: f64,
}

impl BattedBallParams {
    pub fn new(exit_velocity_ms: f64, launch_angle_deg: f64, spray_angle_deg: f64, spin: SpinState) -> Self {
        Self {
            exit_velocity_ms,
            launch_angle_deg,
            spray_angle_deg,
            spin,
            initial_position: Vector3::new(0.0, 0.0, CONTACT_HEIGHT),
            max_time: MAX_SIMULATION_TIME,
            ground_level: GROUND_LEVEL,
        }
    }
}

/// Release conditions for a pitch, velocity given directly as a vector.
///
/// Same frame as batted balls, with +x pointing from the release point toward
/// the plate.
#[derive(Clone, Copy, Debug)]
pub struct PitchParams {
    /// Release velocity [m/s]
    pub velocity: Vector3<f64>,
    /// Release point [m]
    pub initial_position: Vector3<f64>,
    /// Ball spin at release
    pub spin: SpinState,
    /// Downrange distance to the plate [m]
    pub plate_distance: f64,
    /// Ceiling on simulated time [s]
    pub max_time: f64,
}

impl PitchParams {
    pub fn new(velocity: Vector3<f64>, initial_position: Vector3<f64>, spin: SpinState) -> Self {
        Self { velocity, initial_position, spin, plate_distance: PLATE_DISTANCE, max_time: 2.0 }
    }
}

/// A batted-ball trajectory plus the derived outcome metrics.
#[derive(Clone, Debug)]
pub struct FlightSummary {
    pub trajectory: Trajectory,
    /// Peak horizontal distance from the launch point [m]
    pub distance: f64,
    /// Peak height above the ground [m]
    pub apex: f64,
    /// Time of the last sample [s]
    pub hang_time: f64,
    pub final_position: Vector3<f64>,
    pub final_velocity: Vector3<f64>,
}

impl FlightSummary {
    fn from_trajectory(trajectory: Trajectory, origin: Vector3<f64>) -> Self {
        let mut distance: f64 = 0.0;
        let mut apex = f64::NEG_INFINITY;
        for p in &trajectory.position {
            let dx = p.x - origin.x;
            let dy = p.y - origin.y;
            distance = distance.max((dx * dx + dy * dy).sqrt());
            apex = apex.max(p.z);
        }
        let last = trajectory.len() - 1;
        Self {
            hang_time: trajectory.time[last],
            final_position: trajectory.position[last],
            final_velocity: trajectory.velocity[last],
            distance,
            apex,
            trajectory,
        }
    }
}

/// State interpolated at the moment the ball crosses the plate distance.
#[derive(Clone, Copy, Debug)]
pub struct PlateCrossing {
    pub time: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

/// A pitch trajectory plus the interpolated plate-crossing state.
#[derive(Clone, Debug)]
pub struct PitchSummary {
    pub trajectory: Trajectory,
    /// `None` when the pitch grounded or timed out short of the plate
    pub plate: Option<PlateCrossing>,
    pub final_position: Vector3<f64>,
    pub final_velocity: Vector3<f64>,
}

/// -------------------------
/// Simulator
/// -------------------------

/// Mode-parameterized flight simulator.
///
/// Construction fixes the tier (and thus the time step) for the simulator's
/// lifetime. By default runs draw storage from an internal buffer pool; the
/// unbuffered path allocates per run and produces identical numbers.
#[derive(Debug)]
pub struct FlightSimulator {
    ball: BallConstants,
    mode: SimulationMode,
    dt_override: Option<f64>,
    use_buffer_pool: bool,
    pool: TrajectoryBufferPool,
    table: Option<CoefficientTable>,
}

impl FlightSimulator {
    pub fn new(ball: BallConstants, mode: SimulationMode) -> Self {
        Self {
            ball,
            mode,
            dt_override: None,
            use_buffer_pool: true,
            pool: TrajectoryBufferPool::default(),
            table: None,
        }
    }

    /// Use an explicit time step instead of the mode's preset.
    #[must_use]
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt_override = Some(dt);
        self
    }

    /// Allocate per run instead of drawing from the buffer pool.
    #[must_use]
    pub fn without_buffer_pool(mut self) -> Self {
        self.use_buffer_pool = false;
        self
    }

    /// Swap the closed-form coefficient curves for a precomputed lookup table.
    #[must_use]
    pub fn with_coefficient_table(mut self) -> Self {
        self.table = Some(CoefficientTable::build(self.ball.cd_base));
        self
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    pub fn dt(&self) -> f64 {
        self.dt_override.unwrap_or_else(|| self.mode.dt())
    }

    pub fn ball(&self) -> &BallConstants {
        &self.ball
    }

    /// Simulate a batted ball from launch to landing.
    pub fn simulate_batted_ball(&mut self, params: &BattedBallParams) -> FlightSummary {
        let launch = params.launch_angle_deg.to_radians();
        let spray = params.spray_angle_deg.to_radians();
        let speed = params.exit_velocity_ms;
        let velocity = Vector3::new(
            speed * launch.cos() * spray.cos(),
            speed * launch.cos() * spray.sin(),
            speed * launch.sin(),
        );

        let opts = IntegrateOpts {
            dt: self.dt(),
            max_time: params.max_time,
            ground_level: params.ground_level,
            ..IntegrateOpts::default()
        };
        let trajectory = self.run(params.initial_position, velocity, params.spin, &opts);
        FlightSummary::from_trajectory(trajectory, params.initial_position)
    }

    /// Simulate a pitch and interpolate its state at the plate.
    pub fn simulate_pitch(&mut self, params: &PitchParams) -> PitchSummary {
        let opts = IntegrateOpts {
            dt: self.dt(),
            max_time: params.max_time,
            ..IntegrateOpts::default()
        };
        let trajectory = self.run(params.initial_position, params.velocity, params.spin, &opts);
        let plate = sample_at_downrange(&trajectory, params.initial_position, params.plate_distance);
        let last = trajectory.len() - 1;
        PitchSummary {
            plate,
            final_position: trajectory.position[last],
            final_velocity: trajectory.velocity[last],
            trajectory,
        }
    }

    fn run(
        &mut self,
        initial_position: Vector3<f64>,
        initial_velocity: Vector3<f64>,
        spin: SpinState,
        opts: &IntegrateOpts,
    ) -> Trajectory {
        // Axes from literal struct construction may be unnormalized
        let spin = SpinState::new(spin.rate_rpm, spin.axis);
        let coefficients = match &self.table {
            Some(table) => CoefficientSource::Table(table),
            None => CoefficientSource::Exact,
        };
        if self.use_buffer_pool {
            let mut lease = self.pool.acquire();
            let (count, stop_reason) = integrate_into(
                initial_position,
                initial_velocity,
                &spin,
                &self.ball,
                opts,
                &coefficients,
                lease.buffers_mut(),
            );
            let trajectory = Trajectory::from_buffers(lease.buffers(), count, stop_reason);
            self.pool.release(lease);
            trajectory
        } else {
            integrate(initial_position, initial_velocity, &spin, &self.ball, opts, &coefficients)
        }
    }
}

/// Interpolate the state where horizontal travel from `origin` first reaches
/// `distance`. Linear blend between the two bracketing samples.
fn sample_at_downrange(
    trajectory: &Trajectory,
    origin: Vector3<f64>,
    distance: f64,
) -> Option<PlateCrossing> {
    let downrange = |p: &Vector3<f64>| {
        let dx = p.x - origin.x;
        let dy = p.y - origin.y;
        (dx * dx + dy * dy).sqrt()
    };

    let idx = trajectory.position.iter().position(|p| downrange(p) >= distance)?;
    if idx == 0 {
        return Some(PlateCrossing {
            time: trajectory.time[0],
            position: trajectory.position[0],
            velocity: trajectory.velocity[0],
        });
    }

    let d0 = downrange(&trajectory.position[idx - 1]);
    let d1 = downrange(&trajectory.position[idx]);
    let span = d1 - d0;
    let t = if span.abs() < 1e-12 { 0.0 } else { (distance - d0) / span };

    let lerp3 = |a: &Vector3<f64>, b: &Vector3<f64>| a + (b - a) * t;
    Some(PlateCrossing {
        time: trajectory.time[idx - 1] + (trajectory.time[idx] - trajectory.time[idx - 1]) * t,
        position: lerp3(&trajectory.position[idx - 1], &trajectory.position[idx]),
        velocity: lerp3(&trajectory.velocity[idx - 1], &trajectory.velocity[idx]),
    })
}

/// -------------------------
/// Batch driver
/// -------------------------

/// Sequential driver for many batted-ball simulations.
///
/// Defaults to the bulk tier; one internal simulator (and its buffer pool) is
/// reused across the whole batch.
#[derive(Debug)]
pub struct BatchFlightSimulator {
    simulator: FlightSimulator,
}

impl BatchFlightSimulator {
    pub fn new(ball: BallConstants) -> Self {
        Self::with_mode(ball, SimulationMode::UltraFast)
    }

    pub fn with_mode(ball: BallConstants, mode: SimulationMode) -> Self {
        Self { simulator: FlightSimulator::new(ball, mode).with_coefficient_table() }
    }

    pub fn mode(&self) -> SimulationMode {
        self.simulator.mode()
    }

    /// Simulate each entry in order; `progress` sees (completed, total) after
    /// every trajectory.
    pub fn simulate_batch(
        &mut self,
        batch: &[BattedBallParams],
        mut progress: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Vec<FlightSummary> {
        let total = batch.len();
        let mut results = Vec::with_capacity(total);
        for (done, params) in batch.iter().enumerate() {
            results.push(self.simulator.simulate_batted_ball(params));
            if let Some(callback) = progress.as_deref_mut() {
                callback(done + 1, total);
            }
        }
        results
    }
}

/* ----------------------------------- tests ---------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn line_drive(exit_velocity_ms: f64) -> BattedBallParams {
        BattedBallParams::new(
            exit_velocity_ms,
            30.0,
            0.0,
            SpinState::new(2000.0, Vector3::y()),
        )
    }

    #[test]
    fn flight_terminates_cleanly_across_input_grid() {
        let mut sim = FlightSimulator::new(BallConstants::default(), SimulationMode::Fast);
        for speed in [20.0, 35.0, 50.0] {
            for angle in [-10.0, 5.0, 25.0, 45.0, 80.0] {
                for rpm in [0.0, 1500.0, 3000.0] {
                    let params = BattedBallParams::new(
                        speed,
                        angle,
                        -15.0,
                        SpinState::new(rpm, Vector3::y()),
                    );
                    let summary = sim.simulate_batted_ball(&params);
                    assert!(matches!(
                        summary.trajectory.stop_reason,
                        StopReason::Grounded | StopReason::TimeExpired
                    ));
                    for p in &summary.trajectory.position {
                        assert!(p.x.is_finite() && p.y.is_finite() && p.z.is_finite());
                    }
                    assert!(summary.distance.is_finite() && summary.hang_time > 0.0);
                }
            }
        }
    }

    #[test]
    fn distance_is_monotonic_in_exit_velocity() {
        let mut sim = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate);
        let mut previous = 0.0;
        for step in 0..10 {
            let speed = 25.0 + 3.0 * f64::from(step);
            let summary = sim.simulate_batted_ball(&line_drive(speed));
            assert!(
                summary.distance > previous,
                "distance should grow with exit velocity: {} m at {speed} m/s after {previous} m",
                summary.distance
            );
            previous = summary.distance;
        }
    }

    #[test]
    fn modes_agree_on_carry_distance() {
        let reference = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate)
            .simulate_batted_ball(&line_drive(45.0))
            .distance;
        for mode in [SimulationMode::Fast, SimulationMode::UltraFast] {
            let distance = FlightSimulator::new(BallConstants::default(), mode)
                .simulate_batted_ball(&line_drive(45.0))
                .distance;
            assert_relative_eq!(distance, reference, max_relative = 0.05);
        }
    }

    #[test]
    fn buffered_and_unbuffered_paths_match_exactly() {
        let params = line_drive(42.0);
        let buffered = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate)
            .simulate_batted_ball(&params);
        let unbuffered = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate)
            .without_buffer_pool()
            .simulate_batted_ball(&params);

        assert_eq!(buffered.trajectory.len(), unbuffered.trajectory.len());
        assert_eq!(buffered.trajectory.stop_reason, unbuffered.trajectory.stop_reason);
        for i in 0..buffered.trajectory.len() {
            assert_eq!(buffered.trajectory.position[i], unbuffered.trajectory.position[i]);
            assert_eq!(buffered.trajectory.velocity[i], unbuffered.trajectory.velocity[i]);
        }
        assert_eq!(buffered.distance, unbuffered.distance);
    }

    #[test]
    fn explicit_dt_overrides_the_mode_preset() {
        let params = line_drive(40.0);
        let accurate = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate)
            .simulate_batted_ball(&params);
        let overridden = FlightSimulator::new(BallConstants::default(), SimulationMode::Extreme)
            .with_dt(SimulationMode::Accurate.dt())
            .simulate_batted_ball(&params);
        assert_eq!(accurate.trajectory.len(), overridden.trajectory.len());
        assert_eq!(accurate.distance, overridden.distance);
    }

    #[test]
    fn table_path_tracks_exact_path_closely() {
        let params = line_drive(45.0);
        let exact = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate)
            .simulate_batted_ball(&params);
        let tabled = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate)
            .with_coefficient_table()
            .simulate_batted_ball(&params);
        assert_relative_eq!(tabled.distance, exact.distance, max_relative = 0.02);
        assert_relative_eq!(tabled.apex, exact.apex, max_relative = 0.02);
    }

    #[test]
    fn typical_fly_ball_lands_in_expected_envelope() {
        // 45 m/s (~100 mph) off the bat, 30° up, 2000 rpm backspin
        let mut sim = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate);
        let summary = sim.simulate_batted_ball(&line_drive(45.0));
        assert_eq!(summary.trajectory.stop_reason, StopReason::Grounded);
        assert!(
            (80.0..=150.0).contains(&summary.distance),
            "carry {} m out of envelope",
            summary.distance
        );
        assert!((10.0..=40.0).contains(&summary.apex), "apex {} m out of envelope", summary.apex);
        assert!(
            (3.0..=8.0).contains(&summary.hang_time),
            "hang time {} s out of envelope",
            summary.hang_time
        );
        // Landed at (or one step below) the ground plane
        assert!(summary.final_position.z <= GROUND_LEVEL + 1e-9);
    }

    #[test]
    fn backspin_outcarries_no_spin() {
        let mut sim = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate);
        let with_spin = sim.simulate_batted_ball(&line_drive(45.0));
        let no_spin = sim.simulate_batted_ball(&BattedBallParams::new(
            45.0,
            30.0,
            0.0,
            SpinState::none(),
        ));
        assert!(
            with_spin.distance > no_spin.distance,
            "backspin carry {} m should beat spinless {} m",
            with_spin.distance,
            no_spin.distance
        );
    }

    #[test]
    fn step_budget_yields_valid_prefix() {
        let opts = IntegrateOpts { max_steps: 50, ..IntegrateOpts::default() };
        let trajectory = integrate(
            Vector3::new(0.0, 0.0, CONTACT_HEIGHT),
            Vector3::new(30.0, 0.0, 30.0),
            &SpinState::none(),
            &BallConstants::default(),
            &opts,
            &CoefficientSource::Exact,
        );
        assert_eq!(trajectory.stop_reason, StopReason::StepBudgetExpired);
        assert_eq!(trajectory.len(), 50);
        assert!(trajectory.position[49].z > GROUND_LEVEL);
    }

    #[test]
    fn zero_step_budget_yields_empty_prefix() {
        let opts = IntegrateOpts { max_steps: 0, ..IntegrateOpts::default() };
        let trajectory = integrate(
            Vector3::new(0.0, 0.0, CONTACT_HEIGHT),
            Vector3::new(30.0, 0.0, 30.0),
            &SpinState::none(),
            &BallConstants::default(),
            &opts,
            &CoefficientSource::Exact,
        );
        assert!(trajectory.is_empty());
        assert_eq!(trajectory.stop_reason, StopReason::StepBudgetExpired);

        // Zero-capacity pooled buffers degrade the same way
        let mut pool = TrajectoryBufferPool::new(1, 0);
        let mut lease = pool.acquire();
        let (count, reason) = integrate_into(
            Vector3::new(0.0, 0.0, CONTACT_HEIGHT),
            Vector3::new(30.0, 0.0, 30.0),
            &SpinState::none(),
            &BallConstants::default(),
            &IntegrateOpts::default(),
            &CoefficientSource::Exact,
            lease.buffers_mut(),
        );
        assert_eq!(count, 0);
        assert_eq!(reason, StopReason::StepBudgetExpired);
        pool.release(lease);
    }

    #[test]
    fn time_ceiling_stops_airborne_flight() {
        let opts = IntegrateOpts { max_time: 0.05, ..IntegrateOpts::default() };
        let trajectory = integrate(
            Vector3::new(0.0, 0.0, CONTACT_HEIGHT),
            Vector3::new(0.0, 0.0, 40.0),
            &SpinState::none(),
            &BallConstants::default(),
            &opts,
            &CoefficientSource::Exact,
        );
        assert_eq!(trajectory.stop_reason, StopReason::TimeExpired);
        assert_abs_diff_eq!(trajectory.time[trajectory.len() - 1], 0.05, epsilon = 1e-9);
    }

    #[test]
    fn pool_falls_back_when_exhausted_and_recovers() {
        let mut pool = TrajectoryBufferPool::new(3, 64);
        assert_eq!(pool.available(), 3);

        let leases: Vec<_> = (0..3).map(|_| pool.acquire()).collect();
        assert_eq!(pool.available(), 0);
        assert!(leases.iter().all(|l| l.slot_id().is_some()));

        // Exhausted: one-off allocation, still full capacity
        let fallback = pool.acquire();
        assert_eq!(fallback.slot_id(), None);
        assert_eq!(fallback.buffers().capacity(), 64);

        // Releasing the fallback is a no-op
        pool.release(fallback);
        assert_eq!(pool.available(), 0);

        for lease in leases {
            pool.release(lease);
        }
        assert_eq!(pool.available(), 3);
        assert!(pool.acquire().slot_id().is_some());
    }

    #[test]
    fn pool_ignores_release_into_occupied_slot() {
        let mut pool = TrajectoryBufferPool::new(2, 64);
        let first = pool.acquire();
        let slot = first.slot_id();

        // Forge a duplicate lease for the same slot
        let duplicate = BufferLease { slot, buffers: TrajectoryBuffers::with_capacity(64) };
        pool.release(first);
        assert_eq!(pool.available(), 2);
        pool.release(duplicate);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn pool_rotates_round_robin() {
        let mut pool = TrajectoryBufferPool::new(3, 16);
        let a = pool.acquire();
        assert_eq!(a.slot_id(), Some(0));
        pool.release(a);
        // Cursor moved on even though slot 0 is free again
        assert_eq!(pool.acquire().slot_id(), Some(1));
    }

    #[test]
    fn fastball_crosses_the_plate_in_the_zone() {
        // ~85 mph release, slight backspin lift, 1.8 m release height
        let mut sim = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate);
        let params = PitchParams::new(
            Vector3::new(38.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.8),
            SpinState::new(2200.0, Vector3::y()),
        );
        let summary = sim.simulate_pitch(&params);
        let plate = summary.plate.expect("pitch should reach the plate");
        assert!((0.4..=0.7).contains(&plate.time), "plate time {} s", plate.time);
        assert!(plate.position.z > 0.3 && plate.position.z < 1.8, "plate height {}", plate.position.z);
        assert_abs_diff_eq!(
            (plate.position.x.powi(2) + plate.position.y.powi(2)).sqrt(),
            PLATE_DISTANCE,
            epsilon = 1e-6
        );
        // Drag bleeds speed on the way in
        assert!(plate.velocity.norm() < 38.0);
    }

    #[test]
    fn short_pitch_reports_no_plate_crossing() {
        let mut sim = FlightSimulator::new(BallConstants::default(), SimulationMode::Accurate);
        let params = PitchParams::new(
            Vector3::new(8.0, 0.0, -1.0),
            Vector3::new(0.0, 0.0, 1.8),
            SpinState::none(),
        );
        let summary = sim.simulate_pitch(&params);
        assert!(summary.plate.is_none());
        assert_eq!(summary.trajectory.stop_reason, StopReason::Grounded);
    }

    #[test]
    fn batch_driver_reports_progress_and_matches_single_runs() {
        let batch: Vec<_> = (0..5)
            .map(|i| line_drive(35.0 + 2.0 * f64::from(i)))
            .collect();

        let mut ticks = Vec::new();
        let mut driver = BatchFlightSimulator::with_mode(BallConstants::default(), SimulationMode::Fast);
        let results = {
            let mut on_progress = |done: usize, total: usize| ticks.push((done, total));
            driver.simulate_batch(&batch, Some(&mut on_progress))
        };

        assert_eq!(results.len(), 5);
        assert_eq!(ticks, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);

        let mut single = FlightSimulator::new(BallConstants::default(), SimulationMode::Fast)
            .with_coefficient_table();
        for (result, params) in results.iter().zip(&batch) {
            let expected = single.simulate_batted_ball(params);
            assert_eq!(result.distance, expected.distance);
            assert_eq!(result.trajectory.len(), expected.trajectory.len());
        }
    }
}
