//! hardball-aero
//!
//! Aerodynamic forces on a spinning baseball:
//! - Drag, opposing velocity, with a spin-dependent coefficient increase
//! - Magnus lift, perpendicular to velocity and spin axis (right-hand rule)
//!
//! Coefficient curves are piecewise in spin rate:
//!
//!   Cd_eff = cd_base + min(SPIN_DRAG_FACTOR · rpm, SPIN_DRAG_MAX_INCREASE)
//!   Cl     = SPIN_FACTOR · rpm                       (rpm ≤ saturation)
//!          = Cl(sat) + SPIN_FACTOR · (rpm − sat) · 0.2 (above saturation)
//!
//! Both force magnitudes follow `0.5 · C · ρ · A · |v|²`.
//!
//! [`CoefficientTable`] precomputes (Cd, Cl) over a quantized velocity/spin
//! grid and serves them by bilinear interpolation, trading a bounded
//! interpolation error for branch-free lookups in the integrator's inner loop.

use hardball_core::{
    BallConstants, SpinState, SPIN_DRAG_FACTOR, SPIN_DRAG_MAX_INCREASE, SPIN_FACTOR,
    SPIN_SATURATION, SPIN_SATURATION_SLOPE,
};
use nalgebra::Vector3;

/// Speeds below this produce no aerodynamic force (velocity direction undefined).
const SPEED_EPSILON: f64 = 1e-6;
/// Spin rates below this produce no Magnus force.
const SPIN_EPSILON_RPM: f64 = 1.0;

/* ------------------------------ coefficients ------------------------------ */

/// Effective drag coefficient for a given base Cd and total spin rate.
///
/// Spin thickens the turbulent boundary layer and adds drag; the increase is
/// capped so extreme spin rates stay physical.
pub fn drag_coefficient(cd_base: f64, spin_rate_rpm: f64) -> f64 {
    let increase = (SPIN_DRAG_FACTOR * spin_rate_rpm.max(0.0)).min(SPIN_DRAG_MAX_INCREASE);
    cd_base + increase
}

/// Lift coefficient for a given total spin rate.
///
/// Linear in spin up to the saturation threshold; above it the slope drops to
/// 20% of the base slope (diminishing returns at very high spin).
pub fn lift_coefficient(spin_rate_rpm: f64) -> f64 {
    let rpm = spin_rate_rpm.max(0.0);
    if rpm <= SPIN_SATURATION {
        SPIN_FACTOR * rpm
    } else {
        SPIN_FACTOR * SPIN_SATURATION + SPIN_FACTOR * (rpm - SPIN_SATURATION) * SPIN_SATURATION_SLOPE
    }
}

/* --------------------------------- forces --------------------------------- */

/// Total aerodynamic force (drag + Magnus) on the ball, gravity excluded.
///
/// `spin.axis` must already be a unit vector or the zero vector (the
/// [`SpinState`] constructors guarantee this). A zero axis, near-zero spin
/// rate, or near-zero speed each degrade gracefully to a zero contribution.
pub fn aerodynamic_force(
    velocity: &Vector3<f64>,
    spin: &SpinState,
    ball: &BallConstants,
) -> Vector3<f64> {
    let cd = drag_coefficient(ball.cd_base, spin.rate_rpm);
    let cl = lift_coefficient(spin.rate_rpm);
    force_from_coefficients(velocity, &spin.axis, spin.rate_rpm, cd, cl, ball)
}

/// Compose drag + Magnus from externally supplied coefficients.
///
/// This is the entry point the integrator uses when running off a
/// [`CoefficientTable`] instead of the closed-form curves.
pub fn force_from_coefficients(
    velocity: &Vector3<f64>,
    spin_axis: &Vector3<f64>,
    spin_rate_rpm: f64,
    cd: f64,
    cl: f64,
    ball: &BallConstants,
) -> Vector3<f64> {
    let v_mag = velocity.norm();
    if v_mag < SPEED_EPSILON {
        return Vector3::zeros();
    }
    let v_unit = velocity / v_mag;
    let dynamic = 0.5 * ball.air_density * ball.cross_sectional_area * v_mag * v_mag;

    // Drag: opposite the velocity unit vector
    let mut force = -(cd * dynamic) * v_unit;

    // Magnus: along normalize(v̂ × ŝ)
    if spin_rate_rpm >= SPIN_EPSILON_RPM {
        let direction = v_unit.cross(spin_axis);
        let dir_mag = direction.norm();
        if dir_mag > SPEED_EPSILON {
            force += (cl * dynamic / dir_mag) * direction;
        }
    }

    force
}

/* ------------------------------ lookup table ------------------------------ */

/// Velocity grid: 10–50 m/s in 1 m/s steps.
const V_MIN: f64 = 10.0;
const V_MAX: f64 = 50.0;
const V_STEP: f64 = 1.0;
const V_COUNT: usize = 41;

/// Spin grid: 0–3000 rpm in 100 rpm steps.
const S_MIN: f64 = 0.0;
const S_MAX: f64 = 3000.0;
const S_STEP: f64 = 100.0;
const S_COUNT: usize = 31;

/// Precomputed (Cd, Cl) grid over quantized (velocity, spin rate).
///
/// Built once from the exact coefficient curves; read-only afterwards, so a
/// single table may be shared by reference across simulators in one process.
/// Out-of-range queries clamp to the grid edge.
#[derive(Clone, Debug)]
pub struct CoefficientTable {
    cd: Vec<f64>,
    cl: Vec<f64>,
}

impl CoefficientTable {
    /// Precompute the grid for a given base drag coefficient.
    pub fn build(cd_base: f64) -> Self {
        let mut cd = vec![0.0; V_COUNT * S_COUNT];
        let mut cl = vec![0.0; V_COUNT * S_COUNT];
        for i in 0..V_COUNT {
            for j in 0..S_COUNT {
                let spin = S_MIN + j as f64 * S_STEP;
                cd[i * S_COUNT + j] = drag_coefficient(cd_base, spin);
                cl[i * S_COUNT + j] = lift_coefficient(spin);
            }
        }
        Self { cd, cl }
    }

    /// Interpolated `(Cd, Cl)` at the given speed [m/s] and spin rate [rpm].
    ///
    /// Bilinear over the four bounding grid cells; queries outside the grid
    /// clamp to the nearest edge.
    pub fn lookup(&self, velocity_ms: f64, spin_rate_rpm: f64) -> (f64, f64) {
        let v = velocity_ms.clamp(V_MIN, V_MAX);
        let s = spin_rate_rpm.clamp(S_MIN, S_MAX);

        let vi = (((v - V_MIN) / V_STEP) as usize).min(V_COUNT - 2);
        let si = (((s - S_MIN) / S_STEP) as usize).min(S_COUNT - 2);

        let vw = (v - (V_MIN + vi as f64 * V_STEP)) / V_STEP;
        let sw = (s - (S_MIN + si as f64 * S_STEP)) / S_STEP;

        let at = |i: usize, j: usize| i * S_COUNT + j;
        let blend = |grid: &[f64]| {
            grid[at(vi, si)] * (1.0 - vw) * (1.0 - sw)
                + grid[at(vi, si + 1)] * (1.0 - vw) * sw
                + grid[at(vi + 1, si)] * vw * (1.0 - sw)
                + grid[at(vi + 1, si + 1)] * vw * sw
        };

        (blend(&self.cd), blend(&self.cl))
    }
}

/* ----------------------------------- tests ---------------------------------- */
