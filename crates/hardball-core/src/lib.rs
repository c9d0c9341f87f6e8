//! Core types and constants for baseball flight simulation
//!
//! Includes:
//! - Physical constants (official ball dimensions, calibrated aerodynamic coefficients)
//! - Injectable ball/air parameters
//! - Spin representation (rate + axis)
//! - Simulation-mode presets (speed/accuracy tiers)
//! - Atmosphere helper (air density from weather)
//! - Units & conversions

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// -------------------------
/// Physical constants
/// -------------------------

/// Gravitational acceleration [m/s²]
pub const GRAVITY: f64 = 9.81;
/// Air density at sea level, 15 °C [kg/m³]
pub const RHO_SEA_LEVEL: f64 = 1.225;

/// Official ball mass [kg] (≈5.125 oz)
pub const BALL_MASS: f64 = 0.145;
/// Official ball diameter [m] (≈2.9 in)
pub const BALL_DIAMETER: f64 = 0.074;
/// Cross-sectional area π·(d/2)² [m²]
pub const BALL_CROSS_SECTIONAL_AREA: f64 =
    std::f64::consts::PI * (BALL_DIAMETER / 2.0) * (BALL_DIAMETER / 2.0);

/// Base drag coefficient, calibrated to empirical carry distances
pub const CD_BASE: f64 = 0.32;
/// Lift-coefficient slope per rpm of spin (calibrated to backspin carry boost)
pub const SPIN_FACTOR: f64 = 0.000145;
/// Spin rate beyond which lift gains diminish [rpm]
pub const SPIN_SATURATION: f64 = 2500.0;
/// Fraction of the base lift slope retained above saturation
pub const SPIN_SATURATION_SLOPE: f64 = 0.2;
/// Extra drag per rpm of total spin (turbulent boundary layer)
pub const SPIN_DRAG_FACTOR: f64 = 0.00002;
/// Cap on the spin-induced drag increase
pub const SPIN_DRAG_MAX_INCREASE: f64 = 0.15;

/// Hard ceiling on simulated flight time [s]
pub const MAX_SIMULATION_TIME: f64 = 10.0;
/// Ground plane height [m]
pub const GROUND_LEVEL: f64 = 0.0;
/// Typical bat-contact height [m]
pub const CONTACT_HEIGHT: f64 = 1.0;
/// Release-to-plate distance for a pitch [m] (60.5 ft)
pub const PLATE_DISTANCE: f64 = 18.4;

/// -------------------------
/// Units & Conversions
/// -------------------------

pub fn mph_to_mps(v: f64) -> f64 { v * 0.44704 }
pub fn mps_to_mph(v: f64) -> f64 { v / 0.44704 }

pub fn feet_to_m(ft: f64) -> f64 { ft * 0.3048 }
pub fn m_to_feet(m: f64) -> f64 { m / 0.3048 }

pub fn rpm_to_rad_s(rpm: f64) -> f64 { rpm * std::f64::consts::TAU / 60.0 }

/// -------------------------
/// Ball parameters
/// -------------------------

/// Injectable physical parameters for one simulation run.
///
/// Altitude/weather effects are computed elsewhere and reflected here through
/// `air_density`; nothing in the force model reads a global.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BallConstants {
    /// Air density [kg/m³]
    pub air_density: f64,
    /// Ball cross-sectional area [m²]
    pub cross_sectional_area: f64,
    /// Ball mass [kg]
    pub mass: f64,
    /// Base drag coefficient before spin adjustment
    pub cd_base: f64,
}

impl Default for BallConstants {
    fn default() -> Self {
        Self {
            air_density: RHO_SEA_LEVEL,
            cross_sectional_area: BALL_CROSS_SECTIONAL_AREA,
            mass: BALL_MASS,
            cd_base: CD_BASE,
        }
    }
}

impl BallConstants {
    /// Sea-level constants with a caller-supplied air density.
    pub fn with_air_density(air_density: f64) -> Self {
        Self { air_density, ..Self::default() }
    }
}

/// -------------------------
/// Spin
/// -------------------------

/// Spin state of the ball: scalar rate plus axis direction.
///
/// The axis is normalized once on construction; a zero-magnitude axis is kept
/// as the zero vector, which downstream force code treats as "no Magnus".
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpinState {
    /// Spin rate [rpm], ≥ 0
    pub rate_rpm: f64,
    /// Unit spin axis (right-hand rule), or the zero vector when degenerate
    pub axis: Vector3<f64>,
}

impl SpinState {
    /// Normalize `axis` and clamp the rate to non-negative.
    pub fn new(rate_rpm: f64, axis: Vector3<f64>) -> Self {
        let mag = axis.norm();
        let axis = if mag > 1e-6 { axis / mag } else { Vector3::zeros() };
        Self { rate_rpm: rate_rpm.max(0.0), axis }
    }

    /// No spin at all.
    pub fn none() -> Self {
        Self { rate_rpm: 0.0, axis: Vector3::zeros() }
    }

    /// Build total spin from backspin/sidespin components [rpm].
    ///
    /// Convention (right-hand rule, flight along +x): backspin contributes a
    /// +y axis, sidespin a +z axis. The returned state carries the combined
    /// magnitude and the normalized combined axis; with both components zero
    /// the axis defaults to vertical.
    pub fn from_components(backspin_rpm: f64, sidespin_rpm: f64) -> Self {
        let spin_vector = Vector3::new(0.0, backspin_rpm, sidespin_rpm);
        let total = spin_vector.norm();
        if total > 0.1 {
            Self { rate_rpm: total, axis: spin_vector / total }
        } else {
            Self { rate_rpm: 0.0, axis: Vector3::z() }
        }
    }
}

/// -------------------------
/// Simulation modes
/// -------------------------

/// Speed/accuracy tier for the fixed-step integrator.
///
/// Chosen at simulator construction and immutable for the run; each tier maps
/// to a fixed time step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationMode {
    /// dt = 1 ms; reference accuracy
    Accurate,
    /// dt = 2 ms; ~2× faster, <1% distance error
    Fast,
    /// dt = 5 ms; bulk simulation tier
    UltraFast,
    /// dt = 10 ms; season-scale throughput tier
    Extreme,
}

impl SimulationMode {
    /// Integration time step for this tier [s].
    pub fn dt(self) -> f64 {
        match self {
            SimulationMode::Accurate => 0.001,
            SimulationMode::Fast => 0.002,
            SimulationMode::UltraFast => 0.005,
            SimulationMode::Extreme => 0.010,
        }
    }

    /// Tier recommendation for a given workload size.
    pub fn for_simulation_count(count: usize) -> Self {
        if count >= 100_000 {
            SimulationMode::Extreme
        } else if count >= 10_000 {
            SimulationMode::UltraFast
        } else if count >= 1_000 {
            SimulationMode::Fast
        } else {
            SimulationMode::Accurate
        }
    }
}

/// -------------------------
/// Atmosphere
/// -------------------------

/// Compute air density [kg/m³] from temperature [°C], pressure [hPa],
/// humidity [%]. Feed the result into [`BallConstants::with_air_density`].
pub fn air_density(temp_c: f64, pressure_hpa: f64, humidity_pct: f64) -> f64 {
    let t_kelvin = temp_c + 273.15;
    let p_pa = pressure_hpa * 100.0;
    let rh = (humidity_pct / 100.0).clamp(0.0, 1.0);

    let r_dry = 287.05; // J/(kg·K)
    let r_vapor = 461.495; // J/(kg·K)

    // Saturation vapor pressure over water (Tetens formula)
    let es = 610.94 * f64::exp((17.625 * temp_c) / (temp_c + 243.04));
    let e = rh * es;

    let pd = p_pa - e;

    (pd / (r_dry * t_kelvin)) + (e / (r_vapor * t_kelvin))
}

/* ----------------------------------- tests ---------------------------------- */
