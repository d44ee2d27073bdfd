//! Precomputed 1-D earth travel times for direct P and S.
//!
//! The model is built once from a surface-focus table and an IASP91-style
//! layered velocity profile, then answers `(depth, distance, phase)` queries
//! by bilinear interpolation over a depth × distance grid. Construction is
//! the expensive part; share one instance (`Arc<TravelTimeModel>`) between
//! the engines.

use super::KM_PER_DEGREE;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;
const INTEGRATION_STEP_KM: f64 = 0.5;
const GRID_DISTANCE_STEP_DEG: f64 = 0.5;
const GRID_DEPTHS_KM: [f64; 15] = [
    0.0, 10.0, 20.0, 35.0, 50.0, 75.0, 100.0, 150.0, 200.0, 250.0, 300.0, 400.0, 500.0, 600.0,
    700.0,
];

/// Seismic phase understood by the travel-time utilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    P,
    S,
    /// Surface waves; never in the model, always a constant-velocity estimate.
    Surface,
}

impl Phase {
    /// Average velocity (km/s) used when the model has no answer.
    pub fn constant_velocity_km_s(self) -> f64 {
        match self {
            Phase::P => 8.0,
            Phase::S => 4.5,
            Phase::Surface => 3.5,
        }
    }

    /// Constant-velocity arrival estimate in seconds after origin.
    pub fn constant_velocity_estimate(self, distance_km: f64) -> f64 {
        distance_km / self.constant_velocity_km_s()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("invalid travel-time table: {0}")]
    InvalidTable(String),
    #[error("travel-time table is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Surface-focus travel times sampled along epicentral distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelTimeTable {
    pub distances_deg: Vec<f64>,
    pub p_times_s: Vec<f64>,
    pub s_times_s: Vec<f64>,
}

impl TravelTimeTable {
    /// Approximate IASP91 surface-focus P and S times, 0–100° in 5° steps.
    pub fn iasp91_surface() -> Self {
        let distances_deg = (0..=20).map(|i| i as f64 * 5.0).collect();
        let p_times_s = vec![
            0.0, 76.5, 143.0, 210.0, 277.0, 327.0, 372.0, 416.0, 458.0, 499.0, 538.0, 574.0,
            608.0, 640.0, 671.0, 700.0, 729.0, 756.0, 781.0, 803.0, 825.0,
        ];
        let s_times_s = vec![
            0.0, 136.0, 255.0, 375.0, 497.0, 590.0, 672.0, 750.0, 824.0, 896.0, 965.0, 1032.0,
            1097.0, 1158.0, 1218.0, 1274.0, 1328.0, 1378.0, 1424.0, 1468.0, 1510.0,
        ];
        Self {
            distances_deg,
            p_times_s,
            s_times_s,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let table: TravelTimeTable = serde_json::from_str(text)?;
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.distances_deg.len();
        if n < 2 {
            return Err(ModelError::InvalidTable("need at least two distances".into()));
        }
        if self.p_times_s.len() != n || self.s_times_s.len() != n {
            return Err(ModelError::InvalidTable(format!(
                "{} distances but {} P and {} S times",
                n,
                self.p_times_s.len(),
                self.s_times_s.len()
            )));
        }
        if self.distances_deg[0] != 0.0 {
            return Err(ModelError::InvalidTable("distances must start at 0°".into()));
        }
        if self.distances_deg.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(ModelError::InvalidTable(
                "distances must be strictly increasing".into(),
            ));
        }
        let all_times = self.p_times_s.iter().chain(self.s_times_s.iter());
        if all_times.clone().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ModelError::InvalidTable(
                "times must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }

    fn max_distance_deg(&self) -> f64 {
        self.distances_deg.last().copied().unwrap_or(0.0)
    }

    fn times(&self, phase: Phase) -> &[f64] {
        match phase {
            Phase::S => &self.s_times_s,
            _ => &self.p_times_s,
        }
    }

    fn interpolate(&self, phase: Phase, distance_deg: f64) -> f64 {
        let times = self.times(phase);
        let xs = &self.distances_deg;
        let upper = xs.partition_point(|&x| x < distance_deg).clamp(1, xs.len() - 1);
        let (x0, x1) = (xs[upper - 1], xs[upper]);
        let fraction = ((distance_deg - x0) / (x1 - x0)).clamp(0.0, 1.0);
        times[upper - 1] + fraction * (times[upper] - times[upper - 1])
    }

    /// Ray parameter `dT/dΔ` in seconds per degree.
    fn slowness_s_per_deg(&self, phase: Phase, distance_deg: f64) -> f64 {
        let half = GRID_DISTANCE_STEP_DEG / 2.0;
        let lo = (distance_deg - half).max(0.0);
        let hi = (distance_deg + half).min(self.max_distance_deg());
        if hi <= lo {
            return 0.0;
        }
        (self.interpolate(phase, hi) - self.interpolate(phase, lo)) / (hi - lo)
    }
}

/// Layered IASP91-like velocity (km/s) at `depth_km`.
fn profile_velocity(phase: Phase, depth_km: f64) -> f64 {
    let lerp = |z0: f64, z1: f64, v0: f64, v1: f64| v0 + (v1 - v0) * (depth_km - z0) / (z1 - z0);
    match phase {
        Phase::S => match depth_km {
            z if z < 20.0 => 3.36,
            z if z < 35.0 => 3.75,
            z if z < 210.0 => lerp(35.0, 210.0, 4.47, 4.52),
            z if z < 410.0 => lerp(210.0, 410.0, 4.52, 4.87),
            z if z < 660.0 => lerp(410.0, 660.0, 5.07, 5.57),
            _ => lerp(660.0, 760.0, 5.95, 6.21),
        },
        _ => match depth_km {
            z if z < 20.0 => 5.80,
            z if z < 35.0 => 6.50,
            z if z < 210.0 => lerp(35.0, 210.0, 8.04, 8.30),
            z if z < 410.0 => lerp(210.0, 410.0, 8.30, 9.03),
            z if z < 660.0 => lerp(410.0, 660.0, 9.36, 10.20),
            _ => lerp(660.0, 760.0, 10.79, 11.06),
        },
    }
}

/// Depth × distance travel-time grids for P and S.
#[derive(Debug, Clone)]
pub struct TravelTimeModel {
    depths_km: Vec<f64>,
    distances_deg: Vec<f64>,
    p_grid: Array2<f64>,
    s_grid: Array2<f64>,
}

impl TravelTimeModel {
    /// Builds the model from the bundled IASP91 surface table.
    pub fn iasp91() -> Self {
        let table = TravelTimeTable::iasp91_surface();
        let (p_grid, s_grid, distances_deg) = Self::build_grids(&table);
        Self {
            depths_km: GRID_DEPTHS_KM.to_vec(),
            distances_deg,
            p_grid,
            s_grid,
        }
    }

    pub fn from_table(table: &TravelTimeTable) -> Result<Self, ModelError> {
        table.validate()?;
        let (p_grid, s_grid, distances_deg) = Self::build_grids(table);
        Ok(Self {
            depths_km: GRID_DEPTHS_KM.to_vec(),
            distances_deg,
            p_grid,
            s_grid,
        })
    }

    fn build_grids(table: &TravelTimeTable) -> (Array2<f64>, Array2<f64>, Vec<f64>) {
        let columns = (table.max_distance_deg() / GRID_DISTANCE_STEP_DEG).floor() as usize + 1;
        let distances_deg: Vec<f64> = (0..columns)
            .map(|i| i as f64 * GRID_DISTANCE_STEP_DEG)
            .collect();
        let p_grid = Self::phase_grid(table, Phase::P, &distances_deg);
        let s_grid = Self::phase_grid(table, Phase::S, &distances_deg);
        (p_grid, s_grid, distances_deg)
    }

    /// Reduces surface-focus times to each grid depth by integrating the
    /// vertical slowness between the source and the surface.
    fn phase_grid(table: &TravelTimeTable, phase: Phase, distances_deg: &[f64]) -> Array2<f64> {
        let mut grid = Array2::<f64>::zeros((GRID_DEPTHS_KM.len(), distances_deg.len()));
        for (column, &distance_deg) in distances_deg.iter().enumerate() {
            let surface_time = table.interpolate(phase, distance_deg);
            let p_surface = table.slowness_s_per_deg(phase, distance_deg) / KM_PER_DEGREE;

            let mut z = 0.0;
            let mut reduction = 0.0;
            let mut vertical_time = 0.0;
            for (row, &depth) in GRID_DEPTHS_KM.iter().enumerate() {
                while z + INTEGRATION_STEP_KM <= depth + 1e-9 {
                    let mid = z + INTEGRATION_STEP_KM / 2.0;
                    let slowness = 1.0 / profile_velocity(phase, mid);
                    let horizontal = p_surface * EARTH_RADIUS_KM / (EARTH_RADIUS_KM - mid);
                    let vertical = (slowness * slowness - horizontal * horizontal).max(0.0).sqrt();
                    reduction += vertical * INTEGRATION_STEP_KM;
                    vertical_time += slowness * INTEGRATION_STEP_KM;
                    z += INTEGRATION_STEP_KM;
                }
                grid[[row, column]] = (surface_time - reduction).max(vertical_time);
            }
        }
        grid
    }

    pub fn max_depth_km(&self) -> f64 {
        self.depths_km.last().copied().unwrap_or(0.0)
    }

    pub fn max_distance_deg(&self) -> f64 {
        self.distances_deg.last().copied().unwrap_or(0.0)
    }

    /// Arrival time in seconds after origin, or `None` when the phase is not
    /// defined for the inputs (surface waves, distance beyond the table,
    /// source below the grid, non-finite arguments).
    pub fn arrival(&self, depth_km: f64, distance_deg: f64, phase: Phase) -> Option<f64> {
        let grid = match phase {
            Phase::P => &self.p_grid,
            Phase::S => &self.s_grid,
            Phase::Surface => return None,
        };
        if !depth_km.is_finite() || !distance_deg.is_finite() {
            return None;
        }
        if depth_km < 0.0 || depth_km > self.max_depth_km() {
            return None;
        }
        if distance_deg < 0.0 || distance_deg > self.max_distance_deg() {
            return None;
        }

        let (r0, r1, fr) = bracket(&self.depths_km, depth_km);
        let (c0, c1, fc) = bracket(&self.distances_deg, distance_deg);
        let top = grid[[r0, c0]] + fc * (grid[[r0, c1]] - grid[[r0, c0]]);
        let bottom = grid[[r1, c0]] + fc * (grid[[r1, c1]] - grid[[r1, c0]]);
        let time = top + fr * (bottom - top);
        time.is_finite().then_some(time)
    }
}

fn bracket(nodes: &[f64], value: f64) -> (usize, usize, f64) {
    if nodes.len() < 2 {
        return (0, 0, 0.0);
    }
    let upper = nodes.partition_point(|&x| x < value).clamp(1, nodes.len() - 1);
    let lower = upper - 1;
    let fraction = ((value - nodes[lower]) / (nodes[upper] - nodes[lower])).clamp(0.0, 1.0);
    (lower, upper, fraction)
}

/// Theoretical arrival (seconds after origin) of `phase` at `distance_km`.
///
/// P and S come from the model and yield `None` where the phase does not
/// exist; callers then use [`Phase::constant_velocity_estimate`]. Surface
/// waves are always the constant-velocity estimate.
pub fn theoretical_arrival(
    model: &TravelTimeModel,
    depth_km: f64,
    distance_km: f64,
    phase: Phase,
) -> Option<f64> {
    match phase {
        Phase::Surface if distance_km.is_finite() && distance_km >= 0.0 => {
            Some(phase.constant_velocity_estimate(distance_km))
        }
        Phase::Surface => None,
        _ => model.arrival(depth_km, distance_km / KM_PER_DEGREE, phase),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_focus_matches_table_at_nodes() {
        let model = TravelTimeModel::iasp91();
        let p = model.arrival(0.0, 30.0, Phase::P).unwrap();
        let s = model.arrival(0.0, 30.0, Phase::S).unwrap();
        assert!((p - 372.0).abs() < 1e-6);
        assert!((s - 672.0).abs() < 1e-6);
    }

    #[test]
    fn s_arrives_after_p() {
        let model = TravelTimeModel::iasp91();
        for distance in [5.0, 22.5, 47.0, 88.0] {
            let p = model.arrival(33.0, distance, Phase::P).unwrap();
            let s = model.arrival(33.0, distance, Phase::S).unwrap();
            assert!(s > p, "S {} <= P {} at {}°", s, p, distance);
        }
    }

    #[test]
    fn deeper_sources_arrive_earlier_at_teleseismic_range() {
        let model = TravelTimeModel::iasp91();
        let shallow = model.arrival(10.0, 60.0, Phase::P).unwrap();
        let deep = model.arrival(600.0, 60.0, Phase::P).unwrap();
        assert!(deep < shallow);
        assert!(shallow - deep > 20.0);
    }

    #[test]
    fn directly_above_the_source_is_vertical_travel_time() {
        let model = TravelTimeModel::iasp91();
        let t = model.arrival(100.0, 0.0, Phase::P).unwrap();
        assert!(t > 10.0 && t < 16.0, "{}", t);
    }

    #[test]
    fn missing_phase_returns_none() {
        let model = TravelTimeModel::iasp91();
        assert!(model.arrival(10.0, 120.0, Phase::P).is_none());
        assert!(model.arrival(800.0, 40.0, Phase::S).is_none());
        assert!(model.arrival(f64::NAN, 40.0, Phase::P).is_none());
        assert!(theoretical_arrival(&model, 10.0, 15_000.0, Phase::P).is_none());
    }

    #[test]
    fn surface_phase_uses_constant_velocity() {
        let model = TravelTimeModel::iasp91();
        let t = theoretical_arrival(&model, 10.0, 3500.0, Phase::Surface).unwrap();
        assert!((t - 1000.0).abs() < 1e-9);
        assert!((Phase::P.constant_velocity_estimate(800.0) - 100.0).abs() < 1e-12);
    }

    #[test]
    fn lookups_are_deterministic() {
        let model = TravelTimeModel::iasp91();
        let a = theoretical_arrival(&model, 42.0, 3333.0, Phase::S);
        let b = theoretical_arrival(&model, 42.0, 3333.0, Phase::S);
        assert_eq!(a, b);
    }

    #[test]
    fn table_round_trips_through_json() {
        let table = TravelTimeTable::iasp91_surface();
        let text = serde_json::to_string(&table).unwrap();
        let parsed = TravelTimeTable::from_json(&text).unwrap();
        let model = TravelTimeModel::from_table(&parsed).unwrap();
        assert_eq!(model.max_distance_deg(), 100.0);
    }

    #[test]
    fn invalid_table_is_rejected() {
        let text = r#"{"distances_deg":[0.0,5.0],"p_times_s":[0.0],"s_times_s":[0.0,1.0]}"#;
        assert!(matches!(
            TravelTimeTable::from_json(text),
            Err(ModelError::InvalidTable(_))
        ));
    }
}
