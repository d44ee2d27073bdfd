//! Great-circle geometry and theoretical arrival times.

pub mod traveltime;

pub use traveltime::{theoretical_arrival, Phase, TravelTimeModel, TravelTimeTable};

/// Kilometres per degree of arc on the mean earth sphere.
pub const KM_PER_DEGREE: f64 = 111.195;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const MEAN_RADIUS_KM: f64 = 6371.0088;
const VINCENTY_MAX_ITERATIONS: usize = 200;

pub fn km_to_degrees(distance_km: f64) -> f64 {
    distance_km / KM_PER_DEGREE
}

pub fn degrees_to_km(distance_deg: f64) -> f64 {
    distance_deg * KM_PER_DEGREE
}

/// Geodesic distance (km) and forward azimuth (degrees clockwise from north,
/// in `[0, 360)`) from point 1 to point 2 on the WGS84 ellipsoid.
///
/// Uses the Vincenty inverse solution and falls back to a spherical
/// solution when the iteration does not converge (nearly antipodal points).
pub fn distance_and_azimuth(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> (f64, f64) {
    vincenty_inverse(lat1, lon1, lat2, lon2)
        .unwrap_or_else(|| spherical_inverse(lat1, lon1, lat2, lon2))
}

fn normalize_azimuth(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

fn vincenty_inverse(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<(f64, f64)> {
    let a = WGS84_A;
    let f = WGS84_F;
    let b = (1.0 - f) * a;

    let l = (lon2 - lon1).to_radians();
    let u1 = ((1.0 - f) * lat1.to_radians().tan()).atan();
    let u2 = ((1.0 - f) * lat2.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..VINCENTY_MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            return Some((0.0, 0.0));
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha == 0
        let cos_2sigma_m = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            0.0
        };
        let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
        let previous = lambda;
        lambda = l
            + (1.0 - c)
                * f
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))));

        if (lambda - previous).abs() < 1e-12 {
            let u_sq = cos_sq_alpha * (a * a - b * b) / (b * b);
            let big_a =
                1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma.powi(2))
                                * (-3.0 + 4.0 * cos_2sigma_m.powi(2))));
            let distance_m = b * big_a * (sigma - delta_sigma);

            let (sin_lambda, cos_lambda) = lambda.sin_cos();
            let alpha1 = (cos_u2 * sin_lambda).atan2(cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda);
            return Some((distance_m / 1000.0, normalize_azimuth(alpha1.to_degrees())));
        }
    }
    None
}

fn spherical_inverse(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> (f64, f64) {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = phi2 - phi1;
    let d_lambda = (lon2 - lon1).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let central = 2.0 * h.sqrt().min(1.0).asin();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    (
        MEAN_RADIUS_KM * central,
        normalize_azimuth(y.atan2(x).to_degrees()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            ((35.0, 139.0), (-33.9, 18.4)),
            ((64.8, -147.9), (-41.3, 174.7)),
            ((0.0, 0.0), (10.0, 10.0)),
            ((-89.0, 0.0), (89.0, 179.0)),
        ];
        for ((lat1, lon1), (lat2, lon2)) in pairs {
            let (ab, _) = distance_and_azimuth(lat1, lon1, lat2, lon2);
            let (ba, _) = distance_and_azimuth(lat2, lon2, lat1, lon1);
            assert!((ab - ba).abs() < 1e-6, "{} vs {}", ab, ba);
        }
    }

    #[test]
    fn one_degree_along_equator_matches_ellipsoid() {
        let (distance, azimuth) = distance_and_azimuth(0.0, 0.0, 0.0, 1.0);
        assert!((distance - 111.319_49).abs() < 0.01);
        assert!((azimuth - 90.0).abs() < 1e-9);
    }

    #[test]
    fn swapping_points_gives_back_azimuth_on_equator() {
        let (_, forward) = distance_and_azimuth(0.0, 10.0, 0.0, 20.0);
        let (_, back) = distance_and_azimuth(0.0, 20.0, 0.0, 10.0);
        assert!((forward - 90.0).abs() < 1e-9);
        assert!((back - 270.0).abs() < 1e-9);
    }

    #[test]
    fn due_north_has_zero_azimuth() {
        let (distance, azimuth) = distance_and_azimuth(10.0, 5.0, 20.0, 5.0);
        assert!(azimuth.abs() < 1e-9);
        assert!((distance - 1106.0).abs() < 5.0);
    }

    #[test]
    fn coincident_points_are_zero() {
        assert_eq!(distance_and_azimuth(12.0, 34.0, 12.0, 34.0), (0.0, 0.0));
    }

    #[test]
    fn near_antipodal_points_fall_back_without_panicking() {
        let (distance, azimuth) = distance_and_azimuth(0.0, 0.0, 0.5, 179.7);
        assert!(distance > 19_900.0 && distance < 20_100.0);
        assert!((0.0..360.0).contains(&azimuth));
    }

    #[test]
    fn degree_conversion_round_trips() {
        assert!((km_to_degrees(degrees_to_km(42.0)) - 42.0).abs() < 1e-12);
    }
}
