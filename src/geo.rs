//! Geodesic helpers on a spherical Earth
//!
//!  Distances are great-circle (haversine) in meters, bearings are compass
//!  degrees in `[0, 360)`.

use std::f64::consts::{FRAC_PI_4, PI};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two lat/lon points (degrees).
pub fn distance(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let lat_a_rad = lat_a.to_radians();
    let lat_b_rad = lat_b.to_radians();
    let delta_lat = (lat_b - lat_a).to_radians();
    let delta_lon = (lon_b - lon_a).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat_a_rad.cos() * lat_b_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push `a` just past 1.0 for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Bearing in degrees from the first point to the second.
///
/// Uses the rhumb-line formulation: `atan2(Δλ, Δψ)` where `Δψ` is the
/// difference of Mercator-projected latitudes. Identical points give 0.
pub fn bearing(lat_from: f64, lon_from: f64, lat_to: f64, lon_to: f64) -> f64 {
    let lat_from_rad = lat_from.to_radians();
    let lat_to_rad = lat_to.to_radians();

    let mut delta_lon = (lon_to - lon_from).to_radians();
    let delta_psi =
        ((lat_to_rad / 2.0 + FRAC_PI_4).tan() / (lat_from_rad / 2.0 + FRAC_PI_4).tan()).ln();

    // Take the short way round across the antimeridian
    if delta_lon > PI {
        delta_lon -= 2.0 * PI;
    } else if delta_lon < -PI {
        delta_lon += 2.0 * PI;
    }

    let bearing = delta_lon.atan2(delta_psi).to_degrees();
    if !bearing.is_finite() {
        return 0.0;
    }

    let normalized = (bearing + 360.0) % 360.0;
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// Round a coordinate to `places` decimal places, ties to even.
///
/// Negative `places` rounds to tens, hundreds, ...
pub fn round_to(value: f64, places: i32) -> f64 {
    if places >= 0 {
        // Formatting rounds the exact binary value, so 2.675 (stored as
        // 2.67499...) becomes 2.67 rather than being scaled up to a tie first
        return format!("{:.*}", places as usize, value)
            .parse()
            .unwrap_or(value);
    }
    let step = 10f64.powi(-places);
    let rounded = (value / step).round_ties_even() * step;
    if rounded.is_finite() { rounded } else { value }
}

/// Round an integer altitude to `places` decimal places, ties to even.
///
/// Only negative `places` has an effect: -2 rounds to the nearest 100.
pub fn round_altitude(altitude: i32, places: i32) -> i32 {
    if places >= 0 {
        return altitude;
    }
    // 10^9 is the largest power of ten that fits an i32 altitude
    let Some(step) = 10i64.checked_pow(places.unsigned_abs().min(9)) else {
        return altitude;
    };

    let value = altitude as i64;
    let quotient = value.div_euclid(step);
    let remainder = value.rem_euclid(step);

    let quotient = match (remainder * 2).cmp(&step) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => quotient + quotient.rem_euclid(2),
    };

    (quotient * step).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
