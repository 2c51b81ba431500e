//! Great-circle distance on the WGS-ish sphere used for speed
//! reconstruction and road grade.

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two WGS84 coordinates.
///
/// NaN in any input propagates to a NaN result.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Guard the asin domain without flattening NaN (f64::min would).
    let s = a.sqrt();
    let s = if s > 1.0 { 1.0 } else { s };
    2.0 * EARTH_RADIUS_M * s.asin()
}

/// Consecutive-fix distances for aligned coordinate series.
///
/// `out[0]` is NaN; `out[i]` is the distance from fix `i-1` to fix `i`.
pub fn step_distances_m(lat: &[f64], lon: &[f64]) -> Vec<f64> {
    let n = lat.len().min(lon.len());
    let mut out = vec![f64::NAN; n];
    for i in 1..n {
        out[i] = haversine_m(lat[i - 1], lon[i - 1], lat[i], lon[i]);
    }
    out
}
