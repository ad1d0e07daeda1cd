//! Geographic calculations

use anyhow::Result;

use crate::types::Coordinates;

/// Earth radius in miles
const EARTH_RADIUS_MI: f64 = 3958.8;

/// Road distance coefficient (straight line to road)
pub const ROAD_COEFFICIENT: f64 = 1.3;

/// Average truck speed used when no routing engine is available
pub const AVERAGE_SPEED_MPH: f64 = 60.0;

/// Calculate Haversine distance between two points in miles
pub fn haversine_miles(from: &Coordinates, to: &Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lng - from.lng).to_radians();

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_MI * c
}

/// Estimate road distance from straight-line distance
pub fn road_miles(from: &Coordinates, to: &Coordinates) -> f64 {
    haversine_miles(from, to) * ROAD_COEFFICIENT
}

/// Total length of a path in miles
pub fn path_miles(path: &[Coordinates]) -> f64 {
    path.windows(2).map(|w| haversine_miles(&w[0], &w[1])).sum()
}

/// Point at `fraction` (0..=1) of the way along `path`, measured by length.
///
/// Returns `None` for paths with fewer than two points.
pub fn interpolate_along(path: &[Coordinates], fraction: f64) -> Option<Coordinates> {
    if path.len() < 2 || !fraction.is_finite() {
        return None;
    }
    let fraction = fraction.clamp(0.0, 1.0);

    let total = path_miles(path);
    if total <= 0.0 {
        return Some(path[0]);
    }

    let target = total * fraction;
    let mut walked = 0.0;
    for w in path.windows(2) {
        let segment = haversine_miles(&w[0], &w[1]);
        if segment > 0.0 && walked + segment >= target {
            let t = (target - walked) / segment;
            return Some(Coordinates {
                lat: w[0].lat + (w[1].lat - w[0].lat) * t,
                lng: w[0].lng + (w[1].lng - w[0].lng) * t,
            });
        }
        walked += segment;
    }
    path.last().copied()
}

/// Decode an encoded polyline into coordinates.
/// Precision is 6 decimal places for Valhalla (vs 5 for Google)
pub fn decode_polyline(encoded: &str, precision: u32) -> Result<Vec<Coordinates>> {
    let factor = 10_f64.powi(precision as i32);
    let mut coordinates = Vec::new();
    let mut lat = 0i64;
    let mut lng = 0i64;

    let bytes = encoded.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        lat += decode_value(bytes, &mut i)?;
        lng += decode_value(bytes, &mut i)?;
        coordinates.push(Coordinates {
            lat: lat as f64 / factor,
            lng: lng as f64 / factor,
        });
    }

    Ok(coordinates)
}

fn decode_value(bytes: &[u8], i: &mut usize) -> Result<i64> {
    let mut shift = 0;
    let mut result = 0i64;
    loop {
        if *i >= bytes.len() || shift > 60 {
            anyhow::bail!("Invalid polyline encoding");
        }
        let byte = bytes[*i] as i64 - 63;
        *i += 1;
        result |= (byte & 0x1f) << shift;
        shift += 5;
        if byte < 0x20 {
            break;
        }
    }
    Ok(if result & 1 != 0 { !(result >> 1) } else { result >> 1 })
}

/// Encode coordinates as a polyline
pub fn encode_polyline(path: &[Coordinates], precision: u32) -> String {
    let factor = 10_f64.powi(precision as i32);
    let mut encoded = String::new();
    let mut prev_lat = 0i64;
    let mut prev_lng = 0i64;

    for point in path {
        let lat = (point.lat * factor).round() as i64;
        let lng = (point.lng * factor).round() as i64;
        encode_value(lat - prev_lat, &mut encoded);
        encode_value(lng - prev_lng, &mut encoded);
        prev_lat = lat;
        prev_lng = lng;
    }

    encoded
}

fn encode_value(value: i64, out: &mut String) {
    let mut v = if value < 0 { !(value << 1) } else { value << 1 };
    while v >= 0x20 {
        out.push((((v & 0x1f) | 0x20) as u8 + 63) as char);
        v >>= 5;
    }
    out.push((v as u8 + 63) as char);
}
