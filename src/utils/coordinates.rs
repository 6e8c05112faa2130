use crate::error::{QcError, Result};
use crate::models::Station;

/// Convert DMS (Degrees:Minutes:Seconds) format to decimal degrees
///
/// # Examples
/// ```
/// use met_qc::utils::dms_to_decimal;
///
/// let decimal = dms_to_decimal("43:06:38").unwrap();
/// assert!((decimal - 43.110556).abs() < 0.000001);
/// ```
pub fn dms_to_decimal(dms: &str) -> Result<f64> {
    let parts: Vec<&str> = dms.split(':').collect();

    if parts.len() != 3 {
        return Err(QcError::InvalidCoordinate(format!(
            "Invalid DMS format: '{}'. Expected format: 'DD:MM:SS'",
            dms
        )));
    }

    let is_negative = dms.starts_with('-');

    let degrees = parts[0].parse::<f64>().map_err(|_| {
        QcError::InvalidCoordinate(format!("Invalid degrees value: '{}'", parts[0]))
    })?;

    let minutes = parts[1].parse::<f64>().map_err(|_| {
        QcError::InvalidCoordinate(format!("Invalid minutes value: '{}'", parts[1]))
    })?;

    let seconds = parts[2].parse::<f64>().map_err(|_| {
        QcError::InvalidCoordinate(format!("Invalid seconds value: '{}'", parts[2]))
    })?;

    if !(0.0..60.0).contains(&minutes) {
        return Err(QcError::InvalidCoordinate(format!(
            "Minutes must be between 0 and 60, got: {}",
            minutes
        )));
    }

    if !(0.0..60.0).contains(&seconds) {
        return Err(QcError::InvalidCoordinate(format!(
            "Seconds must be between 0 and 60, got: {}",
            seconds
        )));
    }

    let decimal_value = degrees.abs() + minutes / 60.0 + seconds / 3600.0;

    if is_negative {
        Ok(-decimal_value)
    } else {
        Ok(decimal_value)
    }
}

/// Parse coordinate that might be in DMS or decimal format
pub fn parse_coordinate(coord_str: &str) -> Result<f64> {
    let trimmed = coord_str.trim();

    if !trimmed.contains(':') {
        trimmed.parse::<f64>().map_err(|_| {
            QcError::InvalidCoordinate(format!("Invalid coordinate value: '{}'", coord_str))
        })
    } else {
        dms_to_decimal(trimmed)
    }
}

/// Calculate the distance between two points using the Haversine formula
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Mean distance from each station to its nearest neighbour, in decimal
/// degrees and kilometres. `None` with fewer than two stations.
///
/// The search radius of the spatial test should be close to this spacing.
pub fn mean_nearest_spacing(stations: &[Station]) -> Option<(f64, f64)> {
    if stations.len() < 2 {
        return None;
    }

    let (deg_sum, km_sum) = stations
        .iter()
        .enumerate()
        .map(|(i, a)| {
            stations
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, b)| {
                    let deg = ((a.latitude - b.latitude).powi(2)
                        + (a.longitude - b.longitude).powi(2))
                    .sqrt();
                    let km = haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude);
                    (deg, km)
                })
                .fold((f64::INFINITY, f64::INFINITY), |acc, d| {
                    (acc.0.min(d.0), acc.1.min(d.1))
                })
        })
        .fold((0.0, 0.0), |acc, d| (acc.0 + d.0, acc.1 + d.1));

    let n = stations.len() as f64;
    Some((deg_sum / n, km_sum / n))
}
