//! Numerical helpers shared by the checks.

use crate::models::Station;

/// Saturation vapour pressure coefficient (hPa)
const BOLTON_E0: f64 = 6.112;
const BOLTON_A: f64 = 17.67;
const BOLTON_B: f64 = 243.5;

/// Lower bound applied to regression RMSE so weights stay finite
pub const MIN_RMSE: f64 = 1e-4;

/// Dewpoint temperature (°C) from temperature (°C) and relative humidity (%).
///
/// Inverts the Bolton (1980) saturation vapour pressure formula:
/// `e* = 6.112 exp(17.67 T / (T + 243.5))`, `e = RH/100 e*` and
/// `Td = 243.5 ln(e/6.112) / (17.67 - ln(e/6.112))`.
pub fn dewpoint(temperature: f64, relative_humidity: f64) -> f64 {
    let saturation = BOLTON_E0 * ((BOLTON_A * temperature) / (temperature + BOLTON_B)).exp();
    let vapour = (relative_humidity / 100.0) * saturation;
    let ln_ratio = (vapour / BOLTON_E0).ln();
    (BOLTON_B * ln_ratio) / (BOLTON_A - ln_ratio)
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Indices of `points` lying within `radius` decimal degrees of `center`.
///
/// Distance is Euclidean in the (lat, lon) plane and the boundary is inclusive.
pub fn find_neighbors(points: &[[f64; 2]], center: [f64; 2], radius: f64) -> Vec<usize> {
    let radius_sq = radius * radius;
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            let dlat = p[0] - center[0];
            let dlon = p[1] - center[1];
            dlat * dlat + dlon * dlon <= radius_sq
        })
        .map(|(i, _)| i)
        .collect()
}

/// Neighbours of `stations[target]` among the other stations, as indices into `stations`
pub fn station_neighbors(stations: &[Station], target: usize, radius: f64) -> Vec<usize> {
    let others: Vec<usize> = (0..stations.len()).filter(|&i| i != target).collect();
    let points: Vec<[f64; 2]> = others.iter().map(|&i| stations[i].position()).collect();
    find_neighbors(&points, stations[target].position(), radius)
        .into_iter()
        .map(|i| others[i])
        .collect()
}

/// Ordinary least squares fit `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Fit over the pairs where both values are present; `None` without any pair.
    pub fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        let pairs: Vec<(f64, f64)> = x
            .iter()
            .zip(y)
            .filter(|(a, b)| !a.is_nan() && !b.is_nan())
            .map(|(&a, &b)| (a, b))
            .collect();
        if pairs.is_empty() {
            return None;
        }

        let n = pairs.len() as f64;
        let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (a, b) in &pairs {
            sxx += (a - mean_x) * (a - mean_x);
            sxy += (a - mean_x) * (b - mean_y);
        }

        // constant predictor: minimum-norm solution
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Root mean square error of the fit over the jointly present pairs
    pub fn rmse(&self, x: &[f64], y: &[f64]) -> f64 {
        let (sum, count) = x
            .iter()
            .zip(y)
            .filter(|(a, b)| !a.is_nan() && !b.is_nan())
            .fold((0.0, 0usize), |(sum, count), (&a, &b)| {
                let err = self.predict(a) - b;
                (sum + err * err, count + 1)
            });
        if count == 0 {
            f64::NAN
        } else {
            (sum / count as f64).sqrt()
        }
    }
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

/// Quantile with linear interpolation between order statistics.
/// `sorted` must be in ascending order.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Maximum that propagates `NaN`
#[inline]
pub fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}
