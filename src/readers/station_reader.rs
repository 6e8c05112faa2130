use crate::error::{QcError, Result};
use crate::models::{Frame, Station};
use crate::utils::coordinates::parse_coordinate;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use validator::Validate;

const ID_COLUMNS: [&str; 3] = ["station", "id", "station_id"];
const LATITUDE_COLUMNS: [&str; 2] = ["latitude", "lat"];
const LONGITUDE_COLUMNS: [&str; 3] = ["longitude", "lon", "lng"];
const ELEVATION_COLUMNS: [&str; 3] = ["elevation", "elev", "height"];

/// Reader for station metadata tables
pub struct StationReader;

impl StationReader {
    pub fn new() -> Self {
        Self
    }

    /// Read station metadata from a CSV file with a header row
    pub fn read_stations(&self, path: &Path) -> Result<Vec<Station>> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        let id_col = find_column(&headers, &ID_COLUMNS)?;
        let lat_col = find_column(&headers, &LATITUDE_COLUMNS)?;
        let lon_col = find_column(&headers, &LONGITUDE_COLUMNS)?;
        let elev_col = find_column(&headers, &ELEVATION_COLUMNS).ok();

        let mut stations = Vec::new();
        for record in reader.records() {
            let record = record?;
            let id = record.get(id_col).unwrap_or_default();
            if id.is_empty() {
                continue;
            }

            let latitude = parse_coordinate(record.get(lat_col).unwrap_or_default())?;
            let longitude = parse_coordinate(record.get(lon_col).unwrap_or_default())?;
            let elevation = match elev_col.and_then(|c| record.get(c)) {
                None | Some("") => None,
                Some(value) => Some(value.parse::<f64>().map_err(|_| {
                    QcError::InvalidFormat(format!("Invalid elevation: '{}'", value))
                })?),
            };

            let station = Station::new(id, latitude, longitude, elevation);
            station.validate()?;
            stations.push(station);
        }

        Ok(stations)
    }

    /// Read station metadata into a map keyed by station ID
    pub fn read_stations_map(&self, path: &Path) -> Result<HashMap<String, Station>> {
        let stations = self.read_stations(path)?;
        let mut map = HashMap::with_capacity(stations.len());

        for station in stations {
            map.insert(station.id.clone(), station);
        }

        Ok(map)
    }

    /// Stations in the column order of `frame`; every column needs coordinates
    pub fn read_stations_for<T: Copy>(&self, path: &Path, frame: &Frame<T>) -> Result<Vec<Station>> {
        let mut map = self.read_stations_map(path)?;
        frame
            .stations()
            .iter()
            .map(|id| {
                map.remove(id)
                    .ok_or_else(|| QcError::StationNotFound(id.clone()))
            })
            .collect()
    }
}

impl Default for StationReader {
    fn default() -> Self {
        Self::new()
    }
}

fn find_column(headers: &[String], names: &[&str]) -> Result<usize> {
    headers
        .iter()
        .position(|h| names.contains(&h.as_str()))
        .ok_or_else(|| {
            QcError::InvalidFormat(format!(
                "Station table is missing a '{}' column",
                names[0]
            ))
        })
}
