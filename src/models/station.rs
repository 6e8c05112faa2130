use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Station {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    pub elevation: Option<f64>,
}

impl Station {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64, elevation: Option<f64>) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            elevation,
        }
    }

    /// Position as (lat, lon) in decimal degrees
    pub fn position(&self) -> [f64; 2] {
        [self.latitude, self.longitude]
    }
}
