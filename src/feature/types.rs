//! Feature types and the small value types shared by the feature collections.

use crate::data::Row;
use crate::error::PointFlatError;
use std::fmt;
use std::str::FromStr;

/// Logical shape of a point dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureType {
    /// Unconnected observations.
    Point,
    /// Time series at fixed locations.
    Station,
    /// Vertical profiles.
    Profile,
    /// Time series of profiles at fixed locations.
    StationProfile,
    /// Observations along a path.
    Trajectory,
    /// Profiles along a path.
    Section,
}

impl FeatureType {
    /// Number of nesting levels of a canonical layout of this type.
    pub fn levels(self) -> usize {
        match self {
            Self::Point => 1,
            Self::Station | Self::Profile | Self::Trajectory => 2,
            Self::StationProfile | Self::Section => 3,
        }
    }

    /// CF `featureType` name.
    pub fn cf_name(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Station => "timeSeries",
            Self::Profile => "profile",
            Self::StationProfile => "timeSeriesProfile",
            Self::Trajectory => "trajectory",
            Self::Section => "trajectoryProfile",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Point => "POINT",
            Self::Station => "STATION",
            Self::Profile => "PROFILE",
            Self::StationProfile => "STATION_PROFILE",
            Self::Trajectory => "TRAJECTORY",
            Self::Section => "SECTION",
        };
        f.write_str(s)
    }
}

impl FromStr for FeatureType {
    type Err = PointFlatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "point" => Self::Point,
            "station" | "timeseries" | "time_series" => Self::Station,
            "profile" => Self::Profile,
            "station_profile" | "stationprofile" | "timeseriesprofile" | "time_series_profile" => {
                Self::StationProfile
            },
            "trajectory" => Self::Trajectory,
            "section" | "trajectoryprofile" | "trajectory_profile" => Self::Section,
            _ => {
                return Err(PointFlatError::Conversion(format!("Unknown feature type '{}'", s)));
            },
        };
        Ok(t)
    }
}

/// A point on the earth. Altitude is NaN when unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarthLocation {
    /// Latitude in degrees north.
    pub lat: f64,
    /// Longitude in degrees east.
    pub lon: f64,
    /// Altitude, in the units of the altitude coordinate.
    pub alt: f64,
}

impl EarthLocation {
    /// Create a location.
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    /// Check if latitude or longitude is missing.
    pub fn is_missing(&self) -> bool {
        self.lat.is_nan() || self.lon.is_nan()
    }
}

impl fmt::Display for EarthLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}", self.lat, self.lon)?;
        if !self.alt.is_nan() {
            write!(f, ", {}", self.alt)?;
        }
        f.write_str(")")
    }
}

/// A station built from one row of a station table.
#[derive(Debug, Clone, PartialEq)]
pub struct StationFeature {
    /// Station identifier.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// WMO identifier.
    pub wmo_id: String,
    /// Location; altitude is the station altitude.
    pub location: EarthLocation,
    /// Declared number of observations, if the file carries it.
    pub npts: Option<usize>,
    /// Record number of the station row.
    pub recnum: usize,
    /// The station row itself.
    pub row: Row,
}

impl fmt::Display for StationFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.location)?;
        if !self.description.is_empty() {
            write!(f, " \"{}\"", self.description)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_type_names() {
        assert_eq!("timeSeries".parse::<FeatureType>().unwrap(), FeatureType::Station);
        assert_eq!(
            "STATION_PROFILE".parse::<FeatureType>().unwrap(),
            FeatureType::StationProfile
        );
        assert_eq!("trajectoryProfile".parse::<FeatureType>().unwrap(), FeatureType::Section);
        assert!("grid".parse::<FeatureType>().is_err());
        assert_eq!(FeatureType::Station.to_string(), "STATION");
        assert_eq!(FeatureType::Section.levels(), 3);
    }
}
