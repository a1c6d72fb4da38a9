//! Coordinate axis classification from CF and `_Coordinate` attributes.

use super::dataset::{Dataset, Variable};

/// Role of a coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisType {
    /// Latitude.
    Lat,
    /// Longitude.
    Lon,
    /// Height or depth.
    Height,
    /// Vertical pressure.
    Pressure,
    /// Geopotential height.
    GeoZ,
    /// Time.
    Time,
}

impl AxisType {
    /// Check if this is a vertical axis.
    pub fn is_vertical(self) -> bool {
        matches!(self, Self::Height | Self::Pressure | Self::GeoZ)
    }
}

const PRESSURE_UNITS: &[&str] = &["hpa", "mbar", "millibar", "pa", "kpa", "bar", "atm"];

/// Classify a variable as a coordinate axis.
pub fn axis_type(var: &Variable) -> Option<AxisType> {
    if let Some(explicit) = var.attribute_str("_CoordinateAxisType") {
        match explicit.to_ascii_lowercase().as_str() {
            "lat" => return Some(AxisType::Lat),
            "lon" => return Some(AxisType::Lon),
            "height" => return Some(AxisType::Height),
            "pressure" => return Some(AxisType::Pressure),
            "geoz" => return Some(AxisType::GeoZ),
            "time" => return Some(AxisType::Time),
            _ => {},
        }
    }

    if let Some(sn) = var.attribute_str("standard_name") {
        match sn {
            "latitude" => return Some(AxisType::Lat),
            "longitude" => return Some(AxisType::Lon),
            "time" => return Some(AxisType::Time),
            "altitude" | "height" | "depth" | "height_above_mean_sea_level" => {
                return Some(AxisType::Height)
            },
            "air_pressure" => return Some(AxisType::Pressure),
            "geopotential_height" => return Some(AxisType::GeoZ),
            _ => {},
        }
    }

    let units = var.units().map(|u| u.trim().to_ascii_lowercase());
    if let Some(units) = units.as_deref() {
        if matches!(
            units,
            "degrees_north" | "degree_north" | "degree_n" | "degrees_n" | "degreen" | "degreesn"
        ) {
            return Some(AxisType::Lat);
        }
        if matches!(
            units,
            "degrees_east" | "degree_east" | "degree_e" | "degrees_e" | "degreee" | "degreese"
        ) {
            return Some(AxisType::Lon);
        }
        if units.contains(" since ") && var.dtype.is_numeric() {
            return Some(AxisType::Time);
        }
    }

    if let Some(axis) = var.attribute_str("axis") {
        match axis.to_ascii_uppercase().as_str() {
            "Y" => return Some(AxisType::Lat),
            "X" => return Some(AxisType::Lon),
            "T" => return Some(AxisType::Time),
            "Z" => {
                let is_pressure = units
                    .as_deref()
                    .map(|u| PRESSURE_UNITS.contains(&u))
                    .unwrap_or(false);
                return Some(if is_pressure { AxisType::Pressure } else { AxisType::Height });
            },
            _ => {},
        }
    }

    if var.attribute_str("positive").is_some() {
        let is_pressure = units
            .as_deref()
            .map(|u| PRESSURE_UNITS.contains(&u))
            .unwrap_or(false);
        return Some(if is_pressure { AxisType::Pressure } else { AxisType::Height });
    }

    None
}

/// All coordinate axes of a dataset, in variable order.
pub fn coordinate_axes(ds: &dyn Dataset) -> Vec<(AxisType, Variable)> {
    ds.variables()
        .into_iter()
        .filter_map(|v| axis_type(&v).map(|t| (t, v)))
        .collect()
}

/// First axis of the given type whose outer dimension passes `dim_filter`.
pub fn find_axis<'a>(
    axes: &'a [(AxisType, Variable)],
    wanted: AxisType,
    dim_filter: impl Fn(&Variable) -> bool,
) -> Option<&'a Variable> {
    axes.iter()
        .filter(|(t, _)| *t == wanted || (wanted == AxisType::Height && t.is_vertical()))
        .map(|(_, v)| v)
        .find(|v| dim_filter(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataType;

    #[test]
    fn classify_by_units_and_attributes() {
        let lat = Variable::new("y", DataType::Float, &[("obs", 3)]).with_attribute("units", "degrees_north");
        let time = Variable::new("t", DataType::Double, &[("obs", 3)])
            .with_attribute("units", "hours since 2001-01-01");
        let depth = Variable::new("z", DataType::Float, &[("obs", 3)]).with_attribute("positive", "down");
        let pres = Variable::new("p", DataType::Float, &[("obs", 3)])
            .with_attribute("axis", "Z")
            .with_attribute("units", "hPa");
        let plain = Variable::new("temp", DataType::Float, &[("obs", 3)]).with_attribute("units", "K");

        assert_eq!(axis_type(&lat), Some(AxisType::Lat));
        assert_eq!(axis_type(&time), Some(AxisType::Time));
        assert_eq!(axis_type(&depth), Some(AxisType::Height));
        assert_eq!(axis_type(&pres), Some(AxisType::Pressure));
        assert_eq!(axis_type(&plain), None);
    }
}
