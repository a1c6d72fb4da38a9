//! CF discrete sampling geometries.
//!
//! Handles `featureType` point, timeSeries, profile and trajectory in the contiguous
//! ragged, indexed ragged and multidimensional (including orthogonal) representations.

use super::TableConfigurer;
use crate::data::{coordinate_axes, find_axis, AxisType, Dataset, Variable};
use crate::error::Result;
use crate::feature::FeatureType;
use crate::table::{CoordName, JoinArrayKind, JoinConfig, Layout, StructureSpec, TableConfig};
use std::fmt::Write as _;

/// Detector for CF-1.x point data.
#[derive(Debug, Clone, Copy, Default)]
pub struct CfPointConfigurer;

/// How instances (stations, profiles, trajectories) own their observations.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Encoding {
    /// `count(instance)` with a `sample_dimension` attribute.
    Contiguous { instance: String, obs: String, count: String },
    /// `index(obs)` with an `instance_dimension` attribute.
    Indexed { instance: String, obs: String, index: String },
    /// `(instance, obs)` arrays.
    Multidim { instance: String, obs: String },
}

impl Encoding {
    fn instance(&self) -> &str {
        match self {
            Self::Contiguous { instance, .. } | Self::Indexed { instance, .. } | Self::Multidim { instance, .. } => {
                instance
            },
        }
    }

    fn obs(&self) -> &str {
        match self {
            Self::Contiguous { obs, .. } | Self::Indexed { obs, .. } | Self::Multidim { obs, .. } => obs,
        }
    }
}

fn declared_feature_type(ds: &dyn Dataset) -> Option<FeatureType> {
    ds.attribute_str("featureType").and_then(|s| s.parse().ok())
}

/// The variable carrying `cf_role`.
fn instance_id(ds: &dyn Dataset) -> Option<Variable> {
    ds.variables().into_iter().find(|v| {
        matches!(
            v.attribute_str("cf_role"),
            Some("timeseries_id" | "profile_id" | "trajectory_id")
        )
    })
}

fn find_encoding(ds: &dyn Dataset, ft: FeatureType) -> Option<Encoding> {
    for v in ds.variables() {
        if let (Some(sample), Some(instance)) = (v.attribute_str("sample_dimension"), v.outer_dim()) {
            return Some(Encoding::Contiguous {
                instance: instance.to_string(),
                obs: sample.to_string(),
                count: v.name.clone(),
            });
        }
        if let (Some(instance), Some(obs)) = (v.attribute_str("instance_dimension"), v.outer_dim()) {
            return Some(Encoding::Indexed {
                instance: instance.to_string(),
                obs: obs.to_string(),
                index: v.name.clone(),
            });
        }
    }

    let axes = coordinate_axes(ds);
    let instance = instance_id(ds)
        .and_then(|v| v.outer_dim().map(str::to_string))
        .or_else(|| {
            find_axis(&axes, AxisType::Lat, |_| true).and_then(|v| v.outer_dim().map(str::to_string))
        })?;

    // the sample axis: vertical for profiles, time otherwise
    let sample_axis = match ft {
        FeatureType::Profile => AxisType::Height,
        _ => AxisType::Time,
    };
    let axis = find_axis(&axes, sample_axis, |v| {
        (v.rank() == 2 && v.dims[0] == instance) || (v.rank() == 1 && v.dims[0] != instance)
    })?;
    let obs = axis.dims.last()?.clone();
    Some(Encoding::Multidim { instance, obs })
}

impl CfPointConfigurer {
    fn point_config(&self, ds: &dyn Dataset, errlog: &mut String) -> Option<TableConfig> {
        let axes = coordinate_axes(ds);
        let time = find_axis(&axes, AxisType::Time, |v| v.rank() == 1)?;
        let obs = time.outer_dim()?.to_string();
        let on_obs = |v: &Variable| v.outer_dim() == Some(obs.as_str());
        let lat = find_axis(&axes, AxisType::Lat, on_obs);
        let lon = find_axis(&axes, AxisType::Lon, on_obs);
        if lat.is_none() || lon.is_none() {
            let _ = writeln!(errlog, "CF point: no lat/lon on dimension {}", obs);
            return None;
        }
        Some(
            TableConfig::new(
                obs.clone(),
                Layout::Structure {
                    structure: StructureSpec::pseudo(obs.clone(), obs.clone()),
                },
            )
            .with_feature_type(FeatureType::Point)
            .with_coord(CoordName::Time, time.name.clone())
            .with_coord_opt(CoordName::Lat, lat.map(|v| v.name.clone()))
            .with_coord_opt(CoordName::Lon, lon.map(|v| v.name.clone()))
            .with_coord_opt(
                CoordName::Elev,
                find_axis(&axes, AxisType::Height, on_obs).map(|v| v.name.clone()),
            ),
        )
    }

    fn instance_config(&self, ds: &dyn Dataset, ft: FeatureType, errlog: &mut String) -> Option<TableConfig> {
        let Some(encoding) = find_encoding(ds, ft) else {
            let _ = writeln!(errlog, "CF {}: cannot find the instance and sample dimensions", ft.cf_name());
            return None;
        };
        let instance = encoding.instance().to_string();
        let obs = encoding.obs().to_string();
        tracing::debug!("CF {} encoding {:?}", ft.cf_name(), encoding);

        let mut parent = TableConfig::new(
            instance.clone(),
            Layout::Structure {
                structure: StructureSpec::pseudo(instance.clone(), instance.clone()),
            },
        )
        .with_feature_type(ft);

        let child_layout = match &encoding {
            Encoding::Contiguous { count, .. } => Layout::Contiguous {
                structure: StructureSpec::pseudo(obs.clone(), obs.clone()),
                start: None,
                num_records: count.clone(),
            },
            Encoding::Indexed { index, .. } => Layout::ParentIndex {
                structure: StructureSpec::pseudo(obs.clone(), obs.clone()),
                parent_index: index.clone(),
            },
            Encoding::Multidim { .. } => Layout::MultidimInner {
                outer: instance.clone(),
                inner: obs.clone(),
                vars: None,
            },
        };
        let mut child = TableConfig::new(obs.clone(), child_layout);

        let axes = coordinate_axes(ds);
        let on_instance = |v: &Variable| v.rank() == 1 && v.dims[0] == instance;
        let on_obs = |v: &Variable| v.dims.last().map(|d| d == &obs).unwrap_or(false);
        let is_multidim = matches!(encoding, Encoding::Multidim { .. });

        for (role, axis) in [
            (CoordName::Lat, AxisType::Lat),
            (CoordName::Lon, AxisType::Lon),
            (CoordName::Time, AxisType::Time),
            (CoordName::Elev, AxisType::Height),
        ] {
            if let Some(v) = find_axis(&axes, axis, on_obs) {
                // orthogonal coordinates are joined into each synthesized row
                if is_multidim && v.rank() == 1 {
                    child = child.with_join(JoinConfig::Array {
                        var: v.name.clone(),
                        kind: JoinArrayKind::Raw,
                    });
                }
                child = child.with_coord(role, v.name.clone());
            } else if let Some(v) = find_axis(&axes, axis, on_instance) {
                parent = parent.with_coord(role, v.name.clone());
            } else if role != CoordName::Elev {
                let _ = writeln!(errlog, "CF {}: no {} coordinate", ft.cf_name(), role);
            }
        }

        if let Some(id) = instance_id(ds) {
            let role = if ft == FeatureType::Station {
                CoordName::StnId
            } else {
                CoordName::FeatureId
            };
            parent = parent.with_coord(role, id.name);
        }
        if ft == FeatureType::Station {
            for v in ds.variables().into_iter().filter(|v| on_instance(v)) {
                let role = match v.attribute_str("standard_name") {
                    Some("platform_name") => CoordName::StnDesc,
                    Some("surface_altitude" | "station_altitude") => CoordName::StnAlt,
                    _ if v.name.eq_ignore_ascii_case("wmo_id") => CoordName::WmoId,
                    _ => continue,
                };
                parent = parent.with_coord(role, v.name);
            }
            if parent.coord(CoordName::StnId).is_none() {
                let _ = writeln!(errlog, "CF timeSeries: no timeseries_id variable");
            }
        }

        Some(parent.with_child(child))
    }
}

impl TableConfigurer for CfPointConfigurer {
    fn name(&self) -> &str {
        "CF-1.x point"
    }

    fn is_mine(&self, ds: &dyn Dataset, _wanted: Option<FeatureType>) -> bool {
        matches!(
            declared_feature_type(ds),
            Some(FeatureType::Point | FeatureType::Station | FeatureType::Profile | FeatureType::Trajectory)
        )
    }

    fn config(
        &self,
        ds: &dyn Dataset,
        wanted: Option<FeatureType>,
        errlog: &mut String,
    ) -> Result<Option<TableConfig>> {
        let Some(ft) = declared_feature_type(ds).or(wanted) else {
            let _ = writeln!(errlog, "CF: no featureType attribute");
            return Ok(None);
        };
        Ok(match ft {
            FeatureType::Point => self.point_config(ds, errlog),
            FeatureType::Station | FeatureType::Profile | FeatureType::Trajectory => {
                self.instance_config(ds, ft, errlog)
            },
            FeatureType::StationProfile | FeatureType::Section => {
                let _ = writeln!(errlog, "CF: featureType {} is not handled", ft.cf_name());
                None
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataType, MemoryDataset};

    fn timeseries(encoding: &str) -> MemoryDataset {
        let mut ds = MemoryDataset::new("mem");
        ds.add_attribute("featureType", "timeSeries");
        ds.add_dimension("station", 2).add_dimension("obs", 4);
        ds.add_text("name", &["station"], vec!["A".into(), "B".into()])
            .unwrap()
            .set_attribute("cf_role", "timeseries_id");
        ds.add_numeric("lat", &["station"], DataType::Float, vec![1.0, 2.0])
            .unwrap()
            .set_attribute("units", "degrees_north");
        ds.add_numeric("lon", &["station"], DataType::Float, vec![3.0, 4.0])
            .unwrap()
            .set_attribute("units", "degrees_east");
        ds.add_numeric("time", &["obs"], DataType::Double, vec![0.0, 1.0, 2.0, 3.0])
            .unwrap()
            .set_attribute("units", "days since 2000-01-01");
        match encoding {
            "contiguous" => {
                ds.add_numeric("row_size", &["station"], DataType::Int, vec![3.0, 1.0])
                    .unwrap()
                    .set_attribute("sample_dimension", "obs");
            },
            _ => {
                ds.add_numeric("stn_index", &["obs"], DataType::Int, vec![1.0, 0.0, 1.0, 0.0])
                    .unwrap()
                    .set_attribute("instance_dimension", "station");
            },
        }
        ds
    }

    #[test]
    fn contiguous_ragged_timeseries() {
        let ds = timeseries("contiguous");
        let mut errlog = String::new();
        let config = CfPointConfigurer.config(&ds, None, &mut errlog).unwrap().unwrap();
        assert_eq!(config.feature_type, Some(FeatureType::Station));
        assert_eq!(config.coord(CoordName::StnId), Some("name"));
        assert_eq!(config.coord(CoordName::Lat), Some("lat"));
        let child = &config.children[0];
        assert!(matches!(&child.layout, Layout::Contiguous { num_records, .. } if num_records == "row_size"));
        assert_eq!(child.coord(CoordName::Time), Some("time"));
    }

    #[test]
    fn indexed_ragged_timeseries() {
        let ds = timeseries("indexed");
        let mut errlog = String::new();
        let config = CfPointConfigurer.config(&ds, None, &mut errlog).unwrap().unwrap();
        let child = &config.children[0];
        assert!(matches!(&child.layout, Layout::ParentIndex { parent_index, .. } if parent_index == "stn_index"));
    }

    #[test]
    fn orthogonal_multidim_joins_time() {
        let mut ds = MemoryDataset::new("mem");
        ds.add_attribute("featureType", "timeSeries");
        ds.add_dimension("station", 2).add_dimension("time", 3);
        ds.add_numeric("lat", &["station"], DataType::Float, vec![1.0, 2.0])
            .unwrap()
            .set_attribute("units", "degrees_north");
        ds.add_numeric("lon", &["station"], DataType::Float, vec![3.0, 4.0])
            .unwrap()
            .set_attribute("units", "degrees_east");
        ds.add_numeric("time", &["time"], DataType::Double, vec![0.0, 1.0, 2.0])
            .unwrap()
            .set_attribute("units", "hours since 2000-01-01");
        ds.add_numeric("temp", &["station", "time"], DataType::Float, vec![0.0; 6])
            .unwrap();
        let mut errlog = String::new();
        let config = CfPointConfigurer.config(&ds, None, &mut errlog).unwrap().unwrap();
        let child = &config.children[0];
        assert!(matches!(child.layout, Layout::MultidimInner { .. }));
        assert_eq!(child.extra_joins.len(), 1);
        assert_eq!(child.coord(CoordName::Time), Some("time"));
    }

    #[test]
    fn declines_without_feature_type() {
        let ds = MemoryDataset::new("mem");
        let mut errlog = String::new();
        assert!(!CfPointConfigurer.is_mine(&ds, None));
        assert!(CfPointConfigurer.config(&ds, None, &mut errlog).unwrap().is_none());
        assert!(errlog.contains("featureType"));
    }
}
