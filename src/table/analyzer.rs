//! Resolution of a dataset to nested tables.

use super::config::{CoordName, JoinArrayKind, JoinConfig, Layout, StructureSpec, TableConfig};
use super::nested::NestedTable;
use crate::conventions::ConventionRegistry;
use crate::data::{axis_type, coordinate_axes, find_axis, AxisType, Dataset, Variable};
use crate::error::{PointFlatError, Result};
use crate::feature::FeatureType;
use std::fmt::Write as _;
use std::rc::Rc;

/// Options of a [`TableAnalyzer`].
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Feature type the caller wants. Nested tables of other types are dropped,
    /// except that `Point` accepts everything.
    pub wanted: Option<FeatureType>,
    /// Fall back to the default heuristic when no convention applies.
    pub allow_default: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            wanted: None,
            allow_default: true,
        }
    }
}

/// Chooses a table configuration for a dataset and builds its nested tables.
#[derive(Debug)]
pub struct TableAnalyzer {
    ds: Rc<dyn Dataset>,
    configurer: Option<String>,
    configs: Vec<TableConfig>,
    nested: Vec<Rc<NestedTable>>,
    errlog: String,
}

impl TableAnalyzer {
    /// Analyze `ds`.
    ///
    /// A detector that fails or declines is logged and the default heuristic is used
    /// instead. It is an error if no nested table can be built.
    pub fn factory(ds: Rc<dyn Dataset>, registry: &ConventionRegistry, config: &AnalyzerConfig) -> Result<Self> {
        let mut analyzer = Self {
            ds,
            configurer: None,
            configs: Vec::new(),
            nested: Vec::new(),
            errlog: String::new(),
        };

        if let Some(configurer) = registry.resolve(analyzer.ds.as_ref(), config.wanted) {
            let name = configurer.name().to_string();
            tracing::debug!("Using {} for {}", name, analyzer.ds.location());
            match configurer.config(analyzer.ds.as_ref(), config.wanted, &mut analyzer.errlog) {
                Ok(Some(tc)) => match analyzer.build(vec![tc], config) {
                    Ok(()) => analyzer.configurer = Some(name),
                    Err(e) => {
                        let _ = writeln!(analyzer.errlog, "{} failed: {}", name, e);
                        tracing::warn!("{} failed on {}: {}", name, analyzer.ds.location(), e);
                    },
                },
                Ok(None) => {
                    let _ = writeln!(analyzer.errlog, "{} declined", name);
                },
                Err(e) => {
                    let _ = writeln!(analyzer.errlog, "{} failed: {}", name, e);
                    tracing::warn!("{} failed on {}: {}", name, analyzer.ds.location(), e);
                },
            }
        }

        if analyzer.nested.is_empty() && config.allow_default {
            let configs = default_configs(analyzer.ds.as_ref(), &mut analyzer.errlog);
            if !configs.is_empty() {
                analyzer.build(configs, config)?;
                analyzer.configurer = Some("default".to_string());
            }
        }

        if analyzer.nested.is_empty() {
            return Err(PointFlatError::invalid_config(format!(
                "No point feature tables found in {}\n{}",
                analyzer.ds.location(),
                analyzer.errlog
            )));
        }
        Ok(analyzer)
    }

    fn build(&mut self, configs: Vec<TableConfig>, options: &AnalyzerConfig) -> Result<()> {
        let mut nested = Vec::new();
        for config in &configs {
            for path in config.leaf_paths() {
                let nt = NestedTable::new(&self.ds, &path, &mut self.errlog)?;
                let keep = match options.wanted {
                    None | Some(FeatureType::Point) => true,
                    Some(wanted) => nt.feature_type() == wanted,
                };
                if keep {
                    nested.push(Rc::new(nt));
                } else {
                    let _ = writeln!(
                        self.errlog,
                        "Skipping {}: featureType {} is not {:?}",
                        nt.name(),
                        nt.feature_type(),
                        options.wanted
                    );
                }
            }
        }
        self.configs = configs;
        self.nested = nested;
        Ok(())
    }

    /// Dataset being analyzed.
    pub fn dataset(&self) -> &Rc<dyn Dataset> {
        &self.ds
    }

    /// Name of the detector that produced the configuration.
    pub fn configurer_name(&self) -> Option<&str> {
        self.configurer.as_deref()
    }

    /// Configuration trees, one per root table.
    pub fn table_configs(&self) -> &[TableConfig] {
        &self.configs
    }

    /// Nested tables, one per leaf.
    pub fn nested_tables(&self) -> &[Rc<NestedTable>] {
        &self.nested
    }

    /// Diagnostic messages collected during analysis.
    pub fn errlog(&self) -> &str {
        &self.errlog
    }

    /// Describe the analysis and every nested table.
    pub fn show(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "TableAnalyzer on {}", self.ds.location());
        let _ = writeln!(out, " Configurer = {}", self.configurer.as_deref().unwrap_or("none"));
        for nt in &self.nested {
            out.push_str(&nt.show());
        }
        if !self.errlog.is_empty() {
            let _ = writeln!(out, " Errlog:");
            for line in self.errlog.lines() {
                let _ = writeln!(out, "   {}", line);
            }
        }
        out
    }
}

/// Tables built without a convention.
///
/// Every structure becomes a flat point table. Otherwise the dimension shared by the
/// lat, lon and time axes is the table dimension, else the time axis dimension.
fn default_configs(ds: &dyn Dataset, errlog: &mut String) -> Vec<TableConfig> {
    let structures: Vec<TableConfig> = ds
        .variables()
        .into_iter()
        .filter(|v| v.is_structure())
        .map(|v| structure_table(&v))
        .collect();
    if !structures.is_empty() {
        return structures;
    }

    let axes = coordinate_axes(ds);
    let Some(time) = find_axis(&axes, AxisType::Time, |v| v.rank() == 1) else {
        let _ = writeln!(errlog, "Default: no time coordinate");
        return Vec::new();
    };
    let Some(dim) = time.outer_dim().map(str::to_string) else {
        return Vec::new();
    };
    let on_dim = |v: &Variable| v.rank() == 1 && v.dims[0] == dim;

    let mut table = TableConfig::new(
        dim.clone(),
        Layout::Structure {
            structure: StructureSpec::pseudo(dim.clone(), dim.clone()),
        },
    )
    .with_feature_type(FeatureType::Point)
    .with_coord(CoordName::Time, time.name.clone());

    for (role, axis) in [
        (CoordName::Lat, AxisType::Lat),
        (CoordName::Lon, AxisType::Lon),
        (CoordName::Elev, AxisType::Height),
    ] {
        if let Some(v) = find_axis(&axes, axis, on_dim) {
            table = table.with_coord(role, v.name.clone());
        } else if let Some(v) = find_axis(&axes, axis, |v| v.rank() == 0) {
            // fixed location of a time series
            table = table
                .with_join(JoinConfig::Array {
                    var: v.name.clone(),
                    kind: JoinArrayKind::Scalar,
                })
                .with_coord(role, v.name.clone());
        } else if role != CoordName::Elev {
            let _ = writeln!(errlog, "Default: no {} coordinate for dimension {}", role, dim);
        }
    }
    vec![table]
}

fn structure_table(var: &Variable) -> TableConfig {
    let mut table = TableConfig::new(
        var.name.clone(),
        Layout::Structure {
            structure: StructureSpec::structure(var.name.clone()),
        },
    )
    .with_feature_type(FeatureType::Point);
    for member in &var.members {
        let role = match axis_type(member) {
            Some(AxisType::Lat) => CoordName::Lat,
            Some(AxisType::Lon) => CoordName::Lon,
            Some(AxisType::Time) => CoordName::Time,
            Some(t) if t.is_vertical() => CoordName::Elev,
            _ => continue,
        };
        if table.coord(role).is_none() {
            table = table.with_coord(role, member.name.clone());
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataType, MemoryDataset, Member, Row, Value};
    use crate::feature::FeatureCollection;
    use crate::table::StructureKind;

    fn flat(n: usize) -> MemoryDataset {
        let mut ds = MemoryDataset::new("mem");
        ds.add_dimension("record", n);
        ds.add_numeric("lat", &["record"], DataType::Float, vec![10.0; n])
            .unwrap()
            .set_attribute("units", "degrees_north");
        ds.add_numeric("lon", &["record"], DataType::Float, vec![20.0; n])
            .unwrap()
            .set_attribute("units", "degrees_east");
        ds.add_numeric("time", &["record"], DataType::Double, (0..n).map(|i| i as f64).collect())
            .unwrap()
            .set_attribute("units", "seconds since 1970-01-01");
        ds
    }

    #[test]
    fn default_heuristic_builds_flat_point_table() {
        let ds: Rc<dyn Dataset> = Rc::new(flat(5));
        let analyzer =
            TableAnalyzer::factory(ds, &ConventionRegistry::with_builtins(), &AnalyzerConfig::default()).unwrap();
        assert_eq!(analyzer.configurer_name(), Some("default"));
        let nt = &analyzer.nested_tables()[0];
        assert_eq!(nt.feature_type(), FeatureType::Point);
        assert_eq!(nt.number_of_levels(), 1);
        assert!(analyzer.show().contains("record"));
    }

    #[test]
    fn scalar_location_is_joined() {
        let mut ds = MemoryDataset::new("mem");
        ds.add_dimension("time", 2);
        ds.add_numeric("lat", &[], DataType::Float, vec![10.0])
            .unwrap()
            .set_attribute("units", "degrees_north");
        ds.add_numeric("lon", &[], DataType::Float, vec![20.0])
            .unwrap()
            .set_attribute("units", "degrees_east");
        ds.add_numeric("time", &["time"], DataType::Double, vec![0.0, 1.0])
            .unwrap()
            .set_attribute("units", "seconds since 1970-01-01");
        let mut errlog = String::new();
        let configs = default_configs(&ds, &mut errlog);
        assert_eq!(configs[0].extra_joins.len(), 2);
        assert_eq!(configs[0].coord(CoordName::Lat), Some("lat"));
    }

    #[test]
    fn nothing_found_is_an_error() {
        let ds: Rc<dyn Dataset> = Rc::new(MemoryDataset::new("empty"));
        let err = TableAnalyzer::factory(ds, &ConventionRegistry::with_builtins(), &AnalyzerConfig::default());
        assert!(err.is_err());
    }

    #[test]
    fn failing_convention_falls_back_to_default() {
        let mut ds = flat(3);
        // declares a ragged layout whose count variable does not exist
        ds.add_attribute("featureType", "timeSeries");
        ds.add_dimension("station", 1);
        ds.add_numeric("idx", &["record"], DataType::Int, vec![0.0; 3])
            .unwrap()
            .set_attribute("instance_dimension", "nowhere");
        let ds: Rc<dyn Dataset> = Rc::new(ds);
        let analyzer =
            TableAnalyzer::factory(ds, &ConventionRegistry::with_builtins(), &AnalyzerConfig::default()).unwrap();
        assert_eq!(analyzer.configurer_name(), Some("default"));
        assert!(analyzer.errlog().contains("failed"));
    }

    #[test]
    fn structure_variable_becomes_point_table() {
        let member = |name: &str, dtype: DataType, units: &str| {
            (
                Variable::new(name, dtype, &[]).with_attribute("units", units),
                Member::new(name, dtype).with_units(units),
            )
        };
        let fields = [
            member("lat", DataType::Float, "degrees_north"),
            member("lon", DataType::Float, "degrees_east"),
            member("time", DataType::Double, "seconds since 1970-01-01"),
            member("depth", DataType::Float, "m"),
        ];
        let row = |i: f64| {
            let values = [10.0 + i, 20.0, i, 5.0];
            Row::from_fields(
                "record",
                fields
                    .iter()
                    .zip(values)
                    .map(|((_, m), v)| (m.clone(), Value::Double(v)))
                    .collect(),
            )
        };
        let mut members: Vec<Variable> = fields.iter().map(|(v, _)| v.clone()).collect();
        members[3].set_attribute("standard_name", "depth");

        let mut ds = MemoryDataset::new("mem");
        ds.add_dimension("record", 2);
        ds.add_structure("record", &["record"], members, vec![row(0.0), row(1.0)])
            .unwrap();

        let mut errlog = String::new();
        let configs = default_configs(&ds, &mut errlog);
        assert_eq!(configs.len(), 1);
        assert!(matches!(
            &configs[0].layout,
            Layout::Structure { structure } if structure.kind == StructureKind::Structure
        ));
        assert_eq!(configs[0].coord(CoordName::Lat), Some("lat"));
        assert_eq!(configs[0].coord(CoordName::Lon), Some("lon"));
        assert_eq!(configs[0].coord(CoordName::Time), Some("time"));
        assert_eq!(configs[0].coord(CoordName::Elev), Some("depth"));

        let ds: Rc<dyn Dataset> = Rc::new(ds);
        let analyzer =
            TableAnalyzer::factory(ds, &ConventionRegistry::with_builtins(), &AnalyzerConfig::default()).unwrap();
        assert_eq!(analyzer.configurer_name(), Some("default"));
        let nt = Rc::clone(&analyzer.nested_tables()[0]);
        assert_eq!(nt.feature_type(), FeatureType::Point);
        let locations: Vec<(f64, f64)> = FeatureCollection::new(nt)
            .unwrap()
            .flatten(None)
            .unwrap()
            .map(|p| {
                let p = p.unwrap();
                (p.location().lat, p.obs_time())
            })
            .collect();
        assert_eq!(locations, vec![(10.0, 0.0), (11.0, 1.0)]);
    }
}
