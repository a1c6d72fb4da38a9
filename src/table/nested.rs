//! The runtime chain of tables for one root-to-leaf configuration path.

use super::config::{CoordName, TableConfig};
use super::cursor::Cursor;
use super::{build_chain, Table};
use crate::data::iter::limited;
use crate::data::{coordinate_axes, BoxRowIter, DataType, Dataset, MissingValues, Row, Value, Variable};
use crate::error::{PointFlatError, Result};
use crate::feature::{EarthLocation, FeatureType, StationFeature};
use crate::time::{iso_to_millis, TimeUnit};
use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Write as _};
use std::rc::Rc;

/// Global attributes consulted when no table declares a feature type.
const FEATURE_TYPE_ATTRIBUTES: [&str; 4] = ["featureType", "cdm_data_type", "cdm_datatype", "thredds_data_type"];

#[derive(Debug, Clone)]
enum Source {
    /// A member of the row at this level.
    Variable { level: usize },
    /// A member of a singleton table's fixed row.
    Fixed(Row),
    /// A dataset-scope variable, read once.
    Top(Value),
    /// The configured name is itself the value.
    Constant(Value),
}

/// Reads one coordinate role out of cursor rows.
#[derive(Debug, Clone)]
struct CoordExtractor {
    name: String,
    source: Source,
    dtype: DataType,
    units: Option<String>,
    missing: MissingValues,
}

impl CoordExtractor {
    fn from_variable(var: &Variable, source: Source) -> Self {
        Self {
            name: var.name.clone(),
            source,
            dtype: var.dtype,
            units: var.units().map(str::to_string),
            missing: var.missing_values(),
        }
    }

    fn fixed(name: &str, row: &Row) -> Self {
        let member = row.member(name);
        Self {
            name: name.to_string(),
            source: Source::Fixed(row.clone()),
            dtype: member.map(|m| m.dtype).unwrap_or(DataType::Double),
            units: member.and_then(|m| m.units.clone()),
            missing: member.map(|m| m.missing.clone()).unwrap_or_default(),
        }
    }

    fn constant(name: &str) -> Self {
        let (value, dtype) = match name.trim().parse::<f64>() {
            Ok(v) => (Value::Double(v), DataType::Double),
            Err(_) => (Value::Str(name.to_string()), DataType::String),
        };
        Self {
            name: name.to_string(),
            source: Source::Constant(value),
            dtype,
            units: None,
            missing: MissingValues::default(),
        }
    }

    fn level(&self) -> Option<usize> {
        match self.source {
            Source::Variable { level } => Some(level),
            _ => None,
        }
    }

    fn is_string(&self) -> bool {
        self.dtype.is_string()
    }

    /// Value from `row`, or from the extractor itself when it is not row-based.
    fn value_in<'a>(&'a self, row: Option<&'a Row>) -> Option<&'a Value> {
        match &self.source {
            Source::Variable { .. } => row.and_then(|r| r.get(&self.name)),
            Source::Fixed(r) => r.get(&self.name),
            Source::Top(v) | Source::Constant(v) => Some(v),
        }
    }

    fn value_at<'a>(&'a self, cursor: &'a Cursor) -> Option<&'a Value> {
        self.value_in(self.level().and_then(|l| cursor.row(l)))
    }

    fn is_missing_value(&self, value: Option<&Value>) -> bool {
        match value {
            None => true,
            Some(v) if self.is_string() => v.as_string().trim().is_empty(),
            Some(v) => v.as_f64().map(|x| self.missing.is_missing(x)).unwrap_or(true),
        }
    }

    fn f64_in(&self, row: &Row) -> f64 {
        self.value_in(Some(row)).and_then(Value::as_f64).unwrap_or(f64::NAN)
    }

    fn f64_at(&self, cursor: &Cursor) -> f64 {
        self.value_at(cursor).and_then(Value::as_f64).unwrap_or(f64::NAN)
    }

    fn string_in(&self, row: &Row) -> String {
        self.value_in(Some(row))
            .map(|v| v.as_string().trim().to_string())
            .unwrap_or_default()
    }

    fn string_at(&self, cursor: &Cursor) -> String {
        self.value_at(cursor)
            .map(|v| v.as_string().trim().to_string())
            .unwrap_or_default()
    }
}

impl fmt::Display for CoordExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Variable { level } => write!(f, "{} (level {})", self.name, level),
            Source::Fixed(_) => write!(f, "{} (fixed row)", self.name),
            Source::Top(v) => write!(f, "{} = {}", self.name, v),
            Source::Constant(v) => write!(f, "constant {}", v),
        }
    }
}

/// A chain of tables from the root to one leaf, with resolved coordinates.
///
/// Level 0 is the leaf. Iteration state lives in a [`Cursor`] with
/// [`NestedTable::number_of_levels`] levels.
#[derive(Debug)]
pub struct NestedTable {
    ds: Rc<dyn Dataset>,
    /// Leaf first.
    tables: Vec<Rc<Table>>,
    feature_type: FeatureType,
    coords: BTreeMap<CoordName, CoordExtractor>,
    feature_id: Option<CoordExtractor>,
    extras: Vec<Variable>,
}

impl NestedTable {
    /// Build the tables of `path` (root first) and resolve feature type and coordinates.
    ///
    /// Coordinates that are configured but cannot be found are noted in `errlog`.
    pub fn new(ds: &Rc<dyn Dataset>, path: &[&TableConfig], errlog: &mut String) -> Result<Self> {
        let tables = build_chain(ds, path)?;
        let nlevels = tables.len();

        let feature_type = Self::infer_feature_type(ds.as_ref(), &tables)?;

        let mut coords = BTreeMap::new();
        for role in CoordName::ALL {
            if role == CoordName::FeatureId || role.is_structural() {
                continue;
            }
            if let Some(e) = find_coordinate(ds.as_ref(), &tables, role, 0, errlog)? {
                coords.insert(role, e);
            }
        }
        let feature_id = find_coordinate(ds.as_ref(), &tables, CoordName::FeatureId, nlevels - 1, errlog)?;

        let coord_names: Vec<&str> = [
            CoordName::Lat,
            CoordName::Lon,
            CoordName::Elev,
            CoordName::StnAlt,
            CoordName::Time,
            CoordName::TimeNominal,
        ]
        .iter()
        .filter_map(|r| coords.get(r).map(|e: &CoordExtractor| e.name.as_str()))
        .collect();
        let extras = coordinate_axes(ds.as_ref())
            .into_iter()
            .map(|(_, v)| v)
            .filter(|v| v.rank() <= 1 && !coord_names.contains(&v.name.as_str()))
            .collect();

        let nested = Self {
            ds: Rc::clone(ds),
            tables,
            feature_type,
            coords,
            feature_id,
            extras,
        };
        tracing::debug!("NestedTable {} featureType={} levels={}", nested.name(), feature_type, nlevels);
        Ok(nested)
    }

    fn infer_feature_type(ds: &dyn Dataset, tables: &[Rc<Table>]) -> Result<FeatureType> {
        if let Some(ft) = tables.iter().find_map(|t| t.feature_type()) {
            return Ok(ft);
        }
        for attr in FEATURE_TYPE_ATTRIBUTES {
            if let Some(ft) = ds.attribute_str(attr).and_then(|s| s.parse().ok()) {
                return Ok(ft);
            }
        }
        // depth alone cannot tell a profile from a station
        match tables.len() {
            1 => Ok(FeatureType::Point),
            2 => Ok(FeatureType::Station),
            3 => Ok(FeatureType::StationProfile),
            levels => Err(PointFlatError::UnknownFeatureType { levels }),
        }
    }

    /// Resolved feature type.
    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    /// Number of tables in the chain.
    pub fn number_of_levels(&self) -> usize {
        self.tables.len()
    }

    /// Table at `level` (0 = leaf).
    pub fn table(&self, level: usize) -> Option<&Rc<Table>> {
        self.tables.get(level)
    }

    /// Leaf table.
    pub fn leaf(&self) -> &Rc<Table> {
        &self.tables[0]
    }

    /// Root table.
    pub fn root(&self) -> &Rc<Table> {
        &self.tables[self.tables.len() - 1]
    }

    /// Dataset the tables read from.
    pub fn dataset(&self) -> &Rc<dyn Dataset> {
        &self.ds
    }

    fn coord(&self, role: CoordName) -> Option<&CoordExtractor> {
        self.coords.get(&role)
    }

    /// Check if time, latitude and longitude were all found.
    pub fn has_coords(&self) -> bool {
        [CoordName::Time, CoordName::Lat, CoordName::Lon]
            .iter()
            .all(|r| self.coords.contains_key(r))
    }

    /// Unit of the observation time. String times are converted to epoch milliseconds.
    pub fn time_unit(&self) -> Result<TimeUnit> {
        let time = self
            .coord(CoordName::Time)
            .ok_or_else(|| PointFlatError::invalid_config("No time coordinate"))?;
        if time.is_string() {
            return Ok(TimeUnit::epoch_millis());
        }
        let units = time.units.as_deref().unwrap_or_default();
        TimeUnit::parse(units)
            .map_err(|e| PointFlatError::Conversion(format!("Error on time string '{}': {}", units, e)))
    }

    /// Units of the altitude coordinate, else of the station altitude.
    pub fn alt_units(&self) -> Option<&str> {
        self.coord(CoordName::Elev)
            .or_else(|| self.coord(CoordName::StnAlt))
            .and_then(|e| e.units.as_deref())
    }

    /// Data variables of every level, sorted by name. Structural variables are left out.
    ///
    /// A variable shared by several levels, such as a two-dimensional variable read by both a
    /// pseudo-structure parent and a multidimensional leaf, is listed once.
    pub fn data_variables(&self) -> Vec<Variable> {
        let mut seen = HashSet::new();
        let mut vars: Vec<Variable> = self
            .tables
            .iter()
            .flat_map(|t| t.cols())
            .filter(|v| !self.tables.iter().any(|t| t.is_nondata(&v.name)))
            .filter(|v| seen.insert(v.name.clone()))
            .collect();
        vars.sort_by(|a, b| a.name.cmp(&b.name));
        vars
    }

    /// One- and zero-dimensional coordinate axes that play no coordinate role.
    pub fn extras(&self) -> &[Variable] {
        &self.extras
    }

    /// Table names, root first, e.g. `station/obs`.
    pub fn name(&self) -> String {
        self.tables
            .iter()
            .rev()
            .map(|t| if t.name().is_empty() { "anon" } else { t.name() })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Human-readable description of the chain and its coordinates.
    pub fn show(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, " NestedTable = {}", self.name());
        let _ = writeln!(out, "   featureType = {}", self.feature_type);
        let _ = writeln!(out, "   nlevels = {}", self.number_of_levels());
        for (role, e) in &self.coords {
            let _ = writeln!(out, "   {} = {}", role, e);
        }
        if let Some(id) = &self.feature_id {
            let _ = writeln!(out, "   {} = {}", CoordName::FeatureId, id);
        }
        self.leaf().show(&mut out, 2);
        out
    }

    fn time(&self, extractor: Option<&CoordExtractor>, cursor: &Cursor) -> f64 {
        let Some(e) = extractor else {
            return f64::NAN;
        };
        if let Some(level) = e.level() {
            if cursor.row(level).is_none() {
                return f64::NAN;
            }
        }
        if e.is_string() {
            let text = e.string_at(cursor);
            match iso_to_millis(&text) {
                Some(ms) => ms,
                None => {
                    tracing::error!("Cannot parse date, not ISO formatted: '{}'", text);
                    0.0
                },
            }
        } else {
            e.f64_at(cursor)
        }
    }

    /// Observation time, in [`NestedTable::time_unit`].
    pub fn obs_time(&self, cursor: &Cursor) -> f64 {
        self.time(self.coord(CoordName::Time), cursor)
    }

    /// Nominal time, NaN if there is none.
    pub fn nom_time(&self, cursor: &Cursor) -> f64 {
        self.time(self.coord(CoordName::TimeNominal), cursor)
    }

    /// Latitude; NaN if missing.
    pub fn latitude(&self, cursor: &Cursor) -> f64 {
        self.coord(CoordName::Lat).map(|e| e.f64_at(cursor)).unwrap_or(f64::NAN)
    }

    /// Longitude; NaN if missing.
    pub fn longitude(&self, cursor: &Cursor) -> f64 {
        self.coord(CoordName::Lon).map(|e| e.f64_at(cursor)).unwrap_or(f64::NAN)
    }

    /// Location of the observation. Station altitude is added to the altitude.
    pub fn earth_location(&self, cursor: &Cursor) -> EarthLocation {
        let mut alt = self
            .coord(CoordName::Elev)
            .map(|e| e.f64_at(cursor))
            .unwrap_or(f64::NAN);
        if let Some(stn_alt) = self.coord(CoordName::StnAlt) {
            let elev = stn_alt.f64_at(cursor);
            alt = if self.coords.contains_key(&CoordName::Elev) { alt + elev } else { elev };
        }
        EarthLocation::new(self.latitude(cursor), self.longitude(cursor), alt)
    }

    /// Name of the feature at the cursor's current level.
    ///
    /// Uses that table's feature id, then the root's. `"unknown"` if neither is set.
    pub fn feature_name(&self, cursor: &Cursor) -> String {
        let level = cursor.current_index();
        let local = self
            .table(level)
            .and_then(|t| t.coord(CoordName::FeatureId))
            .and_then(|id| cursor.row(level).and_then(|r| r.get(id)));
        let value = local.or_else(|| self.feature_id.as_ref().and_then(|e| e.value_at(cursor)));
        match value {
            Some(v) => v.as_string().trim().to_string(),
            None => "unknown".to_string(),
        }
    }

    /// Check if the feature id of a root row is missing.
    pub fn is_feature_missing(&self, row: &Row) -> bool {
        self.feature_id
            .as_ref()
            .map(|e| e.is_missing_value(e.value_in(Some(row))))
            .unwrap_or(false)
    }

    /// Check if the observation time is missing.
    pub fn is_time_missing(&self, cursor: &Cursor) -> bool {
        self.role_missing(CoordName::Time, cursor)
    }

    /// Check if the altitude is missing.
    pub fn is_alt_missing(&self, cursor: &Cursor) -> bool {
        self.role_missing(CoordName::Elev, cursor)
    }

    /// Check if the observation is flagged missing.
    pub fn is_missing(&self, cursor: &Cursor) -> bool {
        self.role_missing(CoordName::MissingVar, cursor)
    }

    fn role_missing(&self, role: CoordName, cursor: &Cursor) -> bool {
        self.coord(role)
            .map(|e| e.is_missing_value(e.value_at(cursor)))
            .unwrap_or(false)
    }

    /// All levels of the cursor merged into one row, leaf first.
    pub fn make_obs_row(&self, cursor: &Cursor) -> Row {
        let rows: Vec<Row> = cursor.rows().cloned().collect();
        Row::merge(&rows)
    }

    /// The row of one level of the cursor.
    pub fn make_obs_row_at<'a>(&self, cursor: &'a Cursor, level: usize) -> Option<&'a Row> {
        cursor.row(level)
    }

    /// Merge the extra joins of the current level's table into that level's row.
    pub fn add_parent_join(&self, cursor: &mut Cursor) -> Result<()> {
        let level = cursor.current_index();
        let Some(table) = self.table(level) else {
            return Ok(());
        };
        if table.extra_joins().is_empty() {
            return Ok(());
        }
        let mut rows = Vec::with_capacity(table.extra_joins().len() + 1);
        if let Some(row) = cursor.row(level) {
            rows.push(row.clone());
        }
        for join in table.extra_joins() {
            rows.push(join.join_row(cursor)?);
        }
        cursor.replace_row(level, Row::merge(&rows));
        Ok(())
    }

    /// Rows of the table at `level`, for the parent row at the cursor.
    ///
    /// Moves the cursor's current level to `level`.
    pub fn level_data_iter(&self, cursor: &mut Cursor, level: usize) -> Result<BoxRowIter> {
        let table = self
            .table(level)
            .ok_or_else(|| PointFlatError::invalid_config(format!("No table at level {}", level)))?;
        cursor.set_current_index(level);
        if level + 1 == self.number_of_levels() {
            table.rows(None)
        } else {
            table.rows(Some(cursor))
        }
    }

    /// Rows of a single-level table.
    pub fn obs_data_iter(&self, limit: Option<usize>) -> Result<BoxRowIter> {
        self.root_rows(limit)
    }

    /// Station rows. A `Limit` coordinate on the root caps the count.
    pub fn station_data_iter(&self, limit: Option<usize>) -> Result<BoxRowIter> {
        self.root_rows(limit)
    }

    /// Rows of the root table, capped like [`NestedTable::station_data_iter`].
    pub fn root_feature_iter(&self, limit: Option<usize>) -> Result<BoxRowIter> {
        self.root_rows(limit)
    }

    fn root_rows(&self, limit: Option<usize>) -> Result<BoxRowIter> {
        let iter = self.root().rows(None)?;
        Ok(limited(iter, self.root_limit(limit)?))
    }

    /// The smaller of `limit` and the value of the root's `Limit` variable.
    fn root_limit(&self, limit: Option<usize>) -> Result<Option<usize>> {
        let Some(name) = self.root().coord(CoordName::Limit) else {
            return Ok(limit);
        };
        let n = self.ds.read_scalar_f64(name)?;
        let declared = if n.is_finite() && n > 0.0 { n as usize } else { 0 };
        Ok(Some(limit.map_or(declared, |l| l.min(declared))))
    }

    /// Leaf rows of the parent row at the cursor.
    pub fn leaf_feature_iter(&self, cursor: &mut Cursor) -> Result<BoxRowIter> {
        self.level_data_iter(cursor, 0)
    }

    /// Middle rows of a three-level table, for the root row at the cursor.
    pub fn middle_feature_iter(&self, cursor: &mut Cursor) -> Result<BoxRowIter> {
        self.level_data_iter(cursor, 1)
    }

    /// Build a station from a station row. `None` if its id or location is missing.
    pub fn make_station(&self, row: &Row, recnum: usize) -> Option<StationFeature> {
        let stn = self.coord(CoordName::StnId)?;
        if stn.is_missing_value(stn.value_in(Some(row))) {
            return None;
        }
        let lat = self.coord(CoordName::Lat).map(|e| e.f64_in(row)).unwrap_or(f64::NAN);
        let lon = self.coord(CoordName::Lon).map(|e| e.f64_in(row)).unwrap_or(f64::NAN);
        if lat.is_nan() || lon.is_nan() {
            return None;
        }
        let alt = self
            .coord(CoordName::StnAlt)
            .map(|e| e.f64_in(row))
            .unwrap_or(f64::NAN);
        let text = |role| self.coord(role).map(|e| e.string_in(row)).unwrap_or_default();
        let npts = self
            .root()
            .coord(CoordName::StnNpts)
            .and_then(|n| row.scalar_i64(n))
            .filter(|&n| n >= 0)
            .map(|n| n as usize);

        Some(StationFeature {
            name: stn.string_in(row),
            description: text(CoordName::StnDesc),
            wmo_id: text(CoordName::WmoId),
            location: EarthLocation::new(lat, lon, alt),
            npts,
            recnum,
            row: row.clone(),
        })
    }
}

impl fmt::Display for NestedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "NestedTable = {}", self.name())?;
        for role in [CoordName::Time, CoordName::Lat, CoordName::Lon, CoordName::Elev] {
            match self.coord(role) {
                Some(e) => writeln!(f, "  {}= {}", role, e)?,
                None => writeln!(f, "  {}= none", role)?,
            }
        }
        Ok(())
    }
}

/// Find the extractor of `role`, walking from `start` towards the root. First match wins.
fn find_coordinate(
    ds: &dyn Dataset,
    tables: &[Rc<Table>],
    role: CoordName,
    start: usize,
    errlog: &mut String,
) -> Result<Option<CoordExtractor>> {
    for (level, table) in tables.iter().enumerate().skip(start) {
        let Some(name) = table.coord(role) else {
            continue;
        };

        if let Some(v) = table.find_variable(name) {
            return Ok(Some(CoordExtractor::from_variable(&v, Source::Variable { level })));
        }
        if let Some(v) = table.extra_joins().iter().find_map(|j| j.find_variable(name)) {
            return Ok(Some(CoordExtractor::from_variable(v, Source::Variable { level })));
        }
        if let Some(row) = table.fixed_row() {
            return Ok(Some(CoordExtractor::fixed(name, row)));
        }
        if table.is_top() {
            return Ok(Some(match ds.variable(name) {
                Some(v) => {
                    let value = ds
                        .read(name)?
                        .flat(0, v.dtype)
                        .unwrap_or(Value::Double(f64::NAN));
                    CoordExtractor::from_variable(&v, Source::Top(value))
                },
                None => CoordExtractor::constant(name),
            }));
        }

        let _ = writeln!(errlog, "NestedTable: cant find variable '{}' for coordinate type {}", name, role);
        tracing::warn!("Cannot find variable '{}' for coordinate {} in table {}", name, role, table.name());
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryDataset;
    use crate::table::config::{Layout, StructureSpec};

    fn stations() -> Rc<dyn Dataset> {
        let mut ds = MemoryDataset::new("mem");
        ds.add_dimension("station", 2).add_dimension("obs", 5);
        ds.add_text("stn", &["station"], vec!["KDEN".into(), "KBOU".into()])
            .unwrap();
        ds.add_numeric("lat", &["station"], DataType::Float, vec![39.8, 40.0])
            .unwrap()
            .set_attribute("units", "degrees_north");
        ds.add_numeric("lon", &["station"], DataType::Float, vec![-104.7, -105.3])
            .unwrap()
            .set_attribute("units", "degrees_east");
        ds.add_numeric("alt", &["station"], DataType::Float, vec![1600.0, 1650.0])
            .unwrap()
            .set_attribute("units", "m");
        ds.add_numeric("rowSize", &["station"], DataType::Int, vec![3.0, 2.0])
            .unwrap();
        ds.add_numeric("time", &["obs"], DataType::Double, vec![0.0, 1.0, 2.0, 0.0, 1.0])
            .unwrap()
            .set_attribute("units", "hours since 2020-01-01");
        ds.add_numeric("temp", &["obs"], DataType::Float, vec![1.0, 2.0, -999.0, 4.0, 5.0])
            .unwrap()
            .set_attribute("_FillValue", -999.0);
        ds.add_numeric("obs_lat", &["obs"], DataType::Float, vec![1.0; 5]).unwrap();
        Rc::new(ds)
    }

    fn configs(obs_lat: bool) -> (TableConfig, TableConfig) {
        let station = TableConfig::new(
            "station",
            Layout::Structure {
                structure: StructureSpec::pseudo("station", "station"),
            },
        )
        .with_coord(CoordName::Lat, "lat")
        .with_coord(CoordName::Lon, "lon")
        .with_coord(CoordName::StnAlt, "alt")
        .with_coord(CoordName::StnId, "stn");
        let obs = TableConfig::new(
            "obs",
            Layout::Contiguous {
                structure: StructureSpec::pseudo("obs", "obs"),
                start: None,
                num_records: "rowSize".into(),
            },
        )
        .with_coord(CoordName::Time, "time")
        .with_coord(CoordName::MissingVar, "temp")
        .with_coord_opt(CoordName::Lat, obs_lat.then_some("obs_lat"));
        (station, obs)
    }

    #[test]
    fn depth_two_defaults_to_station() {
        let ds = stations();
        let (station, obs) = configs(false);
        let mut errlog = String::new();
        let nt = NestedTable::new(&ds, &[&station, &obs], &mut errlog).unwrap();
        assert_eq!(nt.number_of_levels(), 2);
        assert_eq!(nt.feature_type(), FeatureType::Station);
        assert_eq!(nt.name(), "station/obs");
        assert!(nt.has_coords());
        assert_eq!(nt.alt_units(), Some("m"));
        assert_eq!(nt.time_unit().unwrap().text(), "hours since 2020-01-01");
        let names: Vec<String> = nt.data_variables().into_iter().map(|v| v.name).collect();
        assert!(!names.contains(&"rowSize".to_string()));
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn leaf_coordinate_wins_over_ancestor() {
        let ds = stations();
        let (station, obs) = configs(true);
        let mut errlog = String::new();
        let nt = NestedTable::new(&ds, &[&station, &obs], &mut errlog).unwrap();

        let mut cursor = Cursor::new(2);
        let mut stations = nt.station_data_iter(None).unwrap();
        let stn = stations.next().unwrap().unwrap();
        cursor.set_row(1, stn, 0);
        let mut obs_iter = nt.leaf_feature_iter(&mut cursor).unwrap();
        let row = obs_iter.next().unwrap().unwrap();
        cursor.set_row(0, row, obs_iter.current_recno().unwrap());
        assert_eq!(nt.latitude(&cursor), 1.0);
        assert!((nt.longitude(&cursor) + 104.7).abs() < 1e-4);
    }

    #[test]
    fn station_and_missing_flags() {
        let ds = stations();
        let (station, obs) = configs(false);
        let mut errlog = String::new();
        let nt = NestedTable::new(&ds, &[&station, &obs], &mut errlog).unwrap();

        let mut cursor = Cursor::new(2);
        let row = nt.station_data_iter(None).unwrap().nth(1).unwrap().unwrap();
        let stn = nt.make_station(&row, 1).unwrap();
        assert_eq!(stn.name, "KBOU");
        assert_eq!(stn.location.alt, 1650.0);

        cursor.set_row(1, nt.station_data_iter(None).unwrap().next().unwrap().unwrap(), 0);
        let missing: Vec<bool> = {
            let mut flags = Vec::new();
            let mut it = nt.leaf_feature_iter(&mut cursor).unwrap();
            while let Some(row) = it.next() {
                cursor.set_row(0, row.unwrap(), it.current_recno().unwrap());
                flags.push(nt.is_missing(&cursor));
            }
            flags
        };
        assert_eq!(missing, vec![false, false, true]);
        assert_eq!(nt.obs_time(&cursor), 2.0);
        assert_eq!(nt.earth_location(&cursor).alt, 1600.0);
    }

    #[test]
    fn top_level_constants_and_string_times() {
        let mut ds = MemoryDataset::new("mem");
        ds.add_dimension("obs", 2);
        ds.add_text("when", &["obs"], vec!["2020-01-01T00:00:00Z".into(), "garbage".into()])
            .unwrap();
        ds.add_numeric("site_lat", &[], DataType::Float, vec![45.0]).unwrap();
        let ds: Rc<dyn Dataset> = Rc::new(ds);

        let top = TableConfig::new("top", Layout::Top)
            .with_coord(CoordName::Lat, "site_lat")
            .with_coord(CoordName::Lon, "-120.5");
        let obs = TableConfig::new(
            "obs",
            Layout::Structure {
                structure: StructureSpec::pseudo("obs", "obs"),
            },
        )
        .with_feature_type(FeatureType::Profile)
        .with_coord(CoordName::Time, "when");
        let mut errlog = String::new();
        let nt = NestedTable::new(&ds, &[&top, &obs], &mut errlog).unwrap();
        assert_eq!(nt.feature_type(), FeatureType::Profile);

        let mut cursor = Cursor::new(2);
        cursor.set_row(1, Row::empty(), 0);
        let mut it = nt.level_data_iter(&mut cursor, 0).unwrap();
        cursor.set_row(0, it.next().unwrap().unwrap(), 0);
        assert_eq!(nt.latitude(&cursor), 45.0);
        assert_eq!(nt.longitude(&cursor), -120.5);
        assert_eq!(nt.obs_time(&cursor), 1_577_836_800_000.0);
        assert!(nt.time_unit().unwrap().text().starts_with("milliseconds"));

        cursor.set_row(0, it.next().unwrap().unwrap(), 1);
        assert_eq!(nt.obs_time(&cursor), 0.0);
    }

    #[test]
    fn depth_four_without_declared_type_is_an_error() {
        let ds = stations();
        let level = |name: &str| {
            TableConfig::new(
                name,
                Layout::Singleton {
                    row: Row::empty(),
                },
            )
        };
        let (a, b, c, d) = (level("a"), level("b"), level("c"), level("d"));
        let mut errlog = String::new();
        assert!(matches!(
            NestedTable::new(&ds, &[&a, &b, &c, &d], &mut errlog),
            Err(PointFlatError::UnknownFeatureType { levels: 4 })
        ));
    }
}
