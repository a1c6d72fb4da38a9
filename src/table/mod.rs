//! Tables, joins and the nested-table engine.
//!
//! A [`Table`] is one level of a point dataset: a row-iterator factory for one physical
//! encoding. Each table is linked to its parent; given a [`Cursor`] positioned on the
//! parent row it yields that parent's children.

mod analyzer;
pub mod config;
mod cursor;
pub mod join;
mod nested;

pub use analyzer::{AnalyzerConfig, TableAnalyzer};
pub use config::{CoordName, JoinArrayKind, JoinConfig, Layout, StructureKind, StructureSpec, TableConfig};
pub use cursor::Cursor;
pub use nested::NestedTable;

use crate::data::iter::{RangeIter, RowsIter, SingletonIter};
use crate::data::{BoxRowIter, Dataset, Row, Structure, Variable};
use crate::error::{PointFlatError, Result};
use crate::feature::FeatureType;
use join::{
    ContiguousJoin, ExtraJoin, LinkedListJoin, MultidimJoin, MultidimSource, NestedJoin, ParentIdJoin,
    ParentIndexJoin,
};
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;

#[derive(Debug)]
enum TableKind {
    Structure(Structure),
    ArrayStructure(Rc<[Row]>),
    Construct(OnceCell<Rc<[Row]>>),
    Contiguous(ContiguousJoin),
    LinkedList(LinkedListJoin),
    ParentIndex(ParentIndexJoin),
    ParentId(ParentIdJoin),
    Multidim { join: MultidimJoin, label: String },
    MultidimStructure(Structure),
    NestedStructure(NestedJoin),
    Singleton(Row),
    Top,
}

/// One level of a nested table.
#[derive(Debug)]
pub struct Table {
    name: String,
    feature_type: Option<FeatureType>,
    kind: TableKind,
    parent: Option<Rc<Table>>,
    coords: BTreeMap<CoordName, String>,
    extra_joins: Vec<ExtraJoin>,
    nondata_vars: Vec<String>,
}

impl Table {
    /// Build one table from its config. Missing variables or dimensions are errors.
    pub fn build(ds: &Rc<dyn Dataset>, config: &TableConfig, parent: Option<Rc<Table>>) -> Result<Self> {
        let kind = Self::build_kind(ds, config)?;

        let extra_joins = config
            .extra_joins
            .iter()
            .map(|j| ExtraJoin::new(ds, j))
            .collect::<Result<Vec<_>>>()?;

        let mut nondata_vars = match &kind {
            TableKind::Contiguous(j) => j.nondata_vars(),
            TableKind::LinkedList(j) => j.nondata_vars(),
            TableKind::ParentIndex(j) => j.nondata_vars(),
            TableKind::ParentId(j) => j.nondata_vars(),
            _ => Vec::new(),
        };
        nondata_vars.extend(
            config
                .coords
                .iter()
                .filter(|(role, _)| role.is_structural())
                .map(|(_, name)| name.clone()),
        );

        tracing::debug!("Built {} table {}", config.layout.kind_name(), config.name);
        Ok(Self {
            name: config.name.clone(),
            feature_type: config.feature_type,
            kind,
            parent,
            coords: config.coords.clone(),
            extra_joins,
            nondata_vars,
        })
    }

    fn build_kind(ds: &Rc<dyn Dataset>, config: &TableConfig) -> Result<TableKind> {
        let kind = match &config.layout {
            Layout::Structure { structure } => TableKind::Structure(structure.open(ds)?),
            Layout::ArrayStructure { rows } => TableKind::ArrayStructure(Rc::clone(rows)),
            Layout::Construct => TableKind::Construct(OnceCell::new()),
            Layout::Contiguous {
                structure,
                start,
                num_records,
            } => TableKind::Contiguous(ContiguousJoin::new(
                ds.as_ref(),
                structure.open(ds)?,
                start.clone(),
                num_records.clone(),
            )?),
            Layout::LinkedList { structure, start, next } => {
                TableKind::LinkedList(LinkedListJoin::new(structure.open(ds)?, start.clone(), next.clone()))
            },
            Layout::ParentIndex {
                structure,
                parent_index,
            } => TableKind::ParentIndex(ParentIndexJoin::new(
                ds.as_ref(),
                structure.open(ds)?,
                parent_index.clone(),
            )?),
            Layout::ParentId { structure, parent_id } => {
                TableKind::ParentId(ParentIdJoin::new(ds.as_ref(), structure.open(ds)?, parent_id.clone())?)
            },
            Layout::MultidimInner { outer, inner, vars } => {
                let variables = multidim_variables(ds.as_ref(), &[outer, inner], vars.as_deref())?;
                let inner_len = dim_len(ds.as_ref(), inner)?;
                TableKind::Multidim {
                    join: MultidimJoin::new(&config.name, variables, 2, inner_len, MultidimSource::ParentRow),
                    label: format!("Multidim({},{})", outer, inner),
                }
            },
            Layout::MultidimInner3D {
                outer,
                middle,
                inner,
                vars,
            } => {
                let variables = multidim_variables(ds.as_ref(), &[outer, middle, inner], vars.as_deref())?;
                let inner_len = dim_len(ds.as_ref(), inner)?;
                TableKind::Multidim {
                    join: MultidimJoin::new(&config.name, variables, 3, inner_len, MultidimSource::RootRow),
                    label: format!("Multidim({},{},{})", outer, middle, inner),
                }
            },
            Layout::MultidimInnerPseudo { outer, inner, vars } => {
                let variables = multidim_variables(ds.as_ref(), &[outer, inner], vars.as_deref())?;
                let names: Vec<String> = variables.iter().map(|v| v.name.clone()).collect();
                let structure = Structure::pseudo(ds, &config.name, outer, Some(&names))?;
                let inner_len = dim_len(ds.as_ref(), inner)?;
                TableKind::Multidim {
                    join: MultidimJoin::new(
                        &config.name,
                        variables,
                        2,
                        inner_len,
                        MultidimSource::Pseudo(structure),
                    ),
                    label: format!("MultidimPseudo({},{})", outer, inner),
                }
            },
            Layout::MultidimInnerPseudo3D {
                outer,
                middle,
                inner,
                vars,
            } => {
                let variables = multidim_variables(ds.as_ref(), &[outer, middle, inner], vars.as_deref())?;
                let names: Vec<String> = variables.iter().map(|v| v.name.clone()).collect();
                let structure = Structure::pseudo_2d(ds, &config.name, middle, outer, Some(&names))?;
                let inner_len = dim_len(ds.as_ref(), inner)?;
                TableKind::Multidim {
                    join: MultidimJoin::new(
                        &config.name,
                        variables,
                        3,
                        inner_len,
                        MultidimSource::Pseudo3D(structure),
                    ),
                    label: format!("MultidimPseudo({},{},{})", outer, middle, inner),
                }
            },
            Layout::MultidimStructure { structure } => {
                TableKind::MultidimStructure(Structure::open(ds, structure)?)
            },
            Layout::NestedStructure { structure, member } => {
                let var = ds
                    .variable(structure)
                    .ok_or_else(|| PointFlatError::missing_variable(structure.as_str()))?;
                let nested = var
                    .member(member)
                    .ok_or_else(|| PointFlatError::missing_member(member.as_str(), structure.as_str()))?;
                TableKind::NestedStructure(NestedJoin::new(member.clone(), nested.members.clone()))
            },
            Layout::Singleton { row } => TableKind::Singleton(row.clone()),
            Layout::Top => TableKind::Top,
        };
        Ok(kind)
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared feature type.
    pub fn feature_type(&self) -> Option<FeatureType> {
        self.feature_type
    }

    /// Parent table.
    pub fn parent(&self) -> Option<&Rc<Table>> {
        self.parent.as_ref()
    }

    /// Variable bound to a coordinate role.
    pub fn coord(&self, role: CoordName) -> Option<&str> {
        self.coords.get(&role).map(String::as_str)
    }

    /// Extra joins of this table.
    pub fn extra_joins(&self) -> &[ExtraJoin] {
        &self.extra_joins
    }

    /// Check if this is the dataset-scope top table.
    pub fn is_top(&self) -> bool {
        matches!(self.kind, TableKind::Top)
    }

    /// The fixed row of a singleton table.
    pub fn fixed_row(&self) -> Option<&Row> {
        match &self.kind {
            TableKind::Singleton(row) => Some(row),
            _ => None,
        }
    }

    /// Check if a variable is structural (start, next, index, ...) rather than data.
    pub fn is_nondata(&self, name: &str) -> bool {
        self.nondata_vars.iter().any(|n| n == name)
    }

    /// Iterate over this table's rows. Child tables need a cursor positioned on their
    /// parent row; root tables ignore it.
    pub fn rows(&self, cursor: Option<&Cursor>) -> Result<BoxRowIter> {
        let needs_cursor = || {
            cursor.ok_or_else(|| {
                PointFlatError::invalid_config(format!("Table {} needs a parent row to iterate", self.name))
            })
        };
        match &self.kind {
            TableKind::Structure(s) => Ok(Box::new(s.iter())),
            TableKind::ArrayStructure(rows) => Ok(Box::new(RowsIter::new(Rc::clone(rows)))),
            TableKind::Construct(cell) => match cell.get() {
                Some(rows) => Ok(Box::new(RowsIter::new(Rc::clone(rows)))),
                None => Err(PointFlatError::invalid_config(format!(
                    "Constructed table {} has no rows",
                    self.name
                ))),
            },
            TableKind::Contiguous(j) => j.rows(needs_cursor()?),
            TableKind::LinkedList(j) => j.rows(needs_cursor()?),
            TableKind::ParentIndex(j) => j.rows(needs_cursor()?),
            TableKind::ParentId(j) => j.rows(needs_cursor()?),
            TableKind::Multidim { join, .. } => join.rows(needs_cursor()?),
            TableKind::MultidimStructure(s) => {
                let parent = needs_cursor()?.parent_recnum();
                Ok(Box::new(RangeIter::new(s.clone(), parent * s.stride(), s.stride())))
            },
            TableKind::NestedStructure(j) => j.rows(needs_cursor()?),
            TableKind::Singleton(row) => Ok(Box::new(SingletonIter::new(row.clone()))),
            TableKind::Top => Ok(Box::new(SingletonIter::new(Row::empty()))),
        }
    }

    /// Number of rows of a root table, when known without iterating.
    pub fn num_rows(&self) -> Option<usize> {
        match &self.kind {
            TableKind::Structure(s) => Some(s.num_rows()),
            TableKind::ArrayStructure(rows) => Some(rows.len()),
            TableKind::Construct(cell) => cell.get().map(|r| r.len()),
            TableKind::Singleton(_) | TableKind::Top => Some(1),
            _ => None,
        }
    }

    fn structure(&self) -> Option<&Structure> {
        match &self.kind {
            TableKind::Structure(s) | TableKind::MultidimStructure(s) => Some(s),
            TableKind::Contiguous(j) => Some(j.structure()),
            TableKind::LinkedList(j) => Some(j.structure()),
            TableKind::ParentIndex(j) => Some(j.structure()),
            TableKind::ParentId(j) => Some(j.structure()),
            _ => None,
        }
    }

    /// Variables of this table's rows.
    pub fn cols(&self) -> Vec<Variable> {
        if let Some(s) = self.structure() {
            return s.variables().iter().filter(|v| !v.is_structure()).cloned().collect();
        }
        match &self.kind {
            TableKind::Multidim { join, .. } => join.variables().to_vec(),
            TableKind::NestedStructure(j) => j.variables().to_vec(),
            TableKind::ArrayStructure(rows) => row_variables(rows),
            TableKind::Construct(cell) => cell.get().map(|rows| row_variables(rows)).unwrap_or_default(),
            TableKind::Singleton(row) => row.members().members().iter().map(Variable::from_member).collect(),
            _ => Vec::new(),
        }
    }

    /// Find a variable of this table's rows.
    pub fn find_variable(&self, name: &str) -> Option<Variable> {
        if let Some(s) = self.structure() {
            return s.find_variable(name).cloned();
        }
        match &self.kind {
            TableKind::Multidim { join, .. } => join.variables().iter().find(|v| v.name == name).cloned(),
            TableKind::NestedStructure(j) => j.variables().iter().find(|v| v.name == name).cloned(),
            TableKind::ArrayStructure(_) | TableKind::Construct(_) => {
                self.cols().into_iter().find(|v| v.name == name)
            },
            _ => None,
        }
    }

    /// Check if this table waits for rows from a [`Layout::ParentId`] descendant.
    pub fn needs_constructed_rows(&self) -> bool {
        matches!(&self.kind, TableKind::Construct(cell) if cell.get().is_none())
    }

    /// Rows this table constructs for its nearest [`Layout::Construct`] ancestor.
    pub fn constructed_rows(&self) -> Option<Rc<[Row]>> {
        match &self.kind {
            TableKind::ParentId(j) => Some(j.constructed_rows()),
            _ => None,
        }
    }

    /// Fill a constructed table. Returns false if this table does not take rows.
    pub fn accept_constructed_rows(&self, rows: Rc<[Row]>) -> bool {
        match &self.kind {
            TableKind::Construct(cell) => cell.set(rows).is_ok(),
            _ => false,
        }
    }

    /// Descriptive name, e.g. `Contig(rowSize)`.
    pub fn display_name(&self) -> String {
        match &self.kind {
            TableKind::Structure(s) if s.is_pseudo() => format!("PseudoStructure({})", s.name()),
            TableKind::Structure(s) => format!("Structure({})", s.name()),
            TableKind::ArrayStructure(_) => format!("ArrayStructure({})", self.name),
            TableKind::Construct(_) => "Constructed".to_string(),
            TableKind::Contiguous(j) => format!("Contig({})", j),
            TableKind::LinkedList(j) => format!("Linked({})", j),
            TableKind::ParentIndex(j) => format!("Indexed({})", j),
            TableKind::ParentId(j) => format!("ParentId({})", j),
            TableKind::Multidim { label, .. } => label.clone(),
            TableKind::MultidimStructure(s) => format!("MultidimStructure({})", s.name()),
            TableKind::NestedStructure(_) => format!("NestedStructure({})", self.name),
            TableKind::Singleton(_) => "Singleton".to_string(),
            TableKind::Top => "TopScalars".to_string(),
        }
    }

    fn role_label(&self, var: &str) -> String {
        self.coords
            .iter()
            .filter(|(_, v)| v.as_str() == var)
            .map(|(role, _)| format!("[{}]", role))
            .collect()
    }

    /// Append a description of this table and its ancestors, root first.
    /// Returns the indent for the next level.
    pub fn show(&self, out: &mut String, indent: usize) -> usize {
        let indent = match &self.parent {
            Some(p) => p.show(out, indent),
            None => indent,
        };
        let pad = " ".repeat(indent);
        let ft = self
            .feature_type
            .map(|t| format!(" featureType={}", t))
            .unwrap_or_default();
        let _ = writeln!(out, "{}Table {}: {}{}", pad, self.name, self.display_name(), ft);
        if !self.extra_joins.is_empty() {
            let _ = writeln!(out, "{}  ExtraJoins:", pad);
            for j in &self.extra_joins {
                let _ = writeln!(out, "{}    {}", pad, j);
            }
        }
        if !self.coords.is_empty() {
            let coords: Vec<String> = self.coords.iter().map(|(r, v)| format!("{}={}", r, v)).collect();
            let _ = writeln!(out, "{}  Coordinates: {}", pad, coords.join(", "));
        }
        let cols = self.cols();
        if !cols.is_empty() {
            let _ = writeln!(out, "{}  Variables:", pad);
            for v in cols {
                let _ = writeln!(out, "{}    {} {}", pad, v.name_and_dimensions(), self.role_label(&v.name));
            }
        }
        indent + 2
    }
}

fn row_variables(rows: &[Row]) -> Vec<Variable> {
    rows.first()
        .map(|r| r.members().members().iter().map(Variable::from_member).collect())
        .unwrap_or_default()
}

fn dim_len(ds: &dyn Dataset, name: &str) -> Result<usize> {
    ds.dimension(name)
        .map(|d| d.len)
        .ok_or_else(|| PointFlatError::missing_dimension(name))
}

/// Variables whose leading dimensions are `dims`, or the named ones.
fn multidim_variables(ds: &dyn Dataset, dims: &[&String], vars: Option<&[String]>) -> Result<Vec<Variable>> {
    for d in dims {
        dim_len(ds, d)?;
    }
    let variables = match vars {
        Some(names) => names
            .iter()
            .filter_map(|n| {
                let v = ds.variable(n);
                if v.is_none() {
                    tracing::warn!("Skipping missing variable {}", n);
                }
                v
            })
            .collect(),
        None => ds
            .variables()
            .into_iter()
            .filter(|v| {
                !v.is_structure()
                    && v.dims.len() >= dims.len()
                    && v.dims.iter().zip(dims.iter()).all(|(a, b)| a == *b)
            })
            .collect(),
    };
    Ok(variables)
}

/// Build the tables of one root-to-leaf config path and resolve constructed tables.
///
/// Returns the tables leaf first.
pub fn build_chain(ds: &Rc<dyn Dataset>, path: &[&TableConfig]) -> Result<Vec<Rc<Table>>> {
    let mut root_first: Vec<Rc<Table>> = Vec::with_capacity(path.len());
    for config in path {
        let parent = root_first.last().cloned();
        root_first.push(Rc::new(Table::build(ds, config, parent)?));
    }

    // every ParentId table fills the nearest constructed table above it
    let mut pending: Option<&Rc<Table>> = None;
    for table in &root_first {
        if let Some(rows) = table.constructed_rows() {
            match pending.take() {
                Some(target) => {
                    target.accept_constructed_rows(rows);
                },
                None => tracing::debug!("ParentId table {} has no constructed parent", table.name()),
            }
        }
        if table.needs_constructed_rows() {
            pending = Some(table);
        }
    }
    if let Some(t) = root_first.iter().find(|t| t.needs_constructed_rows()) {
        return Err(PointFlatError::invalid_config(format!(
            "Constructed table {} has no ParentId child",
            t.name()
        )));
    }

    root_first.reverse();
    Ok(root_first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataType, MemoryDataset};

    fn ragged() -> Rc<dyn Dataset> {
        let mut ds = MemoryDataset::new("mem");
        ds.add_dimension("obs", 5);
        ds.add_text(
            "station_name",
            &["obs"],
            ["A", "B", "A", "C", "B"].iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
        ds.add_numeric("temp", &["obs"], DataType::Float, vec![1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        Rc::new(ds)
    }

    #[test]
    fn construct_is_filled_by_parent_id_child() {
        let ds = ragged();
        let stations = TableConfig::new("station", Layout::Construct);
        let obs = TableConfig::new(
            "obs",
            Layout::ParentId {
                structure: StructureSpec::pseudo("obs", "obs"),
                parent_id: "station_name".into(),
            },
        );
        let chain = build_chain(&ds, &[&stations, &obs]).unwrap();
        let root = &chain[1];
        assert_eq!(root.num_rows(), Some(3));
        let names: Vec<String> = root
            .rows(None)
            .unwrap()
            .map(|r| r.unwrap().scalar_string("station_name").unwrap())
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!(chain[0].is_nondata("station_name"));
    }

    #[test]
    fn unfilled_construct_is_an_error() {
        let ds = ragged();
        let stations = TableConfig::new("station", Layout::Construct);
        let obs = TableConfig::new(
            "obs",
            Layout::Structure {
                structure: StructureSpec::pseudo("obs", "obs"),
            },
        );
        assert!(build_chain(&ds, &[&stations, &obs]).is_err());
    }

    #[test]
    fn child_table_needs_cursor() {
        let ds = ragged();
        let config = TableConfig::new(
            "obs",
            Layout::ParentIndex {
                structure: StructureSpec::pseudo("obs", "obs"),
                parent_index: "temp".into(),
            },
        );
        let table = Table::build(&ds, &config, None).unwrap();
        assert!(table.rows(None).is_err());
        assert_eq!(table.display_name(), "Indexed(parentIndex=temp, parents=5)");
    }

    #[test]
    fn missing_variable_is_fatal() {
        let ds = ragged();
        let config = TableConfig::new(
            "obs",
            Layout::Contiguous {
                structure: StructureSpec::pseudo("obs", "obs"),
                start: None,
                num_records: "rowSize".into(),
            },
        );
        assert!(matches!(
            Table::build(&ds, &config, None),
            Err(PointFlatError::MissingVariable { .. })
        ));
    }
}
