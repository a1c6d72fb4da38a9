//! Structures and pseudo-structures.
//!
//! A [`Structure`] is a table whose rows can be read by record number. It is either a
//! true structure variable of the dataset, or a pseudo-structure made of every variable
//! whose outer dimension is the table dimension.

use super::dataset::{Dataset, Dimension, Variable};
use super::iter::StructureIter;
use super::value::{ArrayData, Row, StructureMembers, Value};
use crate::error::{PointFlatError, Result};
use std::cell::OnceCell;
use std::rc::Rc;

#[derive(Debug)]
enum Source {
    /// A structure variable; rows come from the dataset and are projected if `select`ed.
    Variable { projected: bool },
    /// Member data read eagerly on first access.
    Pseudo { cache: OnceCell<Vec<ArrayData>> },
}

#[derive(Debug)]
struct Inner {
    name: String,
    dim: Dimension,
    outer: Option<Dimension>,
    num_rows: usize,
    stride: usize,
    members: Rc<StructureMembers>,
    variables: Vec<Variable>,
    source: Source,
    dataset: Rc<dyn Dataset>,
}

/// Handle to a readable table of rows. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Structure {
    inner: Rc<Inner>,
}

impl Structure {
    /// Open a structure variable.
    pub fn open(ds: &Rc<dyn Dataset>, name: &str) -> Result<Self> {
        let var = ds
            .variable(name)
            .ok_or_else(|| PointFlatError::missing_variable(name))?;
        if !var.is_structure() {
            return Err(PointFlatError::invalid_config(format!("{} is not a structure", name)));
        }
        let dim_name = var
            .outer_dim()
            .ok_or_else(|| PointFlatError::invalid_config(format!("Structure {} is scalar", name)))?;
        let dim = Dimension {
            name: dim_name.to_string(),
            len: var.shape[0],
            unlimited: ds.dimension(dim_name).map(|d| d.unlimited).unwrap_or(false),
        };
        // multidimensional structures are addressed by flattened record number
        let num_rows = var.size();
        let stride = if dim.len == 0 { 1 } else { num_rows / dim.len };
        let members = var.members.iter().map(|m| m.to_member(0)).collect();
        Ok(Self {
            inner: Rc::new(Inner {
                name: name.to_string(),
                dim,
                outer: None,
                num_rows,
                stride,
                members: Rc::new(StructureMembers::new(name, members)),
                variables: var.members.clone(),
                source: Source::Variable { projected: false },
                dataset: Rc::clone(ds),
            }),
        })
    }

    /// Build a pseudo-structure from all variables whose outer dimension is `dim`.
    ///
    /// `vars` restricts the members; every named variable must exist.
    pub fn pseudo(ds: &Rc<dyn Dataset>, name: &str, dim: &str, vars: Option<&[String]>) -> Result<Self> {
        let dim = ds
            .dimension(dim)
            .ok_or_else(|| PointFlatError::missing_dimension(dim))?;
        let variables = Self::collect_members(ds, vars, |v| v.outer_dim() == Some(dim.name.as_str()))?;
        Ok(Self::from_pseudo(ds, name, dim, None, variables, 1))
    }

    /// Build a pseudo-structure over `(outer, dim)` variables, flattened row-major.
    pub fn pseudo_2d(
        ds: &Rc<dyn Dataset>,
        name: &str,
        dim: &str,
        outer: &str,
        vars: Option<&[String]>,
    ) -> Result<Self> {
        let dim = ds
            .dimension(dim)
            .ok_or_else(|| PointFlatError::missing_dimension(dim))?;
        let outer = ds
            .dimension(outer)
            .ok_or_else(|| PointFlatError::missing_dimension(outer))?;
        let variables = Self::collect_members(ds, vars, |v| {
            v.dims.len() >= 2 && v.dims[0] == outer.name && v.dims[1] == dim.name
        })?;
        Ok(Self::from_pseudo(ds, name, dim, Some(outer), variables, 2))
    }

    fn collect_members(
        ds: &Rc<dyn Dataset>,
        vars: Option<&[String]>,
        accept: impl Fn(&Variable) -> bool,
    ) -> Result<Vec<Variable>> {
        match vars {
            Some(names) => names
                .iter()
                .map(|n| ds.variable(n).ok_or_else(|| PointFlatError::missing_variable(n.as_str())))
                .collect(),
            None => Ok(ds
                .variables()
                .into_iter()
                .filter(|v| !v.is_structure() && accept(v))
                .collect()),
        }
    }

    fn from_pseudo(
        ds: &Rc<dyn Dataset>,
        name: &str,
        dim: Dimension,
        outer: Option<Dimension>,
        variables: Vec<Variable>,
        skip: usize,
    ) -> Self {
        let members = variables.iter().map(|v| v.to_member(skip)).collect();
        let (num_rows, stride) = match &outer {
            Some(o) => (o.len * dim.len, dim.len),
            None => (dim.len, 1),
        };
        Self {
            inner: Rc::new(Inner {
                name: name.to_string(),
                dim,
                outer,
                num_rows,
                stride,
                members: Rc::new(StructureMembers::new(name, members)),
                variables,
                source: Source::Pseudo {
                    cache: OnceCell::new(),
                },
                dataset: Rc::clone(ds),
            }),
        }
    }

    /// Restrict to the named members. Unknown names are ignored.
    pub fn select(&self, vars: &[String]) -> Self {
        let inner = &self.inner;
        let variables: Vec<Variable> = vars
            .iter()
            .filter_map(|n| inner.variables.iter().find(|v| &v.name == n).cloned())
            .collect();
        let source = match &inner.source {
            Source::Variable { .. } => Source::Variable { projected: true },
            Source::Pseudo { .. } => Source::Pseudo {
                cache: OnceCell::new(),
            },
        };
        Self {
            inner: Rc::new(Inner {
                name: inner.name.clone(),
                dim: inner.dim.clone(),
                outer: inner.outer.clone(),
                num_rows: inner.num_rows,
                stride: inner.stride,
                members: Rc::new(inner.members.select(vars)),
                variables,
                source,
                dataset: Rc::clone(&inner.dataset),
            }),
        }
    }

    /// Structure name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Row dimension.
    pub fn dim(&self) -> &Dimension {
        &self.inner.dim
    }

    /// Outer dimension, for 2-D pseudo-structures.
    pub fn outer(&self) -> Option<&Dimension> {
        self.inner.outer.as_ref()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.inner.num_rows
    }

    /// Number of consecutive rows sharing one outer index.
    ///
    /// 1 for one-dimensional structures.
    pub fn stride(&self) -> usize {
        self.inner.stride
    }

    /// Row descriptor.
    pub fn members(&self) -> &Rc<StructureMembers> {
        &self.inner.members
    }

    /// Member variables.
    pub fn variables(&self) -> &[Variable] {
        &self.inner.variables
    }

    /// Find a member variable.
    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        self.inner.variables.iter().find(|v| v.name == name)
    }

    /// Check if this is a pseudo-structure.
    pub fn is_pseudo(&self) -> bool {
        matches!(self.inner.source, Source::Pseudo { .. })
    }

    /// Read one row.
    pub fn read_row(&self, recno: usize) -> Result<Row> {
        let len = self.num_rows();
        if recno >= len {
            return Err(PointFlatError::RecordOutOfRange {
                structure: self.inner.name.clone(),
                recno,
                len,
            });
        }
        match &self.inner.source {
            Source::Variable { projected } => {
                let row = self.inner.dataset.read_structure_row(&self.inner.name, recno)?;
                Ok(if *projected {
                    row.project(&self.inner.members)
                } else {
                    row
                })
            },
            Source::Pseudo { cache } => {
                let data = self.pseudo_data(cache)?;
                let values = self
                    .inner
                    .members
                    .members()
                    .iter()
                    .zip(data.iter())
                    .map(|(m, d)| {
                        let v = match &self.inner.outer {
                            None => d.outer(recno, m.dtype),
                            Some(_) => {
                                let o = recno / self.inner.stride;
                                let i = recno % self.inner.stride;
                                d.outer(o, m.dtype).and_then(|v| match v {
                                    Value::Array(a) => a.outer(i, m.dtype),
                                    _ => None,
                                })
                            },
                        };
                        v.unwrap_or(Value::Double(f64::NAN))
                    })
                    .collect();
                Ok(Row::new(Rc::clone(&self.inner.members), values))
            },
        }
    }

    fn pseudo_data<'a>(&self, cache: &'a OnceCell<Vec<ArrayData>>) -> Result<&'a Vec<ArrayData>> {
        if let Some(data) = cache.get() {
            return Ok(data);
        }
        let mut data = Vec::with_capacity(self.inner.variables.len());
        for v in &self.inner.variables {
            data.push(self.inner.dataset.read(&v.name)?);
        }
        tracing::debug!("Materialized {} members of {}", data.len(), self.inner.name);
        Ok(cache.get_or_init(|| data))
    }

    /// Iterate over all rows.
    pub fn iter(&self) -> StructureIter {
        StructureIter::new(self.clone())
    }
}
