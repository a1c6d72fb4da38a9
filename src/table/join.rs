//! Joins between a parent table and its children.
//!
//! Each join is built once, when its table is built, and is read-only afterwards. The
//! index-based joins scan their index variable at construction and keep a reverse map
//! from parent to the ascending list of child record numbers.

use super::config::{JoinArrayKind, JoinConfig};
use super::cursor::Cursor;
use crate::data::iter::{self, IndexedIter, LinkedIter, RangeIter, RowsIter};
use crate::data::{ArrayData, BoxRowIter, Dataset, Row, Structure, StructureMembers, Value, Variable};
use crate::error::{PointFlatError, Result};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Values of an index or id variable, in record order.
///
/// Looked up as a dataset variable first, then as a member of `structure`.
fn read_key_values(ds: &dyn Dataset, structure: &Structure, name: &str) -> Result<Vec<Option<Value>>> {
    if let Some(var) = ds.variable(name) {
        let data = ds.read(name).map_err(|e| {
            tracing::error!("Failed to read index variable {}: {}", name, e);
            e
        })?;
        return Ok((0..data.len()).map(|i| data.flat(i, var.dtype)).collect());
    }
    if structure.members().find(name).is_some() {
        return structure
            .iter()
            .map(|row| row.map(|r| r.get(name).cloned()))
            .collect();
    }
    Err(PointFlatError::missing_variable(name))
}

fn parent_member_i64(cursor: &Cursor, member: &str) -> Result<Option<i64>> {
    let row = cursor
        .parent_row()
        .ok_or_else(|| PointFlatError::invalid_config("Child table iterated without a parent row"))?;
    if row.get(member).is_none() {
        return Err(PointFlatError::missing_member(member, row.members().name()));
    }
    Ok(row.scalar_i64(member))
}

/// Children stored contiguously, located by (start, count).
#[derive(Debug)]
pub struct ContiguousJoin {
    structure: Structure,
    start: Option<String>,
    num_records: String,
    ranges: Option<Vec<(usize, usize)>>,
}

impl ContiguousJoin {
    /// Build the join. Without `start`, `num_records` is read once and the starts are
    /// accumulated from it.
    pub fn new(
        ds: &dyn Dataset,
        structure: Structure,
        start: Option<String>,
        num_records: String,
    ) -> Result<Self> {
        let ranges = match start {
            Some(_) => None,
            None => {
                let counts = read_key_values(ds, &structure, &num_records)?;
                let mut ranges = Vec::with_capacity(counts.len());
                let mut next = 0usize;
                for count in counts {
                    let n = count
                        .and_then(|v| v.as_i64())
                        .filter(|&n| n > 0)
                        .map(|n| n as usize)
                        .unwrap_or(0);
                    ranges.push((next, n));
                    next += n;
                }
                tracing::debug!("Contiguous {}: {} parents, {} children", structure.name(), ranges.len(), next);
                Some(ranges)
            },
        };
        Ok(Self {
            structure,
            start,
            num_records,
            ranges,
        })
    }

    /// Child rows.
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Computed `(start, count)` per parent, when no start member was given.
    pub fn ranges(&self) -> Option<&[(usize, usize)]> {
        self.ranges.as_deref()
    }

    /// Structural variables that are not data.
    pub fn nondata_vars(&self) -> Vec<String> {
        self.start.iter().cloned().chain([self.num_records.clone()]).collect()
    }

    /// Children of the parent at the cursor.
    pub fn rows(&self, cursor: &Cursor) -> Result<BoxRowIter> {
        let (first, count) = match (&self.ranges, &self.start) {
            (Some(ranges), _) => match ranges.get(cursor.parent_recnum()) {
                Some(&r) => r,
                None => return Ok(iter::empty()),
            },
            (None, Some(start)) => {
                let first = parent_member_i64(cursor, start)?;
                let count = parent_member_i64(cursor, &self.num_records)?;
                match (first, count) {
                    (Some(f), Some(n)) if f >= 0 && n > 0 => (f as usize, n as usize),
                    _ => return Ok(iter::empty()),
                }
            },
            (None, None) => return Ok(iter::empty()),
        };
        Ok(Box::new(RangeIter::new(self.structure.clone(), first, count)))
    }
}

impl fmt::Display for ContiguousJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start {
            Some(start) => write!(f, "start={}, numRecords={}", start, self.num_records),
            None => write!(f, "numRecords={}", self.num_records),
        }
    }
}

/// Children chained from a start member of the parent through a next member of each child.
#[derive(Debug)]
pub struct LinkedListJoin {
    structure: Structure,
    start: String,
    next: String,
}

impl LinkedListJoin {
    /// Build the join. No pre-scan is made.
    pub fn new(structure: Structure, start: String, next: String) -> Self {
        Self { structure, start, next }
    }

    /// Child rows.
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Structural variables that are not data.
    pub fn nondata_vars(&self) -> Vec<String> {
        vec![self.start.clone(), self.next.clone()]
    }

    /// Children of the parent at the cursor.
    pub fn rows(&self, cursor: &Cursor) -> Result<BoxRowIter> {
        let first = parent_member_i64(cursor, &self.start)?
            .filter(|&f| f >= 0)
            .map(|f| f as usize);
        Ok(Box::new(LinkedIter::new(self.structure.clone(), first, self.next.clone())))
    }
}

impl fmt::Display for LinkedListJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "start={}, next={}", self.start, self.next)
    }
}

/// Each child carries the record number of its parent.
#[derive(Debug)]
pub struct ParentIndexJoin {
    structure: Structure,
    parent_index: String,
    index: HashMap<i64, Rc<[usize]>>,
}

impl ParentIndexJoin {
    /// Build the join by scanning the parent index once.
    pub fn new(ds: &dyn Dataset, structure: Structure, parent_index: String) -> Result<Self> {
        let values = read_key_values(ds, &structure, &parent_index)?;
        let mut map: HashMap<i64, Vec<usize>> = HashMap::new();
        for (child, value) in values.into_iter().enumerate() {
            if let Some(parent) = value.and_then(|v| v.as_i64()) {
                map.entry(parent).or_default().push(child);
            }
        }
        let index = map.into_iter().map(|(k, v)| (k, Rc::from(v))).collect();
        Ok(Self {
            structure,
            parent_index,
            index,
        })
    }

    /// Child rows.
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Child record numbers of a parent, ascending.
    pub fn children(&self, parent: i64) -> &[usize] {
        self.index.get(&parent).map(|v| &v[..]).unwrap_or(&[])
    }

    /// Number of distinct parents referenced.
    pub fn num_parents(&self) -> usize {
        self.index.len()
    }

    /// Structural variables that are not data.
    pub fn nondata_vars(&self) -> Vec<String> {
        vec![self.parent_index.clone()]
    }

    /// Children of the parent at the cursor. An unreferenced parent has none.
    pub fn rows(&self, cursor: &Cursor) -> Result<BoxRowIter> {
        let parent = cursor.parent_recnum() as i64;
        Ok(match self.index.get(&parent) {
            Some(list) => Box::new(IndexedIter::new(self.structure.clone(), Rc::clone(list))),
            None => iter::empty(),
        })
    }
}

impl fmt::Display for ParentIndexJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parentIndex={}, parents={}", self.parent_index, self.index.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ParentKey {
    Int(i64),
    Text(String),
}

impl ParentKey {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Double(d) if d.is_nan() => None,
            Value::Double(d) if d.fract() == 0.0 => Some(Self::Int(*d as i64)),
            Value::Double(d) => Some(Self::Text(d.to_string())),
            Value::Str(s) => Some(Self::Text(s.trim().to_string())),
            Value::Array(_) => Some(Self::Text(v.as_string().trim().to_string())),
        }
    }
}

#[derive(Debug)]
struct ParentGroup {
    recnums: Rc<[usize]>,
    representative: Row,
}

/// Each child carries an identifier of its parent. Parents exist only implicitly, as the
/// distinct identifiers in first-seen order.
#[derive(Debug)]
pub struct ParentIdJoin {
    structure: Structure,
    parent_id: String,
    groups: Vec<ParentGroup>,
}

impl ParentIdJoin {
    /// Build the join by scanning the ids once. The first child of each parent is read
    /// as that parent's representative row.
    pub fn new(ds: &dyn Dataset, structure: Structure, parent_id: String) -> Result<Self> {
        let values = read_key_values(ds, &structure, &parent_id)?;
        let mut order: Vec<ParentKey> = Vec::new();
        let mut map: HashMap<ParentKey, Vec<usize>> = HashMap::new();
        for (child, value) in values.iter().enumerate() {
            let Some(key) = value.as_ref().and_then(ParentKey::from_value) else {
                continue;
            };
            map.entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(child);
        }

        let mut groups = Vec::with_capacity(order.len());
        for key in order {
            let recnums = map.remove(&key).unwrap_or_default();
            let representative = match recnums.first() {
                Some(&first) => structure.read_row(first)?,
                None => continue,
            };
            groups.push(ParentGroup {
                recnums: Rc::from(recnums),
                representative,
            });
        }
        tracing::debug!("ParentId {}: {} distinct parents", parent_id, groups.len());
        Ok(Self {
            structure,
            parent_id,
            groups,
        })
    }

    /// Child rows.
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// One representative row per distinct parent, in first-seen order.
    pub fn constructed_rows(&self) -> Rc<[Row]> {
        self.groups.iter().map(|g| g.representative.clone()).collect()
    }

    /// Structural variables that are not data.
    pub fn nondata_vars(&self) -> Vec<String> {
        vec![self.parent_id.clone()]
    }

    /// Children of the constructed parent at the cursor.
    pub fn rows(&self, cursor: &Cursor) -> Result<BoxRowIter> {
        Ok(match self.groups.get(cursor.parent_recnum()) {
            Some(g) => Box::new(IndexedIter::new(self.structure.clone(), Rc::clone(&g.recnums))),
            None => iter::empty(),
        })
    }
}

impl fmt::Display for ParentIdJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parentId={}, parents={}", self.parent_id, self.groups.len())
    }
}

/// Where the arrays of a multidimensional join come from.
#[derive(Debug)]
pub enum MultidimSource {
    /// The parent row holds `(inner, ...)` slices.
    ParentRow,
    /// The grandparent row holds `(middle, inner, ...)` slices.
    RootRow,
    /// The parent record of an `(outer, inner)` pseudo-structure.
    Pseudo(Structure),
    /// The `(outer, middle)` record of a 2-D pseudo-structure.
    Pseudo3D(Structure),
}

/// Children synthesized from the inner dimension of multidimensional variables.
#[derive(Debug)]
pub struct MultidimJoin {
    members: Rc<StructureMembers>,
    variables: Vec<Variable>,
    inner_len: usize,
    source: MultidimSource,
}

impl MultidimJoin {
    /// Build the join. `variables` have the inner dimension at position `skip - 1`.
    pub fn new(name: &str, variables: Vec<Variable>, skip: usize, inner_len: usize, source: MultidimSource) -> Self {
        let members = variables.iter().map(|v| v.to_member(skip)).collect();
        Self {
            members: Rc::new(StructureMembers::new(name, members)),
            variables,
            inner_len,
            source,
        }
    }

    /// Variables contributing members.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Length of the inner dimension.
    pub fn inner_len(&self) -> usize {
        self.inner_len
    }

    /// Children of the parent at the cursor.
    pub fn rows(&self, cursor: &Cursor) -> Result<BoxRowIter> {
        let level = cursor.current_index();
        let columns: Vec<Option<Value>> = match &self.source {
            MultidimSource::ParentRow => {
                let row = cursor
                    .parent_row()
                    .ok_or_else(|| PointFlatError::invalid_config("Multidim table without a parent row"))?;
                self.columns(row)
            },
            MultidimSource::RootRow => {
                let row = cursor
                    .row(level + 2)
                    .ok_or_else(|| PointFlatError::invalid_config("Multidim 3D table without a root row"))?;
                let middle = cursor.recnum(level + 1);
                self.columns(row)
                    .into_iter()
                    .zip(self.members.members())
                    .map(|(v, m)| match v {
                        Some(Value::Array(a)) => a.outer(middle, m.dtype),
                        other => other,
                    })
                    .collect()
            },
            MultidimSource::Pseudo(structure) => {
                let row = structure.read_row(cursor.parent_recnum())?;
                self.columns(&row)
            },
            MultidimSource::Pseudo3D(structure) => {
                let recno = cursor.recnum(level + 2) * structure.stride() + cursor.recnum(level + 1);
                let row = structure.read_row(recno)?;
                self.columns(&row)
            },
        };
        Ok(Box::new(RowsIter::new(self.synthesize(&columns))))
    }

    fn columns(&self, row: &Row) -> Vec<Option<Value>> {
        self.members.members().iter().map(|m| row.get(&m.name).cloned()).collect()
    }

    fn synthesize(&self, columns: &[Option<Value>]) -> Rc<[Row]> {
        (0..self.inner_len)
            .map(|i| {
                let values = columns
                    .iter()
                    .zip(self.members.members())
                    .map(|(col, m)| match col {
                        Some(Value::Array(a)) => a.outer(i, m.dtype),
                        // values without the inner dimension repeat on every child
                        Some(scalar) => Some(scalar.clone()),
                        None => None,
                    })
                    .map(|v| v.unwrap_or(Value::Double(f64::NAN)))
                    .collect();
                Row::new(Rc::clone(&self.members), values)
            })
            .collect()
    }
}

/// Children are a nested structure member of the parent row.
#[derive(Debug)]
pub struct NestedJoin {
    member: String,
    variables: Vec<Variable>,
}

impl NestedJoin {
    /// Build the join from the descriptor of the nested member.
    pub fn new(member: String, variables: Vec<Variable>) -> Self {
        Self { member, variables }
    }

    /// Nested member variables.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Children of the parent at the cursor. No I/O is done.
    pub fn rows(&self, cursor: &Cursor) -> Result<BoxRowIter> {
        let row = cursor
            .parent_row()
            .ok_or_else(|| PointFlatError::invalid_config("Nested table without a parent row"))?;
        let rows = row
            .nested_rows(&self.member)
            .ok_or_else(|| PointFlatError::missing_member(self.member.as_str(), row.members().name()))?;
        Ok(Box::new(RowsIter::new(Rc::from(rows.to_vec()))))
    }
}

/// Extra data joined into the rows of one table.
#[derive(Debug)]
pub enum ExtraJoin {
    /// One element of an eagerly read array.
    Array {
        /// The variable.
        var: Variable,
        /// Indexing rule.
        kind: JoinArrayKind,
        /// Its data.
        data: ArrayData,
        /// Single-member row descriptor.
        members: Rc<StructureMembers>,
    },
    /// One record of a multidimensional structure.
    MultidimStructure {
        /// Structure to read.
        structure: Structure,
        /// Inner dimension length.
        dim_len: usize,
    },
    /// The record of another table named by a member of the current row.
    ParentIndex {
        /// Table to read.
        structure: Structure,
        /// Member of the current row.
        parent_index: String,
    },
}

impl ExtraJoin {
    /// Build a join, reading array data eagerly. Read failures are logged and returned.
    pub fn new(ds: &Rc<dyn Dataset>, config: &JoinConfig) -> Result<Self> {
        match config {
            JoinConfig::Array { var, kind } => {
                let variable = ds
                    .variable(var)
                    .ok_or_else(|| PointFlatError::missing_variable(var.as_str()))?;
                let data = ds.read(var).map_err(|e| {
                    tracing::error!("Failed to read join variable {}: {}", var, e);
                    e
                })?;
                let skip = usize::from(*kind != JoinArrayKind::Scalar && variable.rank() > 0);
                let members = Rc::new(StructureMembers::new(var.as_str(), vec![variable.to_member(skip)]));
                Ok(Self::Array {
                    var: variable,
                    kind: *kind,
                    data,
                    members,
                })
            },
            JoinConfig::MultidimStructure { structure, dim_len } => Ok(Self::MultidimStructure {
                structure: Structure::open(ds, structure)?,
                dim_len: *dim_len,
            }),
            JoinConfig::ParentIndex {
                structure,
                parent_index,
            } => Ok(Self::ParentIndex {
                structure: structure.open(ds)?,
                parent_index: parent_index.clone(),
            }),
        }
    }

    /// Find a variable this join contributes.
    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        match self {
            Self::Array { var, .. } => (var.name == name).then_some(var),
            Self::MultidimStructure { structure, .. } | Self::ParentIndex { structure, .. } => {
                structure.find_variable(name)
            },
        }
    }

    /// Variables this join contributes.
    pub fn variables(&self) -> Vec<&Variable> {
        match self {
            Self::Array { var, .. } => vec![var],
            Self::MultidimStructure { structure, .. } | Self::ParentIndex { structure, .. } => {
                structure.variables().iter().collect()
            },
        }
    }

    /// The joined row for the current level of the cursor.
    pub fn join_row(&self, cursor: &Cursor) -> Result<Row> {
        let level = cursor.current_index();
        match self {
            Self::Array {
                var,
                kind,
                data,
                members,
            } => {
                let recnum = cursor.recnum(level);
                let index = match kind {
                    JoinArrayKind::Raw => recnum,
                    JoinArrayKind::Modulo(n) => recnum % (*n).max(1),
                    JoinArrayKind::Divide(n) => recnum / (*n).max(1),
                    JoinArrayKind::Level(l) => cursor.recnum(*l),
                    JoinArrayKind::Scalar => 0,
                };
                let value = match kind {
                    JoinArrayKind::Scalar => data.flat(0, var.dtype),
                    _ if var.rank() == 0 => data.flat(0, var.dtype),
                    _ => data.outer(index, var.dtype),
                };
                Ok(Row::new(Rc::clone(members), vec![value.unwrap_or(Value::Double(f64::NAN))]))
            },
            Self::MultidimStructure { structure, dim_len } => {
                let outer = if level + 1 < cursor.levels() {
                    cursor.recnum(level + 1)
                } else {
                    0
                };
                structure.read_row(outer * dim_len + cursor.recnum(level))
            },
            Self::ParentIndex {
                structure,
                parent_index,
            } => {
                let index = cursor
                    .row(level)
                    .and_then(|r| r.scalar_i64(parent_index))
                    .filter(|&i| i >= 0 && (i as usize) < structure.num_rows());
                match index {
                    Some(i) => structure.read_row(i as usize),
                    None => Ok(Row::empty()),
                }
            },
        }
    }
}

impl fmt::Display for ExtraJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array { var, kind, .. } => write!(f, "JoinArray({}, {:?})", var.name, kind),
            Self::MultidimStructure { structure, dim_len } => {
                write!(f, "JoinMultidimStructure({}, {})", structure.name(), dim_len)
            },
            Self::ParentIndex {
                structure,
                parent_index,
            } => write!(f, "JoinParentIndex({}, {})", structure.name(), parent_index),
        }
    }
}
