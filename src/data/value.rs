//! Values, member descriptors and rows.
//!
//! A [`Row`] is one record of a table: an ordered set of named [`Value`]s that share
//! a [`StructureMembers`] descriptor with every other row of the same table.

use ndarray::{ArrayD, Axis};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Storage type of a variable or structure member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 8-bit integer.
    Byte,
    /// 16-bit integer.
    Short,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Fixed-length character array (read as strings).
    Char,
    /// Variable-length string.
    String,
    /// Fixed-size structure.
    Structure,
    /// Variable-length sequence of structures.
    Sequence,
}

impl DataType {
    /// Check if this is an integer type.
    pub fn is_integral(self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }

    /// Check if this is a numeric type.
    pub fn is_numeric(self) -> bool {
        self.is_integral() || matches!(self, Self::Float | Self::Double)
    }

    /// Check if this is a text type.
    pub fn is_string(self) -> bool {
        matches!(self, Self::Char | Self::String)
    }

    /// Check if this is a structure or sequence.
    pub fn is_structure(self) -> bool {
        matches!(self, Self::Structure | Self::Sequence)
    }
}

/// Values that mark a numeric field as missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingValues {
    /// `_FillValue` attribute.
    pub fill_value: Option<f64>,
    /// `missing_value` attribute (scalar or list).
    pub missing: Vec<f64>,
    /// Lower bound of the valid range.
    pub valid_min: Option<f64>,
    /// Upper bound of the valid range.
    pub valid_max: Option<f64>,
}

impl MissingValues {
    /// Check if a value is missing. NaN is always missing.
    pub fn is_missing(&self, v: f64) -> bool {
        if v.is_nan() {
            return true;
        }
        if self.fill_value == Some(v) || self.missing.contains(&v) {
            return true;
        }
        if let Some(min) = self.valid_min {
            if v < min {
                return true;
            }
        }
        if let Some(max) = self.valid_max {
            if v > max {
                return true;
            }
        }
        false
    }

    /// Check if any missing-data marker is declared.
    pub fn has_markers(&self) -> bool {
        self.fill_value.is_some()
            || !self.missing.is_empty()
            || self.valid_min.is_some()
            || self.valid_max.is_some()
    }
}

/// Eagerly read contents of a whole variable.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// Numeric data, converted to f64.
    Numeric(ArrayD<f64>),
    /// Text data; char arrays lose their trailing string-length dimension.
    Text(ArrayD<String>),
    /// Rows of a nested structure or sequence.
    Rows(Vec<Row>),
}

impl ArrayData {
    /// Shape of the data.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Numeric(a) => a.shape().to_vec(),
            Self::Text(a) => a.shape().to_vec(),
            Self::Rows(rows) => vec![rows.len()],
        }
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(a) => a.len(),
            Self::Text(a) => a.len(),
            Self::Rows(rows) => rows.len(),
        }
    }

    /// Check if the data has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` along the outermost axis.
    ///
    /// Zero-dimensional results collapse to scalar values typed by `dtype`.
    pub fn outer(&self, i: usize, dtype: DataType) -> Option<Value> {
        match self {
            Self::Numeric(a) => {
                if a.ndim() == 0 || i >= a.shape()[0] {
                    return None;
                }
                let sub = a.index_axis(Axis(0), i);
                if sub.ndim() == 0 {
                    sub.first().map(|&v| Value::from_f64(v, dtype))
                } else {
                    Some(Value::Array(Self::Numeric(sub.to_owned())))
                }
            },
            Self::Text(a) => {
                if a.ndim() == 0 || i >= a.shape()[0] {
                    return None;
                }
                let sub = a.index_axis(Axis(0), i);
                if sub.ndim() == 0 {
                    sub.first().map(|s| Value::Str(s.clone()))
                } else {
                    Some(Value::Array(Self::Text(sub.to_owned())))
                }
            },
            Self::Rows(rows) => rows.get(i).map(|r| Value::Array(Self::Rows(vec![r.clone()]))),
        }
    }

    /// Element `i` in row-major order, as a scalar.
    pub fn flat(&self, i: usize, dtype: DataType) -> Option<Value> {
        match self {
            Self::Numeric(a) => {
                let v = match a.as_slice() {
                    Some(s) => s.get(i).copied(),
                    None => a.iter().nth(i).copied(),
                };
                v.map(|v| Value::from_f64(v, dtype))
            },
            Self::Text(a) => {
                let v = match a.as_slice() {
                    Some(s) => s.get(i).cloned(),
                    None => a.iter().nth(i).cloned(),
                };
                v.map(Value::Str)
            },
            Self::Rows(rows) => rows.get(i).map(|r| Value::Array(Self::Rows(vec![r.clone()]))),
        }
    }

    /// First element as f64, if numeric or parseable.
    pub fn first_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(a) => a.iter().next().copied(),
            Self::Text(a) => a.iter().next().and_then(|s| s.trim().parse().ok()),
            Self::Rows(_) => None,
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer scalar.
    Int(i64),
    /// Floating point scalar.
    Double(f64),
    /// String scalar.
    Str(String),
    /// Array-valued field (including nested rows).
    Array(ArrayData),
}

impl Value {
    /// Build a scalar from an f64, typed by `dtype`.
    pub fn from_f64(v: f64, dtype: DataType) -> Self {
        if dtype.is_integral() && v.is_finite() {
            Self::Int(v as i64)
        } else {
            Self::Double(v)
        }
    }

    /// Coerce to f64. Arrays yield their first element.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Array(a) => a.first_f64(),
        }
    }

    /// Coerce to i64. Floats are truncated; NaN does not convert.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Double(v) if v.is_finite() => Some(*v as i64),
            Self::Double(_) => None,
            Self::Str(s) => s.trim().parse().ok(),
            Self::Array(a) => a.first_f64().filter(|v| v.is_finite()).map(|v| v as i64),
        }
    }

    /// Render as a string. Text arrays yield their first element.
    pub fn as_string(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::Str(s) => s.clone(),
            Self::Array(ArrayData::Text(a)) => a.iter().next().cloned().unwrap_or_default(),
            Self::Array(ArrayData::Numeric(a)) => a
                .iter()
                .next()
                .map(|v| v.to_string())
                .unwrap_or_default(),
            Self::Array(ArrayData::Rows(_)) => String::new(),
        }
    }

    /// Borrow the array payload.
    pub fn as_array(&self) -> Option<&ArrayData> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Str(s) => write!(f, "\"{}\"", s),
            Self::Array(ArrayData::Rows(rows)) => write!(f, "<{} rows>", rows.len()),
            Self::Array(a) => write!(f, "{:?}", a.shape()),
        }
    }
}

/// Descriptor of one field of a row.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Field name.
    pub name: String,
    /// Storage type.
    pub dtype: DataType,
    /// Units string.
    pub units: Option<String>,
    /// Long name or description.
    pub description: Option<String>,
    /// Per-row shape; empty for scalars.
    pub shape: Vec<usize>,
    /// Missing-data markers.
    pub missing: MissingValues,
}

impl Member {
    /// Create a scalar member.
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
            units: None,
            description: None,
            shape: Vec::new(),
            missing: MissingValues::default(),
        }
    }

    /// Set the units.
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Set the per-row shape.
    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = shape;
        self
    }

    /// Set the missing-data markers.
    pub fn with_missing(mut self, missing: MissingValues) -> Self {
        self.missing = missing;
        self
    }
}

/// Ordered member list shared by all rows of a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureMembers {
    name: String,
    members: Vec<Member>,
    index: HashMap<String, usize>,
}

impl StructureMembers {
    /// Create a member list. Later duplicates of a name are unreachable by lookup.
    pub fn new(name: impl Into<String>, members: Vec<Member>) -> Self {
        let mut index = HashMap::with_capacity(members.len());
        for (i, m) in members.iter().enumerate() {
            index.entry(m.name.clone()).or_insert(i);
        }
        Self {
            name: name.into(),
            members,
            index,
        }
    }

    /// Name of the owning structure.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All members in order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Find a member by name.
    pub fn find(&self, name: &str) -> Option<&Member> {
        self.index.get(name).map(|&i| &self.members[i])
    }

    /// Position of a member by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Restrict to the given names, in the order given. Unknown names are skipped.
    pub fn select(&self, names: &[String]) -> Self {
        let members = names
            .iter()
            .filter_map(|n| self.find(n).cloned())
            .collect();
        Self::new(self.name.clone(), members)
    }
}

/// One record of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    members: Rc<StructureMembers>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row. `values` must be parallel to `members`.
    pub fn new(members: Rc<StructureMembers>, values: Vec<Value>) -> Self {
        debug_assert_eq!(members.len(), values.len());
        Self { members, values }
    }

    /// A row with no fields.
    pub fn empty() -> Self {
        Self {
            members: Rc::new(StructureMembers::default()),
            values: Vec::new(),
        }
    }

    /// Build a row from (member, value) pairs.
    pub fn from_fields(name: impl Into<String>, fields: Vec<(Member, Value)>) -> Self {
        let (members, values): (Vec<_>, Vec<_>) = fields.into_iter().unzip();
        Self::new(Rc::new(StructureMembers::new(name, members)), values)
    }

    /// Shared member list.
    pub fn members(&self) -> &Rc<StructureMembers> {
        &self.members
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members.position(name).map(|i| &self.values[i])
    }

    /// Look up a field descriptor.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.find(name)
    }

    /// Iterate over (member, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Member, &Value)> {
        self.members.members().iter().zip(self.values.iter())
    }

    /// Field as f64.
    pub fn scalar_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    /// Field as i64.
    pub fn scalar_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Field as a string.
    pub fn scalar_string(&self, name: &str) -> Option<String> {
        self.get(name).map(Value::as_string)
    }

    /// Array-valued field.
    pub fn array(&self, name: &str) -> Option<&ArrayData> {
        self.get(name).and_then(Value::as_array)
    }

    /// Nested rows of a structure or sequence member.
    pub fn nested_rows(&self, name: &str) -> Option<&[Row]> {
        match self.get(name) {
            Some(Value::Array(ArrayData::Rows(rows))) => Some(rows),
            _ => None,
        }
    }

    /// Project onto `members`; fields this row lacks are filled with NaN.
    pub fn project(&self, members: &Rc<StructureMembers>) -> Row {
        let values = members
            .members()
            .iter()
            .map(|m| self.get(&m.name).cloned().unwrap_or(Value::Double(f64::NAN)))
            .collect();
        Row::new(Rc::clone(members), values)
    }

    /// Combine several rows into one. When names collide, the earliest row wins.
    pub fn merge(rows: &[Row]) -> Row {
        match rows {
            [] => Row::empty(),
            [only] => only.clone(),
            _ => {
                let mut seen = std::collections::HashSet::new();
                let mut members = Vec::new();
                let mut values = Vec::new();
                for row in rows {
                    for (m, v) in row.iter() {
                        if seen.insert(m.name.clone()) {
                            members.push(m.clone());
                            values.push(v.clone());
                        }
                    }
                }
                let name = rows[0].members.name().to_string();
                Row::new(Rc::new(StructureMembers::new(name, members)), values)
            },
        }
    }
}
