//! The storage boundary: dimensions, variable descriptors and the [`Dataset`] trait.

use super::value::{ArrayData, DataType, Member, MissingValues, Row};
use crate::error::{PointFlatError, Result};
use std::collections::BTreeMap;
use std::fmt;

/// A named dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    /// Dimension name.
    pub name: String,
    /// Current length.
    pub len: usize,
    /// Whether this is the record (unlimited) dimension.
    pub unlimited: bool,
}

impl Dimension {
    /// Create a fixed-length dimension.
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
            unlimited: false,
        }
    }
}

/// An attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Text attribute.
    Text(String),
    /// Numeric attribute (scalar or list).
    Numbers(Vec<f64>),
}

impl AttrValue {
    /// Text value, if this is a text attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Numbers(_) => None,
        }
    }

    /// First number, if numeric or parseable.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Text(s) => s.trim().parse().ok(),
            Self::Numbers(v) => v.first().copied(),
        }
    }

    /// All numbers.
    pub fn as_f64s(&self) -> Vec<f64> {
        match self {
            Self::Text(s) => s.trim().parse().into_iter().collect(),
            Self::Numbers(v) => v.clone(),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Numbers(v) if v.len() == 1 => write!(f, "{}", v[0]),
            Self::Numbers(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Numbers(vec![v])
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Numbers(v)
    }
}

/// Descriptor of a variable (or of a member of a structure variable).
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Dimension names, outermost first.
    pub dims: Vec<String>,
    /// Dimension lengths, parallel to `dims`.
    pub shape: Vec<usize>,
    /// Storage type.
    pub dtype: DataType,
    /// Attributes.
    pub attributes: BTreeMap<String, AttrValue>,
    /// Member variables, for structures and sequences.
    pub members: Vec<Variable>,
}

impl Variable {
    /// Create a variable descriptor.
    pub fn new(name: impl Into<String>, dtype: DataType, dims: &[(&str, usize)]) -> Self {
        Self {
            name: name.into(),
            dims: dims.iter().map(|(n, _)| n.to_string()).collect(),
            shape: dims.iter().map(|(_, l)| *l).collect(),
            dtype,
            attributes: BTreeMap::new(),
            members: Vec::new(),
        }
    }

    /// Descriptor for a field of a row that has no backing variable.
    pub fn from_member(m: &Member) -> Self {
        let mut v = Self {
            name: m.name.clone(),
            dims: Vec::new(),
            shape: m.shape.clone(),
            dtype: m.dtype,
            attributes: BTreeMap::new(),
            members: Vec::new(),
        };
        if let Some(units) = &m.units {
            v.set_attribute("units", units.as_str());
        }
        if let Some(fill) = m.missing.fill_value {
            v.set_attribute("_FillValue", fill);
        }
        v
    }

    /// Set an attribute.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttrValue>) -> &mut Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Builder form of [`Variable::set_attribute`].
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Attach member variables (makes this a structure).
    pub fn with_members(mut self, members: Vec<Variable>) -> Self {
        self.members = members;
        self
    }

    /// Look up an attribute.
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Look up a text attribute.
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(AttrValue::as_str)
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Name of the outermost dimension.
    pub fn outer_dim(&self) -> Option<&str> {
        self.dims.first().map(String::as_str)
    }

    /// Check if this variable is a structure or sequence.
    pub fn is_structure(&self) -> bool {
        self.dtype.is_structure()
    }

    /// Find a member variable.
    pub fn member(&self, name: &str) -> Option<&Variable> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Units attribute.
    pub fn units(&self) -> Option<&str> {
        self.attribute_str("units")
    }

    /// Long name or description attribute.
    pub fn description(&self) -> Option<&str> {
        self.attribute_str("long_name")
            .or_else(|| self.attribute_str("description"))
    }

    /// Missing-data markers from the CF attributes.
    pub fn missing_values(&self) -> MissingValues {
        let mut mv = MissingValues {
            fill_value: self.attribute("_FillValue").and_then(AttrValue::as_f64),
            missing: self
                .attribute("missing_value")
                .map(AttrValue::as_f64s)
                .unwrap_or_default(),
            valid_min: self.attribute("valid_min").and_then(AttrValue::as_f64),
            valid_max: self.attribute("valid_max").and_then(AttrValue::as_f64),
        };
        if let Some(range) = self.attribute("valid_range").map(AttrValue::as_f64s) {
            if range.len() == 2 {
                mv.valid_min = Some(range[0]);
                mv.valid_max = Some(range[1]);
            }
        }
        mv
    }

    /// Row-level member descriptor, dropping the first `skip` dimensions.
    pub fn to_member(&self, skip: usize) -> Member {
        Member {
            name: self.name.clone(),
            dtype: self.dtype,
            units: self.units().map(str::to_string),
            description: self.description().map(str::to_string),
            shape: self.shape.iter().skip(skip).copied().collect(),
            missing: self.missing_values(),
        }
    }

    /// Name and dimensions, e.g. `lat(station)`.
    pub fn name_and_dimensions(&self) -> String {
        if self.dims.is_empty() {
            self.name.clone()
        } else {
            format!("{}({})", self.name, self.dims.join(", "))
        }
    }
}

/// Read access to a self-describing, array-oriented dataset.
///
/// Implementations are assumed immutable for as long as tables built over them live.
pub trait Dataset: fmt::Debug {
    /// Where the data came from (file path or a synthetic name).
    fn location(&self) -> &str;

    /// Look up a global attribute.
    fn attribute(&self, name: &str) -> Option<AttrValue>;

    /// Look up a dimension.
    fn dimension(&self, name: &str) -> Option<Dimension>;

    /// All dimensions.
    fn dimensions(&self) -> Vec<Dimension>;

    /// Look up a top-level variable.
    fn variable(&self, name: &str) -> Option<Variable>;

    /// All top-level variables.
    fn variables(&self) -> Vec<Variable>;

    /// Read a whole variable.
    fn read(&self, name: &str) -> Result<ArrayData>;

    /// Read a single record of a structure variable.
    fn read_structure_row(&self, name: &str, recno: usize) -> Result<Row> {
        let _ = recno;
        Err(PointFlatError::invalid_config(format!(
            "{} has no structure variable '{}'",
            self.location(),
            name
        )))
    }

    /// Global text attribute.
    fn attribute_str(&self, name: &str) -> Option<String> {
        self.attribute(name).and_then(|a| a.as_str().map(str::to_string))
    }

    /// Read the first element of a variable as f64.
    fn read_scalar_f64(&self, name: &str) -> Result<f64> {
        self.read(name)?
            .first_f64()
            .ok_or_else(|| PointFlatError::Conversion(format!("{} is not numeric", name)))
    }
}
