//! In-memory dataset.
//!
//! Useful for tests and for applications that already hold their observations in
//! memory and want the table machinery on top of them.

use super::dataset::{AttrValue, Dataset, Dimension, Variable};
use super::value::{ArrayData, DataType, Row};
use crate::error::{PointFlatError, Result};
use ndarray::{ArrayD, IxDyn};
use std::collections::{BTreeMap, HashMap};

/// A dataset whose variables live in memory.
#[derive(Debug, Default)]
pub struct MemoryDataset {
    location: String,
    attributes: BTreeMap<String, AttrValue>,
    dims: Vec<Dimension>,
    vars: Vec<Variable>,
    data: HashMap<String, ArrayData>,
}

impl MemoryDataset {
    /// Create an empty dataset.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }

    /// Set a global attribute.
    pub fn add_attribute(&mut self, name: &str, value: impl Into<AttrValue>) -> &mut Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Add a fixed-length dimension.
    pub fn add_dimension(&mut self, name: &str, len: usize) -> &mut Self {
        self.dims.push(Dimension::new(name, len));
        self
    }

    /// Add the unlimited dimension.
    pub fn add_unlimited_dimension(&mut self, name: &str, len: usize) -> &mut Self {
        self.dims.push(Dimension {
            name: name.to_string(),
            len,
            unlimited: true,
        });
        self
    }

    /// Add a numeric variable; `values` is row-major over `dims`.
    pub fn add_numeric(
        &mut self,
        name: &str,
        dims: &[&str],
        dtype: DataType,
        values: Vec<f64>,
    ) -> Result<&mut Variable> {
        let shape = self.shape_of(dims)?;
        let array = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
            PointFlatError::invalid_config(format!("Invalid shape/data size for {}: {}", name, e))
        })?;
        self.insert(name, dims, &shape, dtype, ArrayData::Numeric(array))
    }

    /// Add a string variable; `values` is row-major over `dims`.
    pub fn add_text(&mut self, name: &str, dims: &[&str], values: Vec<String>) -> Result<&mut Variable> {
        let shape = self.shape_of(dims)?;
        let array = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
            PointFlatError::invalid_config(format!("Invalid shape/data size for {}: {}", name, e))
        })?;
        self.insert(name, dims, &shape, DataType::String, ArrayData::Text(array))
    }

    /// Add a structure variable with the given member descriptors and rows.
    ///
    /// `rows` is row-major over `dims`; a multidimensional structure is read by flattened
    /// record number.
    pub fn add_structure(
        &mut self,
        name: &str,
        dims: &[&str],
        members: Vec<Variable>,
        rows: Vec<Row>,
    ) -> Result<&mut Variable> {
        let shape = self.shape_of(dims)?;
        let size: usize = shape.iter().product();
        if size != rows.len() {
            return Err(PointFlatError::invalid_config(format!(
                "Structure {} has {} rows but its shape {:?} holds {}",
                name,
                rows.len(),
                shape,
                size
            )));
        }
        let pairs: Vec<(&str, usize)> = dims.iter().copied().zip(shape.iter().copied()).collect();
        let var = Variable::new(name, DataType::Structure, &pairs).with_members(members);
        self.data.insert(name.to_string(), ArrayData::Rows(rows));
        Ok(self.push_variable(var))
    }

    fn shape_of(&self, dims: &[&str]) -> Result<Vec<usize>> {
        dims.iter()
            .map(|d| {
                self.dims
                    .iter()
                    .find(|x| x.name == *d)
                    .map(|x| x.len)
                    .ok_or_else(|| PointFlatError::missing_dimension(*d))
            })
            .collect()
    }

    fn insert(
        &mut self,
        name: &str,
        dims: &[&str],
        shape: &[usize],
        dtype: DataType,
        data: ArrayData,
    ) -> Result<&mut Variable> {
        let pairs: Vec<(&str, usize)> = dims.iter().copied().zip(shape.iter().copied()).collect();
        self.data.insert(name.to_string(), data);
        Ok(self.push_variable(Variable::new(name, dtype, &pairs)))
    }

    fn push_variable(&mut self, var: Variable) -> &mut Variable {
        self.vars.retain(|v| v.name != var.name);
        let idx = self.vars.len();
        self.vars.push(var);
        &mut self.vars[idx]
    }
}

impl Dataset for MemoryDataset {
    fn location(&self) -> &str {
        &self.location
    }

    fn attribute(&self, name: &str) -> Option<AttrValue> {
        self.attributes.get(name).cloned()
    }

    fn dimension(&self, name: &str) -> Option<Dimension> {
        self.dims.iter().find(|d| d.name == name).cloned()
    }

    fn dimensions(&self) -> Vec<Dimension> {
        self.dims.clone()
    }

    fn variable(&self, name: &str) -> Option<Variable> {
        self.vars.iter().find(|v| v.name == name).cloned()
    }

    fn variables(&self) -> Vec<Variable> {
        self.vars.clone()
    }

    fn read(&self, name: &str) -> Result<ArrayData> {
        self.data
            .get(name)
            .cloned()
            .ok_or_else(|| PointFlatError::missing_variable(name))
    }

    fn read_structure_row(&self, name: &str, recno: usize) -> Result<Row> {
        match self.data.get(name) {
            Some(ArrayData::Rows(rows)) => rows.get(recno).cloned().ok_or_else(|| {
                PointFlatError::RecordOutOfRange {
                    structure: name.to_string(),
                    recno,
                    len: rows.len(),
                }
            }),
            Some(_) => Err(PointFlatError::invalid_config(format!("{} is not a structure", name))),
            None => Err(PointFlatError::missing_variable(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_is_checked() {
        let mut ds = MemoryDataset::new("mem");
        ds.add_dimension("obs", 3);
        assert!(ds.add_numeric("t", &["obs"], DataType::Double, vec![1.0, 2.0]).is_err());
        assert!(ds.add_numeric("t", &["nope"], DataType::Double, vec![1.0]).is_err());
        ds.add_numeric("t", &["obs"], DataType::Double, vec![1.0, 2.0, 3.0])
            .unwrap()
            .set_attribute("units", "seconds since 1970-01-01");
        let v = ds.variable("t").unwrap();
        assert_eq!(v.shape, vec![3]);
        assert_eq!(v.units(), Some("seconds since 1970-01-01"));
        assert_eq!(ds.read("t").unwrap().len(), 3);
    }

    #[test]
    fn multidimensional_structure_is_read_by_flat_record() {
        use crate::data::{Member, Value};

        let mut ds = MemoryDataset::new("mem");
        ds.add_dimension("station", 2).add_dimension("time", 2);
        let row = |v: f64| Row::from_fields("obs", vec![(Member::new("t", DataType::Double), Value::Double(v))]);
        let members = vec![Variable::new("t", DataType::Double, &[])];
        assert!(ds
            .add_structure("obs", &["station", "time"], members.clone(), vec![row(0.0)])
            .is_err());
        ds.add_structure(
            "obs",
            &["station", "time"],
            members,
            vec![row(0.0), row(1.0), row(2.0), row(3.0)],
        )
        .unwrap();
        let v = ds.variable("obs").unwrap();
        assert_eq!(v.shape, vec![2, 2]);
        assert!(v.is_structure());
        assert_eq!(ds.read_structure_row("obs", 3).unwrap().scalar_f64("t"), Some(3.0));
        assert!(ds.read_structure_row("obs", 4).is_err());
    }
}
