//! NetCDF-backed dataset.

use super::dataset::{AttrValue, Dataset, Dimension, Variable};
use super::value::{ArrayData, DataType};
use crate::error::{PointFlatError, Result};
use ndarray::{ArrayD, IxDyn};
use netcdf::types::{FloatType, IntType, NcVariableType};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// A dataset read from a NetCDF file (root group only).
pub struct NetcdfDataset {
    file: netcdf::File,
    location: String,
    attributes: BTreeMap<String, AttrValue>,
    dims: Vec<Dimension>,
    vars: Vec<Variable>,
}

impl fmt::Debug for NetcdfDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetcdfDataset")
            .field("location", &self.location)
            .field("dims", &self.dims.len())
            .field("vars", &self.vars.len())
            .finish()
    }
}

impl NetcdfDataset {
    /// Open a NetCDF file and read its metadata.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PointFlatError::file_open(
                path.to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ));
        }
        let file = netcdf::open(path)?;

        let mut attributes = BTreeMap::new();
        for attr in file.attributes() {
            if let Some(value) = Self::attr_value(&attr) {
                attributes.insert(attr.name().to_string(), value);
            }
        }

        let dims = file
            .dimensions()
            .map(|d| Dimension {
                name: d.name().to_string(),
                len: d.len(),
                unlimited: d.is_unlimited(),
            })
            .collect();

        let mut vars = Vec::new();
        for var in file.variables() {
            match Self::describe(&var) {
                Some(v) => vars.push(v),
                None => tracing::debug!("Skipping variable {} of type {:?}", var.name(), var.vartype()),
            }
        }

        tracing::debug!("Opened {} with {} variables", path.display(), vars.len());
        Ok(Self {
            file,
            location: path.display().to_string(),
            attributes,
            dims,
            vars,
        })
    }

    fn data_type(vartype: &NcVariableType) -> Option<DataType> {
        match vartype {
            NcVariableType::Int(IntType::I8) | NcVariableType::Int(IntType::U8) => Some(DataType::Byte),
            NcVariableType::Int(IntType::I16) | NcVariableType::Int(IntType::U16) => {
                Some(DataType::Short)
            },
            NcVariableType::Int(IntType::I32) | NcVariableType::Int(IntType::U32) => {
                Some(DataType::Int)
            },
            NcVariableType::Int(IntType::I64) | NcVariableType::Int(IntType::U64) => {
                Some(DataType::Long)
            },
            NcVariableType::Float(FloatType::F32) => Some(DataType::Float),
            NcVariableType::Float(FloatType::F64) => Some(DataType::Double),
            NcVariableType::Char => Some(DataType::Char),
            NcVariableType::String => Some(DataType::String),
            _ => None,
        }
    }

    fn describe(var: &netcdf::Variable<'_>) -> Option<Variable> {
        let dtype = Self::data_type(&var.vartype())?;
        let mut dims: Vec<(String, usize)> = var
            .dimensions()
            .iter()
            .map(|d: &netcdf::Dimension<'_>| (d.name().to_string(), d.len()))
            .collect();

        // char(..., strlen) is exposed as a string array without the strlen dimension
        if dtype == DataType::Char {
            dims.pop();
        }

        let pairs: Vec<(&str, usize)> = dims.iter().map(|(n, l)| (n.as_str(), *l)).collect();
        let mut v = Variable::new(var.name(), dtype, &pairs);
        for attr in var.attributes() {
            if let Some(value) = Self::attr_value(&attr) {
                v.set_attribute(attr.name(), value);
            }
        }
        Some(v)
    }

    fn attr_value(attr: &netcdf::Attribute<'_>) -> Option<AttrValue> {
        use netcdf::AttributeValue;

        let value = match attr.value() {
            Ok(AttributeValue::Uchar(v)) => AttrValue::Numbers(vec![v as f64]),
            Ok(AttributeValue::Schar(v)) => AttrValue::Numbers(vec![v as f64]),
            Ok(AttributeValue::Ushort(v)) => AttrValue::Numbers(vec![v as f64]),
            Ok(AttributeValue::Short(v)) => AttrValue::Numbers(vec![v as f64]),
            Ok(AttributeValue::Uint(v)) => AttrValue::Numbers(vec![v as f64]),
            Ok(AttributeValue::Int(v)) => AttrValue::Numbers(vec![v as f64]),
            Ok(AttributeValue::Ulonglong(v)) => AttrValue::Numbers(vec![v as f64]),
            Ok(AttributeValue::Longlong(v)) => AttrValue::Numbers(vec![v as f64]),
            Ok(AttributeValue::Float(v)) => AttrValue::Numbers(vec![v as f64]),
            Ok(AttributeValue::Double(v)) => AttrValue::Numbers(vec![v]),
            Ok(AttributeValue::Str(v)) => AttrValue::Text(v),
            Ok(AttributeValue::Uchars(v)) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
            Ok(AttributeValue::Schars(v)) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
            Ok(AttributeValue::Ushorts(v)) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
            Ok(AttributeValue::Shorts(v)) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
            Ok(AttributeValue::Uints(v)) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
            Ok(AttributeValue::Ints(v)) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
            Ok(AttributeValue::Ulonglongs(v)) => {
                AttrValue::Numbers(v.into_iter().map(|x| x as f64).collect())
            },
            Ok(AttributeValue::Longlongs(v)) => {
                AttrValue::Numbers(v.into_iter().map(|x| x as f64).collect())
            },
            Ok(AttributeValue::Floats(v)) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
            Ok(AttributeValue::Doubles(v)) => AttrValue::Numbers(v),
            Ok(AttributeValue::Strs(v)) => AttrValue::Text(v.join(", ")),
            Err(e) => {
                tracing::warn!("Unreadable attribute {}: {}", attr.name(), e);
                return None;
            },
        };
        Some(value)
    }

    fn read_numeric(var: &netcdf::Variable<'_>, shape: &[usize]) -> Result<ArrayD<f64>> {
        let from_vec = |v: Vec<f64>| -> Result<ArrayD<f64>> {
            ArrayD::from_shape_vec(IxDyn(shape), v)
                .map_err(|e| PointFlatError::NetCDF(format!("Invalid shape/data size: {}", e)))
        };

        let name = var.name();
        let fail = |e: netcdf::Error| PointFlatError::NetCDF(format!("Failed to read {}: {}", name, e));

        match var.vartype() {
            NcVariableType::Float(FloatType::F64) => from_vec(var.get_values::<f64, _>(..).map_err(fail)?),
            NcVariableType::Float(FloatType::F32) => {
                let values = var.get_values::<f32, _>(..).map_err(fail)?;
                from_vec(values.into_iter().map(f64::from).collect())
            },
            NcVariableType::Int(IntType::I64) => {
                let values = var.get_values::<i64, _>(..).map_err(fail)?;
                from_vec(values.into_iter().map(|x| x as f64).collect())
            },
            NcVariableType::Int(IntType::I32) => {
                let values = var.get_values::<i32, _>(..).map_err(fail)?;
                from_vec(values.into_iter().map(f64::from).collect())
            },
            NcVariableType::Int(IntType::I16) => {
                let values = var.get_values::<i16, _>(..).map_err(fail)?;
                from_vec(values.into_iter().map(f64::from).collect())
            },
            NcVariableType::Int(IntType::I8) => {
                let values = var.get_values::<i8, _>(..).map_err(fail)?;
                from_vec(values.into_iter().map(f64::from).collect())
            },
            NcVariableType::Int(IntType::U64) => {
                let values = var.get_values::<u64, _>(..).map_err(fail)?;
                from_vec(values.into_iter().map(|x| x as f64).collect())
            },
            NcVariableType::Int(IntType::U32) => {
                let values = var.get_values::<u32, _>(..).map_err(fail)?;
                from_vec(values.into_iter().map(f64::from).collect())
            },
            NcVariableType::Int(IntType::U16) => {
                let values = var.get_values::<u16, _>(..).map_err(fail)?;
                from_vec(values.into_iter().map(f64::from).collect())
            },
            NcVariableType::Int(IntType::U8) => {
                let values = var.get_values::<u8, _>(..).map_err(fail)?;
                from_vec(values.into_iter().map(f64::from).collect())
            },
            other => Err(PointFlatError::NetCDF(format!(
                "Unsupported variable type for {}: {:?}",
                name, other
            ))),
        }
    }

    fn read_chars(var: &netcdf::Variable<'_>, shape: &[usize]) -> Result<ArrayD<String>> {
        let strlen = var.dimensions().last().map(|d| d.len()).unwrap_or(1).max(1);
        let bytes = var.get_raw_values(..)?;
        let strings: Vec<String> = bytes
            .chunks(strlen)
            .map(|chunk| {
                let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                String::from_utf8_lossy(&chunk[..end]).trim_end().to_string()
            })
            .collect();
        ArrayD::from_shape_vec(IxDyn(shape), strings)
            .map_err(|e| PointFlatError::NetCDF(format!("Invalid shape/data size: {}", e)))
    }

    fn read_strings(var: &netcdf::Variable<'_>, shape: &[usize]) -> Result<ArrayD<String>> {
        let total: usize = shape.iter().product();
        let mut strings = Vec::with_capacity(total);
        let mut index = vec![0usize; shape.len()];
        for _ in 0..total {
            strings.push(var.get_string(index.as_slice())?);
            // advance the row-major index
            for axis in (0..shape.len()).rev() {
                index[axis] += 1;
                if index[axis] < shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        ArrayD::from_shape_vec(IxDyn(shape), strings)
            .map_err(|e| PointFlatError::NetCDF(format!("Invalid shape/data size: {}", e)))
    }
}

impl Dataset for NetcdfDataset {
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
        let desc = self
            .vars
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| PointFlatError::missing_variable(name))?;
        let var = self
            .file
            .variable(name)
            .ok_or_else(|| PointFlatError::missing_variable(name))?;

        tracing::debug!("Reading {} {:?}", name, desc.shape);
        match desc.dtype {
            DataType::Char => Ok(ArrayData::Text(Self::read_chars(&var, &desc.shape)?)),
            DataType::String => Ok(ArrayData::Text(Self::read_strings(&var, &desc.shape)?)),
            _ => Ok(ArrayData::Numeric(Self::read_numeric(&var, &desc.shape)?)),
        }
    }
}
