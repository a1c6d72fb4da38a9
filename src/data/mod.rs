//! Data access and representation.
//!
//! This module defines the storage boundary ([`Dataset`]) with NetCDF and in-memory
//! implementations, the row model, structures and row iterators.

mod axis;
mod dataset;
pub mod iter;
mod memory;
mod nc_file;
mod structure;
mod value;

pub use axis::{axis_type, coordinate_axes, find_axis, AxisType};
pub use dataset::{AttrValue, Dataset, Dimension, Variable};
pub use iter::{BoxRowIter, RowIterator};
pub use memory::MemoryDataset;
pub use nc_file::NetcdfDataset;
pub use structure::Structure;
pub use value::{ArrayData, DataType, Member, MissingValues, Row, StructureMembers, Value};
