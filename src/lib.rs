//! Pointflat - flattens netCDF point observation datasets into nested row iteration.
//!
//! Point, station, profile and trajectory files encode "these observations belong to
//! that station" in many physical ways: contiguous slices, linked lists, parent indexes,
//! parent ids, multidimensional arrays, nested structures. Pointflat hides all of them
//! behind one iteration contract.
//!
//! # Features
//!
//! - Table variants for every common parent/child encoding
//! - Cursor-based nested iteration with cheap snapshots
//! - Convention registry with a CF discrete sampling geometry detector
//! - Default heuristics for files without a known convention
//! - Station, profile, trajectory and section feature collections
//!
//! # Example
//!
//! ```ignore
//! use pointflat::{AnalyzerConfig, ConventionRegistry, FeatureCollection, NetcdfDataset, TableAnalyzer};
//! use std::path::Path;
//! use std::rc::Rc;
//!
//! let ds = Rc::new(NetcdfDataset::open(Path::new("stations.nc"))?);
//! let registry = ConventionRegistry::with_builtins();
//! let analyzer = TableAnalyzer::factory(ds, &registry, &AnalyzerConfig::default())?;
//!
//! for nt in analyzer.nested_tables() {
//!     let collection = FeatureCollection::new(Rc::clone(nt))?;
//!     for point in collection.flatten(Some(10))? {
//!         println!("{}", point?);
//!     }
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
#![deny(unsafe_code)]

pub mod conventions;
pub mod data;
pub mod error;
pub mod feature;
pub mod table;
pub mod time;

pub use conventions::{ConventionRegistry, TableConfigurer};
pub use data::{Dataset, MemoryDataset, NetcdfDataset};
pub use error::{PointFlatError, Result};
pub use feature::{FeatureCollection, FeatureType, PointFeature};
pub use table::{AnalyzerConfig, Cursor, NestedTable, TableAnalyzer, TableConfig};
