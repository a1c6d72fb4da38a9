//! Declarative table configuration.
//!
//! A [`TableConfig`] tree describes how the tables of a point dataset are laid out on
//! disk and which variables play the coordinate roles. Convention detectors produce
//! these trees; [`crate::table::NestedTable`] turns a root-to-leaf path into tables.

use crate::data::{Dataset, Row, Structure};
use crate::error::{PointFlatError, Result};
use crate::feature::FeatureType;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Coordinate roles a variable can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoordName {
    /// Latitude.
    Lat,
    /// Longitude.
    Lon,
    /// Elevation or depth of the observation.
    Elev,
    /// Observation time.
    Time,
    /// Nominal time.
    TimeNominal,
    /// Station identifier.
    StnId,
    /// Station description.
    StnDesc,
    /// WMO station identifier.
    WmoId,
    /// Station altitude.
    StnAlt,
    /// Number of observations of a station.
    StnNpts,
    /// Feature (trajectory, profile, ...) identifier.
    FeatureId,
    /// Flag variable marking missing observations.
    MissingVar,
    /// Scalar giving the number of valid rows of the station table.
    Limit,
}

impl CoordName {
    /// Every role, in declaration order.
    pub const ALL: [CoordName; 13] = [
        Self::Lat,
        Self::Lon,
        Self::Elev,
        Self::Time,
        Self::TimeNominal,
        Self::StnId,
        Self::StnDesc,
        Self::WmoId,
        Self::StnAlt,
        Self::StnNpts,
        Self::FeatureId,
        Self::MissingVar,
        Self::Limit,
    ];

    /// Name as written in persisted configurations.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lat => "Lat",
            Self::Lon => "Lon",
            Self::Elev => "Elev",
            Self::Time => "Time",
            Self::TimeNominal => "TimeNominal",
            Self::StnId => "StnId",
            Self::StnDesc => "StnDesc",
            Self::WmoId => "WmoId",
            Self::StnAlt => "StnAlt",
            Self::StnNpts => "StnNpts",
            Self::FeatureId => "FeatureId",
            Self::MissingVar => "MissingVar",
            Self::Limit => "Limit",
        }
    }

    /// Roles that describe table structure rather than data.
    pub fn is_structural(self) -> bool {
        matches!(self, Self::StnNpts | Self::Limit)
    }
}

impl fmt::Display for CoordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoordName {
    type Err = PointFlatError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PointFlatError::invalid_config(format!("Unknown coordinate role '{}'", s)))
    }
}

/// How the rows of a structure are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureKind {
    /// A true structure variable.
    Structure,
    /// All variables whose outer dimension is `dim`.
    Pseudo {
        /// Row dimension.
        dim: String,
    },
    /// All `(outer, dim)` variables, flattened row-major.
    Pseudo2D {
        /// Inner row dimension.
        dim: String,
        /// Outer dimension.
        outer: String,
    },
}

/// A structure or pseudo-structure to read rows from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureSpec {
    /// Structure name (the variable name for true structures).
    pub name: String,
    /// Storage kind.
    pub kind: StructureKind,
    /// Restrict to these members.
    pub vars: Option<Vec<String>>,
}

impl StructureSpec {
    /// A structure variable.
    pub fn structure(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StructureKind::Structure,
            vars: None,
        }
    }

    /// A pseudo-structure over `dim`.
    pub fn pseudo(name: impl Into<String>, dim: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StructureKind::Pseudo { dim: dim.into() },
            vars: None,
        }
    }

    /// A pseudo-structure over `(outer, dim)`.
    pub fn pseudo_2d(name: impl Into<String>, dim: impl Into<String>, outer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StructureKind::Pseudo2D {
                dim: dim.into(),
                outer: outer.into(),
            },
            vars: None,
        }
    }

    /// Restrict to the given members.
    pub fn with_vars(mut self, vars: Vec<String>) -> Self {
        self.vars = Some(vars);
        self
    }

    /// Open the structure.
    pub fn open(&self, ds: &Rc<dyn Dataset>) -> Result<Structure> {
        let vars = self.vars.as_deref();
        match &self.kind {
            StructureKind::Structure => {
                let s = Structure::open(ds, &self.name)?;
                Ok(match vars {
                    Some(v) => s.select(v),
                    None => s,
                })
            },
            StructureKind::Pseudo { dim } => Structure::pseudo(ds, &self.name, dim, vars),
            StructureKind::Pseudo2D { dim, outer } => Structure::pseudo_2d(ds, &self.name, dim, outer, vars),
        }
    }
}

/// Physical encoding of a table and of its link to the parent table.
#[derive(Debug, Clone)]
pub enum Layout {
    /// A structure read sequentially.
    Structure {
        /// Rows.
        structure: StructureSpec,
    },
    /// Rows supplied by the caller.
    ArrayStructure {
        /// Rows.
        rows: Rc<[Row]>,
    },
    /// Parent rows built from the distinct ids of a [`Layout::ParentId`] child.
    Construct,
    /// Children stored contiguously. With `start`, both start and count are members of the
    /// parent row; without, `num_records` is a variable over the parent dimension.
    Contiguous {
        /// Child rows.
        structure: StructureSpec,
        /// Parent member holding the first child record.
        start: Option<String>,
        /// Parent member or variable holding the number of children.
        num_records: String,
    },
    /// Children chained through a next pointer.
    LinkedList {
        /// Child rows.
        structure: StructureSpec,
        /// Parent member holding the first child record.
        start: String,
        /// Child member holding the next child record; negative ends the chain.
        next: String,
    },
    /// Each child carries the record number of its parent.
    ParentIndex {
        /// Child rows.
        structure: StructureSpec,
        /// Variable holding the parent record number of each child.
        parent_index: String,
    },
    /// Each child carries an identifier of its parent.
    ParentId {
        /// Child rows.
        structure: StructureSpec,
        /// Variable holding the parent identifier of each child.
        parent_id: String,
    },
    /// Inner dimension of `(outer, inner)` variables read with the parent row.
    MultidimInner {
        /// Parent dimension.
        outer: String,
        /// Child dimension.
        inner: String,
        /// Restrict to these variables.
        vars: Option<Vec<String>>,
    },
    /// Inner dimension of `(outer, middle, inner)` variables read with the root row.
    MultidimInner3D {
        /// Root dimension.
        outer: String,
        /// Parent dimension.
        middle: String,
        /// Child dimension.
        inner: String,
        /// Restrict to these variables.
        vars: Option<Vec<String>>,
    },
    /// Inner dimension of `(outer, inner)` variables, read per parent record.
    MultidimInnerPseudo {
        /// Parent dimension.
        outer: String,
        /// Child dimension.
        inner: String,
        /// Restrict to these variables.
        vars: Option<Vec<String>>,
    },
    /// Inner dimension of `(outer, middle, inner)` variables, read per middle record.
    MultidimInnerPseudo3D {
        /// Root dimension.
        outer: String,
        /// Parent dimension.
        middle: String,
        /// Child dimension.
        inner: String,
        /// Restrict to these variables.
        vars: Option<Vec<String>>,
    },
    /// A multidimensional structure variable; children are the records of one outer index.
    MultidimStructure {
        /// Structure variable name.
        structure: String,
    },
    /// Children are a nested structure member of the parent row.
    NestedStructure {
        /// Structure variable holding the parent rows.
        structure: String,
        /// Nested member name.
        member: String,
    },
    /// A single given row.
    Singleton {
        /// The row.
        row: Row,
    },
    /// A single empty row; coordinates resolve to dataset scalars or constants.
    Top,
}

impl Layout {
    /// Short kind name.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Structure { .. } => "Structure",
            Self::ArrayStructure { .. } => "ArrayStructure",
            Self::Construct => "Construct",
            Self::Contiguous { .. } => "Contiguous",
            Self::LinkedList { .. } => "LinkedList",
            Self::ParentIndex { .. } => "ParentIndex",
            Self::ParentId { .. } => "ParentId",
            Self::MultidimInner { .. } => "MultidimInner",
            Self::MultidimInner3D { .. } => "MultidimInner3D",
            Self::MultidimInnerPseudo { .. } => "MultidimInnerPseudo",
            Self::MultidimInnerPseudo3D { .. } => "MultidimInnerPseudo3D",
            Self::MultidimStructure { .. } => "MultidimStructure",
            Self::NestedStructure { .. } => "NestedStructure",
            Self::Singleton { .. } => "Singleton",
            Self::Top => "Top",
        }
    }
}

/// How an extra-join array variable is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinArrayKind {
    /// By the record number of the current level.
    Raw,
    /// By the record number modulo `n`.
    Modulo(usize),
    /// By the record number divided by `n`.
    Divide(usize),
    /// By the record number of the given level.
    Level(usize),
    /// Always element 0.
    Scalar,
}

/// Extra data joined into the rows of a table.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinConfig {
    /// One value of an array variable.
    Array {
        /// Variable name.
        var: String,
        /// Indexing rule.
        kind: JoinArrayKind,
    },
    /// One record of a `(outer, inner)` structure variable, at
    /// `recnum[parent] * dim_len + recnum[current]`.
    MultidimStructure {
        /// Structure variable name.
        structure: String,
        /// Length of the inner dimension.
        dim_len: usize,
    },
    /// The record of another table whose number is stored in the current row.
    ParentIndex {
        /// Table to read from.
        structure: StructureSpec,
        /// Member of the current row holding the record number.
        parent_index: String,
    },
}

impl fmt::Display for JoinConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array { var, kind } => write!(f, "JoinArray({}, {:?})", var, kind),
            Self::MultidimStructure { structure, dim_len } => {
                write!(f, "JoinMultidimStructure({}, {})", structure, dim_len)
            },
            Self::ParentIndex {
                structure,
                parent_index,
            } => write!(f, "JoinParentIndex({}, {})", structure.name, parent_index),
        }
    }
}

/// One node of a table configuration tree.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Table name.
    pub name: String,
    /// Declared feature type, if this table defines one.
    pub feature_type: Option<FeatureType>,
    /// Physical encoding.
    pub layout: Layout,
    /// Coordinate role bindings.
    pub coords: BTreeMap<CoordName, String>,
    /// Extra joins.
    pub extra_joins: Vec<JoinConfig>,
    /// Child tables.
    pub children: Vec<TableConfig>,
}

impl TableConfig {
    /// Create a table config.
    pub fn new(name: impl Into<String>, layout: Layout) -> Self {
        Self {
            name: name.into(),
            feature_type: None,
            layout,
            coords: BTreeMap::new(),
            extra_joins: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Declare the feature type.
    pub fn with_feature_type(mut self, ft: FeatureType) -> Self {
        self.feature_type = Some(ft);
        self
    }

    /// Bind a coordinate role.
    pub fn with_coord(mut self, role: CoordName, name: impl Into<String>) -> Self {
        self.coords.insert(role, name.into());
        self
    }

    /// Bind a coordinate role if a name is given.
    pub fn with_coord_opt(self, role: CoordName, name: Option<impl Into<String>>) -> Self {
        match name {
            Some(n) => self.with_coord(role, n),
            None => self,
        }
    }

    /// Add an extra join.
    pub fn with_join(mut self, join: JoinConfig) -> Self {
        self.extra_joins.push(join);
        self
    }

    /// Add a child table.
    pub fn with_child(mut self, child: TableConfig) -> Self {
        self.children.push(child);
        self
    }

    /// Variable bound to a role.
    pub fn coord(&self, role: CoordName) -> Option<&str> {
        self.coords.get(&role).map(String::as_str)
    }

    /// Check if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Every root-to-leaf path of the tree.
    pub fn leaf_paths(&self) -> Vec<Vec<&TableConfig>> {
        if self.children.is_empty() {
            return vec![vec![self]];
        }
        self.children
            .iter()
            .flat_map(|c| c.leaf_paths())
            .map(|mut path| {
                path.insert(0, self);
                path
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_paths_walk_every_branch() {
        let tree = TableConfig::new("station", Layout::Top)
            .with_child(TableConfig::new("obs", Layout::Construct))
            .with_child(
                TableConfig::new("profile", Layout::Construct).with_child(TableConfig::new("level", Layout::Top)),
            );
        let names: Vec<Vec<&str>> = tree
            .leaf_paths()
            .into_iter()
            .map(|p| p.into_iter().map(|t| t.name.as_str()).collect())
            .collect();
        assert_eq!(names, vec![vec!["station", "obs"], vec!["station", "profile", "level"]]);
    }

    #[test]
    fn coord_names_round_trip_through_text() {
        for c in CoordName::ALL {
            assert_eq!(c.as_str().parse::<CoordName>().unwrap(), c);
        }
        assert!("Bogus".parse::<CoordName>().is_err());
    }
}
