//! Point features and the iterators that produce them.

use super::types::EarthLocation;
use crate::data::{BoxRowIter, Row};
use crate::error::Result;
use crate::table::{Cursor, NestedTable};
use crate::time::TimeUnit;
use chrono::{DateTime, Utc};
use std::fmt;
use std::rc::Rc;

/// One observation, with the cursor snapshot it was read from.
#[derive(Debug)]
pub struct PointFeature {
    cursor: Cursor,
    location: EarthLocation,
    obs_time: f64,
    nom_time: f64,
    time_unit: Option<Rc<TimeUnit>>,
    data: Row,
}

impl PointFeature {
    /// Build a feature from a cursor positioned on a leaf row. The cursor is kept as is.
    pub fn new(nt: &NestedTable, cursor: Cursor, time_unit: Option<Rc<TimeUnit>>) -> Self {
        let nom_time = nt.nom_time(&cursor);
        let obs_time = nt.obs_time(&cursor);
        Self {
            location: nt.earth_location(&cursor),
            obs_time,
            // no nominal time means the observation time is nominal
            nom_time: if nom_time.is_nan() { obs_time } else { nom_time },
            time_unit,
            data: nt.make_obs_row(&cursor),
            cursor,
        }
    }

    /// Location of the observation.
    pub fn location(&self) -> EarthLocation {
        self.location
    }

    /// Observation time, in [`PointFeature::time_unit`].
    pub fn obs_time(&self) -> f64 {
        self.obs_time
    }

    /// Nominal time, in [`PointFeature::time_unit`].
    pub fn nominal_time(&self) -> f64 {
        self.nom_time
    }

    /// Unit of the times, if it could be parsed.
    pub fn time_unit(&self) -> Option<&TimeUnit> {
        self.time_unit.as_deref()
    }

    /// Observation time as a calendar date.
    pub fn obs_date(&self) -> Option<DateTime<Utc>> {
        self.time_unit.as_ref().and_then(|u| u.to_date(self.obs_time))
    }

    /// All levels of the observation merged into one row, leaf fields first.
    pub fn data(&self) -> &Row {
        &self.data
    }

    /// The cursor snapshot.
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }
}

impl fmt::Display for PointFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.obs_date() {
            Some(date) => write!(f, "{} {}", date.format("%Y-%m-%dT%H:%M:%SZ"), self.location)?,
            None => write!(f, "{} {}", self.obs_time, self.location)?,
        }
        for (m, v) in self.data.iter() {
            write!(f, " {}={}", m.name, v)?;
        }
        Ok(())
    }
}

/// Point features of the leaf rows under one parent context.
///
/// Rows flagged missing are skipped. Each feature gets its own cursor snapshot.
pub struct StandardPointFeatureIterator {
    nt: Rc<NestedTable>,
    rows: BoxRowIter,
    cursor: Cursor,
    time_unit: Option<Rc<TimeUnit>>,
}

impl fmt::Debug for StandardPointFeatureIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardPointFeatureIterator")
            .field("table", &self.nt.name())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl StandardPointFeatureIterator {
    /// Iterate the leaf rows of the context in `cursor`. For a single-level table the
    /// cursor is empty and every row is iterated.
    pub fn new(nt: Rc<NestedTable>, mut cursor: Cursor, limit: Option<usize>) -> Result<Self> {
        let rows = if nt.number_of_levels() == 1 {
            nt.obs_data_iter(limit)?
        } else {
            nt.leaf_feature_iter(&mut cursor)?
        };
        let time_unit = time_unit_of(&nt);
        Ok(Self {
            nt,
            rows,
            cursor,
            time_unit,
        })
    }
}

impl Iterator for StandardPointFeatureIterator {
    type Item = Result<PointFeature>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            let recno = self.rows.current_recno().unwrap_or(0);
            self.cursor.set_current_index(0);
            self.cursor.set_row(0, row, recno);
            if let Err(e) = self.nt.add_parent_join(&mut self.cursor) {
                return Some(Err(e));
            }
            if self.nt.is_missing(&self.cursor) {
                continue;
            }
            return Some(Ok(PointFeature::new(&self.nt, self.cursor.copy(), self.time_unit.clone())));
        }
    }
}

/// Every leaf row of a nested table, depth first, as point features.
pub struct FlattenedPointIter {
    nt: Rc<NestedTable>,
    cursor: Cursor,
    /// Row iterators from the root down; the last one is the deepest open level.
    stack: Vec<BoxRowIter>,
    time_unit: Option<Rc<TimeUnit>>,
}

impl fmt::Debug for FlattenedPointIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlattenedPointIter")
            .field("table", &self.nt.name())
            .field("depth", &self.stack.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl FlattenedPointIter {
    /// Flatten `nt`, visiting at most `limit` root rows.
    pub fn new(nt: Rc<NestedTable>, limit: Option<usize>) -> Result<Self> {
        let root = nt.root_feature_iter(limit)?;
        let cursor = Cursor::new(nt.number_of_levels());
        let time_unit = time_unit_of(&nt);
        Ok(Self {
            nt,
            cursor,
            stack: vec![root],
            time_unit,
        })
    }
}

impl Iterator for FlattenedPointIter {
    type Item = Result<PointFeature>;

    fn next(&mut self) -> Option<Self::Item> {
        let nlevels = self.nt.number_of_levels();
        loop {
            let level = nlevels.checked_sub(self.stack.len())?;
            let iter = self.stack.last_mut()?;
            let row = match iter.next() {
                None => {
                    self.stack.pop();
                    continue;
                },
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(row)) => row,
            };
            let recno = iter.current_recno().unwrap_or(0);
            self.cursor.set_current_index(level);
            self.cursor.set_row(level, row, recno);
            if let Err(e) = self.nt.add_parent_join(&mut self.cursor) {
                return Some(Err(e));
            }

            if level == 0 {
                if self.nt.is_missing(&self.cursor) {
                    continue;
                }
                return Some(Ok(PointFeature::new(&self.nt, self.cursor.copy(), self.time_unit.clone())));
            }
            match self.nt.level_data_iter(&mut self.cursor, level - 1) {
                Ok(children) => self.stack.push(children),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn time_unit_of(nt: &NestedTable) -> Option<Rc<TimeUnit>> {
    match nt.time_unit() {
        Ok(unit) => Some(Rc::new(unit)),
        Err(e) => {
            tracing::debug!("No time unit for {}: {}", nt.name(), e);
            None
        },
    }
}
