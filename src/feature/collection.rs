//! Feature collections over a [`NestedTable`].
//!
//! Each collection iterates the rows of one level, snapshots the cursor for every feature
//! it produces, and lets the feature open the level below on demand.

use super::point::{FlattenedPointIter, StandardPointFeatureIterator};
use super::types::{EarthLocation, FeatureType, StationFeature};
use crate::data::BoxRowIter;
use crate::error::{PointFlatError, Result};
use crate::table::{Cursor, NestedTable};
use std::any::Any;
use std::fmt;
use std::rc::Rc;

fn check_levels(nt: &NestedTable, wanted: usize, kind: &str) -> Result<()> {
    if nt.number_of_levels() != wanted {
        return Err(PointFlatError::invalid_config(format!(
            "{} collection needs {} levels, {} has {}",
            kind,
            wanted,
            nt.name(),
            nt.number_of_levels()
        )));
    }
    Ok(())
}

/// Snapshot of `cursor` whose back-reference is `owner`.
///
/// Stations set their [`StationFeature`], sections their name. Every cursor copied from the
/// snapshot, down to the point features, carries it.
fn owned_by(cursor: &Cursor, owner: Rc<dyn Any>) -> Cursor {
    let mut cursor = cursor.copy();
    cursor.set_what(owner);
    cursor
}

/// Check if the cursor is on a root row whose feature id is missing.
///
/// The feature id belongs to the root, so rows of lower levels never count as missing.
fn is_root_feature_missing(nt: &NestedTable, cursor: &Cursor) -> bool {
    let level = cursor.current_index();
    level + 1 == nt.number_of_levels() && cursor.row(level).map(|r| nt.is_feature_missing(r)).unwrap_or(false)
}

/// Features built from the rows of one level.
///
/// `make` returns `None` for rows that do not form a feature (e.g. stations without a location).
pub struct FeatureIter<F> {
    nt: Rc<NestedTable>,
    rows: BoxRowIter,
    cursor: Cursor,
    level: usize,
    make: fn(&Rc<NestedTable>, &Cursor) -> Option<F>,
}

impl<F> fmt::Debug for FeatureIter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureIter")
            .field("table", &self.nt.name())
            .field("level", &self.level)
            .finish()
    }
}

impl<F> FeatureIter<F> {
    fn new(
        nt: Rc<NestedTable>,
        rows: BoxRowIter,
        cursor: Cursor,
        level: usize,
        make: fn(&Rc<NestedTable>, &Cursor) -> Option<F>,
    ) -> Self {
        Self {
            nt,
            rows,
            cursor,
            level,
            make,
        }
    }
}

impl<F> Iterator for FeatureIter<F> {
    type Item = Result<F>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            let recno = self.rows.current_recno().unwrap_or(0);
            self.cursor.set_current_index(self.level);
            self.cursor.set_row(self.level, row, recno);
            if let Err(e) = self.nt.add_parent_join(&mut self.cursor) {
                return Some(Err(e));
            }
            if let Some(feature) = (self.make)(&self.nt, &self.cursor) {
                return Some(Ok(feature));
            }
        }
    }
}

/// Unconnected observations. Every level of the table is flattened.
#[derive(Debug)]
pub struct StandardPointCollection {
    nt: Rc<NestedTable>,
}

impl StandardPointCollection {
    /// Wrap a nested table of any depth.
    pub fn new(nt: Rc<NestedTable>) -> Self {
        Self { nt }
    }

    /// All observations, visiting at most `limit` root rows.
    pub fn points(&self, limit: Option<usize>) -> Result<FlattenedPointIter> {
        FlattenedPointIter::new(Rc::clone(&self.nt), limit)
    }
}

/// Time series of observations at fixed stations.
#[derive(Debug)]
pub struct StandardStationCollection {
    nt: Rc<NestedTable>,
}

impl StandardStationCollection {
    /// Wrap a two-level nested table.
    pub fn new(nt: Rc<NestedTable>) -> Result<Self> {
        check_levels(&nt, 2, "Station")?;
        Ok(Self { nt })
    }

    /// Stations, honoring a `Limit` coordinate. Rows without an id or location are skipped.
    pub fn stations(&self, limit: Option<usize>) -> Result<FeatureIter<StationTimeSeriesFeature>> {
        let rows = self.nt.station_data_iter(limit)?;
        Ok(FeatureIter::new(
            Rc::clone(&self.nt),
            rows,
            Cursor::new(2),
            1,
            StationTimeSeriesFeature::make,
        ))
    }
}

/// One station and its time series.
#[derive(Debug)]
pub struct StationTimeSeriesFeature {
    nt: Rc<NestedTable>,
    cursor: Cursor,
    station: StationFeature,
}

impl StationTimeSeriesFeature {
    fn make(nt: &Rc<NestedTable>, cursor: &Cursor) -> Option<Self> {
        let level = cursor.current_index();
        let row = cursor.row(level)?;
        let station = nt.make_station(row, cursor.recnum(level));
        if station.is_none() {
            tracing::debug!("Skipping station row {} without id or location", cursor.recnum(level));
        }
        let station = station?;
        Some(Self {
            nt: Rc::clone(nt),
            cursor: owned_by(cursor, Rc::new(station.clone())),
            station,
        })
    }

    /// The station.
    pub fn station(&self) -> &StationFeature {
        &self.station
    }

    /// Observations of this station.
    pub fn points(&self) -> Result<StandardPointFeatureIterator> {
        StandardPointFeatureIterator::new(Rc::clone(&self.nt), self.cursor.copy(), None)
    }
}

/// Vertical profiles, or profiles within a station or section.
#[derive(Debug)]
pub struct ProfileFeature {
    nt: Rc<NestedTable>,
    cursor: Cursor,
    name: String,
    location: EarthLocation,
    time: f64,
}

impl ProfileFeature {
    fn make(nt: &Rc<NestedTable>, cursor: &Cursor) -> Option<Self> {
        if is_root_feature_missing(nt, cursor) {
            return None;
        }
        let time = nt.obs_time(cursor);
        let nom = nt.nom_time(cursor);
        Some(Self {
            nt: Rc::clone(nt),
            name: nt.feature_name(cursor),
            location: nt.earth_location(cursor),
            time: if nom.is_nan() { time } else { nom },
            cursor: cursor.copy(),
        })
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the profile, as known at the profile level.
    pub fn location(&self) -> EarthLocation {
        self.location
    }

    /// Time of the profile, NaN if it has none at this level.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Observations of this profile.
    pub fn points(&self) -> Result<StandardPointFeatureIterator> {
        StandardPointFeatureIterator::new(Rc::clone(&self.nt), self.cursor.copy(), None)
    }
}

/// Vertical profiles at unconnected locations.
#[derive(Debug)]
pub struct StandardProfileCollection {
    nt: Rc<NestedTable>,
}

impl StandardProfileCollection {
    /// Wrap a two-level nested table.
    pub fn new(nt: Rc<NestedTable>) -> Result<Self> {
        check_levels(&nt, 2, "Profile")?;
        Ok(Self { nt })
    }

    /// The profiles.
    pub fn profiles(&self, limit: Option<usize>) -> Result<FeatureIter<ProfileFeature>> {
        let rows = self.nt.root_feature_iter(limit)?;
        Ok(FeatureIter::new(Rc::clone(&self.nt), rows, Cursor::new(2), 1, ProfileFeature::make))
    }
}

/// Observations along a path.
#[derive(Debug)]
pub struct TrajectoryFeature {
    nt: Rc<NestedTable>,
    cursor: Cursor,
    name: String,
}

impl TrajectoryFeature {
    fn make(nt: &Rc<NestedTable>, cursor: &Cursor) -> Option<Self> {
        if is_root_feature_missing(nt, cursor) {
            return None;
        }
        Some(Self {
            nt: Rc::clone(nt),
            name: nt.feature_name(cursor),
            cursor: cursor.copy(),
        })
    }

    /// Trajectory name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Observations along this trajectory.
    pub fn points(&self) -> Result<StandardPointFeatureIterator> {
        StandardPointFeatureIterator::new(Rc::clone(&self.nt), self.cursor.copy(), None)
    }
}

/// Trajectories.
#[derive(Debug)]
pub struct StandardTrajectoryCollection {
    nt: Rc<NestedTable>,
}

impl StandardTrajectoryCollection {
    /// Wrap a two-level nested table.
    pub fn new(nt: Rc<NestedTable>) -> Result<Self> {
        check_levels(&nt, 2, "Trajectory")?;
        Ok(Self { nt })
    }

    /// The trajectories.
    pub fn trajectories(&self, limit: Option<usize>) -> Result<FeatureIter<TrajectoryFeature>> {
        let rows = self.nt.root_feature_iter(limit)?;
        Ok(FeatureIter::new(
            Rc::clone(&self.nt),
            rows,
            Cursor::new(2),
            1,
            TrajectoryFeature::make,
        ))
    }
}

/// A station and its profiles over time.
#[derive(Debug)]
pub struct StationProfileFeature {
    nt: Rc<NestedTable>,
    cursor: Cursor,
    station: StationFeature,
}

impl StationProfileFeature {
    fn make(nt: &Rc<NestedTable>, cursor: &Cursor) -> Option<Self> {
        let level = cursor.current_index();
        let station = nt.make_station(cursor.row(level)?, cursor.recnum(level))?;
        Some(Self {
            nt: Rc::clone(nt),
            cursor: owned_by(cursor, Rc::new(station.clone())),
            station,
        })
    }

    /// The station.
    pub fn station(&self) -> &StationFeature {
        &self.station
    }

    /// Profiles of this station.
    pub fn profiles(&self) -> Result<FeatureIter<ProfileFeature>> {
        middle_profiles(&self.nt, &self.cursor)
    }
}

/// Time series of profiles at fixed stations.
#[derive(Debug)]
pub struct StandardStationProfileCollection {
    nt: Rc<NestedTable>,
}

impl StandardStationProfileCollection {
    /// Wrap a three-level nested table.
    pub fn new(nt: Rc<NestedTable>) -> Result<Self> {
        check_levels(&nt, 3, "StationProfile")?;
        Ok(Self { nt })
    }

    /// Stations, honoring a `Limit` coordinate.
    pub fn stations(&self, limit: Option<usize>) -> Result<FeatureIter<StationProfileFeature>> {
        let rows = self.nt.station_data_iter(limit)?;
        Ok(FeatureIter::new(
            Rc::clone(&self.nt),
            rows,
            Cursor::new(3),
            2,
            StationProfileFeature::make,
        ))
    }
}

/// Profiles along a path.
#[derive(Debug)]
pub struct SectionFeature {
    nt: Rc<NestedTable>,
    cursor: Cursor,
    name: String,
}

impl SectionFeature {
    fn make(nt: &Rc<NestedTable>, cursor: &Cursor) -> Option<Self> {
        if is_root_feature_missing(nt, cursor) {
            return None;
        }
        let name = nt.feature_name(cursor);
        Some(Self {
            nt: Rc::clone(nt),
            cursor: owned_by(cursor, Rc::new(name.clone())),
            name,
        })
    }

    /// Section name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Profiles of this section.
    pub fn profiles(&self) -> Result<FeatureIter<ProfileFeature>> {
        middle_profiles(&self.nt, &self.cursor)
    }
}

/// Sections.
#[derive(Debug)]
pub struct StandardSectionCollection {
    nt: Rc<NestedTable>,
}

impl StandardSectionCollection {
    /// Wrap a three-level nested table.
    pub fn new(nt: Rc<NestedTable>) -> Result<Self> {
        check_levels(&nt, 3, "Section")?;
        Ok(Self { nt })
    }

    /// The sections.
    pub fn sections(&self, limit: Option<usize>) -> Result<FeatureIter<SectionFeature>> {
        let rows = self.nt.root_feature_iter(limit)?;
        Ok(FeatureIter::new(Rc::clone(&self.nt), rows, Cursor::new(3), 2, SectionFeature::make))
    }
}

fn middle_profiles(nt: &Rc<NestedTable>, cursor: &Cursor) -> Result<FeatureIter<ProfileFeature>> {
    let mut cursor = cursor.copy();
    let rows = nt.middle_feature_iter(&mut cursor)?;
    Ok(FeatureIter::new(Rc::clone(nt), rows, cursor, 1, ProfileFeature::make))
}

/// The collection matching a nested table's feature type.
#[derive(Debug)]
pub enum FeatureCollection {
    /// Points.
    Point(StandardPointCollection),
    /// Station time series.
    Station(StandardStationCollection),
    /// Profiles.
    Profile(StandardProfileCollection),
    /// Trajectories.
    Trajectory(StandardTrajectoryCollection),
    /// Station profiles.
    StationProfile(StandardStationProfileCollection),
    /// Sections.
    Section(StandardSectionCollection),
}

impl FeatureCollection {
    /// Wrap a nested table in the collection for its feature type.
    pub fn new(nt: Rc<NestedTable>) -> Result<Self> {
        Ok(match nt.feature_type() {
            FeatureType::Point => Self::Point(StandardPointCollection::new(nt)),
            FeatureType::Station => Self::Station(StandardStationCollection::new(nt)?),
            FeatureType::Profile => Self::Profile(StandardProfileCollection::new(nt)?),
            FeatureType::Trajectory => Self::Trajectory(StandardTrajectoryCollection::new(nt)?),
            FeatureType::StationProfile => Self::StationProfile(StandardStationProfileCollection::new(nt)?),
            FeatureType::Section => Self::Section(StandardSectionCollection::new(nt)?),
        })
    }

    /// Feature type of the collection.
    pub fn feature_type(&self) -> FeatureType {
        match self {
            Self::Point(_) => FeatureType::Point,
            Self::Station(_) => FeatureType::Station,
            Self::Profile(_) => FeatureType::Profile,
            Self::Trajectory(_) => FeatureType::Trajectory,
            Self::StationProfile(_) => FeatureType::StationProfile,
            Self::Section(_) => FeatureType::Section,
        }
    }

    fn nested(&self) -> &Rc<NestedTable> {
        match self {
            Self::Point(c) => &c.nt,
            Self::Station(c) => &c.nt,
            Self::Profile(c) => &c.nt,
            Self::Trajectory(c) => &c.nt,
            Self::StationProfile(c) => &c.nt,
            Self::Section(c) => &c.nt,
        }
    }

    /// Every observation of the collection, visiting at most `limit` root rows.
    pub fn flatten(&self, limit: Option<usize>) -> Result<FlattenedPointIter> {
        FlattenedPointIter::new(Rc::clone(self.nested()), limit)
    }
}
