//! Feature types and the collections that turn nested tables into features.

mod collection;
mod point;
mod types;

pub use collection::{
    FeatureCollection, FeatureIter, ProfileFeature, SectionFeature, StandardPointCollection,
    StandardProfileCollection, StandardSectionCollection, StandardStationCollection,
    StandardStationProfileCollection, StandardTrajectoryCollection, StationProfileFeature,
    StationTimeSeriesFeature, TrajectoryFeature,
};
pub use point::{FlattenedPointIter, PointFeature, StandardPointFeatureIterator};
pub use types::{EarthLocation, FeatureType, StationFeature};
