//! Feature collections for each feature type.

use pointflat::data::DataType;
use pointflat::feature::StationFeature;
use pointflat::table::{CoordName, Layout, StructureSpec};
use pointflat::{
    AnalyzerConfig, ConventionRegistry, Dataset, FeatureCollection, FeatureType, MemoryDataset, NestedTable,
    TableAnalyzer, TableConfig,
};
use std::rc::Rc;

fn nested(ds: MemoryDataset, path: &[&TableConfig]) -> Rc<NestedTable> {
    let ds: Rc<dyn Dataset> = Rc::new(ds);
    let mut errlog = String::new();
    Rc::new(NestedTable::new(&ds, path, &mut errlog).unwrap())
}

fn flattened_temps(nt: &Rc<NestedTable>, limit: Option<usize>) -> Vec<f64> {
    FeatureCollection::new(Rc::clone(nt))
        .unwrap()
        .flatten(limit)
        .unwrap()
        .map(|p| p.unwrap().data().scalar_f64("temp").unwrap())
        .collect()
}

/// Two stations with two profiles of three levels each.
fn station_profiles() -> MemoryDataset {
    let mut ds = MemoryDataset::new("mem");
    ds.add_dimension("station", 2)
        .add_dimension("profile", 2)
        .add_dimension("z", 3);
    ds.add_text("name", &["station"], vec!["A".into(), "B".into()])
        .unwrap();
    ds.add_numeric("lat", &["station"], DataType::Float, vec![40.0, 41.0])
        .unwrap();
    ds.add_numeric("lon", &["station"], DataType::Float, vec![-105.0, -104.0])
        .unwrap();
    ds.add_numeric(
        "ptime",
        &["station", "profile"],
        DataType::Double,
        vec![100.0, 200.0, 300.0, 400.0],
    )
    .unwrap();
    ds.add_numeric(
        "temp",
        &["station", "profile", "z"],
        DataType::Float,
        (0..12).map(f64::from).collect(),
    )
    .unwrap();
    ds
}

fn station_profile_root() -> TableConfig {
    TableConfig::new(
        "station",
        Layout::Structure {
            structure: StructureSpec::pseudo("station", "station"),
        },
    )
    .with_feature_type(FeatureType::StationProfile)
    .with_coord(CoordName::StnId, "name")
    .with_coord(CoordName::Lat, "lat")
    .with_coord(CoordName::Lon, "lon")
}

/// `(station, profile time, temperatures)` for every profile, in iteration order.
fn walk_station_profiles(nt: Rc<NestedTable>) -> Vec<(String, f64, Vec<f64>)> {
    let FeatureCollection::StationProfile(collection) = FeatureCollection::new(nt).unwrap() else {
        panic!("expected a station profile collection");
    };
    let mut out = Vec::new();
    for station in collection.stations(None).unwrap() {
        let station = station.unwrap();
        for profile in station.profiles().unwrap() {
            let profile = profile.unwrap();
            let temps = profile
                .points()
                .unwrap()
                .map(|p| p.unwrap().data().scalar_f64("temp").unwrap())
                .collect();
            out.push((station.station().name.clone(), profile.time(), temps));
        }
    }
    out
}

fn expected_station_profiles() -> Vec<(String, f64, Vec<f64>)> {
    vec![
        ("A".to_string(), 100.0, vec![0.0, 1.0, 2.0]),
        ("A".to_string(), 200.0, vec![3.0, 4.0, 5.0]),
        ("B".to_string(), 300.0, vec![6.0, 7.0, 8.0]),
        ("B".to_string(), 400.0, vec![9.0, 10.0, 11.0]),
    ]
}

#[test]
fn station_profiles_from_three_dimensional_arrays() {
    let profile = TableConfig::new(
        "profile",
        Layout::MultidimInner {
            outer: "station".into(),
            inner: "profile".into(),
            vars: Some(vec!["ptime".into()]),
        },
    )
    .with_coord(CoordName::Time, "ptime");
    let obs = TableConfig::new(
        "obs",
        Layout::MultidimInner3D {
            outer: "station".into(),
            middle: "profile".into(),
            inner: "z".into(),
            vars: Some(vec!["temp".into()]),
        },
    );
    let nt = nested(station_profiles(), &[&station_profile_root(), &profile, &obs]);
    assert_eq!(nt.feature_type(), FeatureType::StationProfile);
    assert_eq!(walk_station_profiles(Rc::clone(&nt)), expected_station_profiles());
    assert_eq!(flattened_temps(&nt, None), (0..12).map(f64::from).collect::<Vec<_>>());
}

#[test]
fn station_profiles_from_pseudo_structures() {
    let profile = TableConfig::new(
        "profile",
        Layout::MultidimInnerPseudo {
            outer: "station".into(),
            inner: "profile".into(),
            vars: Some(vec!["ptime".into()]),
        },
    )
    .with_coord(CoordName::Time, "ptime");
    let obs = TableConfig::new(
        "obs",
        Layout::MultidimInnerPseudo3D {
            outer: "station".into(),
            middle: "profile".into(),
            inner: "z".into(),
            vars: Some(vec!["temp".into()]),
        },
    );
    let nt = nested(station_profiles(), &[&station_profile_root(), &profile, &obs]);
    assert_eq!(walk_station_profiles(Rc::clone(&nt)), expected_station_profiles());
    assert_eq!(flattened_temps(&nt, None), (0..12).map(f64::from).collect::<Vec<_>>());
}

#[test]
fn profiles_skip_missing_ids() {
    let mut ds = MemoryDataset::new("mem");
    ds.add_dimension("profile", 3).add_dimension("obs", 5);
    ds.add_text("name", &["profile"], vec!["P1".into(), "P2".into(), "".into()])
        .unwrap();
    ds.add_numeric("lat", &["profile"], DataType::Float, vec![10.0, 20.0, 30.0])
        .unwrap();
    ds.add_numeric("lon", &["profile"], DataType::Float, vec![30.0, 40.0, 50.0])
        .unwrap();
    ds.add_numeric("time", &["profile"], DataType::Double, vec![1000.0, 2000.0, 3000.0])
        .unwrap()
        .set_attribute("units", "seconds since 1970-01-01");
    ds.add_numeric("rowSize", &["profile"], DataType::Int, vec![2.0, 3.0, 0.0])
        .unwrap();
    ds.add_numeric("z", &["obs"], DataType::Float, vec![0.0, 10.0, 0.0, 10.0, 20.0])
        .unwrap();
    ds.add_numeric("temp", &["obs"], DataType::Float, (0..5).map(f64::from).collect())
        .unwrap();

    let profile = TableConfig::new(
        "profile",
        Layout::Structure {
            structure: StructureSpec::pseudo("profile", "profile"),
        },
    )
    .with_feature_type(FeatureType::Profile)
    .with_coord(CoordName::FeatureId, "name")
    .with_coord(CoordName::Lat, "lat")
    .with_coord(CoordName::Lon, "lon")
    .with_coord(CoordName::Time, "time");
    let obs = TableConfig::new(
        "obs",
        Layout::Contiguous {
            structure: StructureSpec::pseudo("obs", "obs"),
            start: None,
            num_records: "rowSize".into(),
        },
    )
    .with_coord(CoordName::Elev, "z");
    let nt = nested(ds, &[&profile, &obs]);

    let FeatureCollection::Profile(collection) = FeatureCollection::new(Rc::clone(&nt)).unwrap() else {
        panic!("expected a profile collection");
    };
    let profiles: Vec<_> = collection.profiles(None).unwrap().map(|p| p.unwrap()).collect();
    let names: Vec<&str> = profiles.iter().map(|p| p.name()).collect();
    assert_eq!(names, vec!["P1", "P2"]);
    assert_eq!(profiles[1].time(), 2000.0);
    assert_eq!(profiles[1].location().lat, 20.0);

    let depths: Vec<f64> = profiles[1]
        .points()
        .unwrap()
        .map(|p| p.unwrap().location().alt)
        .collect();
    assert_eq!(depths, vec![0.0, 10.0, 20.0]);
    assert_eq!(flattened_temps(&nt, None).len(), 5);
}

#[test]
fn trajectories_from_parent_ids() {
    let mut ds = MemoryDataset::new("mem");
    ds.add_dimension("obs", 5);
    ds.add_text(
        "traj",
        &["obs"],
        ["T1", "T2", "T1", "T2", "T1"].iter().map(|s| s.to_string()).collect(),
    )
    .unwrap();
    ds.add_numeric("lat", &["obs"], DataType::Float, (0..5).map(f64::from).collect())
        .unwrap();
    ds.add_numeric("lon", &["obs"], DataType::Float, vec![0.0; 5]).unwrap();
    ds.add_numeric("time", &["obs"], DataType::Double, (0..5).map(f64::from).collect())
        .unwrap()
        .set_attribute("units", "seconds since 1970-01-01");

    let trajectory = TableConfig::new("trajectory", Layout::Construct)
        .with_feature_type(FeatureType::Trajectory)
        .with_coord(CoordName::FeatureId, "traj");
    let obs = TableConfig::new(
        "obs",
        Layout::ParentId {
            structure: StructureSpec::pseudo("obs", "obs"),
            parent_id: "traj".into(),
        },
    )
    .with_coord(CoordName::Lat, "lat")
    .with_coord(CoordName::Lon, "lon")
    .with_coord(CoordName::Time, "time");
    let nt = nested(ds, &[&trajectory, &obs]);

    let FeatureCollection::Trajectory(collection) = FeatureCollection::new(nt).unwrap() else {
        panic!("expected a trajectory collection");
    };
    let tracks: Vec<(String, Vec<f64>)> = collection
        .trajectories(None)
        .unwrap()
        .map(|t| {
            let t = t.unwrap();
            let lats = t.points().unwrap().map(|p| p.unwrap().location().lat).collect();
            (t.name().to_string(), lats)
        })
        .collect();
    assert_eq!(
        tracks,
        vec![
            ("T1".to_string(), vec![0.0, 2.0, 4.0]),
            ("T2".to_string(), vec![1.0, 3.0]),
        ]
    );
}

#[test]
fn sections_own_their_profiles() {
    let mut ds = MemoryDataset::new("mem");
    ds.add_dimension("section", 2)
        .add_dimension("profile", 3)
        .add_dimension("obs", 6);
    ds.add_text("section_name", &["section"], vec!["S1".into(), "S2".into()])
        .unwrap();
    ds.add_numeric("profile_count", &["section"], DataType::Int, vec![2.0, 1.0])
        .unwrap();
    ds.add_numeric("plat", &["profile"], DataType::Float, vec![10.0, 11.0, 12.0])
        .unwrap();
    ds.add_numeric("plon", &["profile"], DataType::Float, vec![20.0, 21.0, 22.0])
        .unwrap();
    ds.add_numeric("ptime", &["profile"], DataType::Double, vec![100.0, 200.0, 300.0])
        .unwrap();
    ds.add_numeric("obs_count", &["profile"], DataType::Int, vec![2.0, 1.0, 3.0])
        .unwrap();
    ds.add_numeric("temp", &["obs"], DataType::Float, (0..6).map(f64::from).collect())
        .unwrap();

    let section = TableConfig::new(
        "section",
        Layout::Structure {
            structure: StructureSpec::pseudo("section", "section"),
        },
    )
    .with_feature_type(FeatureType::Section)
    .with_coord(CoordName::FeatureId, "section_name");
    let profile = TableConfig::new(
        "profile",
        Layout::Contiguous {
            structure: StructureSpec::pseudo("profile", "profile"),
            start: None,
            num_records: "profile_count".into(),
        },
    )
    .with_coord(CoordName::Lat, "plat")
    .with_coord(CoordName::Lon, "plon")
    .with_coord(CoordName::Time, "ptime");
    let obs = TableConfig::new(
        "obs",
        Layout::Contiguous {
            structure: StructureSpec::pseudo("obs", "obs"),
            start: None,
            num_records: "obs_count".into(),
        },
    );
    let nt = nested(ds, &[&section, &profile, &obs]);

    let FeatureCollection::Section(collection) = FeatureCollection::new(Rc::clone(&nt)).unwrap() else {
        panic!("expected a section collection");
    };
    let mut seen = Vec::new();
    for section in collection.sections(None).unwrap() {
        let section = section.unwrap();
        for profile in section.profiles().unwrap() {
            let profile = profile.unwrap();
            let points: Vec<_> = profile.points().unwrap().map(|p| p.unwrap()).collect();
            for p in &points {
                let owner = p.cursor().what().and_then(|w| w.downcast_ref::<String>());
                assert_eq!(owner.map(String::as_str), Some(section.name()));
            }
            let temps: Vec<f64> = points.iter().map(|p| p.data().scalar_f64("temp").unwrap()).collect();
            seen.push((section.name().to_string(), profile.time(), profile.location().lat, temps));
        }
    }
    assert_eq!(
        seen,
        vec![
            ("S1".to_string(), 100.0, 10.0, vec![0.0, 1.0]),
            ("S1".to_string(), 200.0, 11.0, vec![2.0]),
            ("S2".to_string(), 300.0, 12.0, vec![3.0, 4.0, 5.0]),
        ]
    );
    assert_eq!(flattened_temps(&nt, None), (0..6).map(f64::from).collect::<Vec<_>>());
}

#[test]
fn orthogonal_timeseries_join_the_shared_time_axis() {
    let mut ds = MemoryDataset::new("cf");
    ds.add_attribute("Conventions", "CF-1.6");
    ds.add_attribute("featureType", "timeSeries");
    ds.add_dimension("station", 2).add_dimension("time", 3);
    ds.add_text("name", &["station"], vec!["A".into(), "B".into()])
        .unwrap()
        .set_attribute("cf_role", "timeseries_id");
    ds.add_numeric("lat", &["station"], DataType::Float, vec![1.0, 2.0])
        .unwrap()
        .set_attribute("units", "degrees_north");
    ds.add_numeric("lon", &["station"], DataType::Float, vec![3.0, 4.0])
        .unwrap()
        .set_attribute("units", "degrees_east");
    ds.add_numeric("time", &["time"], DataType::Double, vec![10.0, 20.0, 30.0])
        .unwrap()
        .set_attribute("units", "hours since 2000-01-01");
    ds.add_numeric("temp", &["station", "time"], DataType::Float, (0..6).map(f64::from).collect())
        .unwrap();
    let ds: Rc<dyn Dataset> = Rc::new(ds);

    let config = AnalyzerConfig {
        wanted: Some(FeatureType::Station),
        ..AnalyzerConfig::default()
    };
    let analyzer = TableAnalyzer::factory(ds, &ConventionRegistry::with_builtins(), &config).unwrap();
    assert_eq!(analyzer.configurer_name(), Some("CF-1.x point"));
    let nt = Rc::clone(&analyzer.nested_tables()[0]);

    let FeatureCollection::Station(collection) = FeatureCollection::new(nt).unwrap() else {
        panic!("expected a station collection");
    };
    let stations: Vec<_> = collection.stations(None).unwrap().map(|s| s.unwrap()).collect();
    assert_eq!(stations.len(), 2);
    for (station, first_temp) in stations.iter().zip([0.0, 3.0]) {
        let points: Vec<_> = station.points().unwrap().map(|p| p.unwrap()).collect();
        let times: Vec<f64> = points.iter().map(|p| p.obs_time()).collect();
        assert_eq!(times, vec![10.0, 20.0, 30.0]);
        assert_eq!(points[0].data().scalar_f64("temp"), Some(first_temp));

        let owner = points[0]
            .cursor()
            .what()
            .and_then(|w| w.downcast_ref::<StationFeature>());
        assert_eq!(owner, Some(station.station()));
    }
}

#[test]
fn limit_variable_caps_the_root_rows() {
    let mut ds = MemoryDataset::new("mem");
    ds.add_dimension("station", 2).add_dimension("obs", 5);
    ds.add_numeric("nstn", &[], DataType::Int, vec![1.0]).unwrap();
    ds.add_text("name", &["station"], vec!["A".into(), "B".into()])
        .unwrap();
    ds.add_numeric("lat", &["station"], DataType::Float, vec![40.0, 41.0])
        .unwrap();
    ds.add_numeric("lon", &["station"], DataType::Float, vec![-105.0, -104.0])
        .unwrap();
    ds.add_numeric("rowSize", &["station"], DataType::Int, vec![3.0, 2.0])
        .unwrap();
    ds.add_numeric("temp", &["obs"], DataType::Float, (0..5).map(f64::from).collect())
        .unwrap();

    let station = TableConfig::new(
        "station",
        Layout::Structure {
            structure: StructureSpec::pseudo("station", "station"),
        },
    )
    .with_coord(CoordName::StnId, "name")
    .with_coord(CoordName::Lat, "lat")
    .with_coord(CoordName::Lon, "lon")
    .with_coord(CoordName::Limit, "nstn");
    let obs = TableConfig::new(
        "obs",
        Layout::Contiguous {
            structure: StructureSpec::pseudo("obs", "obs"),
            start: None,
            num_records: "rowSize".into(),
        },
    );
    let nt = nested(ds, &[&station, &obs]);

    assert_eq!(nt.station_data_iter(None).unwrap().count(), 1);
    assert_eq!(nt.root_feature_iter(Some(5)).unwrap().count(), 1);
    assert_eq!(flattened_temps(&nt, None), vec![0.0, 1.0, 2.0]);
    assert_eq!(flattened_temps(&nt, Some(5)), vec![0.0, 1.0, 2.0]);

    let FeatureCollection::Station(collection) = FeatureCollection::new(nt).unwrap() else {
        panic!("expected a station collection");
    };
    let names: Vec<String> = collection
        .stations(None)
        .unwrap()
        .map(|s| s.unwrap().station().name.clone())
        .collect();
    assert_eq!(names, vec!["A"]);
}
