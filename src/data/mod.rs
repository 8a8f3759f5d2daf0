use std::fs;
use std::path::{Path, PathBuf};

use geojson::{GeoJson, Value};
use glam::DVec2;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::Result;
use crate::map::geometry::{GeometryKind, Path as Ring};
use crate::map::labels::{ContentAlignment, LabelLayer, LabelSymbolizer};
use crate::map::symbology::{Symbolizer, Symbology};
use crate::map::{AttributeValue, Feature, FeatureLayer, Geometry};
use crate::raster::Color;

/// Label height in pixels for loaded layers; one terminal row is four pixels
const LABEL_FONT_SIZE: f64 = 4.0;

/// Fields tried, in order, as label priority for point layers
const PRIORITY_FIELDS: [&str; 3] = ["pop_max", "population", "scalerank"];

/// Load every `.json`/`.geojson` file in `data_dir` as its own feature layer.
///
/// Files are parsed in parallel. A file that fails to load is logged and
/// skipped; the remaining layers come back sorted by file name.
pub fn load_dir(data_dir: &Path) -> anyhow::Result<Vec<FeatureLayer>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(data_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("geojson"))
        })
        .collect();
    paths.sort();

    let layers: Vec<FeatureLayer> = paths
        .par_iter()
        .filter_map(|path| match load_file(path) {
            Ok(Some(layer)) => Some(layer),
            Ok(None) => {
                debug!("{}: no drawable features", path.display());
                None
            }
            Err(e) => {
                warn!("failed to load {}: {}", path.display(), e);
                None
            }
        })
        .collect();

    info!("loaded {} layers from {}", layers.len(), data_dir.display());
    Ok(layers)
}

/// Load one GeoJSON file. `None` when it holds nothing drawable.
pub fn load_file(path: &Path) -> Result<Option<FeatureLayer>> {
    let mut bytes = fs::read(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer")
        .to_string();
    parse_layer(&name, &mut bytes)
}

/// Parse a GeoJSON document into a feature layer named `name`
pub fn parse_layer(name: &str, bytes: &mut [u8]) -> Result<Option<FeatureLayer>> {
    let value: serde_json::Value = simd_json::serde::from_slice(bytes)?;
    let geojson = GeoJson::from_json_value(value)?;
    let features = collect_features(&geojson);
    Ok(build_layer(name, features))
}

fn collect_features(geojson: &GeoJson) -> Vec<Feature> {
    let mut out = Vec::new();
    match geojson {
        GeoJson::FeatureCollection(fc) => {
            for feature in &fc.features {
                push_feature(&mut out, feature.geometry.as_ref(), feature.properties.as_ref());
            }
        }
        GeoJson::Feature(f) => push_feature(&mut out, f.geometry.as_ref(), f.properties.as_ref()),
        GeoJson::Geometry(g) => push_feature(&mut out, Some(g), None),
    }
    out
}

fn push_feature(out: &mut Vec<Feature>, geometry: Option<&geojson::Geometry>, properties: Option<&geojson::JsonObject>) {
    let Some(geometry) = geometry.and_then(|g| convert_value(&g.value)) else {
        return;
    };
    let mut feature = Feature::new(out.len() as u64, geometry);
    if let Some(props) = properties {
        for (k, v) in props {
            feature.attributes.insert(k.clone(), AttributeValue::from(v));
        }
    }
    out.push(feature);
}

fn position(p: &[f64]) -> DVec2 {
    match p {
        [x, y, ..] => DVec2::new(*x, *y),
        // Short positions become NaN and are rejected by validation later
        _ => DVec2::NAN,
    }
}

fn path(coords: &[Vec<f64>]) -> Ring {
    coords.iter().map(|c| position(c)).collect()
}

/// Convert a GeoJSON geometry. Collections keep only members of the first
/// member's kind.
fn convert_value(value: &Value) -> Option<Geometry> {
    match value {
        Value::Point(p) => Some(Geometry::Point(vec![position(p)])),
        Value::MultiPoint(ps) => Some(Geometry::Point(ps.iter().map(|p| position(p)).collect())),
        Value::LineString(l) => Some(Geometry::Line(vec![path(l)])),
        Value::MultiLineString(ls) => Some(Geometry::Line(ls.iter().map(|l| path(l)).collect())),
        Value::Polygon(rings) => Some(Geometry::Polygon(vec![rings.iter().map(|r| path(r)).collect()])),
        Value::MultiPolygon(polys) => Some(Geometry::Polygon(
            polys.iter().map(|rings| rings.iter().map(|r| path(r)).collect()).collect(),
        )),
        Value::GeometryCollection(members) => {
            let mut parts = members.iter().filter_map(|g| convert_value(&g.value));
            let first = parts.next()?;
            Some(parts.fold(first, merge))
        }
    }
}

fn merge(acc: Geometry, next: Geometry) -> Geometry {
    match (acc, next) {
        (Geometry::Point(mut a), Geometry::Point(b)) => {
            a.extend(b);
            Geometry::Point(a)
        }
        (Geometry::Line(mut a), Geometry::Line(b)) => {
            a.extend(b);
            Geometry::Line(a)
        }
        (Geometry::Polygon(mut a), Geometry::Polygon(b)) => {
            a.extend(b);
            Geometry::Polygon(a)
        }
        (acc, _) => acc,
    }
}

/// One layer per file, styled by the kind of its first geometry. Features of
/// other kinds are dropped.
fn build_layer(name: &str, features: Vec<Feature>) -> Option<FeatureLayer> {
    let kind = features.first()?.geometry.kind();
    let total = features.len();
    let features: Vec<Feature> = features.into_iter().filter(|f| f.geometry.kind() == kind).collect();
    if features.len() < total {
        warn!("layer '{}': dropped {} features not of kind {:?}", name, total - features.len(), kind);
    }

    let symbolizer = match kind {
        GeometryKind::Point => Symbolizer::point(Color::rgb(255, 220, 80), 1.0),
        GeometryKind::Line => Symbolizer::line(Color::rgb(80, 200, 220), 1.0),
        GeometryKind::Polygon => Symbolizer::polygon(Color::rgba(40, 90, 60, 160), Color::rgb(80, 200, 220)),
    };
    let labels = (kind == GeometryKind::Point)
        .then(|| name_field(&features))
        .flatten()
        .map(|field| LabelLayer::single(point_labels(&field, priority_field(&features))));

    let layer = FeatureLayer::new(name, features, Symbology::single(symbolizer));
    Some(match labels {
        Some(labels) => layer.with_labels(labels),
        None => layer,
    })
}

fn name_field(features: &[Feature]) -> Option<String> {
    let first = features.first()?;
    first
        .attributes
        .keys()
        .find(|k| k.eq_ignore_ascii_case("name"))
        .cloned()
}

fn priority_field(features: &[Feature]) -> Option<String> {
    let first = features.first()?;
    PRIORITY_FIELDS
        .iter()
        .find(|f| first.attribute(f).and_then(AttributeValue::as_f64).is_some())
        .map(|f| f.to_string())
}

fn point_labels(field: &str, priority: Option<String>) -> LabelSymbolizer {
    let mut sym = LabelSymbolizer::new(&format!("[{}]", field));
    sym.font_size = LABEL_FONT_SIZE;
    sym.font_color = Color::WHITE;
    sym.alignment = ContentAlignment::MiddleRight;
    sym.offset = DVec2::new(2.0, 0.0);
    sym.priority_field = priority;
    sym
}

/// Simplified continents and a handful of capitals, used when no data
/// directory is available
pub fn fallback_world() -> Vec<FeatureLayer> {
    let continents: Vec<Feature> = CONTINENTS
        .iter()
        .enumerate()
        .map(|(i, (name, ring))| {
            let ring: Ring = ring.iter().map(|&(x, y)| DVec2::new(x, y)).collect();
            Feature::new(i as u64, Geometry::polygon(ring)).with("name", *name)
        })
        .collect();
    let capitals: Vec<Feature> = CAPITALS
        .iter()
        .enumerate()
        .map(|(i, &(name, lon, lat, pop))| {
            Feature::new(i as u64, Geometry::point(lon, lat))
                .with("name", name)
                .with("pop_max", pop)
        })
        .collect();

    let land = FeatureLayer::new(
        "continents",
        continents,
        Symbology::single(Symbolizer::polygon(Color::rgba(40, 90, 60, 160), Color::rgb(80, 200, 220))),
    );
    let cities = FeatureLayer::new(
        "capitals",
        capitals,
        Symbology::single(Symbolizer::point(Color::rgb(255, 220, 80), 1.0)),
    )
    .with_labels(LabelLayer::single(point_labels("name", Some("pop_max".to_string()))));
    vec![land, cities]
}

type Outline = (&'static str, &'static [(f64, f64)]);

const CONTINENTS: &[Outline] = &[
    (
        "North America",
        &[
            (-168.0, 65.0), (-166.0, 60.0), (-141.0, 60.0), (-130.0, 55.0),
            (-125.0, 48.0), (-124.0, 40.0), (-117.0, 32.0), (-110.0, 25.0),
            (-97.0, 25.0), (-97.0, 28.0), (-82.0, 24.0), (-80.0, 25.0),
            (-81.0, 31.0), (-75.0, 35.0), (-70.0, 41.0), (-67.0, 45.0),
            (-55.0, 47.0), (-58.0, 55.0), (-64.0, 60.0), (-80.0, 63.0),
            (-95.0, 62.0), (-110.0, 68.0), (-130.0, 70.0), (-145.0, 70.0),
            (-168.0, 65.0),
        ],
    ),
    (
        "South America",
        &[
            (-80.0, 10.0), (-70.0, 5.0), (-60.0, 5.0), (-50.0, 0.0),
            (-35.0, -5.0), (-38.0, -15.0), (-40.0, -22.0), (-48.0, -25.0),
            (-55.0, -34.0), (-65.0, -42.0), (-68.0, -50.0), (-75.0, -52.0),
            (-72.0, -40.0), (-70.0, -20.0), (-80.0, -5.0), (-80.0, 10.0),
        ],
    ),
    (
        "Europe",
        &[
            (-10.0, 36.0), (0.0, 38.0), (5.0, 43.0), (15.0, 45.0),
            (20.0, 40.0), (25.0, 37.0), (30.0, 40.0), (40.0, 43.0),
            (40.0, 55.0), (30.0, 60.0), (20.0, 70.0), (10.0, 71.0),
            (5.0, 58.0), (-5.0, 58.0), (-10.0, 52.0), (-5.0, 43.0),
            (-10.0, 36.0),
        ],
    ),
    (
        "Africa",
        &[
            (-17.0, 15.0), (-15.0, 28.0), (-5.0, 35.0), (10.0, 37.0),
            (25.0, 32.0), (35.0, 30.0), (42.0, 12.0), (50.0, 12.0),
            (40.0, -5.0), (35.0, -25.0), (20.0, -35.0), (15.0, -30.0),
            (10.0, -15.0), (10.0, 0.0), (-5.0, 5.0), (-17.0, 15.0),
        ],
    ),
    (
        "Asia",
        &[
            (40.0, 43.0), (50.0, 40.0), (60.0, 25.0), (70.0, 20.0),
            (80.0, 8.0), (88.0, 22.0), (100.0, 14.0), (105.0, 10.0),
            (110.0, 20.0), (122.0, 25.0), (130.0, 35.0), (140.0, 40.0),
            (145.0, 50.0), (160.0, 60.0), (180.0, 66.0), (180.0, 70.0),
            (140.0, 73.0), (110.0, 76.0), (70.0, 72.0), (60.0, 55.0),
            (40.0, 43.0),
        ],
    ),
    (
        "Australia",
        &[
            (115.0, -20.0), (130.0, -12.0), (140.0, -12.0), (145.0, -15.0),
            (153.0, -30.0), (145.0, -38.0), (135.0, -35.0), (125.0, -32.0),
            (115.0, -35.0), (115.0, -20.0),
        ],
    ),
];

const CAPITALS: &[(&str, f64, f64, f64)] = &[
    ("Washington", -77.04, 38.91, 5_300_000.0),
    ("Ottawa", -75.70, 45.42, 1_400_000.0),
    ("Mexico City", -99.13, 19.43, 21_800_000.0),
    ("Brasilia", -47.88, -15.79, 4_700_000.0),
    ("Buenos Aires", -58.38, -34.60, 15_000_000.0),
    ("London", -0.13, 51.51, 9_000_000.0),
    ("Paris", 2.35, 48.86, 11_000_000.0),
    ("Berlin", 13.40, 52.52, 3_600_000.0),
    ("Moscow", 37.62, 55.75, 12_500_000.0),
    ("Cairo", 31.24, 30.04, 20_900_000.0),
    ("Nairobi", 36.82, -1.29, 4_400_000.0),
    ("New Delhi", 77.21, 28.61, 29_000_000.0),
    ("Beijing", 116.41, 39.90, 20_400_000.0),
    ("Tokyo", 139.69, 35.69, 37_400_000.0),
    ("Canberra", 149.13, -35.28, 430_000.0),
    ("Wellington", 174.78, -41.29, 420_000.0),
    ("Suva", 178.44, -18.14, 180_000.0),
    ("Apia", -171.76, -13.83, 37_000.0),
    ("Honolulu", -157.86, 21.31, 1_000_000.0),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_collection_becomes_labelled_layer() {
        let mut json = br#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [2.35, 48.86]},
                 "properties": {"NAME": "Paris", "pop_max": 11000000}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [13.4, 52.5]},
                 "properties": {"NAME": "Berlin", "pop_max": 3600000}}
            ]
        }"#
        .to_vec();
        let layer = parse_layer("cities", &mut json).unwrap().unwrap();
        assert_eq!(layer.features().len(), 2);
        assert_eq!(layer.features()[0].attribute("name"), Some(&AttributeValue::from("Paris")));
        let labels = layer.labels.as_ref().unwrap();
        let sym = labels.categories[0].symbolizer.as_ref().unwrap();
        assert_eq!(sym.expression.evaluate(&layer.features()[1]), "Berlin");
        assert_eq!(sym.priority_field.as_deref(), Some("pop_max"));
    }

    #[test]
    fn test_polygon_layer_has_no_labels() {
        let mut json = br#"{"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,0]]]}"#.to_vec();
        let layer = parse_layer("shape", &mut json).unwrap().unwrap();
        assert!(layer.labels.is_none());
        assert_eq!(layer.features()[0].geometry.kind(), GeometryKind::Polygon);
        let e = layer.extent().unwrap();
        assert_eq!((e.min_x, e.max_x), (0.0, 10.0));
    }

    #[test]
    fn test_mixed_kinds_keep_first_kind() {
        let mut json = br#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}, "properties": null},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [5,5]}, "properties": null},
                {"type": "Feature", "geometry": null, "properties": null}
            ]
        }"#
        .to_vec();
        let layer = parse_layer("mixed", &mut json).unwrap().unwrap();
        assert_eq!(layer.features().len(), 1);
        assert_eq!(layer.features()[0].geometry.kind(), GeometryKind::Line);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let mut json = b"{ not json".to_vec();
        assert!(parse_layer("bad", &mut json).is_err());
    }

    #[test]
    fn test_empty_collection_is_none() {
        let mut json = br#"{"type": "FeatureCollection", "features": []}"#.to_vec();
        assert!(parse_layer("empty", &mut json).unwrap().is_none());
    }

    #[test]
    fn test_fallback_world_spans_the_dateline_region() {
        let layers = fallback_world();
        assert_eq!(layers.len(), 2);
        let extent = layers[0].extent().unwrap().union(&layers[1].extent().unwrap());
        assert!(extent.min_x < -170.0 && extent.max_x >= 178.0);
        assert!(layers[1].labels.is_some());
    }
}
