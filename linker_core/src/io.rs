//! Native `*.st.json` persistence for [`STracks`].
//!
//! ```text
//! { "tracks":     [[track_id, frame, coord...], ...],
//!   "properties": { name: [number | null, ...] },
//!   "graph":      { "track_id": [parent_id, ...] },
//!   "features":   { "track_id": { name: number } },
//!   "scale":      [numbers] | null }
//! ```
//!
//! Only `tracks` is mandatory on read. Ids and frames written as floats
//! (`3.0`) are accepted when integral. `NaN` property values travel as `null`.

use crate::{
    error::{Error, Result},
    stracks::{PointRecord, STracks},
    types::TrackId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const ST_JSON_EXTENSION: &str = ".st.json";

/// True if `path` follows the `*.st.json` naming convention.
pub fn is_st_json(path: &Path) -> bool {
    path.to_str()
        .is_some_and(|p| p.ends_with(ST_JSON_EXTENSION))
}

// ---------------------------------------------------------------------------
// Document shapes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(untagged)]
enum Cell {
    Id(u64),
    Coord(f64),
}

#[derive(Serialize)]
struct DocumentOut<'a> {
    tracks: Vec<Vec<Cell>>,
    properties: BTreeMap<&'a str, Vec<Option<f64>>>,
    graph: BTreeMap<u64, Vec<u64>>,
    features: BTreeMap<u64, &'a BTreeMap<String, f64>>,
    scale: Option<&'a [f64]>,
}

#[derive(Deserialize)]
struct DocumentIn {
    tracks: Option<Vec<Vec<f64>>>,
    properties: Option<BTreeMap<String, Vec<Option<f64>>>>,
    graph: Option<BTreeMap<String, Vec<f64>>>,
    features: Option<BTreeMap<String, BTreeMap<String, f64>>>,
    scale: Option<Vec<f64>>,
}

fn as_index(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64)
        .then_some(value as u64)
}

fn parse_id(key: &str, row: usize) -> Result<TrackId> {
    key.trim()
        .parse::<f64>()
        .ok()
        .and_then(as_index)
        .map(TrackId)
        .ok_or_else(|| Error::InvalidRecord {
            row,
            reason: format!("`{key}` is not a track id"),
        })
}

fn point_from_row(row: usize, values: Vec<f64>) -> Result<PointRecord> {
    if values.len() < 4 {
        return Err(Error::InvalidRecord {
            row,
            reason: format!("expected at least 4 columns, got {}", values.len()),
        });
    }
    let track_id = as_index(values[0]).ok_or_else(|| Error::InvalidRecord {
        row,
        reason: format!("track id {} is not a non-negative integer", values[0]),
    })?;
    let frame = as_index(values[1]).ok_or_else(|| Error::InvalidRecord {
        row,
        reason: format!("frame {} is not a non-negative integer", values[1]),
    })?;
    Ok(PointRecord {
        track_id: TrackId(track_id),
        frame,
        coords: values[2..].to_vec(),
    })
}

impl DocumentIn {
    fn into_stracks(self) -> Result<STracks> {
        let rows = self.tracks.ok_or(Error::MissingField("tracks"))?;
        let points = rows
            .into_iter()
            .enumerate()
            .map(|(row, values)| point_from_row(row, values))
            .collect::<Result<Vec<_>>>()?;

        let properties = self
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(name, values)| {
                let column = values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
                (name, column)
            })
            .collect();

        let mut graph: BTreeMap<TrackId, BTreeSet<TrackId>> = BTreeMap::new();
        for (key, parents) in self.graph.unwrap_or_default() {
            let child = parse_id(&key, 0)?;
            let entry = graph.entry(child).or_default();
            for parent in parents {
                let id = as_index(parent).ok_or_else(|| Error::InvalidRecord {
                    row: 0,
                    reason: format!("parent {parent} of track {key} is not a track id"),
                })?;
                entry.insert(TrackId(id));
            }
        }

        let mut features = BTreeMap::new();
        for (key, values) in self.features.unwrap_or_default() {
            features.insert(parse_id(&key, 0)?, values);
        }

        STracks::from_parts(points, properties, graph, features, self.scale)
    }
}

fn document(tracks: &STracks) -> DocumentOut<'_> {
    DocumentOut {
        tracks: tracks
            .points()
            .iter()
            .map(|p| {
                let mut row = Vec::with_capacity(p.coords.len() + 2);
                row.push(Cell::Id(p.track_id.0));
                row.push(Cell::Id(p.frame));
                row.extend(p.coords.iter().map(|&c| Cell::Coord(c)));
                row
            })
            .collect(),
        properties: tracks
            .properties()
            .iter()
            .map(|(name, values)| {
                let column = values
                    .iter()
                    .map(|&v| (!v.is_nan()).then_some(v))
                    .collect();
                (name.as_str(), column)
            })
            .collect(),
        graph: tracks
            .graph()
            .iter()
            .map(|(child, parents)| (child.0, parents.iter().map(|p| p.0).collect()))
            .collect(),
        features: tracks
            .features()
            .iter()
            .map(|(id, values)| (id.0, values))
            .collect(),
        scale: tracks.scale(),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn from_str(text: &str) -> Result<STracks> {
    let doc: DocumentIn = serde_json::from_str(text)?;
    doc.into_stracks()
}

pub fn from_reader(reader: impl Read) -> Result<STracks> {
    let doc: DocumentIn = serde_json::from_reader(reader)?;
    doc.into_stracks()
}

pub fn to_string(tracks: &STracks) -> Result<String> {
    Ok(serde_json::to_string(&document(tracks))?)
}

pub fn to_writer(writer: impl Write, tracks: &STracks, pretty: bool) -> Result<()> {
    let doc = document(tracks);
    if pretty {
        serde_json::to_writer_pretty(writer, &doc)?;
    } else {
        serde_json::to_writer(writer, &doc)?;
    }
    Ok(())
}

/// Load a dataset from a `.st.json` file.
pub fn read_st_json(path: &Path) -> Result<STracks> {
    let file = File::open(path)?;
    let tracks = from_reader(BufReader::new(file))?;
    tracing::debug!(path = %path.display(), points = tracks.len(), "loaded tracks");
    Ok(tracks)
}

/// Save a dataset to a `.st.json` file.
pub fn write_st_json(path: &Path, tracks: &STracks) -> Result<()> {
    if !is_st_json(path) {
        tracing::warn!(path = %path.display(), "output does not use the .st.json extension");
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    to_writer(&mut writer, tracks, false)?;
    writer.flush()?;
    tracing::debug!(path = %path.display(), points = tracks.len(), "saved tracks");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> STracks {
        let mut st = STracks::new();
        st.push_point(TrackId(0), 0, vec![10.0, 20.5]).unwrap();
        st.push_point(TrackId(0), 1, vec![11.25, 20.0]).unwrap();
        st.push_point(TrackId(3), 2, vec![0.1, 0.2]).unwrap();
        st.add_property("intensity", vec![1.0, 2.0, 3.5]).unwrap();
        st.add_parent(TrackId(3), TrackId(0)).unwrap();
        st.set_feature(TrackId(0), "length", 2.0).unwrap();
        st.set_feature(TrackId(3), "length", 1.0).unwrap();
        st.set_scale(vec![1.0, 0.5, 0.5]).unwrap();
        st
    }

    #[test]
    fn writes_expected_shape() {
        let text = to_string(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tracks"][0], serde_json::json!([0, 0, 10.0, 20.5]));
        assert_eq!(value["graph"]["3"], serde_json::json!([0]));
        assert_eq!(value["features"]["0"]["length"], serde_json::json!(2.0));
        assert_eq!(value["scale"], serde_json::json!([1.0, 0.5, 0.5]));
    }

    #[test]
    fn round_trip() {
        let st = sample();
        let back = from_str(&to_string(&st).unwrap()).unwrap();
        assert_eq!(back, st);
    }

    #[test]
    fn missing_tracks_field() {
        let err = from_str(r#"{"properties": {}}"#);
        assert!(matches!(err, Err(Error::MissingField("tracks"))));
    }

    #[test]
    fn optional_fields_default() {
        let st = from_str(r#"{"tracks": [[0, 0, 1.0, 2.0], [0, 1, 1.5, 2.0]]}"#).unwrap();
        assert_eq!(st.len(), 2);
        assert!(st.graph().is_empty());
        assert!(st.features().is_empty());
        assert!(st.scale().is_none());
    }

    #[test]
    fn accepts_float_ids_and_null_sections() {
        let text = r#"{
            "tracks": [[0.0, 0.0, 1.0, 2.0], [1.0, 1.0, 1.5, 2.0]],
            "properties": {"score": [0.5, null]},
            "graph": {"1.0": [0.0]},
            "features": null,
            "scale": null
        }"#;
        let st = from_str(text).unwrap();
        assert_eq!(st.track_ids(), vec![TrackId(0), TrackId(1)]);
        assert!(st.parents(TrackId(1)).unwrap().contains(&TrackId(0)));
        assert!(st.properties()["score"][1].is_nan());
    }

    #[test]
    fn rejects_fractional_ids() {
        let err = from_str(r#"{"tracks": [[0.5, 0, 1.0, 2.0]]}"#);
        assert!(matches!(err, Err(Error::InvalidRecord { row: 0, .. })));
    }

    #[test]
    fn non_finite_coordinates_never_reach_the_file() {
        let mut st = sample();
        assert!(matches!(
            st.push_point(TrackId(0), 7, vec![f64::NAN, 1.0]),
            Err(Error::NonFiniteCoordinate { frame: 7 })
        ));
        let text = to_string(&st).unwrap();
        assert!(!text.contains("null"));
        assert_eq!(from_str(&text).unwrap(), st);

        let err = from_str(r#"{"tracks": [[0, 0, null, 1.0]]}"#);
        assert!(matches!(err, Err(Error::Json(_))));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.st.json");
        assert!(is_st_json(&path));
        let st = sample();
        write_st_json(&path, &st).unwrap();
        assert_eq!(read_st_json(&path).unwrap(), st);
    }
}
