//! Recorded particle runs on disk, for offline linking and evaluation.

use crate::detector::Recording;
use linker_core::types::{group_into_frames, Observation};
use serde::Deserialize;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Save a recording (frames + ground truth) to a JSON file.
pub fn save_particles(recording: &Recording, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, recording)?;
    tracing::debug!(path = %path.display(), frames = recording.frames.len(), "saved particles");
    Ok(())
}

/// Either a full recording, or a bare list of observations from an external
/// detector (grouped into frames on load, no ground truth).
#[derive(Deserialize)]
#[serde(untagged)]
enum ParticleFile {
    Recording(Recording),
    Observations(Vec<Observation>),
}

/// Load particles from a JSON file.
pub fn load_particles(path: &Path) -> anyhow::Result<Recording> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let recording = match serde_json::from_reader(reader)? {
        ParticleFile::Recording(rec) => rec,
        ParticleFile::Observations(obs) => Recording {
            scenario_name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            frames: group_into_frames(obs),
            ..Default::default()
        },
    };
    tracing::debug!(
        path = %path.display(),
        frames = recording.frames.len(),
        "loaded particles"
    );
    Ok(recording)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::{Scenario, ScenarioKind};

    #[test]
    fn recording_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blinking.json");
        let rec = Scenario::build(ScenarioKind::Blinking, 4).record().unwrap();
        save_particles(&rec, &path).unwrap();
        assert_eq!(load_particles(&path).unwrap(), rec);
    }

    #[test]
    fn bare_observation_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.json");
        std::fs::write(
            &path,
            r#"[{"frame": 2, "coords": [1.0, 1.0]},
                {"frame": 0, "coords": [0.0, 0.0], "attributes": {"intensity": 5.0}}]"#,
        )
        .unwrap();
        let rec = load_particles(&path).unwrap();
        assert_eq!(rec.scenario_name, "detections");
        assert_eq!(rec.frames.len(), 3);
        assert!(rec.frames[1].is_empty());
        assert!(rec.truth.labels.is_empty());
    }
}
