//! Structural properties of the linkers and the track dataset, checked on
//! seeded random recordings.

use linker_core::cost::{CostStrategy, EuclideanCost, RadiusDifferenceCost};
use linker_core::error::Error;
use linker_core::features::{FeatureMeasure, LengthFeature};
use linker_core::filter::{FeatureFilter, TrackFilter};
use linker_core::io;
use linker_core::linker::{Linker, LinkerConfig};
use linker_core::nn_linker::NnLinker;
use linker_core::sp_linker::{SpLinker, SpLinkerConfig};
use linker_core::stracks::STracks;
use linker_core::types::{Frame, Observation, TrackId};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Random walkers that appear and vanish, with a few frames skipped per
/// walker and observation order shuffled inside each frame.
fn random_frames(seed: u64, n_frames: u64, n_walkers: usize) -> Vec<Frame> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut walkers: Vec<(u64, u64, [f64; 2])> = (0..n_walkers)
        .map(|_| {
            let start = rng.gen_range(0..n_frames);
            let end = rng.gen_range(start..n_frames);
            let pos = [rng.gen_range(0.0..200.0), rng.gen_range(0.0..200.0)];
            (start, end, pos)
        })
        .collect();

    (0..n_frames)
        .map(|f| {
            let mut observations = Vec::new();
            for (start, end, pos) in walkers.iter_mut() {
                if f < *start || f > *end {
                    continue;
                }
                pos[0] += rng.gen_range(-1.5..1.5);
                pos[1] += rng.gen_range(-1.5..1.5);
                if rng.gen_bool(0.9) {
                    observations.push(Observation::new(f, pos.to_vec()));
                }
            }
            observations.shuffle(&mut rng);
            Frame::new(f, observations)
        })
        .collect()
}

type PointKey = (u64, Vec<u64>);

fn key(frame: u64, coords: &[f64]) -> PointKey {
    (frame, coords.iter().map(|c| c.to_bits()).collect())
}

fn input_points(frames: &[Frame]) -> Vec<PointKey> {
    let mut keys: Vec<PointKey> = frames
        .iter()
        .flat_map(|f| f.observations.iter().map(|o| key(o.frame, &o.coords)))
        .collect();
    keys.sort();
    keys
}

fn output_points(tracks: &STracks) -> Vec<PointKey> {
    let mut keys: Vec<PointKey> = tracks
        .points()
        .iter()
        .map(|p| key(p.frame, &p.coords))
        .collect();
    keys.sort();
    keys
}

fn observation(frame: u64, coords: &[f64]) -> Observation {
    Observation::new(frame, coords.to_vec())
}

fn linkers(config: LinkerConfig) -> Vec<Box<dyn Linker>> {
    vec![
        Box::new(NnLinker::new(config.clone())),
        Box::new(SpLinker::new(SpLinkerConfig {
            base: config,
            ..Default::default()
        })),
    ]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn every_observation_lands_in_exactly_one_track() {
    let cost = EuclideanCost::new(9.0);
    for seed in 0..4 {
        let frames = random_frames(seed, 30, 25);
        for gap in [1, 3] {
            let config = LinkerConfig {
                max_frame_gap: gap,
                ..Default::default()
            };
            for linker in linkers(config) {
                let tracks = linker.link(&frames, &cost).unwrap();
                assert_eq!(
                    output_points(&tracks),
                    input_points(&frames),
                    "{} seed {seed} gap {gap}",
                    linker.name()
                );
                tracks.validate().unwrap();
            }
        }
    }
}

#[test]
fn no_track_visits_a_frame_twice() {
    let frames = random_frames(11, 40, 30);
    for linker in linkers(LinkerConfig::default()) {
        let tracks = linker.link(&frames, &EuclideanCost::new(16.0)).unwrap();
        for id in tracks.track_ids() {
            let frames: Vec<u64> = tracks.track_points(id).iter().map(|p| p.frame).collect();
            let unique: BTreeSet<u64> = frames.iter().copied().collect();
            assert_eq!(frames.len(), unique.len(), "{} track {id}", linker.name());
        }
    }
}

#[test]
fn accepted_links_respect_cost_and_gap() {
    let cost = EuclideanCost::new(6.0);
    let max_frame_gap = 2;
    let frames = random_frames(5, 30, 30);
    let config = LinkerConfig {
        max_frame_gap,
        ..Default::default()
    };
    for linker in linkers(config) {
        let tracks = linker.link(&frames, &cost).unwrap();
        let check = |a: &Observation, b: &Observation| {
            let gap = b.frame - a.frame;
            assert!(gap >= 1 && gap <= max_frame_gap, "{}: gap {gap}", linker.name());
            let c = cost.cost(a, b, gap).unwrap();
            assert!(c < cost.max_cost(), "{}: cost {c}", linker.name());
        };

        for id in tracks.track_ids() {
            let points = tracks.track_points(id);
            for w in points.windows(2) {
                check(
                    &observation(w[0].frame, &w[0].coords),
                    &observation(w[1].frame, &w[1].coords),
                );
            }
        }
        for (child, parents) in tracks.graph() {
            let first = tracks.track_points(*child)[0];
            for parent in parents {
                let points = tracks.track_points(*parent);
                let last = points
                    .iter()
                    .rev()
                    .find(|p| p.frame < first.frame)
                    .expect("parent ends before its child starts");
                check(
                    &observation(last.frame, &last.coords),
                    &observation(first.frame, &first.coords),
                );
            }
        }
    }
}

#[test]
fn filter_removes_tracks_everywhere() {
    let frames = random_frames(21, 25, 20);
    let mut tracks = SpLinker::default()
        .link(&frames, &EuclideanCost::new(9.0))
        .unwrap();
    let intensity: Vec<f64> = (0..tracks.len()).map(|i| i as f64).collect();
    tracks.add_property("intensity", intensity).unwrap();
    let ids = tracks.track_ids();
    for pair in ids.windows(2).step_by(3) {
        tracks.add_parent(pair[1], pair[0]).unwrap();
    }
    LengthFeature.measure(&mut tracks).unwrap();

    let short: BTreeSet<TrackId> = ids
        .iter()
        .copied()
        .filter(|&id| tracks.track_len(id) < 5)
        .collect();
    assert!(!short.is_empty());

    let removed = FeatureFilter::new("length", 5.0, 1000.0)
        .unwrap()
        .run(&mut tracks)
        .unwrap();
    assert_eq!(removed, short.len());

    for id in &short {
        assert!(!tracks.contains_track(*id));
        assert!(tracks.points().iter().all(|p| p.track_id != *id));
        assert!(!tracks.features().contains_key(id));
        assert!(!tracks.graph().contains_key(id));
        assert!(tracks.graph().values().all(|parents| !parents.contains(id)));
    }
    assert_eq!(tracks.properties()["intensity"].len(), tracks.len());
    tracks.validate().unwrap();
}

#[test]
fn linking_is_deterministic() {
    let frames = random_frames(42, 30, 40);
    let cost = EuclideanCost::new(12.0);
    for parallel in [true, false] {
        let config = LinkerConfig {
            parallel,
            ..Default::default()
        };
        for linker in linkers(config) {
            let first = linker.link(&frames, &cost).unwrap();
            let second = linker.link(&frames, &cost).unwrap();
            assert_eq!(first.points(), second.points());
            assert_eq!(first.graph(), second.graph());
            assert_eq!(io::to_string(&first).unwrap(), io::to_string(&second).unwrap());
        }
    }
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let frames = random_frames(8, 25, 40);
    let cost = EuclideanCost::new(12.0);
    let run = |parallel| {
        SpLinker::new(SpLinkerConfig {
            base: LinkerConfig {
                parallel,
                ..Default::default()
            },
            ..Default::default()
        })
        .link(&frames, &cost)
        .unwrap()
    };
    assert_eq!(run(true), run(false));
}

#[test]
fn st_json_round_trip_is_exact() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let frames = random_frames(3, 20, 15);
    let mut tracks = NnLinker::default()
        .link(&frames, &EuclideanCost::new(9.0))
        .unwrap();
    let score: Vec<f64> = (0..tracks.len()).map(|_| rng.gen_range(-1e6..1e6)).collect();
    tracks.add_property("score", score).unwrap();
    let ids = tracks.track_ids();
    if ids.len() >= 2 {
        tracks.add_parent(ids[1], ids[0]).unwrap();
    }
    LengthFeature.measure(&mut tracks).unwrap();
    tracks.set_feature(ids[0], "mean_speed", 1.0 / 3.0).unwrap();
    tracks.set_scale(vec![0.1, 0.325, 0.325]).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("random.st.json");
    io::write_st_json(&path, &tracks).unwrap();
    let back = io::read_st_json(&path).unwrap();

    assert_eq!(back.points(), tracks.points());
    assert_eq!(back.properties(), tracks.properties());
    assert_eq!(back.graph(), tracks.graph());
    assert_eq!(back.features(), tracks.features());
    assert_eq!(back.scale(), tracks.scale());
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

fn two_frames() -> Vec<Frame> {
    vec![
        Frame::new(0, vec![observation(0, &[0.0, 0.0])]),
        Frame::new(1, vec![observation(1, &[1.0, 0.0])]),
    ]
}

#[test]
fn scenario_link_accepted_below_max_cost() {
    let cost = EuclideanCost::new(5.0);
    let frames = two_frames();
    assert_eq!(
        cost.cost(&frames[0].observations[0], &frames[1].observations[0], 1)
            .unwrap(),
        1.0
    );
    for linker in linkers(LinkerConfig::default()) {
        let tracks = linker.link(&frames, &cost).unwrap();
        assert_eq!(tracks.track_count(), 1);
        assert_eq!(tracks.track_len(TrackId(0)), 2);
    }
}

#[test]
fn scenario_link_rejected_above_max_cost() {
    let cost = EuclideanCost::new(0.5);
    for linker in linkers(LinkerConfig::default()) {
        let tracks = linker.link(&two_frames(), &cost).unwrap();
        assert_eq!(tracks.track_count(), 2);
        assert!(tracks
            .track_ids()
            .into_iter()
            .all(|id| tracks.track_len(id) == 1));
    }
}

#[test]
fn scenario_nearest_neighbour_prefers_cheaper_candidate() {
    let frames = vec![
        Frame::new(0, vec![observation(0, &[0.0, 0.0])]),
        Frame::new(
            1,
            vec![observation(1, &[10.0, 10.0]), observation(1, &[0.1, 0.1])],
        ),
        Frame::empty(2),
    ];
    let tracks = NnLinker::default()
        .link(&frames, &EuclideanCost::default())
        .unwrap();
    assert_eq!(tracks.track_count(), 2);
    let first: Vec<Vec<f64>> = tracks
        .track_points(TrackId(0))
        .iter()
        .map(|p| p.coords.clone())
        .collect();
    assert_eq!(first, vec![vec![0.0, 0.0], vec![0.1, 0.1]]);
    let second = tracks.track_points(TrackId(1));
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].coords, vec![10.0, 10.0]);
}

#[test]
fn scenario_radius_cost_rejects_3d() {
    let cost = RadiusDifferenceCost::new([0.0, 0.0], 100.0);
    let a = observation(0, &[1.0, 2.0, 3.0]);
    let b = observation(1, &[1.0, 2.0, 3.5]);
    assert!(matches!(
        cost.cost(&a, &b, 1),
        Err(Error::UnsupportedDimension { dim: 3, .. })
    ));

    let frames = vec![Frame::new(0, vec![a.clone()]), Frame::new(1, vec![b])];
    let err = NnLinker::default().link(&frames, &cost);
    assert!(matches!(err, Err(Error::UnsupportedDimension { .. })));

    // No pair is ever scored here, the run still fails up front.
    let lone = vec![Frame::new(0, vec![a])];
    for linker in linkers(LinkerConfig::default()) {
        assert!(matches!(
            linker.link(&lone, &cost),
            Err(Error::UnsupportedDimension {
                strategy: "radius-difference",
                dim: 3
            })
        ));
    }
}

#[test]
fn scenario_length_filter_drops_short_track() {
    let mut tracks = STracks::new();
    for f in 0..5 {
        tracks.push_point(TrackId(0), f, vec![f as f64, 0.0]).unwrap();
    }
    for f in 0..2 {
        tracks.push_point(TrackId(1), f, vec![f as f64, 9.0]).unwrap();
    }
    LengthFeature.measure(&mut tracks).unwrap();
    FeatureFilter::new("length", 3.0, 10.0)
        .unwrap()
        .run(&mut tracks)
        .unwrap();
    assert_eq!(tracks.track_ids(), vec![TrackId(0)]);
    tracks.validate().unwrap();
}
