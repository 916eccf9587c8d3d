//! `stracking` CLI: link detections, measure and filter tracks, run scenarios.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use linker_core::cost::AuditLog;
use linker_core::features::FeatureKind;
use linker_core::filter::{FeatureFilter, TrackFilter};
use linker_core::io::{read_st_json, write_st_json};
use linker_core::metrics::LinkingMetrics;
use linker_core::pipeline::{CostConfig, LinkerKind, Pipeline, PipelineConfig};
use linker_core::progress::{RunControl, TracingObserver};
use linker_core::stracks::STracks;
use sim::detector::Recording;
use sim::replay::{load_particles, save_particles};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "stracking", about = "Particle tracking: link, measure, filter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LinkerArg {
    Nearest,
    ShortestPath,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CostArg {
    Euclidean,
    Radius,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FeatureArg {
    Length,
    Distance,
    Displacement,
}

impl From<FeatureArg> for FeatureKind {
    fn from(arg: FeatureArg) -> Self {
        match arg {
            FeatureArg::Length => FeatureKind::Length,
            FeatureArg::Distance => FeatureKind::Distance,
            FeatureArg::Displacement => FeatureKind::Displacement,
        }
    }
}

/// Linking options shared by `link` and `run-scenario`.
#[derive(clap::Args, Debug)]
struct LinkArgs {
    /// Pipeline configuration JSON; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    linker: Option<LinkerArg>,
    #[arg(long, value_enum)]
    cost: Option<CostArg>,
    /// Gate for accepted links (squared units for the euclidean cost)
    #[arg(long)]
    max_cost: Option<f64>,
    #[arg(long)]
    max_frame_gap: Option<u64>,
    /// Radius-cost centre as `c0,c1`
    #[arg(long, value_parser = parse_center)]
    center: Option<[f64; 2]>,
    /// Start a child track for links across a frame gap
    #[arg(long)]
    bridge_edges: bool,
    /// Measure these features after linking
    #[arg(long = "feature", value_enum)]
    features: Vec<FeatureArg>,
    /// Write every radius-cost evaluation to this CSV file
    #[arg(long)]
    audit: Option<PathBuf>,
    /// Log progress while linking
    #[arg(long)]
    progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Link detections into tracks and save them as `.st.json`.
    Link {
        /// Particles JSON (a recording or a bare observation list)
        #[arg(long, conflicts_with = "scenario", required_unless_present = "scenario")]
        input: Option<PathBuf>,
        /// Simulate a named scenario instead of reading a file
        #[arg(long, value_enum)]
        scenario: Option<ScenarioKind>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[command(flatten)]
        link: LinkArgs,
        #[arg(long)]
        output: PathBuf,
    },
    /// Measure features on a saved dataset.
    Measure {
        input: PathBuf,
        #[arg(long = "feature", value_enum, required = true)]
        features: Vec<FeatureArg>,
        /// Defaults to overwriting the input
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Keep tracks whose feature lies in `[min, max]`.
    Filter {
        input: PathBuf,
        #[arg(long)]
        feature: String,
        #[arg(long)]
        min: f64,
        #[arg(long)]
        max: f64,
        /// Defaults to overwriting the input
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Simulate a named scenario, link it and report metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[command(flatten)]
        link: LinkArgs,
        /// Output metrics to a JSON file
        #[arg(long)]
        metrics: Option<PathBuf>,
        /// Save the linked tracks
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the simulated particles
        #[arg(long)]
        save_particles: Option<PathBuf>,
    },
    /// Print a summary of a saved dataset.
    Info { input: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Link {
            input,
            scenario,
            seed,
            link,
            output,
        } => {
            let (recording, defaults) = match (input, scenario) {
                (Some(path), _) => (load_particles(&path)?, None),
                (None, Some(kind)) => {
                    let scenario = Scenario::build(kind, seed);
                    (scenario.record()?, Some(scenario))
                }
                (None, None) => bail!("either --input or --scenario is required"),
            };
            let tracks = run_link(&link, &recording, defaults.as_ref())?.0;
            write_st_json(&output, &tracks)?;
            println!(
                "Linked {} observations into {} tracks -> {}",
                recording.observation_count(),
                tracks.track_count(),
                output.display()
            );
        }
        Commands::Measure {
            input,
            features,
            output,
        } => {
            let mut tracks = read_st_json(&input)?;
            let pipeline = Pipeline::new(PipelineConfig {
                features: features.into_iter().map(FeatureKind::from).collect(),
                ..Default::default()
            })?;
            let report = pipeline.post_process(&mut tracks)?;
            let output = output.unwrap_or(input);
            write_st_json(&output, &tracks)?;
            println!(
                "Measured {} on {} tracks -> {}",
                report.features_measured.join(", "),
                tracks.track_count(),
                output.display()
            );
        }
        Commands::Filter {
            input,
            feature,
            min,
            max,
            output,
        } => {
            let mut tracks = read_st_json(&input)?;
            let removed = FeatureFilter::new(feature, min, max)?.run(&mut tracks)?;
            let output = output.unwrap_or(input);
            write_st_json(&output, &tracks)?;
            println!(
                "Removed {removed} tracks, {} kept -> {}",
                tracks.track_count(),
                output.display()
            );
        }
        Commands::RunScenario {
            scenario,
            seed,
            link,
            metrics,
            output,
            save_particles: particles_path,
        } => {
            run_scenario(
                scenario,
                seed,
                &link,
                metrics.as_deref(),
                output.as_deref(),
                particles_path.as_deref(),
            )?;
        }
        Commands::Info { input } => info(&input)?,
    }

    Ok(())
}

fn parse_center(s: &str) -> Result<[f64; 2], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [a, b] => Ok([
            a.parse().map_err(|e| format!("{a}: {e}"))?,
            b.parse().map_err(|e| format!("{b}: {e}"))?,
        ]),
        _ => Err(format!("expected `c0,c1`, got `{s}`")),
    }
}

/// Merge the config file, the scenario's suggested gates and the flags.
fn build_config(args: &LinkArgs, scenario: Option<&Scenario>) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading pipeline config {}", path.display()))?,
        None => {
            let mut config = PipelineConfig {
                features: Vec::new(),
                ..Default::default()
            };
            if let Some(sc) = scenario {
                config.cost = CostConfig::Euclidean {
                    max_cost: sc.max_cost,
                };
                config.linker_config.max_frame_gap = sc.max_frame_gap;
            }
            config
        }
    };

    if let Some(linker) = args.linker {
        config.linker = match linker {
            LinkerArg::Nearest => LinkerKind::Nearest,
            LinkerArg::ShortestPath => LinkerKind::ShortestPath,
        };
    }
    let max_cost = args.max_cost.unwrap_or(config.cost.max_cost());
    config.cost = match (args.cost, &config.cost) {
        (Some(CostArg::Euclidean), _) | (None, CostConfig::Euclidean { .. }) => {
            CostConfig::Euclidean { max_cost }
        }
        (Some(CostArg::Radius), CostConfig::RadiusDifference { center, .. })
        | (None, CostConfig::RadiusDifference { center, .. }) => CostConfig::RadiusDifference {
            center: args.center.unwrap_or(*center),
            max_cost,
        },
        (Some(CostArg::Radius), CostConfig::Euclidean { .. }) => CostConfig::RadiusDifference {
            center: args.center.unwrap_or([0.0, 0.0]),
            max_cost: args.max_cost.unwrap_or(linker_core::RadiusDifferenceCost::DEFAULT_MAX_COST),
        },
    };
    if let Some(gap) = args.max_frame_gap {
        config.linker_config.max_frame_gap = gap;
    }
    if args.bridge_edges {
        config.linker_config.bridge_edges = true;
    }
    config
        .features
        .extend(args.features.iter().map(|&f| FeatureKind::from(f)));
    config.validate()?;
    Ok(config)
}

fn run_link(
    args: &LinkArgs,
    recording: &Recording,
    scenario: Option<&Scenario>,
) -> Result<(STracks, PipelineConfig)> {
    let config = build_config(args, scenario)?;
    let audit = args.audit.as_deref().map(AuditLog::create).transpose()?;

    let mut control = RunControl::new();
    if args.progress {
        control = control.with_observer(Arc::new(TracingObserver));
    }
    let mut pipeline = Pipeline::new(config.clone())?.with_control(control);
    if let Some(log) = &audit {
        pipeline = pipeline.with_audit(log);
    }
    let out = pipeline.run(&recording.frames)?;
    if audit.as_ref().is_some_and(AuditLog::is_degraded) {
        tracing::warn!("cost audit log is incomplete");
    }
    println!(
        "{}: {} tracks in {:.1} ms (linking {:.1} ms)",
        out.linker,
        out.tracks.track_count(),
        out.total_time_us as f64 / 1000.0,
        out.timing_link_us as f64 / 1000.0
    );
    Ok((out.tracks, config))
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    args: &LinkArgs,
    metrics_path: Option<&Path>,
    output_path: Option<&Path>,
    particles_path: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    println!(
        "Running scenario '{}' (seed={}, frames={})...",
        scenario.name, seed, scenario.n_frames
    );
    let start = std::time::Instant::now();
    let recording = scenario.record()?;
    if let Some(path) = particles_path {
        save_particles(&recording, path)?;
        println!("Particles saved to {}", path.display());
    }

    let (tracks, config) = run_link(args, &recording, Some(&scenario))?;
    let metrics = LinkingMetrics::evaluate(
        &tracks,
        &recording.frames,
        &recording.truth,
        config.linker_config.max_frame_gap,
    )?;
    let elapsed = start.elapsed();

    println!(
        "Links: {} correct, {} wrong, {} missed | precision {:.3} recall {:.3}",
        metrics.true_positives,
        metrics.false_positives,
        metrics.missed,
        metrics.precision(),
        metrics.recall()
    );
    println!(
        "Tracks: {} for {} particles, {} topology edges, elapsed={:.2}s",
        metrics.n_tracks,
        metrics.n_particles,
        metrics.n_topology_edges,
        elapsed.as_secs_f64()
    );

    if let Some(path) = output_path {
        write_st_json(path, &tracks)?;
        println!("Tracks saved to {}", path.display());
    }
    if let Some(path) = metrics_path {
        let json = serde_json::json!({
            "scenario": scenario.name,
            "seed": seed,
            "elapsed_s": elapsed.as_secs_f64(),
            "config": config,
            "metrics": metrics,
            "precision": metrics.precision(),
            "recall": metrics.recall(),
            "f1": metrics.f1(),
        });
        std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
        println!("Metrics saved to {}", path.display());
    }

    Ok(())
}

fn info(input: &Path) -> Result<()> {
    let tracks = read_st_json(input)?;
    let lengths: Vec<usize> = tracks
        .track_ids()
        .into_iter()
        .map(|id| tracks.track_len(id))
        .collect();
    let frames: Vec<u64> = tracks.points().iter().map(|p| p.frame).collect();

    println!("{}", input.display());
    println!("  points:     {}", tracks.len());
    println!("  tracks:     {}", tracks.track_count());
    if let Some(dim) = tracks.dim() {
        println!("  dimension:  {dim}-D");
    }
    if let (Some(first), Some(last)) = (frames.iter().min(), frames.iter().max()) {
        println!("  frames:     {first}..={last}");
    }
    if let (Some(min), Some(max)) = (lengths.iter().min(), lengths.iter().max()) {
        let mean = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
        println!("  length:     min {min}, mean {mean:.1}, max {max}");
    }
    println!("  graph:      {} children", tracks.graph().len());
    let properties: Vec<&str> = tracks.properties().keys().map(String::as_str).collect();
    println!("  properties: [{}]", properties.join(", "));
    let features: Vec<&str> = tracks.feature_names().collect();
    println!("  features:   [{}]", features.join(", "));
    if let Some(scale) = tracks.scale() {
        println!("  scale:      {scale:?}");
    }
    Ok(())
}
